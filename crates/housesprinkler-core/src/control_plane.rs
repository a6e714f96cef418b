//! Control plane: declares zone/feed control points, discovers the
//! providers that serve them, and actuates them over HTTP (spec.md §4.1).
//!
//! Grounded in `pomodoroom-core::integrations::google` for the
//! discover-then-call-out HTTP shape (reqwest client, JSON status parsing,
//! fire-and-log-on-failure actuation calls).

use std::collections::HashMap;

use serde_json::Value;

use crate::config::{ControlKind, ControlState};
use crate::discovery::{Cadence, ServiceRegistry};

/// A declared actuation target: a zone valve or an upstream feed.
#[derive(Debug, Clone)]
pub struct ControlPoint {
    pub name: String,
    pub kind: ControlKind,
    pub provider_url: Option<String>,
    pub state: ControlState,
    pub events_enabled: bool,
    pub events_once: bool,
    /// Wall-clock second the current activation is due to end. Only
    /// meaningful while `state == Active`.
    pub deadline: i64,
    /// Whether the last discovery/actuation attempt for this point was an
    /// error, so repeated failures log exactly once on transition in.
    error_logged: bool,
}

impl ControlPoint {
    fn new(name: &str, kind: ControlKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            provider_url: None,
            state: ControlState::Unknown,
            events_enabled: true,
            events_once: false,
            deadline: 0,
            error_logged: false,
        }
    }
}

/// Owns the set of declared control points and drives their discovery and
/// actuation. One instance per running [`crate::SprinklerCore`]; re-created
/// wholesale on config reload (spec.md §9 DESIGN NOTES).
pub struct ControlPlane {
    points: Vec<ControlPoint>,
    discovery: Cadence,
    http: reqwest::Client,
}

impl ControlPlane {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            points: Vec::new(),
            discovery: Cadence::new(60),
            http,
        }
    }

    /// Drops all declared points. Called at the start of a config reload
    /// before re-declaring from the new document.
    pub fn reset(&mut self) {
        self.points.clear();
    }

    /// Declares a control point. Idempotent: redeclaring an existing name
    /// is a no-op so a reload that re-lists the same zones doesn't reset
    /// their discovered provider.
    pub fn declare(&mut self, name: &str, kind: ControlKind) {
        if self.points.iter().any(|p| p.name == name) {
            return;
        }
        self.points.push(ControlPoint::new(name, kind));
    }

    pub fn event_policy(&mut self, name: &str, enabled: bool, once: bool) {
        if let Some(point) = self.point_mut(name) {
            point.events_enabled = enabled;
            point.events_once = once;
        }
    }

    /// Single-character state rendering, `'u'` for an undeclared point.
    pub fn state(&self, name: &str) -> char {
        self.points
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.state.as_char())
            .unwrap_or(ControlState::Unknown.as_char())
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.points.iter().any(|p| p.name == name)
    }

    pub fn any_active(&self) -> bool {
        self.points.iter().any(|p| p.state == ControlState::Active)
    }

    fn point_mut(&mut self, name: &str) -> Option<&mut ControlPoint> {
        self.points.iter_mut().find(|p| p.name == name)
    }

    /// Actuates a control point on, for `pulse` seconds, tagging the
    /// provider's cause string with `context` (e.g. the zone queue's
    /// program name). Returns `false` without contacting the network if
    /// the point is unknown or has no discovered provider yet; per
    /// spec.md §7 an unknown control point is logged but the caller still
    /// treats the overall request as accepted.
    pub async fn start(&mut self, name: &str, pulse: u32, context: &str, now: i64) -> bool {
        let Some(point) = self.points.iter_mut().find(|p| p.name == name) else {
            tracing::warn!(point = name, "start: unknown control point");
            return false;
        };
        let Some(provider) = point.provider_url.clone() else {
            tracing::debug!(point = name, "start: no provider discovered yet");
            return false;
        };

        let escaped_context = urlencoding::encode(context);
        let url = format!(
            "{provider}/set?point={name}&state=on&pulse={pulse}&cause=SPRINKLER%20{escaped_context}"
        );

        match self.http.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let point = self.point_mut(name).expect("point exists");
                point.state = ControlState::Active;
                point.deadline = now + i64::from(pulse);
                point.error_logged = false;
                true
            }
            Ok(resp) => {
                let point = self.point_mut(name).expect("point exists");
                if !point.error_logged {
                    tracing::error!(point = name, status = %resp.status(), "start: provider rejected actuation");
                    point.error_logged = true;
                }
                point.state = ControlState::Error;
                point.deadline = 0;
                false
            }
            Err(err) => {
                let point = self.point_mut(name).expect("point exists");
                if !point.error_logged {
                    tracing::error!(point = name, error = %err, "start: provider unreachable");
                    point.error_logged = true;
                }
                point.state = ControlState::Error;
                point.deadline = 0;
                false
            }
        }
    }

    /// Actuates off. `None` cancels every currently active point.
    pub async fn cancel(&mut self, name: Option<&str>) {
        let targets: Vec<String> = match name {
            Some(n) => vec![n.to_string()],
            None => self
                .points
                .iter()
                .filter(|p| p.state == ControlState::Active)
                .map(|p| p.name.clone())
                .collect(),
        };
        for target in targets {
            self.stop_one(&target).await;
        }
    }

    async fn stop_one(&mut self, name: &str) {
        let Some(point) = self.points.iter_mut().find(|p| p.name == name) else {
            tracing::warn!(point = name, "cancel: unknown control point");
            return;
        };
        let Some(provider) = point.provider_url.clone() else {
            return;
        };
        let url = format!("{provider}/set?point={name}&state=off");
        match self.http.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let point = self.point_mut(name).expect("point exists");
                point.state = ControlState::Idle;
                point.deadline = 0;
                point.error_logged = false;
            }
            Ok(resp) => {
                tracing::error!(point = name, status = %resp.status(), "cancel: provider rejected");
            }
            Err(err) => {
                tracing::error!(point = name, error = %err, "cancel: provider unreachable");
            }
        }
    }

    /// Advances idle-after-deadline transitions. Call once per tick with
    /// the current wall-clock second, before any scheduling decisions that
    /// read control state (spec.md §5 ordering guarantee).
    pub fn periodic(&mut self, now: i64) {
        for point in &mut self.points {
            if point.state == ControlState::Active && now >= point.deadline {
                point.state = ControlState::Idle;
                point.deadline = 0;
            }
        }
    }

    /// Rescans the registry for `kind = "control"` providers and updates
    /// which provider serves each declared point. Gated to at most once a
    /// minute, or immediately when the registry reports a change. A full
    /// rescan clears stale provider assignments for points no longer
    /// reported by any provider.
    pub async fn discover(&mut self, registry: &dyn ServiceRegistry, now: i64) {
        let force = registry.take_changed();
        if !self.discovery.due(now, force) {
            return;
        }
        let providers = registry.providers("control");
        let mut assigned: HashMap<String, String> = HashMap::new();
        for provider in providers {
            match self.http.get(format!("{provider}/status")).send().await {
                Ok(resp) => match resp.json::<Value>().await {
                    Ok(body) => {
                        if let Some(status) = body
                            .get("control")
                            .and_then(|c| c.get("status"))
                            .and_then(Value::as_object)
                        {
                            for key in status.keys() {
                                assigned.insert(key.clone(), provider.clone());
                            }
                        }
                    }
                    Err(err) => {
                        tracing::warn!(provider = %provider, error = %err, "discover: bad status payload");
                    }
                },
                Err(err) => {
                    tracing::warn!(provider = %provider, error = %err, "discover: provider unreachable");
                }
            }
        }

        for point in &mut self.points {
            let new_provider = assigned.get(&point.name).cloned();
            if new_provider != point.provider_url {
                tracing::info!(point = %point.name, provider = ?new_provider, "route changed");
                point.provider_url = new_provider;
            }
        }
    }

    pub fn status(&self) -> Value {
        Value::Object(
            self.points
                .iter()
                .map(|p| {
                    (
                        p.name.clone(),
                        serde_json::json!({
                            "kind": p.kind,
                            "state": p.state.as_char().to_string(),
                            "provider": p.provider_url,
                        }),
                    )
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::EmptyRegistry;

    fn plane() -> ControlPlane {
        ControlPlane::new(reqwest::Client::new())
    }

    #[test]
    fn declare_is_idempotent() {
        let mut plane = plane();
        plane.declare("Front", ControlKind::Zone);
        plane.declare("Front", ControlKind::Zone);
        assert_eq!(plane.points.len(), 1);
    }

    #[test]
    fn unknown_point_reports_unknown_state() {
        let plane = plane();
        assert_eq!(plane.state("Ghost"), 'u');
    }

    #[tokio::test]
    async fn start_without_provider_is_a_noop() {
        let mut plane = plane();
        plane.declare("Front", ControlKind::Zone);
        let started = plane.start("Front", 60, "Program A", 0).await;
        assert!(!started);
        assert_eq!(plane.state("Front"), 'u');
    }

    #[tokio::test]
    async fn start_against_mock_provider_activates_point() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Regex(r"^/set\?point=Front.*".into()))
            .with_status(200)
            .create_async()
            .await;

        let mut plane = plane();
        plane.declare("Front", ControlKind::Zone);
        plane.point_mut("Front").unwrap().provider_url = Some(server.url());

        let started = plane.start("Front", 30, "Program A", 1_000).await;
        assert!(started);
        assert_eq!(plane.state("Front"), 'a');
        mock.assert_async().await;

        plane.periodic(1_029);
        assert_eq!(plane.state("Front"), 'a');
        plane.periodic(1_030);
        assert_eq!(plane.state("Front"), 'i');
    }

    #[tokio::test]
    async fn start_against_rejecting_provider_clears_deadline() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex(r"^/set\?point=Front.*".into()))
            .with_status(500)
            .create_async()
            .await;

        let mut plane = plane();
        plane.declare("Front", ControlKind::Zone);
        plane.point_mut("Front").unwrap().provider_url = Some(server.url());
        plane.point_mut("Front").unwrap().deadline = 1_000;

        let started = plane.start("Front", 30, "Program A", 1).await;
        assert!(!started);
        assert_eq!(plane.state("Front"), 'e');
        assert_eq!(plane.point_mut("Front").unwrap().deadline, 0);
    }

    #[tokio::test]
    async fn discover_assigns_provider_from_status_payload() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/status")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"control":{"status":{"Front":true}}}"#)
            .create_async()
            .await;

        struct OneProvider(String);
        impl ServiceRegistry for OneProvider {
            fn providers(&self, _kind: &str) -> Vec<String> {
                vec![self.0.clone()]
            }
            fn take_changed(&self) -> bool {
                false
            }
        }

        let mut plane = plane();
        plane.declare("Front", ControlKind::Zone);
        let registry = OneProvider(server.url());
        plane.discover(&registry, 0).await;
        assert_eq!(plane.point_mut("Front").unwrap().provider_url, Some(server.url()));
    }

    #[tokio::test]
    async fn discover_respects_cadence_unless_forced() {
        let registry = EmptyRegistry;
        let mut plane = plane();
        plane.discover(&registry, 0).await;
        // Second discovery within the same minute must not reset the
        // cadence clock; a third call past the minute mark must.
        assert!(!plane.discovery.due(5, false));
        assert!(plane.discovery.due(60, false));
    }
}
