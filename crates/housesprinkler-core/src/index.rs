//! Watering-index aggregator (spec.md §4.2).
//!
//! Discovers `waterindex` providers, polls them for a reported watering
//! index, and admits the highest-priority, freshest value through a small
//! set of ordered rules. Grounded in the same discover/poll shape as
//! [`crate::control_plane`], itself modeled on
//! `pomodoroom-core::integrations::google`'s status-polling loop.

use serde_json::Value;

use crate::discovery::{Cadence, ServiceRegistry};

const STALE_AFTER_SECS: i64 = 24 * 60 * 60;

/// The currently-admitted watering index and the provenance that produced
/// it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexValue {
    /// Percentage, typically 0..=100 but not clamped; downstream
    /// multipliers treat it as a raw percentage.
    pub value: u32,
    pub priority: i64,
    /// Wall-clock second the provider reported the value as measured.
    pub timestamp: i64,
    pub origin: String,
}

impl Default for IndexValue {
    /// The un-set value: full watering, lowest possible priority so any
    /// real report wins admission.
    fn default() -> Self {
        Self {
            value: 100,
            priority: i64::MIN,
            timestamp: 0,
            origin: "default".to_string(),
        }
    }
}

/// A listener notified synchronously whenever a new value is admitted.
/// Up to 16 may be registered (spec.md §4.2); registering past that is
/// logged and ignored rather than treated as an error.
pub type IndexListener = Box<dyn FnMut(&IndexValue) + Send>;

const MAX_LISTENERS: usize = 16;

pub struct IndexAggregator {
    current: IndexValue,
    listeners: Vec<IndexListener>,
    discovery: Cadence,
    poll: Cadence,
    http: reqwest::Client,
}

impl IndexAggregator {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            current: IndexValue::default(),
            listeners: Vec::new(),
            discovery: Cadence::new(60),
            // No value obtained yet: poll up to once a minute.
            poll: Cadence::new(60),
            http,
        }
    }

    pub fn add_listener(&mut self, listener: IndexListener) {
        if self.listeners.len() >= MAX_LISTENERS {
            tracing::warn!("index listener registration ignored: limit of {MAX_LISTENERS} reached");
            return;
        }
        self.listeners.push(listener);
    }

    /// Current index, applying the one-day forgetting rule: a value
    /// older than a day reverts to the default rather than being served
    /// stale forever.
    pub fn current(&self, now: i64) -> IndexValue {
        if now - self.current.timestamp > STALE_AFTER_SECS {
            IndexValue::default()
        } else {
            self.current.clone()
        }
    }

    fn admit(&mut self, candidate: IndexValue) {
        if candidate.priority < self.current.priority {
            return;
        }
        if candidate.timestamp < self.current.timestamp - STALE_AFTER_SECS {
            return;
        }
        if candidate.priority == self.current.priority && candidate.timestamp <= self.current.timestamp {
            return;
        }
        tracing::info!(
            origin = %candidate.origin,
            value = candidate.value,
            priority = candidate.priority,
            "watering index updated"
        );
        self.current = candidate;
        for listener in &mut self.listeners {
            listener(&self.current);
        }
        // Once a value has been obtained, polling backs off to hourly.
        self.poll.set_min_interval(60 * 60);
    }

    pub async fn discover(&mut self, registry: &dyn ServiceRegistry, now: i64) -> Vec<String> {
        let force = registry.take_changed();
        if !self.discovery.due(now, force) {
            return Vec::new();
        }
        registry.providers("waterindex")
    }

    /// Polls each known provider, gated by the overall polling cadence
    /// (once a minute with no value, once an hour after). At most one
    /// request per provider per tick.
    pub async fn poll_providers(&mut self, providers: &[String], now: i64) {
        if !self.poll.due(now, false) {
            return;
        }
        for provider in providers {
            match self.http.get(format!("{provider}/status")).send().await {
                Ok(resp) => match resp.json::<Value>().await {
                    Ok(body) => {
                        if let Some(candidate) = parse_waterindex_status(&body, provider) {
                            self.admit(candidate);
                        }
                    }
                    Err(err) => {
                        tracing::warn!(provider = %provider, error = %err, "waterindex: bad status payload");
                    }
                },
                Err(err) => {
                    tracing::warn!(provider = %provider, error = %err, "waterindex: provider unreachable");
                }
            }
        }
    }
}

fn parse_waterindex_status(body: &Value, provider: &str) -> Option<IndexValue> {
    let status = body.get("waterindex")?.get("status")?;
    let value = status.get("index")?.as_u64()? as u32;
    let priority = status.get("priority").and_then(Value::as_i64).unwrap_or(0);
    let timestamp = status.get("received").and_then(Value::as_i64).unwrap_or(0);
    let origin = status
        .get("origin")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| provider.to_string());
    Some(IndexValue {
        value,
        priority,
        timestamp,
        origin,
    })
}
