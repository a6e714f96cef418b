//! The aggregate root wiring every subsystem together (spec.md §9 DESIGN
//! NOTES): one owned value per running instance, replacing the globals the
//! original program kept. A CLI invocation constructs one, drives it
//! through zero or more `tick`s, and persists it on exit.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::config::{ControlKind, SprinklerConfig};
use crate::control_plane::ControlPlane;
use crate::discovery::ServiceRegistry;
use crate::error::Result;
use crate::index::IndexAggregator;
use crate::persistence::PersistenceManager;
use crate::program::ProgramRunner;
use crate::schedule::ScheduleEvaluator;
use crate::zone_queue::ZoneQueue;

pub struct SprinklerCore {
    pub config: SprinklerConfig,
    zone_queue: ZoneQueue,
    control_plane: ControlPlane,
    index_aggregator: IndexAggregator,
    program_runner: ProgramRunner,
    schedule_evaluator: ScheduleEvaluator,
    persistence: PersistenceManager,
    index_providers: Vec<String>,
}

impl SprinklerCore {
    pub fn new(config: SprinklerConfig, http: reqwest::Client, state_path: PathBuf) -> Self {
        let mut core = Self {
            zone_queue: ZoneQueue::new(),
            control_plane: ControlPlane::new(http.clone()),
            index_aggregator: IndexAggregator::new(http),
            program_runner: ProgramRunner::new(),
            schedule_evaluator: ScheduleEvaluator::new(),
            persistence: PersistenceManager::new(state_path),
            index_providers: Vec::new(),
            config,
        };
        core.refresh();
        core
    }

    /// Restores schedule `last_launch` timestamps, the rain delay, and the
    /// global schedule switch from the local/remote state snapshot. Call
    /// once after construction.
    ///
    /// Snapshot shape is the persisted state document from spec.md §6:
    /// `{ "on": bool, "raindelay": int, "schedule": [{"id", "launched"}] }`.
    /// `"on"` is the global switch, `"raindelay"` the rain-delay deadline,
    /// and `"schedule"` the per-schedule launch history, keyed by UUID.
    pub fn load_state(&mut self) -> Result<()> {
        let Some(snapshot) = self.persistence.read_snapshot()? else {
            return Ok(());
        };

        if let Some(enabled) = snapshot.get("on").and_then(serde_json::Value::as_bool) {
            self.schedule_evaluator.set_enabled(enabled);
        }
        if let Some(until) = snapshot.get("raindelay").and_then(serde_json::Value::as_i64) {
            self.schedule_evaluator.set_rain_delay_until(until);
        }
        if let Some(entries) = snapshot.get("schedule").and_then(serde_json::Value::as_array) {
            for entry in entries {
                let Some(id) = entry.get("id").and_then(serde_json::Value::as_str) else {
                    continue;
                };
                let Some(launched) = entry.get("launched").and_then(serde_json::Value::as_i64) else {
                    continue;
                };
                if let Some(schedule) = self
                    .config
                    .schedules
                    .iter_mut()
                    .find(|s| s.id.to_string() == id)
                {
                    schedule.last_launch = launched;
                }
            }
        }
        Ok(())
    }

    /// Assembles the persisted snapshot for the parts of state that must
    /// survive a restart: schedule launch history, the rain delay, and
    /// the global switch. Zone/program in-flight state is intentionally
    /// not persisted -- a restart starts with an empty queue.
    ///
    /// Shape matches spec.md §6's persisted state document exactly.
    fn snapshot(&self) -> serde_json::Value {
        let schedule: Vec<serde_json::Value> = self
            .config
            .schedules
            .iter()
            .map(|s| json!({ "id": s.id, "launched": s.last_launch }))
            .collect();
        json!({
            "on": self.schedule_evaluator.enabled(),
            "raindelay": self.schedule_evaluator.rain_delay_until(),
            "schedule": schedule,
        })
    }

    /// Re-declares control points from the current configuration. Called
    /// once at startup and again whenever the configuration document is
    /// reloaded; existing discovered routes for zones that still exist are
    /// left untouched (`ControlPlane::declare` is idempotent).
    pub fn refresh(&mut self) {
        self.control_plane.reset();
        for zone in &self.config.zones {
            self.control_plane.declare(&zone.name, ControlKind::Zone);
        }
        for feed in &self.config.controls {
            self.control_plane.declare(&feed.name, ControlKind::Feed);
        }
    }

    pub fn set_local_storage_enabled(&mut self, enabled: bool) {
        self.persistence.set_local_enabled(enabled);
    }

    /// Drives every subsystem forward by one wall-clock second. Intended
    /// to be called roughly once a second; calling it more or less often
    /// only affects latency, since every subsystem reads `now` rather than
    /// assuming a fixed step.
    pub async fn tick(&mut self, registry: &dyn ServiceRegistry, now: DateTime<Utc>) {
        let now_secs = now.timestamp();

        // Control-point routing and idle transitions happen first so that
        // everything downstream (zone selection, program reconciliation)
        // sees a consistent view of which points are available and active
        // this tick (spec.md §5 ordering guarantee).
        self.control_plane.discover(registry, now_secs).await;
        self.control_plane.periodic(now_secs);

        let discovered = self.index_aggregator.discover(registry, now_secs).await;
        if !discovered.is_empty() {
            self.index_providers = discovered;
        }
        self.index_aggregator.poll_providers(&self.index_providers, now_secs).await;

        if let Some(activation) = self.zone_queue.tick(now_secs, &self.config) {
            // A feed's activation precedes its zone's activation in
            // wall-clock order within a single tick (spec.md §4.4).
            if let Some(feed) = &activation.feed {
                self.control_plane
                    .start(feed, activation.pulse_seconds, &activation.context, now_secs)
                    .await;
            }
            self.control_plane
                .start(&activation.zone_name, activation.pulse_seconds, &activation.context, now_secs)
                .await;
        }
        self.program_runner.reconcile(&mut self.config, &self.zone_queue);

        let index_value = self.index_aggregator.current(now_secs).value;
        let launched = self.schedule_evaluator.tick(
            &mut self.config,
            &self.program_runner,
            &mut self.zone_queue,
            index_value,
            now,
        );
        if launched {
            self.persistence.mark_changed();
        }

        let snapshot = self.snapshot();
        self.persistence.flush_snapshot(now_secs, snapshot);
    }

    pub fn start_manual_zone(&mut self, zone_name: &str, seconds: u32, now: DateTime<Utc>) -> bool {
        if !self.config.zones.iter().any(|z| z.name == zone_name) {
            tracing::warn!(zone = zone_name, "start_manual_zone: unknown zone");
            return false;
        }
        self.zone_queue.enqueue(zone_name, seconds, "", now.timestamp());
        self.persistence.mark_changed();
        true
    }

    pub fn start_program(&mut self, name: &str, manual: bool, now: DateTime<Utc>) -> bool {
        let index = self.index_aggregator.current(now.timestamp()).value;
        let started = self
            .program_runner
            .start(&mut self.config, &mut self.zone_queue, name, manual, index, now);
        if started {
            self.persistence.mark_changed();
        }
        started
    }

    /// Clears the queue and, if a zone is mid-pulse, cancels its control
    /// point. `None` stops everything; `Some(name)` only affects that one
    /// control point if it is currently active.
    pub async fn stop(&mut self, name: Option<&str>) {
        match name {
            None => {
                self.zone_queue.stop();
                self.control_plane.cancel(None).await;
            }
            Some(n) => {
                self.control_plane.cancel(Some(n)).await;
            }
        }
        self.persistence.mark_changed();
    }

    pub fn rain_delay(&mut self, delta_secs: i64, now: DateTime<Utc>) {
        self.schedule_evaluator.set_rain(delta_secs, now.timestamp());
        self.persistence.mark_changed();
    }

    pub fn rain_enable(&mut self, enabled: bool) {
        self.schedule_evaluator.rain_enable(enabled);
        self.persistence.mark_changed();
    }

    pub fn schedule_switch(&mut self) -> bool {
        let enabled = self.schedule_evaluator.switch();
        self.persistence.mark_changed();
        enabled
    }

    pub fn set_index_scaling_enabled(&mut self, enabled: bool) {
        self.program_runner.set_index_scaling_enabled(enabled);
    }

    pub fn current_index(&self, now: DateTime<Utc>) -> u32 {
        self.index_aggregator.current(now.timestamp()).value
    }

    pub fn control_state(&self, name: &str) -> char {
        self.control_plane.state(name)
    }

    pub fn idle(&self) -> bool {
        self.zone_queue.idle()
    }

    pub fn status(&self, now: DateTime<Utc>) -> serde_json::Value {
        json!({
            "timestamp": now.timestamp(),
            "control": self.control_plane.status(),
            "index": self.current_index(now),
            "program": self.config.programs.iter().map(|p| json!({
                "name": p.name,
                "running": p.running,
            })).collect::<Vec<_>>(),
            "schedule": json!({
                "enabled": self.schedule_evaluator.enabled(),
                "rainDelayUntil": self.schedule_evaluator.rain_delay_until(),
                "rules": self.config.schedules.iter().map(|s| json!({
                    "id": s.id,
                    "program": s.program_name,
                    "enabled": s.enabled,
                    "lastLaunch": s.last_launch,
                })).collect::<Vec<_>>(),
            }),
            "idle": self.idle(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Zone;
    use crate::discovery::EmptyRegistry;

    fn config_with_zone() -> SprinklerConfig {
        SprinklerConfig {
            zones: vec![Zone {
                name: "Front".to_string(),
                feed: None,
                hydrate: 0,
                pulse: 60,
                pause: 30,
                manual_only: false,
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn manual_zone_activation_ticks_through_a_full_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut core = SprinklerCore::new(
            config_with_zone(),
            reqwest::Client::new(),
            dir.path().join("state.json"),
        );
        let registry = EmptyRegistry;
        let start = chrono::Utc::now();

        assert!(core.start_manual_zone("Front", 10, start));
        core.tick(&registry, start).await;
        assert!(!core.idle());

        let later = start + chrono::Duration::seconds(41);
        core.tick(&registry, later).await;
        assert!(core.idle());
    }

    #[test]
    fn refresh_declares_control_points_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let core = SprinklerCore::new(
            config_with_zone(),
            reqwest::Client::new(),
            dir.path().join("state.json"),
        );
        assert_eq!(core.control_state("Front"), 'u');
    }

    #[test]
    fn persisted_snapshot_matches_documented_shape() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("state.json");
        let schedule = crate::config::Schedule {
            id: uuid::Uuid::new_v4(),
            program_name: "P".to_string(),
            enabled: true,
            begin: 0,
            until: 0,
            start: crate::config::TimeOfDay { hour: 6, minute: 0 },
            repeat: crate::config::RepeatKind::Daily,
            days: [false; 7],
            interval: 1,
            last_launch: 123,
        };
        let config = SprinklerConfig {
            schedules: vec![schedule.clone()],
            ..Default::default()
        };
        let mut core = SprinklerCore::new(config, reqwest::Client::new(), state_path.clone());
        core.schedule_evaluator.set_enabled(false);
        core.schedule_evaluator.set_rain_delay_until(500);

        let snapshot = core.snapshot();
        assert_eq!(snapshot["on"], false);
        assert_eq!(snapshot["raindelay"], 500);
        assert_eq!(snapshot["schedule"][0]["id"], json!(schedule.id));
        assert_eq!(snapshot["schedule"][0]["launched"], 123);

        core.config.schedules[0].last_launch = 0;
        std::fs::write(&state_path, serde_json::to_string(&snapshot).unwrap()).unwrap();
        core.load_state().unwrap();
        assert!(!core.schedule_evaluator.enabled());
        assert_eq!(core.schedule_evaluator.rain_delay_until(), 500);
        assert_eq!(core.config.schedules[0].last_launch, 123);
    }

    #[test]
    fn unknown_zone_refuses_manual_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut core = SprinklerCore::new(
            config_with_zone(),
            reqwest::Client::new(),
            dir.path().join("state.json"),
        );
        assert!(!core.start_manual_zone("Ghost", 10, chrono::Utc::now()));
    }
}
