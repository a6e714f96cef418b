//! Program runner (spec.md §4.5): launches a [`Program`]'s zones into the
//! [`ZoneQueue`], scaling requested durations by season and watering-index
//! multipliers.
//!
//! Grounded in `pomodoroom-core::scheduler::AutoScheduler`, which also
//! turns a declarative definition (a day template) into a sequence of
//! concrete timer launches while tracking a single "is this already
//! running" flag per definition.

use chrono::{DateTime, Utc};

use crate::config::{Program, ProgramZoneShare, ShareUnit, SprinklerConfig, Zone};
use crate::interval_season::season_multiplier;
use crate::zone_queue::ZoneQueue;

/// Converts a zone's configured share into seconds.
///
/// Open Question resolution: `ShareUnit::Relative` is interpreted as
/// minutes (spec.md §9), so it differs from `Seconds` only by a factor of
/// 60; both are otherwise a flat per-zone duration prior to scaling.
fn raw_seconds(share: &ProgramZoneShare, unit: ShareUnit) -> u32 {
    match unit {
        ShareUnit::Seconds => share.share,
        ShareUnit::Relative => share.share.saturating_mul(60),
    }
}

pub struct ProgramRunner {
    index_scaling_enabled: bool,
}

impl Default for ProgramRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramRunner {
    pub fn new() -> Self {
        Self {
            index_scaling_enabled: true,
        }
    }

    pub fn set_index_scaling_enabled(&mut self, enabled: bool) {
        self.index_scaling_enabled = enabled;
    }

    pub fn index_scaling_enabled(&self) -> bool {
        self.index_scaling_enabled
    }

    /// Launches `name`. `manual` bypasses season/index scaling (a manual
    /// run always gets the zone's full configured share). Returns `false`
    /// without touching the queue if the program is unknown, already
    /// running, or every zone scales to zero seconds.
    pub fn start(
        &self,
        config: &mut SprinklerConfig,
        queue: &mut ZoneQueue,
        name: &str,
        manual: bool,
        index: u32,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(program) = config.programs.iter().find(|p| p.name == name).cloned() else {
            tracing::warn!(program = name, "start: unknown program");
            return false;
        };
        if program.running {
            tracing::debug!(program = name, "start: already running, ignoring relaunch");
            return false;
        }

        let season_mult = program
            .season_name
            .as_deref()
            .map(|s| season_multiplier(config, s, now))
            .unwrap_or(100);

        let mut launched_any = false;
        for share in &program.zones {
            let Some(zone) = config.zone(&share.zone_name).cloned() else {
                continue;
            };
            let seconds = self.scaled_seconds(&program, share, &zone, manual, season_mult, index);
            if seconds == 0 {
                tracing::debug!(program = name, zone = %zone.name, "start: scaled to zero, skipping");
                continue;
            }
            queue.enqueue_programmed(&zone, seconds, name, now.timestamp());
            launched_any = true;
        }

        if let Some(program) = config.programs.iter_mut().find(|p| p.name == name) {
            program.running = launched_any;
        }
        if launched_any {
            tracing::info!(program = name, manual, "program launched");
        }
        launched_any
    }

    fn scaled_seconds(
        &self,
        program: &Program,
        share: &ProgramZoneShare,
        zone: &Zone,
        manual: bool,
        season_mult: u32,
        index: u32,
    ) -> u32 {
        let _ = zone;
        let base = raw_seconds(share, program.share_unit);
        if manual || !self.index_scaling_enabled {
            return base;
        }
        let numerator = base as u64 * season_mult as u64 * index as u64;
        let scaled = (numerator + 5_000) / 10_000;
        scaled.min(u32::MAX as u64) as u32
    }

    /// Clears `running` on any program whose zones have fully drained from
    /// the queue. Call once per tick after [`ZoneQueue::tick`].
    pub fn reconcile(&self, config: &mut SprinklerConfig, queue: &ZoneQueue) {
        for program in &mut config.programs {
            if !program.running {
                continue;
            }
            let still_pending = program.zones.iter().any(|share| {
                queue.remaining_for(&share.zone_name) > 0
                    || queue.active_zone() == Some(share.zone_name.as_str())
            });
            if !still_pending {
                tracing::info!(program = %program.name, "program finished");
                program.running = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Zone;
    use chrono::TimeZone;

    fn zone(name: &str) -> Zone {
        Zone {
            name: name.to_string(),
            feed: None,
            hydrate: 0,
            pulse: 300,
            pause: 60,
            manual_only: false,
        }
    }

    fn program_with(zones: Vec<ProgramZoneShare>) -> Program {
        Program {
            name: "P".to_string(),
            description: String::new(),
            zones,
            share_unit: ShareUnit::Seconds,
            season_name: None,
            interval_name: None,
            manual_only: false,
            running: false,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 28, 6, 0, 0).unwrap()
    }

    #[test]
    fn manual_start_bypasses_index_scaling() {
        let mut config = SprinklerConfig {
            zones: vec![zone("Z")],
            programs: vec![program_with(vec![ProgramZoneShare { zone_name: "Z".into(), share: 100 }])],
            ..Default::default()
        };
        let mut queue = ZoneQueue::new();
        let runner = ProgramRunner::new();
        assert!(runner.start(&mut config, &mut queue, "P", true, 0, now()));
        assert_eq!(queue.remaining_for("Z"), 100);
    }

    #[test]
    fn scheduled_start_scales_by_index() {
        let mut config = SprinklerConfig {
            zones: vec![zone("Z")],
            programs: vec![program_with(vec![ProgramZoneShare { zone_name: "Z".into(), share: 100 }])],
            ..Default::default()
        };
        let mut queue = ZoneQueue::new();
        let runner = ProgramRunner::new();
        assert!(runner.start(&mut config, &mut queue, "P", false, 50, now()));
        assert_eq!(queue.remaining_for("Z"), 50);
    }

    #[test]
    fn scaled_seconds_rounds_to_nearest_rather_than_truncating() {
        let mut config = SprinklerConfig {
            zones: vec![zone("Z")],
            programs: vec![program_with(vec![ProgramZoneShare { zone_name: "Z".into(), share: 7 }])],
            ..Default::default()
        };
        let mut queue = ZoneQueue::new();
        let runner = ProgramRunner::new();
        // 7 * 100 * 50 / 10_000 = 3.5, which must round up to 4, not truncate to 3.
        assert!(runner.start(&mut config, &mut queue, "P", false, 50, now()));
        assert_eq!(queue.remaining_for("Z"), 4);
    }

    #[test]
    fn zero_scaled_duration_skips_zone_and_does_not_launch() {
        let mut config = SprinklerConfig {
            zones: vec![zone("Z")],
            programs: vec![program_with(vec![ProgramZoneShare { zone_name: "Z".into(), share: 100 }])],
            ..Default::default()
        };
        let mut queue = ZoneQueue::new();
        let runner = ProgramRunner::new();
        assert!(!runner.start(&mut config, &mut queue, "P", false, 0, now()));
        assert_eq!(queue.remaining_for("Z"), 0);
    }

    #[test]
    fn already_running_program_refuses_relaunch() {
        let mut config = SprinklerConfig {
            zones: vec![zone("Z")],
            programs: vec![program_with(vec![ProgramZoneShare { zone_name: "Z".into(), share: 100 }])],
            ..Default::default()
        };
        config.programs[0].running = true;
        let mut queue = ZoneQueue::new();
        let runner = ProgramRunner::new();
        assert!(!runner.start(&mut config, &mut queue, "P", true, 100, now()));
    }

    #[test]
    fn reconcile_clears_running_once_queue_drains() {
        let mut config = SprinklerConfig {
            zones: vec![zone("Z")],
            programs: vec![program_with(vec![ProgramZoneShare { zone_name: "Z".into(), share: 60 }])],
            ..Default::default()
        };
        let mut queue = ZoneQueue::new();
        let runner = ProgramRunner::new();
        runner.start(&mut config, &mut queue, "P", true, 0, now());
        assert!(config.programs[0].running);

        queue.tick(0, &config);
        runner.reconcile(&mut config, &queue);
        assert!(config.programs[0].running, "zone still pulsing");

        // Drain the queue entirely (pulse 60 seconds, no pause remainder).
        queue.stop();
        runner.reconcile(&mut config, &queue);
        assert!(!config.programs[0].running);
    }
}
