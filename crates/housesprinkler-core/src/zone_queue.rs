//! The zone pulse/pause queue (spec.md §4.4).
//!
//! Generalizes the wall-clock "flush elapsed, then decide" shape of
//! `pomodoroom-core::timer::TimerEngine` -- which drives a single
//! countdown -- into a priority queue of per-zone entries where at most
//! one zone pulses at a time and every other queued zone is left to soak.

use std::time::Duration;

use tracing::{debug, info};

use crate::config::{SprinklerConfig, Zone};

/// Downstream valves need roughly a second to respond to an off command;
/// the scheduler leaves this much slack after every pulse start, including
/// the final one (spec.md §9 Open Question (c)).
pub const DEFAULT_INDEX_VALVE_PAUSE: i64 = 1;

/// Program-originated activations may only begin within this many seconds
/// past the minute boundary, so external flow meters can attribute usage
/// to a single zone per minute (spec.md §4.4 invariant 4).
const PROGRAM_START_WINDOW_SECS: i64 = 1;

/// One queued activation. At most one entry exists per zone at any time;
/// re-activating an already-queued zone accumulates into `runtime_remaining`.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub zone_name: String,
    pub hydrate_remaining: u32,
    pub runtime_remaining: u32,
    pub next_fire_at: i64,
    /// Empty for a manual activation; the originating program name otherwise.
    pub context: String,
    /// Seconds requested by the pulse most recently started for this entry.
    /// Used to recompute `elapsed work` for the tie-break selection rule.
    last_pulse: u32,
}

impl QueueEntry {
    fn is_manual(&self) -> bool {
        self.context.is_empty()
    }

    /// `runtimeRemaining + pause * ceil(runtimeRemaining/pulse - 1)`, the
    /// tie-break metric from spec.md §4.4 selection policy rule 2.
    fn elapsed_work(&self, zone: &Zone) -> u64 {
        let runtime = self.runtime_remaining as u64;
        if zone.pulse == 0 || runtime == 0 {
            return runtime;
        }
        let pulse = zone.pulse as u64;
        let cycles_minus_one = runtime.div_ceil(pulse).saturating_sub(1);
        runtime + zone.pause as u64 * cycles_minus_one
    }
}

/// Outcome of advancing the queue by one selection step.
#[derive(Debug, Clone)]
pub struct Activation {
    pub zone_name: String,
    pub feed: Option<String>,
    pub pulse_seconds: u32,
    pub context: String,
}

/// Serializes pulse/pause cycles across enqueued zones (spec.md §4.4).
#[derive(Debug, Default)]
pub struct ZoneQueue {
    entries: Vec<QueueEntry>,
    /// Name of the zone currently pulsing, if any.
    active_zone: Option<String>,
    active_until: i64,
    index_valve_pause: i64,
}

impl ZoneQueue {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            active_zone: None,
            active_until: 0,
            index_valve_pause: DEFAULT_INDEX_VALVE_PAUSE,
        }
    }

    pub fn with_index_valve_pause(index_valve_pause: i64) -> Self {
        Self {
            index_valve_pause,
            ..Self::new()
        }
    }

    pub fn is_zone_active(&self) -> bool {
        self.active_zone.is_some()
    }

    pub fn active_zone(&self) -> Option<&str> {
        self.active_zone.as_deref()
    }

    /// `idle()` per spec.md §4.4: no zone pulsing, and no entry has
    /// `runtime_remaining > 0` -- entries solely waiting out a trailing
    /// pause do not defeat idle.
    pub fn idle(&self) -> bool {
        self.active_zone.is_none()
            && !self.entries.iter().any(|e| e.runtime_remaining > 0)
    }

    /// Enqueue (or accumulate onto) a zone activation.
    ///
    /// A manual activation is represented by an empty `context`. Per
    /// spec.md §8 round-trip property, enqueuing the same zone twice with
    /// durations `a` then `b` back-to-back is indistinguishable from one
    /// enqueue of `a + b` seconds.
    pub fn enqueue(&mut self, zone_name: &str, seconds: u32, context: &str, now: i64) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.zone_name == zone_name) {
            entry.runtime_remaining = entry.runtime_remaining.saturating_add(seconds);
            debug!(zone = zone_name, seconds, "zone queue: accumulated onto existing entry");
            return;
        }
        self.entries.push(QueueEntry {
            zone_name: zone_name.to_string(),
            hydrate_remaining: 0,
            runtime_remaining: seconds,
            next_fire_at: now,
            context: context.to_string(),
            last_pulse: 0,
        });
        debug!(zone = zone_name, seconds, context, "zone queue: enqueued");
    }

    /// Enqueue a programmed activation, honoring the zone's hydrate pulse.
    pub fn enqueue_programmed(&mut self, zone: &Zone, seconds: u32, context: &str, now: i64) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.zone_name == zone.name) {
            entry.runtime_remaining = entry.runtime_remaining.saturating_add(seconds);
            return;
        }
        self.entries.push(QueueEntry {
            zone_name: zone.name.clone(),
            hydrate_remaining: zone.hydrate,
            runtime_remaining: seconds,
            next_fire_at: now,
            context: context.to_string(),
            last_pulse: 0,
        });
    }

    /// Clear all entries and release the active zone (spec.md §4.4 Stop;
    /// the caller is responsible for cancelling the active control point).
    pub fn stop(&mut self) -> Option<String> {
        self.entries.clear();
        self.active_zone.take()
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    /// Advance the queue by one tick. Returns the zone activation to start,
    /// if the selection policy chose one this tick.
    ///
    /// `now` is the wall-clock second. `config` resolves each entry's zone
    /// definition (pulse/pause/hydrate).
    pub fn tick(&mut self, now: i64, config: &SprinklerConfig) -> Option<Activation> {
        // A zone that just finished its pulse becomes idle again; no
        // explicit "off" is sent here -- the relay is trusted to
        // self-terminate by the pulse argument (spec.md §4.1).
        if self.active_zone.is_some() && now >= self.active_until {
            self.active_zone = None;
        }

        // While a zone is active, invariant 3: leave the queue untouched
        // until pulse + index_valve_pause has elapsed.
        if self.active_zone.is_some() {
            self.prune(now);
            return None;
        }

        let selected_index = self.select(now, config)?;
        let zone_name = self.entries[selected_index].zone_name.clone();
        let zone = config.zone(&zone_name)?.clone();

        let activation = self.activate(selected_index, &zone, now);
        self.prune(now);
        Some(activation)
    }

    /// Selection policy from spec.md §4.4: among ready entries
    /// (`next_fire_at <= now`), prefer the smallest `next_fire_at`
    /// (longest soak so far); tie-break on largest elapsed work.
    ///
    /// Invariant 4: a programmed entry is only ready near the minute
    /// boundary; a manual entry has no such gate. An off-window program
    /// entry is skipped here so a ready manual entry still gets picked,
    /// rather than aborting the whole tick.
    fn select(&self, now: i64, config: &SprinklerConfig) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (idx, entry) in self.entries.iter().enumerate() {
            if entry.next_fire_at > now || entry.runtime_remaining == 0 && entry.hydrate_remaining == 0 {
                continue;
            }
            if !entry.is_manual() && now % 60 > PROGRAM_START_WINDOW_SECS {
                continue;
            }
            let Some(zone) = config.zone(&entry.zone_name) else {
                continue;
            };
            best = Some(match best {
                None => idx,
                Some(current) => {
                    let current_entry = &self.entries[current];
                    if entry.next_fire_at != current_entry.next_fire_at {
                        if entry.next_fire_at < current_entry.next_fire_at {
                            idx
                        } else {
                            current
                        }
                    } else {
                        let current_zone = config.zone(&current_entry.zone_name)?;
                        if entry.elapsed_work(zone) > current_entry.elapsed_work(current_zone) {
                            idx
                        } else {
                            current
                        }
                    }
                }
            });
        }
        best
    }

    /// Apply the entry-update rules from spec.md §4.4 and mark the zone
    /// active for `pulse + index_valve_pause` seconds.
    fn activate(&mut self, idx: usize, zone: &Zone, now: i64) -> Activation {
        let entry = &mut self.entries[idx];
        let context = entry.context.clone();

        let pulse = if entry.is_manual() {
            let pulse = entry.runtime_remaining;
            entry.runtime_remaining = 0;
            entry.hydrate_remaining = 0;
            pulse
        } else if entry.hydrate_remaining > 0 {
            let pulse = entry.hydrate_remaining;
            entry.hydrate_remaining = 0;
            pulse
        } else if zone.pulse == 0 {
            let pulse = entry.runtime_remaining;
            entry.runtime_remaining = 0;
            pulse
        } else {
            let pulse = zone.pulse.min(entry.runtime_remaining);
            entry.runtime_remaining = entry.runtime_remaining.saturating_sub(pulse);
            pulse
        };

        entry.last_pulse = pulse;
        entry.next_fire_at = now + pulse as i64 + zone.pause as i64;

        self.active_zone = Some(zone.name.clone());
        self.active_until = now + pulse as i64 + self.index_valve_pause;

        info!(zone = %zone.name, pulse, context = %context, "zone queue: activating");

        Activation {
            zone_name: zone.name.clone(),
            feed: zone.feed.clone(),
            pulse_seconds: pulse,
            context,
        }
    }

    /// Compact from the tail while the last entry is fully spent and its
    /// trailing pause has elapsed (spec.md §4.4 Pruning).
    fn prune(&mut self, now: i64) {
        while let Some(last) = self.entries.last() {
            if last.runtime_remaining == 0 && last.hydrate_remaining == 0 && last.next_fire_at < now {
                self.entries.pop();
            } else {
                break;
            }
        }
    }

    /// Total on-seconds still outstanding (queued + hydrate) for a zone,
    /// used by program-completion bookkeeping.
    pub fn remaining_for(&self, zone_name: &str) -> u32 {
        self.entries
            .iter()
            .find(|e| e.zone_name == zone_name)
            .map(|e| e.runtime_remaining + e.hydrate_remaining)
            .unwrap_or(0)
    }

    pub fn index_valve_pause(&self) -> Duration {
        Duration::from_secs(self.index_valve_pause.max(0) as u64)
    }
}
