//! The configuration document and its data model (spec.md §3).
//!
//! The document is naturally an immutable parsed tree: subsystems hold
//! borrowed views invalidated on refresh, never long-lived raw pointers
//! (spec.md §9 DESIGN NOTES). Loading/saving the document to disk or over
//! HTTP is out of scope per spec.md §1 -- only the shape and validation
//! of the in-memory document live here, behind the [`ConfigSource`]
//! contract.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConfigError;

/// A controllable valve delivering water to a physical area.
///
/// Zones are immutable for the life of a loaded configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    /// Upstream valve/pump that must be on while this zone is watering.
    #[serde(default)]
    pub feed: Option<String>,
    /// Optional longer first pulse to pre-wet clay soil, in seconds.
    #[serde(default)]
    pub hydrate: u32,
    /// Maximum contiguous on-time, in seconds. Zero means "all at once".
    pub pulse: u32,
    /// Mandatory soak interval after each pulse, in seconds.
    pub pause: u32,
    /// Forbids scheduled (program) activation; manual activation still works.
    #[serde(default)]
    pub manual_only: bool,
}

/// Runtime status of a zone or feed, mirrored from its [`ControlPoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneStatus {
    Idle,
    Active,
    Error,
    Unknown,
}

/// Whether a control point actuates a zone valve or an upstream feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ControlKind {
    Zone,
    Feed,
}

/// Current state of a declared [`ControlPoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlState {
    Unknown,
    Idle,
    Active,
    Error,
}

impl ControlState {
    /// Single-character rendering used by `ControlPlane::state`.
    pub fn as_char(self) -> char {
        match self {
            ControlState::Unknown => 'u',
            ControlState::Idle => 'i',
            ControlState::Active => 'a',
            ControlState::Error => 'e',
        }
    }
}

/// Either an absolute number of seconds or a relative scheduling unit.
///
/// Open Question resolution: a `Relative` share is interpreted as minutes
/// (spec.md §9 leaves the exact relative unit unspecified; minutes is the
/// natural resolution given seconds are used for the absolute case).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareUnit {
    Seconds,
    Relative,
}

/// One zone activation inside a [`Program`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramZoneShare {
    pub zone_name: String,
    pub share: u32,
}

/// An ordered set of zone activations with per-zone durations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub zones: Vec<ProgramZoneShare>,
    #[serde(default = "default_share_unit")]
    pub share_unit: ShareUnit,
    #[serde(default)]
    pub season_name: Option<String>,
    #[serde(default)]
    pub interval_name: Option<String>,
    #[serde(default)]
    pub manual_only: bool,
    /// True while the program has queued (or is still draining) activations.
    /// Not part of the persisted document; reset to `false` on load.
    #[serde(skip, default)]
    pub running: bool,
}

fn default_share_unit() -> ShareUnit {
    ShareUnit::Seconds
}

/// A calendar rule that fires a [`Program`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub program_name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Wall-clock second before which the schedule never fires. Zero means
    /// "no lower bound".
    #[serde(default)]
    pub begin: i64,
    /// Wall-clock second after which the schedule never fires. Zero means
    /// "no upper bound".
    #[serde(default)]
    pub until: i64,
    pub start: TimeOfDay,
    pub repeat: RepeatKind,
    /// `days[0]` is Sunday, matching `chrono::Weekday::num_days_from_sunday`.
    #[serde(default)]
    pub days: [bool; 7],
    /// Day interval for `RepeatKind::Daily`.
    #[serde(default = "default_interval")]
    pub interval: i64,
    /// Wall-clock second of the last successful launch. Survives restart
    /// through state persistence (spec.md §4.7).
    #[serde(default)]
    pub last_launch: i64,
}

fn default_true() -> bool {
    true
}

fn default_interval() -> i64 {
    1
}

/// Time-of-day a [`Schedule`] fires at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOfDay {
    pub hour: u32,
    pub minute: u32,
}

/// How often a [`Schedule`] repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatKind {
    Once,
    Daily,
    Weekly,
}

/// Maps `index / 10` (clamped to 0..=10) to a day-interval modifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalScale {
    pub name: String,
    /// One entry per 10% bucket of watering index, 0..=10 inclusive (11 values).
    pub by_index: [u32; 11],
}

/// Per-month (12) or per-week (52/53) watering percentage multipliers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonTable {
    pub name: String,
    pub values: Vec<u32>,
}

impl SeasonTable {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let len = self.values.len();
        if len == 12 || len == 52 || len == 53 {
            Ok(())
        } else {
            Err(ConfigError::BadSeasonTableLength {
                name: self.name.clone(),
                len,
            })
        }
    }
}

/// A feed (upstream valve/pump) declared in the `controls` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedDef {
    pub name: String,
}

/// The root configuration document (spec.md §6 "Configuration document").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SprinklerConfig {
    #[serde(default)]
    pub zones: Vec<Zone>,
    #[serde(default)]
    pub programs: Vec<Program>,
    #[serde(default)]
    pub schedules: Vec<Schedule>,
    #[serde(default)]
    pub seasons: Vec<SeasonTable>,
    #[serde(default)]
    pub intervals: Vec<IntervalScale>,
    #[serde(default)]
    pub controls: Vec<FeedDef>,
}

impl SprinklerConfig {
    /// Validate structural invariants and lazily assign schedule UUIDs.
    ///
    /// Per spec.md §9 DESIGN NOTES: UUIDs must be preserved across config
    /// reloads; a missing one is generated here and should be written back
    /// into the stored document by the caller.
    pub fn validate_and_fill(&mut self) -> Result<(), ConfigError> {
        let mut zone_names = HashSet::new();
        for zone in &self.zones {
            if !zone_names.insert(zone.name.clone()) {
                return Err(ConfigError::DuplicateName(zone.name.clone()));
            }
        }

        let mut program_names = HashSet::new();
        for program in &self.programs {
            if !program_names.insert(program.name.clone()) {
                return Err(ConfigError::DuplicateName(program.name.clone()));
            }
            for entry in &program.zones {
                if !zone_names.contains(&entry.zone_name) {
                    return Err(ConfigError::UnknownZoneReference {
                        program: program.name.clone(),
                        zone: entry.zone_name.clone(),
                    });
                }
            }
        }

        for season in &self.seasons {
            season.validate()?;
        }

        for schedule in &mut self.schedules {
            if schedule.id.is_nil() {
                schedule.id = Uuid::new_v4();
            }
            if !program_names.contains(&schedule.program_name) {
                return Err(ConfigError::UnknownProgramReference(
                    schedule.program_name.clone(),
                ));
            }
        }

        Ok(())
    }

    pub fn zone(&self, name: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.name == name)
    }

    pub fn program(&self, name: &str) -> Option<&Program> {
        self.programs.iter().find(|p| p.name == name)
    }

    pub fn interval_scale(&self, name: &str) -> Option<&IntervalScale> {
        self.intervals.iter().find(|i| i.name == name)
    }

    pub fn season_table(&self, name: &str) -> Option<&SeasonTable> {
        self.seasons.iter().find(|s| s.name == name)
    }
}

/// Contract for loading/persisting the configuration document.
///
/// The HTTP `POST /sprinkler/config` front-end and the on-disk format are
/// out of scope per spec.md §1; this trait is the seam a future front end
/// would implement against.
pub trait ConfigSource {
    fn load(&self) -> Result<SprinklerConfig, ConfigError>;
    fn save(&self, config: &SprinklerConfig) -> Result<(), ConfigError>;
}
