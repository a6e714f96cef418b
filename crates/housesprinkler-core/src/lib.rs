//! # HouseSprinkler Core Library
//!
//! Core business logic for a headless, distributed irrigation controller.
//! It implements a CLI-first philosophy where all operations are available
//! through a standalone CLI binary; this crate owns no server front end.
//!
//! ## Architecture
//!
//! - **Zone queue**: a wall-clock-based pulse/pause scheduler that requires
//!   the caller to periodically invoke `tick()` for progress
//! - **Control plane**: discovers and actuates zone/feed relays over HTTP
//! - **Watering-index aggregator**: discovers and polls watering-index
//!   providers, admitting the highest-priority fresh report
//! - **Program runner / schedule evaluator**: turn calendar rules into
//!   queued zone activations, scaled by season and watering index
//! - **Persistence**: a local JSON snapshot with an optional authoritative
//!   remote depot
//!
//! ## Key Components
//!
//! - [`SprinklerCore`]: the aggregate root; owns one instance of every
//!   subsystem and drives them forward one tick at a time
//! - [`ZoneQueue`]: zone pulse/pause scheduling state machine
//! - [`ControlPlane`]: control-point discovery and actuation
//! - [`IndexAggregator`]: watering-index discovery and admission

pub mod config;
pub mod control_plane;
pub mod discovery;
pub mod error;
pub mod index;
pub mod interval_season;
pub mod persistence;
pub mod program;
pub mod schedule;
pub mod sprinkler;
pub mod zone_queue;

pub use config::{
    ConfigSource, ControlKind, ControlState, FeedDef, IntervalScale, Program, ProgramZoneShare,
    RepeatKind, Schedule, SeasonTable, ShareUnit, SprinklerConfig, TimeOfDay, Zone, ZoneStatus,
};
pub use control_plane::{ControlPlane, ControlPoint};
pub use discovery::{Cadence, EmptyRegistry, ServiceRegistry};
pub use error::{ConfigError, CoreError, PersistenceError, Result, ValidationError};
pub use index::{IndexAggregator, IndexListener, IndexValue};
pub use interval_season::{interval_for_index, season_multiplier};
pub use persistence::{PersistenceManager, RemoteDepot};
pub use program::ProgramRunner;
pub use schedule::ScheduleEvaluator;
pub use sprinkler::SprinklerCore;
pub use zone_queue::{Activation, QueueEntry, ZoneQueue};
