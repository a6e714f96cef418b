//! Core error types for housesprinkler-core.
//!
//! This module defines the error hierarchy from spec.md §7 using thiserror:
//! `ConfigInvalid`, `UnknownControl`, `ProviderUnreachable`,
//! `ProviderBadPayload`, `OverflowInStatusBuffer`.

use thiserror::Error;

/// Core error type for housesprinkler-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed JSON or shape mismatch on configuration load/save.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// `start`/`cancel` referenced a control point that was never declared.
    /// Per spec.md §7 this is logged but the request still returns success.
    #[error("unknown control point: {0}")]
    UnknownControl(String),

    /// Discovery or actuation HTTP request failed outright.
    #[error("provider unreachable: {provider}: {message}")]
    ProviderUnreachable { provider: String, message: String },

    /// Provider responded with a non-200 status or an unparseable body.
    #[error("provider returned a bad payload: {provider}: {message}")]
    ProviderBadPayload { provider: String, message: String },

    /// Status serialization exceeded the configured buffer.
    #[error("status buffer overflow: needed {needed} bytes, had {capacity}")]
    OverflowInStatusBuffer { needed: usize, capacity: usize },

    /// State persistence read/write failure.
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// A value failed a structural invariant check.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Generic IO failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic JSON failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration from {path}: {message}")]
    LoadFailed { path: String, message: String },

    #[error("failed to save configuration to {path}: {message}")]
    SaveFailed { path: String, message: String },

    #[error("invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Open Question (b): a season table's array length must be 12 (monthly)
    /// or 52/53 (weekly); anything else is rejected.
    #[error("season table '{name}' has length {len}, expected 12 or 52/53")]
    BadSeasonTableLength { name: String, len: usize },

    #[error("duplicate name '{0}' in configuration document")]
    DuplicateName(String),

    #[error("program '{program}' references unknown zone '{zone}'")]
    UnknownZoneReference { program: String, zone: String },

    #[error("schedule references unknown program '{0}'")]
    UnknownProgramReference(String),
}

/// State-persistence-specific errors (spec.md §4.7).
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("failed to write local state file {path}: {message}")]
    LocalWriteFailed { path: String, message: String },

    #[error("failed to read local state file {path}: {message}")]
    LocalReadFailed { path: String, message: String },

    #[error("remote depot rejected the snapshot: {0}")]
    DepotRejected(String),

    #[error("giving up on state flush after repeated failures ({elapsed:?} elapsed)")]
    FlushAbandoned { elapsed: std::time::Duration },
}

/// Validation errors for invariant checks.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    #[error("empty collection: {0}")]
    EmptyCollection(String),
}

/// Result type alias for `CoreError`.
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
