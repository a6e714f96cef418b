pub mod config;
pub mod program;
pub mod schedule;
pub mod state;
pub mod zone;
