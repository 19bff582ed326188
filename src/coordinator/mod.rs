//! Orchestrator and daemon bootstrap
//!
//! Wires the capabilities built from configuration into the scheduled jobs
//! and owns their schedules for the life of the process.

pub mod bootstrap;
pub mod orchestrator;
pub mod state;

pub use bootstrap::{build_capabilities, build_orchestrator, run_daemon};
pub use orchestrator::{Capabilities, Orchestrator};
pub use state::{CycleOutcome, CycleReport};
