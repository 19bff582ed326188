//! Coordination Layer
//!
//! Scheduling and the shared flags that keep overlapping jobs apart:
//! - Interval scheduler with fire-and-forget callbacks
//! - Training gate that suspends trading during retrains
//! - Per-key in-flight guards (one trade per pair, one retrain at a time)
//! - OS signal handling for shutdown

pub mod in_flight;
pub mod scheduler;
pub mod shutdown;
pub mod training_gate;

pub use in_flight::{InFlightRegistry, InFlightTicket};
pub use scheduler::{Every, IntervalScheduler, ScheduleHandle, TimeUnit};
pub use shutdown::{wait_for_shutdown_signal, ShutdownSignal};
pub use training_gate::{RetrainScope, TrainingGate};
