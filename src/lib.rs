pub mod cli;
pub mod config;
pub mod coordination;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod exchange;
pub mod market;
pub mod ml;
pub mod persistence;
pub mod saga;
pub mod services;
pub mod strategy;
pub mod wallet;

pub use config::AppConfig;
pub use coordination::{InFlightRegistry, IntervalScheduler, ShutdownSignal, TrainingGate};
pub use coordinator::{Capabilities, CycleOutcome, CycleReport, Orchestrator};
pub use error::{Result, SwapdError};
pub use persistence::{DatasetStore, LocalObjectStore, MemoryObjectStore, ObjectStore};
pub use saga::{ExchangeSaga, SagaOutcome};
pub use strategy::{DecisionEngine, PrecedencePolicy};
