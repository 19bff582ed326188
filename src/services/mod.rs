pub mod balance_monitor;
pub mod health;

pub use balance_monitor::{BalanceMonitor, BalanceReport};
pub use health::{router, ApiServer, HealthResponse, ManualTriggers, TriggerResponse};
