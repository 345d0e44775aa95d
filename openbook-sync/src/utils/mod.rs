//! Utility modules for openbook-sync

pub mod pool_monitor;
pub mod retry;

pub use pool_monitor::{begin_monitored, MonitoredTransaction};
pub use retry::{retry_transient, BackoffPolicy};
