pub mod backoff;
pub mod runner;

pub use backoff::{ErrorBudget, RetryConfig};
pub use runner::{Collector, CollectorError, CollectorReport, CollectorSettings};
