//! Logging setup and metric names.

pub mod logging;
pub mod metrics;

pub use self::logging::init_logging;
pub use self::metrics::describe_metrics;
