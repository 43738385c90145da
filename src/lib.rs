/// Error types for the alert action
pub mod error;

/// Rows, attributes and events
pub mod events;

/// Installation file, alert-time configuration and resolved settings
pub mod config;

/// Row-to-event grouping
pub mod aggregator;

/// Gzip CSV results reader
pub mod results;

/// Submission sink and dispatcher
pub mod dispatch;

/// Batch run and process-boundary outcomes
pub mod runner;

// Re-export commonly used types
pub use error::{ConfigError, DispatchError, ResultsError, RowError, RunError};
