//! Error handling for the monitor.

use thiserror::Error;

use trainscope_api::ApiError;

/// Result type for monitor operations.
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Errors that can occur while configuring or driving a monitor.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Configuration value out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The monitor event loop has stopped.
    #[error("Monitor is no longer running")]
    Closed,

    /// Training API error.
    #[error("Training API error: {0}")]
    Api(#[from] ApiError),
}
