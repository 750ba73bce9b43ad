//! Server-level error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] quarry_protocol::ProtocolError),

    #[error("event system error: {0}")]
    Event(#[from] quarry_events::EventError),

    #[error("task scheduler error: {0}")]
    Task(#[from] quarry_tasks::TaskError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("server is not running")]
    NotRunning,
}
