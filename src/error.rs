use thiserror::Error;

use crate::types::DataId;

/// Failures reported by the sensor stream collaborator
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Sensor not connected")]
    NotConnected,

    #[error("Device unavailable: {0}")]
    Unavailable(String),

    #[error("Configuration rejected: {0}")]
    ConfigRejected(String),

    #[error("End of packet stream")]
    EndOfStream,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A packet that could not be turned into a sample
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifyError {
    #[error("{} packet missing field '{field}'", .subsystem.name())]
    MissingField {
        subsystem: DataId,
        field: &'static str,
    },
}

/// Session controller error types
#[derive(Error, Debug)]
pub enum SessionError {
    /// Connect, configure, start or mid-stream collaborator failure. Fatal to the session.
    #[error("Connection failure during {operation}: {source}")]
    ConnectionFailure {
        operation: &'static str,
        #[source]
        source: StreamError,
    },

    #[error("Session already used")]
    AlreadyUsed,
}

impl SessionError {
    pub fn connection(operation: &'static str, source: StreamError) -> Self {
        SessionError::ConnectionFailure { operation, source }
    }
}

pub type StreamResult<T> = Result<T, StreamError>;
pub type SessionResult<T> = Result<T, SessionError>;
