// Error kinds shared by the store, the session runtime and the status protocol

use crate::session::protocol::ErrorCode;
use crate::task::TaskId;
use thiserror::Error;

pub type Result<T, E = PomoError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PomoError {
    /// No task with this id exists in the store
    #[error("task {0} not found")]
    NotFound(TaskId),
    /// Malformed duration, filter, pomodoro count or task shape
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The status socket is already bound by another session, or unreachable
    #[error("status endpoint unavailable: {0}")]
    EndpointUnavailable(String),
    /// The task store failed to read or write
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),
    /// Malformed or truncated message on the status socket
    #[error("protocol failure: {0}")]
    ProtocolFailure(String),
    /// The live session hit a fatal error and no longer accepts requests
    #[error("session failed: {0}")]
    SessionFailed(String),
}

impl PomoError {
    pub fn invalid(message: impl Into<String>) -> Self {
        PomoError::InvalidArgument(message.into())
    }

    /// Wrap a store error, keeping the whole context chain in the message
    pub fn persistence(err: anyhow::Error) -> Self {
        PomoError::PersistenceFailure(format!("{:#}", err))
    }

    /// Wire code used when this error is reported to a status client
    pub fn code(&self) -> ErrorCode {
        match self {
            PomoError::NotFound(_) | PomoError::InvalidArgument(_) => ErrorCode::InvalidRequest,
            PomoError::PersistenceFailure(_) => ErrorCode::PersistenceFailure,
            PomoError::SessionFailed(_) => ErrorCode::SessionFailed,
            PomoError::EndpointUnavailable(_) | PomoError::ProtocolFailure(_) => {
                ErrorCode::Internal
            }
        }
    }
}

impl From<serde_json::Error> for PomoError {
    fn from(err: serde_json::Error) -> Self {
        PomoError::ProtocolFailure(err.to_string())
    }
}
