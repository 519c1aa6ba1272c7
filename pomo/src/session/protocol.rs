// Session protocol - shared structs for session host <-> CLI communication
// Uses newline-framed JSON messages over a Unix socket, one request per connection

use crate::task::{PomodoroState, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum size of a single request line (64KB)
pub const MAX_REQUEST_FRAME_SIZE: usize = 64 * 1024;

/// Maximum size of a single response line (1MB)
pub const MAX_RESPONSE_FRAME_SIZE: usize = 1024 * 1024;

/// Lifecycle phase of the live session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SessionPhase {
    /// Constructed, no pomodoro started yet
    Idle,
    /// A pomodoro is running
    Running,
    /// Every pomodoro has been consumed
    Completed,
    /// Stopped by request before the last pomodoro finished
    Stopped,
}

impl SessionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionPhase::Completed | SessionPhase::Stopped)
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Idle => write!(f, "Idle"),
            SessionPhase::Running => write!(f, "Running"),
            SessionPhase::Completed => write!(f, "Completed"),
            SessionPhase::Stopped => write!(f, "Stopped"),
        }
    }
}

impl std::str::FromStr for SessionPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Idle" => Ok(SessionPhase::Idle),
            "Running" => Ok(SessionPhase::Running),
            "Completed" => Ok(SessionPhase::Completed),
            "Stopped" => Ok(SessionPhase::Stopped),
            _ => Err(format!("Unknown session phase: {}", s)),
        }
    }
}

/// One pomodoro as reported to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PomodoroStatus {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    pub state: PomodoroState,
}

/// Point-in-time view of the live session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub task_id: TaskId,
    pub message: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Length of one pomodoro in milliseconds
    pub duration_ms: u64,
    pub phase: SessionPhase,
    /// Pomodoro currently running (or the one that was stopped)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_index: Option<usize>,
    /// Whole seconds left in the running pomodoro
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_secs: Option<u64>,
    pub pomodoros: Vec<PomodoroStatus>,
    pub taken_at: DateTime<Utc>,
}

impl StatusSnapshot {
    pub fn active(&self) -> Option<&PomodoroStatus> {
        self.active_index.and_then(|i| self.pomodoros.get(i))
    }

    pub fn completed_count(&self) -> usize {
        self.pomodoros
            .iter()
            .filter(|p| p.state == PomodoroState::Completed)
            .count()
    }
}

// ============================================================================
// Client -> Host requests
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionRequest {
    /// Snapshot of the live session
    Status,
    /// Stop the running pomodoro and end the session
    Stop,
    /// Check that a session host is listening
    Ping,
}

// ============================================================================
// Host -> Client responses
// ============================================================================

/// Machine-readable error category carried by `SessionResponse::Error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed, oversized or unknown request
    InvalidRequest,
    /// The session hit a fatal error earlier
    SessionFailed,
    /// Persisting the transition failed
    PersistenceFailure,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionResponse {
    Status { status: StatusSnapshot },
    /// Stop was applied (or the session was already terminal)
    Stopped { status: StatusSnapshot },
    Pong,
    Error { code: ErrorCode, message: String },
}

// ============================================================================
// Helpers for message framing
// ============================================================================

/// Serialize a message to JSON bytes with newline delimiter
pub fn serialize_message<T: Serialize>(msg: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec(msg)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Deserialize a message from JSON bytes (strips trailing newline)
pub fn deserialize_message<T: for<'de> Deserialize<'de>>(
    bytes: &[u8],
) -> Result<T, serde_json::Error> {
    let trimmed = if bytes.last() == Some(&b'\n') {
        &bytes[..bytes.len() - 1]
    } else {
        bytes
    };
    serde_json::from_slice(trimmed)
}
