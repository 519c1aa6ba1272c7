// Status socket client used by the CLI
// Talks to whichever process hosts the live session; absence of a host is not an error

use crate::error::{PomoError, Result};
use crate::session::config::Config;
use crate::session::protocol::{
    deserialize_message, serialize_message, ErrorCode, SessionRequest, SessionResponse,
    StatusSnapshot, MAX_RESPONSE_FRAME_SIZE,
};
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How long to wait on a host before treating it as gone
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct SocketClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl SocketClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: DEFAULT_CLIENT_TIMEOUT,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.socket_path)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Snapshot of the live session, `None` when no session is running
    pub fn status(&self) -> Result<Option<StatusSnapshot>> {
        match self.send(&SessionRequest::Status)? {
            None => Ok(None),
            Some(SessionResponse::Status { status }) => Ok(Some(status)),
            Some(other) => Err(unexpected(other)),
        }
    }

    /// Ask the live session to stop, `None` when no session is running
    pub fn stop(&self) -> Result<Option<StatusSnapshot>> {
        match self.send(&SessionRequest::Stop)? {
            None => Ok(None),
            Some(SessionResponse::Stopped { status }) => Ok(Some(status)),
            Some(other) => Err(unexpected(other)),
        }
    }

    /// True when a host answered
    pub fn ping(&self) -> Result<bool> {
        match self.send(&SessionRequest::Ping)? {
            None => Ok(false),
            Some(SessionResponse::Pong) => Ok(true),
            Some(other) => Err(unexpected(other)),
        }
    }

    /// Send one request and read its response
    ///
    /// Returns `Ok(None)` when nothing is listening or the host does not
    /// answer within the timeout. Error responses are converted to `PomoError`.
    pub fn send(&self, request: &SessionRequest) -> Result<Option<SessionResponse>> {
        let mut stream = match UnixStream::connect(&self.socket_path) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::debug!(
                    path = %self.socket_path.display(),
                    error = %e,
                    "no session endpoint"
                );
                return Ok(None);
            }
        };

        stream
            .set_read_timeout(Some(self.timeout))
            .and_then(|_| stream.set_write_timeout(Some(self.timeout)))
            .map_err(|e| PomoError::EndpointUnavailable(format!("failed to set timeout: {}", e)))?;

        let bytes = serialize_message(request)?;
        if let Err(e) = stream.write_all(&bytes).and_then(|_| stream.flush()) {
            if is_unavailable(&e) {
                tracing::warn!(error = %e, "session host did not accept the request");
                return Ok(None);
            }
            return Err(PomoError::ProtocolFailure(format!(
                "failed to send request: {}",
                e
            )));
        }

        match read_response(&mut stream) {
            Ok(response) => response_to_result(response).map(Some),
            Err(ReadError::Unavailable(e)) => {
                tracing::warn!(error = %e, "session host did not answer in time");
                Ok(None)
            }
            Err(ReadError::Protocol(e)) => Err(e),
        }
    }
}

enum ReadError {
    Unavailable(std::io::Error),
    Protocol(PomoError),
}

fn is_unavailable(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::WouldBlock
            | ErrorKind::TimedOut
            | ErrorKind::ConnectionRefused
            | ErrorKind::NotFound
    )
}

/// Read a single response line, enforcing the frame size limit
fn read_response(stream: &mut UnixStream) -> std::result::Result<SessionResponse, ReadError> {
    let mut reader = BufReader::new(stream.take(MAX_RESPONSE_FRAME_SIZE as u64 + 1));
    let mut line = Vec::new();

    match reader.read_until(b'\n', &mut line) {
        Ok(0) => {
            return Err(ReadError::Protocol(PomoError::ProtocolFailure(
                "session host closed connection without a response".to_string(),
            )))
        }
        Ok(_) => {}
        Err(e) if is_unavailable(&e) => return Err(ReadError::Unavailable(e)),
        Err(e) => {
            return Err(ReadError::Protocol(PomoError::ProtocolFailure(format!(
                "failed to read response: {}",
                e
            ))))
        }
    }

    if line.len() > MAX_RESPONSE_FRAME_SIZE {
        return Err(ReadError::Protocol(PomoError::ProtocolFailure(format!(
            "response frame too large: more than {} bytes",
            MAX_RESPONSE_FRAME_SIZE
        ))));
    }
    if line.last() != Some(&b'\n') {
        return Err(ReadError::Protocol(PomoError::ProtocolFailure(
            "truncated response".to_string(),
        )));
    }

    deserialize_message(&line).map_err(|e| {
        ReadError::Protocol(PomoError::ProtocolFailure(format!(
            "failed to parse response: {}",
            e
        )))
    })
}

fn response_to_result(response: SessionResponse) -> Result<SessionResponse> {
    match response {
        SessionResponse::Error { code, message } => Err(match code {
            ErrorCode::SessionFailed => PomoError::SessionFailed(message),
            ErrorCode::PersistenceFailure => PomoError::PersistenceFailure(message),
            ErrorCode::InvalidRequest | ErrorCode::Internal => {
                PomoError::ProtocolFailure(format!("session host rejected request: {}", message))
            }
        }),
        other => Ok(other),
    }
}

fn unexpected(response: SessionResponse) -> PomoError {
    PomoError::ProtocolFailure(format!("unexpected response: {:?}", response))
}
