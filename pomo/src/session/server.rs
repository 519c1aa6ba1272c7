// Status socket server hosted by the process that runs the live session
// Serves one newline-framed request per connection, sequentially

use crate::error::{PomoError, Result};
use crate::session::config::Config;
use crate::session::protocol::{
    deserialize_message, serialize_message, ErrorCode, SessionRequest, SessionResponse,
    MAX_REQUEST_FRAME_SIZE,
};
use crate::session::runtime::SessionRuntime;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;

/// How long a connected client gets to deliver its request line
pub const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SocketServer {
    listener: UnixListener,
    config: Config,
}

impl SocketServer {
    /// Claim the status endpoint
    ///
    /// Fails with `EndpointUnavailable` when another session already answers
    /// on the socket or the process in the PID file is still alive. A socket
    /// file left by a dead host is treated as stale and replaced. Must be
    /// called from within a tokio runtime.
    pub fn bind(config: Config) -> Result<Self> {
        config.ensure_dirs().map_err(|e| {
            PomoError::EndpointUnavailable(format!(
                "failed to create runtime directory {}: {}",
                config.runtime_dir.display(),
                e
            ))
        })?;

        if config.socket_exists() {
            if std::os::unix::net::UnixStream::connect(&config.socket_path).is_ok() {
                return Err(PomoError::EndpointUnavailable(match config.read_pid() {
                    Some(pid) => format!("session already running (PID {})", pid),
                    None => "session already running".to_string(),
                }));
            }
            if config.is_host_running() {
                return Err(PomoError::EndpointUnavailable(format!(
                    "session host still running (PID {}) but not answering on {}",
                    config.read_pid().unwrap_or_default(),
                    config.socket_path.display()
                )));
            }
            tracing::info!(path = %config.socket_path.display(), "removing stale socket");
            config.remove_socket().map_err(|e| {
                PomoError::EndpointUnavailable(format!("failed to remove stale socket: {}", e))
            })?;
        }

        let listener = UnixListener::bind(&config.socket_path).map_err(|e| {
            PomoError::EndpointUnavailable(format!(
                "failed to bind socket {}: {}",
                config.socket_path.display(),
                e
            ))
        })?;

        // Owner-only access
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&config.socket_path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| {
                    PomoError::EndpointUnavailable(format!(
                        "failed to set socket permissions: {}",
                        e
                    ))
                })?;
        }

        if let Err(e) = config.write_pid() {
            tracing::warn!(error = %e, "failed to write PID file");
        }

        tracing::info!(path = %config.socket_path.display(), "status socket listening");

        Ok(Self { listener, config })
    }

    /// Answer requests about `runtime` until `shutdown` flips to true (or its
    /// sender is dropped)
    ///
    /// Connections are handled one at a time; the session timer runs in its
    /// own task, so a slow client only delays other clients.
    pub async fn serve(self, runtime: Arc<SessionRuntime>, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            if let Err(e) = handle_connection(&runtime, stream).await {
                                tracing::warn!(error = %e, "client connection failed");
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "accept failed");
                        }
                    }
                }

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::debug!("status socket shutting down");
    }
}

impl Drop for SocketServer {
    fn drop(&mut self) {
        self.config.remove_socket().ok();
        self.config.remove_pid().ok();
    }
}

/// Read one request, answer it, close
async fn handle_connection(runtime: &SessionRuntime, mut stream: UnixStream) -> Result<()> {
    let (reader, mut writer) = stream.split();
    // One byte past the limit is enough to tell an oversized frame apart
    let mut reader = BufReader::new(reader.take(MAX_REQUEST_FRAME_SIZE as u64 + 1));
    let mut line = Vec::new();

    let response = match tokio::time::timeout(
        REQUEST_READ_TIMEOUT,
        reader.read_until(b'\n', &mut line),
    )
    .await
    {
        Err(_) => SessionResponse::Error {
            code: ErrorCode::InvalidRequest,
            message: format!("no request received within {:?}", REQUEST_READ_TIMEOUT),
        },
        Ok(Err(e)) => {
            return Err(PomoError::ProtocolFailure(format!(
                "failed to read request: {}",
                e
            )))
        }
        Ok(Ok(0)) => {
            tracing::debug!("client closed without sending a request");
            return Ok(());
        }
        Ok(Ok(_)) if line.len() > MAX_REQUEST_FRAME_SIZE => SessionResponse::Error {
            code: ErrorCode::InvalidRequest,
            message: format!(
                "request frame too large: more than {} bytes",
                MAX_REQUEST_FRAME_SIZE
            ),
        },
        Ok(Ok(_)) => match deserialize_message::<SessionRequest>(&line) {
            Ok(request) => {
                tracing::debug!(?request, "handling request");
                handle_request(runtime, request).await
            }
            Err(e) => SessionResponse::Error {
                code: ErrorCode::InvalidRequest,
                message: format!("failed to parse request: {}", e),
            },
        },
    };

    let bytes = serialize_message(&response)?;
    let sent = async {
        writer.write_all(&bytes).await?;
        writer.flush().await
    };
    sent.await
        .map_err(|e| PomoError::ProtocolFailure(format!("failed to send response: {}", e)))?;
    writer.shutdown().await.ok();

    Ok(())
}

async fn handle_request(runtime: &SessionRuntime, request: SessionRequest) -> SessionResponse {
    let result = match request {
        SessionRequest::Status => runtime
            .status()
            .await
            .map(|status| SessionResponse::Status { status }),
        SessionRequest::Stop => runtime
            .stop()
            .await
            .map(|status| SessionResponse::Stopped { status }),
        SessionRequest::Ping => Ok(SessionResponse::Pong),
    };

    result.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "request failed");
        SessionResponse::Error {
            code: e.code(),
            message: e.to_string(),
        }
    })
}
