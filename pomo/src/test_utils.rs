//! Helpers for async session tests
//!
//! Polling with a deadline instead of fixed sleeps keeps tests that cross
//! real interval boundaries from flaking on slow machines.

use crate::session::client::SocketClient;
use crate::session::protocol::{SessionPhase, StatusSnapshot};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Retry `f` every `interval` until it returns `Ok`, panicking after `timeout`.
///
/// # Example
///
/// ```rust,ignore
/// let status = assert_eventually(
///     "session to complete",
///     Duration::from_secs(3),
///     Duration::from_millis(20),
///     || async { runtime.status().await.map_err(|e| e.to_string()) },
/// )
/// .await;
/// ```
pub async fn assert_eventually<F, Fut, T, E>(
    desc: &str,
    timeout: Duration,
    interval: Duration,
    mut f: F,
) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let start = std::time::Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let last_error = match f().await {
            Ok(value) => return value,
            Err(e) => e.to_string(),
        };

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            panic!(
                "Timeout waiting for {}\n\
                 Duration: {:?}\n\
                 Attempts: {}\n\
                 Last error: {}",
                desc, elapsed, attempt, last_error
            );
        }

        tokio::time::sleep(interval).await;
    }
}

/// Poll the status socket until the live session reports `phase`
///
/// The blocking client runs on the blocking pool so the session host can
/// keep serving from the same runtime.
pub async fn wait_for_phase(
    client: &SocketClient,
    phase: SessionPhase,
    timeout: Duration,
) -> StatusSnapshot {
    assert_eventually(
        &format!("session phase {}", phase),
        timeout,
        Duration::from_millis(20),
        || {
            let client = client.clone();
            async move {
                let status: Result<Option<StatusSnapshot>, String> =
                    match tokio::task::spawn_blocking(move || client.status()).await {
                        Ok(result) => result.map_err(|e| e.to_string()),
                        Err(e) => Err(e.to_string()),
                    };
                match status? {
                    Some(status) if status.phase == phase => Ok(status),
                    Some(status) => Err(format!("phase is {}", status.phase)),
                    None => Err("no active session".to_string()),
                }
            }
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_assert_eventually_returns_first_success() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let value = assert_eventually(
            "third attempt",
            Duration::from_secs(2),
            Duration::from_millis(10),
            move || {
                let c = Arc::clone(&counter_clone);
                async move {
                    let n = c.fetch_add(1, Ordering::SeqCst);
                    if n >= 2 {
                        Ok(n)
                    } else {
                        Err(format!("attempt {}", n))
                    }
                }
            },
        )
        .await;

        assert_eq!(value, 2);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    #[should_panic(expected = "Timeout waiting for never ready")]
    async fn test_assert_eventually_times_out() {
        assert_eventually(
            "never ready",
            Duration::from_millis(100),
            Duration::from_millis(20),
            || async { Err::<(), _>("still pending") },
        )
        .await;
    }

    #[tokio::test]
    #[should_panic(expected = "Last error: no active session")]
    async fn test_wait_for_phase_without_host() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let client = SocketClient::new(temp_dir.path().join("none.sock"));
        wait_for_phase(&client, SessionPhase::Running, Duration::from_millis(100)).await;
    }
}
