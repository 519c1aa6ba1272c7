use pomo_lib::error::Result;
use pomo_lib::session::client::SocketClient;
use pomo_lib::session::clock::Clock;
use pomo_lib::session::config::Config;
use pomo_lib::session::persistence::{JsonTaskStore, TaskStore};
use pomo_lib::session::protocol::StatusSnapshot;
use pomo_lib::session::runtime::SessionRuntime;
use pomo_lib::session::server::SocketServer;
use pomo_lib::task::Task;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A session host running in the test process against a temp directory.
///
/// The server is shut down when the host is dropped; call `shutdown` to wait
/// for the socket to be removed.
pub struct TestHost {
    pub dir: TempDir,
    pub config: Config,
    pub store: Arc<JsonTaskStore>,
    pub runtime: Arc<SessionRuntime>,
    shutdown_tx: watch::Sender<bool>,
    server: Option<JoinHandle<()>>,
}

impl TestHost {
    /// Persist a new task, bind the socket and serve it (the session stays Idle)
    pub async fn bind(duration: Duration, pomodoros: usize, clock: Arc<dyn Clock>) -> Self {
        let dir = TempDir::new().unwrap();
        let config = Config::in_dir(dir.path().to_path_buf());
        let store = Arc::new(JsonTaskStore::init(&config).unwrap());

        let mut task = Task::new("write report", vec!["work".to_string()], duration, pomodoros)
            .unwrap();
        task.id = store.write_task(&task).unwrap();

        let runtime = Arc::new(SessionRuntime::new(task, store.clone(), clock).unwrap());
        let server = SocketServer::bind(config.clone()).unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = tokio::spawn(server.serve(Arc::clone(&runtime), shutdown_rx));

        Self {
            dir,
            config,
            store,
            runtime,
            shutdown_tx,
            server: Some(server),
        }
    }

    pub fn client(&self) -> SocketClient {
        SocketClient::from_config(&self.config).with_timeout(Duration::from_secs(2))
    }

    /// `status` through the socket, off the async worker
    pub async fn remote_status(&self) -> Result<Option<StatusSnapshot>> {
        let client = self.client();
        tokio::task::spawn_blocking(move || client.status())
            .await
            .unwrap()
    }

    /// `stop` through the socket, off the async worker
    pub async fn remote_stop(&self) -> Result<Option<StatusSnapshot>> {
        let client = self.client();
        tokio::task::spawn_blocking(move || client.stop())
            .await
            .unwrap()
    }

    pub async fn shutdown(mut self) -> (TempDir, Config) {
        let _ = self.shutdown_tx.send(true);
        if let Some(server) = self.server.take() {
            server.await.unwrap();
        }
        let dir = std::mem::replace(&mut self.dir, TempDir::new().unwrap());
        (dir, self.config.clone())
    }
}

impl Drop for TestHost {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}
