// Where pomo keeps its files, and the user settings file
//
// Two directories: a runtime dir for the status socket and PID file, and a
// state dir for tasks.json, its lock and settings.json.

use crate::error::{PomoError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default length of one pomodoro
pub const DEFAULT_DURATION: &str = "25m";

/// Default number of pomodoros per task
pub const DEFAULT_POMODOROS: usize = 4;

/// Overrides both the runtime and the state directory
pub const DIR_ENV: &str = "POMO_DIR";

const SOCKET_NAME: &str = "pomo.sock";
const PID_NAME: &str = "pomo.pid";

/// Resolved file locations
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Socket and PID file; owner-only
    pub runtime_dir: PathBuf,
    /// tasks.json, tasks.lock and settings.json
    pub state_dir: PathBuf,
    pub socket_path: PathBuf,
    pub pid_file: PathBuf,
}

impl Config {
    /// Default locations: socket under the runtime dir, state under `~/.pomo`
    pub fn default_paths() -> Self {
        Self::split(runtime_base(), state_base())
    }

    /// Default locations unless `POMO_DIR` names a single directory for everything
    pub fn from_env() -> Self {
        match std::env::var_os(DIR_ENV) {
            Some(dir) if !dir.is_empty() => Self::in_dir(PathBuf::from(dir)),
            _ => Self::default_paths(),
        }
    }

    /// Keep every file under a single directory
    pub fn in_dir(base: PathBuf) -> Self {
        Self::split(base.clone(), base)
    }

    fn split(runtime_dir: PathBuf, state_dir: PathBuf) -> Self {
        Self {
            socket_path: runtime_dir.join(SOCKET_NAME),
            pid_file: runtime_dir.join(PID_NAME),
            runtime_dir,
            state_dir,
        }
    }

    pub fn tasks_file(&self) -> PathBuf {
        self.state_dir.join("tasks.json")
    }

    /// Lock file guarding read-modify-write cycles on tasks.json
    pub fn lock_file(&self) -> PathBuf {
        self.state_dir.join("tasks.lock")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.state_dir.join("settings.json")
    }

    /// Create the state dir, and the runtime dir as owner-only (0700)
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.state_dir, &self.runtime_dir] {
            std::fs::create_dir_all(dir)?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.runtime_dir, std::fs::Permissions::from_mode(0o700))?;
        }

        Ok(())
    }

    /// Record this process as the session host
    pub fn write_pid(&self) -> std::io::Result<()> {
        self.ensure_dirs()?;
        std::fs::write(&self.pid_file, format!("{}\n", std::process::id()))
    }

    pub fn read_pid(&self) -> Option<u32> {
        let contents = std::fs::read_to_string(&self.pid_file).ok()?;
        contents.trim().parse().ok()
    }

    pub fn remove_pid(&self) -> std::io::Result<()> {
        remove_if_exists(&self.pid_file)
    }

    pub fn remove_socket(&self) -> std::io::Result<()> {
        remove_if_exists(&self.socket_path)
    }

    /// A socket file exists; whether anyone listens on it is another matter
    pub fn socket_exists(&self) -> bool {
        self.socket_path.exists()
    }

    /// The process named in the PID file is alive
    #[cfg(unix)]
    pub fn is_host_running(&self) -> bool {
        match self.read_pid() {
            // Signal 0 performs the permission and existence checks only
            Some(pid) => unsafe { libc::kill(pid as libc::pid_t, 0) == 0 },
            None => false,
        }
    }

    #[cfg(not(unix))]
    pub fn is_host_running(&self) -> bool {
        self.socket_exists()
    }

    /// Load user settings, falling back to defaults when the file is absent
    pub fn load_settings(&self) -> Result<Settings> {
        Settings::load(&self.settings_file())
    }
}

/// `$XDG_RUNTIME_DIR/pomo` on Linux when set, otherwise the state dir
fn runtime_base() -> PathBuf {
    #[cfg(target_os = "linux")]
    if let Some(dir) = std::env::var_os("XDG_RUNTIME_DIR").filter(|d| !d.is_empty()) {
        return PathBuf::from(dir).join("pomo");
    }
    state_base()
}

/// `~/.pomo`, or `/tmp/pomo` without a home directory
fn state_base() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".pomo"))
        .unwrap_or_else(|| PathBuf::from("/tmp/pomo"))
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// User-editable defaults stored in settings.json
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default pomodoro length, e.g. "25m"
    pub default_duration: String,
    pub default_pomodoros: usize,
    /// Print JSON instead of text by default
    pub json: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_duration: DEFAULT_DURATION.to_string(),
            default_pomodoros: DEFAULT_POMODOROS,
            json: false,
        }
    }
}

impl Settings {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(PomoError::invalid(format!(
                    "failed to read settings {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_json::from_str(&contents).map_err(|e| {
            PomoError::invalid(format!("failed to parse settings {}: {}", path.display(), e))
        })
    }
}
