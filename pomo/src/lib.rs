// pomo: pomodoro task tracker
//
// The library is shared by the `pomo` binary and the integration tests:
// - `task`: the task tree model and the filter/sort/traversal utilities
// - `session`: the live session runtime, its status socket and task storage
// - `render`: text output

pub mod error;
pub mod logging;
pub mod render;
pub mod session;
pub mod task;

// Async polling helpers for session tests
pub mod test_utils;

pub use error::{PomoError, Result};
