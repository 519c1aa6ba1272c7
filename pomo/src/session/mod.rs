// Live session support: runtime state machine, status socket and task storage
// Shared between the session host and the query-only CLI commands

pub mod clock;
pub mod config;
pub mod persistence;
pub mod protocol;
pub mod runtime;

// Status socket (Unix only for now)
#[cfg(unix)]
pub mod client;
#[cfg(unix)]
pub mod server;
