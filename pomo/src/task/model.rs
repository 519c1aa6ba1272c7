// Task and pomodoro data model
// Tasks form a tree through owned `subtasks`; id 0 is the synthetic forest root

use crate::error::{PomoError, Result};
use crate::task::duration::{format_duration, MAX_DURATION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Store-assigned task identifier (0 = synthetic root / not yet created)
pub type TaskId = u64;

/// Id of the ephemeral root that holds the whole forest of top-level tasks
pub const ROOT_ID: TaskId = 0;

/// Derived state of a single pomodoro
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PomodoroState {
    /// Not started yet
    Pending,
    /// Started and not yet finalized
    Running,
    /// Finished at or after its nominal end
    Completed,
    /// Stopped before its nominal end
    StoppedEarly,
}

impl PomodoroState {
    pub fn is_finished(self) -> bool {
        matches!(self, PomodoroState::Completed | PomodoroState::StoppedEarly)
    }

    /// Ordering rank used to check that state never moves backwards
    pub fn rank(self) -> u8 {
        match self {
            PomodoroState::Pending => 0,
            PomodoroState::Running => 1,
            PomodoroState::Completed | PomodoroState::StoppedEarly => 2,
        }
    }
}

impl std::fmt::Display for PomodoroState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PomodoroState::Pending => write!(f, "pending"),
            PomodoroState::Running => write!(f, "running"),
            PomodoroState::Completed => write!(f, "completed"),
            PomodoroState::StoppedEarly => write!(f, "stopped-early"),
        }
    }
}

/// One work interval of a task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pomodoro {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

impl Pomodoro {
    pub fn pending() -> Self {
        Self::default()
    }

    /// When this pomodoro is due to finish, if it has started
    pub fn nominal_end(&self, duration: Duration) -> Option<DateTime<Utc>> {
        self.start?.checked_add_signed(to_chrono(duration))
    }

    /// Compute the state from start/end against the task's interval length
    ///
    /// A pomodoro whose nominal end has passed but which has not been
    /// finalized yet still reports `Running`; the session runtime turns it
    /// into `Completed` on its next refresh.
    pub fn state(&self, duration: Duration) -> PomodoroState {
        match (self.start, self.end) {
            (None, _) => PomodoroState::Pending,
            (Some(_), None) => PomodoroState::Running,
            (Some(start), Some(end)) => match start.checked_add_signed(to_chrono(duration)) {
                Some(nominal) if end >= nominal => PomodoroState::Completed,
                _ => PomodoroState::StoppedEarly,
            },
        }
    }
}

/// A unit of work split into pomodoros, optionally with nested subtasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub id: TaskId,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Length of one pomodoro
    #[serde(default, with = "duration_secs")]
    pub duration: Duration,
    #[serde(default)]
    pub pomodoros: Vec<Pomodoro>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtasks: Vec<Task>,
}

impl Task {
    /// Build a new, not yet persisted task with `count` pending pomodoros
    pub fn new(
        message: impl Into<String>,
        tags: Vec<String>,
        duration: Duration,
        count: usize,
    ) -> Result<Self> {
        if count == 0 {
            return Err(PomoError::invalid("pomodoro count must be at least 1"));
        }
        if duration.is_zero() {
            return Err(PomoError::invalid("pomodoro duration must be positive"));
        }
        if duration > MAX_DURATION {
            return Err(PomoError::invalid(format!(
                "pomodoro duration must be at most {}",
                format_duration(MAX_DURATION)
            )));
        }
        Ok(Self {
            id: ROOT_ID,
            message: message.into(),
            tags,
            duration,
            pomodoros: (0..count).map(|_| Pomodoro::pending()).collect(),
            subtasks: Vec::new(),
        })
    }

    /// Synthetic root holding a forest of top-level tasks
    pub fn root(subtasks: Vec<Task>) -> Self {
        Self {
            id: ROOT_ID,
            message: String::new(),
            tags: Vec::new(),
            duration: Duration::ZERO,
            pomodoros: Vec::new(),
            subtasks,
        }
    }

    pub fn is_root(&self) -> bool {
        self.id == ROOT_ID
    }

    /// Identity comparison: two persisted tasks are the same task when their ids match
    pub fn same_task(&self, other: &Task) -> bool {
        !self.is_root() && self.id == other.id
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Earliest start across this task's own pomodoros
    pub fn earliest_start(&self) -> Option<DateTime<Utc>> {
        self.pomodoros.iter().filter_map(|p| p.start).min()
    }

    pub fn pomodoro_states(&self) -> Vec<PomodoroState> {
        self.pomodoros
            .iter()
            .map(|p| p.state(self.duration))
            .collect()
    }

    /// Index of the first pomodoro that has not been finished
    pub fn first_unfinished(&self) -> Option<usize> {
        self.pomodoros
            .iter()
            .position(|p| !p.state(self.duration).is_finished())
    }

    pub fn completed_count(&self) -> usize {
        self.pomodoro_states()
            .into_iter()
            .filter(|s| *s == PomodoroState::Completed)
            .count()
    }

    /// One-line summary used by flat listings
    pub fn info(&self) -> String {
        let mut line = format!(
            "[{}] [{}/{}] [{}] {}",
            self.id,
            self.completed_count(),
            self.pomodoros.len(),
            crate::task::duration::format_duration(self.duration),
            self.message
        );
        if !self.tags.is_empty() {
            line.push_str(&format!(" <{}>", self.tags.join(",")));
        }
        line
    }
}

pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// Serialize `std::time::Duration` as seconds (whole when possible)
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_u64(duration.as_secs())
        } else {
            serializer.serialize_f64(duration.as_secs_f64())
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
