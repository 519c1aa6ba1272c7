// Task filters parsed from CLI arguments
// Filters are combined with logical AND by `functional::find_many`

use super::model::{Task, TaskId};
use crate::error::PomoError;
use std::str::FromStr;

/// Predicate over a task's own fields (never its subtasks)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Task carries this exact tag
    Tag(String),
    /// Task has this id
    Id(TaskId),
    /// Case-insensitive substring of the task message
    Message(String),
}

impl Filter {
    pub fn matches(&self, task: &Task) -> bool {
        match self {
            Filter::Tag(tag) => task.has_tag(tag),
            Filter::Id(id) => task.id == *id,
            Filter::Message(needle) => task
                .message
                .to_lowercase()
                .contains(&needle.to_lowercase()),
        }
    }

    /// Parse every argument, failing on the first malformed one
    pub fn parse_all<S: AsRef<str>>(args: &[S]) -> Result<Vec<Filter>, PomoError> {
        args.iter().map(|a| a.as_ref().parse()).collect()
    }
}

impl FromStr for Filter {
    type Err = PomoError;

    /// `tag=x`, `id=3`, `message=foo` or a bare word (message substring)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PomoError::invalid("empty filter"));
        }

        let Some((key, value)) = s.split_once('=') else {
            return Ok(Filter::Message(s.to_string()));
        };

        if value.is_empty() {
            return Err(PomoError::invalid(format!("filter '{}' has no value", s)));
        }

        match key {
            "tag" | "t" => Ok(Filter::Tag(value.to_string())),
            "message" | "msg" | "m" => Ok(Filter::Message(value.to_string())),
            "id" => value
                .parse()
                .map(Filter::Id)
                .map_err(|_| PomoError::invalid(format!("filter '{}': id must be a number", s))),
            other => Err(PomoError::invalid(format!("unknown filter key '{}'", other))),
        }
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Filter::Tag(tag) => write!(f, "tag={}", tag),
            Filter::Id(id) => write!(f, "id={}", id),
            Filter::Message(message) => write!(f, "message={}", message),
        }
    }
}
