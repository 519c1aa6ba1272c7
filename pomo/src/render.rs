// Text output for the CLI: task trees, history lines and live status

use crate::session::protocol::{SessionPhase, StatusSnapshot};
use crate::session::runtime::SessionEvent;
use crate::task::{PomodoroState, Task};
use chrono::{DateTime, Local, Utc};
use std::fmt;

/// Shown when no process hosts a session
pub const NO_ACTIVE_SESSION: &str = "no active session";

/// Indented tree view of a task and its subtasks
///
/// The synthetic root is not printed; its subtasks become the top level.
pub struct Tree<'a> {
    pub task: &'a Task,
    /// Print one line per pomodoro under each task
    pub show_pomodoros: bool,
}

impl<'a> Tree<'a> {
    pub fn new(task: &'a Task) -> Self {
        Self {
            task,
            show_pomodoros: false,
        }
    }

    pub fn with_pomodoros(mut self, show: bool) -> Self {
        self.show_pomodoros = show;
        self
    }

    fn write_node(&self, f: &mut fmt::Formatter<'_>, task: &Task, prefix: &str) -> fmt::Result {
        let mut children: Vec<Line<'_>> = Vec::new();
        if self.show_pomodoros {
            children.extend((0..task.pomodoros.len()).map(|i| Line::Pomodoro(task, i)));
        }
        children.extend(task.subtasks.iter().map(Line::Task));

        let count = children.len();
        for (i, child) in children.into_iter().enumerate() {
            let last = i + 1 == count;
            let (branch, indent) = if last {
                ("└── ", "    ")
            } else {
                ("├── ", "│   ")
            };
            match child {
                Line::Pomodoro(task, index) => {
                    writeln!(f, "{}{}{}", prefix, branch, pomodoro_line(task, index))?;
                }
                Line::Task(sub) => {
                    writeln!(f, "{}{}{}", prefix, branch, task_line(sub))?;
                    self.write_node(f, sub, &format!("{}{}", prefix, indent))?;
                }
            }
        }
        Ok(())
    }
}

enum Line<'a> {
    Pomodoro(&'a Task, usize),
    Task(&'a Task),
}

impl fmt::Display for Tree<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.task.is_root() {
            for top in &self.task.subtasks {
                writeln!(f, "{}", task_line(top))?;
                self.write_node(f, top, "")?;
            }
            return Ok(());
        }

        writeln!(f, "{}", task_line(self.task))?;
        self.write_node(f, self.task, "")
    }
}

/// Glyph for one pomodoro
pub fn glyph(state: PomodoroState) -> char {
    match state {
        PomodoroState::Pending => '○',
        PomodoroState::Running => '◐',
        PomodoroState::Completed => '●',
        PomodoroState::StoppedEarly => '✗',
    }
}

/// Task summary followed by its pomodoro glyphs
pub fn task_line(task: &Task) -> String {
    let glyphs: String = task.pomodoro_states().into_iter().map(glyph).collect();
    if glyphs.is_empty() {
        task.info()
    } else {
        format!("{} {}", task.info(), glyphs)
    }
}

fn pomodoro_line(task: &Task, index: usize) -> String {
    let pomodoro = &task.pomodoros[index];
    let state = pomodoro.state(task.duration);
    let mut line = format!("{} #{} {}", glyph(state), index + 1, state);
    if let Some(start) = pomodoro.start {
        line.push_str(&format!(" {}", local_time(start)));
        if let Some(end) = pomodoro.end {
            line.push_str(&format!(" - {}", local_clock(end)));
        }
    }
    line
}

/// History line for `list`: start time, then the task summary
pub fn history_line(task: &Task) -> String {
    let started = task
        .earliest_start()
        .map(local_time)
        .unwrap_or_else(|| "not started".to_string());
    format!("{:<16} {}", started, task_line(task))
}

/// One line describing the live session, or the empty status
pub fn status_line(status: Option<&StatusSnapshot>) -> String {
    let Some(status) = status else {
        return NO_ACTIVE_SESSION.to_string();
    };

    let total = status.pomodoros.len();
    let done = status.completed_count();
    let head = format!("[{}] {}", status.task_id, status.message);
    let glyphs: String = status.pomodoros.iter().map(|p| glyph(p.state)).collect();

    let detail = match status.phase {
        SessionPhase::Idle => format!("idle, {}/{} completed", done, total),
        SessionPhase::Running => {
            let index = status.active_index.map(|i| i + 1).unwrap_or(0);
            match status.remaining_secs {
                Some(secs) => format!(
                    "pomodoro {}/{} running, {} left",
                    index,
                    total,
                    format_remaining(secs)
                ),
                None => format!("pomodoro {}/{} running", index, total),
            }
        }
        SessionPhase::Completed => format!("completed {}/{}", done, total),
        SessionPhase::Stopped => match status.active_index {
            Some(i) => format!(
                "stopped during pomodoro {}/{}, {}/{} completed",
                i + 1,
                total,
                done,
                total
            ),
            None => format!("stopped, {}/{} completed", done, total),
        },
    };

    format!("{} {} {}", head, glyphs, detail)
}

/// Progress line printed by the session host for each transition
pub fn event_line(event: &SessionEvent, total: usize) -> String {
    match event {
        SessionEvent::Started { index } => format!("pomodoro {}/{} started", index + 1, total),
        SessionEvent::IntervalCompleted { index } => {
            format!("pomodoro {}/{} completed", index + 1, total)
        }
        SessionEvent::Completed => format!("all {} pomodoros completed", total),
        SessionEvent::Stopped { index } => {
            format!("stopped during pomodoro {}/{}", index + 1, total)
        }
    }
}

/// `mm:ss`, or `h:mm:ss` past an hour
pub fn format_remaining(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{:02}:{:02}", m, s)
    }
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn local_clock(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}
