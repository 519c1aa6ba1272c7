// Session runtime: drives one task's pomodoros against wall-clock time
//
// - Owns the live Task behind a single mutex shared by the timer loop and the
//   status server
// - Derives progress from stored start timestamps, never from counted ticks
// - Persists every finalizing transition before anyone can observe it
// - Broadcasts transitions to local subscribers (the host's progress output)

use crate::error::{PomoError, Result};
use crate::session::clock::Clock;
use crate::session::persistence::TaskStore;
use crate::session::protocol::{PomodoroStatus, SessionPhase, StatusSnapshot};
use crate::task::duration::{format_duration, MAX_DURATION};
use crate::task::{PomodoroState, Task};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, Notify};

/// Longest the timer loop sleeps between checks, so suspension or clock
/// jumps are noticed within a second
const MAX_TIMER_WAIT: Duration = Duration::from_secs(1);

/// Transitions emitted by the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Pomodoro `index` began running
    Started { index: usize },
    /// Pomodoro `index` ran its full duration
    IntervalCompleted { index: usize },
    /// The last pomodoro finished
    Completed,
    /// Pomodoro `index` was stopped early (or the session was stopped before starting)
    Stopped { index: usize },
}

/// Mutable session state guarded by the runtime mutex
#[derive(Debug)]
struct Session {
    task: Task,
    /// Pomodoro currently (or most recently) active
    cursor: usize,
    phase: SessionPhase,
    /// Set once a finalizing write failed; the session is dead afterwards
    fault: Option<String>,
}

impl Session {
    fn check_fault(&self) -> Result<()> {
        match &self.fault {
            Some(message) => Err(PomoError::SessionFailed(message.clone())),
            None => Ok(()),
        }
    }

    /// Index of the next unfinished pomodoro after `index`
    fn next_unfinished(&self, index: usize) -> Option<usize> {
        let duration = self.task.duration;
        (index + 1..self.task.pomodoros.len())
            .find(|&i| !self.task.pomodoros[i].state(duration).is_finished())
    }

    /// Begin running at the cursor pomodoro
    ///
    /// A pomodoro left running by an earlier host keeps its start while its
    /// interval is still open. Once that interval has run out it is closed at
    /// its nominal end and the next pending pomodoro starts at `now`: time
    /// after the earlier host died is never caught up beyond that interval.
    fn open(&mut self, now: DateTime<Utc>) -> Vec<SessionEvent> {
        let index = self.cursor;
        let duration = self.task.duration;
        let pomodoro = &mut self.task.pomodoros[index];

        let end = match (pomodoro.start, pomodoro.nominal_end(duration)) {
            (Some(_), Some(end)) if end <= now => end,
            (Some(_), _) => return vec![SessionEvent::Started { index }],
            (None, _) => {
                pomodoro.start = Some(now);
                return vec![SessionEvent::Started { index }];
            }
        };

        pomodoro.end = Some(end);
        tracing::info!(
            task_id = self.task.id,
            index,
            "closed pomodoro left running by an earlier session"
        );
        let mut events = vec![SessionEvent::IntervalCompleted { index }];

        match self.next_unfinished(index) {
            Some(next) => {
                self.cursor = next;
                self.task.pomodoros[next].start = Some(now);
                self.task.pomodoros[next].end = None;
                events.push(SessionEvent::Started { index: next });
            }
            None => {
                self.phase = SessionPhase::Completed;
                events.push(SessionEvent::Completed);
            }
        }
        events
    }

    /// Apply every interval boundary that `now` has passed
    ///
    /// Each finished pomodoro ends exactly at `start + duration` and the next
    /// one starts at that instant, so a late wake-up catches up without drift.
    fn advance(&mut self, now: DateTime<Utc>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let duration = self.task.duration;

        while self.phase == SessionPhase::Running {
            let index = self.cursor;
            let Some(end) = self.task.pomodoros[index].nominal_end(duration) else {
                break;
            };
            if now < end {
                break;
            }

            self.task.pomodoros[index].end = Some(end);
            events.push(SessionEvent::IntervalCompleted { index });

            match self.next_unfinished(index) {
                Some(next) => {
                    self.cursor = next;
                    let pomodoro = &mut self.task.pomodoros[next];
                    if pomodoro.start.is_none() {
                        pomodoro.start = Some(end);
                    }
                    events.push(SessionEvent::Started { index: next });
                }
                None => {
                    self.phase = SessionPhase::Completed;
                    events.push(SessionEvent::Completed);
                }
            }
        }

        events
    }

    fn snapshot(&self, now: DateTime<Utc>) -> StatusSnapshot {
        let duration = self.task.duration;
        let pomodoros = self
            .task
            .pomodoros
            .iter()
            .enumerate()
            .map(|(index, p)| PomodoroStatus {
                index,
                start: p.start,
                end: p.end,
                state: p.state(duration),
            })
            .collect();

        let active_index = match self.phase {
            SessionPhase::Running | SessionPhase::Stopped => Some(self.cursor),
            SessionPhase::Idle | SessionPhase::Completed => None,
        };

        let remaining_secs = match self.phase {
            SessionPhase::Running => self.task.pomodoros[self.cursor]
                .nominal_end(duration)
                .map(|end| {
                    let millis = (end - now).num_milliseconds().max(0) as u64;
                    millis.div_ceil(1000)
                }),
            _ => None,
        };

        StatusSnapshot {
            task_id: self.task.id,
            message: self.task.message.clone(),
            tags: self.task.tags.clone(),
            duration_ms: duration.as_millis() as u64,
            phase: self.phase,
            active_index,
            remaining_secs,
            pomodoros,
            taken_at: now,
        }
    }
}

/// The single live session of this process
pub struct SessionRuntime {
    session: Mutex<Session>,
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    /// Wakes the timer loop early (stop, fault, start)
    wake: Notify,
    events_tx: broadcast::Sender<SessionEvent>,
}

impl SessionRuntime {
    /// Wrap a persisted task; resumes at its first unfinished pomodoro
    pub fn new(task: Task, store: Arc<dyn TaskStore>, clock: Arc<dyn Clock>) -> Result<Self> {
        if task.is_root() {
            return Err(PomoError::invalid(
                "task must be persisted before a session can run it",
            ));
        }
        if task.pomodoros.is_empty() {
            return Err(PomoError::invalid(format!(
                "task {} has no pomodoros",
                task.id
            )));
        }
        if task.duration > MAX_DURATION {
            return Err(PomoError::invalid(format!(
                "task {} has a pomodoro duration above {}",
                task.id,
                format_duration(MAX_DURATION)
            )));
        }
        let cursor = task.first_unfinished().ok_or_else(|| {
            PomoError::invalid(format!("task {} has no pomodoros left to run", task.id))
        })?;

        let (events_tx, _) = broadcast::channel(64);

        Ok(Self {
            session: Mutex::new(Session {
                task,
                cursor,
                phase: SessionPhase::Idle,
                fault: None,
            }),
            store,
            clock,
            wake: Notify::new(),
            events_tx,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    /// `Idle -> Running`; a no-op on a session that already started
    pub async fn start(&self) -> Result<StatusSnapshot> {
        let mut session = self.session.lock().await;
        session.check_fault()?;
        let now = self.clock.now();

        if session.phase == SessionPhase::Idle {
            session.phase = SessionPhase::Running;
            let events = session.open(now);
            tracing::info!(
                task_id = session.task.id,
                index = session.cursor,
                "session started"
            );
            self.commit(&mut session, events)?;
            self.wake.notify_one();
        }

        Ok(session.snapshot(now))
    }

    /// Current progress, after applying any boundary that has passed
    pub async fn status(&self) -> Result<StatusSnapshot> {
        let mut session = self.session.lock().await;
        session.check_fault()?;
        let now = self.clock.now();
        let events = session.advance(now);
        self.commit(&mut session, events)?;
        Ok(session.snapshot(now))
    }

    /// Stop the running pomodoro at "now"; idempotent on a finished session
    pub async fn stop(&self) -> Result<StatusSnapshot> {
        let mut session = self.session.lock().await;
        session.check_fault()?;
        let now = self.clock.now();

        // an interval that already ran out counts as completed, not stopped
        let mut events = session.advance(now);

        match session.phase {
            SessionPhase::Running => {
                let index = session.cursor;
                session.task.pomodoros[index].end = Some(now);
                session.phase = SessionPhase::Stopped;
                tracing::info!(task_id = session.task.id, index, "session stopped");
                events.push(SessionEvent::Stopped { index });
            }
            SessionPhase::Idle => {
                session.phase = SessionPhase::Stopped;
                events.push(SessionEvent::Stopped {
                    index: session.cursor,
                });
            }
            SessionPhase::Completed | SessionPhase::Stopped => {
                tracing::debug!(task_id = session.task.id, "stop on finished session ignored");
            }
        }

        self.commit(&mut session, events)?;
        self.wake.notify_one();
        Ok(session.snapshot(now))
    }

    /// Copy of the task as it currently stands
    pub async fn task(&self) -> Task {
        self.session.lock().await.task.clone()
    }

    /// Drive interval boundaries until the session is finished
    ///
    /// Sleeps until the next boundary (at most a second at a time) or until
    /// woken by `stop`. Returns the final snapshot, or the error that made the
    /// session fatal.
    pub async fn run_timer(&self) -> Result<StatusSnapshot> {
        loop {
            let wait = {
                let session = self.session.lock().await;
                session.check_fault()?;
                let now = self.clock.now();
                if session.phase.is_terminal() {
                    return Ok(session.snapshot(now));
                }
                self.next_wait(&session, now)
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.wake.notified() => {}
            }

            self.status().await?;
        }
    }

    fn next_wait(&self, session: &Session, now: DateTime<Utc>) -> Duration {
        if session.phase != SessionPhase::Running {
            return MAX_TIMER_WAIT;
        }
        session.task.pomodoros[session.cursor]
            .nominal_end(session.task.duration)
            .map(|end| (end - now).to_std().unwrap_or(Duration::ZERO))
            .unwrap_or(MAX_TIMER_WAIT)
            .min(MAX_TIMER_WAIT)
    }

    /// Persist the task, then publish `events`
    ///
    /// Runs with the session lock held so no reader sees a transition that
    /// is not yet on disk. A failed write makes the session fatal.
    fn commit(&self, session: &mut Session, events: Vec<SessionEvent>) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        if let Err(err) = self.store.write_task(&session.task) {
            tracing::error!(task_id = session.task.id, error = %err, "failed to persist session");
            session.fault = Some(err.to_string());
            self.wake.notify_one();
            return Err(err);
        }

        for event in events {
            tracing::debug!(task_id = session.task.id, ?event, "session transition");
            // no subscribers is fine
            let _ = self.events_tx.send(event);
        }
        Ok(())
    }
}
