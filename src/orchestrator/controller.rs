//! Run lifecycle controller.
//!
//! Owns the single task session, the local run status and the log subscription.
//! Local status and the engine's completion signal are separate: `stop()` flips
//! the status to idle immediately, and a completion that arrives afterwards is
//! only observed, never allowed to bring `Running` back.

use super::log_stream::LogStream;
use crate::engine::{Engine, EngineControl};
use crate::error::ConsoleError;
use crate::model::{AnalyzeRequest, ConnStatus, LogLine, RunStatus, SessionId, TaskConfig};
use crate::validate::{self, Correction};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Internal handle for one submitted task.
struct TaskSession {
    id: SessionId,
    config: TaskConfig,
    ctrl_tx: UnboundedSender<EngineControl>,
    stopped: bool,
    finished: bool,
}

/// Engine completion, tagged with the session it belongs to.
struct Completion {
    session: SessionId,
    result: Result<(), ConsoleError>,
}

#[derive(Debug)]
pub enum ControllerEvent {
    Line(LogLine),
    /// The current session finished while running; status is now idle.
    Finished {
        session: SessionId,
        result: Result<(), ConsoleError>,
    },
    /// A completion for a stopped or superseded session; status untouched.
    LateCompletion {
        session: SessionId,
        result: Result<(), ConsoleError>,
    },
}

/// Accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub session: SessionId,
    pub corrections: Vec<Correction>,
}

pub struct TaskController<E: Engine> {
    engine: E,
    status: RunStatus,
    session: Option<TaskSession>,
    log: LogStream,
    completion_tx: UnboundedSender<Completion>,
    completion_rx: UnboundedReceiver<Completion>,
}

impl<E: Engine> TaskController<E> {
    pub fn new(engine: E) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        Self {
            engine,
            status: RunStatus::Idle,
            session: None,
            log: LogStream::default(),
            completion_tx,
            completion_rx,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn log(&self) -> &LogStream {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Validate and start a task. Rejected without side effects while running.
    pub fn submit(&mut self, config: &TaskConfig, conn: ConnStatus) -> Result<Submitted, ConsoleError> {
        if self.status == RunStatus::Running {
            tracing::debug!("submit ignored: a task is already running");
            return Err(ConsoleError::AlreadyRunning);
        }
        validate::check_submittable(config, conn)?;
        let (config, corrections) = validate::enforce_invariants(config.clone());
        for c in &corrections {
            tracing::warn!("{}", c.describe());
        }

        // A passively open subscription from the last run must not double up.
        self.log.unsubscribe();
        self.log.clear();
        let (log_tx, log_rx) = mpsc::unbounded_channel::<String>();
        self.log.subscribe(log_rx);

        let id = SessionId::generate();
        let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel::<EngineControl>();
        let handle = self
            .engine
            .spawn(AnalyzeRequest::from(&config), log_tx, ctrl_rx);

        // Watch the engine on its own task so completion arrives as an event.
        let completion_tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let result = match handle.await {
                Ok(r) => r,
                Err(e) => Err(ConsoleError::Engine(format!("engine task join failed: {e}"))),
            };
            let _ = completion_tx.send(Completion { session: id, result });
        });

        tracing::info!(session = %id, database = ?config.database, work_type = %config.work_type, "task submitted");
        self.session = Some(TaskSession {
            id,
            config,
            ctrl_tx,
            stopped: false,
            finished: false,
        });
        self.status = RunStatus::Running;
        Ok(Submitted {
            session: id,
            corrections,
        })
    }

    /// Signal the engine to stop and go idle right away.
    ///
    /// The status is idle on return whether or not the signal was delivered.
    pub fn stop(&mut self) -> Result<(), ConsoleError> {
        let was_running = self.status == RunStatus::Running;
        self.status = RunStatus::Idle;

        let Some(session) = self.session.as_mut().filter(|_| was_running) else {
            return Ok(());
        };
        session.stopped = true;
        tracing::info!(session = %session.id, database = ?session.config.database, "stop requested");
        session.ctrl_tx.send(EngineControl::Stop).map_err(|_| {
            tracing::warn!(session = %session.id, "stop signal could not be delivered");
            ConsoleError::StopDelivery
        })
    }

    /// Wait for the next log line or engine completion.
    pub async fn next_event(&mut self) -> ControllerEvent {
        loop {
            // Lines queued before a completion are delivered first.
            tokio::select! {
                biased;
                line = self.log.recv() => {
                    if let Some(text) = line {
                        return ControllerEvent::Line(self.log.on_line(text));
                    }
                    tracing::debug!("log source closed");
                }
                Some(done) = self.completion_rx.recv() => {
                    return self.on_completion(done);
                }
            }
        }
    }

    fn on_completion(&mut self, done: Completion) -> ControllerEvent {
        let Completion { session, result } = done;
        let current = self
            .session
            .as_mut()
            .filter(|s| s.id == session && !s.stopped && !s.finished);
        match current {
            Some(s) if self.status == RunStatus::Running => {
                s.finished = true;
                self.status = RunStatus::Idle;
                match &result {
                    Ok(()) => tracing::info!(%session, "task finished"),
                    Err(e) => tracing::warn!(%session, "task failed: {e}"),
                }
                ControllerEvent::Finished { session, result }
            }
            _ => {
                tracing::debug!(%session, ok = result.is_ok(), "late completion ignored");
                ControllerEvent::LateCompletion { session, result }
            }
        }
    }
}
