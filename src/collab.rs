//! Seams to the collaborators the engine depends on but does not implement:
//! remote persistence of mutations and the data re-fetch path.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::oplog::Command;
use crate::task::TaskId;
use crate::undo::Direction;

/// Receives every locally applied command for remote persistence.
///
/// Implementations must not block: the engine calls this synchronously
/// after the optimistic local write and never waits on the remote result.
pub trait MutationSink: Send {
    fn persist(&mut self, command: &Command, direction: Direction) -> Result<()>;
}

/// Cache-invalidation signals toward the task/goal read path.
pub trait RefetchSignal: Send {
    /// A goal's task set changed on the server.
    fn goal_changed(&mut self, goal_id: &str);

    /// The "today" task view may be stale.
    fn today_changed(&mut self);

    /// Tasks named by an adaptation are unknown locally and must be fetched.
    fn fetch_tasks(&mut self, goal_id: &str, ids: &[TaskId]);
}

/// Sink that drops every command.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl MutationSink for NoopSink {
    fn persist(&mut self, _command: &Command, _direction: Direction) -> Result<()> {
        Ok(())
    }
}

/// A command queued for the persistence worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistRequest {
    pub command: Command,
    pub direction: Direction,
}

/// Sink that forwards commands to an async persistence worker.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<PersistRequest>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PersistRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl MutationSink for ChannelSink {
    fn persist(&mut self, command: &Command, direction: Direction) -> Result<()> {
        self.tx
            .send(PersistRequest {
                command: command.clone(),
                direction,
            })
            .map_err(|_| Error::Persist("persistence worker has shut down".to_string()))
    }
}

/// Re-fetch signal that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRefetch;

impl RefetchSignal for NoopRefetch {
    fn goal_changed(&mut self, _goal_id: &str) {}

    fn today_changed(&mut self) {}

    fn fetch_tasks(&mut self, _goal_id: &str, _ids: &[TaskId]) {}
}

/// A signal captured by [`RecordingRefetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefetchRequest {
    Goal(String),
    Today,
    Tasks { goal_id: String, ids: Vec<TaskId> },
}

/// Re-fetch signal that records requests into a shared buffer.
///
/// Clones share the buffer, so a caller can keep one handle while the
/// engine owns another.
#[derive(Debug, Default, Clone)]
pub struct RecordingRefetch {
    requests: Arc<Mutex<Vec<RefetchRequest>>>,
}

impl RecordingRefetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<RefetchRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn take(&self) -> Vec<RefetchRequest> {
        std::mem::take(
            &mut *self
                .requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    fn push(&self, request: RefetchRequest) {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
    }
}

impl RefetchSignal for RecordingRefetch {
    fn goal_changed(&mut self, goal_id: &str) {
        self.push(RefetchRequest::Goal(goal_id.to_string()));
    }

    fn today_changed(&mut self) {
        self.push(RefetchRequest::Today);
    }

    fn fetch_tasks(&mut self, goal_id: &str, ids: &[TaskId]) {
        self.push(RefetchRequest::Tasks {
            goal_id: goal_id.to_string(),
            ids: ids.to_vec(),
        });
    }
}
