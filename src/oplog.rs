//! Command log for the task engine
//!
//! Holds the bounded, linear history of reversible task mutations and the
//! cursor separating applied commands from reverted ones.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::{Task, TaskField, TaskId};

/// Default maximum number of commands kept in the log
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// User-facing operation that produced a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Complete,
    Snooze,
    Reschedule,
    Delete,
    BulkComplete,
    BulkSnooze,
    BulkReschedule,
    BulkDelete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Complete => "complete",
            Operation::Snooze => "snooze",
            Operation::Reschedule => "reschedule",
            Operation::Delete => "delete",
            Operation::BulkComplete => "bulk_complete",
            Operation::BulkSnooze => "bulk_snooze",
            Operation::BulkReschedule => "bulk_reschedule",
            Operation::BulkDelete => "bulk_delete",
        }
    }

    pub fn is_bulk(&self) -> bool {
        matches!(
            self,
            Operation::BulkComplete
                | Operation::BulkSnooze
                | Operation::BulkReschedule
                | Operation::BulkDelete
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log-level command type. Complete, snooze and reschedule are updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    Create,
    Update,
    Delete,
}

/// One reversible change to a single task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskChange {
    /// Previous state is empty; next state is the full task.
    Create { task: Task },
    /// Minimal snapshots of the touched fields.
    Update {
        id: TaskId,
        previous: Vec<TaskField>,
        next: Vec<TaskField>,
    },
    /// Previous state is the full task; next state is empty.
    Delete { task: Task },
}

impl TaskChange {
    pub fn kind(&self) -> CommandKind {
        match self {
            TaskChange::Create { .. } => CommandKind::Create,
            TaskChange::Update { .. } => CommandKind::Update,
            TaskChange::Delete { .. } => CommandKind::Delete,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        match self {
            TaskChange::Create { task } | TaskChange::Delete { task } => &task.id,
            TaskChange::Update { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandBody {
    Single(TaskChange),
    /// Ordered per-item changes undone and redone as one unit.
    Composite(Vec<TaskChange>),
}

/// A reversible record of one Mutation API call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub id: Uuid,
    pub operation: Operation,
    pub timestamp: DateTime<Utc>,
    pub body: CommandBody,
}

impl Command {
    pub fn single(operation: Operation, change: TaskChange) -> Self {
        Self::with_body(operation, CommandBody::Single(change))
    }

    pub fn composite(operation: Operation, changes: Vec<TaskChange>) -> Self {
        Self::with_body(operation, CommandBody::Composite(changes))
    }

    fn with_body(operation: Operation, body: CommandBody) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation,
            timestamp: Utc::now(),
            body,
        }
    }

    /// Log-level type of a single command; `None` for composites.
    pub fn kind(&self) -> Option<CommandKind> {
        match &self.body {
            CommandBody::Single(change) => Some(change.kind()),
            CommandBody::Composite(_) => None,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.body, CommandBody::Composite(_))
    }

    pub fn changes(&self) -> &[TaskChange] {
        match &self.body {
            CommandBody::Single(change) => std::slice::from_ref(change),
            CommandBody::Composite(changes) => changes,
        }
    }

    pub fn task_ids(&self) -> Vec<TaskId> {
        self.changes()
            .iter()
            .map(|change| change.task_id().clone())
            .collect()
    }

    /// Short label for undo/redo affordances, e.g. "complete 3 tasks".
    pub fn label(&self) -> String {
        let count = self.changes().len();
        if self.operation.is_bulk() {
            let verb = self.operation.as_str().trim_start_matches("bulk_");
            format!("{verb} {count} tasks")
        } else {
            format!("{} task", self.operation)
        }
    }
}

/// Bounded linear history with an undo/redo cursor.
///
/// Applied commands occupy `entries[..applied]`; the cursor is the index of
/// the last applied command.
#[derive(Debug, Clone)]
pub struct CommandLog {
    entries: VecDeque<Command>,
    applied: usize,
    capacity: usize,
}

impl Default for CommandLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl CommandLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            applied: 0,
            capacity,
        }
    }

    /// Append a command at the cursor, discarding any redo branch.
    ///
    /// Returns the oldest command if it was evicted to respect the capacity.
    pub fn append(&mut self, command: Command) -> Option<Command> {
        let discarded = self.entries.len() - self.applied;
        if discarded > 0 {
            self.entries.truncate(self.applied);
            tracing::debug!(discarded, "dropped redo branch");
        }

        self.entries.push_back(command);
        self.applied = self.entries.len();

        if self.entries.len() > self.capacity {
            let evicted = self.entries.pop_front();
            self.applied -= 1;
            return evicted;
        }
        None
    }

    /// Move the cursor back one step, returning the command to revert.
    pub fn step_back(&mut self) -> Option<&Command> {
        if !self.can_undo() {
            return None;
        }
        self.applied -= 1;
        self.entries.get(self.applied)
    }

    /// Move the cursor forward one step, returning the command to re-apply.
    pub fn step_forward(&mut self) -> Option<&Command> {
        if !self.can_redo() {
            return None;
        }
        self.applied += 1;
        self.entries.get(self.applied - 1)
    }

    pub fn peek_undo(&self) -> Option<&Command> {
        self.applied
            .checked_sub(1)
            .and_then(|index| self.entries.get(index))
    }

    pub fn peek_redo(&self) -> Option<&Command> {
        self.entries.get(self.applied)
    }

    pub fn can_undo(&self) -> bool {
        self.applied > 0
    }

    pub fn can_redo(&self) -> bool {
        self.applied < self.entries.len()
    }

    /// Index of the last applied command; `None` when nothing is applied.
    pub fn cursor(&self) -> Option<usize> {
        self.applied.checked_sub(1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn entries(&self) -> impl Iterator<Item = &Command> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.applied = 0;
    }
}
