//! Applying commands to the repository in either direction.
//!
//! Semantics:
//! - Forward: CREATE inserts the task, DELETE removes it, UPDATE writes the
//!   next-state fields
//! - Inverse: CREATE removes the task, DELETE re-inserts the snapshot, UPDATE
//!   writes the previous-state fields
//! - Composites re-apply in forward order and revert in reverse order

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::oplog::{Command, Operation, TaskChange};
use crate::repository::TaskRepository;
use crate::task::{TaskField, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// First application of a freshly appended command.
    Apply,
    Undo,
    Redo,
}

/// Summary of one undo or redo step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UndoSummary {
    pub command_id: Uuid,
    pub operation: Operation,
    pub direction: Direction,
    pub affected: Vec<TaskId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<TaskId>,
}

/// Re-apply a command's forward effect.
pub fn apply_forward(repo: &mut TaskRepository, command: &Command) -> UndoSummary {
    let mut summary = summary_for(command, Direction::Redo);
    for change in command.changes() {
        if apply_change(repo, change) {
            summary.affected.push(change.task_id().clone());
        } else {
            summary.skipped.push(change.task_id().clone());
        }
    }
    summary
}

/// Apply a command's inverse.
pub fn apply_inverse(repo: &mut TaskRepository, command: &Command) -> UndoSummary {
    let mut summary = summary_for(command, Direction::Undo);
    for change in command.changes().iter().rev() {
        if revert_change(repo, change) {
            summary.affected.push(change.task_id().clone());
        } else {
            summary.skipped.push(change.task_id().clone());
        }
    }
    summary
}

fn summary_for(command: &Command, direction: Direction) -> UndoSummary {
    UndoSummary {
        command_id: command.id,
        operation: command.operation,
        direction,
        affected: Vec::new(),
        skipped: Vec::new(),
    }
}

pub(crate) fn apply_change(repo: &mut TaskRepository, change: &TaskChange) -> bool {
    match change {
        TaskChange::Create { task } => {
            repo.upsert(task.clone());
            true
        }
        TaskChange::Delete { task } => repo.remove(&task.id).is_some(),
        TaskChange::Update { id, next, .. } => write_fields(repo, id, next),
    }
}

fn revert_change(repo: &mut TaskRepository, change: &TaskChange) -> bool {
    match change {
        TaskChange::Create { task } => repo.remove(&task.id).is_some(),
        TaskChange::Delete { task } => {
            repo.upsert(task.clone());
            true
        }
        TaskChange::Update { id, previous, .. } => write_fields(repo, id, previous),
    }
}

fn write_fields(repo: &mut TaskRepository, id: &TaskId, fields: &[TaskField]) -> bool {
    match repo.get_mut(id) {
        Some(task) => {
            task.apply_fields(fields);
            true
        }
        None => {
            tracing::warn!(task_id = %id, "task missing while applying history; skipped");
            false
        }
    }
}
