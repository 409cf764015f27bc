//! In-memory task repository.
//!
//! The repository is the single source of truth the UI renders from. It has
//! no business logic; validation happens in the engine.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::task::{Task, TaskId, TaskStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskRepository {
    tasks: BTreeMap<TaskId, Task>,
}

impl TaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    /// All tasks, ordered by id.
    pub fn list(&self) -> Vec<&Task> {
        self.tasks.values().collect()
    }

    pub fn filter(&self, filter: &TaskFilter) -> Vec<&Task> {
        self.tasks
            .values()
            .filter(|task| filter.matches(task))
            .collect()
    }

    /// Insert or replace a task, returning the replaced one.
    pub fn upsert(&mut self, task: Task) -> Option<Task> {
        self.tasks.insert(task.id.clone(), task)
    }

    pub fn remove(&mut self, id: &TaskId) -> Option<Task> {
        self.tasks.remove(id)
    }

    pub(crate) fn get_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }
}

/// Filter for selecting tasks. Every populated criterion must match.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub goal_id: Option<String>,
    pub tag: Option<String>,
    pub due_on_or_before: Option<NaiveDate>,
    /// Snoozed tasks whose snooze ends at or before this instant.
    pub snooze_ends_by: Option<DateTime<Utc>>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(status) = self.status {
            if task.status != status {
                return false;
            }
        }

        if let Some(goal_id) = &self.goal_id {
            if task.goal_id.as_deref() != Some(goal_id.as_str()) {
                return false;
            }
        }

        if let Some(tag) = &self.tag {
            if !task.tags.contains(tag) {
                return false;
            }
        }

        if let Some(cutoff) = self.due_on_or_before {
            match task.due_date {
                Some(due) if due <= cutoff => {}
                _ => return false,
            }
        }

        if let Some(cutoff) = self.snooze_ends_by {
            match task.snooze_until {
                Some(until) if until <= cutoff => {}
                _ => return false,
            }
        }

        true
    }
}
