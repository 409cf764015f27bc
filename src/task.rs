//! Task data model.
//!
//! A [`Task`] is the unit of work tracked by the engine. Mutations are
//! described field-by-field with [`TaskField`], which lets commands carry a
//! minimal snapshot of exactly the fields they touched.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use ulid::Ulid;

use crate::error::{Error, Result};

/// Unique, immutable task identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Allocate a fresh engine-side id.
    pub fn generate() -> Self {
        Self(Ulid::new().to_string().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(Error::Validation(format!(
                "unknown priority '{other}' (expected low|medium|high)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Pending,
    Completed,
    Snoozed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Snoozed => "SNOOZED",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(TaskStatus::Pending),
            "COMPLETED" => Ok(TaskStatus::Completed),
            "SNOOZED" => Ok(TaskStatus::Snoozed),
            other => Err(Error::Validation(format!(
                "unknown status '{other}' (expected PENDING|COMPLETED|SNOOZED)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_estimate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snooze_until: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rescheduled_from: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rescheduled_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Read the current value of a single field.
    pub fn field(&self, key: FieldKey) -> TaskField {
        match key {
            FieldKey::Title => TaskField::Title(self.title.clone()),
            FieldKey::Description => TaskField::Description(self.description.clone()),
            FieldKey::Priority => TaskField::Priority(self.priority),
            FieldKey::Tags => TaskField::Tags(self.tags.clone()),
            FieldKey::TimeEstimate => TaskField::TimeEstimate(self.time_estimate.clone()),
            FieldKey::DueDate => TaskField::DueDate(self.due_date),
            FieldKey::GoalId => TaskField::GoalId(self.goal_id.clone()),
            FieldKey::Status => TaskField::Status(self.status),
            FieldKey::Completed => TaskField::Completed(self.completed),
            FieldKey::SnoozeUntil => TaskField::SnoozeUntil(self.snooze_until),
            FieldKey::RescheduledFrom => TaskField::RescheduledFrom(self.rescheduled_from),
            FieldKey::RescheduledReason => {
                TaskField::RescheduledReason(self.rescheduled_reason.clone())
            }
            FieldKey::UpdatedAt => TaskField::UpdatedAt(self.updated_at),
        }
    }

    /// Snapshot the given fields, in order.
    pub fn snapshot(&self, keys: impl IntoIterator<Item = FieldKey>) -> Vec<TaskField> {
        keys.into_iter().map(|key| self.field(key)).collect()
    }

    /// Write a list of field values onto the task.
    pub fn apply_fields(&mut self, fields: &[TaskField]) {
        for field in fields {
            field.apply_to(self);
        }
    }

    /// Check the status invariants.
    pub fn check_invariants(&self) -> Result<()> {
        if self.completed != (self.status == TaskStatus::Completed) {
            return Err(Error::Validation(format!(
                "task {}: completed flag disagrees with status {}",
                self.id,
                self.status.as_str()
            )));
        }
        if self.snooze_until.is_some() != (self.status == TaskStatus::Snoozed) {
            return Err(Error::Validation(format!(
                "task {}: snoozeUntil must be set iff status is SNOOZED",
                self.id
            )));
        }
        if self.updated_at < self.created_at {
            return Err(Error::Validation(format!(
                "task {}: updatedAt precedes createdAt",
                self.id
            )));
        }
        Ok(())
    }

    /// Repair the status invariants on a task received from elsewhere.
    ///
    /// A SNOOZED task without a wake-up time is demoted to PENDING.
    pub fn normalized(mut self) -> Self {
        if self.status == TaskStatus::Snoozed && self.snooze_until.is_none() {
            self.status = TaskStatus::Pending;
        }
        if self.status != TaskStatus::Snoozed {
            self.snooze_until = None;
        }
        self.completed = self.status == TaskStatus::Completed;
        if self.updated_at < self.created_at {
            self.updated_at = self.created_at;
        }
        self
    }
}

/// Names of the mutable task fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKey {
    Title,
    Description,
    Priority,
    Tags,
    TimeEstimate,
    DueDate,
    GoalId,
    Status,
    Completed,
    SnoozeUntil,
    RescheduledFrom,
    RescheduledReason,
    UpdatedAt,
}

/// A single field value, used for partial snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum TaskField {
    Title(String),
    Description(Option<String>),
    Priority(Priority),
    Tags(BTreeSet<String>),
    TimeEstimate(Option<String>),
    DueDate(Option<NaiveDate>),
    GoalId(Option<String>),
    Status(TaskStatus),
    Completed(bool),
    SnoozeUntil(Option<DateTime<Utc>>),
    RescheduledFrom(Option<NaiveDate>),
    RescheduledReason(Option<String>),
    UpdatedAt(DateTime<Utc>),
}

impl TaskField {
    pub fn key(&self) -> FieldKey {
        match self {
            TaskField::Title(_) => FieldKey::Title,
            TaskField::Description(_) => FieldKey::Description,
            TaskField::Priority(_) => FieldKey::Priority,
            TaskField::Tags(_) => FieldKey::Tags,
            TaskField::TimeEstimate(_) => FieldKey::TimeEstimate,
            TaskField::DueDate(_) => FieldKey::DueDate,
            TaskField::GoalId(_) => FieldKey::GoalId,
            TaskField::Status(_) => FieldKey::Status,
            TaskField::Completed(_) => FieldKey::Completed,
            TaskField::SnoozeUntil(_) => FieldKey::SnoozeUntil,
            TaskField::RescheduledFrom(_) => FieldKey::RescheduledFrom,
            TaskField::RescheduledReason(_) => FieldKey::RescheduledReason,
            TaskField::UpdatedAt(_) => FieldKey::UpdatedAt,
        }
    }

    pub fn apply_to(&self, task: &mut Task) {
        match self {
            TaskField::Title(value) => task.title = value.clone(),
            TaskField::Description(value) => task.description = value.clone(),
            TaskField::Priority(value) => task.priority = *value,
            TaskField::Tags(value) => task.tags = value.clone(),
            TaskField::TimeEstimate(value) => task.time_estimate = value.clone(),
            TaskField::DueDate(value) => task.due_date = *value,
            TaskField::GoalId(value) => task.goal_id = value.clone(),
            TaskField::Status(value) => task.status = *value,
            TaskField::Completed(value) => task.completed = *value,
            TaskField::SnoozeUntil(value) => task.snooze_until = *value,
            TaskField::RescheduledFrom(value) => task.rescheduled_from = *value,
            TaskField::RescheduledReason(value) => task.rescheduled_reason = value.clone(),
            TaskField::UpdatedAt(value) => task.updated_at = *value,
        }
    }
}

/// Input for creating a task. The id and timestamps are assigned by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    /// Must be absent; present only so a client-supplied id can be rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub time_estimate: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub goal_id: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub snooze_until: Option<DateTime<Utc>>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn with_goal(mut self, goal_id: impl Into<String>) -> Self {
        self.goal_id = Some(goal_id.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Build the task, validating the draft.
    pub(crate) fn into_task(self, id: TaskId, now: DateTime<Utc>) -> Result<Task> {
        if let Some(existing) = self.id {
            return Err(Error::Validation(format!(
                "draft must not carry an id (got '{existing}')"
            )));
        }
        let title = validate_title(&self.title)?;
        validate_tags(&self.tags)?;

        let snooze_until = match (self.status, self.snooze_until) {
            (TaskStatus::Snoozed, Some(until)) => Some(until),
            (TaskStatus::Snoozed, None) => {
                return Err(Error::Validation(
                    "snoozed task requires snoozeUntil".to_string(),
                ))
            }
            (_, Some(_)) => {
                return Err(Error::Validation(
                    "snoozeUntil requires SNOOZED status".to_string(),
                ))
            }
            (_, None) => None,
        };

        Ok(Task {
            id,
            title,
            description: self.description,
            priority: self.priority,
            tags: self.tags,
            time_estimate: self.time_estimate,
            due_date: self.due_date,
            goal_id: self.goal_id,
            status: self.status,
            completed: self.status == TaskStatus::Completed,
            snooze_until,
            rescheduled_from: None,
            rescheduled_reason: None,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial update. `None` leaves a field untouched; for nullable fields
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub tags: Option<BTreeSet<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub time_estimate: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")]
    pub goal_id: Option<Option<String>>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default, deserialize_with = "nullable")]
    pub snooze_until: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    pub rescheduled_from: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")]
    pub rescheduled_reason: Option<Option<String>>,
}

fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl TaskPatch {
    /// Parse a patch from its JSON wire form.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|err| Error::Validation(format!("malformed patch: {err}")))
    }

    pub fn is_empty(&self) -> bool {
        *self == TaskPatch::default()
    }

    /// Resolve the patch against the current task into the concrete field
    /// writes, including the derived `completed` and `snoozeUntil` values.
    pub(crate) fn resolve(&self, current: &Task) -> Result<Vec<TaskField>> {
        if self.is_empty() {
            return Err(Error::Validation("patch is empty".to_string()));
        }

        let mut fields = Vec::new();
        if let Some(title) = &self.title {
            fields.push(TaskField::Title(validate_title(title)?));
        }
        if let Some(description) = &self.description {
            fields.push(TaskField::Description(description.clone()));
        }
        if let Some(priority) = self.priority {
            fields.push(TaskField::Priority(priority));
        }
        if let Some(tags) = &self.tags {
            validate_tags(tags)?;
            fields.push(TaskField::Tags(tags.clone()));
        }
        if let Some(estimate) = &self.time_estimate {
            fields.push(TaskField::TimeEstimate(estimate.clone()));
        }
        if let Some(due_date) = self.due_date {
            fields.push(TaskField::DueDate(due_date));
        }
        if let Some(goal_id) = &self.goal_id {
            fields.push(TaskField::GoalId(goal_id.clone()));
        }

        let status = self.status.unwrap_or(current.status);
        let snooze_until = match (status, self.snooze_until) {
            (TaskStatus::Snoozed, Some(Some(until))) => Some(until),
            (TaskStatus::Snoozed, Some(None)) => {
                return Err(Error::Validation(
                    "cannot clear snoozeUntil on a SNOOZED task".to_string(),
                ))
            }
            (TaskStatus::Snoozed, None) => match current.snooze_until {
                Some(until) => Some(until),
                None => {
                    return Err(Error::Validation(
                        "snoozed task requires snoozeUntil".to_string(),
                    ))
                }
            },
            (_, Some(Some(_))) => {
                return Err(Error::Validation(
                    "snoozeUntil requires SNOOZED status".to_string(),
                ))
            }
            (_, _) => None,
        };

        if let Some(status) = self.status {
            fields.push(TaskField::Status(status));
            fields.push(TaskField::Completed(status == TaskStatus::Completed));
        }
        if self.status.is_some() || self.snooze_until.is_some() {
            fields.push(TaskField::SnoozeUntil(snooze_until));
        }

        if let Some(from) = self.rescheduled_from {
            fields.push(TaskField::RescheduledFrom(from));
        }
        if let Some(reason) = &self.rescheduled_reason {
            fields.push(TaskField::RescheduledReason(reason.clone()));
        }

        Ok(fields)
    }
}

fn validate_title(title: &str) -> Result<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("title cannot be empty".to_string()));
    }
    Ok(trimmed.to_string())
}

fn validate_tags(tags: &BTreeSet<String>) -> Result<()> {
    if tags.iter().any(|tag| tag.trim().is_empty()) {
        return Err(Error::Validation("tags cannot include empty entries".to_string()));
    }
    Ok(())
}
