//! The task state engine.
//!
//! [`TaskEngine`] is the only entry point that produces undoable change.
//! Every mutation validates first, then performs one repository write step
//! and one command log append. Failed preconditions leave both untouched.
//!
//! Lifecycle: build one engine per session with [`TaskEngine::builder`] and
//! call [`TaskEngine::dispose`] on logout. Engines share no global state.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::collab::{MutationSink, NoopRefetch, NoopSink, RefetchSignal};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{Event, EventDestination, EventKind, EventSink};
use crate::highlight::{HighlightRegistry, DEFAULT_HIGHLIGHT_WINDOW};
use crate::oplog::{Command, CommandLog, Operation, TaskChange, DEFAULT_HISTORY_CAPACITY};
use crate::reconcile::{AdaptationEvent, ReconcileOutcome, Reconciler, RemoteSummary};
use crate::repository::{TaskFilter, TaskRepository};
use crate::task::{Task, TaskDraft, TaskField, TaskId, TaskPatch, TaskStatus};
use crate::undo::{self, Direction, UndoSummary};

/// A remote persistence failure. Local state is kept as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistFailure {
    pub command_id: Uuid,
    pub operation: Operation,
    pub direction: Direction,
    pub error: String,
    pub at: DateTime<Utc>,
}

/// Builder for a [`TaskEngine`] with its collaborators and limits.
pub struct TaskEngineBuilder {
    capacity: usize,
    window: Duration,
    sink: Box<dyn MutationSink>,
    refetch: Box<dyn RefetchSignal>,
    events: Option<EventSink>,
}

impl Default for TaskEngineBuilder {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_HISTORY_CAPACITY,
            window: DEFAULT_HIGHLIGHT_WINDOW,
            sink: Box::new(NoopSink),
            refetch: Box::new(NoopRefetch),
            events: None,
        }
    }
}

impl TaskEngineBuilder {
    /// Start from configuration, opening the configured event destination.
    pub fn from_config(config: &Config) -> Result<Self> {
        let events = EventDestination::parse(config.events.destination.as_deref())
            .map(|destination| destination.open())
            .transpose()?;
        Ok(Self {
            capacity: config.history.capacity,
            window: config.highlight.window_duration()?,
            events,
            ..Self::default()
        })
    }

    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn highlight_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn sink(mut self, sink: impl MutationSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn refetch(mut self, refetch: impl RefetchSignal + 'static) -> Self {
        self.refetch = Box::new(refetch);
        self
    }

    pub fn events(mut self, events: EventSink) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> TaskEngine {
        TaskEngine {
            repo: TaskRepository::new(),
            log: CommandLog::new(self.capacity),
            reconciler: Reconciler::new(HighlightRegistry::new(self.window), self.refetch),
            sink: self.sink,
            events: self.events,
            persist_failures: Vec::new(),
        }
    }
}

/// Task state for one session: repository, undo history and adaptation state.
pub struct TaskEngine {
    repo: TaskRepository,
    log: CommandLog,
    reconciler: Reconciler,
    sink: Box<dyn MutationSink>,
    events: Option<EventSink>,
    persist_failures: Vec<PersistFailure>,
}

impl Default for TaskEngine {
    fn default() -> Self {
        TaskEngineBuilder::default().build()
    }
}

impl std::fmt::Debug for TaskEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEngine")
            .field("tasks", &self.repo.len())
            .field("history", &self.log.len())
            .field("cursor", &self.log.cursor())
            .finish_non_exhaustive()
    }
}

impl TaskEngine {
    pub fn builder() -> TaskEngineBuilder {
        TaskEngineBuilder::default()
    }

    // Reads

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.repo.get(id)
    }

    pub fn list(&self) -> Vec<&Task> {
        self.repo.list()
    }

    pub fn filter(&self, filter: &TaskFilter) -> Vec<&Task> {
        self.repo.filter(filter)
    }

    pub fn repository(&self) -> &TaskRepository {
        &self.repo
    }

    pub fn history(&self) -> &CommandLog {
        &self.log
    }

    pub fn recently_created_ids(&self) -> BTreeSet<TaskId> {
        self.reconciler.highlights().recently_created_ids()
    }

    pub fn recently_updated_ids(&self) -> BTreeSet<TaskId> {
        self.reconciler.highlights().recently_updated_ids()
    }

    pub fn highlights(&self) -> &HighlightRegistry {
        self.reconciler.highlights()
    }

    pub fn persist_failures(&self) -> &[PersistFailure] {
        &self.persist_failures
    }

    pub fn take_persist_failures(&mut self) -> Vec<PersistFailure> {
        std::mem::take(&mut self.persist_failures)
    }

    // Mutations

    pub fn create(&mut self, draft: TaskDraft) -> Result<Task> {
        let task = draft.into_task(TaskId::generate(), Utc::now())?;
        let command = Command::single(Operation::Create, TaskChange::Create { task });
        self.commit_one(command)
    }

    pub fn update(&mut self, id: &TaskId, patch: TaskPatch) -> Result<Task> {
        let change = self.plan_update(id, &patch)?;
        self.commit_one(Command::single(Operation::Update, change))
    }

    pub fn delete(&mut self, id: &TaskId) -> Result<Task> {
        let task = self
            .repo
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.clone()))?;
        let command = Command::single(Operation::Delete, TaskChange::Delete { task: task.clone() });
        self.commit(command);
        Ok(task)
    }

    pub fn complete(&mut self, id: &TaskId) -> Result<Task> {
        let change = self.plan_update(id, &complete_patch())?;
        self.commit_one(Command::single(Operation::Complete, change))
    }

    pub fn snooze(&mut self, id: &TaskId, until: DateTime<Utc>) -> Result<Task> {
        let change = self.plan_update(id, &snooze_patch(until))?;
        self.commit_one(Command::single(Operation::Snooze, change))
    }

    pub fn reschedule(
        &mut self,
        id: &TaskId,
        new_date: NaiveDate,
        reason: Option<String>,
    ) -> Result<Task> {
        let change = self.plan_reschedule(id, new_date, reason)?;
        self.commit_one(Command::single(Operation::Reschedule, change))
    }

    pub fn bulk_complete(&mut self, ids: &[TaskId]) -> Result<Vec<Task>> {
        let patch = complete_patch();
        let changes = self.plan_bulk(ids, |engine, id| engine.plan_update(id, &patch))?;
        self.commit_many(Command::composite(Operation::BulkComplete, changes))
    }

    pub fn bulk_snooze(&mut self, ids: &[TaskId], until: DateTime<Utc>) -> Result<Vec<Task>> {
        let patch = snooze_patch(until);
        let changes = self.plan_bulk(ids, |engine, id| engine.plan_update(id, &patch))?;
        self.commit_many(Command::composite(Operation::BulkSnooze, changes))
    }

    pub fn bulk_reschedule(
        &mut self,
        ids: &[TaskId],
        new_date: NaiveDate,
        reason: Option<String>,
    ) -> Result<Vec<Task>> {
        let changes = self.plan_bulk(ids, |engine, id| {
            engine.plan_reschedule(id, new_date, reason.clone())
        })?;
        self.commit_many(Command::composite(Operation::BulkReschedule, changes))
    }

    /// Delete several tasks as one undoable step; returns the removed tasks.
    pub fn bulk_delete(&mut self, ids: &[TaskId]) -> Result<Vec<Task>> {
        let changes = self.plan_bulk(ids, |engine, id| engine.plan_delete(id))?;
        let removed = changes
            .iter()
            .filter_map(|change| match change {
                TaskChange::Delete { task } => Some(task.clone()),
                _ => None,
            })
            .collect();
        self.commit(Command::composite(Operation::BulkDelete, changes));
        Ok(removed)
    }

    // History

    pub fn can_undo(&self) -> bool {
        self.log.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.log.can_redo()
    }

    /// Revert the command at the cursor. Returns false when nothing to undo.
    pub fn undo(&mut self) -> bool {
        self.undo_step().is_some()
    }

    /// Re-apply the command after the cursor. Returns false when nothing to redo.
    pub fn redo(&mut self) -> bool {
        self.redo_step().is_some()
    }

    /// Like [`TaskEngine::undo`], with details of what changed.
    pub fn undo_step(&mut self) -> Option<UndoSummary> {
        let command = self.log.step_back()?.clone();
        let summary = undo::apply_inverse(&mut self.repo, &command);
        tracing::debug!(command_id = %command.id, operation = %command.operation, "undo");
        self.after_history_move(&command, &summary, EventKind::Undone);
        Some(summary)
    }

    /// Like [`TaskEngine::redo`], with details of what changed.
    pub fn redo_step(&mut self) -> Option<UndoSummary> {
        let command = self.log.step_forward()?.clone();
        let summary = undo::apply_forward(&mut self.repo, &command);
        tracing::debug!(command_id = %command.id, operation = %command.operation, "redo");
        self.after_history_move(&command, &summary, EventKind::Redone);
        Some(summary)
    }

    // Remote adaptation

    /// Absorb a server adaptation. Never touches the undo history.
    pub fn reconcile(&mut self, event: AdaptationEvent) -> ReconcileOutcome {
        let outcome = self.reconciler.reconcile(&self.repo, event);
        self.emit_outcome(&outcome);
        outcome
    }

    /// Absorb a raw JSON adaptation push; malformed payloads are dropped.
    pub fn reconcile_raw(&mut self, payload: &str) -> ReconcileOutcome {
        let outcome = self.reconciler.reconcile_raw(&self.repo, payload);
        self.emit_outcome(&outcome);
        outcome
    }

    /// Upsert tasks returned by the re-fetch path, outside the history.
    pub fn apply_remote_tasks(&mut self, tasks: Vec<Task>) -> RemoteSummary {
        let summary = self.reconciler.absorb(&mut self.repo, tasks);
        self.emit(EventKind::RemoteTasksApplied, &summary);
        summary
    }

    /// Tear down session state: cancels the highlight timer and clears the
    /// repository and history.
    pub fn dispose(&mut self) {
        self.reconciler.dispose();
        self.log.clear();
        self.repo.clear();
        self.persist_failures.clear();
        tracing::debug!("engine disposed");
    }

    // Internals

    fn plan_update(&self, id: &TaskId, patch: &TaskPatch) -> Result<TaskChange> {
        let task = self.repo.get(id).ok_or_else(|| Error::NotFound(id.clone()))?;
        let mut next = patch.resolve(task)?;
        next.push(TaskField::UpdatedAt(touch(task)));
        let previous = task.snapshot(next.iter().map(TaskField::key));
        Ok(TaskChange::Update {
            id: id.clone(),
            previous,
            next,
        })
    }

    fn plan_reschedule(
        &self,
        id: &TaskId,
        new_date: NaiveDate,
        reason: Option<String>,
    ) -> Result<TaskChange> {
        // The old due date has to be read before anything is written.
        let current = self.repo.get(id).ok_or_else(|| Error::NotFound(id.clone()))?;
        let patch = TaskPatch {
            due_date: Some(Some(new_date)),
            status: Some(TaskStatus::Pending),
            rescheduled_from: Some(current.due_date),
            rescheduled_reason: Some(reason),
            ..TaskPatch::default()
        };
        self.plan_update(id, &patch)
    }

    fn plan_delete(&self, id: &TaskId) -> Result<TaskChange> {
        let task = self.repo.get(id).ok_or_else(|| Error::NotFound(id.clone()))?;
        Ok(TaskChange::Delete { task: task.clone() })
    }

    /// Plan every item before writing anything; ids must be distinct so each
    /// plan only depends on pre-bulk state.
    fn plan_bulk<F>(&self, ids: &[TaskId], mut plan: F) -> Result<Vec<TaskChange>>
    where
        F: FnMut(&Self, &TaskId) -> Result<TaskChange>,
    {
        if ids.is_empty() {
            return Err(Error::Validation(
                "bulk operation needs at least one task id".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for id in ids {
            if !seen.insert(id) {
                return Err(Error::Validation(format!(
                    "duplicate task id in bulk operation: {id}"
                )));
            }
        }
        ids.iter().map(|id| plan(self, id)).collect()
    }

    fn commit_one(&mut self, command: Command) -> Result<Task> {
        let id = command
            .changes()
            .first()
            .map(|change| change.task_id().clone())
            .ok_or_else(|| Error::Validation("command has no changes".to_string()))?;
        self.commit(command);
        self.repo.get(&id).cloned().ok_or(Error::NotFound(id))
    }

    fn commit_many(&mut self, command: Command) -> Result<Vec<Task>> {
        let ids = command.task_ids();
        self.commit(command);
        ids.into_iter()
            .map(|id| self.repo.get(&id).cloned().ok_or(Error::NotFound(id)))
            .collect()
    }

    /// Apply a planned command, append it, then hand it to the sink.
    fn commit(&mut self, command: Command) {
        for change in command.changes() {
            undo::apply_change(&mut self.repo, change);
        }
        tracing::debug!(
            command_id = %command.id,
            operation = %command.operation,
            tasks = command.changes().len(),
            "mutation applied"
        );

        self.persist(&command, Direction::Apply);
        self.emit(
            event_kind(command.operation),
            MutationPayload {
                command_id: command.id,
                operation: command.operation,
                task_ids: command.task_ids(),
            },
        );

        if let Some(evicted) = self.log.append(command) {
            tracing::debug!(command_id = %evicted.id, "oldest command evicted from history");
        }
    }

    fn after_history_move(&mut self, command: &Command, summary: &UndoSummary, kind: EventKind) {
        self.persist(command, summary.direction);
        self.emit(kind, summary);
    }

    fn persist(&mut self, command: &Command, direction: Direction) {
        if let Err(err) = self.sink.persist(command, direction) {
            tracing::warn!(
                command_id = %command.id,
                operation = %command.operation,
                error = %err,
                "persisting mutation failed; keeping local state"
            );
            let failure = PersistFailure {
                command_id: command.id,
                operation: command.operation,
                direction,
                error: err.to_string(),
                at: Utc::now(),
            };
            self.emit(EventKind::PersistFailed, &failure);
            self.persist_failures.push(failure);
        }
    }

    fn emit_outcome(&mut self, outcome: &ReconcileOutcome) {
        let kind = match outcome {
            ReconcileOutcome::Applied(_) => EventKind::AdaptationApplied,
            ReconcileOutcome::Dropped { .. } => EventKind::AdaptationDropped,
        };
        self.emit(kind, outcome);
    }

    fn emit<T: Serialize>(&mut self, kind: EventKind, data: T) {
        let Some(sink) = self.events.as_mut() else {
            return;
        };
        let result = Event::new(kind)
            .with_data(data)
            .and_then(|event| sink.emit(&event));
        if let Err(err) = result {
            tracing::warn!(error = %err, "failed to emit engine event");
        }
    }
}

#[derive(Serialize)]
struct MutationPayload {
    command_id: Uuid,
    operation: Operation,
    task_ids: Vec<TaskId>,
}

fn event_kind(operation: Operation) -> EventKind {
    match operation {
        Operation::Create => EventKind::TaskCreated,
        Operation::Update => EventKind::TaskUpdated,
        Operation::Complete => EventKind::TaskCompleted,
        Operation::Snooze => EventKind::TaskSnoozed,
        Operation::Reschedule => EventKind::TaskRescheduled,
        Operation::Delete => EventKind::TaskDeleted,
        Operation::BulkComplete
        | Operation::BulkSnooze
        | Operation::BulkReschedule
        | Operation::BulkDelete => EventKind::BulkApplied,
    }
}

fn complete_patch() -> TaskPatch {
    TaskPatch {
        status: Some(TaskStatus::Completed),
        ..TaskPatch::default()
    }
}

fn snooze_patch(until: DateTime<Utc>) -> TaskPatch {
    TaskPatch {
        status: Some(TaskStatus::Snoozed),
        snooze_until: Some(Some(until)),
        ..TaskPatch::default()
    }
}

/// New `updated_at` for a task; never earlier than its current value.
fn touch(task: &Task) -> DateTime<Utc> {
    Utc::now().max(task.updated_at)
}

/// Feed raw adaptation payloads into a shared engine in arrival order.
///
/// Resolves to the number of payloads that were applied once the sender
/// side closes.
pub fn spawn_adaptation_listener(
    engine: Arc<Mutex<TaskEngine>>,
    mut rx: mpsc::Receiver<String>,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut applied = 0;
        while let Some(payload) = rx.recv().await {
            let mut engine = engine.lock().unwrap_or_else(PoisonError::into_inner);
            if engine.reconcile_raw(&payload).is_applied() {
                applied += 1;
            }
        }
        applied
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::RecordingRefetch;
    use crate::task::Priority;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    struct FailingSink;

    impl MutationSink for FailingSink {
        fn persist(&mut self, _command: &Command, _direction: Direction) -> Result<()> {
            Err(Error::Persist("offline".to_string()))
        }
    }

    #[test]
    fn create_update_complete_then_undo_everything() {
        let mut engine = TaskEngine::default();
        let task = engine.create(TaskDraft::new("Draft outline")).expect("create");
        let original_priority = task.priority;

        engine
            .update(
                &task.id,
                TaskPatch {
                    priority: Some(Priority::High),
                    ..TaskPatch::default()
                },
            )
            .expect("update");
        let done = engine.complete(&task.id).expect("complete");
        assert_eq!(done.status, TaskStatus::Completed);
        assert!(done.completed);

        assert!(engine.undo());
        let current = engine.get(&task.id).expect("task");
        assert_eq!(current.status, TaskStatus::Pending);
        assert!(!current.completed);

        assert!(engine.undo());
        assert_eq!(engine.get(&task.id).unwrap().priority, original_priority);

        assert!(engine.undo());
        assert!(engine.get(&task.id).is_none());
        assert!(!engine.can_undo());
        assert!(!engine.undo());
    }

    #[test]
    fn update_undo_restores_original_timestamp() {
        let mut engine = TaskEngine::default();
        let task = engine.create(TaskDraft::new("a")).expect("create");
        let updated = engine
            .update(
                &task.id,
                TaskPatch {
                    title: Some("b".to_string()),
                    ..TaskPatch::default()
                },
            )
            .expect("update");
        assert!(updated.updated_at >= task.updated_at);

        engine.undo();
        assert_eq!(engine.get(&task.id), Some(&task));
    }

    #[test]
    fn missing_task_is_not_found_and_writes_nothing() {
        let mut engine = TaskEngine::default();
        let ghost = TaskId::from("ghost");
        assert!(matches!(engine.complete(&ghost), Err(Error::NotFound(_))));
        assert!(matches!(engine.delete(&ghost), Err(Error::NotFound(_))));
        assert!(engine.history().is_empty());
        assert!(engine.repository().is_empty());
    }

    #[test]
    fn invalid_patch_writes_nothing() {
        let mut engine = TaskEngine::default();
        let task = engine.create(TaskDraft::new("a")).expect("create");
        let err = engine
            .update(
                &task.id,
                TaskPatch {
                    title: Some("  ".to_string()),
                    ..TaskPatch::default()
                },
            )
            .expect_err("blank title");
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(engine.history().len(), 1);
        assert_eq!(engine.get(&task.id), Some(&task));
    }

    #[test]
    fn reschedule_records_previous_due_date() {
        let mut engine = TaskEngine::default();
        let task = engine
            .create(TaskDraft::new("Trip").with_due_date(date(2025, 6, 20)))
            .expect("create");

        let moved = engine
            .reschedule(&task.id, date(2025, 7, 1), Some("vacation".to_string()))
            .expect("reschedule");
        assert_eq!(moved.rescheduled_from, Some(date(2025, 6, 20)));
        assert_eq!(moved.due_date, Some(date(2025, 7, 1)));
        assert_eq!(moved.rescheduled_reason.as_deref(), Some("vacation"));
        assert_eq!(moved.status, TaskStatus::Pending);

        engine.undo();
        let restored = engine.get(&task.id).unwrap();
        assert_eq!(restored.due_date, Some(date(2025, 6, 20)));
        assert_eq!(restored.rescheduled_from, None);
    }

    #[test]
    fn reschedule_resets_snoozed_task() {
        let mut engine = TaskEngine::default();
        let task = engine.create(TaskDraft::new("a")).expect("create");
        engine
            .snooze(&task.id, Utc::now() + chrono::Duration::hours(2))
            .expect("snooze");
        let moved = engine
            .reschedule(&task.id, date(2025, 1, 2), None)
            .expect("reschedule");
        assert_eq!(moved.status, TaskStatus::Pending);
        assert!(moved.snooze_until.is_none());
        moved.check_invariants().expect("invariants");
    }

    #[test]
    fn bulk_complete_is_one_step() {
        let mut engine = TaskEngine::builder().history_capacity(10).build();
        let ids: Vec<TaskId> = (0..3)
            .map(|i| engine.create(TaskDraft::new(format!("t{i}"))).unwrap().id)
            .collect();
        engine.log.clear();
        let before = engine.repository().clone();

        let done = engine.bulk_complete(&ids).expect("bulk");
        assert!(done.iter().all(|task| task.completed));
        assert_eq!(engine.history().len(), 1);

        assert!(engine.undo());
        assert_eq!(engine.repository(), &before);
        assert!(!engine.can_undo());
    }

    #[test]
    fn bulk_with_missing_id_writes_nothing() {
        let mut engine = TaskEngine::default();
        let a = engine.create(TaskDraft::new("a")).unwrap();
        let before = engine.repository().clone();

        let err = engine
            .bulk_complete(&[a.id.clone(), TaskId::from("ghost")])
            .expect_err("missing id");
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(engine.repository(), &before);
        assert_eq!(engine.history().len(), 1);
    }

    #[test]
    fn bulk_rejects_empty_and_duplicate_ids() {
        let mut engine = TaskEngine::default();
        let a = engine.create(TaskDraft::new("a")).unwrap();
        assert!(matches!(engine.bulk_delete(&[]), Err(Error::Validation(_))));
        assert!(matches!(
            engine.bulk_delete(&[a.id.clone(), a.id.clone()]),
            Err(Error::Validation(_))
        ));
        assert!(engine.get(&a.id).is_some());
    }

    #[test]
    fn bulk_delete_undo_restores_all() {
        let mut engine = TaskEngine::default();
        let a = engine.create(TaskDraft::new("a")).unwrap();
        let b = engine.create(TaskDraft::new("b")).unwrap();
        let before = engine.repository().clone();

        let removed = engine.bulk_delete(&[a.id.clone(), b.id.clone()]).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(engine.repository().is_empty());

        assert!(engine.undo());
        assert_eq!(engine.repository(), &before);
        assert!(engine.redo());
        assert!(engine.repository().is_empty());
    }

    #[test]
    fn persist_failure_keeps_local_state() {
        let mut engine = TaskEngine::builder().sink(FailingSink).build();
        let task = engine.create(TaskDraft::new("a")).expect("create");
        assert!(engine.get(&task.id).is_some());
        assert!(engine.can_undo());

        let failures = engine.take_persist_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].operation, Operation::Create);
        assert_eq!(failures[0].direction, Direction::Apply);
        assert!(engine.persist_failures().is_empty());
    }

    #[test]
    fn reconcile_leaves_history_alone() {
        let refetch = RecordingRefetch::new();
        let mut engine = TaskEngine::builder().refetch(refetch.clone()).build();
        let task = engine.create(TaskDraft::new("a")).unwrap();
        engine.undo();
        engine.redo();
        let len = engine.history().len();
        let cursor = engine.history().cursor();

        for _ in 0..3 {
            engine.reconcile(AdaptationEvent::new(
                "g1",
                vec![TaskId::from("srv")],
                vec![task.id.clone()],
            ));
        }
        engine.reconcile_raw("garbage");

        assert_eq!(engine.history().len(), len);
        assert_eq!(engine.history().cursor(), cursor);
        assert!(engine.recently_updated_ids().contains(&task.id));
        assert!(!refetch.requests().is_empty());
    }

    #[test]
    fn remote_tasks_bypass_history() {
        let mut engine = TaskEngine::default();
        let now = Utc::now();
        let remote = TaskDraft::new("Server task")
            .into_task(TaskId::from("srv-1"), now)
            .unwrap();
        let summary = engine.apply_remote_tasks(vec![remote]);
        assert_eq!(summary.inserted, vec![TaskId::from("srv-1")]);
        assert!(engine.get(&TaskId::from("srv-1")).is_some());
        assert!(!engine.can_undo());
    }

    #[test]
    fn dispose_clears_session() {
        let mut engine = TaskEngine::default();
        engine.create(TaskDraft::new("a")).unwrap();
        engine.reconcile(AdaptationEvent::new("g", vec![], vec![TaskId::from("x")]));
        engine.dispose();
        assert!(engine.list().is_empty());
        assert!(!engine.can_undo());
        assert!(engine.recently_updated_ids().is_empty());
    }
}
