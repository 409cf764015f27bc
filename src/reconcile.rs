//! Reconciliation of server-pushed plan adaptations.
//!
//! Adaptations are remote changes and are never recorded in the command
//! log. The reconciler only sees the repository and its own collaborators,
//! so it cannot touch the undo history.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::collab::RefetchSignal;
use crate::error::{Error, Result};
use crate::highlight::HighlightRegistry;
use crate::repository::TaskRepository;
use crate::task::{Task, TaskId};

/// Server notification that a goal's task set changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptationEvent {
    pub goal_id: String,
    #[serde(default)]
    pub created_ids: Vec<TaskId>,
    #[serde(default)]
    pub updated_ids: Vec<TaskId>,
}

impl AdaptationEvent {
    pub fn new(
        goal_id: impl Into<String>,
        created_ids: Vec<TaskId>,
        updated_ids: Vec<TaskId>,
    ) -> Self {
        Self {
            goal_id: goal_id.into(),
            created_ids,
            updated_ids,
        }
    }

    /// Parse and validate a raw JSON push.
    pub fn parse(payload: &str) -> Result<Self> {
        let event: AdaptationEvent = serde_json::from_str(payload)
            .map_err(|err| Error::Validation(format!("malformed adaptation event: {err}")))?;
        event.validate()?;
        Ok(event)
    }

    pub fn validate(&self) -> Result<()> {
        if self.goal_id.trim().is_empty() {
            return Err(Error::Validation(
                "adaptation event has an empty goalId".to_string(),
            ));
        }
        let blank = self
            .created_ids
            .iter()
            .chain(&self.updated_ids)
            .any(|id| id.as_str().trim().is_empty());
        if blank {
            return Err(Error::Validation(
                "adaptation event contains an empty task id".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub goal_id: String,
    pub generation: u64,
    /// Named ids already present locally.
    pub known: Vec<TaskId>,
    /// Named ids requested from the re-fetch path.
    pub missing: Vec<TaskId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Applied(ReconcileSummary),
    Dropped { reason: String },
}

impl ReconcileOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ReconcileOutcome::Applied(_))
    }
}

/// Result of absorbing re-fetched server tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemoteSummary {
    pub inserted: Vec<TaskId>,
    pub replaced: Vec<TaskId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<String>,
}

pub struct Reconciler {
    highlights: HighlightRegistry,
    refetch: Box<dyn RefetchSignal>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("highlights", &self.highlights)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(highlights: HighlightRegistry, refetch: Box<dyn RefetchSignal>) -> Self {
        Self {
            highlights,
            refetch,
        }
    }

    pub fn highlights(&self) -> &HighlightRegistry {
        &self.highlights
    }

    /// Merge one adaptation event. Arrival order is application order.
    pub fn reconcile(&mut self, repo: &TaskRepository, event: AdaptationEvent) -> ReconcileOutcome {
        if let Err(err) = event.validate() {
            return self.drop_event(err);
        }

        let named: BTreeSet<&TaskId> = event.created_ids.iter().chain(&event.updated_ids).collect();
        let (known, missing): (Vec<TaskId>, Vec<TaskId>) = named
            .into_iter()
            .cloned()
            .partition(|id| repo.contains(id));

        if !missing.is_empty() {
            self.refetch.fetch_tasks(&event.goal_id, &missing);
        }
        self.refetch.goal_changed(&event.goal_id);
        self.refetch.today_changed();

        let generation = self.highlights.arm(event.created_ids, event.updated_ids);

        tracing::debug!(
            goal_id = %event.goal_id,
            generation,
            known = known.len(),
            missing = missing.len(),
            "adaptation reconciled"
        );

        ReconcileOutcome::Applied(ReconcileSummary {
            goal_id: event.goal_id,
            generation,
            known,
            missing,
        })
    }

    /// Merge a raw JSON push. Malformed payloads are logged and dropped.
    pub fn reconcile_raw(&mut self, repo: &TaskRepository, payload: &str) -> ReconcileOutcome {
        match AdaptationEvent::parse(payload) {
            Ok(event) => self.reconcile(repo, event),
            Err(err) => self.drop_event(err),
        }
    }

    /// Upsert tasks fetched from the server, last writer wins.
    pub fn absorb(&mut self, repo: &mut TaskRepository, tasks: Vec<Task>) -> RemoteSummary {
        let mut summary = RemoteSummary::default();
        for task in tasks {
            if task.id.as_str().trim().is_empty() || task.title.trim().is_empty() {
                tracing::warn!(task_id = %task.id, "rejecting remote task without id or title");
                summary.rejected.push(task.id.to_string());
                continue;
            }
            let task = task.normalized();
            let id = task.id.clone();
            match repo.upsert(task) {
                Some(_) => summary.replaced.push(id),
                None => summary.inserted.push(id),
            }
        }
        tracing::debug!(
            inserted = summary.inserted.len(),
            replaced = summary.replaced.len(),
            "remote tasks absorbed"
        );
        summary
    }

    pub fn dispose(&mut self) {
        self.highlights.cancel();
    }

    fn drop_event(&self, err: Error) -> ReconcileOutcome {
        tracing::warn!(error = %err, "dropping adaptation event");
        ReconcileOutcome::Dropped {
            reason: err.to_string(),
        }
    }
}
