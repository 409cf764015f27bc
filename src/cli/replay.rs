//! taskstate replay implementation.
//!
//! Reads a JSONL script, one operation per line, and drives a fresh engine
//! through it. Blank lines and lines starting with `#` are skipped.
//!
//! ```text
//! {"op":"create","as":"a","task":{"title":"Draft outline","dueDate":"2025-06-20"}}
//! {"op":"reschedule","id":"a","date":"2025-07-01","reason":"vacation"}
//! {"op":"undo"}
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::engine::{TaskEngine, TaskEngineBuilder};
use crate::error::{Error, Result};
use crate::events::EventDestination;
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::task::{Task, TaskDraft, TaskId, TaskPatch};

pub struct ReplayOptions {
    pub script: PathBuf,
    pub config: Config,
    pub events: Option<String>,
    pub output: OutputOptions,
}

/// One scripted engine call.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum ScriptOp {
    Create {
        /// Name later steps can use instead of the generated id.
        #[serde(default, rename = "as")]
        alias: Option<String>,
        task: TaskDraft,
    },
    Update {
        id: String,
        patch: serde_json::Value,
    },
    Delete {
        id: String,
    },
    Complete {
        id: String,
    },
    Snooze {
        id: String,
        until: DateTime<Utc>,
    },
    Reschedule {
        id: String,
        date: NaiveDate,
        #[serde(default)]
        reason: Option<String>,
    },
    BulkComplete {
        ids: Vec<String>,
    },
    BulkSnooze {
        ids: Vec<String>,
        until: DateTime<Utc>,
    },
    BulkReschedule {
        ids: Vec<String>,
        date: NaiveDate,
        #[serde(default)]
        reason: Option<String>,
    },
    BulkDelete {
        ids: Vec<String>,
    },
    Undo,
    Redo,
    /// Raw adaptation push, passed through as-is.
    Adapt {
        event: serde_json::Value,
    },
    Remote {
        tasks: Vec<Task>,
    },
}

#[derive(Debug, Serialize)]
struct HistoryState {
    len: usize,
    capacity: usize,
    cursor: Option<usize>,
    can_undo: bool,
    can_redo: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_undo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_redo: Option<String>,
}

#[derive(Debug, Serialize)]
struct ReplayReport {
    steps: usize,
    tasks: Vec<Task>,
    history: HistoryState,
    recently_created: BTreeSet<TaskId>,
    recently_updated: BTreeSet<TaskId>,
    /// Undo/redo/adapt steps that had nothing to act on.
    noops: Vec<usize>,
}

/// Run the replay command.
pub fn run(options: ReplayOptions) -> Result<()> {
    let ops = read_script(&options.script)?;

    let mut builder = TaskEngineBuilder::from_config(&options.config)?;
    if let Some(destination) = EventDestination::parse(options.events.as_deref()) {
        builder = builder.events(destination.open()?);
    }
    let mut replay = Replay::new(builder.build());

    let steps = ops.len();
    for (line, op) in ops {
        tracing::debug!(line, "replaying step");
        replay.step(line, op)?;
    }

    let report = replay.report(steps);
    let human = human_report(&report);
    emit_success(options.output, "replay", &report, Some(&human))
}

fn read_script(path: &Path) -> Result<Vec<(usize, ScriptOp)>> {
    let content = std::fs::read_to_string(path)?;
    parse_script(&content).map_err(|err| match err {
        Error::InvalidArgument(message) => {
            Error::InvalidArgument(format!("{}:{message}", path.display()))
        }
        other => other,
    })
}

/// Parse script text into operations tagged with their 1-based line.
pub(crate) fn parse_script(content: &str) -> Result<Vec<(usize, ScriptOp)>> {
    let mut ops = Vec::new();
    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let op: ScriptOp = serde_json::from_str(line).map_err(|err| {
            Error::InvalidArgument(format!("{}: invalid step: {err}", index + 1))
        })?;
        ops.push((index + 1, op));
    }
    Ok(ops)
}

/// Engine plus the alias table built up by `create` steps.
pub(crate) struct Replay {
    engine: TaskEngine,
    aliases: HashMap<String, TaskId>,
    noops: Vec<usize>,
}

impl Replay {
    pub(crate) fn new(engine: TaskEngine) -> Self {
        Self {
            engine,
            aliases: HashMap::new(),
            noops: Vec::new(),
        }
    }

    pub(crate) fn engine(&self) -> &TaskEngine {
        &self.engine
    }

    pub(crate) fn step(&mut self, line: usize, op: ScriptOp) -> Result<()> {
        match op {
            ScriptOp::Create { alias, task } => {
                if let Some(alias) = alias.as_deref() {
                    if self.aliases.contains_key(alias) {
                        return Err(Error::InvalidArgument(format!(
                            "{line}: alias '{alias}' is already defined"
                        )));
                    }
                }
                let created = self.engine.create(task)?;
                if let Some(alias) = alias {
                    self.aliases.insert(alias, created.id);
                }
            }
            ScriptOp::Update { id, patch } => {
                let id = self.resolve(&id);
                self.engine.update(&id, TaskPatch::from_json(patch)?)?;
            }
            ScriptOp::Delete { id } => {
                let id = self.resolve(&id);
                self.engine.delete(&id)?;
            }
            ScriptOp::Complete { id } => {
                let id = self.resolve(&id);
                self.engine.complete(&id)?;
            }
            ScriptOp::Snooze { id, until } => {
                let id = self.resolve(&id);
                self.engine.snooze(&id, until)?;
            }
            ScriptOp::Reschedule { id, date, reason } => {
                let id = self.resolve(&id);
                self.engine.reschedule(&id, date, reason)?;
            }
            ScriptOp::BulkComplete { ids } => {
                let ids = self.resolve_all(&ids);
                self.engine.bulk_complete(&ids)?;
            }
            ScriptOp::BulkSnooze { ids, until } => {
                let ids = self.resolve_all(&ids);
                self.engine.bulk_snooze(&ids, until)?;
            }
            ScriptOp::BulkReschedule { ids, date, reason } => {
                let ids = self.resolve_all(&ids);
                self.engine.bulk_reschedule(&ids, date, reason)?;
            }
            ScriptOp::BulkDelete { ids } => {
                let ids = self.resolve_all(&ids);
                self.engine.bulk_delete(&ids)?;
            }
            ScriptOp::Undo => {
                if !self.engine.undo() {
                    self.noops.push(line);
                }
            }
            ScriptOp::Redo => {
                if !self.engine.redo() {
                    self.noops.push(line);
                }
            }
            ScriptOp::Adapt { event } => {
                let event = self.resolve_event_ids(event);
                if !self.engine.reconcile_raw(&event.to_string()).is_applied() {
                    self.noops.push(line);
                }
            }
            ScriptOp::Remote { tasks } => {
                self.engine.apply_remote_tasks(tasks);
            }
        }
        Ok(())
    }

    fn resolve(&self, raw: &str) -> TaskId {
        self.aliases
            .get(raw)
            .cloned()
            .unwrap_or_else(|| TaskId::from(raw))
    }

    fn resolve_all(&self, raw: &[String]) -> Vec<TaskId> {
        raw.iter().map(|id| self.resolve(id)).collect()
    }

    /// Swap aliases for real ids inside an adaptation payload's id lists.
    fn resolve_event_ids(&self, mut event: serde_json::Value) -> serde_json::Value {
        for key in ["createdIds", "updatedIds"] {
            if let Some(ids) = event.get_mut(key).and_then(|ids| ids.as_array_mut()) {
                for id in ids.iter_mut() {
                    if let Some(real) = id.as_str().and_then(|raw| self.aliases.get(raw)) {
                        *id = serde_json::Value::String(real.to_string());
                    }
                }
            }
        }
        event
    }

    fn report(&self, steps: usize) -> ReplayReport {
        let log = self.engine.history();
        ReplayReport {
            steps,
            tasks: self.engine.list().into_iter().cloned().collect(),
            history: HistoryState {
                len: log.len(),
                capacity: log.capacity(),
                cursor: log.cursor(),
                can_undo: log.can_undo(),
                can_redo: log.can_redo(),
                next_undo: log.peek_undo().map(|command| command.label()),
                next_redo: log.peek_redo().map(|command| command.label()),
            },
            recently_created: self.engine.recently_created_ids(),
            recently_updated: self.engine.recently_updated_ids(),
            noops: self.noops.clone(),
        }
    }
}

fn human_report(report: &ReplayReport) -> HumanOutput {
    let mut human = HumanOutput::new(format!("Replayed {} steps", report.steps));
    human.push_summary("Tasks", report.tasks.len().to_string());
    human.push_summary(
        "History",
        format!("{}/{}", report.history.len, report.history.capacity),
    );
    if let Some(label) = &report.history.next_undo {
        human.push_summary("Undo", label.clone());
    }
    if let Some(label) = &report.history.next_redo {
        human.push_summary("Redo", label.clone());
    }
    for task in &report.tasks {
        let due = task
            .due_date
            .map(|date| format!(" (due {date})"))
            .unwrap_or_default();
        human.push_detail(format!(
            "{} [{}] {}{due}",
            task.id,
            task.status.as_str(),
            task.title
        ));
    }
    if !report.noops.is_empty() {
        let lines: Vec<String> = report.noops.iter().map(|line| line.to_string()).collect();
        human.push_warning(format!("no-op steps on lines {}", lines.join(", ")));
    }
    human
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;

    fn run_script(script: &str) -> Result<Replay> {
        let mut replay = Replay::new(TaskEngine::default());
        for (line, op) in parse_script(script)? {
            replay.step(line, op)?;
        }
        Ok(replay)
    }

    #[test]
    fn parse_skips_comments_and_blank_lines() {
        let ops = parse_script("# header\n\n{\"op\":\"undo\"}\n").expect("parse");
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].0, 3);
    }

    #[test]
    fn parse_reports_line_number() {
        let err = parse_script("{\"op\":\"undo\"}\n{\"op\":\"explode\"}").expect_err("bad op");
        match err {
            Error::InvalidArgument(message) => assert!(message.starts_with("2:")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn aliases_resolve_to_generated_ids() {
        let replay = run_script(
            r#"{"op":"create","as":"a","task":{"title":"Draft outline"}}
{"op":"complete","id":"a"}"#,
        )
        .expect("replay");
        let tasks = replay.engine().list();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, TaskStatus::Completed);
    }

    #[test]
    fn unknown_id_fails_step() {
        let err = run_script(r#"{"op":"complete","id":"ghost"}"#)
            .err()
            .expect("missing task");
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn exhausted_undo_is_recorded_as_noop() {
        let replay = run_script("{\"op\":\"undo\"}").expect("replay");
        assert_eq!(replay.report(1).noops, vec![1]);
    }

    #[test]
    fn adapt_resolves_aliases_and_skips_history() {
        let replay = run_script(
            r#"{"op":"create","as":"a","task":{"title":"x"}}
{"op":"adapt","event":{"goalId":"g1","updatedIds":["a"]}}"#,
        )
        .expect("replay");
        let report = replay.report(2);
        assert_eq!(report.history.len, 1);
        assert_eq!(report.recently_updated.len(), 1);
        assert!(report.noops.is_empty());
    }
}
