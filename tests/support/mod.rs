#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use chrono::NaiveDate;
use taskstate::collab::RecordingRefetch;
use taskstate::task::{Task, TaskDraft, TaskId};
use taskstate::{TaskEngine, TaskEngineBuilder};
use tempfile::TempDir;

/// Engine with a recording re-fetch collaborator and a small history.
pub fn engine_with_refetch(capacity: usize) -> (TaskEngine, RecordingRefetch) {
    let refetch = RecordingRefetch::new();
    let engine = TaskEngineBuilder::default()
        .history_capacity(capacity)
        .refetch(refetch.clone())
        .build();
    (engine, refetch)
}

/// Create `count` tasks titled `t0..tN`, returning their ids.
pub fn seed(engine: &mut TaskEngine, count: usize) -> Vec<TaskId> {
    (0..count)
        .map(|i| {
            engine
                .create(TaskDraft::new(format!("t{i}")))
                .expect("create task")
                .id
        })
        .collect()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// A task as the server would send it on re-fetch.
pub fn remote_task(id: &str, title: &str) -> Task {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "title": title,
        "status": "PENDING",
        "createdAt": "2025-06-01T09:00:00Z",
        "updatedAt": "2025-06-01T09:00:00Z",
    }))
    .expect("remote task")
}

/// Scratch directory for scripts and config files used by the binary.
pub struct Workdir {
    dir: TempDir,
}

impl Workdir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("failed to create tempdir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_file(&self, rel_path: &str, contents: &str) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = taskstate_cmd();
        cmd.current_dir(self.path());
        cmd
    }
}

pub fn taskstate_cmd() -> Command {
    let mut cmd = Command::cargo_bin("taskstate").expect("binary");
    cmd.env_remove("TASKSTATE_CONFIG");
    cmd.env_remove("TASKSTATE_EVENTS");
    cmd.env_remove("RUST_LOG");
    cmd
}
