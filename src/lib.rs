//! taskstate - Task State Engine
//!
//! A client-side, command-sourced store for tasks: optimistic mutations,
//! a bounded linear undo/redo history, atomic bulk operations and
//! reconciliation of server-pushed plan adaptations.
//!
//! # Core Concepts
//!
//! - **Commands**: every mutation is recorded as a reversible command with
//!   minimal field snapshots
//! - **Composite commands**: bulk operations undo and redo as one unit
//! - **Adaptations**: server pushes are merged outside the history and
//!   highlighted for a short window
//!
//! # Module Organization
//!
//! - `engine`: the mutation API, undo/redo and session lifecycle
//! - `repository`: in-memory task collection
//! - `oplog`: commands and the bounded command log
//! - `undo`: applying commands forward and in reverse
//! - `reconcile`: adaptation event handling
//! - `highlight`: transient highlight sets and their clear timer
//! - `collab`: persistence and re-fetch collaborator seams
//! - `task`: task model, drafts and patches
//! - `events`: JSONL event emission
//! - `config`: configuration loading from `.taskstate.toml`
//! - `error`: error types and result aliases
//! - `cli` / `output`: the `taskstate` command-line front end

pub mod cli;
pub mod collab;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod highlight;
pub mod oplog;
pub mod output;
pub mod reconcile;
pub mod repository;
pub mod task;
pub mod undo;

pub use engine::{TaskEngine, TaskEngineBuilder};
pub use error::{Error, Result};
