//! Command-line interface for taskstate
//!
//! This module defines the CLI structure using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::error::Result;
use crate::output::{emit_success, OutputOptions};

mod replay;

/// taskstate - Task State Engine
///
/// Replays task operations through the engine: optimistic mutations,
/// bounded undo/redo history, bulk commands and plan adaptations.
#[derive(Parser, Debug)]
#[command(name = "taskstate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to a config file (defaults to ./.taskstate.toml when present)
    #[arg(long, global = true, env = "TASKSTATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit engine events as JSONL ("-" for stdout, or a file path)
    #[arg(long, global = true, env = "TASKSTATE_EVENTS")]
    pub events: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a JSONL script of engine operations
    Replay {
        /// Script file, one JSON operation per line
        script: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let config = self.load_config()?;
        let options = self.output_options();
        match self.command {
            Commands::Replay { script } => replay::run(replay::ReplayOptions {
                script,
                config,
                events: self.events,
                output: options,
            }),
            Commands::Config => run_config(&config, options),
        }
    }

    fn load_config(&self) -> Result<Config> {
        match &self.config {
            Some(path) => Config::load(path),
            None => Ok(Config::load_from_dir(&std::env::current_dir()?)),
        }
    }

    /// Regular output is suppressed when events already own stdout.
    fn output_options(&self) -> OutputOptions {
        let events_to_stdout = self
            .events
            .as_deref()
            .map(|value| value.trim() == "-")
            .unwrap_or(false);
        OutputOptions {
            json: self.json && !events_to_stdout,
            quiet: self.quiet || events_to_stdout,
        }
    }
}

fn run_config(config: &Config, options: OutputOptions) -> Result<()> {
    if options.json {
        return emit_success(options, "config", config, None);
    }
    if !options.quiet {
        print!("{}", toml::to_string_pretty(config)?);
    }
    Ok(())
}
