//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: drive a training loop from an input file
//! - history: print the recorded checkpoints of a loop

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Improvr - closed-loop continuous improvement for agent prompts
#[derive(Parser, Debug)]
#[command(name = "improvr")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a training loop; reads pause/resume/abort/approve/reject/skip/status from stdin
    Run {
        /// Training loop input (YAML)
        input: PathBuf,

        /// Scripted collaborator scenario (YAML); built-in defaults when omitted
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Directory for the checkpoint log (overrides storage.record-dir)
        #[arg(short, long)]
        record_dir: Option<PathBuf>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the recorded checkpoints of a loop
    History {
        /// Loop ID to look up
        loop_id: String,

        /// Directory of the checkpoint log (overrides storage.record-dir)
        #[arg(short, long)]
        record_dir: Option<PathBuf>,
    },
}
