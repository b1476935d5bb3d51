//! CLI argument definitions using clap

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// recap - turn recordings into text summaries through a staged pipeline
#[derive(Parser, Debug)]
#[command(name = "recap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the task API server and pipeline workers
    Serve,

    /// Run the OpenAI-compatible inference proxy
    Proxy,

    /// Submit a recording for processing
    Submit {
        /// Path or URL of the recording
        source: String,
    },

    /// Show the status of a task
    Status {
        /// Task ID
        id: String,
    },

    /// Fetch the summary of a completed task
    Result {
        /// Task ID
        id: String,

        /// Output format (text, markdown)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Request cancellation of a running task
    Cancel {
        /// Task ID
        id: String,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}
