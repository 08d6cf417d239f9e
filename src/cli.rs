use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "warden", version, about = "Capability-gated agent orchestration core")]
pub struct Cli {
    /// Path to config file (replaces the global config file)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Workspace directory path
    #[arg(short, long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Ollama model name (e.g., "llama3.2", "qwen2.5:7b")
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Policy file path
    #[arg(long, global = true)]
    pub policy: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect or change the capability policy
    Policy {
        #[command(subcommand)]
        action: PolicyAction,
    },
    /// Run one foreground agent turn
    Run {
        /// The user prompt
        #[arg(short, long)]
        prompt: String,

        /// Specialist role restricting the visible tools
        #[arg(long)]
        specialist: Option<String>,

        /// Disable streaming responses from the backend
        #[arg(long)]
        no_stream: bool,
    },
    /// Run a background sub-agent and wait for it to settle
    Spawn {
        /// Task description handed to the sub-agent
        #[arg(short, long)]
        task: String,

        /// Display name for the sub-agent
        #[arg(short, long)]
        name: Option<String>,

        /// Seconds to wait before giving up on the record
        #[arg(long, default_value_t = 600)]
        wait_secs: u64,
    },
    /// Run the proactive heartbeat until Ctrl+C
    Heartbeat {
        /// Override the beat interval in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Override the heartbeat prompt
        #[arg(long)]
        prompt: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum PolicyAction {
    /// Print the current policy state
    Show,
    /// List the built-in profiles
    Profiles,
    /// Set the execution mode (`manual` or `disabled`)
    Mode { mode: String },
    /// Enable a capability
    Enable { capability: String },
    /// Disable a capability
    Disable { capability: String },
    /// Apply a built-in profile
    Apply { profile: String },
}
