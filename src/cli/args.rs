//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::{
    completions::CompletionsArgs,
    flows::FlowsArgs,
    init::InitArgs,
    session::{AnalyzeArgs, GotoArgs, ReviewArgs, SetArgs, StartArgs},
    status::StatusArgs,
    validate::ValidateArgs,
    wizard::WizardArgs,
};

#[derive(Parser)]
#[command(name = "intake")]
#[command(author, version, about = "Consular intake wizard")]
#[command(long_about = "Schema-driven, resumable wizard for consular registration and service requests. \
Each command advances one session stored under .intake/sessions/.")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable verbose output (debug logging on stderr)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Project root (default: auto-detect by finding .intake/)
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,

    /// Profile to work on (full or partial PRF id; default: most recent session)
    #[arg(long, short = 'p', global = true, env = "INTAKE_PROFILE")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new intake project
    Init(InitArgs),

    /// List flow types, or the steps of one flow
    Flows(FlowsArgs),

    /// Start (or resume) a wizard session for a flow
    Start(StartArgs),

    /// Set fields of the current step (name=value ...)
    Set(SetArgs),

    /// Validate and save the current step, then move forward
    Next,

    /// Move back to the previous step
    Back,

    /// Jump to a step whose dependencies are complete
    Goto(GotoArgs),

    /// Skip the current optional step
    Skip,

    /// Extract fields from uploaded documents into empty fields
    Analyze(AnalyzeArgs),

    /// Show the review summary
    Review(ReviewArgs),

    /// Submit the reviewed profile for validation
    Submit,

    /// Show stored sessions and submissions
    Status(StatusArgs),

    /// Discard the drafts of the current session
    Cancel,

    /// Validate an answers file against a step schema
    Validate(ValidateArgs),

    /// Fill a whole flow interactively
    Wizard(WizardArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    #[default]
    Auto,
    /// YAML format (full fidelity)
    Yaml,
    /// JSON format (for programming)
    Json,
    /// Markdown tables
    Md,
}
