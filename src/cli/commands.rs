//! CLI command definitions.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Keel - declarative release engine for Kubernetes and Terraform resources.
#[derive(Parser, Debug)]
#[command(name = "keel")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the workspace file. Searched upwards from the current directory when omitted.
    #[arg(long, global = true, env = "KEEL_WORKSPACE_FILE")]
    pub workspace_file: Option<PathBuf>,

    /// Project name (defaults to the current directory name).
    #[arg(short, long, global = true, env = "KEEL_PROJECT")]
    pub project: Option<String>,

    /// Workspace name (defaults to the workspace file's name).
    #[arg(short, long, global = true, env = "KEEL_WORKSPACE")]
    pub workspace: Option<String>,

    /// Stack name.
    #[arg(short, long, global = true, env = "KEEL_STACK", default_value = "default")]
    pub stack: String,

    /// Release storage backend.
    #[arg(long, global = true, env = "KEEL_BACKEND", default_value = "local")]
    pub backend: BackendKind,

    /// Base directory of the local backend.
    #[arg(long, global = true, env = "KEEL_STATE_PATH")]
    pub state_path: Option<PathBuf>,

    /// Bucket of the s3 backend.
    #[arg(long, global = true, env = "KEEL_S3_BUCKET")]
    pub bucket: Option<String>,

    /// Key prefix of the s3 backend.
    #[arg(long, global = true, env = "KEEL_S3_PREFIX")]
    pub prefix: Option<String>,

    /// Region of the s3 backend.
    #[arg(long, global = true, env = "KEEL_S3_REGION")]
    pub region: Option<String>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log line format.
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the workspace configuration.
    Validate {
        /// Show warnings as well as errors.
        #[arg(short = 'W', long)]
        warnings: bool,

        /// Project extensions file to validate alongside the workspace.
        #[arg(long)]
        extensions: Option<PathBuf>,
    },

    /// Print the apply or destroy order of a resource spec.
    Graph {
        /// Spec file (YAML or JSON).
        spec: PathBuf,

        /// Print the destroy order instead.
        #[arg(long)]
        destroy: bool,
    },

    /// Generate a spec and record a preview release of the changes.
    Preview {
        /// Spec file (YAML or JSON).
        spec: PathBuf,

        /// Project extensions file.
        #[arg(long)]
        extensions: Option<PathBuf>,

        /// Show the reason for every action.
        #[arg(short, long)]
        detailed: bool,
    },

    /// Inspect release history.
    Release {
        /// Release subcommand.
        #[command(subcommand)]
        command: ReleaseCommands,
    },
}

/// Release history subcommands.
#[derive(Subcommand, Debug)]
pub enum ReleaseCommands {
    /// List every revision of the stack.
    List,

    /// Show one release (defaults to the latest).
    Show {
        /// Revision to show.
        revision: Option<u64>,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output.
    Json,
}

/// Log line format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Plain text log lines.
    #[default]
    Text,
    /// One JSON object per log line.
    Json,
}

/// Release storage backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Files under a local directory.
    #[default]
    Local,
    /// Objects in an S3 bucket.
    S3,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
