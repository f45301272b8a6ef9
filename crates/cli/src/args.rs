//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// crosspost: publish one article to many platforms from declarative adapter definitions
#[derive(Parser, Debug)]
#[command(name = "crosspost")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Publish an article to the selected platforms
    Sync(SyncArgs),

    /// Inspect platform adapter definitions
    Platforms(PlatformsArgs),

    /// Configuration management
    Config(ConfigArgs),

    /// Validate configuration and show status
    Doctor(DoctorArgs),
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Article file (markdown with frontmatter, .html or .json)
    #[arg(long)]
    pub article: PathBuf,

    /// Target platform id (repeatable)
    #[arg(short, long = "platform", required_unless_present = "all")]
    pub platforms: Vec<String>,

    /// Target every enabled platform
    #[arg(long, conflicts_with = "platforms")]
    pub all: bool,

    /// Stop at the draft step and never publish
    #[arg(long)]
    pub draft_only: bool,

    /// Platforms processed per batch
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Stop after the first batch containing a failure
    #[arg(long)]
    pub stop_on_error: bool,

    /// Re-run failed platforms once after the first pass
    #[arg(long)]
    pub retry_failed_once: bool,

    /// Output the sync task as JSON
    #[arg(long)]
    pub json: bool,

    /// Override definitions directory
    #[arg(long)]
    pub definitions_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct PlatformsArgs {
    #[command(subcommand)]
    pub command: PlatformsCommands,
}

#[derive(Subcommand, Debug)]
pub enum PlatformsCommands {
    /// List all loaded platform definitions
    List {
        /// Override definitions directory
        #[arg(long)]
        definitions_dir: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate platform definitions
    Validate {
        /// Override definitions directory
        #[arg(long)]
        definitions_dir: Option<PathBuf>,
    },

    /// Probe whether the configured session is logged in
    Check {
        /// Platform id
        id: String,

        /// Override definitions directory
        #[arg(long)]
        definitions_dir: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Generate example configuration file
    Init {
        /// Path to write config file
        #[arg(long, default_value = "./config.toml")]
        path: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Override definitions directory
    #[arg(long)]
    pub definitions_dir: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
