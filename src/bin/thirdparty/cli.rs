//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Build and install native third-party components from source
#[derive(Parser)]
#[command(name = "thirdparty")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Don't echo build output (logs are still written)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Read configuration from this file instead of the global and project files
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Install root
    #[arg(long, global = true, env = "THIRDPARTY_TOOLBASE", value_name = "DIR")]
    pub toolbase: Option<PathBuf>,

    /// Root for downloads, extracted sources, build trees and logs
    #[arg(long, global = true, env = "THIRDPARTY_SOURCES", value_name = "DIR")]
    pub sources: Option<PathBuf>,

    /// Number of parallel make jobs
    #[arg(short, long, global = true, env = "THIRDPARTY_JOBS")]
    pub jobs: Option<usize>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build every package in a catalogue, in declaration order
    Build(BuildArgs),

    /// Remove extracted sources and build trees
    Clean(CleanArgs),

    /// Show where a package is unpacked, built, logged and installed
    Paths(PathsArgs),

    /// Show the detected host and directory roots
    Platform(PlatformArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct BuildArgs {
    /// Catalogue file
    pub catalogue: PathBuf,

    /// Build only these packages (repeatable)
    #[arg(long, value_name = "NAME")]
    pub only: Vec<String>,
}

#[derive(Args)]
pub struct CleanArgs {
    /// Catalogue file
    pub catalogue: PathBuf,

    /// Packages to clean (default: all)
    pub names: Vec<String>,

    /// Also delete cached downloads and logs
    #[arg(long)]
    pub all: bool,
}

#[derive(Args)]
pub struct PathsArgs {
    /// Catalogue file
    pub catalogue: PathBuf,

    /// Package name
    pub name: String,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct PlatformArgs {
    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
