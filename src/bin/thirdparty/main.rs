//! thirdparty CLI - build native third-party components from source

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.global.verbose {
        EnvFilter::new("thirdparty=debug")
    } else if cli.global.quiet {
        EnvFilter::new("thirdparty=warn")
    } else {
        EnvFilter::new("thirdparty=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    match cli.command {
        Commands::Build(args) => commands::build::execute(args, &cli.global),
        Commands::Clean(args) => commands::clean::execute(args, &cli.global),
        Commands::Paths(args) => commands::paths::execute(args, &cli.global),
        Commands::Platform(args) => commands::platform::execute(args, &cli.global),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
