//! `thirdparty completions` command

use anyhow::Result;
use clap::CommandFactory;

use crate::cli::{Cli, CompletionsArgs};

/// Write a completion script for `args.shell` to stdout.
pub fn execute(args: CompletionsArgs) -> Result<()> {
    let mut command = Cli::command();
    let bin = command.get_name().to_string();
    clap_complete::generate(args.shell, &mut command, bin, &mut std::io::stdout().lock());
    Ok(())
}
