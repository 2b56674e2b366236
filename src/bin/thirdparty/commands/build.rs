//! `thirdparty build` command

use anyhow::Result;

use crate::cli::{BuildArgs, GlobalArgs};
use thirdparty::Catalogue;

pub fn execute(args: BuildArgs, global: &GlobalArgs) -> Result<()> {
    let catalogue = Catalogue::load(&args.catalogue)?;
    let context = super::build_context(global)?;
    context.layout().prepare()?;

    let packages = catalogue.packages(&context)?;
    let selected = super::select(&catalogue, &packages, &args.only)?;

    let mut completed = Vec::new();
    for package in selected {
        if let Err(err) = package.build() {
            if !completed.is_empty() {
                eprintln!("   Completed {}", completed.join(", "));
            }
            if let Some(execution) = err.source.execution() {
                eprintln!("    See log {}", execution.log_path.display());
            }
            return Err(err.into());
        }
        eprintln!(
            "    Finished {} {} -> {}",
            package.name(),
            package.version(),
            package.install_directory().display()
        );
        completed.push(package.name());
    }

    eprintln!("    Built {} package(s)", completed.len());
    Ok(())
}
