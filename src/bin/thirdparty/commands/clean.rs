//! `thirdparty clean` command

use anyhow::Result;

use crate::cli::{CleanArgs, GlobalArgs};
use thirdparty::util::fs::remove_dir_all_if_exists;
use thirdparty::Catalogue;

pub fn execute(args: CleanArgs, global: &GlobalArgs) -> Result<()> {
    let catalogue = Catalogue::load(&args.catalogue)?;
    let context = super::build_context(global)?;
    let packages = catalogue.packages(&context)?;

    for package in super::select(&catalogue, &packages, &args.names)? {
        package.cleanup()?;
        if args.all {
            remove_dir_all_if_exists(&package.download_directory())?;
            remove_dir_all_if_exists(&context.layout().log_directory(package.name()))?;
        }
        eprintln!("     Cleaned {}", package.name());
    }

    Ok(())
}
