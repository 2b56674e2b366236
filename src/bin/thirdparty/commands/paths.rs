//! `thirdparty paths` command

use anyhow::Result;

use crate::cli::{GlobalArgs, PathsArgs};
use thirdparty::{Catalogue, Package};

pub fn execute(args: PathsArgs, global: &GlobalArgs) -> Result<()> {
    let catalogue = Catalogue::load(&args.catalogue)?;
    let context = super::build_context(global)?;
    let package = catalogue.package(&context, &args.name)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&to_json(&package))?);
        return Ok(());
    }

    println!("{} {}", package.name(), package.version());
    println!("  install:   {}", package.install_directory().display());
    for dir in package.include_directories() {
        println!("  include:   {}", dir.display());
    }
    for dir in package.library_link_directories() {
        println!("  lib:       {}", dir.display());
    }
    println!("  downloads: {}", package.download_directory().display());
    println!("  source:    {}", package.main_source_directory().display());
    println!("  build:     {}", package.build_directory().display());
    println!(
        "  logs:      {}",
        context.layout().log_directory(package.name()).display()
    );

    Ok(())
}

fn to_json(package: &Package) -> serde_json::Value {
    serde_json::json!({
        "name": package.name(),
        "version": package.version(),
        "install": package.install_directory(),
        "include": package.include_directories(),
        "lib": package.library_link_directories(),
        "downloads": package.download_directory(),
        "source": package.main_source_directory(),
        "build": package.build_directory(),
        "logs": package.layout().log_directory(package.name()),
    })
}
