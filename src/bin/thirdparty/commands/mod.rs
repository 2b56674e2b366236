//! Command implementations

pub mod build;
pub mod clean;
pub mod completions;
pub mod paths;
pub mod platform;

use anyhow::{bail, Result};

use crate::cli::GlobalArgs;
use thirdparty::util::Config;
use thirdparty::{BuildContext, Catalogue, GlobalContext, Package};

/// Configuration after applying `--config` and root/job overrides.
pub fn load_config(global: &GlobalArgs) -> Result<(GlobalContext, Config)> {
    let mut ctx = GlobalContext::new()?;
    ctx.set_quiet(global.quiet);

    let mut config = match &global.config {
        Some(path) => Config::load(path)?,
        None => ctx.load_config(),
    };

    if let Some(toolbase) = &global.toolbase {
        config.layout.toolbase = Some(toolbase.clone());
    }
    if let Some(sources) = &global.sources {
        config.layout.sources = Some(sources.clone());
    }
    if let Some(jobs) = global.jobs {
        config.build.jobs = Some(jobs);
    }

    Ok((ctx, config))
}

pub fn build_context(global: &GlobalArgs) -> Result<BuildContext> {
    let (ctx, config) = load_config(global)?;
    ctx.build_context(&config)
}

/// Packages named in `names`, or all of them when `names` is empty.
pub fn select<'a>(
    catalogue: &Catalogue,
    packages: &'a [Package],
    names: &[String],
) -> Result<Vec<&'a Package>> {
    for name in names {
        if catalogue.get(name).is_none() {
            bail!(
                "no package named `{}` in {}\n\
                 help: available packages: {}",
                name,
                catalogue.path().display(),
                catalogue.names().join(", ")
            );
        }
    }

    Ok(packages
        .iter()
        .filter(|p| names.is_empty() || names.iter().any(|n| n == p.name()))
        .collect())
}
