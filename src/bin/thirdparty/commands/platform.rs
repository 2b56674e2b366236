//! `thirdparty platform` command

use anyhow::Result;

use crate::cli::{GlobalArgs, PlatformArgs};

pub fn execute(args: PlatformArgs, global: &GlobalArgs) -> Result<()> {
    let context = super::build_context(global)?;
    let platform = context.platform();
    let layout = context.layout();

    if args.json {
        let value = serde_json::json!({
            "platform": platform,
            "layout": layout,
            "jobs": context.jobs(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("os:        {}", platform.os_family());
    println!("cpus:      {}", platform.cpu_count());
    println!("jobs:      {}", context.jobs());
    if let Some(sdk) = platform.sdk_root() {
        println!("sdk:       {}", sdk.display());
    }
    if let Some(target) = platform.deployment_target() {
        println!("target:    {}", target);
    }
    println!("toolbase:  {}", layout.toolbase().display());
    println!("downloads: {}", layout.downloads_root().display());
    println!("extracted: {}", layout.extracted_root().display());
    println!("builds:    {}", layout.builds_root().display());
    println!("logs:      {}", layout.logs_root().display());

    Ok(())
}
