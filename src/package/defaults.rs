//! Stage behavior used when neither an override nor a capability applies.

use crate::package::archive::ArchiveKind;
use crate::package::error::StageError;
use crate::package::fetch::verify_checksum;
use crate::package::stage::Stage;
use crate::package::StageContext;
use crate::util::fs::{ensure_dir, remove_path, remove_tree, replace_in_file, Removal};

pub(crate) fn run(stage: Stage, cx: &StageContext<'_>) -> Result<(), StageError> {
    match stage {
        Stage::Cleanup => cleanup(cx),
        Stage::FetchSourceArchives => fetch_source_archives(cx),
        Stage::ExtractSourceArchives => extract_source_archives(cx),
        Stage::PatchSources => patch_sources(cx),
        Stage::RunConfigurationScript => run_configuration_script(cx),
        Stage::RunBuildCommand | Stage::RunInstallCommand | Stage::Verify => Ok(()),
    }
}

/// Remove the extraction and build directories. Failures are logged and
/// ignored so a half-removed tree never blocks a rebuild.
fn cleanup(cx: &StageContext<'_>) -> Result<(), StageError> {
    for dir in [cx.extraction_directory(), cx.build_directory()] {
        match remove_tree(&dir) {
            Ok(Removal::Removed) => tracing::debug!("Removed {}", dir.display()),
            Ok(Removal::Absent) => {}
            Err(e) => tracing::warn!("Could not remove {}: {}", dir.display(), e),
        }
    }
    Ok(())
}

/// Download each archive not already in the download directory.
fn fetch_source_archives(cx: &StageContext<'_>) -> Result<(), StageError> {
    let download_dir = cx.download_directory();
    ensure_dir(&download_dir)?;

    for archive in cx.archives() {
        let dest = download_dir.join(&archive.filename);
        if dest.exists() {
            tracing::info!("Using cached {}", archive.filename);
        } else {
            tracing::info!("Downloading {}", archive.url);
            cx.context().fetcher().fetch(&archive.url, &dest)?;
        }

        if let Some(expected) = &archive.sha256 {
            verify_checksum(&dest, expected)?;
        }
    }
    Ok(())
}

/// Unpack every archive into the extraction directory, then prune.
fn extract_source_archives(cx: &StageContext<'_>) -> Result<(), StageError> {
    let download_dir = cx.download_directory();
    let kinds = cx
        .archives()
        .iter()
        .map(|archive| {
            let path = download_dir.join(&archive.filename);
            ArchiveKind::from_path(&path).map(|kind| (path, kind))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let extraction_dir = cx.extraction_directory();
    ensure_dir(&extraction_dir)?;

    for (path, kind) in kinds {
        let attempts = kind.unpack_commands(&path, &extraction_dir, cx.platform());
        let last = attempts.len().saturating_sub(1);
        for (i, cmd) in attempts.iter().enumerate() {
            match cx.system(cmd) {
                Ok(()) => break,
                Err(e) if i < last => {
                    tracing::debug!("{} failed, trying next form: {}", cmd.display_command(), e)
                }
                Err(e) => return Err(e),
            }
        }
    }

    for relative in cx.prune_paths() {
        let path = extraction_dir.join(relative);
        remove_path(&path)
            .map_err(|e| StageError::io(format!("failed to prune {}", path.display()), e))?;
    }
    Ok(())
}

/// Apply literal substitutions to files in the main source directory.
fn patch_sources(cx: &StageContext<'_>) -> Result<(), StageError> {
    let source_dir = cx.main_source_directory();
    for patch in cx.patches() {
        let path = source_dir.join(&patch.file);
        tracing::debug!("Patching {}", path.display());
        replace_in_file(&path, &patch.substitutions)
            .map_err(|e| StageError::io(format!("failed to patch {}", path.display()), e))?;
    }
    Ok(())
}

/// Run the explicitly configured script, if there is one.
fn run_configuration_script(cx: &StageContext<'_>) -> Result<(), StageError> {
    match cx.configuration_script() {
        Some(script) => cx.run_script(&script, &cx.configure_arguments()),
        None => {
            tracing::info!("{}: no configuration script", cx.name());
            Ok(())
        }
    }
}
