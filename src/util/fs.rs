//! Filesystem utilities.

use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};

/// Outcome of a best-effort removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The path existed and was removed
    Removed,
    /// Nothing was there to remove
    Absent,
}

/// Remove a directory tree, treating a missing path as success.
pub fn remove_tree(path: &Path) -> io::Result<Removal> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(Removal::Removed),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Removal::Absent),
        Err(e) => Err(e),
    }
}

/// Remove a file or directory tree, treating a missing path as success.
pub fn remove_path(path: &Path) -> io::Result<Removal> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => remove_tree(path),
        Ok(_) => fs::remove_file(path).map(|()| Removal::Removed),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Removal::Absent),
        Err(e) => Err(e),
    }
}

/// Remove a directory and all its contents, if it exists.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<()> {
    remove_tree(path)
        .with_context(|| format!("failed to remove directory: {}", path.display()))?;
    Ok(())
}

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Apply literal substitutions to a file in order.
///
/// Each `(old, new)` pair replaces every occurrence of `old` in the text
/// produced by the previous pair.
pub fn replace_in_file<S: AsRef<str>>(path: &Path, substitutions: &[(S, S)]) -> io::Result<()> {
    let mut text = fs::read_to_string(path)?;
    for (old, new) in substitutions {
        text = text.replace(old.as_ref(), new.as_ref());
    }
    fs::write(path, text)
}

/// Add the owner-execute bit to a file.
#[cfg(unix)]
pub fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path)?.permissions();
    if perms.mode() & 0o100 != 0 {
        return Ok(());
    }
    perms.set_mode(perms.mode() | 0o100);
    fs::set_permissions(path, perms)
}

#[cfg(windows)]
pub fn make_executable(path: &Path) -> io::Result<()> {
    fs::metadata(path).map(|_| ())
}
