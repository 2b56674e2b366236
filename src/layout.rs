//! Filesystem layout shared by every package.
//!
//! Five roots hold all persisted state: the install `toolbase` plus the
//! download cache, extraction, build and log trees. Every location below is a
//! pure function of the roots and a package's `(name, version)`.
//!
//! ```text
//! toolbase/<name>/<name>-<version>/          install directory
//! downloads/<name>/<archive file>            download cache
//! extracted/<name>/                          extraction directory
//! builds/<name>/                             build directory
//! logs/<name>/<name>-<version>-<stage>.log   stage logs
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::platform::PlatformContext;

/// Root directories of the build tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Layout {
    toolbase: PathBuf,
    downloads: PathBuf,
    extracted: PathBuf,
    builds: PathBuf,
    logs: PathBuf,
}

impl Layout {
    /// Create a layout from explicit roots.
    pub fn new(
        toolbase: impl Into<PathBuf>,
        downloads: impl Into<PathBuf>,
        extracted: impl Into<PathBuf>,
        builds: impl Into<PathBuf>,
        logs: impl Into<PathBuf>,
    ) -> Self {
        Layout {
            toolbase: toolbase.into(),
            downloads: downloads.into(),
            extracted: extracted.into(),
            builds: builds.into(),
            logs: logs.into(),
        }
    }

    /// Install into `toolbase`, keeping all source trees under `sources`.
    pub fn with_sources(toolbase: impl Into<PathBuf>, sources: &Path) -> Self {
        Layout::new(
            toolbase,
            sources.join("downloads"),
            sources.join("extracted"),
            sources.join("builds"),
            sources.join("logs"),
        )
    }

    /// Everything beneath a single directory. Used by tests and sandboxes.
    pub fn under(root: &Path) -> Self {
        Layout::with_sources(root.join("tools"), &root.join("sources"))
    }

    /// The conventional roots for a host.
    pub fn default_for(platform: &PlatformContext) -> Self {
        if platform.is_windows() {
            let downloads = std::env::var_os("SYSTEM_ARTIFACTSDIRECTORY")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(r"D:\tp\downloads"));
            Layout::new(
                r"D:\tp\tools",
                downloads,
                r"D:\tp\extracted",
                r"D:\tp\builds",
                r"D:\tp\logs",
            )
        } else {
            Layout::with_sources("/opt/thirdparty", Path::new("/opt/thirdparty-sources"))
        }
    }

    pub fn with_toolbase(mut self, path: impl Into<PathBuf>) -> Self {
        self.toolbase = path.into();
        self
    }

    pub fn with_downloads(mut self, path: impl Into<PathBuf>) -> Self {
        self.downloads = path.into();
        self
    }

    pub fn with_extracted(mut self, path: impl Into<PathBuf>) -> Self {
        self.extracted = path.into();
        self
    }

    pub fn with_builds(mut self, path: impl Into<PathBuf>) -> Self {
        self.builds = path.into();
        self
    }

    pub fn with_logs(mut self, path: impl Into<PathBuf>) -> Self {
        self.logs = path.into();
        self
    }

    pub fn toolbase(&self) -> &Path {
        &self.toolbase
    }

    pub fn downloads_root(&self) -> &Path {
        &self.downloads
    }

    pub fn extracted_root(&self) -> &Path {
        &self.extracted
    }

    pub fn builds_root(&self) -> &Path {
        &self.builds
    }

    pub fn logs_root(&self) -> &Path {
        &self.logs
    }

    /// `toolbase/<name>/<name>-<version>`
    pub fn install_directory(&self, name: &str, version: &str) -> PathBuf {
        self.toolbase.join(name).join(format!("{}-{}", name, version))
    }

    /// Default include directory for an install directory.
    pub fn include_directory(install_directory: &Path) -> PathBuf {
        install_directory.join("include")
    }

    /// Default library directory for an install directory.
    pub fn library_directory(install_directory: &Path) -> PathBuf {
        install_directory.join("lib")
    }

    /// Where a package's archives are cached.
    pub fn download_directory(&self, name: &str) -> PathBuf {
        self.downloads.join(name)
    }

    /// Where a package's archives are unpacked.
    pub fn extraction_directory(&self, name: &str) -> PathBuf {
        self.extracted.join(name)
    }

    /// Where a package is configured and compiled out of tree.
    pub fn build_directory(&self, name: &str) -> PathBuf {
        self.builds.join(name)
    }

    /// Where a package's stage logs are written.
    pub fn log_directory(&self, name: &str) -> PathBuf {
        self.logs.join(name)
    }

    /// The log written by one stage of one package.
    pub fn log_file(&self, name: &str, version: &str, stage: &str) -> PathBuf {
        self.log_directory(name)
            .join(format!("{}-{}-{}.log", name, version, stage))
    }

    /// Create all five roots.
    pub fn prepare(&self) -> Result<()> {
        for dir in [
            &self.toolbase,
            &self.downloads,
            &self.extracted,
            &self.builds,
            &self.logs,
        ] {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_install_directory_is_name_version() {
        let layout = Layout::under(Path::new("/work"));
        assert_eq!(
            layout.install_directory("zlib", "1.2.11"),
            PathBuf::from("/work/tools/zlib/zlib-1.2.11")
        );
    }

    #[test]
    fn test_same_identity_same_paths() {
        let layout = Layout::under(Path::new("/work"));
        assert_eq!(
            layout.install_directory("tcl", "8.6.10"),
            layout.install_directory("tcl", "8.6.10")
        );
        assert_ne!(
            layout.install_directory("tcl", "8.6.10"),
            layout.install_directory("tk", "8.6.10")
        );
    }

    #[test]
    fn test_trees_namespaced_by_name() {
        let layout = Layout::under(Path::new("/work"));
        assert_eq!(
            layout.download_directory("sqlite"),
            PathBuf::from("/work/sources/downloads/sqlite")
        );
        assert_eq!(
            layout.extraction_directory("sqlite"),
            PathBuf::from("/work/sources/extracted/sqlite")
        );
        assert_eq!(
            layout.build_directory("sqlite"),
            PathBuf::from("/work/sources/builds/sqlite")
        );
        assert_eq!(
            layout.log_file("sqlite", "3.31.1", "run_build_command"),
            PathBuf::from("/work/sources/logs/sqlite/sqlite-3.31.1-run_build_command.log")
        );
    }

    #[test]
    fn test_include_and_library_defaults() {
        let install = Path::new("/work/tools/openssl/openssl-1.1.1g");
        assert_eq!(Layout::include_directory(install), install.join("include"));
        assert_eq!(Layout::library_directory(install), install.join("lib"));
    }

    #[test]
    fn test_prepare_creates_roots() {
        let tmp = TempDir::new().unwrap();
        let layout = Layout::under(tmp.path());
        layout.prepare().unwrap();

        assert!(layout.toolbase().is_dir());
        assert!(layout.downloads_root().is_dir());
        assert!(layout.extracted_root().is_dir());
        assert!(layout.builds_root().is_dir());
        assert!(layout.logs_root().is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_unix_defaults() {
        let layout = Layout::default_for(&PlatformContext::linux(1));
        assert_eq!(layout.toolbase(), Path::new("/opt/thirdparty"));
        assert_eq!(
            layout.downloads_root(),
            Path::new("/opt/thirdparty-sources/downloads")
        );
    }
}
