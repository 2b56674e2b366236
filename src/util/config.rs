//! Configuration files.
//!
//! Two locations are read:
//! - Global: `<config dir>/config.toml` - user-wide defaults
//! - Project: `.thirdparty/config.toml` - overrides for one checkout
//!
//! Project config takes precedence over global config.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::layout::Layout;

/// Tool configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory roots
    pub layout: LayoutConfig,

    /// Host settings
    pub platform: PlatformConfig,

    /// Build tool settings
    pub build: BuildConfig,
}

/// Overrides for the five layout roots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Install root
    pub toolbase: Option<PathBuf>,

    /// Single root for downloads, extracted, builds and logs
    pub sources: Option<PathBuf>,

    pub downloads: Option<PathBuf>,
    pub extracted: Option<PathBuf>,
    pub builds: Option<PathBuf>,
    pub logs: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Minimum macOS version (default 10.12)
    pub deployment_target: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Parallel make jobs (default: CPU count)
    pub jobs: Option<usize>,

    /// Make program
    pub make: Option<PathBuf>,

    /// CMake program
    pub cmake: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }

    /// Load configuration, falling back to defaults if the file is missing
    /// or broken.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        let layout = other.layout;
        if layout.toolbase.is_some() {
            self.layout.toolbase = layout.toolbase;
        }
        if layout.sources.is_some() {
            self.layout.sources = layout.sources;
        }
        if layout.downloads.is_some() {
            self.layout.downloads = layout.downloads;
        }
        if layout.extracted.is_some() {
            self.layout.extracted = layout.extracted;
        }
        if layout.builds.is_some() {
            self.layout.builds = layout.builds;
        }
        if layout.logs.is_some() {
            self.layout.logs = layout.logs;
        }

        if other.platform.deployment_target.is_some() {
            self.platform.deployment_target = other.platform.deployment_target;
        }

        if other.build.jobs.is_some() {
            self.build.jobs = other.build.jobs;
        }
        if other.build.make.is_some() {
            self.build.make = other.build.make;
        }
        if other.build.cmake.is_some() {
            self.build.cmake = other.build.cmake;
        }
    }

    /// Apply root overrides to `layout`.
    ///
    /// `sources` moves all four source trees at once; an explicit root for
    /// one of them still wins.
    pub fn apply_layout(&self, mut layout: Layout) -> Layout {
        let cfg = &self.layout;
        if let Some(toolbase) = &cfg.toolbase {
            layout = layout.with_toolbase(toolbase);
        }
        if let Some(sources) = &cfg.sources {
            layout = Layout::with_sources(layout.toolbase().to_path_buf(), sources);
        }
        if let Some(downloads) = &cfg.downloads {
            layout = layout.with_downloads(downloads);
        }
        if let Some(extracted) = &cfg.extracted {
            layout = layout.with_extracted(extracted);
        }
        if let Some(builds) = &cfg.builds {
            layout = layout.with_builds(builds);
        }
        if let Some(logs) = &cfg.logs {
            layout = layout.with_logs(logs);
        }
        layout
    }
}

/// Load the global config, then let the project config override it.
pub fn load_config(global_path: &Path, project_path: &Path) -> Config {
    let mut config = Config::default();

    if global_path.exists() {
        config.merge(Config::load_or_default(global_path));
    }

    if project_path.exists() {
        config.merge(Config::load_or_default(project_path));
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.layout.toolbase.is_none());
        assert!(config.build.jobs.is_none());
        assert!(config.platform.deployment_target.is_none());
    }

    #[test]
    fn test_config_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[layout]
toolbase = "/opt/tools"

[platform]
deployment_target = "10.14"

[build]
jobs = 6
make = "gmake"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.layout.toolbase, Some(PathBuf::from("/opt/tools")));
        assert_eq!(config.platform.deployment_target.as_deref(), Some("10.14"));
        assert_eq!(config.build.jobs, Some(6));
        assert_eq!(config.build.make, Some(PathBuf::from("gmake")));
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config::default();
        base.build.jobs = Some(2);
        base.layout.toolbase = Some(PathBuf::from("/global"));

        let mut project = Config::default();
        project.build.jobs = Some(8);

        base.merge(project);

        assert_eq!(base.build.jobs, Some(8));
        assert_eq!(base.layout.toolbase, Some(PathBuf::from("/global")));
    }

    #[test]
    fn test_broken_project_config_is_ignored() {
        let tmp = TempDir::new().unwrap();
        let global = tmp.path().join("global.toml");
        let project = tmp.path().join("project.toml");
        std::fs::write(&global, "[build]\njobs = 3\n").unwrap();
        std::fs::write(&project, "[build\njobs = ").unwrap();

        let config = load_config(&global, &project);
        assert_eq!(config.build.jobs, Some(3));
    }

    #[test]
    fn test_apply_layout() {
        let mut config = Config::default();
        config.layout.sources = Some(PathBuf::from("/srv/src"));
        config.layout.logs = Some(PathBuf::from("/var/log/tp"));

        let layout = config.apply_layout(Layout::under(Path::new("/w")));

        assert_eq!(layout.toolbase(), Path::new("/w/tools"));
        assert_eq!(layout.downloads_root(), Path::new("/srv/src/downloads"));
        assert_eq!(layout.builds_root(), Path::new("/srv/src/builds"));
        assert_eq!(layout.logs_root(), Path::new("/var/log/tp"));
    }
}
