//! Global context for a tool invocation.
//!
//! Resolves where configuration lives and turns configuration into the
//! [`BuildContext`] packages are built with.

use std::path::PathBuf;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use directories::ProjectDirs;

use crate::layout::Layout;
use crate::package::BuildContext;
use crate::platform::PlatformContext;
use crate::util::config::{load_config, Config};
use crate::util::process::ProcessRunner;

static PROJECT_DIRS: LazyLock<Option<ProjectDirs>> =
    LazyLock::new(|| ProjectDirs::from("org", "thirdparty", "thirdparty"));

/// Per-invocation paths and settings.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Directory holding the global config file
    config_dir: PathBuf,

    /// Suppress subprocess output on the console
    quiet: bool,
}

impl GlobalContext {
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Ok(Self::with_cwd(cwd))
    }

    pub fn with_cwd(cwd: PathBuf) -> Self {
        let config_dir = PROJECT_DIRS
            .as_ref()
            .map(|dirs| dirs.config_dir().to_path_buf())
            .unwrap_or_else(|| cwd.join(".thirdparty"));

        GlobalContext {
            cwd,
            config_dir,
            quiet: false,
        }
    }

    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = dir.into();
        self
    }

    pub fn set_quiet(&mut self, quiet: bool) {
        self.quiet = quiet;
    }

    /// Global configuration file.
    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Project configuration file under the working directory.
    pub fn project_config_path(&self) -> PathBuf {
        self.cwd.join(".thirdparty").join("config.toml")
    }

    /// Global config merged with project config.
    pub fn load_config(&self) -> Config {
        load_config(&self.config_path(), &self.project_config_path())
    }

    /// Detect the host and assemble the context every package shares.
    pub fn build_context(&self, config: &Config) -> Result<BuildContext> {
        let platform = PlatformContext::detect(config.platform.deployment_target.as_deref())?;
        Ok(self.build_context_for(platform, config))
    }

    /// Assemble a build context for an already known host.
    pub fn build_context_for(&self, platform: PlatformContext, config: &Config) -> BuildContext {
        let layout = config.apply_layout(Layout::default_for(&platform));
        let mut context = BuildContext::new(platform, layout)
            .with_runner(ProcessRunner::new().quiet(self.quiet));

        if let Some(jobs) = config.build.jobs {
            context = context.with_jobs(jobs);
        }
        if let Some(make) = &config.build.make {
            context = context.with_make(make);
        }
        if let Some(cmake) = &config.build.cmake {
            context = context.with_cmake(cmake);
        }
        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn test_config_locations() {
        let ctx = GlobalContext::with_cwd(PathBuf::from("/work")).with_config_dir("/home/u/.config/tp");
        assert_eq!(ctx.config_path(), PathBuf::from("/home/u/.config/tp/config.toml"));
        assert_eq!(
            ctx.project_config_path(),
            PathBuf::from("/work/.thirdparty/config.toml")
        );
    }

    #[test]
    fn test_project_config_overrides_global() {
        let tmp = TempDir::new().unwrap();
        let global = tmp.path().join("global");
        std::fs::create_dir_all(&global).unwrap();
        std::fs::write(global.join("config.toml"), "[build]\njobs = 2\nmake = \"gmake\"\n").unwrap();
        let project = tmp.path().join("project/.thirdparty");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(project.join("config.toml"), "[build]\njobs = 12\n").unwrap();

        let ctx = GlobalContext::with_cwd(tmp.path().join("project")).with_config_dir(&global);
        let config = ctx.load_config();

        let build = ctx.build_context_for(PlatformContext::linux(4), &config);
        assert_eq!(build.jobs(), 12);
        assert_eq!(build.make(), Path::new("gmake"));
    }

    #[test]
    fn test_layout_from_config() {
        let mut config = Config::default();
        config.layout.toolbase = Some(PathBuf::from("/tmp/tools"));
        config.layout.sources = Some(PathBuf::from("/tmp/src"));

        let ctx = GlobalContext::with_cwd(PathBuf::from("/work"));
        let build = ctx.build_context_for(PlatformContext::linux(4), &config);

        assert_eq!(build.layout().toolbase(), Path::new("/tmp/tools"));
        assert_eq!(build.layout().extracted_root(), Path::new("/tmp/src/extracted"));
        assert_eq!(build.jobs(), 4);
    }
}
