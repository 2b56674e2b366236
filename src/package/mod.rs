//! Packages and their build lifecycle.
//!
//! A [`Package`] is an immutable description of one third-party component:
//! identity, archives, settings and the capabilities that supply its build
//! steps. [`Package::build`] runs the eight [`Stage`]s in order and stops at
//! the first failure. Nothing is rolled back; a rerun starts from cleanup.
//!
//! ```ignore
//! let zlib = Package::builder(&context, "zlib", "1.2.11")
//!     .archive("zlib-1.2.11.tar.gz", "https://zlib.net/zlib-1.2.11.tar.gz")
//!     .capability(Autotools)
//!     .compose()?;
//! zlib.build()?;
//! ```

pub mod archive;
pub mod capability;
mod defaults;
pub mod error;
pub mod fetch;
pub mod stage;

use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;

use crate::layout::Layout;
use crate::platform::PlatformContext;
use crate::util::fs::{ensure_dir, make_executable};
use crate::util::process::{ProcessBuilder, ProcessRunner};

pub use capability::{
    Autotools, CMake, Capability, CapabilityId, Composition, GnuMake, MakeInstall, NoArchive,
};
pub use error::{BuildError, ConfigurationError, StageError};
pub use fetch::{FetchError, Fetcher, HttpFetcher};
pub use stage::Stage;

/// Default optimization flags for C and C++ compilation.
const DEFAULT_OPT_FLAGS: &str = "-O2";

/// A package-specific replacement for one stage.
pub type StageFn = Arc<dyn Fn(&StageContext<'_>) -> Result<(), StageError> + Send + Sync>;

/// Inputs shared by every package built in one run.
#[derive(Clone)]
pub struct BuildContext {
    platform: PlatformContext,
    layout: Layout,
    runner: ProcessRunner,
    fetcher: Arc<dyn Fetcher>,
    jobs: Option<usize>,
    make: PathBuf,
    cmake: Option<PathBuf>,
}

impl BuildContext {
    pub fn new(platform: PlatformContext, layout: Layout) -> Self {
        BuildContext {
            platform,
            layout,
            runner: ProcessRunner::new(),
            fetcher: Arc::new(HttpFetcher::new()),
            jobs: None,
            make: PathBuf::from("make"),
            cmake: None,
        }
    }

    pub fn with_runner(mut self, runner: ProcessRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_fetcher(self, fetcher: impl Fetcher + 'static) -> Self {
        self.with_shared_fetcher(Arc::new(fetcher))
    }

    pub fn with_shared_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Override the `make -j` worker count (default: CPU count).
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs.max(1));
        self
    }

    /// Program invoked for make-style build and install steps.
    pub fn with_make(mut self, make: impl Into<PathBuf>) -> Self {
        self.make = make.into();
        self
    }

    /// CMake executable. Resolved from PATH when unset.
    pub fn with_cmake(mut self, cmake: impl Into<PathBuf>) -> Self {
        self.cmake = Some(cmake.into());
        self
    }

    pub fn platform(&self) -> &PlatformContext {
        &self.platform
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn runner(&self) -> &ProcessRunner {
        &self.runner
    }

    pub fn fetcher(&self) -> &dyn Fetcher {
        self.fetcher.as_ref()
    }

    pub fn jobs(&self) -> usize {
        self.jobs.unwrap_or_else(|| self.platform.cpu_count())
    }

    pub fn make(&self) -> &Path {
        &self.make
    }

    pub fn cmake(&self) -> Option<&Path> {
        self.cmake.as_deref()
    }
}

impl fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("platform", &self.platform)
            .field("layout", &self.layout)
            .field("runner", &self.runner)
            .field("jobs", &self.jobs())
            .field("make", &self.make)
            .field("cmake", &self.cmake)
            .finish_non_exhaustive()
    }
}

/// A source archive: cache file name, download URL and optional SHA256.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceArchive {
    pub filename: String,
    pub url: String,
    pub sha256: Option<String>,
}

/// Literal substitutions applied to one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    /// Path relative to the main source directory
    pub file: PathBuf,
    pub substitutions: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default)]
struct Settings {
    archives: Vec<SourceArchive>,
    source_dir: Option<PathBuf>,
    build_in_source: bool,
    install_directory: Option<PathBuf>,
    include_directories: Option<Vec<PathBuf>>,
    library_directories: Option<Vec<PathBuf>>,
    configure_script: Option<PathBuf>,
    configure_interpreter: Option<PathBuf>,
    configure_args: Vec<String>,
    cmake_args: Vec<String>,
    cflags: Vec<String>,
    cxxflags: Vec<String>,
    ldflags: Vec<String>,
    env: BTreeMap<String, String>,
    env_remove: Vec<String>,
    make_args: Vec<String>,
    install_args: Vec<String>,
    prune: Vec<PathBuf>,
    patches: Vec<Patch>,
}

/// One buildable third-party component.
///
/// Every path is derived from the layout and `(name, version)` unless a
/// setting overrides it, so two packages with the same identity share the
/// same directories.
#[derive(Clone)]
pub struct Package {
    name: String,
    version: String,
    context: BuildContext,
    settings: Settings,
    composition: Composition,
    overrides: BTreeMap<Stage, StageFn>,
}

impl fmt::Debug for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Package")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("settings", &self.settings)
            .field("capabilities", &self.composition.names())
            .field("overrides", &self.overrides.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Package {
    /// Start declaring a package.
    pub fn builder(
        context: &BuildContext,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> PackageBuilder {
        PackageBuilder {
            name: name.into(),
            version: version.into(),
            context: context.clone(),
            settings: Settings::default(),
            capabilities: Vec::new(),
            overrides: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn context(&self) -> &BuildContext {
        &self.context
    }

    pub fn platform(&self) -> &PlatformContext {
        self.context.platform()
    }

    pub fn layout(&self) -> &Layout {
        self.context.layout()
    }

    pub fn capabilities(&self) -> &Composition {
        &self.composition
    }

    pub fn archives(&self) -> &[SourceArchive] {
        &self.settings.archives
    }

    pub fn patches(&self) -> &[Patch] {
        &self.settings.patches
    }

    pub fn prune_paths(&self) -> &[PathBuf] {
        &self.settings.prune
    }

    pub fn cmake_args(&self) -> &[String] {
        &self.settings.cmake_args
    }

    /// `toolbase/<name>/<name>-<version>` unless installing into another tree.
    pub fn install_directory(&self) -> PathBuf {
        self.settings
            .install_directory
            .clone()
            .unwrap_or_else(|| self.layout().install_directory(&self.name, &self.version))
    }

    pub fn include_directories(&self) -> Vec<PathBuf> {
        self.settings
            .include_directories
            .clone()
            .unwrap_or_else(|| vec![Layout::include_directory(&self.install_directory())])
    }

    pub fn library_link_directories(&self) -> Vec<PathBuf> {
        self.settings
            .library_directories
            .clone()
            .unwrap_or_else(|| vec![Layout::library_directory(&self.install_directory())])
    }

    pub fn download_directory(&self) -> PathBuf {
        self.layout().download_directory(&self.name)
    }

    pub fn extraction_directory(&self) -> PathBuf {
        self.layout().extraction_directory(&self.name)
    }

    /// Top of the unpacked source tree: `<name>-<version>` inside the
    /// extraction directory unless overridden.
    pub fn main_source_directory(&self) -> PathBuf {
        let extracted = self.extraction_directory();
        match &self.settings.source_dir {
            Some(dir) => extracted.join(dir),
            None => extracted.join(format!("{}-{}", self.name, self.version)),
        }
    }

    pub fn build_directory(&self) -> PathBuf {
        if self.settings.build_in_source {
            self.main_source_directory()
        } else {
            self.layout().build_directory(&self.name)
        }
    }

    pub fn log_file(&self, stage: Stage) -> PathBuf {
        self.layout()
            .log_file(&self.name, &self.version, stage.as_str())
    }

    /// Explicitly configured script, resolved against the main source
    /// directory.
    pub fn configuration_script(&self) -> Option<PathBuf> {
        self.settings
            .configure_script
            .as_ref()
            .map(|script| self.main_source_directory().join(script))
    }

    /// `--prefix=<install directory>` followed by package arguments.
    pub fn configure_arguments(&self) -> Vec<String> {
        let mut args = vec![format!("--prefix={}", self.install_directory().display())];
        args.extend(self.settings.configure_args.iter().cloned());
        args
    }

    pub fn cflags(&self) -> Vec<String> {
        self.compile_flags(&self.settings.cflags)
    }

    pub fn cxxflags(&self) -> Vec<String> {
        self.compile_flags(&self.settings.cxxflags)
    }

    pub fn ldflags(&self) -> Vec<String> {
        let mut flags = self.platform().toolchain_flags();
        flags.extend(self.settings.ldflags.iter().cloned());
        flags
    }

    fn compile_flags(&self, extra: &[String]) -> Vec<String> {
        let mut flags = vec![DEFAULT_OPT_FLAGS.to_string()];
        flags.extend(self.platform().toolchain_flags());
        flags.extend(extra.iter().cloned());
        flags
    }

    /// Environment handed to every command this package runs.
    ///
    /// The inherited environment, then compiler flag variables, then
    /// package entries, minus removed keys.
    pub fn environment(&self) -> BTreeMap<String, String> {
        let mut env: BTreeMap<String, String> = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();

        env.insert("CFLAGS".to_string(), self.cflags().join(" "));
        env.insert("CXXFLAGS".to_string(), self.cxxflags().join(" "));
        let ldflags = self.ldflags();
        if !ldflags.is_empty() {
            env.insert("LDFLAGS".to_string(), ldflags.join(" "));
        }
        if let Some(target) = self.platform().deployment_target() {
            env.insert("MACOSX_DEPLOYMENT_TARGET".to_string(), target.to_string());
        }

        for (key, value) in &self.settings.env {
            env.insert(key.clone(), value.clone());
        }
        for key in &self.settings.env_remove {
            env.remove(key);
        }
        env
    }

    /// Run every stage in order, stopping at the first failure.
    pub fn build(&self) -> Result<(), BuildError> {
        tracing::info!("Building {} {}", self.name, self.version);

        self.preflight()
            .map_err(|(stage, e)| self.stage_failed(stage, e.into()))?;

        for stage in Stage::ALL {
            self.run_stage(stage)?;
        }

        tracing::info!(
            "Finished {} {} ({})",
            self.name,
            self.version,
            self.install_directory().display()
        );
        Ok(())
    }

    /// Check settings that would otherwise fail part way through a build.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.preflight().map_err(|(_, e)| e)
    }

    /// Like [`Package::validate`], also naming the stage the problem belongs to.
    fn preflight(&self) -> Result<(), (Stage, ConfigurationError)> {
        for stage in Stage::ALL {
            if self.overrides.contains_key(&stage) {
                continue;
            }
            match self.composition.owner(stage) {
                Some(capability) => capability
                    .validate(stage, self)
                    .map_err(|e| (stage, e))?,
                None if stage == Stage::ExtractSourceArchives => {
                    for source in &self.settings.archives {
                        archive::ArchiveKind::from_path(Path::new(&source.filename))
                            .map_err(|e| (stage, e))?;
                    }
                }
                None => {}
            }
        }
        Ok(())
    }

    /// Run one stage: package override, else owning capability, else default.
    pub fn run_stage(&self, stage: Stage) -> Result<(), BuildError> {
        let cx = StageContext::new(self, stage);
        tracing::info!("{} {}: {}", self.name, self.version, stage);

        let result = if let Some(run) = self.overrides.get(&stage) {
            run(&cx)
        } else if let Some(capability) = self.composition.owner(stage) {
            tracing::debug!("{} supplied by {}", stage, capability.name());
            capability.run(stage, &cx)
        } else {
            defaults::run(stage, &cx)
        };

        result.map_err(|e| self.stage_failed(stage, e))
    }

    fn stage_failed(&self, stage: Stage, source: StageError) -> BuildError {
        tracing::error!("{} {}: {} failed: {}", self.name, self.version, stage, source);
        BuildError::new(self.name.clone(), stage, source)
    }

    pub fn cleanup(&self) -> Result<(), BuildError> {
        self.run_stage(Stage::Cleanup)
    }

    pub fn fetch_source_archives(&self) -> Result<(), BuildError> {
        self.run_stage(Stage::FetchSourceArchives)
    }

    pub fn extract_source_archives(&self) -> Result<(), BuildError> {
        self.run_stage(Stage::ExtractSourceArchives)
    }

    pub fn patch_sources(&self) -> Result<(), BuildError> {
        self.run_stage(Stage::PatchSources)
    }

    pub fn run_configuration_script(&self) -> Result<(), BuildError> {
        self.run_stage(Stage::RunConfigurationScript)
    }

    pub fn run_build_command(&self) -> Result<(), BuildError> {
        self.run_stage(Stage::RunBuildCommand)
    }

    pub fn run_install_command(&self) -> Result<(), BuildError> {
        self.run_stage(Stage::RunInstallCommand)
    }

    pub fn verify(&self) -> Result<(), BuildError> {
        self.run_stage(Stage::Verify)
    }
}

/// Declares a [`Package`]. Finish with [`PackageBuilder::compose`].
pub struct PackageBuilder {
    name: String,
    version: String,
    context: BuildContext,
    settings: Settings,
    capabilities: Vec<Arc<dyn Capability>>,
    overrides: BTreeMap<Stage, StageFn>,
}

impl PackageBuilder {
    pub fn archive(self, filename: impl Into<String>, url: impl Into<String>) -> Self {
        self.source_archive(SourceArchive {
            filename: filename.into(),
            url: url.into(),
            sha256: None,
        })
    }

    pub fn archive_with_checksum(
        self,
        filename: impl Into<String>,
        url: impl Into<String>,
        sha256: impl Into<String>,
    ) -> Self {
        self.source_archive(SourceArchive {
            filename: filename.into(),
            url: url.into(),
            sha256: Some(sha256.into()),
        })
    }

    pub fn source_archive(mut self, archive: SourceArchive) -> Self {
        self.settings.archives.push(archive);
        self
    }

    /// Main source directory, relative to the extraction directory.
    pub fn source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.settings.source_dir = Some(dir.into());
        self
    }

    pub fn build_in_source(mut self, in_source: bool) -> Self {
        self.settings.build_in_source = in_source;
        self
    }

    /// Install somewhere other than this package's own tree.
    pub fn install_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.settings.install_directory = Some(dir.into());
        self
    }

    pub fn include_directories(mut self, dirs: Vec<PathBuf>) -> Self {
        self.settings.include_directories = Some(dirs);
        self
    }

    pub fn library_directories(mut self, dirs: Vec<PathBuf>) -> Self {
        self.settings.library_directories = Some(dirs);
        self
    }

    /// Configuration script, relative to the main source directory.
    pub fn configure_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.settings.configure_script = Some(script.into());
        self
    }

    /// Run the configuration script through an interpreter such as `perl`.
    pub fn configure_interpreter(mut self, interpreter: impl Into<PathBuf>) -> Self {
        self.settings.configure_interpreter = Some(interpreter.into());
        self
    }

    pub fn configure_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings
            .configure_args
            .extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cmake_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings
            .cmake_args
            .extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cflags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.cflags.extend(flags.into_iter().map(Into::into));
        self
    }

    pub fn cxxflags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings
            .cxxflags
            .extend(flags.into_iter().map(Into::into));
        self
    }

    pub fn ldflags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings
            .ldflags
            .extend(flags.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.env.insert(key.into(), value.into());
        self
    }

    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.settings.env_remove.push(key.into());
        self
    }

    /// Extra arguments for the build command, e.g. `VAR=value`.
    pub fn make_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings
            .make_args
            .extend(args.into_iter().map(Into::into));
        self
    }

    pub fn install_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings
            .install_args
            .extend(args.into_iter().map(Into::into));
        self
    }

    /// Remove a path (relative to the extraction directory) after unpacking.
    pub fn prune(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings.prune.push(path.into());
        self
    }

    /// Replace text in a source file during the patch stage.
    pub fn patch<S1, S2>(mut self, file: impl Into<PathBuf>, substitutions: &[(S1, S2)]) -> Self
    where
        S1: AsRef<str>,
        S2: AsRef<str>,
    {
        self.settings.patches.push(Patch {
            file: file.into(),
            substitutions: substitutions
                .iter()
                .map(|(old, new)| (old.as_ref().to_string(), new.as_ref().to_string()))
                .collect(),
        });
        self
    }

    /// Add a capability. Later capabilities take precedence for shared stages.
    pub fn capability(self, capability: impl Capability + 'static) -> Self {
        self.shared_capability(Arc::new(capability))
    }

    pub fn shared_capability(mut self, capability: Arc<dyn Capability>) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Replace a stage for this package only.
    pub fn override_stage<F>(mut self, stage: Stage, run: F) -> Self
    where
        F: Fn(&StageContext<'_>) -> Result<(), StageError> + Send + Sync + 'static,
    {
        self.overrides.insert(stage, Arc::new(run));
        self
    }

    /// Health check run as the final stage. `false` fails the build.
    pub fn verify<F>(self, check: F) -> Self
    where
        F: Fn(&StageContext<'_>) -> Result<bool, StageError> + Send + Sync + 'static,
    {
        self.override_stage(Stage::Verify, move |cx| {
            if check(cx)? {
                Ok(())
            } else {
                Err(StageError::verification(format!(
                    "{} {} did not pass its health check",
                    cx.name(),
                    cx.version()
                )))
            }
        })
    }

    /// Resolve capabilities and freeze the declaration.
    pub fn compose(self) -> Result<Package, ConfigurationError> {
        let composition = Composition::new(self.capabilities)?;
        Ok(Package {
            name: self.name,
            version: self.version,
            context: self.context,
            settings: self.settings,
            composition,
            overrides: self.overrides,
        })
    }
}

/// Captured result of [`StageContext::probe`].
#[derive(Debug, Clone)]
pub struct Probe {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// What a stage implementation sees while it runs.
///
/// Derefs to the [`Package`]. Commands go through [`StageContext::system`]:
/// the first command of a stage starts a fresh log and later ones append.
pub struct StageContext<'a> {
    package: &'a Package,
    stage: Stage,
    log_started: Cell<bool>,
}

impl<'a> StageContext<'a> {
    fn new(package: &'a Package, stage: Stage) -> Self {
        StageContext {
            package,
            stage,
            log_started: Cell::new(false),
        }
    }

    pub fn package(&self) -> &'a Package {
        self.package
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn stage_log(&self) -> PathBuf {
        self.package.log_file(self.stage)
    }

    /// Run a command through the process runner into this stage's log.
    pub fn system(&self, cmd: &ProcessBuilder) -> Result<(), StageError> {
        let append = self.log_started.replace(true);
        tracing::debug!("{}: {}", self.stage, cmd.display_command());
        self.context().runner().run(cmd, &self.stage_log(), append)?;
        Ok(())
    }

    /// Point `cmd` at the build directory with the package environment,
    /// creating the directory if needed.
    pub fn in_build_directory(&self, cmd: ProcessBuilder) -> Result<ProcessBuilder, StageError> {
        let build_dir = self.build_directory();
        ensure_dir(&build_dir)?;
        Ok(cmd.cwd(build_dir).env_exact(self.environment()))
    }

    /// Run a configuration script from the build directory.
    ///
    /// Without an interpreter the script is made executable first, except
    /// for system scripts under `/usr/`.
    pub fn run_script(&self, script: &Path, args: &[String]) -> Result<(), StageError> {
        let cmd = match &self.package.settings.configure_interpreter {
            Some(interpreter) => ProcessBuilder::new(interpreter).arg(script),
            None => {
                if !script.starts_with("/usr/") {
                    make_executable(script).map_err(|e| {
                        StageError::io(format!("failed to make {} executable", script.display()), e)
                    })?;
                }
                ProcessBuilder::new(script)
            }
        };
        self.system(&self.in_build_directory(cmd.args(args))?)
    }

    /// Run the make program with `args` in the build directory.
    pub fn make(&self, args: &[String]) -> Result<(), StageError> {
        let cmd = ProcessBuilder::new(self.context().make()).args(args);
        self.system(&self.in_build_directory(cmd)?)
    }

    /// `make -j<jobs>` plus package build arguments.
    pub fn make_build(&self) -> Result<(), StageError> {
        let mut args = vec![format!("-j{}", self.context().jobs())];
        args.extend(self.package.settings.make_args.iter().cloned());
        self.make(&args)
    }

    /// `make install` plus package install arguments.
    pub fn make_install(&self) -> Result<(), StageError> {
        let mut args = vec!["install".to_string()];
        args.extend(self.package.settings.install_args.iter().cloned());
        self.make(&args)
    }

    /// Run `program` with `stdin` and capture its output.
    ///
    /// A non-zero exit is reported in [`Probe::status`], not as an error.
    /// The command and both streams are written to the stage log.
    pub fn probe(&self, program: impl AsRef<Path>, stdin: &str) -> Result<Probe, StageError> {
        let cmd = ProcessBuilder::new(program)
            .stdin(stdin)
            .env_exact(self.environment());
        tracing::debug!("{}: {}", self.stage, cmd.display_command());
        let output = cmd.exec()?;
        let probe = Probe {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        self.record(&cmd, &probe)?;
        Ok(probe)
    }

    fn record(&self, cmd: &ProcessBuilder, probe: &Probe) -> Result<(), StageError> {
        let log = self.stage_log();
        let append = self.log_started.replace(true);
        if let Some(parent) = log.parent() {
            ensure_dir(parent)?;
        }
        let write = || -> std::io::Result<()> {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .append(append)
                .truncate(!append)
                .open(&log)?;
            writeln!(file, "$ {}", cmd.display_command())?;
            file.write_all(probe.stdout.as_bytes())?;
            file.write_all(probe.stderr.as_bytes())?;
            writeln!(file, "[{}]", probe.status)
        };
        write().map_err(|e| StageError::io(format!("failed to write {}", log.display()), e))
    }

    /// Set the install name of a macOS dynamic library.
    pub fn update_dylib_id(&self, library: &Path, id: &str) -> Result<(), StageError> {
        let cmd = ProcessBuilder::new("install_name_tool")
            .arg("-id")
            .arg(id)
            .arg(library);
        self.system(&cmd)
    }

    /// Rewrite one dependency path recorded in a macOS binary.
    pub fn change_dylib_lookup(&self, binary: &Path, from: &str, to: &str) -> Result<(), StageError> {
        let cmd = ProcessBuilder::new("install_name_tool")
            .arg("-change")
            .arg(from)
            .arg(to)
            .arg(binary);
        self.system(&cmd)
    }
}

impl Deref for StageContext<'_> {
    type Target = Package;

    fn deref(&self) -> &Package {
        self.package
    }
}
