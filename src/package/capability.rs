//! Build-system capabilities and how they compose.
//!
//! A capability supplies implementations for some of the lifecycle stages.
//! A package lists capabilities in order and [`Composition`] resolves, for
//! each stage, which one runs:
//!
//! 1. a package-specific stage override, if any;
//! 2. otherwise the **last** listed capability that supplies the stage;
//! 3. otherwise the default stage behavior.
//!
//! Two capabilities that each bring their own configuration step (for
//! example autotools and CMake) cannot be combined, and listing the same
//! capability twice is rejected. Both are reported when the package is
//! composed.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::package::error::{ConfigurationError, StageError};
use crate::package::stage::Stage;
use crate::package::{BuildContext, Package, StageContext};
use crate::platform::PlatformContext;
use crate::util::process::{find_cmake, ProcessBuilder};

/// A reusable bundle of stage implementations for one build convention.
pub trait Capability: fmt::Debug + Send + Sync {
    /// Unique name, used in diagnostics and catalogues.
    fn name(&self) -> &str;

    /// Stages this capability implements.
    fn stages(&self) -> &[Stage];

    /// Run `stage`. Only called for stages listed by [`Capability::stages`].
    fn run(&self, stage: Stage, cx: &StageContext<'_>) -> Result<(), StageError>;

    /// Check, before any stage runs, that `stage` can run for `package`.
    ///
    /// Called once for every stage this capability ends up owning.
    fn validate(&self, _stage: Stage, _package: &Package) -> Result<(), ConfigurationError> {
        Ok(())
    }
}

/// Per-stage resolution of an ordered capability list.
#[derive(Debug, Clone, Default)]
pub struct Composition {
    capabilities: Vec<Arc<dyn Capability>>,
    owners: BTreeMap<Stage, usize>,
}

impl Composition {
    /// Resolve `capabilities`, later entries taking precedence.
    pub fn new(capabilities: Vec<Arc<dyn Capability>>) -> Result<Self, ConfigurationError> {
        let mut owners = BTreeMap::new();
        let mut configurer: Option<&str> = None;

        for (index, capability) in capabilities.iter().enumerate() {
            let name = capability.name();
            if capabilities[..index].iter().any(|c| c.name() == name) {
                return Err(ConfigurationError::DuplicateCapability {
                    name: name.to_string(),
                });
            }

            if capability.stages().contains(&Stage::RunConfigurationScript) {
                if let Some(first) = configurer {
                    return Err(ConfigurationError::AmbiguousCapabilities {
                        first: first.to_string(),
                        second: name.to_string(),
                    });
                }
                configurer = Some(name);
            }

            for stage in capability.stages() {
                owners.insert(*stage, index);
            }
        }

        Ok(Composition {
            capabilities,
            owners,
        })
    }

    /// The capability that supplies `stage`, if any does.
    pub fn owner(&self, stage: Stage) -> Option<&dyn Capability> {
        self.owners
            .get(&stage)
            .map(|&index| self.capabilities[index].as_ref())
    }

    /// Declared capability names, in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.capabilities.iter().map(|c| c.name()).collect()
    }

}

/// Built-in capabilities, addressable by name from catalogues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityId {
    NoArchive,
    Autotools,
    CMake,
    MakeInstall,
    GnuMake,
}

impl CapabilityId {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityId::NoArchive => "no-archive",
            CapabilityId::Autotools => "autotools",
            CapabilityId::CMake => "cmake",
            CapabilityId::MakeInstall => "make-install",
            CapabilityId::GnuMake => "gnu-make",
        }
    }

    /// Create the capability this id names.
    pub fn instantiate(&self) -> Arc<dyn Capability> {
        match self {
            CapabilityId::NoArchive => Arc::new(NoArchive),
            CapabilityId::Autotools => Arc::new(Autotools),
            CapabilityId::CMake => Arc::new(CMake),
            CapabilityId::MakeInstall => Arc::new(MakeInstall),
            CapabilityId::GnuMake => Arc::new(GnuMake),
        }
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CapabilityId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "no-archive" | "noarchive" => Ok(CapabilityId::NoArchive),
            "autotools" | "autoconf" => Ok(CapabilityId::Autotools),
            "cmake" => Ok(CapabilityId::CMake),
            "make-install" => Ok(CapabilityId::MakeInstall),
            "gnu-make" | "make" => Ok(CapabilityId::GnuMake),
            _ => Err(format!(
                "unknown capability '{}'; expected one of: no-archive, autotools, cmake, make-install, gnu-make",
                s
            )),
        }
    }
}

/// Nothing to download or unpack; sources arrive some other way.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoArchive;

impl Capability for NoArchive {
    fn name(&self) -> &str {
        CapabilityId::NoArchive.as_str()
    }

    fn stages(&self) -> &[Stage] {
        &[Stage::FetchSourceArchives, Stage::ExtractSourceArchives]
    }

    fn run(&self, stage: Stage, cx: &StageContext<'_>) -> Result<(), StageError> {
        tracing::debug!("{}: {} skipped, no archives", cx.name(), stage);
        Ok(())
    }
}

/// Parallel `make -jN` build.
#[derive(Debug, Clone, Copy, Default)]
pub struct GnuMake;

impl Capability for GnuMake {
    fn name(&self) -> &str {
        CapabilityId::GnuMake.as_str()
    }

    fn stages(&self) -> &[Stage] {
        &[Stage::RunBuildCommand]
    }

    fn run(&self, _stage: Stage, cx: &StageContext<'_>) -> Result<(), StageError> {
        cx.make_build()
    }
}

/// `make install`, for packages without a separate configure step.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeInstall;

impl Capability for MakeInstall {
    fn name(&self) -> &str {
        CapabilityId::MakeInstall.as_str()
    }

    fn stages(&self) -> &[Stage] {
        &[Stage::RunInstallCommand]
    }

    fn run(&self, _stage: Stage, cx: &StageContext<'_>) -> Result<(), StageError> {
        cx.make_install()
    }
}

/// `configure && make -jN && make install`.
///
/// The script defaults to `configure` in the main source directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct Autotools;

impl Capability for Autotools {
    fn name(&self) -> &str {
        CapabilityId::Autotools.as_str()
    }

    fn stages(&self) -> &[Stage] {
        &[
            Stage::RunConfigurationScript,
            Stage::RunBuildCommand,
            Stage::RunInstallCommand,
        ]
    }

    fn run(&self, stage: Stage, cx: &StageContext<'_>) -> Result<(), StageError> {
        match stage {
            Stage::RunConfigurationScript => {
                let script = cx
                    .configuration_script()
                    .unwrap_or_else(|| cx.main_source_directory().join("configure"));
                cx.run_script(&script, &cx.configure_arguments())
            }
            Stage::RunBuildCommand => cx.make_build(),
            Stage::RunInstallCommand => cx.make_install(),
            _ => Ok(()),
        }
    }
}

/// CMake configuration followed by a make-style build and install.
///
/// Unix hosts generate Makefiles and drive them with `make`. Windows hosts
/// generate a Visual Studio solution and drive it through `cmake --build`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CMake;

impl CMake {
    /// The configured cmake, else the one found on PATH.
    pub fn program(context: &BuildContext) -> Result<PathBuf, ConfigurationError> {
        context
            .cmake()
            .map(|p| p.to_path_buf())
            .or_else(find_cmake)
            .ok_or_else(|| ConfigurationError::MissingTool {
                tool: "cmake".to_string(),
            })
    }

    /// Generator passed to `cmake -G`.
    ///
    /// Windows picks the Visual Studio release from `BUILD_VS_VERSION` in
    /// the package environment.
    pub fn generator(
        platform: &PlatformContext,
        env: &BTreeMap<String, String>,
    ) -> Result<String, ConfigurationError> {
        if !platform.is_windows() {
            return Ok("Unix Makefiles".to_string());
        }
        match env.get("BUILD_VS_VERSION").map(String::as_str) {
            None => {
                tracing::debug!("BUILD_VS_VERSION not set, defaulting to VS 2019");
                Ok("Visual Studio 16 2019".to_string())
            }
            Some("2019") => Ok("Visual Studio 16 2019".to_string()),
            Some("2017") => Ok("Visual Studio 15 2017".to_string()),
            Some(other) => Err(ConfigurationError::InvalidSetting {
                setting: "BUILD_VS_VERSION".to_string(),
                value: other.to_string(),
            }),
        }
    }

    /// Arguments for the configuration step.
    pub fn arguments(package: &Package) -> Result<Vec<String>, ConfigurationError> {
        let mut args = vec![
            package.main_source_directory().display().to_string(),
            "-G".to_string(),
            CMake::generator(package.platform(), &package.environment())?,
            format!("-DCMAKE_INSTALL_PREFIX={}", package.install_directory().display()),
            "-DCMAKE_BUILD_TYPE=Release".to_string(),
        ];
        args.extend(package.cmake_args().iter().cloned());
        Ok(args)
    }

    fn command(cx: &StageContext<'_>) -> Result<ProcessBuilder, ConfigurationError> {
        Ok(ProcessBuilder::new(CMake::program(cx.context())?))
    }
}

impl Capability for CMake {
    fn name(&self) -> &str {
        CapabilityId::CMake.as_str()
    }

    fn stages(&self) -> &[Stage] {
        &[
            Stage::RunConfigurationScript,
            Stage::RunBuildCommand,
            Stage::RunInstallCommand,
        ]
    }

    fn run(&self, stage: Stage, cx: &StageContext<'_>) -> Result<(), StageError> {
        match stage {
            Stage::RunConfigurationScript => {
                let cmd = CMake::command(cx)?.args(CMake::arguments(cx.package())?);
                cx.system(&cx.in_build_directory(cmd)?)
            }
            Stage::RunBuildCommand if cx.platform().is_windows() => {
                let cmd = CMake::command(cx)?.args(["--build", ".", "--config", "Release"]);
                cx.system(&cx.in_build_directory(cmd)?)
            }
            Stage::RunInstallCommand if cx.platform().is_windows() => {
                let cmd = CMake::command(cx)?.args(["--install", "."]);
                cx.system(&cx.in_build_directory(cmd)?)
            }
            Stage::RunBuildCommand => cx.make_build(),
            Stage::RunInstallCommand => cx.make_install(),
            _ => Ok(()),
        }
    }

    fn validate(&self, stage: Stage, package: &Package) -> Result<(), ConfigurationError> {
        let windows = package.platform().is_windows();
        match stage {
            Stage::RunConfigurationScript => {
                CMake::program(package.context())?;
                CMake::generator(package.platform(), &package.environment())?;
            }
            Stage::RunBuildCommand | Stage::RunInstallCommand if windows => {
                CMake::program(package.context())?;
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Fake {
        name: &'static str,
        stages: &'static [Stage],
    }

    impl Capability for Fake {
        fn name(&self) -> &str {
            self.name
        }

        fn stages(&self) -> &[Stage] {
            self.stages
        }

        fn run(&self, _stage: Stage, _cx: &StageContext<'_>) -> Result<(), StageError> {
            Ok(())
        }
    }

    fn fake(name: &'static str, stages: &'static [Stage]) -> Arc<dyn Capability> {
        Arc::new(Fake { name, stages })
    }

    #[test]
    fn test_later_capability_owns_shared_stage() {
        let composition = Composition::new(vec![
            fake("first", &[Stage::RunBuildCommand, Stage::RunInstallCommand]),
            fake("second", &[Stage::RunBuildCommand]),
        ])
        .unwrap();

        assert_eq!(
            composition.owner(Stage::RunBuildCommand).map(|c| c.name()),
            Some("second")
        );
        assert_eq!(
            composition.owner(Stage::RunInstallCommand).map(|c| c.name()),
            Some("first")
        );
        assert!(composition.owner(Stage::Verify).is_none());
    }

    #[test]
    fn test_two_configurers_are_ambiguous() {
        let err = Composition::new(vec![
            CapabilityId::Autotools.instantiate(),
            CapabilityId::CMake.instantiate(),
        ])
        .unwrap_err();

        assert_eq!(
            err,
            ConfigurationError::AmbiguousCapabilities {
                first: "autotools".to_string(),
                second: "cmake".to_string(),
            }
        );
    }

    #[test]
    fn test_duplicate_capability_rejected() {
        let err = Composition::new(vec![
            CapabilityId::GnuMake.instantiate(),
            CapabilityId::GnuMake.instantiate(),
        ])
        .unwrap_err();

        assert!(matches!(err, ConfigurationError::DuplicateCapability { .. }));
    }

    #[test]
    fn test_autotools_with_make_install_and_no_archive() {
        let composition = Composition::new(vec![
            CapabilityId::Autotools.instantiate(),
            CapabilityId::MakeInstall.instantiate(),
            CapabilityId::NoArchive.instantiate(),
        ])
        .unwrap();

        assert_eq!(
            composition.owner(Stage::RunInstallCommand).map(|c| c.name()),
            Some("make-install")
        );
        assert_eq!(
            composition.owner(Stage::RunConfigurationScript).map(|c| c.name()),
            Some("autotools")
        );
        assert_eq!(
            composition.owner(Stage::FetchSourceArchives).map(|c| c.name()),
            Some("no-archive")
        );
        assert_eq!(
            composition.names(),
            vec!["autotools", "make-install", "no-archive"]
        );
    }

    #[test]
    fn test_capability_id_from_str() {
        assert_eq!("autotools".parse::<CapabilityId>().unwrap(), CapabilityId::Autotools);
        assert_eq!("CMake".parse::<CapabilityId>().unwrap(), CapabilityId::CMake);
        assert_eq!("no-archive".parse::<CapabilityId>().unwrap(), CapabilityId::NoArchive);
        assert!("meson".parse::<CapabilityId>().is_err());
    }

    #[test]
    fn test_cmake_generator_per_platform() {
        let mut env = BTreeMap::new();
        env.insert("BUILD_VS_VERSION".to_string(), "2015".to_string());
        assert_eq!(
            CMake::generator(&PlatformContext::linux(1), &env).unwrap(),
            "Unix Makefiles"
        );

        let windows = PlatformContext::windows(1);
        assert_eq!(
            CMake::generator(&windows, &BTreeMap::new()).unwrap(),
            "Visual Studio 16 2019"
        );
        env.insert("BUILD_VS_VERSION".to_string(), "2019".to_string());
        assert_eq!(CMake::generator(&windows, &env).unwrap(), "Visual Studio 16 2019");
        env.insert("BUILD_VS_VERSION".to_string(), "2017".to_string());
        assert_eq!(CMake::generator(&windows, &env).unwrap(), "Visual Studio 15 2017");
        env.insert("BUILD_VS_VERSION".to_string(), "2015".to_string());
        assert_eq!(
            CMake::generator(&windows, &env).unwrap_err(),
            ConfigurationError::InvalidSetting {
                setting: "BUILD_VS_VERSION".to_string(),
                value: "2015".to_string(),
            }
        );
    }
}
