//! Lifecycle stages of a package build.

use std::fmt;

/// One step of the fixed package lifecycle.
///
/// Variants are declared in execution order; `Ord` follows that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Cleanup,
    FetchSourceArchives,
    ExtractSourceArchives,
    PatchSources,
    RunConfigurationScript,
    RunBuildCommand,
    RunInstallCommand,
    Verify,
}

impl Stage {
    /// Every stage in the order `build()` runs them.
    pub const ALL: [Stage; 8] = [
        Stage::Cleanup,
        Stage::FetchSourceArchives,
        Stage::ExtractSourceArchives,
        Stage::PatchSources,
        Stage::RunConfigurationScript,
        Stage::RunBuildCommand,
        Stage::RunInstallCommand,
        Stage::Verify,
    ];

    /// Name used in log file names and messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Cleanup => "cleanup",
            Stage::FetchSourceArchives => "fetch_source_archives",
            Stage::ExtractSourceArchives => "extract_source_archives",
            Stage::PatchSources => "patch_sources",
            Stage::RunConfigurationScript => "run_configuration_script",
            Stage::RunBuildCommand => "run_build_command",
            Stage::RunInstallCommand => "run_install_command",
            Stage::Verify => "verify",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("unknown stage '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_is_sorted() {
        let mut sorted = Stage::ALL;
        sorted.sort();
        assert_eq!(sorted, Stage::ALL);
        assert_eq!(Stage::ALL.first(), Some(&Stage::Cleanup));
        assert_eq!(Stage::ALL.last(), Some(&Stage::Verify));
    }

    #[test]
    fn test_stage_names_parse_back() {
        for stage in Stage::ALL {
            assert_eq!(stage.as_str().parse::<Stage>().unwrap(), stage);
        }
        assert!("compile".parse::<Stage>().is_err());
    }
}
