//! Error taxonomy for package builds.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::package::fetch::FetchError;
use crate::package::stage::Stage;
use crate::util::process::{ExecutionError, RunError};

/// A package declaration that cannot be executed as written.
///
/// Raised before any process is spawned for the affected stage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("don't know how to extract `{}`", path.display())]
    UnknownArchive { path: PathBuf },

    #[error("capabilities `{first}` and `{second}` both supply a configuration step")]
    AmbiguousCapabilities { first: String, second: String },

    #[error("capability `{name}` is declared more than once")]
    DuplicateCapability { name: String },

    #[error("`{tool}` not found in PATH")]
    MissingTool { tool: String },

    #[error("invalid value `{value}` for {setting}")]
    InvalidSetting { setting: String, value: String },
}

/// Why a single stage failed.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Process(#[from] RunError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("verification failed: {message}")]
    Verification { message: String },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StageError {
    /// A failed health check.
    pub fn verification(message: impl Into<String>) -> Self {
        StageError::Verification {
            message: message.into(),
        }
    }

    /// An I/O failure with a description of what was being attempted.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        StageError::Io {
            context: context.into(),
            source,
        }
    }

    /// The failed external command, if this error is one.
    pub fn execution(&self) -> Option<&ExecutionError> {
        match self {
            StageError::Process(RunError::Exit(e)) => Some(e),
            _ => None,
        }
    }
}

impl From<ExecutionError> for StageError {
    fn from(e: ExecutionError) -> Self {
        StageError::Process(RunError::Exit(e))
    }
}

/// A package build aborted at `stage`.
#[derive(Debug, Error)]
#[error("{stage} failed for `{package}`")]
pub struct BuildError {
    /// Name of the failing package
    pub package: String,
    /// Stage that failed
    pub stage: Stage,
    /// Underlying failure
    #[source]
    pub source: StageError,
}

impl BuildError {
    pub fn new(package: impl Into<String>, stage: Stage, source: StageError) -> Self {
        BuildError {
            package: package.into(),
            stage,
            source,
        }
    }

    /// Exit code of the failing command, if an external process failed.
    pub fn exit_code(&self) -> Option<i32> {
        self.source.execution().and_then(|e| e.exit_code)
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self.source, StageError::Configuration(_))
    }

    pub fn is_verification(&self) -> bool {
        matches!(self.source, StageError::Verification { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_error_names_package_and_stage() {
        let err = BuildError::new(
            "sqlite",
            Stage::RunBuildCommand,
            StageError::verification("nope"),
        );
        assert_eq!(err.to_string(), "run_build_command failed for `sqlite`");
        assert!(err.is_verification());
        assert_eq!(err.exit_code(), None);
    }

    #[test]
    fn test_exit_code_from_execution_error() {
        let exec = ExecutionError {
            command: "make -j4".to_string(),
            exit_code: Some(2),
            log_path: PathBuf::from("/logs/zlib/zlib-1.2.11-run_build_command.log"),
            captured_output: "make: *** [all] Error 2\n".to_string(),
        };
        let err = BuildError::new("zlib", Stage::RunBuildCommand, exec.into());
        assert_eq!(err.exit_code(), Some(2));
        assert!(!err.is_configuration());
    }
}
