//! Host platform description.
//!
//! A [`PlatformContext`] is detected once by the entry point and handed to
//! every package. Nothing reads the host through ambient globals.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::util::process::ProcessBuilder;

/// Minimum macOS release produced binaries run on, unless configured.
pub const DEFAULT_DEPLOYMENT_TARGET: &str = "10.12";

/// Operating system family of the build host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Linux,
    Macos,
    Windows,
}

impl OsFamily {
    /// The family this binary was compiled for.
    pub fn host() -> Self {
        if cfg!(target_os = "macos") {
            OsFamily::Macos
        } else if cfg!(windows) {
            OsFamily::Windows
        } else {
            OsFamily::Linux
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OsFamily::Linux => "linux",
            OsFamily::Macos => "macos",
            OsFamily::Windows => "windows",
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of the build host.
///
/// `sdk_root` and `deployment_target` are present exactly when the family is
/// macOS; the constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformContext {
    os_family: OsFamily,
    sdk_root: Option<PathBuf>,
    deployment_target: Option<String>,
    cpu_count: usize,
}

impl PlatformContext {
    /// A Linux host.
    pub fn linux(cpu_count: usize) -> Self {
        PlatformContext {
            os_family: OsFamily::Linux,
            sdk_root: None,
            deployment_target: None,
            cpu_count: cpu_count.max(1),
        }
    }

    /// A Windows host.
    pub fn windows(cpu_count: usize) -> Self {
        PlatformContext {
            os_family: OsFamily::Windows,
            sdk_root: None,
            deployment_target: None,
            cpu_count: cpu_count.max(1),
        }
    }

    /// A macOS host with its SDK root and deployment target.
    pub fn macos(
        sdk_root: impl Into<PathBuf>,
        deployment_target: impl Into<String>,
        cpu_count: usize,
    ) -> Self {
        PlatformContext {
            os_family: OsFamily::Macos,
            sdk_root: Some(sdk_root.into()),
            deployment_target: Some(deployment_target.into()),
            cpu_count: cpu_count.max(1),
        }
    }

    /// Detect the running host.
    ///
    /// On macOS this asks `xcrun` for the SDK path and fails if it does not
    /// exist.
    pub fn detect(deployment_target: Option<&str>) -> Result<Self> {
        let cpu_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        let platform = match OsFamily::host() {
            OsFamily::Linux => PlatformContext::linux(cpu_count),
            OsFamily::Windows => PlatformContext::windows(cpu_count),
            OsFamily::Macos => {
                let sdk_root = detect_macos_sdk_root()?;
                PlatformContext::macos(
                    sdk_root,
                    deployment_target.unwrap_or(DEFAULT_DEPLOYMENT_TARGET),
                    cpu_count,
                )
            }
        };

        tracing::debug!(
            "Detected {} host with {} CPU(s)",
            platform.os_family,
            platform.cpu_count
        );
        Ok(platform)
    }

    pub fn os_family(&self) -> OsFamily {
        self.os_family
    }

    pub fn is_linux(&self) -> bool {
        self.os_family == OsFamily::Linux
    }

    pub fn is_macos(&self) -> bool {
        self.os_family == OsFamily::Macos
    }

    pub fn is_windows(&self) -> bool {
        self.os_family == OsFamily::Windows
    }

    /// macOS SDK root (`xcrun --show-sdk-path`).
    pub fn sdk_root(&self) -> Option<&Path> {
        self.sdk_root.as_deref()
    }

    /// Minimum macOS version produced binaries support.
    pub fn deployment_target(&self) -> Option<&str> {
        self.deployment_target.as_deref()
    }

    /// Worker count handed to `make -j`.
    pub fn cpu_count(&self) -> usize {
        self.cpu_count
    }

    /// Flags every C, C++ and link step needs on this host.
    pub fn toolchain_flags(&self) -> Vec<String> {
        match (&self.sdk_root, &self.deployment_target) {
            (Some(sdk), Some(target)) => vec![
                "-arch".to_string(),
                "x86_64".to_string(),
                "-isysroot".to_string(),
                sdk.display().to_string(),
                format!("-mmacosx-version-min={}", target),
            ],
            _ => Vec::new(),
        }
    }
}

fn detect_macos_sdk_root() -> Result<PathBuf> {
    let output = ProcessBuilder::new("xcrun")
        .arg("--show-sdk-path")
        .exec_and_check()
        .context("failed to locate the macOS SDK")?;
    let sdk_root = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());
    if !sdk_root.exists() {
        anyhow::bail!("macOS SDK root does not exist: {}", sdk_root.display());
    }
    Ok(sdk_root)
}
