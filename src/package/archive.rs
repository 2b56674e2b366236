//! Source archive kinds and the commands that unpack them.

use std::path::Path;

use crate::package::error::ConfigurationError;
use crate::platform::PlatformContext;
use crate::util::process::ProcessBuilder;

/// Archive formats the extract stage understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
    TarBz2,
    TarXz,
}

impl ArchiveKind {
    /// Classify an archive by its file name suffix.
    pub fn from_path(path: &Path) -> Result<Self, ConfigurationError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        let kind = if name.ends_with(".zip") {
            ArchiveKind::Zip
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            ArchiveKind::TarGz
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
            ArchiveKind::TarBz2
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            ArchiveKind::TarXz
        } else {
            return Err(ConfigurationError::UnknownArchive {
                path: path.to_path_buf(),
            });
        };
        Ok(kind)
    }

    fn tar_flags(&self) -> Option<&'static str> {
        match self {
            ArchiveKind::Zip => None,
            ArchiveKind::TarGz => Some("zxf"),
            ArchiveKind::TarBz2 => Some("jxf"),
            ArchiveKind::TarXz => Some("xf"),
        }
    }

    /// Commands that unpack `archive` into `dest`, tried in order until one
    /// succeeds.
    ///
    /// Windows `tar` needs `--force-local` for paths with a drive letter but
    /// not every build of it accepts the flag, so the plain form follows.
    pub fn unpack_commands(
        &self,
        archive: &Path,
        dest: &Path,
        platform: &PlatformContext,
    ) -> Vec<ProcessBuilder> {
        match self.tar_flags() {
            None => vec![ProcessBuilder::new("unzip")
                .args(["-q", "-o"])
                .arg(archive)
                .cwd(dest)],
            Some(flags) if platform.is_windows() => {
                let flags = format!("-{}", flags);
                vec![
                    ProcessBuilder::new("tar")
                        .arg("--force-local")
                        .arg(&flags)
                        .arg(archive)
                        .cwd(dest),
                    ProcessBuilder::new("tar").arg(&flags).arg(archive).cwd(dest),
                ]
            }
            Some(flags) => vec![ProcessBuilder::new("tar").arg(flags).arg(archive).cwd(dest)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn kind(name: &str) -> Result<ArchiveKind, ConfigurationError> {
        ArchiveKind::from_path(Path::new(name))
    }

    #[test]
    fn test_suffix_dispatch() {
        assert_eq!(kind("Togl-windows-ci.zip").unwrap(), ArchiveKind::Zip);
        assert_eq!(kind("sqlite-autoconf-3310100.tar.gz").unwrap(), ArchiveKind::TarGz);
        assert_eq!(kind("tcl8.6.10-src.tgz").unwrap(), ArchiveKind::TarGz);
        assert_eq!(kind("db-5.3.28.tar.bz2").unwrap(), ArchiveKind::TarBz2);
        assert_eq!(kind("Python-2.7.18.tar.xz").unwrap(), ArchiveKind::TarXz);
    }

    #[test]
    fn test_unknown_suffix_is_configuration_error() {
        assert_eq!(
            kind("installer.dmg").unwrap_err(),
            ConfigurationError::UnknownArchive {
                path: PathBuf::from("installer.dmg")
            }
        );
        assert!(kind("notes.gz").is_err());
    }

    #[test]
    fn test_unpack_command_selection() {
        let linux = PlatformContext::linux(1);
        let dest = Path::new("/x/extracted/zlib");

        let cmds = ArchiveKind::TarGz.unpack_commands(Path::new("/d/z.tar.gz"), dest, &linux);
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].display_command(), "tar zxf /d/z.tar.gz");
        assert_eq!(cmds[0].get_cwd(), Some(dest));

        let cmds = ArchiveKind::TarBz2.unpack_commands(Path::new("/d/z.tar.bz2"), dest, &linux);
        assert_eq!(cmds[0].display_command(), "tar jxf /d/z.tar.bz2");

        let cmds = ArchiveKind::TarXz.unpack_commands(Path::new("/d/z.tar.xz"), dest, &linux);
        assert_eq!(cmds[0].display_command(), "tar xf /d/z.tar.xz");

        let cmds = ArchiveKind::Zip.unpack_commands(Path::new("/d/z.zip"), dest, &linux);
        assert_eq!(cmds[0].display_command(), "unzip -q -o /d/z.zip");
    }

    #[test]
    fn test_windows_tries_force_local_first() {
        let windows = PlatformContext::windows(1);
        let cmds = ArchiveKind::TarGz.unpack_commands(
            Path::new("d.tar.gz"),
            Path::new("out"),
            &windows,
        );
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0].display_command(), "tar --force-local -zxf d.tar.gz");
        assert_eq!(cmds[1].display_command(), "tar -zxf d.tar.gz");
    }
}
