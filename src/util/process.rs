//! Subprocess execution utilities.
//!
//! [`ProcessBuilder`] describes a command as an argument vector plus an
//! explicit environment. [`ProcessRunner`] executes it with stdout and stderr
//! merged into one stream, echoing each line to the console while writing the
//! raw bytes to a per-stage log file.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use anyhow::{bail, Context, Result};
use thiserror::Error;

/// An external command exited unsuccessfully.
#[derive(Debug, Clone, Error)]
#[error("`{command}` failed with exit code {} (log: {})", display_code(*exit_code), log_path.display())]
pub struct ExecutionError {
    /// The command line as displayed to the user
    pub command: String,
    /// Exit code, or `None` if the process was terminated by a signal
    pub exit_code: Option<i32>,
    /// Log file holding the captured output
    pub log_path: PathBuf,
    /// Interleaved stdout/stderr exactly as emitted
    pub captured_output: String,
}

fn display_code(code: Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "<signal>".to_string())
}

/// Failure of a [`ProcessRunner::run`] call.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to spawn `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write log file {}", path.display())]
    Log {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed while waiting for `{command}`")]
    Wait {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Exit(#[from] ExecutionError),
}

/// Builder for subprocess execution.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    env_remove: Vec<String>,
    env_clear: bool,
    cwd: Option<PathBuf>,
    stdin: Option<Vec<u8>>,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: HashMap::new(),
            env_remove: Vec::new(),
            env_clear: false,
            cwd: None,
            stdin: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    /// Replace the inherited environment with exactly `vars`.
    pub fn env_exact<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.env_clear = true;
        self.env.clear();
        for (key, value) in vars {
            self.env
                .insert(key.as_ref().to_string(), value.as_ref().to_string());
        }
        self
    }

    /// Remove an environment variable.
    pub fn env_remove(mut self, key: impl AsRef<str>) -> Self {
        self.env_remove.push(key.as_ref().to_string());
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Set stdin data.
    pub fn stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    /// Get the working directory, if set.
    pub fn get_cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Build the Command.
    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        if self.env_clear {
            cmd.env_clear();
        }

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        for key in &self.env_remove {
            cmd.env_remove(key);
        }

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        cmd
    }

    /// Execute the command and wait for completion.
    pub fn exec(&self) -> Result<Output> {
        let mut cmd = self.build_command();

        if self.stdin.is_some() {
            cmd.stdin(Stdio::piped());
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn `{}`", self.program.display()))?;

        if let Some(ref stdin_data) = self.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(stdin_data)?;
            }
        }

        let output = child
            .wait_with_output()
            .with_context(|| format!("failed to wait for `{}`", self.program.display()))?;

        Ok(output)
    }

    /// Execute and require success.
    pub fn exec_and_check(&self) -> Result<Output> {
        let output = self.exec()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "`{}` failed with exit code {:?}\n{}",
                self.display_command(),
                output.status.code(),
                stderr
            );
        }
        Ok(output)
    }

    /// Display the command for error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Runs build commands, streaming their merged output to the console and a log.
///
/// Calls block until the child exits. There is no timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner {
    quiet: bool,
}

impl ProcessRunner {
    /// Create a runner that echoes output to the console.
    pub fn new() -> Self {
        ProcessRunner { quiet: false }
    }

    /// Suppress console echo. The log file is still written.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Run `cmd`, writing its combined output to `log`.
    ///
    /// The log is truncated unless `append` is set. A non-zero exit status
    /// becomes [`RunError::Exit`] carrying the exit code and captured output.
    pub fn run(&self, cmd: &ProcessBuilder, log: &Path, append: bool) -> Result<(), RunError> {
        let command = cmd.display_command();
        let log_error = |source| RunError::Log {
            path: log.to_path_buf(),
            source,
        };

        if let Some(parent) = log.parent() {
            fs::create_dir_all(parent).map_err(log_error)?;
        }
        let mut log_file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(log)
            .map_err(log_error)?;

        tracing::debug!("Running {}", command);

        // stdout and stderr share one pipe so the log preserves emission order
        let (reader, writer) = io::pipe().map_err(|source| RunError::Spawn {
            command: command.clone(),
            source,
        })?;
        let writer_err = writer.try_clone().map_err(|source| RunError::Spawn {
            command: command.clone(),
            source,
        })?;

        let mut process = cmd.build_command();
        process.stdin(Stdio::null());
        process.stdout(writer);
        process.stderr(writer_err);

        let mut child = process.spawn().map_err(|source| RunError::Spawn {
            command: command.clone(),
            source,
        })?;
        // Our copies of the write end must close or the reader never sees EOF.
        drop(process);

        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        let mut captured = Vec::new();
        loop {
            line.clear();
            let read = reader.read_until(b'\n', &mut line).map_err(|source| {
                RunError::Wait {
                    command: command.clone(),
                    source,
                }
            })?;
            if read == 0 {
                break;
            }
            log_file.write_all(&line).map_err(log_error)?;
            log_file.flush().map_err(log_error)?;
            if !self.quiet {
                print!("{}", String::from_utf8_lossy(&line));
            }
            captured.extend_from_slice(&line);
        }

        let status = child.wait().map_err(|source| RunError::Wait {
            command: command.clone(),
            source,
        })?;

        if !status.success() {
            return Err(ExecutionError {
                command,
                exit_code: status.code(),
                log_path: log.to_path_buf(),
                captured_output: String::from_utf8_lossy(&captured).into_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// Find an executable in PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

/// Find CMake.
pub fn find_cmake() -> Option<PathBuf> {
    find_executable("cmake")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_process_builder() {
        let output = ProcessBuilder::new("echo").arg("hello").exec().unwrap();

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.trim() == "hello" || stdout.contains("hello"));
    }

    #[test]
    fn test_display_command() {
        let pb = ProcessBuilder::new("make").args(["-j4", "install"]);

        assert_eq!(pb.display_command(), "make -j4 install");
    }

    #[cfg(unix)]
    #[test]
    fn test_env_exact_replaces_explicit_env() {
        let output = ProcessBuilder::new("/bin/sh")
            .args(["-c", "echo \"${A:-unset} $B\""])
            .env("A", "1")
            .env_exact([("B", "2")])
            .exec()
            .unwrap();

        assert_eq!(String::from_utf8_lossy(&output.stdout), "unset 2\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_reports_exit_code_and_interleaved_log() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("logs").join("nested").join("stage.log");

        let cmd = ProcessBuilder::new("sh")
            .arg("-c")
            .arg("echo out1; echo err1 1>&2; echo out2; exit 3");
        let err = ProcessRunner::new().quiet(true).run(&cmd, &log, false).unwrap_err();

        let exec = match err {
            RunError::Exit(e) => e,
            other => panic!("unexpected error: {other}"),
        };
        assert_eq!(exec.exit_code, Some(3));
        assert_eq!(exec.log_path, log);
        assert_eq!(exec.captured_output, "out1\nerr1\nout2\n");
        assert_eq!(fs::read_to_string(&log).unwrap(), "out1\nerr1\nout2\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_truncates_unless_appending() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("stage.log");
        let runner = ProcessRunner::new().quiet(true);

        runner
            .run(&ProcessBuilder::new("echo").arg("first"), &log, false)
            .unwrap();
        runner
            .run(&ProcessBuilder::new("echo").arg("second"), &log, true)
            .unwrap();
        assert_eq!(fs::read_to_string(&log).unwrap(), "first\nsecond\n");

        runner
            .run(&ProcessBuilder::new("echo").arg("third"), &log, false)
            .unwrap();
        assert_eq!(fs::read_to_string(&log).unwrap(), "third\n");
    }

    #[test]
    fn test_run_missing_program_is_spawn_error() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("stage.log");

        let err = ProcessRunner::new()
            .quiet(true)
            .run(
                &ProcessBuilder::new("definitely-not-a-real-program-xyz"),
                &log,
                false,
            )
            .unwrap_err();
        assert!(matches!(err, RunError::Spawn { .. }));
    }
}
