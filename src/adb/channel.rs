//! Device control channel.
//!
//! Every device interaction goes through [`DeviceChannel::run`], so tests
//! can substitute a scripted channel for the real `adb` binary.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::util::process::ProcessBuilder;

/// Status code plus captured output of one channel command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status; `-1` when the process was killed by a signal.
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Stdout and stderr joined, for classification of installer messages.
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

/// Transport for adb commands.
pub trait DeviceChannel {
    /// Run `adb [-s serial] args...` and capture the result.
    ///
    /// An `Err` means the command could not be issued at all; a command that
    /// ran and failed is an `Ok` with a non-zero status.
    fn run(&self, serial: Option<&str>, args: &[String]) -> Result<CommandOutput>;
}

/// [`DeviceChannel`] backed by the `adb` executable.
#[derive(Debug, Clone)]
pub struct AdbChannel {
    program: PathBuf,
}

impl AdbChannel {
    pub fn new(program: impl AsRef<Path>) -> Self {
        AdbChannel {
            program: program.as_ref().to_path_buf(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl DeviceChannel for AdbChannel {
    fn run(&self, serial: Option<&str>, args: &[String]) -> Result<CommandOutput> {
        let mut builder = ProcessBuilder::new(&self.program);
        if let Some(serial) = serial {
            builder = builder.args(["-s", serial]);
        }
        let output = builder.args(args).exec()?;

        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_output() {
        let out = CommandOutput {
            status: 1,
            stdout: "Performing Streamed Install\n".into(),
            stderr: "adb: failed to install: Failure [INSTALL_FAILED_TEST_ONLY]\n".into(),
        };
        let combined = out.combined();
        assert!(combined.starts_with("Performing Streamed Install\n"));
        assert!(combined.contains("INSTALL_FAILED_TEST_ONLY"));

        let only_err = CommandOutput {
            status: 1,
            stdout: String::new(),
            stderr: "error: closed".into(),
        };
        assert_eq!(only_err.combined(), "error: closed");
    }

    #[test]
    fn test_missing_adb_is_an_error() {
        let channel = AdbChannel::new("/nonexistent/apkdeploy/adb");
        assert!(channel.run(None, &["devices".to_string()]).is_err());
    }
}
