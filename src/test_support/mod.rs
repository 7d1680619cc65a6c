//! Test utilities and mocks for apkdeploy unit tests.
//!
//! This module provides a scripted device channel, a scripted prompter
//! and fixtures for devices and package descriptors.
//!
//! # Example
//!
//! ```rust,ignore
//! use apkdeploy::test_support::{arm64_phone, MockChannel, MockProcessOutput};
//!
//! #[test]
//! fn test_example() {
//!     let mut channel = MockChannel::new().with_device(&arm64_phone("emu"));
//!     channel.expect("-s emu install -r -d app.apk", MockProcessOutput::success("Success"));
//!
//!     // Use the channel in tests...
//! }
//! ```

pub mod fixtures;

use std::cell::RefCell;
use std::collections::VecDeque;

use anyhow::{bail, Result};

use crate::adb::{CommandOutput, DeviceChannel};
use crate::util::prompt::Prompter;

pub use fixtures::*;

/// Mock process output for testing command execution.
#[derive(Debug, Clone)]
pub struct MockProcessOutput {
    /// Exit status code (0 = success).
    pub status: i32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl MockProcessOutput {
    /// Create a successful output with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        MockProcessOutput {
            status: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Create a failure output with the given stderr and status code.
    pub fn failure(status: i32, stderr: impl Into<String>) -> Self {
        MockProcessOutput {
            status,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    fn to_command_output(&self) -> CommandOutput {
        CommandOutput {
            status: self.status,
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
        }
    }
}

impl Default for MockProcessOutput {
    fn default() -> Self {
        MockProcessOutput::success("")
    }
}

/// Pattern for matching commands in [`MockChannel`].
#[derive(Debug, Clone)]
pub enum CommandPattern {
    /// Exact match on full command string.
    Exact(String),
    /// Match if command starts with prefix.
    StartsWith(String),
    /// Match if command contains substring.
    Contains(String),
    /// Match using a regex pattern.
    Regex(String),
    /// Match any command.
    Any,
}

impl CommandPattern {
    /// Check if this pattern matches the given command.
    pub fn matches(&self, cmd: &str) -> bool {
        match self {
            CommandPattern::Exact(s) => cmd == s,
            CommandPattern::StartsWith(s) => cmd.starts_with(s),
            CommandPattern::Contains(s) => cmd.contains(s),
            CommandPattern::Regex(pattern) => regex::Regex::new(pattern)
                .map(|re| re.is_match(cmd))
                .unwrap_or(false),
            CommandPattern::Any => true,
        }
    }
}

/// Expectation for a command execution.
#[derive(Debug, Clone)]
pub struct CommandExpectation {
    /// Pattern to match against commands.
    pub pattern: CommandPattern,
    /// Output to return when matched.
    pub output: MockProcessOutput,
    /// Number of times this expectation can be used (None = unlimited).
    pub times: Option<usize>,
    /// Number of times this expectation has been used.
    pub used: usize,
}

impl CommandExpectation {
    /// Create a new expectation.
    pub fn new(pattern: CommandPattern, output: MockProcessOutput) -> Self {
        CommandExpectation {
            pattern,
            output,
            times: None,
            used: 0,
        }
    }

    /// Set the number of times this expectation can be used.
    pub fn times(mut self, n: usize) -> Self {
        self.times = Some(n);
        self
    }

    /// Check if this expectation can still be used.
    pub fn available(&self) -> bool {
        match self.times {
            Some(n) => self.used < n,
            None => true,
        }
    }
}

/// Scripted [`DeviceChannel`].
///
/// Commands are rendered as `-s <serial> <args...>` (or just `<args...>`
/// without a serial) and matched against expectations in insertion order.
/// Device fixtures registered with [`MockChannel::with_device`] answer
/// after explicit expectations, so a test can override any fixture command.
#[derive(Debug, Default)]
pub struct MockChannel {
    expectations: RefCell<Vec<CommandExpectation>>,
    fixture: RefCell<Vec<CommandExpectation>>,
    devices: Vec<String>,
    calls: RefCell<Vec<String>>,
    default_output: Option<MockProcessOutput>,
}

impl MockChannel {
    /// Create a new mock channel.
    pub fn new() -> Self {
        MockChannel::default()
    }

    /// Register a device: it is listed by `adb devices` and answers its property queries.
    pub fn with_device(mut self, device: &DeviceFixture) -> Self {
        self.devices.push(device.serial.clone());
        self.fixture.get_mut().extend(device.expectations());
        self
    }

    /// Add an expectation for an exact command match.
    pub fn expect(&mut self, cmd: &str, output: MockProcessOutput) -> &mut Self {
        self.expect_pattern(CommandExpectation::new(
            CommandPattern::Exact(cmd.to_string()),
            output,
        ))
    }

    /// Add an expectation for a command starting with a prefix.
    pub fn expect_prefix(&mut self, prefix: &str, output: MockProcessOutput) -> &mut Self {
        self.expect_pattern(CommandExpectation::new(
            CommandPattern::StartsWith(prefix.to_string()),
            output,
        ))
    }

    /// Add an expectation for a command containing a substring.
    pub fn expect_contains(&mut self, substring: &str, output: MockProcessOutput) -> &mut Self {
        self.expect_pattern(CommandExpectation::new(
            CommandPattern::Contains(substring.to_string()),
            output,
        ))
    }

    /// Add a custom expectation.
    pub fn expect_pattern(&mut self, expectation: CommandExpectation) -> &mut Self {
        self.expectations.get_mut().push(expectation);
        self
    }

    /// Set a default output for commands that don't match any expectation.
    pub fn set_default(&mut self, output: MockProcessOutput) -> &mut Self {
        self.default_output = Some(output);
        self
    }

    /// Get all commands that were called.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Commands containing `needle`, in call order.
    pub fn calls_containing(&self, needle: &str) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.contains(needle))
            .cloned()
            .collect()
    }

    /// Verify that all expectations with a specific count were satisfied.
    pub fn verify(&self) -> Result<()> {
        for (i, exp) in self.expectations.borrow().iter().enumerate() {
            if let Some(expected) = exp.times {
                if exp.used != expected {
                    bail!(
                        "expectation {} ({:?}) was used {} times, expected {}",
                        i,
                        exp.pattern,
                        exp.used,
                        expected
                    );
                }
            }
        }
        Ok(())
    }

    fn devices_listing(&self) -> String {
        let mut out = String::from("List of devices attached\n");
        for serial in &self.devices {
            out.push_str(&format!("{}\tdevice\n", serial));
        }
        out
    }
}

fn take_match(expectations: &RefCell<Vec<CommandExpectation>>, cmd: &str) -> Option<CommandOutput> {
    expectations
        .borrow_mut()
        .iter_mut()
        .find(|exp| exp.pattern.matches(cmd) && exp.available())
        .map(|exp| {
            exp.used += 1;
            exp.output.to_command_output()
        })
}

impl DeviceChannel for MockChannel {
    fn run(&self, serial: Option<&str>, args: &[String]) -> Result<CommandOutput> {
        let full_cmd = match serial {
            Some(serial) => format!("-s {} {}", serial, args.join(" ")),
            None => args.join(" "),
        };
        self.calls.borrow_mut().push(full_cmd.clone());

        if let Some(output) = take_match(&self.expectations, &full_cmd) {
            return Ok(output);
        }
        if let Some(output) = take_match(&self.fixture, &full_cmd) {
            return Ok(output);
        }
        if full_cmd == "devices" && !self.devices.is_empty() {
            return Ok(MockProcessOutput::success(self.devices_listing()).to_command_output());
        }
        if let Some(ref default) = self.default_output {
            return Ok(default.to_command_output());
        }

        bail!("unexpected command: {}", full_cmd)
    }
}

/// [`Prompter`] answering from a queue and recording every question.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: RefCell<VecDeque<bool>>,
    asked: RefCell<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new(answers: &[bool]) -> Self {
        ScriptedPrompter {
            answers: RefCell::new(answers.iter().copied().collect()),
            asked: RefCell::new(Vec::new()),
        }
    }

    /// Questions asked so far.
    pub fn asked(&self) -> Vec<String> {
        self.asked.borrow().clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, question: &str, _default: bool) -> Result<bool> {
        self.asked.borrow_mut().push(question.to_string());
        match self.answers.borrow_mut().pop_front() {
            Some(answer) => Ok(answer),
            None => bail!("unexpected prompt: {}", question),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_channel_basic() {
        let mut channel = MockChannel::new();
        channel.expect("-s emu shell getprop ro.product.cpu.abi", MockProcessOutput::success("x86"));
        channel.expect_prefix("-s emu install", MockProcessOutput::success("Success"));

        let out = channel
            .run(
                Some("emu"),
                &["shell".into(), "getprop".into(), "ro.product.cpu.abi".into()],
            )
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "x86");

        let out = channel
            .run(Some("emu"), &["install".into(), "a.apk".into()])
            .unwrap();
        assert!(out.success());
        assert_eq!(channel.calls().len(), 2);
    }

    #[test]
    fn test_mock_channel_unexpected() {
        let channel = MockChannel::new();
        assert!(channel.run(None, &["reboot".into()]).is_err());
    }

    #[test]
    fn test_bounded_expectations_run_in_order() {
        let mut channel = MockChannel::new();
        channel.expect_pattern(
            CommandExpectation::new(
                CommandPattern::StartsWith("-s emu install".into()),
                MockProcessOutput::failure(1, "Failure"),
            )
            .times(1),
        );
        channel.expect_prefix("-s emu install", MockProcessOutput::success("Success"));

        let args = ["install".to_string(), "a.apk".to_string()];
        assert!(!channel.run(Some("emu"), &args).unwrap().success());
        assert!(channel.run(Some("emu"), &args).unwrap().success());
        channel.verify().unwrap();
    }

    #[test]
    fn test_fixture_lists_devices() {
        let channel = MockChannel::new()
            .with_device(&arm64_phone("a"))
            .with_device(&armv7_tablet("b"));
        let out = channel.run(None, &["devices".into()]).unwrap();
        assert!(out.stdout.contains("a\tdevice"));
        assert!(out.stdout.contains("b\tdevice"));
    }

    #[test]
    fn test_scripted_prompter() {
        let prompter = ScriptedPrompter::new(&[true]);
        assert!(prompter.confirm("Proceed?", false).unwrap());
        assert!(prompter.confirm("Again?", false).is_err());
        assert_eq!(prompter.asked(), vec!["Proceed?", "Again?"]);
    }
}
