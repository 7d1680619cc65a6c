//! Centralized shell output and progress management.
//!
//! All user-facing output goes through [`Shell`]:
//! - Status lines with a right-aligned, colored verb
//! - Spinners for long device transfers (via indicatif)
//! - Rendered diagnostics
//!
//! Commands never manage spacing or colors themselves.

use std::fmt::Display;
use std::io::{self, IsTerminal};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::util::diagnostic::Diagnostic;

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// --quiet: errors only, no progress
    Quiet,
    /// Default: status messages + spinners
    #[default]
    Normal,
    /// --verbose: status lines and debug logs, no spinners
    Verbose,
}

/// Color output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorChoice {
    /// Detect TTY and use colors if available.
    #[default]
    Auto,
    /// Always use ANSI colors.
    Always,
    /// Never use ANSI colors.
    Never,
}

impl std::str::FromStr for ColorChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(ColorChoice::Auto),
            "always" => Ok(ColorChoice::Always),
            "never" => Ok(ColorChoice::Never),
            _ => Err(format!(
                "invalid color choice '{}'; expected 'auto', 'always', or 'never'",
                s
            )),
        }
    }
}

/// Status types for output messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    // Success statuses (green)
    Finished,
    Installed,
    Restored,

    // In-progress statuses (cyan)
    Installing,
    Resolving,
    Pushing,
    Building,

    // Info statuses (blue)
    Info,
    Device,

    // Warning statuses (yellow)
    Warning,

    // Error status (red)
    Error,
}

impl Status {
    fn as_str(&self) -> &'static str {
        match self {
            Status::Finished => "Finished",
            Status::Installed => "Installed",
            Status::Restored => "Restored",
            Status::Installing => "Installing",
            Status::Resolving => "Resolving",
            Status::Pushing => "Pushing",
            Status::Building => "Building",
            Status::Info => "Info",
            Status::Device => "Device",
            Status::Warning => "Warning",
            Status::Error => "error",
        }
    }

    fn color_code(&self) -> &'static str {
        match self {
            Status::Finished | Status::Installed | Status::Restored => "\x1b[1;32m",
            Status::Installing
            | Status::Resolving
            | Status::Pushing
            | Status::Building => "\x1b[1;36m",
            Status::Info | Status::Device => "\x1b[1;34m",
            Status::Warning => "\x1b[1;33m",
            Status::Error => "\x1b[1;31m",
        }
    }

    /// Width for alignment (12 characters).
    fn width(&self) -> usize {
        12
    }
}

/// Central shell for all CLI output.
#[derive(Debug)]
pub struct Shell {
    verbosity: Verbosity,
    use_color: bool,
    interactive: bool,
}

impl Shell {
    /// Create a new shell.
    pub fn new(verbosity: Verbosity, color: ColorChoice) -> Self {
        let interactive = io::stderr().is_terminal();
        let use_color = match color {
            ColorChoice::Auto => interactive,
            ColorChoice::Always => true,
            ColorChoice::Never => false,
        };

        Shell {
            verbosity,
            use_color,
            interactive,
        }
    }

    /// Create a shell from CLI flags; quiet wins over verbose.
    pub fn from_flags(quiet: bool, verbose: bool, color: ColorChoice) -> Self {
        let verbosity = if quiet {
            Verbosity::Quiet
        } else if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        };
        Shell::new(verbosity, color)
    }

    pub fn is_quiet(&self) -> bool {
        self.verbosity == Verbosity::Quiet
    }

    pub fn is_verbose(&self) -> bool {
        self.verbosity == Verbosity::Verbose
    }

    pub fn use_color(&self) -> bool {
        self.use_color
    }

    /// Print a status message.
    ///
    /// Format: `{status:>12} {message}`. In quiet mode only errors are printed.
    pub fn status(&self, status: Status, msg: impl Display) {
        if self.is_quiet() && status != Status::Error {
            return;
        }
        eprintln!("{} {}", self.format_status(status), msg);
    }

    /// Print an info message.
    pub fn note(&self, msg: impl Display) {
        self.status(Status::Info, msg);
    }

    /// Print a warning message.
    pub fn warn(&self, msg: impl Display) {
        self.status(Status::Warning, msg);
    }

    /// Print an error message.
    pub fn error(&self, msg: impl Display) {
        self.status(Status::Error, msg);
    }

    /// Render a diagnostic to stderr; warnings are suppressed in quiet mode.
    pub fn diagnostic(&self, diagnostic: &Diagnostic) {
        if self.is_quiet() && diagnostic.severity != crate::util::diagnostic::Severity::Error {
            return;
        }
        eprint!("{}", diagnostic.format(self.use_color));
    }

    fn format_status(&self, status: Status) -> String {
        let text = status.as_str();
        let width = status.width();

        if self.use_color {
            format!("{}{:>width$}\x1b[0m", status.color_code(), text, width = width)
        } else {
            format!("{:>width$}", text, width = width)
        }
    }

    /// Print the status line and start a spinner for a long-running step.
    ///
    /// The spinner is hidden in quiet or verbose mode and when stderr is
    /// not a terminal.
    pub fn spinner(&self, status: Status, msg: impl Display) -> Spinner {
        let message = msg.to_string();
        self.status(status, &message);

        let pb = if self.is_quiet() || self.is_verbose() || !self.interactive {
            None
        } else {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) =
                ProgressStyle::default_spinner().template("{spinner:.green} {msg} {elapsed}")
            {
                pb.set_style(style);
            }
            pb.set_message(message);
            pb.enable_steady_tick(Duration::from_millis(100));
            Some(pb)
        };

        Spinner { pb }
    }
}

impl Default for Shell {
    fn default() -> Self {
        Shell::new(Verbosity::Normal, ColorChoice::Auto)
    }
}

/// Spinner for one blocking step; cleared on drop.
pub struct Spinner {
    pb: Option<ProgressBar>,
}

impl Drop for Spinner {
    fn drop(&mut self) {
        if let Some(pb) = self.pb.take() {
            pb.finish_and_clear();
        }
    }
}

/// Format a duration in a human-readable way.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 60.0 {
        format!("{:.2}s", secs)
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}
