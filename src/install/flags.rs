//! The installer flag ladder and installer output classification.

use std::fmt;

use serde::Serialize;

use crate::adb::CommandOutput;

/// Flag levels, in the only order an install may move through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagState {
    /// Replace existing, allow downgrade.
    Full,
    /// Replace existing only.
    Reduced,
    /// No optional flags.
    Minimal,
    /// Staged `pm install-create/write/commit` session.
    SessionFallback,
}

/// Every state, in ladder order.
pub const LADDER: [FlagState; 4] = [
    FlagState::Full,
    FlagState::Reduced,
    FlagState::Minimal,
    FlagState::SessionFallback,
];

/// Attempts allowed before the ladder jumps to minimal.
pub const MAX_FLAGGED_ATTEMPTS: usize = 3;

/// Flag that lets `pm` accept `android:testOnly` packages.
pub const TEST_FLAG: &str = "-t";

impl FlagState {
    /// Optional installer flags for this level.
    pub fn flags(self) -> &'static [&'static str] {
        match self {
            FlagState::Full => &["-r", "-d"],
            FlagState::Reduced => &["-r"],
            FlagState::Minimal | FlagState::SessionFallback => &[],
        }
    }

    /// The next level down, or `None` past the session fallback.
    pub fn next(self) -> Option<FlagState> {
        LADDER
            .iter()
            .position(|s| *s == self)
            .and_then(|i| LADDER.get(i + 1))
            .copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FlagState::Full => "full",
            FlagState::Reduced => "reduced",
            FlagState::Minimal => "minimal",
            FlagState::SessionFallback => "session",
        }
    }
}

impl fmt::Display for FlagState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an installer rejection means for the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallFailure {
    /// The installer does not know one of the flags.
    ArgumentUnsupported,
    /// `INSTALL_FAILED_TEST_ONLY`.
    TestOnly,
    /// `INSTALL_FAILED_USER_RESTRICTED`: the user refused on the device.
    UserRestricted,
    /// `INSTALL_FAILED_ALREADY_EXISTS`.
    AlreadyExists,
    /// Anything else, including downgrade and signature conflicts.
    Generic,
}

const FAILURE_MARKERS: [&str; 3] = ["Failure", "INSTALL_FAILED", "INSTALL_PARSE_FAILED"];

impl InstallFailure {
    /// Classify installer output; `None` means the install succeeded.
    pub fn classify(output: &CommandOutput) -> Option<InstallFailure> {
        let text = output.combined();
        if output.success() && !FAILURE_MARKERS.iter().any(|m| text.contains(m)) {
            return None;
        }

        let failure = if text.contains("argument expected") || text.contains("Unknown option") {
            InstallFailure::ArgumentUnsupported
        } else if text.contains("INSTALL_FAILED_TEST_ONLY") {
            InstallFailure::TestOnly
        } else if text.contains("INSTALL_FAILED_USER_RESTRICTED") {
            InstallFailure::UserRestricted
        } else if text.contains("INSTALL_FAILED_ALREADY_EXISTS") {
            InstallFailure::AlreadyExists
        } else {
            InstallFailure::Generic
        };
        Some(failure)
    }

    /// Rejections no other flag level can fix, given the flags they were
    /// issued with. `AlreadyExists` without `-r` is left to the session
    /// fallback, which replaces.
    pub fn is_terminal(self, flags: &[&str]) -> bool {
        match self {
            InstallFailure::UserRestricted => true,
            InstallFailure::AlreadyExists => flags.contains(&"-r"),
            _ => false,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            InstallFailure::ArgumentUnsupported => "unsupported installer argument",
            InstallFailure::TestOnly => "test-only package",
            InstallFailure::UserRestricted => "installation was refused on the device",
            InstallFailure::AlreadyExists => "the package already exists",
            InstallFailure::Generic => "installer failure",
        }
    }
}

/// Decision after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Try again at the attempt's current state.
    Retry,
    /// Terminal rejection.
    Rejected(InstallFailure),
    /// Every level has been tried.
    Exhausted,
}

/// Progress through the ladder for one install.
#[derive(Debug, Clone)]
pub struct InstallAttempt {
    state: FlagState,
    test_flag: bool,
    attempts: usize,
    last_failure: Option<InstallFailure>,
    tried: Vec<(FlagState, bool)>,
}

impl Default for InstallAttempt {
    fn default() -> Self {
        InstallAttempt::new()
    }
}

impl InstallAttempt {
    pub fn new() -> Self {
        InstallAttempt {
            state: FlagState::Full,
            test_flag: false,
            attempts: 0,
            last_failure: None,
            tried: Vec::new(),
        }
    }

    pub fn state(&self) -> FlagState {
        self.state
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn test_flag(&self) -> bool {
        self.test_flag
    }

    pub fn last_failure(&self) -> Option<InstallFailure> {
        self.last_failure
    }

    /// Installer flags for the current attempt.
    pub fn flags(&self) -> Vec<&'static str> {
        let mut flags = self.state.flags().to_vec();
        if self.test_flag {
            flags.push(TEST_FLAG);
        }
        flags
    }

    /// Mark the current (state, test flag) pair as issued.
    pub fn begin(&mut self) {
        self.attempts += 1;
        self.tried.push((self.state, self.test_flag));
    }

    /// Record a failure of the current attempt and pick the next one.
    pub fn fail(&mut self, failure: InstallFailure) -> Step {
        self.last_failure = Some(failure);
        if failure.is_terminal(&self.flags()) {
            return Step::Rejected(failure);
        }

        if failure == InstallFailure::TestOnly && !self.test_flag {
            self.test_flag = true;
            if !self.was_tried(self.state) {
                return Step::Retry;
            }
        }

        let mut next = self.state.next();
        if self.attempts >= MAX_FLAGGED_ATTEMPTS {
            next = next.map(|s| s.max(FlagState::Minimal));
        }
        while let Some(state) = next {
            if !self.was_tried(state) {
                self.state = state;
                return Step::Retry;
            }
            next = state.next();
        }
        Step::Exhausted
    }

    fn was_tried(&self, state: FlagState) -> bool {
        self.tried.contains(&(state, self.test_flag))
    }
}
