//! Interactive confirmation.
//!
//! Components that need a yes/no checkpoint take a `&dyn Prompter`, so the
//! same flow runs interactively, under `--yes`, or scripted in tests.

use anyhow::{Context, Result};
use inquire::Confirm;

/// Blocking yes/no question.
pub trait Prompter {
    fn confirm(&self, question: &str, default: bool) -> Result<bool>;
}

/// Terminal prompter backed by `inquire`.
#[derive(Debug, Default, Clone, Copy)]
pub struct InquirePrompter;

impl Prompter for InquirePrompter {
    fn confirm(&self, question: &str, default: bool) -> Result<bool> {
        Confirm::new(question)
            .with_default(default)
            .with_help_message("Press Enter for the default, or answer y/n")
            .prompt()
            .with_context(|| format!("failed to read confirmation for: {}", question))
    }
}

/// Answers yes to every question without asking.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl Prompter for AssumeYes {
    fn confirm(&self, question: &str, _default: bool) -> Result<bool> {
        tracing::info!(question, "assuming yes");
        Ok(true)
    }
}

/// Answers no to every question; used when stdin is not a terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeNo;

impl Prompter for AssumeNo {
    fn confirm(&self, question: &str, _default: bool) -> Result<bool> {
        tracing::warn!(question, "not a terminal, declining");
        Ok(false)
    }
}
