//! Shared utilities

pub mod archive;
pub mod config;
pub mod diagnostic;
pub mod fs;
pub mod hash;
pub mod process;
pub mod prompt;
pub mod shell;

pub use config::Config;
pub use diagnostic::Diagnostic;
pub use prompt::Prompter;
pub use shell::Shell;
