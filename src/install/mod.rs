//! Installation: the flag ladder, session fallback, and keep-data recovery.

pub mod backup;
pub mod executor;
pub mod flags;
pub mod session;

pub use backup::{BackupRecord, BackupRestoreManager, RecoveryOutcome, OBB_ROOT};
pub use executor::{AttemptRecord, InstallExecutor, InstallOptions, InstallReport, InstallRequest};
pub use flags::{FlagState, InstallAttempt, InstallFailure, LADDER};
