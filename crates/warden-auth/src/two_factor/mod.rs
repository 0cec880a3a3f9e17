//! Time-based one-time password second factor.

pub mod backup_codes;
pub mod service;

pub use backup_codes::BackupCodeBatch;
pub use service::{SecondFactor, TwoFactorService};
