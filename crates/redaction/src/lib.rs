//! Credential redaction for macdeploy.
//!
//! Provisioning commands carry the administrator password and the initial
//! password of every account they create. This crate masks those values
//! before a rendered command or its output is written to the deployment log
//! or shipped to the collector.

pub mod patterns;
pub mod redactor;

pub use redactor::{RedactionResult, RedactionStats, Redactor};

/// Default placeholder for redacted values.
pub const REDACTED_PLACEHOLDER: &str = "[REDACTED]";

/// Secrets shorter than this are not matched literally; they would shred
/// ordinary words in the log.
pub const MIN_LITERAL_SECRET_LEN: usize = 3;
