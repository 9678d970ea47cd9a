//! Error types surfaced by the audit subsystem.
//!
//! Routine audit answers (a poll without a tree, a ballot that is not in the
//! tree, a proof that does not reconstruct its root) are returned as `None` or
//! `false`.  The variants below cover caller defects only.

use thiserror::Error;

/// Errors raised by encoding and parsing helpers.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The ballot payload or round results could not be canonically serialized.
    #[error("canonical encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
    /// A hex digest was malformed or had the wrong length.
    #[error("invalid digest: {0}")]
    InvalidDigest(String),
    /// A proof document could not be parsed.
    #[error("invalid proof document: {0}")]
    InvalidProof(String),
    /// A configuration value could not be interpreted.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Convenience alias used throughout the crate.
pub type AuditResult<T> = Result<T, AuditError>;
