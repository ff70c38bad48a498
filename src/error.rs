//! Typed errors for the synthesis stages.
//!
//! Stage operations return these rather than raising across the
//! orchestration boundary. `CapabilityRequired` is the one configuration
//! error that should fail fast; everything else is recoverable at the
//! call site (fallback to original text, or treat state as empty).

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SynthesisError {
    /// A mandatory capability (classification) is missing. Fatal.
    #[error("required capability not configured: {0}")]
    CapabilityRequired(&'static str),

    /// Transient failure from an external capability (transport, HTTP).
    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// An external capability call exceeded its deadline. Distinct from
    /// `CapabilityUnavailable` so callers can tune timeouts separately.
    #[error("capability call timed out after {0:?}")]
    Timeout(Duration),

    /// Generated text failed structural checks (length, pronouns, empty).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Persisted state could not be read or parsed.
    #[error("corrupt state in {path}: {reason}")]
    Corruption { path: String, reason: String },
}

pub type Result<T> = std::result::Result<T, SynthesisError>;
