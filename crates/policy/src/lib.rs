//! Routing policy: how widely to fan out, how fast to drain, how long to
//! back off.
//!
//! - [`rules`]: the three orthogonal rule types (enqueue, dequeue, failure)
//! - [`document`]: serde schema for the TOML policy document
//! - [`model`]: immutable [`PolicyModel`] with built-in per-class defaults
//!
//! The model is constructed once at startup and read-only afterwards, so
//! lookups need no locking.

pub mod document;
pub mod model;
pub mod rules;

pub use document::PolicyDocument;
pub use model::PolicyModel;
pub use rules::{DequeueRule, EnqueueRule, RateLimit};

use thiserror::Error;

/// Rejection of a policy document. Fatal to startup.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("bad policy: {reason}")]
    BadPolicy { reason: String },

    #[error("bad policy: {0}")]
    Parse(#[from] toml::de::Error),
}

impl PolicyError {
    pub(crate) fn bad(reason: impl Into<String>) -> Self {
        PolicyError::BadPolicy {
            reason: reason.into(),
        }
    }
}
