//! Declarative topology: document schema, projection, discovery seams.
//!
//! - [`document`]: serde schema for the TOML topology document
//! - [`interpreter`]: projection of the document into the current node's
//!   view (self class, initial routing tiers, discovery workers)
//! - [`discovery`]: worker descriptors handed to subsystem launchers, and
//!   the DNS resolver callback they consume
//!
//! The interpreter only *describes* discovery; the subscriber workers that
//! run DNS or DHT discovery live elsewhere and feed their results back
//! through the outbound queue's peer add/remove API.

pub mod discovery;
pub mod document;
pub mod interpreter;

pub use discovery::{DiscoveryWorker, DnsDomain, DnsResolutionFailed, DnsResolver};
pub use document::{NodeEntry, P2pSection, P2pVariant, RelayAddr, TopologyDocument, WalletSection};
pub use interpreter::{interpret, Projection, TopologyView};

use thiserror::Error;

/// Rejection of a topology document. Fatal to startup.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("bad topology: {reason}")]
    BadTopology { reason: String },

    #[error("bad topology: {0}")]
    Parse(#[from] toml::de::Error),
}

impl TopologyError {
    pub(crate) fn bad(reason: impl Into<String>) -> Self {
        TopologyError::BadTopology {
            reason: reason.into(),
        }
    }
}
