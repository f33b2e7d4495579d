//! Discovery worker descriptors and the DNS resolver seam.
//!
//! The interpreter emits these descriptors; subsystem launchers turn them
//! into running subscriber workers. The workers feed discovered peers into
//! the outbound queue's peer add/remove API; nothing here performs I/O.

use spool_types::NodeClass;
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;

/// A DNS name with the port its peers listen on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsDomain {
    pub domain: String,
    pub port: u16,
}

impl fmt::Display for DnsDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.domain, self.port)
    }
}

/// A subscriber worker the launcher should spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryWorker {
    /// Periodically re-resolve `domains` and maintain `valency` alternative
    /// groups of `fallbacks + 1` peers each.
    Dns {
        domains: Vec<DnsDomain>,
        valency: usize,
        fallbacks: usize,
    },
    /// Kademlia lookup worker. `peer_class` is the class discovered peers
    /// are admitted under.
    Dht {
        peer_class: NodeClass,
        valency: usize,
        fallbacks: usize,
    },
}

/// Resolver callback consumed by the DNS subscriber.
///
/// Implemented by whatever resolver the host process carries; a closure
/// works via the blanket impl.
pub trait DnsResolver: Send + Sync {
    fn resolve(&self, domain: &str) -> std::io::Result<Vec<IpAddr>>;
}

impl<F> DnsResolver for F
where
    F: Fn(&str) -> std::io::Result<Vec<IpAddr>> + Send + Sync,
{
    fn resolve(&self, domain: &str) -> std::io::Result<Vec<IpAddr>> {
        self(domain)
    }
}

/// Per-domain resolution failure. Reported as data; the subscriber carries
/// on with its other domains and retries on the next pass.
#[derive(Debug, Error)]
#[error("dns resolution failed for '{domain}': {source}")]
pub struct DnsResolutionFailed {
    pub domain: String,
    #[source]
    pub source: std::io::Error,
}
