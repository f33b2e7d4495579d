//! Shared value types for the topology model and outbound queue.
//!
//! - [`peer`]: peer identity and node classification
//! - [`tiers`]: routing tiers built from alternative groups
//! - [`message`]: message kinds, origins, precedence, outbound payloads
//! - [`classify`]: message → policy-class projection
//!
//! Everything here is plain data with value semantics. Mutable routing
//! state and scheduling live in `spool-outbound`.

pub mod classify;
pub mod message;
pub mod peer;
pub mod tiers;

pub use classify::{classify, Classified};
pub use message::{MessageKind, MsgClass, Origin, OriginLabel, OutboundMessage, Precedence};
pub use peer::{NodeClass, Peer, PeerId};
pub use tiers::{AlternativeGroup, PeerTiers};
