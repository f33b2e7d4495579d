//! Serde schema for the TOML topology document.
//!
//! Exactly one top-level section is allowed:
//!
//! - `[nodes.<name>]`: the full node table; used by core and relay
//!   deployments that know their whole neighbourhood.
//! - `[wallet]`: relay endpoints for nodes behind NAT or light wallets.
//! - `[p2p]`: pure DHT discovery.

use crate::TopologyError;
use serde::{Deserialize, Serialize};
use spool_types::NodeClass;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopologyDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<BTreeMap<String, NodeEntry>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet: Option<WalletSection>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p2p: Option<P2pSection>,
}

impl TopologyDocument {
    /// Parse and validate a document.
    pub fn from_toml(input: &str) -> Result<Self, TopologyError> {
        let doc: Self = toml::from_str(input)?;
        doc.validate()?;
        Ok(doc)
    }

    pub fn to_toml(&self) -> String {
        toml::to_string(self).expect("topology document serializes")
    }

    fn validate(&self) -> Result<(), TopologyError> {
        let sections =
            [self.nodes.is_some(), self.wallet.is_some(), self.p2p.is_some()]
                .iter()
                .filter(|present| **present)
                .count();
        if sections != 1 {
            return Err(TopologyError::bad(
                "expected exactly one of 'nodes', 'wallet', 'p2p'",
            ));
        }

        if let Some(nodes) = &self.nodes {
            for (name, entry) in nodes {
                entry.validate(name)?;
                for route in &entry.static_routes {
                    for target in route {
                        if !nodes.contains_key(target) {
                            return Err(TopologyError::bad(format!(
                                "static route of '{name}' references unknown node '{target}'"
                            )));
                        }
                    }
                }
            }
        }

        if let Some(wallet) = &self.wallet {
            wallet.validate()?;
        }

        if let Some(p2p) = &self.p2p {
            p2p.validate()?;
        }

        Ok(())
    }
}

/// One row of the node table.
///
/// `type` stays a string in the schema; [`NodeEntry::class`] converts it,
/// and `validate` rejects unknown names with the offending word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeEntry {
    #[serde(rename = "type")]
    pub node_type: String,

    pub region: String,

    /// Alternative groups of node names: outer list is the sequence of
    /// groups, inner list is (primary, fallback-1, …).
    #[serde(rename = "static-routes", default, skip_serializing_if = "Vec::is_empty")]
    pub static_routes: Vec<Vec<String>>,

    /// Literal network address. Mutually exclusive with `host`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,

    /// DNS name. Mutually exclusive with `addr`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    pub port: u16,

    /// Whether this node participates in the DHT. Defaults per class:
    /// relays yes, everyone else no.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kademlia: Option<bool>,
}

impl NodeEntry {
    /// The parsed node class, if `type` names one.
    pub fn class(&self) -> Option<NodeClass> {
        NodeClass::parse(&self.node_type)
    }

    /// The effective DHT flag, applying the per-class default.
    pub fn kademlia_enabled(&self) -> bool {
        self.kademlia
            .unwrap_or(self.class() == Some(NodeClass::Relay))
    }

    /// The endpoint name this node is reached at.
    pub fn endpoint(&self) -> &str {
        // validate() guarantees exactly one of the two is present.
        self.addr.as_deref().or(self.host.as_deref()).unwrap_or("")
    }

    fn validate(&self, name: &str) -> Result<(), TopologyError> {
        if self.class().is_none() {
            return Err(TopologyError::bad(format!(
                "node '{name}' type '{}' is not one of 'core', 'relay', 'edge'",
                self.node_type
            )));
        }
        match (&self.addr, &self.host) {
            (Some(_), Some(_)) => Err(TopologyError::bad(format!(
                "node '{name}' specifies both a raw address and a DNS host"
            ))),
            (None, None) => Err(TopologyError::bad(format!(
                "node '{name}' specifies neither an address nor a host"
            ))),
            _ => Ok(()),
        }
    }
}

/// Relay endpoints for wallet-style deployments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WalletSection {
    /// Alternative groups of relay endpoints.
    pub relays: Vec<Vec<RelayAddr>>,

    #[serde(default = "default_wallet_valency")]
    pub valency: u16,

    #[serde(default = "default_wallet_fallbacks")]
    pub fallbacks: u16,
}

impl WalletSection {
    fn validate(&self) -> Result<(), TopologyError> {
        let mut literal = 0usize;
        let mut named = 0usize;
        for entry in self.relays.iter().flatten() {
            match (&entry.addr, &entry.host) {
                (Some(_), Some(_)) => {
                    return Err(TopologyError::bad(
                        "wallet relay specifies both a raw address and a DNS host",
                    ))
                }
                (None, None) => {
                    return Err(TopologyError::bad(
                        "wallet relay specifies neither an address nor a host",
                    ))
                }
                (Some(_), None) => literal += 1,
                (None, Some(_)) => named += 1,
            }
        }
        if literal > 0 && named > 0 {
            return Err(TopologyError::bad(
                "wallet relays must be all literal addresses or all DNS hosts",
            ));
        }
        Ok(())
    }

    /// True when relays are DNS names to be re-resolved periodically.
    pub fn uses_dns(&self) -> bool {
        self.relays
            .iter()
            .flatten()
            .any(|entry| entry.host.is_some())
    }
}

fn default_wallet_valency() -> u16 {
    1
}

fn default_wallet_fallbacks() -> u16 {
    1
}

/// One relay endpoint: literal `addr` or DNS `host`, plus a port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayAddr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub port: u16,
}

impl RelayAddr {
    pub fn endpoint(&self) -> &str {
        self.addr.as_deref().or(self.host.as_deref()).unwrap_or("")
    }
}

/// Pure DHT discovery.
///
/// Like node types, the variant stays a string in the schema and is
/// converted through [`P2pVariant::parse`] so an unknown name is rejected
/// with a reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct P2pSection {
    pub variant: String,

    #[serde(default = "default_p2p_valency")]
    pub valency: u16,

    #[serde(default = "default_p2p_fallbacks")]
    pub fallbacks: u16,
}

impl P2pSection {
    /// The parsed variant, if the string names one.
    pub fn parsed_variant(&self) -> Option<P2pVariant> {
        P2pVariant::parse(&self.variant)
    }

    fn validate(&self) -> Result<(), TopologyError> {
        if self.parsed_variant().is_none() {
            return Err(TopologyError::bad(format!(
                "p2p variant '{}' is neither 'traditional' nor 'normal'",
                self.variant
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum P2pVariant {
    /// All nodes treated as core.
    Traditional,
    /// Relay membership; the usual public network shape.
    Normal,
}

impl P2pVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            P2pVariant::Traditional => "traditional",
            P2pVariant::Normal => "normal",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "traditional" => Some(P2pVariant::Traditional),
            "normal" => Some(P2pVariant::Normal),
            _ => None,
        }
    }
}

fn default_p2p_valency() -> u16 {
    3
}

fn default_p2p_fallbacks() -> u16 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATIC_DOC: &str = r#"
        [nodes.core-1]
        type = "core"
        region = "eu-1"
        addr = "10.0.0.1"
        port = 3000
        static-routes = [["core-2"], ["relay-1"]]

        [nodes.core-2]
        type = "core"
        region = "eu-2"
        addr = "10.0.0.2"
        port = 3000

        [nodes.relay-1]
        type = "relay"
        region = "eu-1"
        host = "relay-1.example.net"
        port = 3000
    "#;

    #[test]
    fn parses_a_static_document() {
        let doc = TopologyDocument::from_toml(STATIC_DOC).expect("document parses");
        let nodes = doc.nodes.as_ref().expect("nodes section");
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes["core-1"].static_routes, vec![vec!["core-2"], vec!["relay-1"]]);
        assert_eq!(nodes["relay-1"].class(), Some(NodeClass::Relay));
    }

    #[test]
    fn kademlia_defaults_follow_class() {
        let doc = TopologyDocument::from_toml(STATIC_DOC).unwrap();
        let nodes = doc.nodes.as_ref().unwrap();
        assert!(!nodes["core-1"].kademlia_enabled(), "core defaults to no DHT");
        assert!(nodes["relay-1"].kademlia_enabled(), "relay defaults to DHT");
    }

    #[test]
    fn two_sections_are_rejected() {
        let err = TopologyDocument::from_toml(
            r#"
            [nodes.a]
            type = "core"
            region = "x"
            addr = "10.0.0.1"
            port = 1

            [p2p]
            variant = "normal"
            "#,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "bad topology: expected exactly one of 'nodes', 'wallet', 'p2p'"
        );
    }

    #[test]
    fn empty_document_is_rejected() {
        let err = TopologyDocument::from_toml("").unwrap_err();
        assert!(err.to_string().contains("exactly one of"), "{err}");
    }

    #[test]
    fn addr_and_host_together_are_rejected() {
        let err = TopologyDocument::from_toml(
            r#"
            [nodes.a]
            type = "core"
            region = "x"
            addr = "10.0.0.1"
            host = "a.example.net"
            port = 1
            "#,
        )
        .unwrap_err();
        assert!(
            err.to_string().contains("both a raw address and a DNS host"),
            "{err}"
        );
    }

    #[test]
    fn unknown_route_target_is_rejected() {
        let err = TopologyDocument::from_toml(
            r#"
            [nodes.a]
            type = "core"
            region = "x"
            addr = "10.0.0.1"
            port = 1
            static-routes = [["ghost"]]
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown node 'ghost'"), "{err}");
    }

    #[test]
    fn unknown_p2p_variant_is_rejected_with_reason() {
        let err = TopologyDocument::from_toml("p2p = { variant = \"mesh\" }").unwrap_err();
        match err {
            TopologyError::BadTopology { reason } => {
                assert_eq!(reason, "p2p variant 'mesh' is neither 'traditional' nor 'normal'");
            }
            other => panic!("expected BadTopology, got {other}"),
        }
    }

    #[test]
    fn unknown_node_type_is_rejected_with_reason() {
        let err = TopologyDocument::from_toml(
            r#"
            [nodes.a]
            type = "supernode"
            region = "x"
            addr = "10.0.0.1"
            port = 1
            "#,
        )
        .unwrap_err();
        match err {
            TopologyError::BadTopology { reason } => {
                assert_eq!(
                    reason,
                    "node 'a' type 'supernode' is not one of 'core', 'relay', 'edge'"
                );
            }
            other => panic!("expected BadTopology, got {other}"),
        }
    }

    #[test]
    fn mixed_wallet_relay_forms_are_rejected() {
        let err = TopologyDocument::from_toml(
            r#"
            [wallet]
            relays = [[{ addr = "10.0.0.1", port = 1 }, { host = "r.example.net", port = 1 }]]
            "#,
        )
        .unwrap_err();
        assert!(
            err.to_string().contains("all literal addresses or all DNS hosts"),
            "{err}"
        );
    }

    #[test]
    fn wallet_defaults_apply() {
        let doc = TopologyDocument::from_toml(
            r#"wallet = { relays = [[{ host = "r.example.net", port = 3000 }]] }"#,
        )
        .unwrap();
        let wallet = doc.wallet.unwrap();
        assert_eq!((wallet.valency, wallet.fallbacks), (1, 1));
        assert!(wallet.uses_dns());
    }

    #[test]
    fn round_trips_through_toml() {
        for input in [
            STATIC_DOC,
            r#"wallet = { relays = [[{ addr = "10.0.0.9", port = 3000 }]], valency = 2 }"#,
            r#"p2p = { variant = "traditional", valency = 5 }"#,
        ] {
            let doc = TopologyDocument::from_toml(input).expect("input parses");
            let reparsed =
                TopologyDocument::from_toml(&doc.to_toml()).expect("serialized form parses");
            assert_eq!(doc, reparsed, "round trip changed the document");
        }
    }
}
