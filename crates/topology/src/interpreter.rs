//! Projection of a topology document into the current node's view.

use crate::discovery::{DiscoveryWorker, DnsDomain};
use crate::document::{NodeEntry, P2pVariant, TopologyDocument, WalletSection};
use crate::TopologyError;
use spool_types::{AlternativeGroup, NodeClass, Peer, PeerId, PeerTiers};
use std::collections::BTreeMap;
use tracing::debug;

/// The node's place in the overlay, as derived from the document.
#[derive(Debug, Clone, PartialEq)]
pub enum TopologyView {
    /// Full peer set known up front; core and relay deployments.
    Static { self_class: NodeClass },
    /// Peers found by periodic DNS resolution; the node itself is
    /// unreachable from outside.
    BehindNat {
        valency: usize,
        fallbacks: usize,
        dns_domains: Vec<DnsDomain>,
    },
    /// DHT discovery, relay membership.
    P2p { valency: usize, fallbacks: usize },
    /// DHT discovery, every node treated as core.
    Traditional { valency: usize, fallbacks: usize },
    /// Fixed relay list, subscribe-only.
    LightWallet { relays: Vec<PeerId> },
}

/// Everything the launcher needs: the view, the initial routing tiers, and
/// the discovery workers to spawn.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub view: TopologyView,
    pub self_class: NodeClass,
    /// Class this node registers under when subscribing to its upstreams.
    pub subscriber_class: Option<NodeClass>,
    /// Initial peer seed; empty for discovery topologies.
    pub peers: PeerTiers,
    pub workers: Vec<DiscoveryWorker>,
}

/// Project the document into the view of the node named `self_name`.
///
/// `self_name` is only consulted for `nodes` documents; wallet and p2p
/// topologies describe a single anonymous node.
pub fn interpret(doc: &TopologyDocument, self_name: &str) -> Result<Projection, TopologyError> {
    let projection = match (&doc.nodes, &doc.wallet, &doc.p2p) {
        (Some(nodes), None, None) => project_static(nodes, self_name)?,
        (None, Some(wallet), None) => project_wallet(wallet),
        (None, None, Some(p2p)) => {
            let variant = p2p.parsed_variant().ok_or_else(|| {
                TopologyError::bad(format!(
                    "p2p variant '{}' is neither 'traditional' nor 'normal'",
                    p2p.variant
                ))
            })?;
            project_p2p(variant, p2p.valency.into(), p2p.fallbacks.into())
        }
        // from_toml validates section count; direct construction lands here.
        _ => {
            return Err(TopologyError::bad(
                "expected exactly one of 'nodes', 'wallet', 'p2p'",
            ))
        }
    };

    debug!(
        self_class = %projection.self_class,
        groups = projection.peers.group_count(),
        peers = projection.peers.peer_count(),
        workers = projection.workers.len(),
        "topology projected"
    );
    Ok(projection)
}

fn node_class(entry: &NodeEntry, name: &str) -> Result<NodeClass, TopologyError> {
    entry.class().ok_or_else(|| {
        TopologyError::bad(format!(
            "node '{name}' type '{}' is not one of 'core', 'relay', 'edge'",
            entry.node_type
        ))
    })
}

fn project_static(
    nodes: &BTreeMap<String, NodeEntry>,
    self_name: &str,
) -> Result<Projection, TopologyError> {
    let me = nodes.get(self_name).ok_or_else(|| {
        TopologyError::bad(format!("current node '{self_name}' not present in the node table"))
    })?;
    let self_class = node_class(me, self_name)?;

    let mut peers = PeerTiers::new();
    for route in &me.static_routes {
        let mut members = Vec::with_capacity(route.len());
        for name in route {
            let entry = nodes.get(name).ok_or_else(|| {
                TopologyError::bad(format!(
                    "static route of '{self_name}' references unknown node '{name}'"
                ))
            })?;
            members.push(Peer::new(
                PeerId::new(entry.endpoint(), entry.port),
                node_class(entry, name)?,
            ));
        }
        peers.insert_group(AlternativeGroup::new(members));
    }

    let mut workers = Vec::new();
    if me.kademlia_enabled() {
        let group_sizes: Vec<usize> = me.static_routes.iter().map(|r| r.len()).collect();
        workers.push(DiscoveryWorker::Dht {
            peer_class: match self_class {
                NodeClass::Core => NodeClass::Core,
                _ => NodeClass::Relay,
            },
            valency: if group_sizes.is_empty() { 3 } else { group_sizes.len() },
            fallbacks: group_sizes.iter().max().map_or(1, |len| len.saturating_sub(1)),
        });
    }

    Ok(Projection {
        view: TopologyView::Static { self_class },
        self_class,
        // A relay fronts for edge subscribers; other static nodes take no
        // subscriptions.
        subscriber_class: (self_class == NodeClass::Relay).then_some(NodeClass::Edge),
        peers,
        workers,
    })
}

fn project_wallet(wallet: &WalletSection) -> Projection {
    let valency = wallet.valency.into();
    let fallbacks = wallet.fallbacks.into();

    if wallet.uses_dns() {
        let dns_domains: Vec<DnsDomain> = wallet
            .relays
            .iter()
            .flatten()
            .filter_map(|relay| {
                relay.host.as_ref().map(|host| DnsDomain {
                    domain: host.clone(),
                    port: relay.port,
                })
            })
            .collect();
        return Projection {
            view: TopologyView::BehindNat {
                valency,
                fallbacks,
                dns_domains: dns_domains.clone(),
            },
            self_class: NodeClass::Edge,
            subscriber_class: None,
            peers: PeerTiers::new(),
            workers: vec![DiscoveryWorker::Dns {
                domains: dns_domains,
                valency,
                fallbacks,
            }],
        };
    }

    // All-literal relays: the groups themselves are the peer seed.
    let mut peers = PeerTiers::new();
    let mut relays = Vec::new();
    for group in &wallet.relays {
        let members: Vec<Peer> = group
            .iter()
            .map(|relay| {
                let id = PeerId::new(relay.endpoint(), relay.port);
                relays.push(id.clone());
                Peer::new(id, NodeClass::Relay)
            })
            .collect();
        peers.insert_group(AlternativeGroup::new(members));
    }

    Projection {
        view: TopologyView::LightWallet { relays },
        self_class: NodeClass::Edge,
        subscriber_class: None,
        peers,
        workers: Vec::new(),
    }
}

fn project_p2p(variant: P2pVariant, valency: usize, fallbacks: usize) -> Projection {
    let (view, self_class, peer_class) = match variant {
        P2pVariant::Normal => (
            TopologyView::P2p { valency, fallbacks },
            NodeClass::Edge,
            NodeClass::Relay,
        ),
        P2pVariant::Traditional => (
            TopologyView::Traditional { valency, fallbacks },
            NodeClass::Core,
            NodeClass::Core,
        ),
    };

    Projection {
        view,
        self_class,
        subscriber_class: Some(peer_class),
        peers: PeerTiers::new(),
        workers: vec![DiscoveryWorker::Dht {
            peer_class,
            valency,
            fallbacks,
        }],
    }
}
