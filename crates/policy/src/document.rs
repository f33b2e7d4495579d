//! Serde schema for the TOML policy document.
//!
//! Three sections: `enqueue` keyed by message kind (with `send`/`forward`
//! sub-tables for the origin-carrying kinds), `dequeue` keyed by node
//! class, `failure` keyed by message kind then node class in whole
//! seconds. A document may be partial; absent entries keep the built-in
//! defaults.

use crate::PolicyError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Closed vocabularies (message kinds, node classes, precedence names)
/// stay strings in the schema, whether they appear as map keys or as
/// values; the model converts them to the closed enums and rejects
/// unknown names with a reason.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyDocument {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub enqueue: BTreeMap<String, EnqueueEntry>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dequeue: BTreeMap<String, DequeueSpec>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failure: BTreeMap<String, BTreeMap<String, u64>>,
}

impl PolicyDocument {
    pub fn from_toml(input: &str) -> Result<Self, PolicyError> {
        Ok(toml::from_str(input)?)
    }

    pub fn to_toml(&self) -> String {
        toml::to_string(self).expect("policy document serializes")
    }
}

/// Value under `enqueue.<kind>`.
///
/// Transaction and mpc distinguish authored (`send`) from relayed
/// (`forward`) traffic; every other kind takes its rule(s) directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnqueueEntry {
    Directed { send: RuleSet, forward: RuleSet },
    Plain(RuleSet),
}

/// One rule or an ordered list of passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleSet {
    One(RuleSpec),
    Many(Vec<RuleSpec>),
}

impl RuleSet {
    pub fn specs(&self) -> &[RuleSpec] {
        match self {
            RuleSet::One(spec) => std::slice::from_ref(spec),
            RuleSet::Many(specs) => specs,
        }
    }
}

/// Exactly one of `all` / `one`; enforced at model construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all: Option<AllSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one: Option<OneSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllSpec {
    #[serde(rename = "nodeType")]
    pub node_type: String,
    #[serde(rename = "maxAhead")]
    pub max_ahead: usize,
    pub precedence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OneSpec {
    #[serde(rename = "nodeTypes")]
    pub node_types: Vec<String>,
    #[serde(rename = "maxAhead")]
    pub max_ahead: usize,
    pub precedence: String,
}

/// Value under `dequeue.<class>`. An absent `rateLimit` means unlimited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DequeueSpec {
    #[serde(rename = "maxInFlight")]
    pub max_in_flight: usize,
    #[serde(rename = "rateLimit", default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULLISH: &str = r#"
        [enqueue.announceBlockHeader]
        all = { nodeType = "core", maxAhead = 0, precedence = "highest" }

        [enqueue.transaction.send]
        all = { nodeType = "relay", maxAhead = 20, precedence = "medium" }

        [enqueue.transaction.forward]
        one = { nodeTypes = ["relay"], maxAhead = 20, precedence = "low" }

        [dequeue.core]
        maxInFlight = 3

        [dequeue.edge]
        maxInFlight = 1
        rateLimit = 1

        [failure.transaction]
        core = 30
        relay = 15
    "#;

    #[test]
    fn parses_plain_and_directed_enqueue_entries() {
        let doc = PolicyDocument::from_toml(FULLISH).expect("document parses");

        match doc.enqueue.get("announceBlockHeader") {
            Some(EnqueueEntry::Plain(set)) => {
                let spec = &set.specs()[0];
                let all = spec.all.as_ref().expect("all rule");
                assert_eq!(all.node_type, "core");
                assert_eq!(all.precedence, "highest");
            }
            other => panic!("expected plain entry, got {other:?}"),
        }

        match doc.enqueue.get("transaction") {
            Some(EnqueueEntry::Directed { send, forward }) => {
                assert!(send.specs()[0].all.is_some());
                let one = forward.specs()[0].one.as_ref().expect("one rule");
                assert_eq!(one.node_types, vec!["relay"]);
            }
            other => panic!("expected directed entry, got {other:?}"),
        }
    }

    #[test]
    fn absent_rate_limit_stays_absent() {
        let doc = PolicyDocument::from_toml(FULLISH).unwrap();
        assert_eq!(doc.dequeue["core"].rate_limit, None);
        assert_eq!(doc.dequeue["edge"].rate_limit, Some(1));
    }

    #[test]
    fn rule_list_parses_as_passes() {
        let doc = PolicyDocument::from_toml(
            r#"
            enqueue.requestBlocks = [
                { one = { nodeTypes = ["core"], maxAhead = 1, precedence = "high" } },
                { one = { nodeTypes = ["relay"], maxAhead = 1, precedence = "medium" } },
            ]
            "#,
        )
        .expect("list entry parses");
        match doc.enqueue.get("requestBlocks") {
            Some(EnqueueEntry::Plain(set)) => assert_eq!(set.specs().len(), 2),
            other => panic!("expected plain list entry, got {other:?}"),
        }
    }

    #[test]
    fn round_trips_through_toml() {
        let doc = PolicyDocument::from_toml(FULLISH).unwrap();
        let reparsed = PolicyDocument::from_toml(&doc.to_toml()).expect("serialized form parses");
        assert_eq!(doc, reparsed);
    }

    #[test]
    fn unknown_section_is_rejected() {
        let err =
            PolicyDocument::from_toml("retry = { maxAttempts = 3 }").unwrap_err();
        assert!(matches!(err, PolicyError::Parse(_)));
    }
}
