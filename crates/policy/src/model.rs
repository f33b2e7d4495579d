//! Immutable policy tables with built-in per-class defaults.

use crate::document::{EnqueueEntry, PolicyDocument, RuleSpec};
use crate::rules::{DequeueRule, EnqueueRule, RateLimit};
use crate::PolicyError;
use spool_types::{MessageKind, MsgClass, NodeClass, OriginLabel, Precedence};
use std::time::Duration;

/// Policy lookups for the outbound queue. Constructed once at startup,
/// read-only afterwards.
#[derive(Debug, Clone)]
pub struct PolicyModel {
    /// Enqueue passes, indexed by [`MsgClass::slot`].
    enqueue: [Vec<EnqueueRule>; MsgClass::COUNT],
    /// Drain rules, indexed by the *target* peer's class.
    dequeue: [DequeueRule; 3],
    /// Post-failure cooldowns, indexed by (peer class, message kind).
    failure: [[Duration; 5]; 3],
}

impl PolicyModel {
    /// The built-in table for a node of the given class.
    ///
    /// Core nodes push block traffic to other core nodes at the highest
    /// precedence and hand transactions to their relays; relays fan both
    /// ways; edge nodes talk to relays only, at medium precedence.
    pub fn defaults(self_class: NodeClass) -> Self {
        use MessageKind::*;
        use NodeClass::*;
        use Precedence::*;

        let all = |class, max_ahead, precedence| EnqueueRule::All {
            class,
            max_ahead,
            precedence,
        };
        let one = |classes: &[NodeClass], max_ahead, precedence| EnqueueRule::One {
            classes: classes.to_vec(),
            max_ahead,
            precedence,
        };

        let mut model = Self {
            enqueue: Default::default(),
            dequeue: [
                // Core links drain widest; edge links are kept on a tight leash.
                DequeueRule {
                    max_in_flight: 3,
                    rate_limit: RateLimit::Unlimited,
                },
                DequeueRule {
                    max_in_flight: 2,
                    rate_limit: RateLimit::Unlimited,
                },
                DequeueRule {
                    max_in_flight: 1,
                    rate_limit: RateLimit::MaxPerSec(1),
                },
            ],
            failure: [[Duration::ZERO; 5]; 3],
        };

        for kind in MessageKind::ALL {
            let block_related = !kind.carries_origin();
            model.failure[Core.index()][kind.index()] =
                Duration::from_secs(if block_related { 20 } else { 30 });
            model.failure[Relay.index()][kind.index()] =
                Duration::from_secs(if block_related { 10 } else { 15 });
            model.failure[Edge.index()][kind.index()] =
                Duration::from_secs(if block_related { 10 } else { 15 });
        }

        let mut set = |kind, origin, rules: Vec<EnqueueRule>| {
            model.enqueue[MsgClass::of(kind, origin).slot()] = rules;
        };

        match self_class {
            Core => {
                set(AnnounceBlockHeader, OriginLabel::Sender, vec![
                    all(Core, 0, Highest),
                    all(Relay, 0, High),
                ]);
                set(RequestBlockHeaders, OriginLabel::Sender, vec![one(&[Core, Relay], 1, High)]);
                set(RequestBlocks, OriginLabel::Sender, vec![one(&[Core, Relay], 1, High)]);
                set(Transaction, OriginLabel::Sender, vec![all(Relay, 20, Medium)]);
                set(Transaction, OriginLabel::Forward, vec![all(Relay, 20, Low)]);
                set(Mpc, OriginLabel::Sender, vec![all(Relay, 2, Medium)]);
                set(Mpc, OriginLabel::Forward, vec![all(Relay, 2, Low)]);
            }
            Relay => {
                set(AnnounceBlockHeader, OriginLabel::Sender, vec![
                    all(Core, 0, Highest),
                    all(Relay, 0, High),
                ]);
                set(RequestBlockHeaders, OriginLabel::Sender, vec![one(&[Core, Relay], 1, High)]);
                set(RequestBlocks, OriginLabel::Sender, vec![one(&[Core, Relay], 1, High)]);
                set(Transaction, OriginLabel::Sender, vec![
                    all(Core, 20, Medium),
                    all(Relay, 20, Low),
                ]);
                set(Transaction, OriginLabel::Forward, vec![
                    all(Core, 20, Low),
                    all(Relay, 20, Lowest),
                ]);
                set(Mpc, OriginLabel::Sender, vec![all(Core, 2, Medium), all(Relay, 2, Low)]);
                set(Mpc, OriginLabel::Forward, vec![all(Core, 2, Low), all(Relay, 2, Lowest)]);
            }
            Edge => {
                set(AnnounceBlockHeader, OriginLabel::Sender, vec![one(&[Relay], 0, Medium)]);
                set(RequestBlockHeaders, OriginLabel::Sender, vec![one(&[Relay], 1, Medium)]);
                set(RequestBlocks, OriginLabel::Sender, vec![one(&[Relay], 1, Medium)]);
                set(Transaction, OriginLabel::Sender, vec![one(&[Relay], 20, Medium)]);
                set(Transaction, OriginLabel::Forward, vec![one(&[Relay], 20, Medium)]);
                set(Mpc, OriginLabel::Sender, vec![one(&[Relay], 2, Medium)]);
                set(Mpc, OriginLabel::Forward, vec![one(&[Relay], 2, Medium)]);
            }
        }

        model
    }

    /// Overlay a (possibly partial) document on the defaults for
    /// `self_class`. Entries absent from the document keep their default.
    pub fn from_document(
        doc: &PolicyDocument,
        self_class: NodeClass,
    ) -> Result<Self, PolicyError> {
        let mut model = Self::defaults(self_class);

        for (kind_name, entry) in &doc.enqueue {
            let kind = parse_kind(kind_name)?;
            match entry {
                EnqueueEntry::Directed { send, forward } => {
                    if !kind.carries_origin() {
                        return Err(PolicyError::bad(format!(
                            "kind '{kind}' does not distinguish send and forward"
                        )));
                    }
                    model.enqueue[MsgClass::of(kind, OriginLabel::Sender).slot()] =
                        convert_rules(kind, send.specs())?;
                    model.enqueue[MsgClass::of(kind, OriginLabel::Forward).slot()] =
                        convert_rules(kind, forward.specs())?;
                }
                EnqueueEntry::Plain(set) => {
                    if kind.carries_origin() {
                        return Err(PolicyError::bad(format!(
                            "kind '{kind}' requires separate send and forward rules"
                        )));
                    }
                    model.enqueue[MsgClass::of(kind, OriginLabel::Sender).slot()] =
                        convert_rules(kind, set.specs())?;
                }
            }
        }

        for (class_name, spec) in &doc.dequeue {
            let class = parse_class(class_name)?;
            let rate_limit = match spec.rate_limit {
                None => RateLimit::Unlimited,
                Some(0) => {
                    return Err(PolicyError::bad(format!(
                        "rate limit for '{class}' links must be positive"
                    )))
                }
                Some(n) => RateLimit::MaxPerSec(n),
            };
            model.dequeue[class.index()] = DequeueRule {
                max_in_flight: spec.max_in_flight,
                rate_limit,
            };
        }

        for (kind_name, by_class) in &doc.failure {
            let kind = parse_kind(kind_name)?;
            for (class_name, secs) in by_class {
                let class = parse_class(class_name)?;
                model.failure[class.index()][kind.index()] = Duration::from_secs(*secs);
            }
        }

        Ok(model)
    }

    /// Parse a TOML document and overlay it on the defaults.
    pub fn from_toml(input: &str, self_class: NodeClass) -> Result<Self, PolicyError> {
        Self::from_document(&PolicyDocument::from_toml(input)?, self_class)
    }

    /// Replace the enqueue passes for one message class. Builder-style;
    /// the model stays immutable once handed to the queue.
    pub fn with_enqueue_rules(mut self, class: MsgClass, rules: Vec<EnqueueRule>) -> Self {
        self.enqueue[class.slot()] = rules;
        self
    }

    /// Replace the drain rule for links to peers of `class`.
    pub fn with_dequeue_rule(mut self, class: NodeClass, rule: DequeueRule) -> Self {
        self.dequeue[class.index()] = rule;
        self
    }

    /// Replace one post-failure cooldown. Unlike the document format this
    /// takes an arbitrary [`Duration`], so embedders are not limited to
    /// whole seconds.
    pub fn with_failure_delay(
        mut self,
        class: NodeClass,
        kind: MessageKind,
        delay: Duration,
    ) -> Self {
        self.failure[class.index()][kind.index()] = delay;
        self
    }

    /// The ordered enqueue passes for one message class.
    pub fn enqueue_rules(&self, class: MsgClass) -> &[EnqueueRule] {
        &self.enqueue[class.slot()]
    }

    /// Drain rule for links to peers of `class`.
    pub fn dequeue_rule(&self, class: NodeClass) -> DequeueRule {
        self.dequeue[class.index()]
    }

    /// How long to stop sending `kind` to a peer of `class` after a send
    /// failure.
    pub fn failure_delay(&self, class: NodeClass, kind: MessageKind) -> Duration {
        self.failure[class.index()][kind.index()]
    }
}

fn parse_kind(name: &str) -> Result<MessageKind, PolicyError> {
    MessageKind::parse(name)
        .ok_or_else(|| PolicyError::bad(format!("unknown message kind '{name}'")))
}

fn parse_class(name: &str) -> Result<NodeClass, PolicyError> {
    NodeClass::parse(name).ok_or_else(|| PolicyError::bad(format!("unknown node class '{name}'")))
}

fn parse_precedence(name: &str) -> Result<Precedence, PolicyError> {
    Precedence::parse(name).ok_or_else(|| {
        PolicyError::bad(format!(
            "precedence '{name}' is not one of 'lowest', 'low', 'medium', 'high', 'highest'"
        ))
    })
}

fn convert_rules(kind: MessageKind, specs: &[RuleSpec]) -> Result<Vec<EnqueueRule>, PolicyError> {
    specs.iter().map(|s| convert_rule(kind, s)).collect()
}

fn convert_rule(kind: MessageKind, spec: &RuleSpec) -> Result<EnqueueRule, PolicyError> {
    match (&spec.all, &spec.one) {
        (Some(all), None) => Ok(EnqueueRule::All {
            class: parse_class(&all.node_type)?,
            max_ahead: all.max_ahead,
            precedence: parse_precedence(&all.precedence)?,
        }),
        (None, Some(one)) => {
            if one.node_types.is_empty() {
                return Err(PolicyError::bad(format!(
                    "'one' rule for '{kind}' names no node types"
                )));
            }
            let classes = one
                .node_types
                .iter()
                .map(|name| parse_class(name))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(EnqueueRule::One {
                classes,
                max_ahead: one.max_ahead,
                precedence: parse_precedence(&one.precedence)?,
            })
        }
        _ => Err(PolicyError::bad(format!(
            "enqueue rule for '{kind}' must have exactly one of 'all' and 'one'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_message_class() {
        for self_class in NodeClass::ALL {
            let model = PolicyModel::defaults(self_class);
            for class in MsgClass::all() {
                assert!(
                    !model.enqueue_rules(class).is_empty(),
                    "{self_class} node has no rule for {class}"
                );
            }
        }
    }

    #[test]
    fn core_defaults_match_the_published_shape() {
        let model = PolicyModel::defaults(NodeClass::Core);

        let header = model
            .enqueue_rules(MsgClass::of(MessageKind::AnnounceBlockHeader, OriginLabel::Sender));
        assert!(matches!(
            header[0],
            EnqueueRule::All {
                class: NodeClass::Core,
                precedence: Precedence::Highest,
                ..
            }
        ));

        let tx =
            model.enqueue_rules(MsgClass::of(MessageKind::Transaction, OriginLabel::Sender));
        assert!(matches!(
            tx[0],
            EnqueueRule::All {
                class: NodeClass::Relay,
                precedence: Precedence::Medium,
                ..
            }
        ));
    }

    #[test]
    fn edge_defaults_target_relays_at_medium_only() {
        let model = PolicyModel::defaults(NodeClass::Edge);
        for class in MsgClass::all() {
            for rule in model.enqueue_rules(class) {
                match rule {
                    EnqueueRule::One { classes, precedence, .. } => {
                        assert_eq!(classes, &vec![NodeClass::Relay]);
                        assert_eq!(*precedence, Precedence::Medium);
                    }
                    other => panic!("edge default is not relay-directed: {other:?}"),
                }
            }
        }
    }

    #[test]
    fn document_values_override_defaults_and_agree() {
        let model = PolicyModel::from_toml(
            r#"
            [enqueue.transaction.send]
            all = { nodeType = "core", maxAhead = 0, precedence = "medium" }
            [enqueue.transaction.forward]
            all = { nodeType = "relay", maxAhead = 10, precedence = "low" }

            [dequeue.relay]
            maxInFlight = 5
            rateLimit = 60

            [failure.requestBlocks]
            relay = 7
            "#,
            NodeClass::Core,
        )
        .expect("valid document");

        let send =
            model.enqueue_rules(MsgClass::of(MessageKind::Transaction, OriginLabel::Sender));
        assert_eq!(
            send,
            &[EnqueueRule::All {
                class: NodeClass::Core,
                max_ahead: 0,
                precedence: Precedence::Medium,
            }]
        );

        assert_eq!(
            model.dequeue_rule(NodeClass::Relay),
            DequeueRule {
                max_in_flight: 5,
                rate_limit: RateLimit::MaxPerSec(60),
            }
        );
        assert_eq!(
            model.failure_delay(NodeClass::Relay, MessageKind::RequestBlocks),
            Duration::from_secs(7)
        );

        // Entries absent from the document keep their defaults.
        assert_eq!(
            model.dequeue_rule(NodeClass::Core),
            PolicyModel::defaults(NodeClass::Core).dequeue_rule(NodeClass::Core)
        );
    }

    #[test]
    fn rule_with_both_shapes_is_rejected() {
        let err = PolicyModel::from_toml(
            r#"
            [enqueue.requestBlocks]
            all = { nodeType = "core", maxAhead = 0, precedence = "high" }
            one = { nodeTypes = ["relay"], maxAhead = 0, precedence = "high" }
            "#,
            NodeClass::Core,
        )
        .unwrap_err();
        assert!(err.to_string().contains("exactly one of 'all' and 'one'"), "{err}");
    }

    #[test]
    fn unknown_kind_and_class_names_are_rejected() {
        let err = PolicyModel::from_toml(
            r#"enqueue.gossip = { all = { nodeType = "core", maxAhead = 0, precedence = "low" } }"#,
            NodeClass::Core,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown message kind 'gossip'"), "{err}");

        let err = PolicyModel::from_toml(
            "dequeue.supernode = { maxInFlight = 1 }",
            NodeClass::Core,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown node class 'supernode'"), "{err}");

        // Class names are checked in rule values too, not just map keys.
        let err = PolicyModel::from_toml(
            r#"enqueue.requestBlocks = { all = { nodeType = "supernode", maxAhead = 0, precedence = "low" } }"#,
            NodeClass::Core,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown node class 'supernode'"), "{err}");
    }

    #[test]
    fn unknown_precedence_name_is_rejected_with_reason() {
        let err = PolicyModel::from_toml(
            r#"enqueue.requestBlocks = { all = { nodeType = "core", maxAhead = 0, precedence = "urgent" } }"#,
            NodeClass::Core,
        )
        .unwrap_err();
        match err {
            PolicyError::BadPolicy { reason } => {
                assert_eq!(
                    reason,
                    "precedence 'urgent' is not one of 'lowest', 'low', 'medium', 'high', 'highest'"
                );
            }
            other => panic!("expected BadPolicy, got {other}"),
        }
    }

    #[test]
    fn zero_rate_limit_is_rejected() {
        let err = PolicyModel::from_toml(
            "dequeue.core = { maxInFlight = 1, rateLimit = 0 }",
            NodeClass::Core,
        )
        .unwrap_err();
        assert!(err.to_string().contains("must be positive"), "{err}");
    }

    #[test]
    fn directed_entry_on_originless_kind_is_rejected() {
        let err = PolicyModel::from_toml(
            r#"
            [enqueue.requestBlocks.send]
            all = { nodeType = "core", maxAhead = 0, precedence = "high" }
            [enqueue.requestBlocks.forward]
            all = { nodeType = "core", maxAhead = 0, precedence = "high" }
            "#,
            NodeClass::Core,
        )
        .unwrap_err();
        assert!(
            err.to_string().contains("does not distinguish send and forward"),
            "{err}"
        );
    }

    #[test]
    fn plain_entry_on_origin_kind_is_rejected() {
        let err = PolicyModel::from_toml(
            r#"enqueue.mpc = { all = { nodeType = "relay", maxAhead = 2, precedence = "medium" } }"#,
            NodeClass::Core,
        )
        .unwrap_err();
        assert!(
            err.to_string().contains("requires separate send and forward"),
            "{err}"
        );
    }
}
