//! The three orthogonal policy rule types.

use spool_types::{NodeClass, Precedence};

/// How one enqueue pass selects recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueRule {
    /// Enqueue to every peer of `class` across all alternative groups.
    ///
    /// Per-link admission: the submission is dropped for a link already
    /// holding strictly more than `max_ahead` entries of strictly higher
    /// precedence.
    All {
        class: NodeClass,
        max_ahead: usize,
        precedence: Precedence,
    },
    /// For each alternative group whose primary's class is in `classes`,
    /// enqueue to one member: the primary if it passes the suspend and
    /// admission checks, else the fallbacks in order.
    One {
        classes: Vec<NodeClass>,
        max_ahead: usize,
        precedence: Precedence,
    },
}

impl EnqueueRule {
    pub fn precedence(&self) -> Precedence {
        match self {
            EnqueueRule::All { precedence, .. } | EnqueueRule::One { precedence, .. } => {
                *precedence
            }
        }
    }

    pub fn max_ahead(&self) -> usize {
        match self {
            EnqueueRule::All { max_ahead, .. } | EnqueueRule::One { max_ahead, .. } => *max_ahead,
        }
    }
}

/// Per-second ceiling on dispatches from one link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimit {
    Unlimited,
    /// At most this many messages per second; always positive.
    MaxPerSec(u32),
}

/// Drain policy for links to peers of one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DequeueRule {
    /// Ceiling on concurrently in-flight sends per link.
    pub max_in_flight: usize,
    pub rate_limit: RateLimit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_accessors_reach_through_both_shapes() {
        let all = EnqueueRule::All {
            class: NodeClass::Core,
            max_ahead: 2,
            precedence: Precedence::High,
        };
        let one = EnqueueRule::One {
            classes: vec![NodeClass::Relay],
            max_ahead: 0,
            precedence: Precedence::Low,
        };
        assert_eq!(all.precedence(), Precedence::High);
        assert_eq!(all.max_ahead(), 2);
        assert_eq!(one.precedence(), Precedence::Low);
        assert_eq!(one.max_ahead(), 0);
    }
}
