//! Message kinds, origins, precedence, and the outbound message itself.

use crate::peer::PeerId;
use std::fmt;
use std::sync::Arc;

/// Dispatch priority on a single link. Five totally ordered levels; higher
/// precedence is popped first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Precedence {
    Lowest,
    Low,
    Medium,
    High,
    Highest,
}

impl Precedence {
    /// All levels, lowest first.
    pub const ALL: [Precedence; 5] = [
        Precedence::Lowest,
        Precedence::Low,
        Precedence::Medium,
        Precedence::High,
        Precedence::Highest,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Precedence::Lowest => "lowest",
            Precedence::Low => "low",
            Precedence::Medium => "medium",
            Precedence::High => "high",
            Precedence::Highest => "highest",
        }
    }

    /// Parse the document spelling of a precedence name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.as_str() == name)
    }
}

impl fmt::Display for Precedence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of message kinds the queue schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MessageKind {
    AnnounceBlockHeader,
    RequestBlockHeaders,
    RequestBlocks,
    Transaction,
    Mpc,
}

impl MessageKind {
    pub const ALL: [MessageKind; 5] = [
        MessageKind::AnnounceBlockHeader,
        MessageKind::RequestBlockHeaders,
        MessageKind::RequestBlocks,
        MessageKind::Transaction,
        MessageKind::Mpc,
    ];

    /// Stable index for fixed-size tables.
    pub fn index(self) -> usize {
        match self {
            MessageKind::AnnounceBlockHeader => 0,
            MessageKind::RequestBlockHeaders => 1,
            MessageKind::RequestBlocks => 2,
            MessageKind::Transaction => 3,
            MessageKind::Mpc => 4,
        }
    }

    /// Whether this kind distinguishes authored from relayed traffic.
    pub fn carries_origin(self) -> bool {
        matches!(self, MessageKind::Transaction | MessageKind::Mpc)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::AnnounceBlockHeader => "announceBlockHeader",
            MessageKind::RequestBlockHeaders => "requestBlockHeaders",
            MessageKind::RequestBlocks => "requestBlocks",
            MessageKind::Transaction => "transaction",
            MessageKind::Mpc => "mpc",
        }
    }

    /// Parse the document spelling of a kind name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a relay-eligible message came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// This node authored the message.
    Sender,
    /// Relayed from a prior hop; the source must not receive it back.
    Forward(PeerId),
}

impl Origin {
    pub fn label(&self) -> OriginLabel {
        match self {
            Origin::Sender => OriginLabel::Sender,
            Origin::Forward(_) => OriginLabel::Forward,
        }
    }

    pub fn forward_source(&self) -> Option<&PeerId> {
        match self {
            Origin::Sender => None,
            Origin::Forward(src) => Some(src),
        }
    }
}

/// [`Origin`] with the peer dropped: the shape policy lookup keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OriginLabel {
    Sender,
    Forward,
}

/// The (kind, origin) pair policy is keyed by.
///
/// Only `Transaction` and `Mpc` vary by origin; for every other kind the
/// origin is fixed to `Sender`, giving seven distinct classes in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MsgClass {
    pub kind: MessageKind,
    pub origin: OriginLabel,
}

impl MsgClass {
    /// Number of distinct classes (table size).
    pub const COUNT: usize = 7;

    /// Build a class, normalizing the origin for kinds that carry none.
    pub fn of(kind: MessageKind, origin: OriginLabel) -> Self {
        let origin = if kind.carries_origin() {
            origin
        } else {
            OriginLabel::Sender
        };
        Self { kind, origin }
    }

    /// Stable slot in `[_; MsgClass::COUNT]` tables.
    pub fn slot(self) -> usize {
        match (self.kind, self.origin) {
            (MessageKind::AnnounceBlockHeader, _) => 0,
            (MessageKind::RequestBlockHeaders, _) => 1,
            (MessageKind::RequestBlocks, _) => 2,
            (MessageKind::Transaction, OriginLabel::Sender) => 3,
            (MessageKind::Transaction, OriginLabel::Forward) => 4,
            (MessageKind::Mpc, OriginLabel::Sender) => 5,
            (MessageKind::Mpc, OriginLabel::Forward) => 6,
        }
    }

    /// All classes, in slot order.
    pub fn all() -> [MsgClass; Self::COUNT] {
        [
            MsgClass::of(MessageKind::AnnounceBlockHeader, OriginLabel::Sender),
            MsgClass::of(MessageKind::RequestBlockHeaders, OriginLabel::Sender),
            MsgClass::of(MessageKind::RequestBlocks, OriginLabel::Sender),
            MsgClass::of(MessageKind::Transaction, OriginLabel::Sender),
            MsgClass::of(MessageKind::Transaction, OriginLabel::Forward),
            MsgClass::of(MessageKind::Mpc, OriginLabel::Sender),
            MsgClass::of(MessageKind::Mpc, OriginLabel::Forward),
        ]
    }
}

impl fmt::Display for MsgClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.origin {
            OriginLabel::Sender => write!(f, "{}", self.kind),
            OriginLabel::Forward => write!(f, "{}/forward", self.kind),
        }
    }
}

/// A message handed to the outbound queue.
///
/// Payloads are pre-encoded bytes shared across the fan-out; the queue never
/// looks inside them.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    AnnounceBlockHeader { payload: Arc<[u8]> },
    RequestBlockHeaders { payload: Arc<[u8]> },
    RequestBlocks { payload: Arc<[u8]> },
    Transaction { origin: Origin, payload: Arc<[u8]> },
    Mpc { origin: Origin, payload: Arc<[u8]> },
}

impl OutboundMessage {
    pub fn announce_block_header(payload: impl Into<Arc<[u8]>>) -> Self {
        OutboundMessage::AnnounceBlockHeader {
            payload: payload.into(),
        }
    }

    pub fn request_block_headers(payload: impl Into<Arc<[u8]>>) -> Self {
        OutboundMessage::RequestBlockHeaders {
            payload: payload.into(),
        }
    }

    pub fn request_blocks(payload: impl Into<Arc<[u8]>>) -> Self {
        OutboundMessage::RequestBlocks {
            payload: payload.into(),
        }
    }

    pub fn transaction(origin: Origin, payload: impl Into<Arc<[u8]>>) -> Self {
        OutboundMessage::Transaction {
            origin,
            payload: payload.into(),
        }
    }

    pub fn mpc(origin: Origin, payload: impl Into<Arc<[u8]>>) -> Self {
        OutboundMessage::Mpc {
            origin,
            payload: payload.into(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            OutboundMessage::AnnounceBlockHeader { .. } => MessageKind::AnnounceBlockHeader,
            OutboundMessage::RequestBlockHeaders { .. } => MessageKind::RequestBlockHeaders,
            OutboundMessage::RequestBlocks { .. } => MessageKind::RequestBlocks,
            OutboundMessage::Transaction { .. } => MessageKind::Transaction,
            OutboundMessage::Mpc { .. } => MessageKind::Mpc,
        }
    }

    /// The origin tag, `Sender` for kinds that carry none.
    pub fn origin(&self) -> &Origin {
        match self {
            OutboundMessage::Transaction { origin, .. } | OutboundMessage::Mpc { origin, .. } => {
                origin
            }
            _ => &Origin::Sender,
        }
    }

    pub fn payload(&self) -> &Arc<[u8]> {
        match self {
            OutboundMessage::AnnounceBlockHeader { payload }
            | OutboundMessage::RequestBlockHeaders { payload }
            | OutboundMessage::RequestBlocks { payload }
            | OutboundMessage::Transaction { payload, .. }
            | OutboundMessage::Mpc { payload, .. } => payload,
        }
    }

    /// Human-readable name for logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            OutboundMessage::AnnounceBlockHeader { .. } => "AnnounceBlockHeader",
            OutboundMessage::RequestBlockHeaders { .. } => "RequestBlockHeaders",
            OutboundMessage::RequestBlocks { .. } => "RequestBlocks",
            OutboundMessage::Transaction { .. } => "Transaction",
            OutboundMessage::Mpc { .. } => "Mpc",
        }
    }
}
