//! Maps a submitted message to the class policy is keyed by, plus the peer
//! to exclude from recipients (a relayed message is never echoed back to
//! its source).

use crate::message::{MsgClass, OutboundMessage};
use crate::peer::PeerId;

/// Classifier output consumed by the enqueue path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub class: MsgClass,
    /// The prior hop for forwarded traffic; excluded from recipient
    /// selection. Empty for everything else.
    pub exclude: Option<PeerId>,
}

pub fn classify(msg: &OutboundMessage) -> Classified {
    let origin = msg.origin();
    Classified {
        class: MsgClass::of(msg.kind(), origin.label()),
        exclude: origin.forward_source().cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageKind, Origin, OriginLabel};

    #[test]
    fn forwarded_transaction_records_its_source() {
        let src = PeerId::new("relay-7", 3000);
        let msg = OutboundMessage::transaction(Origin::Forward(src.clone()), vec![1u8]);
        let out = classify(&msg);
        assert_eq!(out.class, MsgClass::of(MessageKind::Transaction, OriginLabel::Forward));
        assert_eq!(out.exclude, Some(src));
    }

    #[test]
    fn authored_traffic_excludes_nobody() {
        let msg = OutboundMessage::mpc(Origin::Sender, vec![1u8]);
        let out = classify(&msg);
        assert_eq!(out.class, MsgClass::of(MessageKind::Mpc, OriginLabel::Sender));
        assert_eq!(out.exclude, None);
    }

    #[test]
    fn originless_kinds_classify_as_sender() {
        let msg = OutboundMessage::request_block_headers(vec![0u8]);
        let out = classify(&msg);
        assert_eq!(
            out.class,
            MsgClass::of(MessageKind::RequestBlockHeaders, OriginLabel::Sender)
        );
        assert_eq!(out.exclude, None);
    }
}
