//! C3 grammar table for the outer `LDAPMessage` envelope.
//!
//! `LDAPMessage`'s own shape - a wrapping SEQUENCE around exactly
//! `messageID`, `protocolOp`, and an optional `[0]` controls list - is flat
//! enough to fit the table-driven `(state, tag)` dispatch this crate's
//! grammar engine models directly. A `protocolOp` alternative's own fields
//! are a tree, though, and the engine notifies a constructed TLV's closure
//! before any of its children have been parsed (so the grammar can't yet
//! see what's inside), which rules out driving the whole message through one
//! grammar the way [`envelope_grammar`] drives the wrapper itself. Decoding
//! a `protocolOp` body is therefore a direct walk over the TLV arena once
//! the whole PDU has closed - see `message_codec` - mirroring the same call
//! [`crate::filter::codec`] makes for filter trees.
//!
//! This module's grammar is still exercised end-to-end (via `Container`) for
//! the three operations whose body is itself a single primitive TLV -
//! `UnbindRequest`, `DelRequest`, `AbandonRequest` - since those really are
//! flat all the way down. For every other operation, `message_codec` reuses
//! this grammar's `lookup` table directly (without driving a `Container`
//! through it) just to validate that a `protocolOp` tag is one of the 20
//! legal alternatives.

use crate::ber::grammar::{Action, FollowUp, Grammar, Transition};
use crate::ber::tlv::{TlvId, TlvNode};
use crate::error::Result;
use crate::ldap::ProtocolOpTag;

pub const STATE_START: u32 = 0;
pub const STATE_WRAPPER_OPENED: u32 = 1;
pub const STATE_GOT_MESSAGE_ID: u32 = 2;
pub const STATE_GOT_PROTOCOL_OP: u32 = 3;
pub const STATE_GOT_CONTROLS: u32 = 4;

const MESSAGE_SEQUENCE_TAG: u8 = 0x30;
const MESSAGE_ID_TAG: u8 = 0x02;
pub const CONTROLS_TAG: u8 = 0xA0;

/// `(application-class BER tag, ProtocolOpTag value)` for every alternative
/// of the `protocolOp` CHOICE. The constructed bit (`0x20`) is set for every
/// alternative except the three whose body is a bare primitive value.
pub const PROTOCOL_OP_TAGS: &[(u8, u32)] = &[
    (0x60, 0),  // BindRequest
    (0x61, 1),  // BindResponse
    (0x42, 2),  // UnbindRequest (NULL)
    (0x63, 3),  // SearchRequest
    (0x64, 4),  // SearchResultEntry
    (0x65, 5),  // SearchResultDone
    (0x66, 6),  // ModifyRequest
    (0x67, 7),  // ModifyResponse
    (0x68, 8),  // AddRequest
    (0x69, 9),  // AddResponse
    (0x4A, 10), // DelRequest (LDAPDN)
    (0x6B, 11), // DelResponse
    (0x6C, 12), // ModDNRequest
    (0x6D, 13), // ModDNResponse
    (0x6E, 14), // CompareRequest
    (0x6F, 15), // CompareResponse
    (0x50, 16), // AbandonRequest (MessageID)
    (0x73, 19), // SearchResultReference
    (0x77, 23), // ExtendedRequest
    (0x78, 24), // ExtendedResponse
    (0x79, 25), // IntermediateResponse
];

/// Map a wire tag byte at the `protocolOp` position to its `ProtocolOpTag`.
pub fn protocol_op_tag_for_ber_tag(tag: u8) -> Option<ProtocolOpTag> {
    PROTOCOL_OP_TAGS.iter().find(|&&(t, _)| t == tag).map(|&(_, op)| ProtocolOpTag(op))
}

/// The wire tag byte a given `ProtocolOpTag` is carried under.
pub fn ber_tag_for_protocol_op_tag(op: ProtocolOpTag) -> Option<u8> {
    PROTOCOL_OP_TAGS.iter().find(|&&(_, o)| o == op.0).map(|&(t, _)| t)
}

fn noop(_: &mut (), _: &[TlvNode], _: TlvId) -> Result<()> {
    Ok(())
}

/// Build the envelope grammar: wrapper SEQUENCE, `messageID`, one of the 20
/// `protocolOp` tags, then an optional `[0]` controls list.
pub fn envelope_grammar() -> Grammar<()> {
    let mut transitions = vec![
        Transition {
            from_state: STATE_START,
            to_state: STATE_WRAPPER_OPENED,
            expected_tag: MESSAGE_SEQUENCE_TAG,
            action: noop as Action<()>,
            follow_up: FollowUp::Mandatory,
        },
        Transition {
            from_state: STATE_WRAPPER_OPENED,
            to_state: STATE_GOT_MESSAGE_ID,
            expected_tag: MESSAGE_ID_TAG,
            action: noop as Action<()>,
            follow_up: FollowUp::Mandatory,
        },
    ];
    for &(tag, _) in PROTOCOL_OP_TAGS {
        transitions.push(Transition {
            from_state: STATE_GOT_MESSAGE_ID,
            to_state: STATE_GOT_PROTOCOL_OP,
            expected_tag: tag,
            action: noop as Action<()>,
            follow_up: FollowUp::Optional,
        });
    }
    transitions.push(Transition {
        from_state: STATE_GOT_PROTOCOL_OP,
        to_state: STATE_GOT_CONTROLS,
        expected_tag: CONTROLS_TAG,
        action: noop as Action<()>,
        follow_up: FollowUp::Optional,
    });
    Grammar::new(
        "ldap-message-envelope",
        STATE_START,
        vec![STATE_GOT_PROTOCOL_OP, STATE_GOT_CONTROLS],
        transitions,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ber::grammar::Container;
    use crate::config::DecoderConfig;

    fn decode_fully(container: &mut Container<'_, ()>, buf: &[u8]) {
        loop {
            if container.decode(buf).unwrap().is_some() {
                return;
            }
        }
    }

    #[test]
    fn decodes_unbind_request_envelope() {
        let grammar = envelope_grammar();
        let mut container = Container::new(&grammar, DecoderConfig::default());
        // LDAPMessage SEQUENCE { messageID INTEGER 7, [APPLICATION 2] NULL }
        let buf = [0x30, 0x05, 0x02, 0x01, 0x07, 0x42, 0x00];
        decode_fully(&mut container, &buf);
    }

    #[test]
    fn decodes_abandon_request_envelope() {
        let grammar = envelope_grammar();
        let mut container = Container::new(&grammar, DecoderConfig::default());
        // LDAPMessage SEQUENCE { messageID INTEGER 1, [APPLICATION 16] 5 }
        let buf = [0x30, 0x06, 0x02, 0x01, 0x01, 0x50, 0x01, 0x05];
        decode_fully(&mut container, &buf);
    }

    #[test]
    fn rejects_unknown_protocol_op_tag() {
        let grammar = envelope_grammar();
        assert!(grammar.lookup(STATE_GOT_MESSAGE_ID, 0x99).is_none());
        assert!(grammar.lookup(STATE_GOT_MESSAGE_ID, 0x60).is_some());
    }

    #[test]
    fn every_protocol_op_tag_round_trips_through_the_reverse_lookup() {
        for &(tag, op) in PROTOCOL_OP_TAGS {
            assert_eq!(protocol_op_tag_for_ber_tag(tag), Some(ProtocolOpTag(op)));
            assert_eq!(ber_tag_for_protocol_op_tag(ProtocolOpTag(op)), Some(tag));
        }
    }
}
