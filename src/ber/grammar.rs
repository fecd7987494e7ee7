//! Table-driven grammar engine (spec component C3).
//!
//! A `Grammar<M>` is an immutable `(state, tag) -> transition` table, built
//! once and shared (via `&'static` or `Arc`) across every concurrent decode.
//! Each decode gets its own `Container<M>`, which pairs a fresh
//! [`TlvDecoder`](crate::ber::tlv::TlvDecoder) with the grammar's logical
//! state and the message value being assembled. The container is the
//! `GrammarDriver` the TLV decoder calls back into from `TlvDone`.

use std::collections::HashMap;

use crate::ber::tlv::{GrammarDriver, TlvDecoder, TlvId, TlvNode, TlvOutcome};
use crate::config::DecoderConfig;
use crate::error::{GrammarError, Result};
use tracing::debug;

/// Whether a transition may be the last one taken before the PDU ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    /// The grammar must see more TLVs after this one.
    Mandatory,
    /// The PDU may legally end right after this TLV.
    Optional,
}

/// An action mutates the message being built from the just-closed TLV. Kept
/// as a plain function pointer (not a closure) so transition tables can be
/// `const`-friendly and cheaply cloned.
pub type Action<M> = fn(&mut M, &[TlvNode], TlvId) -> Result<()>;

pub struct Transition<M> {
    pub from_state: u32,
    pub to_state: u32,
    pub expected_tag: u8,
    pub action: Action<M>,
    pub follow_up: FollowUp,
}

/// An immutable `(state, tag) -> Transition` dispatch table.
///
/// The reference decoder this is modeled on uses a fixed-size 2D array
/// indexed by `(state, tag)`; LDAP's tag space is sparse enough (a handful
/// of context tags per state) that a hash map gives the same O(1) average
/// lookup without forcing every grammar to size an array to the largest tag
/// byte it might see.
pub struct Grammar<M> {
    pub name: &'static str,
    pub start_state: u32,
    pub end_states: Vec<u32>,
    transitions: Vec<Transition<M>>,
    index: HashMap<(u32, u8), usize>,
}

impl<M> Grammar<M> {
    pub fn new(name: &'static str, start_state: u32, end_states: Vec<u32>, transitions: Vec<Transition<M>>) -> Self {
        let mut index = HashMap::with_capacity(transitions.len());
        for (i, t) in transitions.iter().enumerate() {
            index.insert((t.from_state, t.expected_tag), i);
        }
        Grammar {
            name,
            start_state,
            end_states,
            transitions,
            index,
        }
    }

    pub fn lookup(&self, state: u32, tag: u8) -> Option<&Transition<M>> {
        self.index.get(&(state, tag)).map(|&i| &self.transitions[i])
    }

    pub fn is_end_state(&self, state: u32) -> bool {
        self.end_states.contains(&state)
    }
}

/// Couples a [`TlvDecoder`] with a grammar and the message it is building.
pub struct Container<'g, M> {
    pub tlv: TlvDecoder,
    pub message: M,
    grammar: &'g Grammar<M>,
    grammar_state: u32,
}

impl<'g, M: Default> Container<'g, M> {
    pub fn new(grammar: &'g Grammar<M>, config: DecoderConfig) -> Self {
        Container {
            tlv: TlvDecoder::new(config),
            message: M::default(),
            grammar,
            grammar_state: grammar.start_state,
        }
    }

    /// Reset for reuse with a fresh message, keeping the same grammar and
    /// decoder configuration.
    pub fn clean(&mut self) {
        self.tlv.clean();
        self.message = M::default();
        self.grammar_state = self.grammar.start_state;
    }

    /// Feed `buf[self.tlv.pos..]` through the TLV decoder until it either
    /// needs more bytes or the PDU is complete, draining the assembled
    /// message on completion.
    pub fn decode(&mut self, buf: &[u8]) -> Result<Option<M>>
    where
        M: Default,
    {
        let grammar = self.grammar;
        let grammar_state = &mut self.grammar_state;
        let message = &mut self.message;
        let outcome = self.tlv.decode(buf, &mut ContainerDriver {
            grammar,
            grammar_state,
            message,
        })?;
        match outcome {
            TlvOutcome::PduComplete => Ok(Some(std::mem::take(&mut self.message))),
            TlvOutcome::MorePduBytesWanted => Ok(None),
        }
    }
}

struct ContainerDriver<'a, 'g, M> {
    grammar: &'g Grammar<M>,
    grammar_state: &'a mut u32,
    message: &'a mut M,
}

impl<M> GrammarDriver for ContainerDriver<'_, '_, M> {
    fn on_tlv_done(&mut self, arena: &[TlvNode], tlv: TlvId) -> Result<bool> {
        let tag = arena[tlv].tag;
        let from_state = *self.grammar_state;
        let transition = self.grammar.lookup(from_state, tag).ok_or_else(|| {
            debug!(grammar = self.grammar.name, state = from_state, tag = %format!("{tag:#04x}"), "no transition for tag");
            GrammarError::NoTransitionForTag {
                state: from_state,
                tag,
            }
        })?;
        (transition.action)(self.message, arena, tlv)?;
        *self.grammar_state = transition.to_state;
        debug!(
            grammar = self.grammar.name,
            from_state,
            to_state = transition.to_state,
            tag = %format!("{tag:#04x}"),
            "grammar transition taken"
        );
        Ok(matches!(transition.follow_up, FollowUp::Optional) && self.grammar.is_end_state(transition.to_state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, Debug, PartialEq, Eq)]
    struct Counter {
        seen: Vec<u8>,
    }

    fn record(m: &mut Counter, arena: &[TlvNode], tlv: TlvId) -> Result<()> {
        m.seen.push(arena[tlv].tag);
        Ok(())
    }

    // S0 --(0x02)--> S1, optional end.
    fn single_integer_grammar() -> Grammar<Counter> {
        Grammar::new(
            "single-integer",
            0,
            vec![1],
            vec![Transition {
                from_state: 0,
                to_state: 1,
                expected_tag: 0x02,
                action: record,
                follow_up: FollowUp::Optional,
            }],
        )
    }

    #[test]
    fn decodes_one_tlv_and_ends() {
        let grammar = single_integer_grammar();
        let mut container = Container::new(&grammar, DecoderConfig {
            max_length_length: 4,
            ..Default::default()
        });
        let buf = [0x02, 0x01, 0x2A];
        let msg = container.decode(&buf).unwrap().expect("pdu complete");
        assert_eq!(msg.seen, vec![0x02]);
    }

    #[test]
    fn rejects_unexpected_tag() {
        let grammar = single_integer_grammar();
        let mut container = Container::new(&grammar, DecoderConfig {
            max_length_length: 4,
            ..Default::default()
        });
        let buf = [0x04, 0x01, 0x00];
        let err = container.decode(&buf).unwrap_err();
        assert_eq!(
            err,
            GrammarError::NoTransitionForTag { state: 0, tag: 0x04 }.into()
        );
    }

    #[test]
    fn container_is_reusable_after_clean() {
        let grammar = single_integer_grammar();
        let mut container = Container::new(&grammar, DecoderConfig {
            max_length_length: 4,
            ..Default::default()
        });
        let buf = [0x02, 0x01, 0x01];
        container.decode(&buf).unwrap();
        container.clean();
        let msg = container.decode(&buf).unwrap().expect("pdu complete");
        assert_eq!(msg.seen, vec![0x02]);
    }
}
