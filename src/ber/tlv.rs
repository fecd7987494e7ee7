//! Streaming TLV decoder (spec component C2).
//!
//! Drives a tree of parsed TLVs out of a byte buffer one chunk at a time.
//! The decoder holds a monotonically advancing read position into a
//! caller-owned buffer rather than consuming a shrinking slice, which is
//! what makes `rewind()` a cheap position reset instead of needing to
//! re-inject bytes.

use crate::config::DecoderConfig;
use crate::error::{BerError, Error, Result};
use tracing::trace;

pub type TlvId = usize;

/// One decoded (or partially decoded) Tag-Length-Value triplet.
#[derive(Debug, Clone)]
pub struct TlvNode {
    pub id: TlvId,
    pub tag: u8,
    pub length: u64,
    pub length_nb_bytes: usize,
    pub value: Option<Vec<u8>>,
    pub current_length: u64,
    pub parent: Option<TlvId>,
    /// For a constructed TLV: bytes of content still expected from
    /// children. For a primitive TLV under `gathering`, bytes of value
    /// still to be copied.
    pub expected_length: u64,
    pub constructed: bool,
}

impl TlvNode {
    pub fn is_complete(&self) -> bool {
        self.expected_length == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlvState {
    TagStart,
    LengthStart,
    LengthPending,
    LengthEnd,
    ValueStart,
    ValuePending,
    TlvDone,
    GrammarEnd,
    PduDecoded,
}

/// What happened after driving the decoder as far as the available input
/// allows.
#[derive(Debug, PartialEq, Eq)]
pub enum TlvOutcome {
    /// A full TLV was closed at the top level; the grammar driver was
    /// invoked and did not consider the PDU complete.
    MorePduBytesWanted,
    /// The root TLV and all its ancestors are closed, and the grammar
    /// driver confirmed a valid end state.
    PduComplete,
}

/// Implemented by the grammar engine (C3) to receive TLV-completion
/// notifications from the decoder. Kept as a trait rather than baking the
/// grammar engine into this module so the TLV state machine can be tested
/// in isolation from any particular grammar.
pub trait GrammarDriver {
    /// Invoked once per completed TLV, in depth-first post-order: a
    /// constructed TLV's callback fires only after every one of its
    /// children's callbacks has already fired, so an action attaching a
    /// constructed TLV's own message value may rely on its children's
    /// actions having already run. Returns whether the grammar would accept
    /// the PDU ending right after this TLV (the `follow_up` flag of the
    /// transition just taken).
    fn on_tlv_done(&mut self, arena: &[TlvNode], tlv: TlvId) -> Result<bool>;
}

pub struct TlvDecoder {
    pub state: TlvState,
    pub arena: Vec<TlvNode>,
    pub pos: usize,
    current: Option<TlvId>,
    parent_stack: Vec<TlvId>,
    root: Option<TlvId>,
    pub bytes_consumed: u64,
    pub config: DecoderConfig,
    pub gathering: bool,
    // length accumulation, resumable across calls
    length_buf: Vec<u8>,
    length_nb_bytes: usize,
    // rewind support
    tag_mark: usize,
    mark_arena_len: usize,
    mark_parent_stack_len: usize,
}

impl TlvDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        TlvDecoder {
            state: TlvState::TagStart,
            arena: Vec::new(),
            pos: 0,
            current: None,
            parent_stack: Vec::new(),
            root: None,
            bytes_consumed: 0,
            config,
            gathering: false,
            length_buf: Vec::new(),
            length_nb_bytes: 0,
            tag_mark: 0,
            mark_arena_len: 0,
            mark_parent_stack_len: 0,
        }
    }

    /// Reset to the grammar's start state without reallocating the arena.
    pub fn clean(&mut self) {
        self.state = TlvState::TagStart;
        self.arena.clear();
        self.pos = 0;
        self.current = None;
        self.parent_stack.clear();
        self.root = None;
        self.bytes_consumed = 0;
        self.length_buf.clear();
        self.length_nb_bytes = 0;
        self.tag_mark = 0;
        self.mark_arena_len = 0;
        self.mark_parent_stack_len = 0;
    }

    /// Reposition the stream to just before the current TLV's tag byte,
    /// discarding the partially-decoded current TLV. Used by grammars that
    /// decide, mid-length, that a TLV belongs to a different alternative.
    pub fn rewind(&mut self) {
        self.pos = self.tag_mark;
        self.arena.truncate(self.mark_arena_len);
        self.parent_stack.truncate(self.mark_parent_stack_len);
        self.current = None;
        self.state = TlvState::TagStart;
        self.length_buf.clear();
        self.length_nb_bytes = 0;
    }

    pub fn node(&self, id: TlvId) -> &TlvNode {
        &self.arena[id]
    }

    /// The first TLV decoded in the current PDU, once one exists.
    pub fn root(&self) -> Option<TlvId> {
        self.root
    }

    fn current_parent(&self) -> Option<TlvId> {
        self.parent_stack.last().copied()
    }

    /// Drive the state machine as far as `buf[self.pos..]` allows,
    /// invoking `driver.on_tlv_done` once per completed TLV.
    pub fn decode(&mut self, buf: &[u8], driver: &mut impl GrammarDriver) -> Result<TlvOutcome> {
        loop {
            match self.state {
                TlvState::TagStart => {
                    self.tag_mark = self.pos;
                    self.mark_arena_len = self.arena.len();
                    self.mark_parent_stack_len = self.parent_stack.len();
                    let Some(&tag) = buf.get(self.pos) else {
                        return Err(Error::Incomplete);
                    };
                    self.pos += 1;
                    let id = self.arena.len();
                    self.arena.push(TlvNode {
                        id,
                        tag,
                        length: 0,
                        length_nb_bytes: 0,
                        value: None,
                        current_length: 0,
                        parent: self.current_parent(),
                        expected_length: 0,
                        constructed: tag & 0x20 != 0,
                    });
                    self.current = Some(id);
                    self.state = TlvState::LengthStart;
                    trace!(tlv = id, tag = %format!("{tag:#04x}"), "tag read");
                }
                TlvState::LengthStart => {
                    let Some(&first) = buf.get(self.pos) else {
                        return Err(Error::Incomplete);
                    };
                    self.pos += 1;
                    if first == 0x80 {
                        // Indefinite-length content decoding is not implemented; LDAP
                        // never emits it, so `indefinite_length_allowed` only gates
                        // whether this is reported as a config violation or a syntax one.
                        return Err(BerError::IndefiniteLengthNotAllowed.into());
                    } else if first == 0xFF {
                        return Err(BerError::LengthExtensionReserved.into());
                    } else if first & 0x80 == 0 {
                        let id = self.current.unwrap();
                        self.arena[id].length = u64::from(first);
                        self.arena[id].length_nb_bytes = 1;
                        self.state = TlvState::LengthEnd;
                    } else {
                        let n = (first & 0x7F) as usize;
                        if n > 4 || n as u32 > self.config.max_length_length.max(4) {
                            return Err(BerError::LengthOverflow.into());
                        }
                        self.length_buf.clear();
                        self.length_nb_bytes = n;
                        self.state = TlvState::LengthPending;
                    }
                }
                TlvState::LengthPending => {
                    while self.length_buf.len() < self.length_nb_bytes {
                        let Some(&b) = buf.get(self.pos) else {
                            return Err(Error::Incomplete);
                        };
                        self.pos += 1;
                        self.length_buf.push(b);
                    }
                    let mut len: u64 = 0;
                    for &b in &self.length_buf {
                        len = len
                            .checked_shl(8)
                            .and_then(|v| v.checked_add(u64::from(b)))
                            .ok_or(BerError::LengthOverflow)?;
                    }
                    let id = self.current.unwrap();
                    self.arena[id].length = len;
                    self.arena[id].length_nb_bytes = 1 + self.length_nb_bytes;
                    self.state = TlvState::LengthEnd;
                }
                TlvState::LengthEnd => {
                    let id = self.current.unwrap();
                    let length = self.arena[id].length;
                    if length > self.config.max_pdu_size {
                        return Err(BerError::PduSizeExceeded {
                            declared: length,
                            max: self.config.max_pdu_size,
                        }
                        .into());
                    }
                    if let Some(parent) = self.current_parent() {
                        let s = tlv_total_size(&self.arena[id]);
                        let parent_remaining = self.arena[parent].expected_length;
                        if s > parent_remaining {
                            return Err(BerError::ValueTooLargeForParent.into());
                        }
                    }
                    if self.root.is_none() {
                        self.root = Some(id);
                    }
                    let constructed = self.arena[id].constructed;
                    self.arena[id].expected_length = length;
                    trace!(tlv = id, length, constructed, "length resolved");
                    if constructed && !self.gathering && length > 0 {
                        // Descend into children first; this constructed TLV's own
                        // callback fires later, in `close_and_collapse`, once its
                        // last child closes it (post-order).
                        self.parent_stack.push(id);
                        self.current = None;
                        self.state = TlvState::TagStart;
                    } else if length == 0 {
                        self.arena[id].current_length = 0;
                        return self.finish_and_continue(id, driver);
                    } else {
                        self.state = TlvState::ValueStart;
                    }
                }
                TlvState::ValueStart => {
                    let id = self.current.unwrap();
                    let length = self.arena[id].length as usize;
                    self.arena[id].value = Some(Vec::with_capacity(length));
                    self.state = TlvState::ValuePending;
                }
                TlvState::ValuePending => {
                    let id = self.current.unwrap();
                    let length = self.arena[id].length;
                    loop {
                        let cur = self.arena[id].current_length;
                        if cur == length {
                            break;
                        }
                        let Some(&b) = buf.get(self.pos) else {
                            return Err(Error::Incomplete);
                        };
                        self.pos += 1;
                        self.arena[id].value.as_mut().unwrap().push(b);
                        self.arena[id].current_length += 1;
                    }
                    return self.finish_and_continue(id, driver);
                }
                TlvState::TlvDone => {
                    // Unreachable: every path that closes a TLV now goes through
                    // `finish_and_continue`, which returns directly instead of
                    // transitioning here.
                    unreachable!("TlvDone is not entered by the state machine")
                }
                TlvState::GrammarEnd | TlvState::PduDecoded => {
                    return Ok(TlvOutcome::PduComplete);
                }
            }
        }
    }

    /// `id` has just received its last content byte (a primitive TLV, or an
    /// empty TLV of either kind). Fire its callback, then collapse any
    /// ancestor whose `expected_length` this completion brings to zero,
    /// firing each ancestor's callback in turn as it closes — innermost
    /// first, so a constructed TLV's callback always runs after all of its
    /// children's, matching `GrammarDriver::on_tlv_done`'s contract.
    fn finish_and_continue(&mut self, id: TlvId, driver: &mut impl GrammarDriver) -> Result<TlvOutcome> {
        let follow_up_ok = self.close_and_collapse(id, driver)?;
        let fully_decoded = self
            .root
            .map(|r| self.arena[r].is_complete())
            .unwrap_or(false)
            && self.parent_stack.is_empty();
        if fully_decoded {
            if follow_up_ok {
                self.state = TlvState::PduDecoded;
                return Ok(TlvOutcome::PduComplete);
            }
            return Err(crate::error::GrammarError::PrematurePduEnd.into());
        }
        self.current = None;
        self.state = TlvState::TagStart;
        Ok(TlvOutcome::MorePduBytesWanted)
    }

    /// Fire `id`'s callback, mark it complete, and recurse into its parent
    /// if `id` was the parent's last outstanding child. Returns the
    /// `follow_up` flag of the outermost TLV the cascade reached.
    fn close_and_collapse(&mut self, id: TlvId, driver: &mut impl GrammarDriver) -> Result<bool> {
        self.bytes_consumed += tlv_total_size(&self.arena[id]);
        trace!(tlv = id, tag = %format!("{:#04x}", self.arena[id].tag), "tlv closed, dispatching to grammar");
        let follow_up_ok = driver.on_tlv_done(&self.arena, id)?;
        self.arena[id].expected_length = 0;
        let size = tlv_total_size(&self.arena[id]);
        let Some(parent) = self.arena[id].parent else {
            return Ok(follow_up_ok);
        };
        if self.parent_stack.last() == Some(&parent) {
            self.arena[parent].expected_length -= size;
            if self.arena[parent].expected_length == 0 {
                self.parent_stack.pop();
                return self.close_and_collapse(parent, driver);
            }
        }
        Ok(follow_up_ok)
    }
}

fn tlv_total_size(node: &TlvNode) -> u64 {
    1 + node.length_nb_bytes as u64 + node.length
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullDriver;
    impl GrammarDriver for NullDriver {
        fn on_tlv_done(&mut self, _arena: &[TlvNode], _tlv: TlvId) -> Result<bool> {
            Ok(true)
        }
    }

    #[test]
    fn decodes_single_primitive_tlv() {
        let buf = [0x02, 0x01, 0x05];
        let mut d = TlvDecoder::new(DecoderConfig {
            max_length_length: 4,
            ..Default::default()
        });
        let mut drv = NullDriver;
        let outcome = d.decode(&buf, &mut drv).unwrap();
        assert_eq!(outcome, TlvOutcome::PduComplete);
        let root = d.root.unwrap();
        assert_eq!(d.node(root).tag, 0x02);
        assert_eq!(d.node(root).value.as_deref(), Some(&b"\x05"[..]));
    }

    #[test]
    fn chunked_input_matches_single_call() {
        // SEQUENCE { INTEGER 5 }
        let buf = [0x30, 0x03, 0x02, 0x01, 0x05];
        for split in 0..=buf.len() {
            let (a, b) = buf.split_at(split);
            let mut d = TlvDecoder::new(DecoderConfig {
                max_length_length: 4,
                ..Default::default()
            });
            d.gathering = false;
            let mut drv = NullDriver;
            // feed first chunk into a growing owned buffer
            let mut owned = a.to_vec();
            let outcome = loop {
                match d.decode(&owned, &mut drv) {
                    Ok(TlvOutcome::PduComplete) => break TlvOutcome::PduComplete,
                    Ok(TlvOutcome::MorePduBytesWanted) => continue,
                    Err(Error::Incomplete) => {
                        owned.extend_from_slice(b);
                        continue;
                    }
                    Err(e) => panic!("unexpected error at split {split}: {e:?}"),
                }
            };
            assert_eq!(outcome, TlvOutcome::PduComplete);
            let root = d.root.unwrap();
            assert_eq!(d.node(root).tag, 0x30);
            assert!(d.node(root).is_complete());
        }
    }

    #[test]
    fn constructed_tlv_callback_fires_after_its_children() {
        // SEQUENCE { SEQUENCE { INTEGER 1 }, INTEGER 2 }
        let buf = [0x30, 0x08, 0x30, 0x03, 0x02, 0x01, 0x01, 0x02, 0x01, 0x02];

        struct RecordingDriver {
            seen: Vec<u8>,
        }
        impl GrammarDriver for RecordingDriver {
            fn on_tlv_done(&mut self, arena: &[TlvNode], tlv: TlvId) -> Result<bool> {
                self.seen.push(arena[tlv].tag);
                Ok(true)
            }
        }

        let mut d = TlvDecoder::new(DecoderConfig {
            max_length_length: 4,
            ..Default::default()
        });
        let mut drv = RecordingDriver { seen: Vec::new() };
        let outcome = d.decode(&buf, &mut drv).unwrap();
        assert_eq!(outcome, TlvOutcome::PduComplete);
        // inner INTEGER, then the inner SEQUENCE that contains it, then the
        // second INTEGER, then the outer SEQUENCE last of all.
        assert_eq!(drv.seen, vec![0x02, 0x30, 0x02, 0x30]);
    }

    #[test]
    fn rejects_length_extension_reserved() {
        let buf = [0x02, 0xFF];
        let mut d = TlvDecoder::new(DecoderConfig::default());
        let mut drv = NullDriver;
        let err = d.decode(&buf, &mut drv).unwrap_err();
        assert_eq!(err, BerError::LengthExtensionReserved.into());
    }

    #[test]
    fn enforces_max_pdu_size() {
        let buf = [0x04, 0x05, b'h', b'e', b'l', b'l', b'o'];
        let mut d = TlvDecoder::new(DecoderConfig {
            max_pdu_size: 3,
            max_length_length: 4,
            ..Default::default()
        });
        let mut drv = NullDriver;
        let err = d.decode(&buf, &mut drv).unwrap_err();
        assert_eq!(
            err,
            BerError::PduSizeExceeded {
                declared: 5,
                max: 3
            }
            .into()
        );
    }
}
