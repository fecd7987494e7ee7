//! Reverse BER encoder (spec component C4).
//!
//! `Asn1Buffer` is a growable byte buffer with a write cursor that moves
//! from high to low index: every write decrements the cursor and copies
//! bytes into place just above it, so a constructed value's children are
//! written first and its tag/length prefix is written last, directly
//! abutting them, once their total length is known. No two-pass
//! length-then-emit step, and no shifting already-written bytes to make
//! room for a prefix discovered late.
//!
//! The cursor starts at the end of a pre-allocated block and is grown (by
//! doubling, copying the written suffix to the end of the new block) the
//! same way a bump allocator grows backward.

use crate::ber;

const INITIAL_CAPACITY: usize = 256;

/// A growable, write-from-tail byte buffer for constructing BER encodings.
pub struct Asn1Buffer {
    buf: Vec<u8>,
    cursor: usize,
}

impl std::fmt::Debug for Asn1Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Asn1Buffer").field("written", &self.as_slice()).finish()
    }
}

impl Default for Asn1Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Asn1Buffer {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.max(1);
        Asn1Buffer {
            buf: vec![0u8; cap],
            cursor: cap,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len() - self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == self.buf.len()
    }

    /// The cursor's current position. Record this before writing a
    /// constructed value's children; `start - position()` afterward is the
    /// number of content bytes written, which `close_sequence` and friends
    /// use to emit the right length.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Restore a previously recorded cursor position, discarding anything
    /// written since. Not used by the builder helpers below (they only
    /// ever move forward in encode order / backward in buffer index), but
    /// kept for callers that need to discard a speculative encode.
    pub fn set_position(&mut self, p: usize) {
        debug_assert!(p <= self.buf.len());
        self.cursor = p;
    }

    fn ensure_capacity(&mut self, additional: usize) {
        if self.cursor >= additional {
            return;
        }
        let used = self.buf.len() - self.cursor;
        let mut new_cap = self.buf.len().max(1);
        while new_cap - used < additional {
            new_cap *= 2;
        }
        let mut new_buf = vec![0u8; new_cap];
        let new_cursor = new_cap - used;
        new_buf[new_cursor..].copy_from_slice(&self.buf[self.cursor..]);
        self.buf = new_buf;
        self.cursor = new_cursor;
    }

    /// Decrement the cursor by one and write `b` just above it.
    pub fn write_byte(&mut self, b: u8) -> &mut Self {
        self.ensure_capacity(1);
        self.cursor -= 1;
        self.buf[self.cursor] = b;
        self
    }

    /// Decrement the cursor by `bytes.len()` and copy `bytes` into place,
    /// preserving their internal order.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.ensure_capacity(bytes.len());
        self.cursor -= bytes.len();
        let end = self.cursor + bytes.len();
        self.buf[self.cursor..end].copy_from_slice(bytes);
        self
    }

    /// Write an octet string value and its tag/length prefix as one unit:
    /// value, then length, then tag, each writing lower than the last, so
    /// they read tag/length/value once flushed.
    pub fn encode_octet_string(&mut self, bytes: &[u8]) -> &mut Self {
        self.encode_octet_string_tagged(bytes, ber::tag::OCTET_STRING)
    }

    pub fn encode_octet_string_tagged(&mut self, bytes: &[u8], tag: u8) -> &mut Self {
        self.write_bytes(bytes);
        self.write_bytes(&ber::encode_length(bytes.len() as u64));
        self.write_byte(tag);
        self
    }

    pub fn encode_integer(&mut self, value: i64) -> &mut Self {
        self.write_bytes(&ber::encode_integer(value))
    }

    pub fn encode_enumerated(&mut self, value: i64) -> &mut Self {
        self.write_bytes(&ber::encode_enumerated(value))
    }

    /// As `encode_integer`, but under a caller-supplied implicit tag (e.g.
    /// `AbandonRequest`'s bare `[APPLICATION 16] MessageID`).
    pub fn encode_integer_tagged(&mut self, value: i64, tag: u8) -> &mut Self {
        self.write_bytes(&ber::encode_integer_tagged(value, tag))
    }

    pub fn encode_boolean(&mut self, value: bool) -> &mut Self {
        self.write_bytes(&ber::encode_boolean(value))
    }

    /// Mark the cursor position before a constructed value's children are
    /// written. Pass the returned mark to `close_sequence`/`close_set`/
    /// `close_constructed_tagged` once they're all on the buffer, to write
    /// its length and tag directly below them.
    pub fn mark(&self) -> usize {
        self.position()
    }

    fn close_tagged(&mut self, start: usize, tag: u8) -> &mut Self {
        let content_len = start - self.position();
        self.write_bytes(&ber::encode_length(content_len as u64));
        self.write_byte(tag);
        self
    }

    pub fn close_sequence(&mut self, start: usize) -> &mut Self {
        self.close_tagged(start, ber::tag::SEQUENCE)
    }

    pub fn close_set(&mut self, start: usize) -> &mut Self {
        self.close_tagged(start, ber::tag::SET)
    }

    pub fn close_constructed_tagged(&mut self, start: usize, tag: u8) -> &mut Self {
        self.close_tagged(start, tag)
    }

    /// Run `build` to write content, then wrap it in a SEQUENCE tag/length.
    pub fn encode_sequence(&mut self, build: impl FnOnce(&mut Self)) -> &mut Self {
        let mark = self.mark();
        build(self);
        self.close_sequence(mark)
    }

    pub fn encode_set(&mut self, build: impl FnOnce(&mut Self)) -> &mut Self {
        let mark = self.mark();
        build(self);
        self.close_set(mark)
    }

    pub fn encode_constructed_tagged(&mut self, tag: u8, build: impl FnOnce(&mut Self)) -> &mut Self {
        let mark = self.mark();
        build(self);
        self.close_constructed_tagged(mark, tag)
    }

    /// The finished encoding.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[self.cursor..]
    }

    pub fn into_vec(self) -> Vec<u8> {
        let Asn1Buffer { buf, cursor } = self;
        let mut buf = buf;
        buf.split_off(cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_of_integer_matches_forward_encoding() {
        let mut buf = Asn1Buffer::new();
        buf.encode_sequence(|b| {
            b.encode_integer(5);
        });
        assert_eq!(buf.as_slice(), &[0x30, 0x03, 0x02, 0x01, 0x05]);
    }

    #[test]
    fn nested_sequences_preserve_sibling_order() {
        let mut buf = Asn1Buffer::new();
        buf.encode_sequence(|b| {
            b.encode_sequence(|b| {
                b.encode_integer(1);
            });
            b.encode_integer(2);
        });
        assert_eq!(
            buf.as_slice(),
            &[0x30, 0x08, 0x30, 0x03, 0x02, 0x01, 0x01, 0x02, 0x01, 0x02]
        );
    }

    #[test]
    fn octet_string_tagged_matches_forward_helper() {
        let mut buf = Asn1Buffer::new();
        buf.encode_octet_string_tagged(b"cn=admin", 0x04);
        assert_eq!(
            buf.as_slice(),
            ber::encode_octet_string_tagged(b"cn=admin", 0x04).as_slice()
        );
    }

    #[test]
    fn application_tagged_sequence() {
        let mut buf = Asn1Buffer::new();
        // AbandonRequest ::= [APPLICATION 16] MessageID, a primitive
        // INTEGER encoded directly under an application tag (no nested
        // SEQUENCE). Exercises close_constructed_tagged with a primitive
        // payload wrapped at the message layer instead.
        buf.encode_sequence(|b| {
            b.encode_integer(1);
            b.encode_constructed_tagged(0x78, |b| {
                b.encode_integer(5);
            });
        });
        assert_eq!(
            buf.as_slice(),
            &[0x30, 0x09, 0x02, 0x01, 0x01, 0x78, 0x03, 0x02, 0x01, 0x05]
        );
    }

    #[test]
    fn growth_past_initial_capacity_preserves_content() {
        let mut buf = Asn1Buffer::with_capacity(4);
        buf.encode_sequence(|b| {
            for i in 0..40i64 {
                b.encode_integer(i);
            }
        });
        let mut expect = Vec::new();
        for i in 0..40i64 {
            expect.extend(ber::encode_integer(i));
        }
        let mut want = vec![0x30];
        want.extend(ber::encode_length(expect.len() as u64));
        want.extend(expect);
        assert_eq!(buf.as_slice(), want.as_slice());
    }

    #[test]
    fn position_and_set_position_bracket_a_span() {
        let mut buf = Asn1Buffer::new();
        buf.encode_integer(1);
        let start = buf.position();
        buf.encode_integer(2);
        buf.set_position(start);
        buf.encode_integer(3);
        assert_eq!(buf.as_slice(), &[0x02, 0x01, 0x03, 0x02, 0x01, 0x01]);
    }
}
