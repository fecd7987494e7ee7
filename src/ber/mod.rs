//! BER primitives (spec component C1).
//!
//! Tag bytes, length encoding (short and long form), and the codecs for the
//! handful of primitive ASN.1 types LDAP actually uses. This is the only
//! place in the crate that encodes on-wire byte semantics; every higher
//! layer (the TLV decoder, the grammar engine, the reverse encoder) goes
//! through these functions.

pub mod encoder;
pub mod grammar;
pub mod tlv;

use crate::error::{BerError, Result};

/// Universal class tags used directly by LDAP (X.690 §8).
pub mod tag {
    pub const BOOLEAN: u8 = 0x01;
    pub const INTEGER: u8 = 0x02;
    pub const OCTET_STRING: u8 = 0x04;
    pub const NULL: u8 = 0x05;
    pub const ENUMERATED: u8 = 0x0A;
    pub const SEQUENCE: u8 = 0x30;
    pub const SET: u8 = 0x31;
}

/// The length-extension octet (`0x80 | n`) is reserved when `n` would be
/// encoded as all-ones; the indefinite-length marker itself is `0x80`.
const INDEFINITE_LENGTH_OCTET: u8 = 0x80;
const LENGTH_RESERVED_OCTET: u8 = 0xFF;

/// Encode a BER length in the minimum number of octets: short form
/// (`0..=127` in a single byte) or long form (`0x80 | n` followed by `n`
/// big-endian bytes, `n` in `1..=4`).
pub fn encode_length(len: u64) -> Vec<u8> {
    if len <= 0x7F {
        vec![len as u8]
    } else {
        let be = len.to_be_bytes();
        let first_nonzero = be.iter().position(|&b| b != 0).unwrap_or(be.len() - 1);
        let bytes = &be[first_nonzero..];
        let mut out = Vec::with_capacity(1 + bytes.len());
        out.push(INDEFINITE_LENGTH_OCTET | bytes.len() as u8);
        out.extend_from_slice(bytes);
        out
    }
}

/// Decode a BER length starting at `input[0]`. Returns the number of octets
/// consumed and the decoded length. Does not accept the indefinite-length
/// form; callers that allow it (per `DecoderConfig`) must check for
/// `input[0] == 0x80` themselves before calling this.
pub fn decode_length(input: &[u8]) -> Result<(usize, u64)> {
    let first = *input.first().ok_or(crate::error::Error::Incomplete)?;
    if first & INDEFINITE_LENGTH_OCTET == 0 {
        return Ok((1, u64::from(first)));
    }
    if first == LENGTH_RESERVED_OCTET {
        return Err(BerError::LengthExtensionReserved.into());
    }
    let n = (first & 0x7F) as usize;
    if n == 0 {
        // 0x80 with the high bit set and n == 0 is indefinite length.
        return Err(BerError::IndefiniteLengthNotAllowed.into());
    }
    if n > 4 {
        return Err(BerError::LengthOverflow.into());
    }
    if input.len() < 1 + n {
        return Err(crate::error::Error::Incomplete);
    }
    let mut len: u64 = 0;
    for &b in &input[1..1 + n] {
        len = (len << 8) | u64::from(b);
    }
    Ok((1 + n, len))
}

/// `01 01 00` / `01 01 FF`
pub fn encode_boolean(b: bool) -> Vec<u8> {
    vec![tag::BOOLEAN, 0x01, if b { 0xFF } else { 0x00 }]
}

pub fn decode_boolean(value: &[u8]) -> Result<bool> {
    Ok(value.first().copied().unwrap_or(0) != 0)
}

/// Shortest two's-complement big-endian representation, with a leading
/// `0x00` when the high bit of the first byte would otherwise flip the sign
/// of a non-negative value.
fn encode_twos_complement(i: i64) -> Vec<u8> {
    if i == 0 {
        return vec![0x00];
    }
    let be = i.to_be_bytes();
    let mut start = 0;
    while start < be.len() - 1 {
        let b = be[start];
        let next = be[start + 1];
        // Drop a leading all-0 (resp all-1) byte only if the sign bit of
        // the following byte already encodes the right sign.
        if b == 0x00 && next & 0x80 == 0 {
            start += 1;
        } else if b == 0xFF && next & 0x80 != 0 {
            start += 1;
        } else {
            break;
        }
    }
    be[start..].to_vec()
}

fn decode_twos_complement(value: &[u8]) -> i64 {
    if value.is_empty() {
        return 0;
    }
    let negative = value[0] & 0x80 != 0;
    let mut acc: i64 = if negative { -1 } else { 0 };
    for &b in value {
        acc = (acc << 8) | i64::from(b);
    }
    acc
}

pub fn encode_integer(i: i64) -> Vec<u8> {
    let value = encode_twos_complement(i);
    let mut out = Vec::with_capacity(2 + value.len());
    out.push(tag::INTEGER);
    out.extend(encode_length(value.len() as u64));
    out.extend(value);
    out
}

pub fn decode_integer(value: &[u8]) -> i64 {
    decode_twos_complement(value)
}

/// Encode an INTEGER's content under a caller-supplied implicit tag, as
/// `AbandonRequest`'s `[APPLICATION 16] MessageID` wants instead of the
/// universal `0x02`.
pub fn encode_integer_tagged(i: i64, tag: u8) -> Vec<u8> {
    let value = encode_twos_complement(i);
    let mut out = Vec::with_capacity(2 + value.len());
    out.push(tag);
    out.extend(encode_length(value.len() as u64));
    out.extend(value);
    out
}

pub fn encode_enumerated(i: i64) -> Vec<u8> {
    let value = encode_twos_complement(i);
    let mut out = Vec::with_capacity(2 + value.len());
    out.push(tag::ENUMERATED);
    out.extend(encode_length(value.len() as u64));
    out.extend(value);
    out
}

pub fn decode_enumerated(value: &[u8]) -> i64 {
    decode_twos_complement(value)
}

/// Encode an octet string under the universal tag `0x04`.
pub fn encode_octet_string(bytes: &[u8]) -> Vec<u8> {
    encode_octet_string_tagged(bytes, tag::OCTET_STRING)
}

/// Encode an octet string under a caller-supplied context tag (e.g. the
/// implicit tags LDAP uses for `bindDN`, `requestValue`, and so on).
pub fn encode_octet_string_tagged(bytes: &[u8], context_tag: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + bytes.len());
    out.push(context_tag);
    out.extend(encode_length(bytes.len() as u64));
    out.extend_from_slice(bytes);
    out
}

/// Wrap the bytes appended to `buffer` since `start_mark` with a SEQUENCE
/// (`0x30`) tag and length prefix, splicing the prefix in at `start_mark`.
pub fn encode_sequence(buffer: &mut Vec<u8>, start_mark: usize) {
    encode_constructed_tagged(buffer, start_mark, tag::SEQUENCE);
}

/// As `encode_sequence`, but with the SET (`0x31`) tag.
pub fn encode_set(buffer: &mut Vec<u8>, start_mark: usize) {
    encode_constructed_tagged(buffer, start_mark, tag::SET);
}

/// As `encode_sequence`, but with a caller-supplied context tag (for
/// implicitly-tagged or explicitly-tagged constructed values).
pub fn encode_constructed_tagged(buffer: &mut Vec<u8>, start_mark: usize, context_tag: u8) {
    let content_len = buffer.len() - start_mark;
    let mut prefix = Vec::with_capacity(2);
    prefix.push(context_tag);
    prefix.extend(encode_length(content_len as u64));
    buffer.splice(start_mark..start_mark, prefix);
}
