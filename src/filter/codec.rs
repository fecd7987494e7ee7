//! BER encoding of search filters, per RFC 4511 §4.5.1.
//!
//! `Filter`'s ten alternatives are each implicitly tagged `[0]`..`[9]`
//! under the context class; `and`/`or`/`not` nest other filters to
//! unbounded depth. Decoding walks the TLV arena recursively once C2 has
//! closed the whole tree, rather than driving a `Grammar`/`Container`
//! (C3) end to end: `Grammar` tracks one flat state, not a stack, so it
//! can drive a fixed-shape structure (an `LDAPMessage` envelope, see
//! `message_grammar`) but not a recursively-nested one like this. This is
//! a tracked deviation, not an architectural necessity — see the open
//! question in `SPEC_FULL.md` §4.5 and `DESIGN.md`.

use crate::ber;
use crate::ber::encoder::Asn1Buffer;
use crate::ber::tlv::{GrammarDriver, TlvDecoder, TlvId, TlvNode, TlvOutcome};
use crate::config::DecoderConfig;
use crate::error::{Error, FilterError, Result};

use super::{AssertionValue, AttributeValueAssertion, Filter, MatchingRuleAssertion, Substring, SubstringFilter};

const TAG_AND: u8 = 0xA0;
const TAG_OR: u8 = 0xA1;
const TAG_NOT: u8 = 0xA2;
const TAG_EQUALITY: u8 = 0xA3;
const TAG_SUBSTRINGS: u8 = 0xA4;
const TAG_GE: u8 = 0xA5;
const TAG_LE: u8 = 0xA6;
const TAG_PRESENT: u8 = 0x87;
const TAG_APPROX: u8 = 0xA8;
const TAG_EXTENSIBLE: u8 = 0xA9;

const TAG_SUB_INITIAL: u8 = 0x80;
const TAG_SUB_ANY: u8 = 0x81;
const TAG_SUB_FINAL: u8 = 0x82;

const TAG_MR_MATCHING_RULE: u8 = 0x81;
const TAG_MR_TYPE: u8 = 0x82;
const TAG_MR_MATCH_VALUE: u8 = 0x83;
const TAG_MR_DN_ATTRIBUTES: u8 = 0x84;

struct NullDriver;

impl GrammarDriver for NullDriver {
    fn on_tlv_done(&mut self, _arena: &[TlvNode], _tlv: TlvId) -> Result<bool> {
        Ok(true)
    }
}

/// Decode one BER-encoded `Filter` from `bytes`. `bytes` must hold exactly
/// one filter TLV; trailing bytes are ignored, matching the way a filter is
/// always decoded as one element nested inside a larger `SearchRequest`.
pub fn decode_filter(bytes: &[u8]) -> Result<Filter> {
    let mut tlv = TlvDecoder::new(DecoderConfig::default());
    let mut driver = NullDriver;
    loop {
        match tlv.decode(bytes, &mut driver)? {
            TlvOutcome::PduComplete => break,
            // One `decode` call closes exactly one TLV; a filter tree has
            // several, so drive it until the whole tree collapses.
            TlvOutcome::MorePduBytesWanted => continue,
        }
    }
    let root = tlv.root().ok_or(Error::Incomplete)?;
    decode_node(&tlv.arena, root)
}

fn children_of(arena: &[TlvNode], parent: TlvId) -> impl Iterator<Item = &TlvNode> {
    arena.iter().filter(move |n| n.parent == Some(parent))
}

fn utf8_value(node: &TlvNode) -> Result<String> {
    let bytes = node.value.as_deref().unwrap_or(&[]);
    String::from_utf8(bytes.to_vec()).map_err(|_| FilterError::UnknownFilterTag(node.tag).into())
}

fn assertion_value(node: &TlvNode) -> AssertionValue {
    AssertionValue(node.value.clone().unwrap_or_default())
}

/// Interpret an already-parsed filter subtree rooted at `id`. Exposed so
/// `message_codec` can decode a `SearchRequest`'s `filter` field straight off
/// the same arena it parsed the rest of the message from, rather than
/// re-serializing and re-parsing it through [`decode_filter`].
pub(crate) fn decode_node(arena: &[TlvNode], id: TlvId) -> Result<Filter> {
    let node = &arena[id];
    match node.tag {
        TAG_AND => Ok(Filter::And(decode_children(arena, id)?)),
        TAG_OR => Ok(Filter::Or(decode_children(arena, id)?)),
        TAG_NOT => {
            let child = children_of(arena, id).next().ok_or(FilterError::UnknownFilterTag(node.tag))?;
            Ok(Filter::Not(Box::new(decode_node(arena, child.id)?)))
        }
        TAG_EQUALITY => Ok(Filter::EqualityMatch(decode_ava(arena, id)?)),
        TAG_GE => Ok(Filter::GreaterOrEqual(decode_ava(arena, id)?)),
        TAG_LE => Ok(Filter::LessOrEqual(decode_ava(arena, id)?)),
        TAG_APPROX => Ok(Filter::ApproxMatch(decode_ava(arena, id)?)),
        TAG_PRESENT => Ok(Filter::Present(utf8_value(node)?)),
        TAG_SUBSTRINGS => decode_substrings(arena, id),
        TAG_EXTENSIBLE => decode_extensible(arena, id),
        other => Err(FilterError::UnknownFilterTag(other).into()),
    }
}

fn decode_children(arena: &[TlvNode], id: TlvId) -> Result<Vec<Filter>> {
    children_of(arena, id)
        .map(|child| decode_node(arena, child.id))
        .collect()
}

fn decode_ava(arena: &[TlvNode], id: TlvId) -> Result<AttributeValueAssertion> {
    let mut children = children_of(arena, id);
    let attr = children.next().ok_or(FilterError::UnknownFilterTag(arena[id].tag))?;
    let value = children.next().ok_or(FilterError::UnknownFilterTag(arena[id].tag))?;
    Ok(AttributeValueAssertion {
        attribute_desc: utf8_value(attr)?,
        assertion_value: assertion_value(value),
    })
}

fn decode_substrings(arena: &[TlvNode], id: TlvId) -> Result<Filter> {
    let mut children = children_of(arena, id);
    let attr = children.next().ok_or(FilterError::UnknownFilterTag(arena[id].tag))?;
    let list = children.next().ok_or(FilterError::UnknownFilterTag(arena[id].tag))?;
    let mut substrings = Vec::new();
    for frag in children_of(arena, list.id) {
        let value = assertion_value(frag);
        substrings.push(match frag.tag {
            TAG_SUB_INITIAL => Substring::Initial(value),
            TAG_SUB_ANY => Substring::Any(value),
            TAG_SUB_FINAL => Substring::Final(value),
            other => return Err(FilterError::UnknownFilterTag(other).into()),
        });
    }
    Ok(Filter::Substrings(SubstringFilter {
        attr_type: utf8_value(attr)?,
        substrings,
    }))
}

fn decode_extensible(arena: &[TlvNode], id: TlvId) -> Result<Filter> {
    let mut matching_rule = None;
    let mut attribute_desc = None;
    let mut assertion_value_field = None;
    let mut dn_attributes = false;
    for child in children_of(arena, id) {
        match child.tag {
            TAG_MR_MATCHING_RULE => matching_rule = Some(utf8_value(child)?),
            TAG_MR_TYPE => attribute_desc = Some(utf8_value(child)?),
            TAG_MR_MATCH_VALUE => assertion_value_field = Some(assertion_value(child)),
            TAG_MR_DN_ATTRIBUTES => dn_attributes = ber::decode_boolean(child.value.as_deref().unwrap_or(&[]))?,
            other => return Err(FilterError::UnknownFilterTag(other).into()),
        }
    }
    let assertion_value = assertion_value_field.ok_or(FilterError::UnknownFilterTag(arena[id].tag))?;
    Ok(Filter::ExtensibleMatch(MatchingRuleAssertion {
        matching_rule,
        attribute_desc,
        assertion_value,
        dn_attributes,
    }))
}

/// Encode `filter` to its BER wire form.
pub fn encode_filter(filter: &Filter) -> Vec<u8> {
    let mut buf = Asn1Buffer::new();
    write_filter(&mut buf, filter);
    buf.into_vec()
}

/// Write a filter's BER encoding directly into a larger in-progress buffer
/// (e.g. a `SearchRequest` being assembled by `message_codec`).
pub(crate) fn write_filter(buf: &mut Asn1Buffer, filter: &Filter) {
    match filter {
        Filter::And(items) => {
            buf.encode_constructed_tagged(TAG_AND, |b| {
                for item in items {
                    write_filter(b, item);
                }
            });
        }
        Filter::Or(items) => {
            buf.encode_constructed_tagged(TAG_OR, |b| {
                for item in items {
                    write_filter(b, item);
                }
            });
        }
        Filter::Not(inner) => {
            buf.encode_constructed_tagged(TAG_NOT, |b| write_filter(b, inner));
        }
        Filter::EqualityMatch(ava) => write_ava(buf, TAG_EQUALITY, ava),
        Filter::GreaterOrEqual(ava) => write_ava(buf, TAG_GE, ava),
        Filter::LessOrEqual(ava) => write_ava(buf, TAG_LE, ava),
        Filter::ApproxMatch(ava) => write_ava(buf, TAG_APPROX, ava),
        Filter::Present(attr) => {
            buf.encode_octet_string_tagged(attr.as_bytes(), TAG_PRESENT);
        }
        Filter::Substrings(sf) => write_substrings(buf, sf),
        Filter::ExtensibleMatch(mra) => write_extensible(buf, mra),
    }
}

fn write_ava(buf: &mut Asn1Buffer, tag: u8, ava: &AttributeValueAssertion) {
    buf.encode_constructed_tagged(tag, |b| {
        b.encode_octet_string(ava.attribute_desc.as_bytes());
        b.encode_octet_string(&ava.assertion_value.0);
    });
}

fn write_substrings(buf: &mut Asn1Buffer, sf: &SubstringFilter) {
    buf.encode_constructed_tagged(TAG_SUBSTRINGS, |b| {
        b.encode_octet_string(sf.attr_type.as_bytes());
        b.encode_sequence(|b| {
            for frag in &sf.substrings {
                match frag {
                    Substring::Initial(v) => b.encode_octet_string_tagged(&v.0, TAG_SUB_INITIAL),
                    Substring::Any(v) => b.encode_octet_string_tagged(&v.0, TAG_SUB_ANY),
                    Substring::Final(v) => b.encode_octet_string_tagged(&v.0, TAG_SUB_FINAL),
                };
            }
        });
    });
}

fn write_extensible(buf: &mut Asn1Buffer, mra: &MatchingRuleAssertion) {
    buf.encode_constructed_tagged(TAG_EXTENSIBLE, |b| {
        if let Some(rule) = &mra.matching_rule {
            b.encode_octet_string_tagged(rule.as_bytes(), TAG_MR_MATCHING_RULE);
        }
        if let Some(attr) = &mra.attribute_desc {
            b.encode_octet_string_tagged(attr.as_bytes(), TAG_MR_TYPE);
        }
        b.encode_octet_string_tagged(&mra.assertion_value.0, TAG_MR_MATCH_VALUE);
        if mra.dn_attributes {
            b.write_byte(TAG_MR_DN_ATTRIBUTES);
            b.write_byte(0x01);
            b.write_byte(0xFF);
        }
    });
}
