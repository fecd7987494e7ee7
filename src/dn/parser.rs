//! RFC 2253 / RFC 4514 Distinguished Name string parser.
//!
//! Accepts the union of both RFCs: RFC 4514's stricter escaping alongside
//! RFC 2253's lenient `oid.`-prefixed numeric OIDs. Built on `nom` for the
//! structural grammar (RDN/AVA/`+`/`,` separators); attribute-value escape
//! processing is a manual scan since it needs to track context (quoted vs
//! not) that doesn't fit a simple combinator.

use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{char, digit1, satisfy};
use nom::combinator::{opt, recognize};
use nom::multi::{many0, many1, separated_list0};
use nom::sequence::{pair, preceded, separated_pair};
use nom::IResult;

use super::normalize::SchemaView;
use super::{Ava, AttrType, AvaValue, Dn, Rdn};
use crate::error::{DnError, Result};

pub fn parse_dn(input: &str) -> Result<Dn> {
    if input.is_empty() {
        return Ok(Dn::default());
    }
    match dn(input) {
        Ok(("", dn)) => Ok(dn),
        Ok((rest, _)) => Err(DnError::InvalidSyntax {
            source: input.to_string(),
            pos: input.len() - rest.len(),
        }
        .into()),
        Err(_) => Err(DnError::InvalidSyntax {
            source: input.to_string(),
            pos: 0,
        }
        .into()),
    }
}

/// As [`parse_dn`], but additionally rejects any attribute descriptor
/// `schema` cannot resolve to a canonical OID. Numeric OIDs are accepted
/// unconditionally (a dotted OID is its own canonical form, known or not).
pub fn parse_dn_strict(input: &str, schema: &impl SchemaView) -> Result<Dn> {
    let dn = parse_dn(input)?;
    for rdn in &dn.rdns {
        for ava in &rdn.avas {
            if let AttrType::Descriptor(name) = &ava.attr_type {
                if schema.canonical_oid(&ava.attr_type).is_none() {
                    return Err(DnError::UnknownAttributeType(name.clone()).into());
                }
            }
        }
    }
    Ok(dn)
}

fn dn(input: &str) -> IResult<&str, Dn> {
    let (rest, rdns) = separated_list0(char(','), rdn)(input)?;
    Ok((rest, Dn::new(rdns)))
}

fn rdn(input: &str) -> IResult<&str, Rdn> {
    let (rest, avas) = separated_list0(char('+'), ava)(input)?;
    Ok((rest, Rdn { avas }))
}

fn ava(input: &str) -> IResult<&str, Ava> {
    let (rest, (attr_type, raw_value)) = separated_pair(attr_type, char('='), raw_ava_value)(input)?;
    let value = decode_value(raw_value).map_err(|_| {
        nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Verify))
    })?;
    Ok((rest, Ava::new(attr_type, value)))
}

fn attr_type(input: &str) -> IResult<&str, AttrType> {
    alt((numeric_oid, descriptor))(input)
}

fn descriptor(input: &str) -> IResult<&str, AttrType> {
    let (rest, name) = recognize(pair(
        satisfy(|c: char| c.is_ascii_alphabetic()),
        many0(satisfy(|c: char| c.is_ascii_alphanumeric() || c == '-')),
    ))(input)?;
    Ok((rest, AttrType::Descriptor(name.to_string())))
}

fn numeric_oid(input: &str) -> IResult<&str, AttrType> {
    // RFC 2253 permits an "oid." prefix before the dotted numeric form;
    // it is accepted on input and never re-emitted.
    let (input, had_prefix) = opt(tag("oid."))(input).map(|(i, m)| (i, m.is_some()))?;
    if had_prefix {
        tracing::trace!("accepting legacy RFC 2253 'oid.' prefix");
    }
    let (rest, oid) = recognize(pair(digit1, many0(preceded(char('.'), digit1))))(input)?;
    // a bare numeric descriptor followed by more alnum chars is a
    // descriptor, not an OID (descriptors may start with digits only via
    // this path never happens: RFC requires a leading letter for descr).
    Ok((rest, AttrType::Oid(oid.to_string())))
}

/// Extract the raw (still-escaped) text of one attribute value: either a
/// `#hex` binary literal, a `"..."` quoted string, or an unquoted run up to
/// the next unescaped `+`, `,`, or end of input.
fn raw_ava_value(input: &str) -> IResult<&str, RawValue<'_>> {
    alt((raw_hex_value, raw_quoted_value, raw_unquoted_value))(input)
}

enum RawValue<'a> {
    Hex(&'a str),
    Quoted(&'a str),
    Unquoted(&'a str),
}

fn raw_hex_value(input: &str) -> IResult<&str, RawValue<'_>> {
    let (rest, hex) = preceded(char('#'), recognize(many1(satisfy(|c: char| c.is_ascii_hexdigit()))))(input)?;
    Ok((rest, RawValue::Hex(hex)))
}

fn raw_quoted_value(input: &str) -> IResult<&str, RawValue<'_>> {
    let mut chars = input.char_indices();
    match chars.next() {
        Some((_, '"')) => {}
        _ => {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Char,
            )))
        }
    }
    let mut escaped = false;
    for (i, c) in chars {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => {
                let body = &input[1..i];
                let rest = &input[i + 1..];
                return Ok((rest, RawValue::Quoted(body)));
            }
            _ => {}
        }
    }
    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Eof,
    )))
}

fn raw_unquoted_value(input: &str) -> IResult<&str, RawValue<'_>> {
    let mut escaped = false;
    let mut end = input.len();
    for (i, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            ',' | '+' => {
                end = i;
                break;
            }
            _ => {}
        }
    }
    let body = &input[..end];
    let rest = &input[end..];
    Ok((rest, RawValue::Unquoted(body)))
}

fn decode_value(raw: RawValue<'_>) -> std::result::Result<AvaValue, ()> {
    match raw {
        RawValue::Hex(hex) => {
            if hex.len() % 2 != 0 {
                return Err(());
            }
            let mut bytes = Vec::with_capacity(hex.len() / 2);
            let digits: Vec<char> = hex.chars().collect();
            for pair in digits.chunks(2) {
                let byte = u8::from_str_radix(&pair.iter().collect::<String>(), 16).map_err(|_| ())?;
                bytes.push(byte);
            }
            Ok(AvaValue::Bytes(bytes))
        }
        RawValue::Quoted(body) => Ok(AvaValue::String(unescape(body)?)),
        RawValue::Unquoted(body) => Ok(AvaValue::String(unescape(trim_unescaped_spaces(body))?)),
    }
}

/// Trim leading/trailing unescaped spaces, stopping short of (i.e. never
/// consuming) the last escaped space at either boundary.
fn trim_unescaped_spaces(s: &str) -> &str {
    let bytes = s.as_bytes();
    let mut start = 0;
    while start < bytes.len() && bytes[start] == b' ' {
        start += 1;
    }
    let mut end = bytes.len();
    while end > start {
        if bytes[end - 1] != b' ' {
            break;
        }
        // An escaped trailing space has a backslash two bytes back that
        // is itself not escaped; a single preceding backslash means this
        // space is literal and must be kept.
        if end >= 2 && bytes[end - 2] == b'\\' {
            break;
        }
        end -= 1;
    }
    &s[start..end]
}

/// Resolve `\XX` hex escapes and single-character backslash escapes.
///
/// Hex escapes decode to raw bytes rather than individual Unicode scalars:
/// a non-ASCII character is normally written as a run of consecutive `\XX`
/// escapes, one per UTF-8 byte, so the bytes are accumulated and the whole
/// run is decoded as UTF-8 at the end.
fn unescape(s: &str) -> std::result::Result<String, ()> {
    let chars: Vec<char> = s.chars().collect();
    let mut out = Vec::with_capacity(s.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' {
            if i + 2 < chars.len() && chars[i + 1].is_ascii_hexdigit() && chars[i + 2].is_ascii_hexdigit() {
                let hex: String = chars[i + 1..i + 3].iter().collect();
                let byte = u8::from_str_radix(&hex, 16).map_err(|_| ())?;
                out.push(byte);
                i += 3;
                continue;
            }
            if i + 1 < chars.len() {
                let mut buf = [0u8; 4];
                out.extend_from_slice(chars[i + 1].encode_utf8(&mut buf).as_bytes());
                i += 2;
                continue;
            }
            return Err(());
        }
        let mut buf = [0u8; 4];
        out.extend_from_slice(chars[i].encode_utf8(&mut buf).as_bytes());
        i += 1;
    }
    String::from_utf8(out).map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dn::AttrType;
    use crate::error::Error;

    #[test]
    fn parses_simple_rdn() {
        let dn = parse_dn("cn=admin").unwrap();
        assert_eq!(dn.rdns.len(), 1);
        assert_eq!(dn.rdns[0].avas[0].attr_type, AttrType::Descriptor("cn".into()));
        assert_eq!(dn.rdns[0].avas[0].value.as_str(), Some("admin"));
    }

    #[test]
    fn parses_multi_rdn_dn() {
        let dn = parse_dn("cn=admin,dc=example,dc=com").unwrap();
        assert_eq!(dn.rdns.len(), 3);
    }

    #[test]
    fn parses_multi_valued_rdn() {
        let dn = parse_dn("cn=a+ou=b,dc=example").unwrap();
        assert_eq!(dn.rdns[0].avas.len(), 2);
    }

    #[test]
    fn parses_quoted_value_with_comma() {
        let dn = parse_dn("cn=\"Doe, John\",dc=example").unwrap();
        assert_eq!(dn.rdns[0].avas[0].value.as_str(), Some("Doe, John"));
    }

    #[test]
    fn parses_hex_escaped_value() {
        let dn = parse_dn("cn=Lu\\c4\\8di\\c4\\87").unwrap();
        assert_eq!(dn.rdns[0].avas[0].value.as_str(), Some("Lučić"));
    }

    #[test]
    fn parses_numeric_oid_type_with_prefix() {
        let dn = parse_dn("oid.2.5.4.3=admin").unwrap();
        assert_eq!(dn.rdns[0].avas[0].attr_type, AttrType::Oid("2.5.4.3".into()));
    }

    #[test]
    fn parses_binary_value() {
        let dn = parse_dn("userCertificate=#deadbeef").unwrap();
        assert_eq!(
            dn.rdns[0].avas[0].value,
            crate::dn::AvaValue::Bytes(vec![0xDE, 0xAD, 0xBE, 0xEF])
        );
    }

    #[test]
    fn trims_unescaped_leading_and_trailing_spaces() {
        let dn = parse_dn("cn= foo ,dc=example").unwrap();
        assert_eq!(dn.rdns[0].avas[0].value.as_str(), Some("foo"));
    }

    #[test]
    fn keeps_escaped_trailing_space() {
        let dn = parse_dn("cn=foo\\ ,dc=example").unwrap();
        assert_eq!(dn.rdns[0].avas[0].value.as_str(), Some("foo "));
    }

    #[test]
    fn empty_dn_is_valid() {
        let dn = parse_dn("").unwrap();
        assert!(dn.is_empty());
    }

    #[test]
    fn rejects_unbalanced_quotes() {
        let err = parse_dn("cn=\"unterminated").unwrap_err();
        assert!(matches!(err, Error::Dn(DnError::InvalidSyntax { .. })));
    }

    struct KnownCnOnly;
    impl crate::dn::normalize::SchemaView for KnownCnOnly {
        fn canonical_oid(&self, attr_type: &AttrType) -> Option<String> {
            match attr_type.as_str() {
                "cn" => Some("2.5.4.3".to_string()),
                _ => None,
            }
        }
        fn case_insensitive(&self, _attr_type: &AttrType) -> bool {
            false
        }
    }

    #[test]
    fn strict_mode_accepts_known_descriptor() {
        assert!(parse_dn_strict("cn=admin", &KnownCnOnly).is_ok());
    }

    #[test]
    fn strict_mode_accepts_numeric_oid_unconditionally() {
        assert!(parse_dn_strict("2.5.4.3=admin", &KnownCnOnly).is_ok());
    }

    #[test]
    fn strict_mode_rejects_unknown_descriptor() {
        let err = parse_dn_strict("ou=engineering", &KnownCnOnly).unwrap_err();
        match err {
            Error::Dn(DnError::UnknownAttributeType(name)) => assert_eq!(name, "ou"),
            other => panic!("expected UnknownAttributeType, got {other:?}"),
        }
    }

    #[test]
    fn non_strict_parse_dn_accepts_unknown_descriptors() {
        assert!(parse_dn("ou=engineering").is_ok());
    }
}
