//! RFC 4515 search filter string parser and formatter.
//!
//! The outer structure (`(`/`)`, `&`/`|`/`!` recursion) is parsed with
//! `nom`; an item's attribute/operator/value body is split out with a
//! manual escape-aware scan first; the `*`-splitting that distinguishes
//! `Present`/`Substrings`/`EqualityMatch` is the same technique applied a
//! second time to the value text.

use std::fmt;

use nom::character::complete::char;
use nom::multi::many1;
use nom::sequence::{delimited, preceded};
use nom::IResult;

use super::{AssertionValue, AttributeValueAssertion, Filter, MatchingRuleAssertion, Substring, SubstringFilter};
use crate::error::{FilterError, Result};

pub fn parse_filter(input: &str) -> Result<Filter> {
    match filter(input) {
        Ok(("", f)) => Ok(f),
        Ok((rest, _)) => Err(FilterError::InvalidSyntax {
            source: input.to_string(),
            pos: input.len() - rest.len(),
        }
        .into()),
        Err(_) => Err(FilterError::InvalidSyntax {
            source: input.to_string(),
            pos: 0,
        }
        .into()),
    }
}

fn filter(input: &str) -> IResult<&str, Filter> {
    delimited(char('('), filtercomp, char(')'))(input)
}

fn filtercomp(input: &str) -> IResult<&str, Filter> {
    if let Some(rest) = input.strip_prefix('&') {
        let (rest, items) = many1(filter)(rest)?;
        return Ok((rest, Filter::And(items)));
    }
    if let Some(rest) = input.strip_prefix('|') {
        let (rest, items) = many1(filter)(rest)?;
        return Ok((rest, Filter::Or(items)));
    }
    if let Some(rest) = input.strip_prefix('!') {
        let (rest, f) = filter(rest)?;
        return Ok((rest, Filter::Not(Box::new(f))));
    }
    item(input)
}

fn item(input: &str) -> IResult<&str, Filter> {
    let (body, rest) = split_unescaped_close_paren(input);
    let f = parse_item_body(body).map_err(|_| {
        nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Verify))
    })?;
    Ok((rest, f))
}

fn split_unescaped_close_paren(input: &str) -> (&str, &str) {
    let mut escaped = false;
    for (i, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            ')' => return (&input[..i], &input[i..]),
            _ => {}
        }
    }
    (input, "")
}

fn split_unescaped(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
        } else if c == sep {
            parts.push(&s[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&s[start..]);
    parts
}

fn parse_item_body(body: &str) -> std::result::Result<Filter, ()> {
    let eq_pos = find_unescaped(body, '=').ok_or(())?;
    let prefix = &body[..eq_pos];
    let value_raw = &body[eq_pos + 1..];

    if let Some(attr) = prefix.strip_suffix('~') {
        return Ok(Filter::ApproxMatch(assertion(attr, value_raw)?));
    }
    if let Some(attr) = prefix.strip_suffix('>') {
        return Ok(Filter::GreaterOrEqual(assertion(attr, value_raw)?));
    }
    if let Some(attr) = prefix.strip_suffix('<') {
        return Ok(Filter::LessOrEqual(assertion(attr, value_raw)?));
    }
    if let Some(markers) = prefix.strip_suffix(':') {
        return Ok(Filter::ExtensibleMatch(parse_extensible(markers, value_raw)?));
    }

    let attr = prefix.to_string();
    let stars = split_unescaped(value_raw, '*');
    if stars.len() == 1 {
        return Ok(Filter::EqualityMatch(AttributeValueAssertion {
            attribute_desc: attr,
            assertion_value: unescape_value(value_raw)?,
        }));
    }
    if stars.len() == 2 && stars[0].is_empty() && stars[1].is_empty() {
        return Ok(Filter::Present(attr));
    }
    let last = stars.len() - 1;
    let mut substrings = Vec::new();
    if !stars[0].is_empty() {
        substrings.push(Substring::Initial(unescape_value(stars[0])?));
    }
    for mid in &stars[1..last] {
        if !mid.is_empty() {
            substrings.push(Substring::Any(unescape_value(mid)?));
        }
    }
    if !stars[last].is_empty() {
        substrings.push(Substring::Final(unescape_value(stars[last])?));
    }
    Ok(Filter::Substrings(SubstringFilter {
        attr_type: attr,
        substrings,
    }))
}

fn assertion(attr: &str, value_raw: &str) -> std::result::Result<AttributeValueAssertion, ()> {
    Ok(AttributeValueAssertion {
        attribute_desc: attr.to_string(),
        assertion_value: unescape_value(value_raw)?,
    })
}

fn parse_extensible(markers: &str, value_raw: &str) -> std::result::Result<MatchingRuleAssertion, ()> {
    let mut segments = markers.split(':');
    let attr = segments.next().unwrap_or("");
    let mut dn_attributes = false;
    let mut matching_rule = None;
    for seg in segments {
        if seg == "dn" {
            dn_attributes = true;
        } else if !seg.is_empty() {
            matching_rule = Some(seg.to_string());
        }
    }
    if attr.is_empty() {
        tracing::trace!("extensible match with no attribute description, matching rule only");
    }
    Ok(MatchingRuleAssertion {
        matching_rule,
        attribute_desc: if attr.is_empty() { None } else { Some(attr.to_string()) },
        assertion_value: unescape_value(value_raw)?,
        dn_attributes,
    })
}

fn find_unescaped(s: &str, needle: char) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
        } else if c == needle {
            return Some(i);
        }
    }
    None
}

/// Resolve `\XX` hex escapes (the only escape form RFC 4515 defines) into
/// raw bytes.
fn unescape_value(s: &str) -> std::result::Result<AssertionValue, ()> {
    let chars: Vec<char> = s.chars().collect();
    let mut out = Vec::with_capacity(s.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' {
            if i + 2 < chars.len() && chars[i + 1].is_ascii_hexdigit() && chars[i + 2].is_ascii_hexdigit() {
                let hex: String = chars[i + 1..i + 3].iter().collect();
                out.push(u8::from_str_radix(&hex, 16).map_err(|_| ())?);
                i += 3;
                continue;
            }
            return Err(());
        }
        let mut buf = [0u8; 4];
        out.extend_from_slice(chars[i].encode_utf8(&mut buf).as_bytes());
        i += 1;
    }
    Ok(AssertionValue(out))
}

/// Escape `*`, `(`, `)`, `\` and NUL as `\XX`; everything else passes
/// through unchanged when it is valid UTF-8, or gets hex-escaped entirely
/// when it isn't.
fn escape_value(value: &AssertionValue) -> String {
    match std::str::from_utf8(&value.0) {
        Ok(s) => {
            let mut out = String::with_capacity(s.len());
            for c in s.chars() {
                match c {
                    '*' | '(' | ')' | '\\' => {
                        out.push('\\');
                        out.push_str(&format!("{:02x}", c as u32));
                    }
                    '\0' => out.push_str("\\00"),
                    _ => out.push(c),
                }
            }
            out
        }
        Err(_) => value.0.iter().map(|b| format!("\\{b:02x}")).collect(),
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(items) => {
                f.write_str("(&")?;
                for item in items {
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Filter::Or(items) => {
                f.write_str("(|")?;
                for item in items {
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Filter::Not(inner) => write!(f, "(!{inner})"),
            Filter::EqualityMatch(ava) => write!(f, "({}={})", ava.attribute_desc, escape_value(&ava.assertion_value)),
            Filter::GreaterOrEqual(ava) => write!(f, "({}>={})", ava.attribute_desc, escape_value(&ava.assertion_value)),
            Filter::LessOrEqual(ava) => write!(f, "({}<={})", ava.attribute_desc, escape_value(&ava.assertion_value)),
            Filter::ApproxMatch(ava) => write!(f, "({}~={})", ava.attribute_desc, escape_value(&ava.assertion_value)),
            Filter::Present(attr) => write!(f, "({attr}=*)"),
            Filter::Substrings(sf) => {
                write!(f, "({}=", sf.attr_type)?;
                for s in &sf.substrings {
                    match s {
                        Substring::Initial(v) => write!(f, "{}*", escape_value(v))?,
                        Substring::Any(v) => write!(f, "*{}*", escape_value(v))?,
                        Substring::Final(v) => write!(f, "*{}", escape_value(v))?,
                    }
                }
                f.write_str(")")
            }
            Filter::ExtensibleMatch(mra) => {
                f.write_str("(")?;
                if let Some(attr) = &mra.attribute_desc {
                    f.write_str(attr)?;
                }
                if mra.dn_attributes {
                    f.write_str(":dn")?;
                }
                if let Some(rule) = &mra.matching_rule {
                    write!(f, ":{rule}")?;
                }
                write!(f, ":={})", escape_value(&mra.assertion_value))
            }
        }
    }
}
