//! Distinguished Name data model (spec component C5.1).
//!
//! A [`Dn`] is an ordered sequence of [`Rdn`]s, most-specific (leaf) first,
//! matching both RFC 4514's string form and the order attributes appear on
//! the wire. Each `Rdn` carries one or more [`Ava`]s (multi-valued RDNs are
//! rare but legal). `Display` renders the RFC 4514 string form; see
//! [`parser`] for the reverse direction and [`normalize`] for the
//! schema-aware canonical form.

pub mod normalize;
pub mod parser;

use std::fmt;

/// An attribute type, either a short descriptor (`cn`, `dc`) or a numeric
/// OID written out with dots. The `oid.` prefix RFC 2253 permits on the
/// numeric form is stripped during parsing and never re-added on output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttrType {
    Descriptor(String),
    Oid(String),
}

impl AttrType {
    pub fn as_str(&self) -> &str {
        match self {
            AttrType::Descriptor(s) => s,
            AttrType::Oid(s) => s,
        }
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An attribute value in an RDN: either the human-readable string form used
/// by `AttributeValue` syntax, or the raw bytes of a `#`-prefixed binary
/// value (already hex-decoded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvaValue {
    String(String),
    Bytes(Vec<u8>),
}

impl AvaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AvaValue::String(s) => Some(s),
            AvaValue::Bytes(_) => None,
        }
    }
}

/// One `type=value` pair within an RDN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ava {
    pub attr_type: AttrType,
    pub value: AvaValue,
}

impl Ava {
    pub fn new(attr_type: AttrType, value: AvaValue) -> Self {
        Ava { attr_type, value }
    }
}

impl fmt::Display for Ava {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=", self.attr_type)?;
        match &self.value {
            AvaValue::String(s) => f.write_str(&escape_string_value(s)),
            AvaValue::Bytes(b) => {
                f.write_str("#")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// A single Relative Distinguished Name: one or more AVAs joined by `+`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Rdn {
    pub avas: Vec<Ava>,
}

impl Rdn {
    pub fn single(ava: Ava) -> Self {
        Rdn { avas: vec![ava] }
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, ava) in self.avas.iter().enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            write!(f, "{ava}")?;
        }
        Ok(())
    }
}

/// A Distinguished Name: RDNs ordered from the leaf (most specific, leftmost
/// in string form) to the root.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dn {
    pub rdns: Vec<Rdn>,
}

impl Dn {
    pub fn new(rdns: Vec<Rdn>) -> Self {
        Dn { rdns }
    }

    pub fn is_empty(&self) -> bool {
        self.rdns.is_empty()
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rdn) in self.rdns.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{rdn}")?;
        }
        Ok(())
    }
}

/// Escape a string value per RFC 4514 §2.4: a leading `#` or space, a
/// trailing space, and any of `"+,;<>\` get a backslash; a NUL byte is
/// escaped as `\00`.
fn escape_string_value(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let chars: Vec<char> = s.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        let is_first = i == 0;
        let is_last = i == chars.len() - 1;
        match c {
            '"' | '+' | ',' | ';' | '<' | '>' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '#' if is_first => {
                out.push('\\');
                out.push(c);
            }
            ' ' if is_first || is_last => {
                out.push('\\');
                out.push(c);
            }
            '\0' => out.push_str("\\00"),
            _ => out.push(c),
        }
    }
    out
}
