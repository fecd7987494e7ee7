//! Search filter expression tree (spec component C5.2).
//!
//! `Filter` mirrors RFC 4511's `Filter` CHOICE directly: the constructors
//! here correspond one-to-one with its alternatives, and both [`text`]
//! (RFC 4515 string form) and [`codec`] (BER wire form) convert in either
//! direction without needing any other representation in between.

pub mod codec;
pub mod text;

/// An attribute value as carried in a filter: usually a UTF-8 string, but
/// kept as raw bytes since a filter can assert against an attribute whose
/// syntax isn't known at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionValue(pub Vec<u8>);

impl AssertionValue {
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }
}

impl From<&str> for AssertionValue {
    fn from(s: &str) -> Self {
        AssertionValue(s.as_bytes().to_vec())
    }
}

/// `type=value` pair asserted by an equality/ordering/approx match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeValueAssertion {
    pub attribute_desc: String,
    pub assertion_value: AssertionValue,
}

/// One `initial`/`any`/`final` fragment of a substring filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Substring {
    Initial(AssertionValue),
    Any(AssertionValue),
    Final(AssertionValue),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstringFilter {
    pub attr_type: String,
    pub substrings: Vec<Substring>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchingRuleAssertion {
    pub matching_rule: Option<String>,
    pub attribute_desc: Option<String>,
    pub assertion_value: AssertionValue,
    pub dn_attributes: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    EqualityMatch(AttributeValueAssertion),
    Substrings(SubstringFilter),
    GreaterOrEqual(AttributeValueAssertion),
    LessOrEqual(AttributeValueAssertion),
    Present(String),
    ApproxMatch(AttributeValueAssertion),
    ExtensibleMatch(MatchingRuleAssertion),
}
