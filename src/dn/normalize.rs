//! Schema-aware DN normalization.
//!
//! Normalization needs three things only a schema can supply: the
//! canonical OID for an attribute type, whether that type's values should
//! be case-folded, and the equality-matching-rule normalization of a
//! value. [`SchemaView`] is the narrow collaborator interface this module
//! consumes rather than depending on a full schema subsystem.

use super::{Ava, AttrType, AvaValue, Dn, Rdn};

/// Everything DN normalization needs to know about an attribute type.
pub trait SchemaView {
    /// The canonical numeric OID for `attr_type`, if the schema knows it.
    /// Falls back to the type's own string form when unknown.
    fn canonical_oid(&self, attr_type: &AttrType) -> Option<String>;

    /// Whether values of `attr_type` are case-insensitive for equality.
    fn case_insensitive(&self, attr_type: &AttrType) -> bool;

    /// Apply the type's equality-matching-rule value normalization (e.g.
    /// collapsing internal whitespace runs for `caseIgnoreMatch`). The
    /// default passes the value through unchanged.
    fn normalize_value(&self, attr_type: &AttrType, value: &str) -> String {
        let _ = attr_type;
        value.to_string()
    }
}

/// A `SchemaView` that treats every attribute type as unknown: no OID
/// substitution, no case folding, no value transformation. Useful when no
/// schema is available and normalization should still produce a
/// syntactically canonical (if not semantically canonical) form.
pub struct NullSchema;

impl SchemaView for NullSchema {
    fn canonical_oid(&self, _attr_type: &AttrType) -> Option<String> {
        None
    }

    fn case_insensitive(&self, _attr_type: &AttrType) -> bool {
        false
    }
}

/// Normalize `dn` against `schema`. Within each RDN, AVAs are reordered by
/// their canonical OID; attribute types are substituted with their
/// canonical OID where the schema knows one, and string values pass
/// through the schema's equality-matching-rule normalization (case folding
/// included).
pub fn normalize(dn: &Dn, schema: &impl SchemaView) -> Dn {
    let rdns = dn
        .rdns
        .iter()
        .map(|rdn| normalize_rdn(rdn, schema))
        .collect();
    Dn::new(rdns)
}

fn normalize_rdn(rdn: &Rdn, schema: &impl SchemaView) -> Rdn {
    let mut avas: Vec<Ava> = rdn.avas.iter().map(|ava| normalize_ava(ava, schema)).collect();
    avas.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
    Rdn { avas }
}

fn normalize_ava(ava: &Ava, schema: &impl SchemaView) -> Ava {
    // Attribute descriptors are case-insensitive (RFC 4512 §2.5) regardless
    // of whether the schema can resolve one to a canonical OID, so the fold
    // below must not be gated on `canonical_oid` returning `Some`.
    let attr_type = match schema.canonical_oid(&ava.attr_type) {
        Some(oid) => AttrType::Oid(oid),
        None => match &ava.attr_type {
            AttrType::Descriptor(name) => AttrType::Descriptor(name.to_lowercase()),
            AttrType::Oid(oid) => AttrType::Oid(oid.clone()),
        },
    };
    let value = match &ava.value {
        AvaValue::String(s) => {
            let normalized = schema.normalize_value(&ava.attr_type, s);
            let normalized = if schema.case_insensitive(&ava.attr_type) {
                normalized.to_lowercase()
            } else {
                normalized
            };
            AvaValue::String(normalized)
        }
        AvaValue::Bytes(b) => AvaValue::Bytes(b.clone()),
    };
    Ava::new(attr_type, value)
}

/// Orders resolved OIDs numerically component-by-component (so `2.5.4.11`
/// sorts after `2.5.4.3`, unlike a plain string compare), with any
/// unresolved descriptor sorting after every numeric OID.
fn sort_key(ava: &Ava) -> (bool, Vec<u32>, String) {
    match &ava.attr_type {
        AttrType::Oid(oid) => {
            let parts = oid.split('.').filter_map(|p| p.parse().ok()).collect();
            (false, parts, String::new())
        }
        AttrType::Descriptor(name) => (true, Vec::new(), name.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dn::parser::parse_dn;

    struct TitleCaseOid;
    impl SchemaView for TitleCaseOid {
        fn canonical_oid(&self, attr_type: &AttrType) -> Option<String> {
            match attr_type.as_str() {
                "cn" => Some("2.5.4.3".to_string()),
                "ou" => Some("2.5.4.11".to_string()),
                _ => None,
            }
        }

        fn case_insensitive(&self, _attr_type: &AttrType) -> bool {
            true
        }
    }

    #[test]
    fn substitutes_canonical_oid() {
        let dn = parse_dn("cn=Admin").unwrap();
        let normalized = normalize(&dn, &TitleCaseOid);
        assert_eq!(normalized.rdns[0].avas[0].attr_type, AttrType::Oid("2.5.4.3".into()));
        assert_eq!(normalized.rdns[0].avas[0].value.as_str(), Some("admin"));
    }

    #[test]
    fn orders_multi_valued_rdn_by_oid() {
        let dn = parse_dn("ou=b+cn=a").unwrap();
        let normalized = normalize(&dn, &TitleCaseOid);
        // Numeric OID compare: 2.5.4.3 < 2.5.4.11 at the last component,
        // even though "2.5.4.11" < "2.5.4.3" as plain strings.
        assert_eq!(normalized.rdns[0].avas[0].attr_type, AttrType::Oid("2.5.4.3".into()));
        assert_eq!(normalized.rdns[0].avas[1].attr_type, AttrType::Oid("2.5.4.11".into()));
    }

    #[test]
    fn is_idempotent() {
        let dn = parse_dn("cn=Admin,dc=Example,dc=Com").unwrap();
        let once = normalize(&dn, &TitleCaseOid);
        let twice = normalize(&once, &TitleCaseOid);
        assert_eq!(once, twice);
    }

    #[test]
    fn component_order_insensitive_under_schema() {
        let a = normalize(&parse_dn("ou=b+cn=a").unwrap(), &TitleCaseOid);
        let b = normalize(&parse_dn("cn=a+ou=b").unwrap(), &TitleCaseOid);
        assert_eq!(a, b);
    }

    #[test]
    fn null_schema_still_normalizes_syntactically() {
        let dn = parse_dn("cn=Admin").unwrap();
        let normalized = normalize(&dn, &NullSchema);
        assert_eq!(normalized, dn);
    }

    #[test]
    fn unresolved_descriptor_case_folds_under_null_schema() {
        let upper = normalize(&parse_dn("CN=Admin").unwrap(), &NullSchema);
        let lower = normalize(&parse_dn("cn=Admin").unwrap(), &NullSchema);
        assert_eq!(upper, lower);
    }

    #[test]
    fn unresolved_descriptor_case_folds_under_schema_with_gaps() {
        // TitleCaseOid resolves "cn"/"ou" but not "sn" — the unresolved
        // type must still fold, independent of canonical_oid returning None.
        let upper = normalize(&parse_dn("SN=Admin").unwrap(), &TitleCaseOid);
        let lower = normalize(&parse_dn("sn=Admin").unwrap(), &TitleCaseOid);
        assert_eq!(upper, lower);
        assert_eq!(upper.rdns[0].avas[0].attr_type, AttrType::Descriptor("sn".into()));
    }
}
