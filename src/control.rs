//! `Control` (RFC 4511 §4.1.11) and the well-known-control OID registry.
//!
//! The registry only ever needs to answer "is this OID one the core
//! recognizes, and if so what's it called", the same shape as the
//! `once_cell`-backed static tables other ASN.1-adjacent crates in this
//! corpus keep for their dictionaries. A `RwLock` guards it rather than
//! building it once at compile time, since callers may register
//! vendor-private controls after startup.

use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;

use crate::ldap::LdapOID;

/// One LDAP control as carried in a message's `controls` field.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Control {
    pub control_type: LdapOID,
    pub criticality: bool,
    pub control_value: Option<Vec<u8>>,
}

impl Control {
    pub fn new(control_type: impl Into<LdapOID>, criticality: bool, control_value: Option<Vec<u8>>) -> Self {
        Control {
            control_type: control_type.into(),
            criticality,
            control_value,
        }
    }

    /// The human-readable name of this control's OID, if it's registered.
    pub fn known_name(&self) -> Option<&'static str> {
        lookup(self.control_type.as_str())
    }
}

/// Dotted-decimal OIDs for the controls spec'd out in RFC 4511's companion
/// RFCs. `CASCADE` is deliberately absent: unlike the others, no single OID
/// for a "cascade" control has ever been assigned consistently across
/// directory server implementations, so a caller that needs one should
/// register it explicitly via [`register`].
pub mod oid {
    /// Server-side sort request (RFC 2891).
    pub const SERVER_SIDE_SORT_REQUEST: &str = "1.2.840.113556.1.4.473";
    /// Server-side sort response (RFC 2891).
    pub const SERVER_SIDE_SORT_RESPONSE: &str = "1.2.840.113556.1.4.474";
    /// Simple paged results (RFC 2696).
    pub const PAGED_RESULTS: &str = "1.2.840.113556.1.4.319";
    /// Persistent search (draft-ietf-ldapext-psearch).
    pub const PERSISTENT_SEARCH: &str = "2.16.840.1.113730.3.4.3";
    /// Entry change notification, returned alongside persistent search
    /// results (draft-ietf-ldapext-psearch).
    pub const ENTRY_CHANGE_NOTIFICATION: &str = "2.16.840.1.113730.3.4.7";
    /// `manageDsaIT` (RFC 3296).
    pub const MANAGE_DSA_IT: &str = "2.16.840.1.113730.3.4.2";
    /// Proxy authorization (RFC 4370).
    pub const PROXIED_AUTHORIZATION: &str = "2.16.840.1.113730.3.4.18";
    /// Subentries (RFC 3672).
    pub const SUBENTRIES: &str = "1.3.6.1.4.1.4203.1.10.1";
}

static REGISTRY: Lazy<RwLock<HashMap<&'static str, &'static str>>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(oid::SERVER_SIDE_SORT_REQUEST, "serverSideSortRequest");
    m.insert(oid::SERVER_SIDE_SORT_RESPONSE, "serverSideSortResponse");
    m.insert(oid::PAGED_RESULTS, "pagedResults");
    m.insert(oid::PERSISTENT_SEARCH, "persistentSearch");
    m.insert(oid::ENTRY_CHANGE_NOTIFICATION, "entryChangeNotification");
    m.insert(oid::MANAGE_DSA_IT, "manageDsaIT");
    m.insert(oid::PROXIED_AUTHORIZATION, "proxiedAuthorization");
    m.insert(oid::SUBENTRIES, "subentries");
    RwLock::new(m)
});

/// Look up the registered name for `control_oid`, if any.
pub fn lookup(control_oid: &str) -> Option<&'static str> {
    REGISTRY.read().unwrap().get(control_oid).copied()
}

/// Register a control OID under `name`, e.g. a vendor-private control or a
/// site-specific `cascade` OID. Registering the same OID twice overwrites
/// the earlier name; callers should register once at startup and never
/// remove an entry while decoders may be running, per the crate's
/// read-mostly registry contract.
pub fn register(control_oid: &'static str, name: &'static str) {
    REGISTRY.write().unwrap().insert(control_oid, name);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_control_resolves_its_name() {
        let c = Control::new(oid::MANAGE_DSA_IT, true, None);
        assert_eq!(c.known_name(), Some("manageDsaIT"));
    }

    #[test]
    fn unknown_control_has_no_name() {
        let c = Control::new("1.2.3.4.5.6.7", false, None);
        assert_eq!(c.known_name(), None);
    }

    #[test]
    fn can_register_a_vendor_control_at_runtime() {
        register("1.3.6.1.4.1.99999.1.1", "cascade");
        assert_eq!(lookup("1.3.6.1.4.1.99999.1.1"), Some("cascade"));
    }
}
