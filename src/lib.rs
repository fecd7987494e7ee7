//! # ldap-codec
//!
//! A streaming Lightweight Directory Access Protocol (LDAP) ([RFC4511]) BER
//! codec: distinguished names ([RFC4514]), search filters ([RFC4515]), and
//! the full `LDAPMessage`/`ProtocolOp` wire format, encoded and decoded
//! without pulling a parser-combinator grammar over the whole message at
//! once.
//!
//! The decoder is chunk-driven: [`ber::tlv::TlvDecoder`] holds a
//! monotonically advancing read position into a caller-owned buffer, so
//! partial PDUs across TCP reads resume instead of re-parsing from scratch.
//! [`message_grammar`] drives that TLV stream through a table of
//! `(state, tag)` transitions for the parts of an `LDAPMessage` whose shape
//! is known ahead of time; [`message_codec`] and [`filter::codec`] walk the
//! parsed TLV arena directly for the parts that aren't (a `protocolOp`'s own
//! fields, a filter tree).
//!
//! [RFC4511]: https://datatracker.ietf.org/doc/html/rfc4511
//! [RFC4514]: https://datatracker.ietf.org/doc/html/rfc4514
//! [RFC4515]: https://datatracker.ietf.org/doc/html/rfc4515

#![deny(unstable_features, unused_import_braces, unused_qualifications)]
#![warn(missing_debug_implementations, unreachable_pub)]
#![forbid(unsafe_code)]

pub mod ber;
pub mod config;
pub mod control;
pub mod dn;
pub mod error;
pub mod filter;
pub mod ldap;
pub mod message_codec;
pub mod message_grammar;

pub use config::DecoderConfig;
pub use error::{Error, Result};
pub use ldap::LdapMessage;
pub use message_codec::{decode_message, encode_message};
