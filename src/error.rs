//! Error types for the BER codec, the grammar engine, and the DN/filter parsers

/// Holds the result of a decode, encode, or parse operation.
pub type Result<T> = core::result::Result<T, Error>;

/// Malformed BER, per ITU-T X.690 as constrained by RFC 4511.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BerError {
    #[error("length extension byte 0xFF is reserved")]
    LengthExtensionReserved,
    #[error("length encoded in more than 4 octets")]
    LengthOverflow,
    #[error("tag mismatch: expected {expected:#04x}, found {found:#04x}")]
    TagMismatch { expected: u8, found: u8 },
    #[error("child TLV length exceeds parent's remaining expected length")]
    ValueTooLargeForParent,
    #[error("indefinite-length form is not allowed by this decoder's configuration")]
    IndefiniteLengthNotAllowed,
    #[error("declared PDU size {declared} exceeds configured maximum {max}")]
    PduSizeExceeded { declared: u64, max: u64 },
}

/// Grammar-engine level decode failures: the TLV was well-formed BER but
/// did not fit the grammar driving the decode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GrammarError {
    #[error("no transition from state {state} for tag {tag:#04x}")]
    NoTransitionForTag { state: u32, tag: u8 },
    #[error("PDU ended before reaching a valid grammar end state")]
    PrematurePduEnd,
    #[error("trailing bytes found after a complete PDU")]
    TrailingBytesAfterPdu,
    #[error("grammar action rejected the TLV: {0}")]
    ActionRejected(String),
}

/// RFC 4514 / RFC 2253 Distinguished Name syntax errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DnError {
    #[error("invalid DN syntax at byte {pos} in {source:?}")]
    InvalidSyntax { source: String, pos: usize },
    #[error("unknown attribute type {0:?}")]
    UnknownAttributeType(String),
}

/// RFC 4515 search-filter syntax errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("invalid filter syntax at byte {pos} in {source:?}")]
    InvalidSyntax { source: String, pos: usize },
    #[error("unrecognized filter choice tag {0:#04x}")]
    UnknownFilterTag(u8),
}

/// `LdapMessage`/`ProtocolOp` structural errors: the TLV tree was valid BER
/// and matched the envelope grammar, but didn't hold together as a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("unrecognized protocolOp tag {0:#04x}")]
    UnknownProtocolOpTag(u8),
    #[error("{context} is missing its required {field} field")]
    MissingField {
        context: &'static str,
        field: &'static str,
    },
    #[error("{context} has an unexpected child tag {tag:#04x}")]
    UnexpectedChildTag { context: &'static str, tag: u8 },
    #[error("LDAP string content is not valid UTF-8")]
    InvalidString,
}

/// The closed set of errors this crate can produce.
///
/// `Incomplete` is the only non-fatal variant: it means the decoder needs
/// more input bytes, and is handled at the streaming-decoder boundary. It
/// is never returned by the one-shot `decode` convenience wrappers, since
/// those have no further bytes to offer once their buffer is exhausted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("more input needed to complete the current TLV")]
    Incomplete,
    #[error(transparent)]
    Ber(#[from] BerError),
    #[error(transparent)]
    Grammar(#[from] GrammarError),
    #[error(transparent)]
    Dn(#[from] DnError),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Message(#[from] MessageError),
}
