//! Decoder configuration (spec §6)

/// Options recognized by the streaming TLV decoder.
///
/// The defaults match RFC 4511's expectations for a conforming LDAP client:
/// PDU size is unbounded, indefinite-length BER is rejected, and both the
/// tag and length octet counts are capped at the minimum needed for
/// single-byte tags and lengths, widened explicitly when a grammar needs
/// more (LDAP itself never does).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Upper bound on any decoded PDU, in bytes.
    pub max_pdu_size: u64,
    /// Whether the indefinite-length form (`0x80`) is accepted on decode.
    pub indefinite_length_allowed: bool,
    /// Hard cap on the number of tag octets a single TLV may use.
    pub max_tag_length: u32,
    /// Hard cap on the number of length octets (after the initial one) a
    /// single TLV's length may use.
    pub max_length_length: u32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        DecoderConfig {
            max_pdu_size: u64::MAX,
            indefinite_length_allowed: false,
            max_tag_length: 1,
            max_length_length: 1,
        }
    }
}
