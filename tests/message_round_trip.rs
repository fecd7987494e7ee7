//! Cross-module integration tests: DN parsing, filter text parsing, and the
//! full `LDAPMessage` codec exercised together the way a real client or
//! server would use them.

use hex_literal::hex;

use ldap_codec::control::Control;
use ldap_codec::dn::parser::parse_dn;
use ldap_codec::filter::text::parse_filter;
use ldap_codec::ldap::{
    AuthenticationChoice, BindRequest, DerefAliases, LdapDN, LdapMessage, LdapString, MessageID, ProtocolOp, SearchRequest,
    SearchScope,
};
use ldap_codec::{decode_message, encode_message};

#[test]
fn search_request_built_from_parsed_dn_and_filter_round_trips() {
    let base = parse_dn("dc=example,dc=com").unwrap();
    let filter = parse_filter("(&(objectClass=person)(cn=alice*))").unwrap();

    let msg = LdapMessage {
        message_id: MessageID(42),
        protocol_op: ProtocolOp::SearchRequest(SearchRequest {
            base_object: LdapDN::from(base.to_string()),
            scope: SearchScope::WholeSubtree,
            deref_aliases: DerefAliases::NeverDerefAliases,
            size_limit: 100,
            time_limit: 30,
            types_only: false,
            filter,
            attributes: vec![LdapString::from("cn"), LdapString::from("mail")],
        }),
        controls: None,
    };

    let encoded = encode_message(&msg);
    let decoded = decode_message(&encoded).unwrap();
    assert_eq!(decoded, msg);

    let ProtocolOp::SearchRequest(req) = &decoded.protocol_op else {
        panic!("expected SearchRequest");
    };
    assert_eq!(req.base_object.as_str(), "dc=example,dc=com");
}

#[test]
fn bind_request_with_controls_round_trips() {
    let msg = LdapMessage {
        message_id: MessageID(1),
        protocol_op: ProtocolOp::BindRequest(BindRequest {
            version: 3,
            name: LdapDN::from("cn=admin,dc=example,dc=com"),
            authentication: AuthenticationChoice::Simple(b"password".to_vec()),
        }),
        controls: Some(vec![Control::new(
            ldap_codec::control::oid::MANAGE_DSA_IT,
            true,
            None,
        )]),
    };

    let encoded = encode_message(&msg);
    assert_eq!(decode_message(&encoded).unwrap(), msg);
}

#[test]
fn decodes_literal_unbind_request_byte_sequence() {
    // LDAPMessage SEQUENCE { messageID INTEGER 7, [APPLICATION 2] NULL (UnbindRequest) }
    let buf = hex!("30 05 02 01 07 42 00");
    let msg = decode_message(&buf).unwrap();
    assert_eq!(msg.message_id, MessageID(7));
    assert_eq!(msg.protocol_op, ProtocolOp::UnbindRequest);
    assert_eq!(msg.controls, None);
}

#[test]
fn decodes_literal_abandon_request_byte_sequence() {
    // LDAPMessage SEQUENCE { messageID INTEGER 1, [APPLICATION 16] MessageID 5 }
    let buf = hex!("30 06 02 01 01 50 01 05");
    let msg = decode_message(&buf).unwrap();
    assert_eq!(msg.message_id, MessageID(1));
    assert_eq!(msg.protocol_op, ProtocolOp::AbandonRequest(MessageID(5)));
}

#[test]
fn chunked_feed_one_byte_at_a_time_matches_whole_buffer_decode() {
    let msg = LdapMessage {
        message_id: MessageID(3),
        protocol_op: ProtocolOp::DelRequest(LdapDN::from("cn=obsolete,dc=example,dc=com")),
        controls: None,
    };
    let encoded = encode_message(&msg);

    use ldap_codec::ber::tlv::{GrammarDriver, TlvDecoder, TlvNode, TlvOutcome};
    use ldap_codec::config::DecoderConfig;

    struct NullDriver;
    impl GrammarDriver for NullDriver {
        fn on_tlv_done(&mut self, _arena: &[TlvNode], _tlv: usize) -> ldap_codec::Result<bool> {
            Ok(true)
        }
    }

    let mut tlv = TlvDecoder::new(DecoderConfig::default());
    let mut driver = NullDriver;
    let mut fed = Vec::new();
    let mut outcome = None;
    for &byte in &encoded {
        fed.push(byte);
        match tlv.decode(&fed, &mut driver) {
            Ok(TlvOutcome::PduComplete) => {
                outcome = Some(());
                break;
            }
            Ok(TlvOutcome::MorePduBytesWanted) => continue,
            Err(ldap_codec::Error::Incomplete) => continue,
            Err(e) => panic!("unexpected decode error: {e:?}"),
        }
    }
    assert!(outcome.is_some(), "PDU never completed");
    let root = tlv.root().unwrap();
    assert!(tlv.node(root).is_complete());
}

#[test]
fn max_pdu_size_is_enforced_on_decode() {
    use ldap_codec::ber::tlv::{GrammarDriver, TlvDecoder, TlvNode};
    use ldap_codec::config::DecoderConfig;
    use ldap_codec::error::BerError;

    struct NullDriver;
    impl GrammarDriver for NullDriver {
        fn on_tlv_done(&mut self, _arena: &[TlvNode], _tlv: usize) -> ldap_codec::Result<bool> {
            Ok(true)
        }
    }

    let buf = hex!("04 05 68 65 6c 6c 6f"); // OCTET STRING "hello"
    let mut tlv = TlvDecoder::new(DecoderConfig {
        max_pdu_size: 3,
        ..DecoderConfig::default()
    });
    let mut driver = NullDriver;
    let err = tlv.decode(&buf, &mut driver).unwrap_err();
    assert_eq!(
        err,
        BerError::PduSizeExceeded { declared: 5, max: 3 }.into()
    );
}
