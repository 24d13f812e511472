//! SASL authentication mechanisms used during the `Connection.Start`/
//! `Connection.Secure` handshake.
//!
//! Only the two mechanisms every broker accepts without a TLS-terminated
//! identity are implemented: `PLAIN` and `AMQPLAIN`. `EXTERNAL` is not
//! offered since it depends on a transport-level identity this crate,
//! being sans-I/O, has no access to.

use crate::codec;
use crate::types::FieldValue;
use bytes::BytesMut;

/// A credential set that can produce SASL responses for a chosen mechanism.
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl Credentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            login: login.into(),
            password: password.into(),
        }
    }
}

/// One of the mechanisms this crate can answer a server's `mechanisms`
/// offer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaslMechanism {
    Plain,
    AmqPlain,
}

impl SaslMechanism {
    /// Pick the strongest mechanism this crate supports out of the
    /// space-separated list the server advertised in `Connection.Start`.
    pub fn negotiate(server_mechanisms: &str) -> Option<Self> {
        let offered: Vec<&str> = server_mechanisms.split(' ').collect();
        if offered.contains(&"PLAIN") {
            Some(SaslMechanism::Plain)
        } else if offered.contains(&"AMQPLAIN") {
            Some(SaslMechanism::AmqPlain)
        } else {
            None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SaslMechanism::Plain => "PLAIN",
            SaslMechanism::AmqPlain => "AMQPLAIN",
        }
    }

    /// The bytes to send as `Connection.StartOk`'s `response` field.
    pub fn initial_response(&self, credentials: &Credentials) -> Vec<u8> {
        match self {
            SaslMechanism::Plain => {
                // \0login\0password, per RFC 4616.
                let mut out = Vec::with_capacity(credentials.login.len() + credentials.password.len() + 2);
                out.push(0u8);
                out.extend_from_slice(credentials.login.as_bytes());
                out.push(0u8);
                out.extend_from_slice(credentials.password.as_bytes());
                out
            }
            SaslMechanism::AmqPlain => {
                let mut table = crate::types::FieldTable::new();
                table.insert("LOGIN".to_string(), FieldValue::LongString(credentials.login.clone()));
                table.insert(
                    "PASSWORD".to_string(),
                    FieldValue::LongString(credentials.password.clone()),
                );
                let mut buf = BytesMut::new();
                codec::encode_table(&mut buf, &table);
                // AMQPLAIN's response is the table body without its own
                // length prefix re-added by the caller; the 4-byte prefix
                // `encode_table` already wrote is exactly what belongs here.
                buf.to_vec()
            }
        }
    }

    /// This crate never offers a mechanism that expects a `Secure`
    /// challenge/response round, so any `Connection.Secure` received is a
    /// protocol violation on the broker's part.
    pub fn handle_challenge(&self, _challenge: &[u8]) -> Option<Vec<u8>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_response_is_null_separated() {
        let creds = Credentials::new("guest", "guest");
        let response = SaslMechanism::Plain.initial_response(&creds);
        assert_eq!(response, b"\0guest\0guest");
    }

    #[test]
    fn amqplain_response_is_a_field_table() {
        let creds = Credentials::new("guest", "guest");
        let response = SaslMechanism::AmqPlain.initial_response(&creds);
        let mut buf = bytes::Bytes::copy_from_slice(&response);
        let table = codec::decode_table(&mut buf).unwrap();
        assert_eq!(
            table.get("LOGIN"),
            Some(&FieldValue::LongString("guest".to_string()))
        );
        assert_eq!(
            table.get("PASSWORD"),
            Some(&FieldValue::LongString("guest".to_string()))
        );
    }

    #[test]
    fn negotiate_prefers_plain_over_amqplain() {
        assert_eq!(
            SaslMechanism::negotiate("AMQPLAIN PLAIN"),
            Some(SaslMechanism::Plain)
        );
        assert_eq!(
            SaslMechanism::negotiate("AMQPLAIN"),
            Some(SaslMechanism::AmqPlain)
        );
        assert_eq!(SaslMechanism::negotiate("GSSAPI"), None);
    }

    #[test]
    fn handle_challenge_is_always_unsupported() {
        assert_eq!(SaslMechanism::Plain.handle_challenge(b"anything"), None);
    }
}
