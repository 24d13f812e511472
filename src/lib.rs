//! A sans-I/O AMQP 0-9-1 protocol engine.
//!
//! This crate implements the wire protocol and state machines of AMQP
//! 0-9-1 — frames, the type system, the method catalog, content handling,
//! SASL, and the connection/channel engines — without touching a socket.
//! The host owns I/O: feed inbound bytes in with [`connection::Connection::feed`],
//! drain bytes to write out with [`connection::Connection::data_to_send`].
//!
//! # Quick start
//!
//! ```rust
//! use amqp091_proto::connection::{Connection, ConnectionConfigBuilder};
//!
//! let config = ConnectionConfigBuilder::new()
//!     .virtual_host("/")
//!     .credentials("guest", "guest")
//!     .build();
//! let mut conn = Connection::new(config);
//! conn.open();
//! let bytes_to_write = conn.data_to_send();
//! assert_eq!(&bytes_to_write[..4], b"AMQP");
//! ```
//!
//! # Architecture
//!
//! - **`types`**: the AMQP domain/primitive type system (field tables, decimals, short/long strings).
//! - **`reply`**: reply codes and the `AmqpException` carried by soft and hard errors.
//! - **`error`**: the crate's `AmqpError`/`AmqpResult`.
//! - **`codec`**: frame and primitive-type wire encoding.
//! - **`content`**: the Basic content-header properties codec and body chunking.
//! - **`methods`**: the method catalog — every class/method's fields, metadata, and wire codec.
//! - **`auth`**: SASL PLAIN/AMQPLAIN mechanisms used during the handshake.
//! - **`channel`**: the per-channel engine (declare/bind/publish/consume/confirm state machines).
//! - **`connection`**: the connection engine (handshake, tuning, channel allocation, heartbeats, frame routing).

pub mod auth;
pub mod channel;
pub mod codec;
pub mod connection;
pub mod content;
pub mod error;
pub mod methods;
pub mod reply;
pub mod types;

pub use auth::{Credentials, SaslMechanism};
pub use channel::{Channel, ChannelEvent, ChannelState};
pub use connection::{Connection, ConnectionConfig, ConnectionConfigBuilder, ConnectionEvent, ConnectionState};
pub use content::{BasicProperties, Content, ContentHeader};
pub use error::{AmqpError, AmqpResult};
pub use methods::Method;
pub use reply::{AmqpException, ReplyCode};
pub use types::{Decimal, FieldTable, FieldValue};

/// Re-export of the crate's most commonly used types.
pub mod prelude {
    pub use crate::{
        AmqpError, AmqpException, AmqpResult, BasicProperties, Channel, ChannelEvent,
        ChannelState, Connection, ConnectionConfig, ConnectionConfigBuilder, ConnectionEvent,
        ConnectionState, Content, ContentHeader, Credentials, Decimal, FieldTable, FieldValue,
        Method, ReplyCode, SaslMechanism,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_config_defaults_match_the_protocol() {
        let config = ConnectionConfig::default();
        assert_eq!(config.virtual_host, "/");
        assert_eq!(config.protocol_major, 0);
        assert_eq!(config.protocol_minor, 9);
        assert_eq!(config.locale, "en_US");
        assert_eq!(config.heartbeat_secs, 60);
    }

    #[test]
    fn prelude_exposes_the_handshake_types() {
        let config = ConnectionConfigBuilder::new().build();
        let conn = Connection::new(config);
        assert_eq!(conn.state(), ConnectionState::Initial);
    }
}
