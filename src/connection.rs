//! The sans-I/O connection engine: protocol handshake, tuning negotiation,
//! channel allocation, frame routing, and heartbeat scheduling.
//!
//! Nothing in this module touches a socket. The host feeds inbound bytes in
//! with [`Connection::feed`] and drains outbound bytes with
//! [`Connection::data_to_send`]; everything else — opening channels,
//! publishing, consuming — goes through the [`crate::channel::Channel`]
//! values this connection owns, with [`Connection::send_method`] and
//! [`Connection::send_content`] doing the framing.
//!
//! # Examples
//!
//! ```rust
//! use amqp091_proto::connection::{Connection, ConnectionConfigBuilder};
//!
//! let config = ConnectionConfigBuilder::new()
//!     .virtual_host("/")
//!     .build();
//! let mut conn = Connection::new(config);
//! conn.open();
//! let header = conn.data_to_send();
//! assert_eq!(&header[..4], b"AMQP");
//! ```

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::auth::{Credentials, SaslMechanism};
use crate::channel::{Channel, ChannelEvent};
use crate::codec::{self, DecodeOutcome, FrameKind, PROTOCOL_HEADER};
use crate::content::{self, ContentHeader};
use crate::error::{AmqpError, AmqpResult};
use crate::methods::{self, Method};
use crate::reply::{AmqpException, ReplyCode};
use crate::types::FieldTable;

/// Connection lifecycle state (AMQP 0-9-1 §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Initial,
    HeaderSent,
    Started,
    TuningSent,
    Open,
    Closing,
    Closed,
}

/// Negotiated tuning parameters, fixed once `Connection.Tune` completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tuning {
    pub channel_max: u16,
    pub frame_max: u32,
    pub heartbeat: u16,
}

/// Connection configuration (AMQP 0-9-1 §6).
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub virtual_host: String,
    pub protocol_major: u8,
    pub protocol_minor: u8,
    pub client_properties: FieldTable,
    pub locale: String,
    pub credentials: Credentials,
    pub channel_max: u16,
    pub frame_max: u32,
    pub heartbeat_secs: u16,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        let mut client_properties = FieldTable::new();
        client_properties.insert(
            "product".to_string(),
            crate::types::FieldValue::LongString("amqp091-proto".to_string()),
        );
        client_properties.insert(
            "platform".to_string(),
            crate::types::FieldValue::LongString("rust".to_string()),
        );
        ConnectionConfig {
            virtual_host: "/".to_string(),
            protocol_major: 0,
            protocol_minor: 9,
            client_properties,
            locale: "en_US".to_string(),
            credentials: Credentials::new("guest", "guest"),
            channel_max: 0,
            frame_max: 0,
            heartbeat_secs: 60,
        }
    }
}

/// Fluent builder for [`ConnectionConfig`], following this crate's usual
/// `XxxBuilder` convention.
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    pub fn new() -> Self {
        ConnectionConfigBuilder::default()
    }

    pub fn virtual_host(mut self, virtual_host: impl Into<String>) -> Self {
        self.config.virtual_host = virtual_host.into();
        self
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.config.locale = locale.into();
        self
    }

    pub fn credentials(mut self, login: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.credentials = Credentials::new(login, password);
        self
    }

    pub fn channel_max(mut self, channel_max: u16) -> Self {
        self.config.channel_max = channel_max;
        self
    }

    pub fn frame_max(mut self, frame_max: u32) -> Self {
        self.config.frame_max = frame_max;
        self
    }

    pub fn heartbeat_secs(mut self, heartbeat_secs: u16) -> Self {
        self.config.heartbeat_secs = heartbeat_secs;
        self
    }

    pub fn client_property(mut self, key: impl Into<String>, value: crate::types::FieldValue) -> Self {
        self.config.client_properties.insert(key.into(), value);
        self
    }

    pub fn build(self) -> ConnectionConfig {
        self.config
    }
}

/// Events surfaced from [`Connection::feed`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Opened,
    Channel { channel_id: u16, event: ChannelEvent },
    Closed { exception: Option<AmqpException> },
}

fn min_nonzero(a: u16, b: u16) -> u16 {
    match (a, b) {
        (0, 0) => 0,
        (0, x) | (x, 0) => x,
        (a, b) => a.min(b),
    }
}

fn negotiate_u16(client: u16, server: u16) -> u16 {
    if client == 0 || server == 0 {
        client.max(server)
    } else {
        client.min(server)
    }
}

fn negotiate_u32(client: u32, server: u32) -> u32 {
    if client == 0 || server == 0 {
        client.max(server)
    } else {
        client.min(server)
    }
}

/// The connection engine.
pub struct Connection {
    state: ConnectionState,
    config: ConnectionConfig,
    mechanism: Option<SaslMechanism>,
    tuning: Tuning,
    channels: HashMap<u16, Channel>,
    next_channel_id: u16,
    inbound: Vec<u8>,
    outbound: Vec<u8>,
    last_send: Option<Instant>,
    last_recv: Option<Instant>,
}

impl Connection {
    pub fn new(config: ConnectionConfig) -> Self {
        Connection {
            state: ConnectionState::Initial,
            config,
            mechanism: None,
            tuning: Tuning::default(),
            channels: HashMap::new(),
            next_channel_id: 1,
            inbound: Vec::new(),
            outbound: Vec::new(),
            last_send: None,
            last_recv: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn tuning(&self) -> Tuning {
        self.tuning
    }

    /// Begin the handshake: enqueue the protocol header.
    pub fn open(&mut self) {
        if self.state != ConnectionState::Initial {
            return;
        }
        log::debug!("sending protocol header");
        self.outbound.extend_from_slice(&PROTOCOL_HEADER);
        self.state = ConnectionState::HeaderSent;
    }

    /// Enqueue `Connection.Close` and transition to `Closing`.
    pub fn begin_close(&mut self, reply_code: u16, reply_text: impl Into<String>) -> AmqpResult<()> {
        if self.state != ConnectionState::Open {
            return Err(AmqpError::invalid_state("connection is not open"));
        }
        self.state = ConnectionState::Closing;
        let method = Method::ConnectionClose {
            reply_code,
            reply_text: reply_text.into(),
            class_id: 0,
            method_id: 0,
        };
        self.frame_and_send(0, &method);
        Ok(())
    }

    /// Allocate a new channel id (`<= channel_max`, never reused) and
    /// enqueue `Channel.Open` for it.
    pub fn open_channel(&mut self) -> AmqpResult<u16> {
        if self.state != ConnectionState::Open {
            return Err(AmqpError::invalid_state("connection is not open"));
        }
        let id = self.next_channel_id;
        let ceiling = if self.tuning.channel_max == 0 {
            u16::MAX
        } else {
            self.tuning.channel_max
        };
        if id > ceiling {
            return Err(AmqpError::resource("channel_max exceeded"));
        }
        self.next_channel_id = self.next_channel_id.saturating_add(1);
        let mut channel = Channel::new(id);
        let method = channel.begin_open()?;
        self.channels.insert(id, channel);
        self.frame_and_send(id, &method);
        Ok(id)
    }

    pub fn channel_mut(&mut self, id: u16) -> Option<&mut Channel> {
        self.channels.get_mut(&id)
    }

    /// Frame a method built by a `Channel::begin_*` call and enqueue it.
    pub fn send_method(&mut self, channel_id: u16, method: &Method) {
        self.frame_and_send(channel_id, method);
    }

    /// Frame and enqueue a content header plus its body chunks, as produced
    /// by `Channel::begin_basic_publish`.
    pub fn send_content(&mut self, channel_id: u16, header: &ContentHeader, chunks: &[Vec<u8>]) {
        let header_bytes = content::encode_content_header(header);
        self.outbound
            .extend(codec::encode_frame(FrameKind::ContentHeader, channel_id, &header_bytes));
        for chunk in chunks {
            self.outbound
                .extend(codec::encode_frame(FrameKind::ContentBody, channel_id, chunk));
        }
    }

    fn frame_and_send(&mut self, channel_id: u16, method: &Method) {
        let (class_id, method_id) = method.class_and_method();
        let mut payload = Vec::with_capacity(4);
        payload.extend_from_slice(&class_id.to_be_bytes());
        payload.extend_from_slice(&method_id.to_be_bytes());
        payload.extend(methods::encode_method(method));
        self.outbound
            .extend(codec::encode_frame(FrameKind::Method, channel_id, &payload));
    }

    /// Drain the outbound buffer.
    pub fn data_to_send(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outbound)
    }

    /// Feed inbound bytes; decodes as many complete frames as are present
    /// and returns the events they produced, in order. A hard protocol
    /// error encountered partway through a batch of frames does not discard
    /// the events already produced by earlier frames in the same batch: it
    /// is appended as a final `Closed` event and processing of this batch
    /// stops there.
    pub fn feed(&mut self, bytes: &[u8], now: Instant) -> Vec<ConnectionEvent> {
        self.last_recv = Some(now);
        self.inbound.extend_from_slice(bytes);
        let mut events = Vec::new();
        loop {
            match codec::decode_frame(&self.inbound) {
                DecodeOutcome::Frame(frame, consumed) => {
                    self.inbound.drain(..consumed);
                    if let Err(e) = self.handle_frame(frame, &mut events) {
                        self.fail_hard_from(&mut events, e);
                        break;
                    }
                }
                DecodeOutcome::Incomplete => break,
                DecodeOutcome::BadFrame(e) => {
                    self.fail_hard_from(&mut events, e);
                    break;
                }
            }
        }
        events
    }

    /// Record a locally detected hard protocol error: notify the peer with
    /// `Connection.Close`, transition to `Closed`, and append the
    /// corresponding event so callers never lose track of why the
    /// connection ended (§7).
    fn fail_hard(&mut self, events: &mut Vec<ConnectionEvent>, reply_code: ReplyCode, reply_text: impl Into<String>) -> AmqpError {
        let reply_text = reply_text.into();
        let exception = AmqpException::new(reply_code, reply_text.clone());
        if self.state != ConnectionState::Closed {
            let close = Method::ConnectionClose {
                reply_code: reply_code.code_num(),
                reply_text,
                class_id: 0,
                method_id: 0,
            };
            self.frame_and_send(0, &close);
        }
        self.state = ConnectionState::Closed;
        events.push(ConnectionEvent::Closed {
            exception: Some(exception.clone()),
        });
        AmqpError::amqp(exception)
    }

    /// Same as [`Self::fail_hard`] but starting from an already-built
    /// `AmqpError`, reusing its reply code when it carries one.
    fn fail_hard_from(&mut self, events: &mut Vec<ConnectionEvent>, err: AmqpError) -> AmqpError {
        match err.exception() {
            Some(exc) => self.fail_hard(events, exc.reply_code, exc.reply_text.clone()),
            None => {
                let reply_code = ReplyCode::from_code(err.error_code_num()).unwrap_or(ReplyCode::InternalError);
                let text = err.to_string();
                self.fail_hard(events, reply_code, text)
            }
        }
    }

    fn handle_frame(&mut self, frame: codec::Frame, events: &mut Vec<ConnectionEvent>) -> AmqpResult<()> {
        if frame.channel_id == 0 {
            self.handle_connection_frame(frame, events)
        } else {
            self.handle_channel_frame(frame, events)
        }
    }

    fn handle_connection_frame(&mut self, frame: codec::Frame, events: &mut Vec<ConnectionEvent>) -> AmqpResult<()> {
        match frame.kind {
            FrameKind::Heartbeat => Ok(()),
            FrameKind::Method => {
                let method = decode_method_payload(&frame.payload)?;
                self.handle_connection_method(method, events)
            }
            other => Err(AmqpError::amqp(AmqpException::new(
                ReplyCode::UnexpectedFrame,
                format!("unexpected frame kind {other:?} on channel 0"),
            ))),
        }
    }

    fn handle_connection_method(&mut self, method: Method, events: &mut Vec<ConnectionEvent>) -> AmqpResult<()> {
        match (self.state, method) {
            (
                ConnectionState::HeaderSent,
                Method::ConnectionStart {
                    version_major,
                    version_minor,
                    mechanisms,
                    locales,
                    ..
                },
            ) => {
                if version_major != self.config.protocol_major || version_minor != self.config.protocol_minor {
                    return Err(AmqpError::amqp(AmqpException::new(
                        ReplyCode::FrameError,
                        "server protocol version does not match",
                    )));
                }
                if !locales.split(' ').any(|l| l == self.config.locale) {
                    return Err(AmqpError::amqp(AmqpException::new(
                        ReplyCode::NotAllowed,
                        "server does not offer the configured locale",
                    )));
                }
                let mechanism = SaslMechanism::negotiate(&mechanisms).ok_or_else(|| {
                    AmqpError::amqp(AmqpException::new(
                        ReplyCode::NotAllowed,
                        "server offers no mechanism this client supports",
                    ))
                })?;
                self.mechanism = Some(mechanism);
                let response = mechanism.initial_response(&self.config.credentials);
                let start_ok = Method::ConnectionStartOk {
                    client_properties: self.config.client_properties.clone(),
                    mechanism: mechanism.name().to_string(),
                    response,
                    locale: self.config.locale.clone(),
                };
                self.frame_and_send(0, &start_ok);
                self.state = ConnectionState::Started;
                Ok(())
            }
            (ConnectionState::Started, Method::ConnectionSecure { challenge }) => {
                let mechanism = self
                    .mechanism
                    .ok_or_else(|| AmqpError::invalid_state("no mechanism negotiated"))?;
                match mechanism.handle_challenge(&challenge) {
                    Some(response) => {
                        self.frame_and_send(0, &Method::ConnectionSecureOk { response });
                        Ok(())
                    }
                    None => Err(AmqpError::amqp(AmqpException::new(
                        ReplyCode::NotImplemented,
                        "server issued a challenge this mechanism cannot answer",
                    ))),
                }
            }
            (
                ConnectionState::Started,
                Method::ConnectionTune {
                    channel_max,
                    frame_max,
                    heartbeat,
                },
            ) => {
                let mut negotiated = Tuning {
                    channel_max: negotiate_u16(self.config.channel_max, channel_max),
                    frame_max: negotiate_u32(self.config.frame_max, frame_max),
                    heartbeat: min_nonzero(self.config.heartbeat_secs, heartbeat),
                };
                if negotiated.channel_max == 0 {
                    negotiated.channel_max = u16::MAX;
                }
                if negotiated.frame_max == 0 {
                    negotiated.frame_max = u32::MAX;
                }
                self.tuning = negotiated;
                let tune_ok = Method::ConnectionTuneOk {
                    channel_max: negotiated.channel_max,
                    frame_max: negotiated.frame_max,
                    heartbeat: negotiated.heartbeat,
                };
                self.frame_and_send(0, &tune_ok);
                let open = Method::ConnectionOpen {
                    virtual_host: self.config.virtual_host.clone(),
                };
                self.frame_and_send(0, &open);
                self.state = ConnectionState::TuningSent;
                Ok(())
            }
            (ConnectionState::TuningSent, Method::ConnectionOpenOk) => {
                self.state = ConnectionState::Open;
                events.push(ConnectionEvent::Opened);
                Ok(())
            }
            (_, Method::ConnectionClose { reply_code, reply_text, class_id, method_id }) => {
                let exception = ReplyCode::from_code(reply_code)
                    .map(|rc| AmqpException::new(rc, reply_text).with_method(class_id, method_id));
                self.frame_and_send(0, &Method::ConnectionCloseOk);
                self.state = ConnectionState::Closed;
                // A Connection.Close tears down every channel atomically: surface
                // the same reply as a Closed event on each before the connection's
                // own Closed event.
                for (&channel_id, channel) in self.channels.iter_mut() {
                    channel.force_close();
                    events.push(ConnectionEvent::Channel {
                        channel_id,
                        event: ChannelEvent::Closed { exception: exception.clone() },
                    });
                }
                events.push(ConnectionEvent::Closed { exception });
                Ok(())
            }
            (ConnectionState::Closing, Method::ConnectionCloseOk) => {
                self.state = ConnectionState::Closed;
                events.push(ConnectionEvent::Closed { exception: None });
                Ok(())
            }
            (state, other) => Err(AmqpError::amqp(AmqpException::new(
                ReplyCode::UnexpectedFrame,
                format!("unexpected method {other:?} in state {state:?}"),
            ))),
        }
    }

    fn handle_channel_frame(&mut self, frame: codec::Frame, events: &mut Vec<ConnectionEvent>) -> AmqpResult<()> {
        let channel_id = frame.channel_id;
        let channel = self.channels.get_mut(&channel_id).ok_or_else(|| {
            AmqpError::amqp(AmqpException::new(
                ReplyCode::ChannelError,
                format!("frame on unknown channel {channel_id}"),
            ))
        })?;
        match frame.kind {
            FrameKind::Method => {
                let method = decode_method_payload(&frame.payload)?;
                channel.handle_method(method)?;
            }
            FrameKind::ContentHeader => {
                let header = content::decode_content_header(&frame.payload)?;
                channel.handle_content_header(header)?;
            }
            FrameKind::ContentBody => {
                channel.handle_content_body(&frame.payload)?;
            }
            FrameKind::Heartbeat => {
                return Err(AmqpError::amqp(AmqpException::new(
                    ReplyCode::UnexpectedFrame,
                    "heartbeat frame on a non-zero channel",
                )))
            }
        }
        while let Some(event) = channel.poll_event() {
            events.push(ConnectionEvent::Channel { channel_id, event });
        }
        let mut self_initiated = Vec::new();
        while let Some(method) = channel.poll_outbound() {
            self_initiated.push(method);
        }
        for method in self_initiated {
            self.frame_and_send(channel_id, &method);
        }
        Ok(())
    }

    /// Send an empty heartbeat frame if half the negotiated interval has
    /// elapsed since the last time data was sent.
    pub fn send_heartbeat_if_due(&mut self, now: Instant) {
        if self.tuning.heartbeat == 0 {
            return;
        }
        let half_interval = Duration::from_secs(self.tuning.heartbeat as u64) / 2;
        let due = match self.last_send {
            Some(last) => now.duration_since(last) >= half_interval,
            None => true,
        };
        if due {
            self.outbound.extend(codec::encode_frame(FrameKind::Heartbeat, 0, &[]));
            self.last_send = Some(now);
        }
    }

    /// Raise a hard connection-forced error if no bytes have arrived for
    /// twice the negotiated heartbeat interval.
    pub fn check_heartbeats(&mut self, now: Instant) -> AmqpResult<()> {
        if self.tuning.heartbeat == 0 {
            return Ok(());
        }
        let limit = Duration::from_secs(self.tuning.heartbeat as u64) * 2;
        if let Some(last) = self.last_recv {
            if now.duration_since(last) >= limit {
                self.state = ConnectionState::Closed;
                return Err(AmqpError::amqp(AmqpException::new(
                    ReplyCode::ConnectionForced,
                    "missed heartbeats from peer",
                )));
            }
        }
        Ok(())
    }
}

fn decode_method_payload(payload: &[u8]) -> AmqpResult<Method> {
    if payload.len() < 4 {
        return Err(AmqpError::framing("method frame payload shorter than its header"));
    }
    let class_id = u16::from_be_bytes([payload[0], payload[1]]);
    let method_id = u16::from_be_bytes([payload[2], payload[3]]);
    methods::decode_method(class_id, method_id, &payload[4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handshake_bytes_for(conn: &Connection) -> Vec<u8> {
        let start = Method::ConnectionStart {
            version_major: conn.config.protocol_major,
            version_minor: conn.config.protocol_minor,
            server_properties: FieldTable::new(),
            mechanisms: "PLAIN".to_string(),
            locales: "en_US".to_string(),
        };
        frame_method(0, &start)
    }

    fn frame_method(channel_id: u16, method: &Method) -> Vec<u8> {
        let (class_id, method_id) = method.class_and_method();
        let mut payload = Vec::new();
        payload.extend_from_slice(&class_id.to_be_bytes());
        payload.extend_from_slice(&method_id.to_be_bytes());
        payload.extend(methods::encode_method(method));
        codec::encode_frame(FrameKind::Method, channel_id, &payload)
    }

    #[test]
    fn open_sends_protocol_header() {
        let mut conn = Connection::new(ConnectionConfig::default());
        conn.open();
        assert_eq!(conn.data_to_send(), PROTOCOL_HEADER.to_vec());
        assert_eq!(conn.state(), ConnectionState::HeaderSent);
    }

    #[test]
    fn full_handshake_reaches_open_state() {
        let mut conn = Connection::new(ConnectionConfig::default());
        conn.open();
        conn.data_to_send();
        let now = Instant::now();

        conn.feed(&handshake_bytes_for(&conn), now);
        assert_eq!(conn.state(), ConnectionState::Started);
        conn.data_to_send(); // StartOk

        let tune = frame_method(
            0,
            &Method::ConnectionTune {
                channel_max: 2047,
                frame_max: 131072,
                heartbeat: 30,
            },
        );
        conn.feed(&tune, now);
        assert_eq!(conn.state(), ConnectionState::TuningSent);
        assert_eq!(conn.tuning().heartbeat, 30);
        conn.data_to_send(); // TuneOk + Open

        let open_ok = frame_method(0, &Method::ConnectionOpenOk);
        let events = conn.feed(&open_ok, now);
        assert_eq!(conn.state(), ConnectionState::Open);
        assert_eq!(events, vec![ConnectionEvent::Opened]);
    }

    #[test]
    fn heartbeat_negotiation_uses_min_nonzero() {
        assert_eq!(min_nonzero(60, 30), 30);
        assert_eq!(min_nonzero(0, 30), 30);
        assert_eq!(min_nonzero(60, 0), 60);
        assert_eq!(min_nonzero(0, 0), 0);
    }

    #[test]
    fn channel_max_negotiation_falls_back_to_max_when_either_is_zero() {
        assert_eq!(negotiate_u16(0, 2047), 2047);
        assert_eq!(negotiate_u16(100, 0), 100);
        assert_eq!(negotiate_u16(100, 50), 50);
    }

    #[test]
    fn channel_allocation_starts_at_one_and_increments() {
        let mut conn = Connection::new(ConnectionConfig::default());
        conn.state = ConnectionState::Open;
        conn.tuning = Tuning {
            channel_max: 10,
            frame_max: 4096,
            heartbeat: 0,
        };
        let first = conn.open_channel().unwrap();
        let second = conn.open_channel().unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[test]
    fn missed_heartbeats_raise_hard_error() {
        let mut conn = Connection::new(ConnectionConfig::default());
        conn.state = ConnectionState::Open;
        conn.tuning = Tuning {
            channel_max: 0,
            frame_max: 0,
            heartbeat: 1,
        };
        let t0 = Instant::now();
        conn.last_recv = Some(t0);
        let later = t0 + Duration::from_secs(3);
        let err = conn.check_heartbeats(later).unwrap_err();
        assert_eq!(err.error_code_num(), 320);
    }

    #[test]
    fn server_close_is_acknowledged_and_surfaced() {
        let mut conn = Connection::new(ConnectionConfig::default());
        conn.state = ConnectionState::Open;
        let close = frame_method(
            0,
            &Method::ConnectionClose {
                reply_code: 320,
                reply_text: "shutting down".to_string(),
                class_id: 0,
                method_id: 0,
            },
        );
        let events = conn.feed(&close, Instant::now());
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(matches!(events[0], ConnectionEvent::Closed { .. }));
        assert!(!conn.data_to_send().is_empty()); // CloseOk was queued
    }

    #[test]
    fn server_close_tears_down_every_open_channel() {
        let mut conn = Connection::new(ConnectionConfig::default());
        conn.state = ConnectionState::Open;
        conn.tuning = Tuning {
            channel_max: 0,
            frame_max: 0,
            heartbeat: 0,
        };
        let id = conn.open_channel().unwrap();
        conn.data_to_send(); // Channel.Open
        conn.channels.get_mut(&id).unwrap().handle_method(Method::ChannelOpenOk).unwrap();
        assert_eq!(conn.channels[&id].state(), crate::channel::ChannelState::Open);

        let close = frame_method(
            0,
            &Method::ConnectionClose {
                reply_code: 320,
                reply_text: "connection forced".to_string(),
                class_id: 0,
                method_id: 0,
            },
        );
        let events = conn.feed(&close, Instant::now());
        assert_eq!(conn.channels[&id].state(), crate::channel::ChannelState::Closed);
        assert!(events.iter().any(|e| matches!(
            e,
            ConnectionEvent::Channel { channel_id, event: ChannelEvent::Closed { .. } } if *channel_id == id
        )));
        assert!(matches!(events.last(), Some(ConnectionEvent::Closed { .. })));
    }

    #[test]
    fn a_hard_error_mid_batch_keeps_the_events_already_collected() {
        let mut conn = Connection::new(ConnectionConfig::default());
        conn.state = ConnectionState::Open;
        conn.tuning = Tuning {
            channel_max: 0,
            frame_max: 0,
            heartbeat: 0,
        };
        let id = conn.open_channel().unwrap();
        conn.data_to_send();
        let open_ok = frame_method(id, &Method::ChannelOpenOk);
        // a garbage frame on an unknown channel follows the legitimate one in the same batch
        let bogus = frame_method(99, &Method::ChannelOpenOk);
        let mut batch = open_ok;
        batch.extend(bogus);

        let events = conn.feed(&batch, Instant::now());
        assert!(events.iter().any(|e| matches!(
            e,
            ConnectionEvent::Channel { channel_id, .. } if *channel_id == id
        )));
        assert!(matches!(events.last(), Some(ConnectionEvent::Closed { .. })));
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn inbound_channel_flow_is_answered_with_flow_ok_on_the_wire() {
        let mut conn = Connection::new(ConnectionConfig::default());
        conn.state = ConnectionState::Open;
        conn.tuning = Tuning {
            channel_max: 0,
            frame_max: 0,
            heartbeat: 0,
        };
        let id = conn.open_channel().unwrap();
        conn.data_to_send();
        conn.channels.get_mut(&id).unwrap().handle_method(Method::ChannelOpenOk).unwrap();

        let flow = frame_method(id, &Method::ChannelFlow { active: false });
        let events = conn.feed(&flow, Instant::now());
        assert!(events.iter().any(|e| matches!(
            e,
            ConnectionEvent::Channel { event: ChannelEvent::FlowChanged { active: false }, .. }
        )));
        assert!(!conn.data_to_send().is_empty()); // Channel.Flow-Ok was queued
    }
}
