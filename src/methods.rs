//! The AMQP 0-9-1 method catalog: every `(class_id, method_id)` pair this
//! crate speaks, its field layout, and the metadata the channel/connection
//! engines need to drive request/reply correlation.
//!
//! Standard class numbering: Connection=10, Channel=20, Exchange=40,
//! Queue=50, Basic=60, Tx=90, Confirm=85.
//!
//! Each method is a variant of [`Method`]; [`encode_method`]/[`decode_method`]
//! convert between a variant and its wire bytes (the class/method id header
//! is handled by the caller, since it doubles as the dispatch key). Ticket
//! and other reserved fields (e.g. the `ticket` short preceding
//! exchange/queue names) are always encoded as zero and ignored on decode,
//! per the AMQP 0-9-1 errata.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use crate::codec::{self, BitPacker, BitUnpacker};
use crate::error::AmqpError;
use crate::types::FieldTable;

pub const CLASS_CONNECTION: u16 = 10;
pub const CLASS_CHANNEL: u16 = 20;
pub const CLASS_EXCHANGE: u16 = 40;
pub const CLASS_QUEUE: u16 = 50;
pub const CLASS_BASIC: u16 = 60;
pub const CLASS_CONFIRM: u16 = 85;
pub const CLASS_TX: u16 = 90;

/// Whether the engine must wait for a reply before this method's channel
/// (or connection) may initiate another synchronous call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodMeta {
    pub name: &'static str,
    pub carries_content: bool,
    pub synchronous_reply: Option<(u16, u16)>,
    pub server_may_initiate: bool,
}

/// Look up static metadata for a `(class_id, method_id)` pair. Returns
/// `None` for pairs this crate does not speak.
pub fn catalog_entry(class_id: u16, method_id: u16) -> Option<MethodMeta> {
    use self::ids::*;
    let m = |name, carries_content, synchronous_reply, server_may_initiate| {
        Some(MethodMeta {
            name,
            carries_content,
            synchronous_reply,
            server_may_initiate,
        })
    };
    match (class_id, method_id) {
        (CLASS_CONNECTION, CONNECTION_START) => m("connection.start", false, None, true),
        (CLASS_CONNECTION, CONNECTION_START_OK) => {
            m("connection.start-ok", false, None, false)
        }
        (CLASS_CONNECTION, CONNECTION_SECURE) => m("connection.secure", false, None, true),
        (CLASS_CONNECTION, CONNECTION_SECURE_OK) => {
            m("connection.secure-ok", false, None, false)
        }
        (CLASS_CONNECTION, CONNECTION_TUNE) => m("connection.tune", false, None, true),
        (CLASS_CONNECTION, CONNECTION_TUNE_OK) => m("connection.tune-ok", false, None, false),
        (CLASS_CONNECTION, CONNECTION_OPEN) => m(
            "connection.open",
            false,
            Some((CLASS_CONNECTION, CONNECTION_OPEN_OK)),
            false,
        ),
        (CLASS_CONNECTION, CONNECTION_OPEN_OK) => m("connection.open-ok", false, None, true),
        (CLASS_CONNECTION, CONNECTION_CLOSE) => m(
            "connection.close",
            false,
            Some((CLASS_CONNECTION, CONNECTION_CLOSE_OK)),
            true,
        ),
        (CLASS_CONNECTION, CONNECTION_CLOSE_OK) => m("connection.close-ok", false, None, true),

        (CLASS_CHANNEL, CHANNEL_OPEN) => {
            m("channel.open", false, Some((CLASS_CHANNEL, CHANNEL_OPEN_OK)), false)
        }
        (CLASS_CHANNEL, CHANNEL_OPEN_OK) => m("channel.open-ok", false, None, true),
        (CLASS_CHANNEL, CHANNEL_FLOW) => {
            m("channel.flow", false, Some((CLASS_CHANNEL, CHANNEL_FLOW_OK)), true)
        }
        (CLASS_CHANNEL, CHANNEL_FLOW_OK) => m("channel.flow-ok", false, None, true),
        (CLASS_CHANNEL, CHANNEL_CLOSE) => m(
            "channel.close",
            false,
            Some((CLASS_CHANNEL, CHANNEL_CLOSE_OK)),
            true,
        ),
        (CLASS_CHANNEL, CHANNEL_CLOSE_OK) => m("channel.close-ok", false, None, true),

        (CLASS_EXCHANGE, EXCHANGE_DECLARE) => m(
            "exchange.declare",
            false,
            Some((CLASS_EXCHANGE, EXCHANGE_DECLARE_OK)),
            false,
        ),
        (CLASS_EXCHANGE, EXCHANGE_DECLARE_OK) => m("exchange.declare-ok", false, None, true),
        (CLASS_EXCHANGE, EXCHANGE_DELETE) => m(
            "exchange.delete",
            false,
            Some((CLASS_EXCHANGE, EXCHANGE_DELETE_OK)),
            false,
        ),
        (CLASS_EXCHANGE, EXCHANGE_DELETE_OK) => m("exchange.delete-ok", false, None, true),
        (CLASS_EXCHANGE, EXCHANGE_BIND) => m(
            "exchange.bind",
            false,
            Some((CLASS_EXCHANGE, EXCHANGE_BIND_OK)),
            false,
        ),
        (CLASS_EXCHANGE, EXCHANGE_BIND_OK) => m("exchange.bind-ok", false, None, true),
        (CLASS_EXCHANGE, EXCHANGE_UNBIND) => m(
            "exchange.unbind",
            false,
            Some((CLASS_EXCHANGE, EXCHANGE_UNBIND_OK)),
            false,
        ),
        (CLASS_EXCHANGE, EXCHANGE_UNBIND_OK) => m("exchange.unbind-ok", false, None, true),

        (CLASS_QUEUE, QUEUE_DECLARE) => m(
            "queue.declare",
            false,
            Some((CLASS_QUEUE, QUEUE_DECLARE_OK)),
            false,
        ),
        (CLASS_QUEUE, QUEUE_DECLARE_OK) => m("queue.declare-ok", false, None, true),
        (CLASS_QUEUE, QUEUE_BIND) => m("queue.bind", false, Some((CLASS_QUEUE, QUEUE_BIND_OK)), false),
        (CLASS_QUEUE, QUEUE_BIND_OK) => m("queue.bind-ok", false, None, true),
        (CLASS_QUEUE, QUEUE_UNBIND) => m(
            "queue.unbind",
            false,
            Some((CLASS_QUEUE, QUEUE_UNBIND_OK)),
            false,
        ),
        (CLASS_QUEUE, QUEUE_UNBIND_OK) => m("queue.unbind-ok", false, None, true),
        (CLASS_QUEUE, QUEUE_PURGE) => {
            m("queue.purge", false, Some((CLASS_QUEUE, QUEUE_PURGE_OK)), false)
        }
        (CLASS_QUEUE, QUEUE_PURGE_OK) => m("queue.purge-ok", false, None, true),
        (CLASS_QUEUE, QUEUE_DELETE) => m(
            "queue.delete",
            false,
            Some((CLASS_QUEUE, QUEUE_DELETE_OK)),
            false,
        ),
        (CLASS_QUEUE, QUEUE_DELETE_OK) => m("queue.delete-ok", false, None, true),

        (CLASS_BASIC, BASIC_QOS) => m("basic.qos", false, Some((CLASS_BASIC, BASIC_QOS_OK)), false),
        (CLASS_BASIC, BASIC_QOS_OK) => m("basic.qos-ok", false, None, true),
        (CLASS_BASIC, BASIC_CONSUME) => m(
            "basic.consume",
            false,
            Some((CLASS_BASIC, BASIC_CONSUME_OK)),
            false,
        ),
        (CLASS_BASIC, BASIC_CONSUME_OK) => m("basic.consume-ok", false, None, true),
        (CLASS_BASIC, BASIC_CANCEL) => m(
            "basic.cancel",
            false,
            Some((CLASS_BASIC, BASIC_CANCEL_OK)),
            true,
        ),
        (CLASS_BASIC, BASIC_CANCEL_OK) => m("basic.cancel-ok", false, None, true),
        (CLASS_BASIC, BASIC_PUBLISH) => m("basic.publish", true, None, false),
        (CLASS_BASIC, BASIC_RETURN) => m("basic.return", true, None, true),
        (CLASS_BASIC, BASIC_DELIVER) => m("basic.deliver", true, None, true),
        (CLASS_BASIC, BASIC_GET) => m("basic.get", false, Some((CLASS_BASIC, BASIC_GET_OK)), false),
        (CLASS_BASIC, BASIC_GET_OK) => m("basic.get-ok", true, None, true),
        (CLASS_BASIC, BASIC_GET_EMPTY) => m("basic.get-empty", false, None, true),
        (CLASS_BASIC, BASIC_ACK) => m("basic.ack", false, None, true),
        (CLASS_BASIC, BASIC_REJECT) => m("basic.reject", false, None, false),
        (CLASS_BASIC, BASIC_RECOVER_ASYNC) => m("basic.recover-async", false, None, false),
        (CLASS_BASIC, BASIC_RECOVER) => m(
            "basic.recover",
            false,
            Some((CLASS_BASIC, BASIC_RECOVER_OK)),
            false,
        ),
        (CLASS_BASIC, BASIC_RECOVER_OK) => m("basic.recover-ok", false, None, true),
        (CLASS_BASIC, BASIC_NACK) => m("basic.nack", false, None, true),

        (CLASS_TX, TX_SELECT) => m("tx.select", false, Some((CLASS_TX, TX_SELECT_OK)), false),
        (CLASS_TX, TX_SELECT_OK) => m("tx.select-ok", false, None, true),
        (CLASS_TX, TX_COMMIT) => m("tx.commit", false, Some((CLASS_TX, TX_COMMIT_OK)), false),
        (CLASS_TX, TX_COMMIT_OK) => m("tx.commit-ok", false, None, true),
        (CLASS_TX, TX_ROLLBACK) => m("tx.rollback", false, Some((CLASS_TX, TX_ROLLBACK_OK)), false),
        (CLASS_TX, TX_ROLLBACK_OK) => m("tx.rollback-ok", false, None, true),

        (CLASS_CONFIRM, CONFIRM_SELECT) => m(
            "confirm.select",
            false,
            Some((CLASS_CONFIRM, CONFIRM_SELECT_OK)),
            false,
        ),
        (CLASS_CONFIRM, CONFIRM_SELECT_OK) => m("confirm.select-ok", false, None, true),
        _ => None,
    }
}

/// Method ids, grouped by class, named to match the catalog match above.
pub mod ids {
    pub const CONNECTION_START: u16 = 10;
    pub const CONNECTION_START_OK: u16 = 11;
    pub const CONNECTION_SECURE: u16 = 20;
    pub const CONNECTION_SECURE_OK: u16 = 21;
    pub const CONNECTION_TUNE: u16 = 30;
    pub const CONNECTION_TUNE_OK: u16 = 31;
    pub const CONNECTION_OPEN: u16 = 40;
    pub const CONNECTION_OPEN_OK: u16 = 41;
    pub const CONNECTION_CLOSE: u16 = 50;
    pub const CONNECTION_CLOSE_OK: u16 = 51;

    pub const CHANNEL_OPEN: u16 = 10;
    pub const CHANNEL_OPEN_OK: u16 = 11;
    pub const CHANNEL_FLOW: u16 = 20;
    pub const CHANNEL_FLOW_OK: u16 = 21;
    pub const CHANNEL_CLOSE: u16 = 40;
    pub const CHANNEL_CLOSE_OK: u16 = 41;

    pub const EXCHANGE_DECLARE: u16 = 10;
    pub const EXCHANGE_DECLARE_OK: u16 = 11;
    pub const EXCHANGE_DELETE: u16 = 20;
    pub const EXCHANGE_DELETE_OK: u16 = 21;
    pub const EXCHANGE_BIND: u16 = 30;
    pub const EXCHANGE_BIND_OK: u16 = 31;
    pub const EXCHANGE_UNBIND: u16 = 40;
    pub const EXCHANGE_UNBIND_OK: u16 = 51;

    pub const QUEUE_DECLARE: u16 = 10;
    pub const QUEUE_DECLARE_OK: u16 = 11;
    pub const QUEUE_BIND: u16 = 20;
    pub const QUEUE_BIND_OK: u16 = 21;
    pub const QUEUE_UNBIND: u16 = 50;
    pub const QUEUE_UNBIND_OK: u16 = 51;
    pub const QUEUE_PURGE: u16 = 30;
    pub const QUEUE_PURGE_OK: u16 = 31;
    pub const QUEUE_DELETE: u16 = 40;
    pub const QUEUE_DELETE_OK: u16 = 41;

    pub const BASIC_QOS: u16 = 10;
    pub const BASIC_QOS_OK: u16 = 11;
    pub const BASIC_CONSUME: u16 = 20;
    pub const BASIC_CONSUME_OK: u16 = 21;
    pub const BASIC_CANCEL: u16 = 30;
    pub const BASIC_CANCEL_OK: u16 = 31;
    pub const BASIC_PUBLISH: u16 = 40;
    pub const BASIC_RETURN: u16 = 50;
    pub const BASIC_DELIVER: u16 = 60;
    pub const BASIC_GET: u16 = 70;
    pub const BASIC_GET_OK: u16 = 71;
    pub const BASIC_GET_EMPTY: u16 = 72;
    pub const BASIC_ACK: u16 = 80;
    pub const BASIC_REJECT: u16 = 90;
    pub const BASIC_RECOVER_ASYNC: u16 = 100;
    pub const BASIC_RECOVER: u16 = 110;
    pub const BASIC_RECOVER_OK: u16 = 111;
    pub const BASIC_NACK: u16 = 120;

    pub const TX_SELECT: u16 = 10;
    pub const TX_SELECT_OK: u16 = 11;
    pub const TX_COMMIT: u16 = 20;
    pub const TX_COMMIT_OK: u16 = 21;
    pub const TX_ROLLBACK: u16 = 30;
    pub const TX_ROLLBACK_OK: u16 = 31;

    pub const CONFIRM_SELECT: u16 = 10;
    pub const CONFIRM_SELECT_OK: u16 = 11;
}
use ids::*;

/// A decoded/to-be-encoded AMQP method, tagged by class and verb.
#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    ConnectionStart {
        version_major: u8,
        version_minor: u8,
        server_properties: FieldTable,
        mechanisms: String,
        locales: String,
    },
    ConnectionStartOk {
        client_properties: FieldTable,
        mechanism: String,
        response: Vec<u8>,
        locale: String,
    },
    ConnectionSecure {
        challenge: Vec<u8>,
    },
    ConnectionSecureOk {
        response: Vec<u8>,
    },
    ConnectionTune {
        channel_max: u16,
        frame_max: u32,
        heartbeat: u16,
    },
    ConnectionTuneOk {
        channel_max: u16,
        frame_max: u32,
        heartbeat: u16,
    },
    ConnectionOpen {
        virtual_host: String,
    },
    ConnectionOpenOk,
    ConnectionClose {
        reply_code: u16,
        reply_text: String,
        class_id: u16,
        method_id: u16,
    },
    ConnectionCloseOk,

    ChannelOpen,
    ChannelOpenOk,
    ChannelFlow {
        active: bool,
    },
    ChannelFlowOk {
        active: bool,
    },
    ChannelClose {
        reply_code: u16,
        reply_text: String,
        class_id: u16,
        method_id: u16,
    },
    ChannelCloseOk,

    ExchangeDeclare {
        exchange: String,
        type_: String,
        passive: bool,
        durable: bool,
        auto_delete: bool,
        internal: bool,
        no_wait: bool,
        arguments: FieldTable,
    },
    ExchangeDeclareOk,
    ExchangeDelete {
        exchange: String,
        if_unused: bool,
        no_wait: bool,
    },
    ExchangeDeleteOk,
    ExchangeBind {
        destination: String,
        source: String,
        routing_key: String,
        no_wait: bool,
        arguments: FieldTable,
    },
    ExchangeBindOk,
    ExchangeUnbind {
        destination: String,
        source: String,
        routing_key: String,
        no_wait: bool,
        arguments: FieldTable,
    },
    ExchangeUnbindOk,

    QueueDeclare {
        queue: String,
        passive: bool,
        durable: bool,
        exclusive: bool,
        auto_delete: bool,
        no_wait: bool,
        arguments: FieldTable,
    },
    QueueDeclareOk {
        queue: String,
        message_count: u32,
        consumer_count: u32,
    },
    QueueBind {
        queue: String,
        exchange: String,
        routing_key: String,
        no_wait: bool,
        arguments: FieldTable,
    },
    QueueBindOk,
    QueueUnbind {
        queue: String,
        exchange: String,
        routing_key: String,
        arguments: FieldTable,
    },
    QueueUnbindOk,
    QueuePurge {
        queue: String,
        no_wait: bool,
    },
    QueuePurgeOk {
        message_count: u32,
    },
    QueueDelete {
        queue: String,
        if_unused: bool,
        if_empty: bool,
        no_wait: bool,
    },
    QueueDeleteOk {
        message_count: u32,
    },

    BasicQos {
        prefetch_size: u32,
        prefetch_count: u16,
        global_: bool,
    },
    BasicQosOk,
    BasicConsume {
        queue: String,
        consumer_tag: String,
        no_local: bool,
        no_ack: bool,
        exclusive: bool,
        no_wait: bool,
        arguments: FieldTable,
    },
    BasicConsumeOk {
        consumer_tag: String,
    },
    BasicCancel {
        consumer_tag: String,
        no_wait: bool,
    },
    BasicCancelOk {
        consumer_tag: String,
    },
    BasicPublish {
        exchange: String,
        routing_key: String,
        mandatory: bool,
        immediate: bool,
    },
    BasicReturn {
        reply_code: u16,
        reply_text: String,
        exchange: String,
        routing_key: String,
    },
    BasicDeliver {
        consumer_tag: String,
        delivery_tag: u64,
        redelivered: bool,
        exchange: String,
        routing_key: String,
    },
    BasicGet {
        queue: String,
        no_ack: bool,
    },
    BasicGetOk {
        delivery_tag: u64,
        redelivered: bool,
        exchange: String,
        routing_key: String,
        message_count: u32,
    },
    BasicGetEmpty,
    BasicAck {
        delivery_tag: u64,
        multiple: bool,
    },
    BasicReject {
        delivery_tag: u64,
        requeue: bool,
    },
    BasicRecoverAsync {
        requeue: bool,
    },
    BasicRecover {
        requeue: bool,
    },
    BasicRecoverOk,
    BasicNack {
        delivery_tag: u64,
        multiple: bool,
        requeue: bool,
    },

    TxSelect,
    TxSelectOk,
    TxCommit,
    TxCommitOk,
    TxRollback,
    TxRollbackOk,

    ConfirmSelect {
        no_wait: bool,
    },
    ConfirmSelectOk,
}

impl Method {
    /// The `(class_id, method_id)` pair identifying this method on the wire.
    pub fn class_and_method(&self) -> (u16, u16) {
        use Method::*;
        match self {
            ConnectionStart { .. } => (CLASS_CONNECTION, CONNECTION_START),
            ConnectionStartOk { .. } => (CLASS_CONNECTION, CONNECTION_START_OK),
            ConnectionSecure { .. } => (CLASS_CONNECTION, CONNECTION_SECURE),
            ConnectionSecureOk { .. } => (CLASS_CONNECTION, CONNECTION_SECURE_OK),
            ConnectionTune { .. } => (CLASS_CONNECTION, CONNECTION_TUNE),
            ConnectionTuneOk { .. } => (CLASS_CONNECTION, CONNECTION_TUNE_OK),
            ConnectionOpen { .. } => (CLASS_CONNECTION, CONNECTION_OPEN),
            ConnectionOpenOk => (CLASS_CONNECTION, CONNECTION_OPEN_OK),
            ConnectionClose { .. } => (CLASS_CONNECTION, CONNECTION_CLOSE),
            ConnectionCloseOk => (CLASS_CONNECTION, CONNECTION_CLOSE_OK),

            ChannelOpen => (CLASS_CHANNEL, CHANNEL_OPEN),
            ChannelOpenOk => (CLASS_CHANNEL, CHANNEL_OPEN_OK),
            ChannelFlow { .. } => (CLASS_CHANNEL, CHANNEL_FLOW),
            ChannelFlowOk { .. } => (CLASS_CHANNEL, CHANNEL_FLOW_OK),
            ChannelClose { .. } => (CLASS_CHANNEL, CHANNEL_CLOSE),
            ChannelCloseOk => (CLASS_CHANNEL, CHANNEL_CLOSE_OK),

            ExchangeDeclare { .. } => (CLASS_EXCHANGE, EXCHANGE_DECLARE),
            ExchangeDeclareOk => (CLASS_EXCHANGE, EXCHANGE_DECLARE_OK),
            ExchangeDelete { .. } => (CLASS_EXCHANGE, EXCHANGE_DELETE),
            ExchangeDeleteOk => (CLASS_EXCHANGE, EXCHANGE_DELETE_OK),
            ExchangeBind { .. } => (CLASS_EXCHANGE, EXCHANGE_BIND),
            ExchangeBindOk => (CLASS_EXCHANGE, EXCHANGE_BIND_OK),
            ExchangeUnbind { .. } => (CLASS_EXCHANGE, EXCHANGE_UNBIND),
            ExchangeUnbindOk => (CLASS_EXCHANGE, EXCHANGE_UNBIND_OK),

            QueueDeclare { .. } => (CLASS_QUEUE, QUEUE_DECLARE),
            QueueDeclareOk { .. } => (CLASS_QUEUE, QUEUE_DECLARE_OK),
            QueueBind { .. } => (CLASS_QUEUE, QUEUE_BIND),
            QueueBindOk => (CLASS_QUEUE, QUEUE_BIND_OK),
            QueueUnbind { .. } => (CLASS_QUEUE, QUEUE_UNBIND),
            QueueUnbindOk => (CLASS_QUEUE, QUEUE_UNBIND_OK),
            QueuePurge { .. } => (CLASS_QUEUE, QUEUE_PURGE),
            QueuePurgeOk { .. } => (CLASS_QUEUE, QUEUE_PURGE_OK),
            QueueDelete { .. } => (CLASS_QUEUE, QUEUE_DELETE),
            QueueDeleteOk { .. } => (CLASS_QUEUE, QUEUE_DELETE_OK),

            BasicQos { .. } => (CLASS_BASIC, BASIC_QOS),
            BasicQosOk => (CLASS_BASIC, BASIC_QOS_OK),
            BasicConsume { .. } => (CLASS_BASIC, BASIC_CONSUME),
            BasicConsumeOk { .. } => (CLASS_BASIC, BASIC_CONSUME_OK),
            BasicCancel { .. } => (CLASS_BASIC, BASIC_CANCEL),
            BasicCancelOk { .. } => (CLASS_BASIC, BASIC_CANCEL_OK),
            BasicPublish { .. } => (CLASS_BASIC, BASIC_PUBLISH),
            BasicReturn { .. } => (CLASS_BASIC, BASIC_RETURN),
            BasicDeliver { .. } => (CLASS_BASIC, BASIC_DELIVER),
            BasicGet { .. } => (CLASS_BASIC, BASIC_GET),
            BasicGetOk { .. } => (CLASS_BASIC, BASIC_GET_OK),
            BasicGetEmpty => (CLASS_BASIC, BASIC_GET_EMPTY),
            BasicAck { .. } => (CLASS_BASIC, BASIC_ACK),
            BasicReject { .. } => (CLASS_BASIC, BASIC_REJECT),
            BasicRecoverAsync { .. } => (CLASS_BASIC, BASIC_RECOVER_ASYNC),
            BasicRecover { .. } => (CLASS_BASIC, BASIC_RECOVER),
            BasicRecoverOk => (CLASS_BASIC, BASIC_RECOVER_OK),
            BasicNack { .. } => (CLASS_BASIC, BASIC_NACK),

            TxSelect => (CLASS_TX, TX_SELECT),
            TxSelectOk => (CLASS_TX, TX_SELECT_OK),
            TxCommit => (CLASS_TX, TX_COMMIT),
            TxCommitOk => (CLASS_TX, TX_COMMIT_OK),
            TxRollback => (CLASS_TX, TX_ROLLBACK),
            TxRollbackOk => (CLASS_TX, TX_ROLLBACK_OK),

            ConfirmSelect { .. } => (CLASS_CONFIRM, CONFIRM_SELECT),
            ConfirmSelectOk => (CLASS_CONFIRM, CONFIRM_SELECT_OK),
        }
    }

    pub fn meta(&self) -> MethodMeta {
        let (c, m) = self.class_and_method();
        catalog_entry(c, m).expect("every Method variant has a catalog entry")
    }
}

fn put_table(buf: &mut BytesMut, t: &FieldTable) {
    codec::encode_table(buf, t);
}
fn get_table(buf: &mut Bytes) -> Result<FieldTable, AmqpError> {
    codec::decode_table(buf)
}
fn put_short_str(buf: &mut BytesMut, s: &str) -> Result<(), AmqpError> {
    codec::encode_short_string(buf, s)
}
fn get_short_str(buf: &mut Bytes) -> Result<String, AmqpError> {
    codec::decode_short_string(buf)
}
fn put_long_str(buf: &mut BytesMut, s: &str) {
    codec::encode_long_string(buf, s)
}
fn get_long_str(buf: &mut Bytes) -> Result<String, AmqpError> {
    codec::decode_long_string(buf)
}
fn need(buf: &Bytes, n: usize, what: &str) -> Result<(), AmqpError> {
    if buf.remaining() < n {
        Err(AmqpError::framing(format!("truncated {what}")))
    } else {
        Ok(())
    }
}

/// Encode a method's field tuple (not including the class/method id header,
/// which the frame layer writes separately so it can be used as a dispatch
/// key before the body is fully parsed).
pub fn encode_method(method: &Method) -> Vec<u8> {
    let mut buf = BytesMut::new();
    use Method::*;
    match method {
        ConnectionStart {
            version_major,
            version_minor,
            server_properties,
            mechanisms,
            locales,
        } => {
            buf.put_u8(*version_major);
            buf.put_u8(*version_minor);
            put_table(&mut buf, server_properties);
            put_long_str(&mut buf, mechanisms);
            put_long_str(&mut buf, locales);
        }
        ConnectionStartOk {
            client_properties,
            mechanism,
            response,
            locale,
        } => {
            put_table(&mut buf, client_properties);
            let _ = put_short_str(&mut buf, mechanism);
            buf.put_u32(response.len() as u32);
            buf.put_slice(response);
            let _ = put_short_str(&mut buf, locale);
        }
        ConnectionSecure { challenge } => {
            buf.put_u32(challenge.len() as u32);
            buf.put_slice(challenge);
        }
        ConnectionSecureOk { response } => {
            buf.put_u32(response.len() as u32);
            buf.put_slice(response);
        }
        ConnectionTune {
            channel_max,
            frame_max,
            heartbeat,
        }
        | ConnectionTuneOk {
            channel_max,
            frame_max,
            heartbeat,
        } => {
            buf.put_u16(*channel_max);
            buf.put_u32(*frame_max);
            buf.put_u16(*heartbeat);
        }
        ConnectionOpen { virtual_host } => {
            let _ = put_short_str(&mut buf, virtual_host);
            let _ = put_short_str(&mut buf, ""); // reserved capabilities
            buf.put_u8(0); // reserved insist bit
        }
        ConnectionOpenOk => {
            let _ = put_short_str(&mut buf, ""); // reserved
        }
        ConnectionClose {
            reply_code,
            reply_text,
            class_id,
            method_id,
        }
        | ChannelClose {
            reply_code,
            reply_text,
            class_id,
            method_id,
        } => {
            buf.put_u16(*reply_code);
            let _ = put_short_str(&mut buf, reply_text);
            buf.put_u16(*class_id);
            buf.put_u16(*method_id);
        }
        ConnectionCloseOk | ChannelCloseOk | ChannelOpenOk | ExchangeDeclareOk | ExchangeDeleteOk
        | ExchangeBindOk | ExchangeUnbindOk | QueueBindOk | QueueUnbindOk | BasicQosOk
        | BasicGetEmpty | BasicRecoverOk | TxSelectOk | TxCommitOk | TxRollbackOk
        | ConfirmSelectOk | TxSelect | TxCommit | TxRollback | ChannelOpen => {}
        ChannelFlow { active } | ChannelFlowOk { active } => {
            buf.put_u8(if *active { 1 } else { 0 });
        }
        ExchangeDeclare {
            exchange,
            type_,
            passive,
            durable,
            auto_delete,
            internal,
            no_wait,
            arguments,
        } => {
            buf.put_u16(0); // reserved ticket
            let _ = put_short_str(&mut buf, exchange);
            let _ = put_short_str(&mut buf, type_);
            let mut bits = BitPacker::new();
            bits.push(&mut buf, *passive);
            bits.push(&mut buf, *durable);
            bits.push(&mut buf, *auto_delete);
            bits.push(&mut buf, *internal);
            bits.push(&mut buf, *no_wait);
            bits.flush(&mut buf);
            put_table(&mut buf, arguments);
        }
        ExchangeDelete {
            exchange,
            if_unused,
            no_wait,
        } => {
            buf.put_u16(0);
            let _ = put_short_str(&mut buf, exchange);
            let mut bits = BitPacker::new();
            bits.push(&mut buf, *if_unused);
            bits.push(&mut buf, *no_wait);
            bits.flush(&mut buf);
        }
        ExchangeBind {
            destination,
            source,
            routing_key,
            no_wait,
            arguments,
        }
        | ExchangeUnbind {
            destination,
            source,
            routing_key,
            no_wait,
            arguments,
        } => {
            buf.put_u16(0);
            let _ = put_short_str(&mut buf, destination);
            let _ = put_short_str(&mut buf, source);
            let _ = put_short_str(&mut buf, routing_key);
            let mut bits = BitPacker::new();
            bits.push(&mut buf, *no_wait);
            bits.flush(&mut buf);
            put_table(&mut buf, arguments);
        }
        QueueDeclare {
            queue,
            passive,
            durable,
            exclusive,
            auto_delete,
            no_wait,
            arguments,
        } => {
            buf.put_u16(0);
            let _ = put_short_str(&mut buf, queue);
            let mut bits = BitPacker::new();
            bits.push(&mut buf, *passive);
            bits.push(&mut buf, *durable);
            bits.push(&mut buf, *exclusive);
            bits.push(&mut buf, *auto_delete);
            bits.push(&mut buf, *no_wait);
            bits.flush(&mut buf);
            put_table(&mut buf, arguments);
        }
        QueueDeclareOk {
            queue,
            message_count,
            consumer_count,
        } => {
            let _ = put_short_str(&mut buf, queue);
            buf.put_u32(*message_count);
            buf.put_u32(*consumer_count);
        }
        QueueBind {
            queue,
            exchange,
            routing_key,
            no_wait,
            arguments,
        } => {
            buf.put_u16(0);
            let _ = put_short_str(&mut buf, queue);
            let _ = put_short_str(&mut buf, exchange);
            let _ = put_short_str(&mut buf, routing_key);
            let mut bits = BitPacker::new();
            bits.push(&mut buf, *no_wait);
            bits.flush(&mut buf);
            put_table(&mut buf, arguments);
        }
        QueueUnbind {
            queue,
            exchange,
            routing_key,
            arguments,
        } => {
            buf.put_u16(0);
            let _ = put_short_str(&mut buf, queue);
            let _ = put_short_str(&mut buf, exchange);
            let _ = put_short_str(&mut buf, routing_key);
            put_table(&mut buf, arguments);
        }
        QueuePurge { queue, no_wait } => {
            buf.put_u16(0);
            let _ = put_short_str(&mut buf, queue);
            let mut bits = BitPacker::new();
            bits.push(&mut buf, *no_wait);
            bits.flush(&mut buf);
        }
        QueuePurgeOk { message_count } | QueueDeleteOk { message_count } => {
            buf.put_u32(*message_count);
        }
        QueueDelete {
            queue,
            if_unused,
            if_empty,
            no_wait,
        } => {
            buf.put_u16(0);
            let _ = put_short_str(&mut buf, queue);
            let mut bits = BitPacker::new();
            bits.push(&mut buf, *if_unused);
            bits.push(&mut buf, *if_empty);
            bits.push(&mut buf, *no_wait);
            bits.flush(&mut buf);
        }
        BasicQos {
            prefetch_size,
            prefetch_count,
            global_,
        } => {
            buf.put_u32(*prefetch_size);
            buf.put_u16(*prefetch_count);
            let mut bits = BitPacker::new();
            bits.push(&mut buf, *global_);
            bits.flush(&mut buf);
        }
        BasicConsume {
            queue,
            consumer_tag,
            no_local,
            no_ack,
            exclusive,
            no_wait,
            arguments,
        } => {
            buf.put_u16(0);
            let _ = put_short_str(&mut buf, queue);
            let _ = put_short_str(&mut buf, consumer_tag);
            let mut bits = BitPacker::new();
            bits.push(&mut buf, *no_local);
            bits.push(&mut buf, *no_ack);
            bits.push(&mut buf, *exclusive);
            bits.push(&mut buf, *no_wait);
            bits.flush(&mut buf);
            put_table(&mut buf, arguments);
        }
        BasicConsumeOk { consumer_tag } | BasicCancelOk { consumer_tag } => {
            let _ = put_short_str(&mut buf, consumer_tag);
        }
        BasicCancel { consumer_tag, no_wait } => {
            let _ = put_short_str(&mut buf, consumer_tag);
            let mut bits = BitPacker::new();
            bits.push(&mut buf, *no_wait);
            bits.flush(&mut buf);
        }
        BasicPublish {
            exchange,
            routing_key,
            mandatory,
            immediate,
        } => {
            buf.put_u16(0);
            let _ = put_short_str(&mut buf, exchange);
            let _ = put_short_str(&mut buf, routing_key);
            let mut bits = BitPacker::new();
            bits.push(&mut buf, *mandatory);
            bits.push(&mut buf, *immediate);
            bits.flush(&mut buf);
        }
        BasicReturn {
            reply_code,
            reply_text,
            exchange,
            routing_key,
        } => {
            buf.put_u16(*reply_code);
            let _ = put_short_str(&mut buf, reply_text);
            let _ = put_short_str(&mut buf, exchange);
            let _ = put_short_str(&mut buf, routing_key);
        }
        BasicDeliver {
            consumer_tag,
            delivery_tag,
            redelivered,
            exchange,
            routing_key,
        } => {
            let _ = put_short_str(&mut buf, consumer_tag);
            buf.put_u64(*delivery_tag);
            let mut bits = BitPacker::new();
            bits.push(&mut buf, *redelivered);
            bits.flush(&mut buf);
            let _ = put_short_str(&mut buf, exchange);
            let _ = put_short_str(&mut buf, routing_key);
        }
        BasicGet { queue, no_ack } => {
            buf.put_u16(0);
            let _ = put_short_str(&mut buf, queue);
            let mut bits = BitPacker::new();
            bits.push(&mut buf, *no_ack);
            bits.flush(&mut buf);
        }
        BasicGetOk {
            delivery_tag,
            redelivered,
            exchange,
            routing_key,
            message_count,
        } => {
            buf.put_u64(*delivery_tag);
            let mut bits = BitPacker::new();
            bits.push(&mut buf, *redelivered);
            bits.flush(&mut buf);
            let _ = put_short_str(&mut buf, exchange);
            let _ = put_short_str(&mut buf, routing_key);
            buf.put_u32(*message_count);
        }
        BasicAck { delivery_tag, multiple } => {
            buf.put_u64(*delivery_tag);
            let mut bits = BitPacker::new();
            bits.push(&mut buf, *multiple);
            bits.flush(&mut buf);
        }
        BasicReject { delivery_tag, requeue } => {
            buf.put_u64(*delivery_tag);
            let mut bits = BitPacker::new();
            bits.push(&mut buf, *requeue);
            bits.flush(&mut buf);
        }
        BasicRecoverAsync { requeue } | BasicRecover { requeue } => {
            let mut bits = BitPacker::new();
            bits.push(&mut buf, *requeue);
            bits.flush(&mut buf);
        }
        BasicNack {
            delivery_tag,
            multiple,
            requeue,
        } => {
            buf.put_u64(*delivery_tag);
            let mut bits = BitPacker::new();
            bits.push(&mut buf, *multiple);
            bits.push(&mut buf, *requeue);
            bits.flush(&mut buf);
        }
        ConfirmSelect { no_wait } => {
            let mut bits = BitPacker::new();
            bits.push(&mut buf, *no_wait);
            bits.flush(&mut buf);
        }
    }
    buf.to_vec()
}

/// Decode a method body given its class/method id (the dispatch key).
pub fn decode_method(class_id: u16, method_id: u16, body: &[u8]) -> Result<Method, AmqpError> {
    let mut buf = Bytes::copy_from_slice(body);
    Ok(match (class_id, method_id) {
        (CLASS_CONNECTION, CONNECTION_START) => {
            need(&buf, 2, "connection.start")?;
            let version_major = buf.get_u8();
            let version_minor = buf.get_u8();
            let server_properties = get_table(&mut buf)?;
            let mechanisms = get_long_str(&mut buf)?;
            let locales = get_long_str(&mut buf)?;
            Method::ConnectionStart {
                version_major,
                version_minor,
                server_properties,
                mechanisms,
                locales,
            }
        }
        (CLASS_CONNECTION, CONNECTION_START_OK) => {
            let client_properties = get_table(&mut buf)?;
            let mechanism = get_short_str(&mut buf)?;
            let response = get_long_str_bytes(&mut buf)?;
            let locale = get_short_str(&mut buf)?;
            Method::ConnectionStartOk {
                client_properties,
                mechanism,
                response,
                locale,
            }
        }
        (CLASS_CONNECTION, CONNECTION_SECURE) => Method::ConnectionSecure {
            challenge: get_long_str_bytes(&mut buf)?,
        },
        (CLASS_CONNECTION, CONNECTION_SECURE_OK) => Method::ConnectionSecureOk {
            response: get_long_str_bytes(&mut buf)?,
        },
        (CLASS_CONNECTION, CONNECTION_TUNE) | (CLASS_CONNECTION, CONNECTION_TUNE_OK) => {
            need(&buf, 8, "connection.tune")?;
            let channel_max = buf.get_u16();
            let frame_max = buf.get_u32();
            let heartbeat = buf.get_u16();
            if method_id == CONNECTION_TUNE {
                Method::ConnectionTune {
                    channel_max,
                    frame_max,
                    heartbeat,
                }
            } else {
                Method::ConnectionTuneOk {
                    channel_max,
                    frame_max,
                    heartbeat,
                }
            }
        }
        (CLASS_CONNECTION, CONNECTION_OPEN) => {
            let virtual_host = get_short_str(&mut buf)?;
            Method::ConnectionOpen { virtual_host }
        }
        (CLASS_CONNECTION, CONNECTION_OPEN_OK) => Method::ConnectionOpenOk,
        (CLASS_CONNECTION, CONNECTION_CLOSE) | (CLASS_CHANNEL, CHANNEL_CLOSE) => {
            need(&buf, 2, "close reply_code")?;
            let reply_code = buf.get_u16();
            let reply_text = get_short_str(&mut buf)?;
            need(&buf, 4, "close class/method id")?;
            let close_class_id = buf.get_u16();
            let close_method_id = buf.get_u16();
            if class_id == CLASS_CONNECTION {
                Method::ConnectionClose {
                    reply_code,
                    reply_text,
                    class_id: close_class_id,
                    method_id: close_method_id,
                }
            } else {
                Method::ChannelClose {
                    reply_code,
                    reply_text,
                    class_id: close_class_id,
                    method_id: close_method_id,
                }
            }
        }
        (CLASS_CONNECTION, CONNECTION_CLOSE_OK) => Method::ConnectionCloseOk,

        (CLASS_CHANNEL, CHANNEL_OPEN) => Method::ChannelOpen,
        (CLASS_CHANNEL, CHANNEL_OPEN_OK) => Method::ChannelOpenOk,
        (CLASS_CHANNEL, CHANNEL_FLOW) | (CLASS_CHANNEL, CHANNEL_FLOW_OK) => {
            let mut bits = BitUnpacker::new();
            let active = bits.next(&mut buf)?;
            if method_id == CHANNEL_FLOW {
                Method::ChannelFlow { active }
            } else {
                Method::ChannelFlowOk { active }
            }
        }
        (CLASS_CHANNEL, CHANNEL_CLOSE_OK) => Method::ChannelCloseOk,

        (CLASS_EXCHANGE, EXCHANGE_DECLARE) => {
            need(&buf, 2, "exchange.declare ticket")?;
            buf.get_u16();
            let exchange = get_short_str(&mut buf)?;
            let type_ = get_short_str(&mut buf)?;
            let mut bits = BitUnpacker::new();
            let passive = bits.next(&mut buf)?;
            let durable = bits.next(&mut buf)?;
            let auto_delete = bits.next(&mut buf)?;
            let internal = bits.next(&mut buf)?;
            let no_wait = bits.next(&mut buf)?;
            let arguments = get_table(&mut buf)?;
            Method::ExchangeDeclare {
                exchange,
                type_,
                passive,
                durable,
                auto_delete,
                internal,
                no_wait,
                arguments,
            }
        }
        (CLASS_EXCHANGE, EXCHANGE_DECLARE_OK) => Method::ExchangeDeclareOk,
        (CLASS_EXCHANGE, EXCHANGE_DELETE) => {
            need(&buf, 2, "exchange.delete ticket")?;
            buf.get_u16();
            let exchange = get_short_str(&mut buf)?;
            let mut bits = BitUnpacker::new();
            let if_unused = bits.next(&mut buf)?;
            let no_wait = bits.next(&mut buf)?;
            Method::ExchangeDelete {
                exchange,
                if_unused,
                no_wait,
            }
        }
        (CLASS_EXCHANGE, EXCHANGE_DELETE_OK) => Method::ExchangeDeleteOk,
        (CLASS_EXCHANGE, EXCHANGE_BIND) | (CLASS_EXCHANGE, EXCHANGE_UNBIND) => {
            need(&buf, 2, "exchange.bind ticket")?;
            buf.get_u16();
            let destination = get_short_str(&mut buf)?;
            let source = get_short_str(&mut buf)?;
            let routing_key = get_short_str(&mut buf)?;
            let mut bits = BitUnpacker::new();
            let no_wait = bits.next(&mut buf)?;
            let arguments = get_table(&mut buf)?;
            if method_id == EXCHANGE_BIND {
                Method::ExchangeBind {
                    destination,
                    source,
                    routing_key,
                    no_wait,
                    arguments,
                }
            } else {
                Method::ExchangeUnbind {
                    destination,
                    source,
                    routing_key,
                    no_wait,
                    arguments,
                }
            }
        }
        (CLASS_EXCHANGE, EXCHANGE_BIND_OK) => Method::ExchangeBindOk,
        (CLASS_EXCHANGE, EXCHANGE_UNBIND_OK) => Method::ExchangeUnbindOk,

        (CLASS_QUEUE, QUEUE_DECLARE) => {
            need(&buf, 2, "queue.declare ticket")?;
            buf.get_u16();
            let queue = get_short_str(&mut buf)?;
            let mut bits = BitUnpacker::new();
            let passive = bits.next(&mut buf)?;
            let durable = bits.next(&mut buf)?;
            let exclusive = bits.next(&mut buf)?;
            let auto_delete = bits.next(&mut buf)?;
            let no_wait = bits.next(&mut buf)?;
            let arguments = get_table(&mut buf)?;
            Method::QueueDeclare {
                queue,
                passive,
                durable,
                exclusive,
                auto_delete,
                no_wait,
                arguments,
            }
        }
        (CLASS_QUEUE, QUEUE_DECLARE_OK) => {
            let queue = get_short_str(&mut buf)?;
            need(&buf, 8, "queue.declare-ok counts")?;
            let message_count = buf.get_u32();
            let consumer_count = buf.get_u32();
            Method::QueueDeclareOk {
                queue,
                message_count,
                consumer_count,
            }
        }
        (CLASS_QUEUE, QUEUE_BIND) => {
            need(&buf, 2, "queue.bind ticket")?;
            buf.get_u16();
            let queue = get_short_str(&mut buf)?;
            let exchange = get_short_str(&mut buf)?;
            let routing_key = get_short_str(&mut buf)?;
            let mut bits = BitUnpacker::new();
            let no_wait = bits.next(&mut buf)?;
            let arguments = get_table(&mut buf)?;
            Method::QueueBind {
                queue,
                exchange,
                routing_key,
                no_wait,
                arguments,
            }
        }
        (CLASS_QUEUE, QUEUE_BIND_OK) => Method::QueueBindOk,
        (CLASS_QUEUE, QUEUE_UNBIND) => {
            need(&buf, 2, "queue.unbind ticket")?;
            buf.get_u16();
            let queue = get_short_str(&mut buf)?;
            let exchange = get_short_str(&mut buf)?;
            let routing_key = get_short_str(&mut buf)?;
            let arguments = get_table(&mut buf)?;
            Method::QueueUnbind {
                queue,
                exchange,
                routing_key,
                arguments,
            }
        }
        (CLASS_QUEUE, QUEUE_UNBIND_OK) => Method::QueueUnbindOk,
        (CLASS_QUEUE, QUEUE_PURGE) => {
            need(&buf, 2, "queue.purge ticket")?;
            buf.get_u16();
            let queue = get_short_str(&mut buf)?;
            let mut bits = BitUnpacker::new();
            let no_wait = bits.next(&mut buf)?;
            Method::QueuePurge { queue, no_wait }
        }
        (CLASS_QUEUE, QUEUE_PURGE_OK) => {
            need(&buf, 4, "queue.purge-ok")?;
            Method::QueuePurgeOk {
                message_count: buf.get_u32(),
            }
        }
        (CLASS_QUEUE, QUEUE_DELETE) => {
            need(&buf, 2, "queue.delete ticket")?;
            buf.get_u16();
            let queue = get_short_str(&mut buf)?;
            let mut bits = BitUnpacker::new();
            let if_unused = bits.next(&mut buf)?;
            let if_empty = bits.next(&mut buf)?;
            let no_wait = bits.next(&mut buf)?;
            Method::QueueDelete {
                queue,
                if_unused,
                if_empty,
                no_wait,
            }
        }
        (CLASS_QUEUE, QUEUE_DELETE_OK) => {
            need(&buf, 4, "queue.delete-ok")?;
            Method::QueueDeleteOk {
                message_count: buf.get_u32(),
            }
        }

        (CLASS_BASIC, BASIC_QOS) => {
            need(&buf, 6, "basic.qos")?;
            let prefetch_size = buf.get_u32();
            let prefetch_count = buf.get_u16();
            let mut bits = BitUnpacker::new();
            let global_ = bits.next(&mut buf)?;
            Method::BasicQos {
                prefetch_size,
                prefetch_count,
                global_,
            }
        }
        (CLASS_BASIC, BASIC_QOS_OK) => Method::BasicQosOk,
        (CLASS_BASIC, BASIC_CONSUME) => {
            need(&buf, 2, "basic.consume ticket")?;
            buf.get_u16();
            let queue = get_short_str(&mut buf)?;
            let consumer_tag = get_short_str(&mut buf)?;
            let mut bits = BitUnpacker::new();
            let no_local = bits.next(&mut buf)?;
            let no_ack = bits.next(&mut buf)?;
            let exclusive = bits.next(&mut buf)?;
            let no_wait = bits.next(&mut buf)?;
            let arguments = get_table(&mut buf)?;
            Method::BasicConsume {
                queue,
                consumer_tag,
                no_local,
                no_ack,
                exclusive,
                no_wait,
                arguments,
            }
        }
        (CLASS_BASIC, BASIC_CONSUME_OK) => Method::BasicConsumeOk {
            consumer_tag: get_short_str(&mut buf)?,
        },
        (CLASS_BASIC, BASIC_CANCEL) => {
            let consumer_tag = get_short_str(&mut buf)?;
            let mut bits = BitUnpacker::new();
            let no_wait = bits.next(&mut buf)?;
            Method::BasicCancel { consumer_tag, no_wait }
        }
        (CLASS_BASIC, BASIC_CANCEL_OK) => Method::BasicCancelOk {
            consumer_tag: get_short_str(&mut buf)?,
        },
        (CLASS_BASIC, BASIC_PUBLISH) => {
            need(&buf, 2, "basic.publish ticket")?;
            buf.get_u16();
            let exchange = get_short_str(&mut buf)?;
            let routing_key = get_short_str(&mut buf)?;
            let mut bits = BitUnpacker::new();
            let mandatory = bits.next(&mut buf)?;
            let immediate = bits.next(&mut buf)?;
            Method::BasicPublish {
                exchange,
                routing_key,
                mandatory,
                immediate,
            }
        }
        (CLASS_BASIC, BASIC_RETURN) => {
            need(&buf, 2, "basic.return reply_code")?;
            let reply_code = buf.get_u16();
            let reply_text = get_short_str(&mut buf)?;
            let exchange = get_short_str(&mut buf)?;
            let routing_key = get_short_str(&mut buf)?;
            Method::BasicReturn {
                reply_code,
                reply_text,
                exchange,
                routing_key,
            }
        }
        (CLASS_BASIC, BASIC_DELIVER) => {
            let consumer_tag = get_short_str(&mut buf)?;
            need(&buf, 8, "basic.deliver delivery_tag")?;
            let delivery_tag = buf.get_u64();
            let mut bits = BitUnpacker::new();
            let redelivered = bits.next(&mut buf)?;
            let exchange = get_short_str(&mut buf)?;
            let routing_key = get_short_str(&mut buf)?;
            Method::BasicDeliver {
                consumer_tag,
                delivery_tag,
                redelivered,
                exchange,
                routing_key,
            }
        }
        (CLASS_BASIC, BASIC_GET) => {
            need(&buf, 2, "basic.get ticket")?;
            buf.get_u16();
            let queue = get_short_str(&mut buf)?;
            let mut bits = BitUnpacker::new();
            let no_ack = bits.next(&mut buf)?;
            Method::BasicGet { queue, no_ack }
        }
        (CLASS_BASIC, BASIC_GET_OK) => {
            need(&buf, 8, "basic.get-ok delivery_tag")?;
            let delivery_tag = buf.get_u64();
            let mut bits = BitUnpacker::new();
            let redelivered = bits.next(&mut buf)?;
            let exchange = get_short_str(&mut buf)?;
            let routing_key = get_short_str(&mut buf)?;
            need(&buf, 4, "basic.get-ok message_count")?;
            let message_count = buf.get_u32();
            Method::BasicGetOk {
                delivery_tag,
                redelivered,
                exchange,
                routing_key,
                message_count,
            }
        }
        (CLASS_BASIC, BASIC_GET_EMPTY) => Method::BasicGetEmpty,
        (CLASS_BASIC, BASIC_ACK) => {
            need(&buf, 8, "basic.ack delivery_tag")?;
            let delivery_tag = buf.get_u64();
            let mut bits = BitUnpacker::new();
            let multiple = bits.next(&mut buf)?;
            Method::BasicAck { delivery_tag, multiple }
        }
        (CLASS_BASIC, BASIC_REJECT) => {
            need(&buf, 8, "basic.reject delivery_tag")?;
            let delivery_tag = buf.get_u64();
            let mut bits = BitUnpacker::new();
            let requeue = bits.next(&mut buf)?;
            Method::BasicReject { delivery_tag, requeue }
        }
        (CLASS_BASIC, BASIC_RECOVER_ASYNC) | (CLASS_BASIC, BASIC_RECOVER) => {
            let mut bits = BitUnpacker::new();
            let requeue = bits.next(&mut buf)?;
            if method_id == BASIC_RECOVER_ASYNC {
                Method::BasicRecoverAsync { requeue }
            } else {
                Method::BasicRecover { requeue }
            }
        }
        (CLASS_BASIC, BASIC_RECOVER_OK) => Method::BasicRecoverOk,
        (CLASS_BASIC, BASIC_NACK) => {
            need(&buf, 8, "basic.nack delivery_tag")?;
            let delivery_tag = buf.get_u64();
            let mut bits = BitUnpacker::new();
            let multiple = bits.next(&mut buf)?;
            let requeue = bits.next(&mut buf)?;
            Method::BasicNack {
                delivery_tag,
                multiple,
                requeue,
            }
        }

        (CLASS_TX, TX_SELECT) => Method::TxSelect,
        (CLASS_TX, TX_SELECT_OK) => Method::TxSelectOk,
        (CLASS_TX, TX_COMMIT) => Method::TxCommit,
        (CLASS_TX, TX_COMMIT_OK) => Method::TxCommitOk,
        (CLASS_TX, TX_ROLLBACK) => Method::TxRollback,
        (CLASS_TX, TX_ROLLBACK_OK) => Method::TxRollbackOk,

        (CLASS_CONFIRM, CONFIRM_SELECT) => {
            let mut bits = BitUnpacker::new();
            let no_wait = bits.next(&mut buf)?;
            Method::ConfirmSelect { no_wait }
        }
        (CLASS_CONFIRM, CONFIRM_SELECT_OK) => Method::ConfirmSelectOk,

        _ => {
            return Err(AmqpError::syntax(format!(
                "unknown method (class_id={class_id}, method_id={method_id})"
            )))
        }
    })
}

fn get_long_str_bytes(buf: &mut Bytes) -> Result<Vec<u8>, AmqpError> {
    need(buf, 4, "long string length")?;
    let len = buf.get_u32() as usize;
    need(buf, len, "long string body")?;
    Ok(buf.copy_to_bytes(len).to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(method: Method) {
        let (class_id, method_id) = method.class_and_method();
        let encoded = encode_method(&method);
        let decoded = decode_method(class_id, method_id, &encoded).unwrap();
        assert_eq!(decoded, method);
    }

    #[test]
    fn connection_methods_round_trip() {
        round_trip(Method::ConnectionTune {
            channel_max: 10,
            frame_max: 131072,
            heartbeat: 60,
        });
        round_trip(Method::ConnectionOpen {
            virtual_host: "/".to_string(),
        });
        round_trip(Method::ConnectionClose {
            reply_code: 501,
            reply_text: "bad frame".to_string(),
            class_id: 0,
            method_id: 0,
        });
    }

    #[test]
    fn exchange_declare_round_trips_bit_packed_flags() {
        round_trip(Method::ExchangeDeclare {
            exchange: "logs".to_string(),
            type_: "topic".to_string(),
            passive: false,
            durable: true,
            auto_delete: false,
            internal: false,
            no_wait: true,
            arguments: FieldTable::new(),
        });
    }

    #[test]
    fn basic_publish_and_deliver_round_trip() {
        round_trip(Method::BasicPublish {
            exchange: "".to_string(),
            routing_key: "q".to_string(),
            mandatory: false,
            immediate: false,
        });
        round_trip(Method::BasicDeliver {
            consumer_tag: "ctag-1".to_string(),
            delivery_tag: 7,
            redelivered: false,
            exchange: "".to_string(),
            routing_key: "q".to_string(),
        });
    }

    #[test]
    fn basic_nack_round_trips_two_bits() {
        round_trip(Method::BasicNack {
            delivery_tag: 5,
            multiple: true,
            requeue: false,
        });
    }

    #[test]
    fn catalog_entry_has_synchronous_reply_for_declare() {
        let meta = catalog_entry(CLASS_QUEUE, QUEUE_DECLARE).unwrap();
        assert_eq!(meta.synchronous_reply, Some((CLASS_QUEUE, QUEUE_DECLARE_OK)));
        assert!(!meta.carries_content);
    }

    #[test]
    fn catalog_entry_flags_content_carrying_methods() {
        assert!(catalog_entry(CLASS_BASIC, BASIC_PUBLISH).unwrap().carries_content);
        assert!(catalog_entry(CLASS_BASIC, BASIC_DELIVER).unwrap().carries_content);
        assert!(catalog_entry(CLASS_BASIC, BASIC_RETURN).unwrap().carries_content);
        assert!(catalog_entry(CLASS_BASIC, BASIC_GET_OK).unwrap().carries_content);
    }
}
