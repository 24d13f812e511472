//! Content: the method-independent payload AMQP attaches to Basic.Publish,
//! Basic.Deliver, Basic.Return, and Basic.Get-Ok.
//!
//! A content consists of a content-header frame (class id, total body size,
//! and a class-specific properties record) followed by zero or more
//! content-body frames. This module owns the properties codec and the
//! `Content` value assembled from the header and body frames; the method
//! frame itself (with its delivery/publish-specific fields) is owned by
//! whichever `channel` event carries it.

use bytes::{Buf, BufMut, BytesMut};
use crate::codec::{self, BitPacker, BitUnpacker};
use crate::error::AmqpError;
use crate::types::FieldTable;

/// Class id for `Basic`, the only class this crate encodes properties for.
pub const CLASS_BASIC: u16 = 60;

/// `Basic` class content properties, in wire order. Every field is
/// optional; presence is tracked by the flag word, not by a sentinel value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasicProperties {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub headers: Option<FieldTable>,
    pub delivery_mode: Option<u8>,
    pub priority: Option<u8>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub expiration: Option<String>,
    pub message_id: Option<String>,
    pub timestamp: Option<u64>,
    pub type_: Option<String>,
    pub user_id: Option<String>,
    pub app_id: Option<String>,
    // cluster_id is reserved/deprecated: always encoded empty, never
    // surfaced as a field here.
}

impl BasicProperties {
    pub fn persistent() -> Self {
        BasicProperties {
            delivery_mode: Some(2),
            ..Default::default()
        }
    }
}

/// Number of live (non-reserved) `Basic` properties, used to place the
/// continuation bit. `cluster_id` is the 14th slot but is never exposed.
const BASIC_PROPERTY_COUNT: usize = 13;

pub fn encode_basic_properties(props: &BasicProperties) -> Vec<u8> {
    let mut buf = BytesMut::new();
    let present = [
        props.content_type.is_some(),
        props.content_encoding.is_some(),
        props.headers.is_some(),
        props.delivery_mode.is_some(),
        props.priority.is_some(),
        props.correlation_id.is_some(),
        props.reply_to.is_some(),
        props.expiration.is_some(),
        props.message_id.is_some(),
        props.timestamp.is_some(),
        props.type_.is_some(),
        props.user_id.is_some(),
        props.app_id.is_some(),
        false, // cluster_id, always absent
    ];
    debug_assert_eq!(present.len(), BASIC_PROPERTY_COUNT + 1);

    // 16-bit flag word: bit 15 is the first property, bit 0 is the
    // continuation bit (always 0, since Basic never needs a second word).
    let mut flags: u16 = 0;
    for (i, p) in present.iter().enumerate() {
        if *p {
            flags |= 1 << (15 - i);
        }
    }
    buf.put_u16(flags);

    if let Some(v) = &props.content_type {
        let _ = codec::encode_short_string(&mut buf, v);
    }
    if let Some(v) = &props.content_encoding {
        let _ = codec::encode_short_string(&mut buf, v);
    }
    if let Some(v) = &props.headers {
        codec::encode_table(&mut buf, v);
    }
    if let Some(v) = props.delivery_mode {
        buf.put_u8(v);
    }
    if let Some(v) = props.priority {
        buf.put_u8(v);
    }
    if let Some(v) = &props.correlation_id {
        let _ = codec::encode_short_string(&mut buf, v);
    }
    if let Some(v) = &props.reply_to {
        let _ = codec::encode_short_string(&mut buf, v);
    }
    if let Some(v) = &props.expiration {
        let _ = codec::encode_short_string(&mut buf, v);
    }
    if let Some(v) = &props.message_id {
        let _ = codec::encode_short_string(&mut buf, v);
    }
    if let Some(v) = props.timestamp {
        buf.put_u64(v);
    }
    if let Some(v) = &props.type_ {
        let _ = codec::encode_short_string(&mut buf, v);
    }
    if let Some(v) = &props.user_id {
        let _ = codec::encode_short_string(&mut buf, v);
    }
    if let Some(v) = &props.app_id {
        let _ = codec::encode_short_string(&mut buf, v);
    }
    // cluster_id omitted: reserved field is never encoded for Basic.

    buf.to_vec()
}

pub fn decode_basic_properties(data: &[u8]) -> Result<BasicProperties, AmqpError> {
    let mut buf = bytes::Bytes::copy_from_slice(data);
    if buf.remaining() < 2 {
        return Err(AmqpError::framing("truncated properties flag word"));
    }
    let flags = buf.get_u16();
    if flags & 1 != 0 {
        return Err(AmqpError::not_implemented(
            "content header property flag continuation is not supported",
        ));
    }

    let mut props = BasicProperties::default();
    let present = |bit: u8| flags & (1 << (15 - bit)) != 0;

    if present(0) {
        props.content_type = Some(codec::decode_short_string(&mut buf)?);
    }
    if present(1) {
        props.content_encoding = Some(codec::decode_short_string(&mut buf)?);
    }
    if present(2) {
        props.headers = Some(codec::decode_table(&mut buf)?);
    }
    if present(3) {
        if !buf.has_remaining() {
            return Err(AmqpError::framing("truncated delivery_mode"));
        }
        props.delivery_mode = Some(buf.get_u8());
    }
    if present(4) {
        if !buf.has_remaining() {
            return Err(AmqpError::framing("truncated priority"));
        }
        props.priority = Some(buf.get_u8());
    }
    if present(5) {
        props.correlation_id = Some(codec::decode_short_string(&mut buf)?);
    }
    if present(6) {
        props.reply_to = Some(codec::decode_short_string(&mut buf)?);
    }
    if present(7) {
        props.expiration = Some(codec::decode_short_string(&mut buf)?);
    }
    if present(8) {
        props.message_id = Some(codec::decode_short_string(&mut buf)?);
    }
    if present(9) {
        if buf.remaining() < 8 {
            return Err(AmqpError::framing("truncated timestamp"));
        }
        props.timestamp = Some(buf.get_u64());
    }
    if present(10) {
        props.type_ = Some(codec::decode_short_string(&mut buf)?);
    }
    if present(11) {
        props.user_id = Some(codec::decode_short_string(&mut buf)?);
    }
    if present(12) {
        props.app_id = Some(codec::decode_short_string(&mut buf)?);
    }
    // bit 13 (cluster_id) is ignored on decode even if a peer sets it.

    Ok(props)
}

/// A content-header frame payload: `class_id | weight(reserved=0) | body_size | properties`.
pub struct ContentHeader {
    pub class_id: u16,
    pub body_size: u64,
    pub properties: BasicProperties,
}

pub fn encode_content_header(header: &ContentHeader) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u16(header.class_id);
    buf.put_u16(0); // weight, reserved
    buf.put_u64(header.body_size);
    buf.put_slice(&encode_basic_properties(&header.properties));
    buf.to_vec()
}

pub fn decode_content_header(data: &[u8]) -> Result<ContentHeader, AmqpError> {
    let mut buf = bytes::Bytes::copy_from_slice(data);
    if buf.remaining() < 12 {
        return Err(AmqpError::framing("truncated content header"));
    }
    let class_id = buf.get_u16();
    let _weight = buf.get_u16();
    let body_size = buf.get_u64();
    let properties = decode_basic_properties(&buf)?;
    Ok(ContentHeader {
        class_id,
        body_size,
        properties,
    })
}

/// A fully assembled logical message: properties plus accumulated body.
/// `delivery_info` carries whichever method brought this content in
/// (Deliver, Return, or Get-Ok); it is opaque to this module.
#[derive(Debug, Clone, PartialEq)]
pub struct Content {
    pub properties: BasicProperties,
    pub body: Vec<u8>,
}

/// Split a message body into `frame_max - 8` byte chunks for ContentBody
/// framing. Returns one empty chunk is never produced for an empty body;
/// callers emit zero body frames when `body.is_empty()`.
pub fn chunk_body(body: &[u8], frame_max: u32) -> Vec<&[u8]> {
    if body.is_empty() {
        return Vec::new();
    }
    let chunk_size = (frame_max as usize).saturating_sub(8).max(1);
    body.chunks(chunk_size).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_properties_round_trip_sparse() {
        let props = BasicProperties {
            content_type: Some("text/plain".to_string()),
            delivery_mode: Some(2),
            priority: Some(5),
            ..Default::default()
        };
        let encoded = encode_basic_properties(&props);
        let decoded = decode_basic_properties(&encoded).unwrap();
        assert_eq!(decoded, props);
    }

    #[test]
    fn basic_properties_round_trip_full() {
        let mut headers = FieldTable::new();
        headers.insert("x-match".to_string(), crate::types::FieldValue::LongString("all".to_string()));
        let props = BasicProperties {
            content_type: Some("application/json".to_string()),
            content_encoding: Some("utf-8".to_string()),
            headers: Some(headers),
            delivery_mode: Some(2),
            priority: Some(9),
            correlation_id: Some("corr-1".to_string()),
            reply_to: Some("reply-queue".to_string()),
            expiration: Some("60000".to_string()),
            message_id: Some("msg-1".to_string()),
            timestamp: Some(1_700_000_000),
            type_: Some("order".to_string()),
            user_id: Some("guest".to_string()),
            app_id: Some("my-app".to_string()),
        };
        let encoded = encode_basic_properties(&props);
        let decoded = decode_basic_properties(&encoded).unwrap();
        assert_eq!(decoded, props);
    }

    #[test]
    fn continuation_bit_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u16(0x0001); // only the continuation bit set
        assert!(decode_basic_properties(&buf).is_err());
    }

    #[test]
    fn content_header_round_trip() {
        let header = ContentHeader {
            class_id: CLASS_BASIC,
            body_size: 12,
            properties: BasicProperties::persistent(),
        };
        let encoded = encode_content_header(&header);
        let decoded = decode_content_header(&encoded).unwrap();
        assert_eq!(decoded.class_id, CLASS_BASIC);
        assert_eq!(decoded.body_size, 12);
        assert_eq!(decoded.properties, header.properties);
    }

    #[test]
    fn chunk_body_splits_on_frame_max() {
        let body = vec![0u8; 20];
        let chunks = chunk_body(&body, 10);
        assert_eq!(chunks.len(), 3); // 2 bytes of payload per frame after overhead
        assert!(chunk_body(&[], 100).is_empty());
    }

    #[test]
    fn bit_helpers_are_exported_for_method_codec_reuse() {
        let mut buf = BytesMut::new();
        let mut packer = BitPacker::new();
        packer.push(&mut buf, true);
        packer.flush(&mut buf);
        let mut frozen = buf.freeze();
        let mut unpacker = BitUnpacker::new();
        assert!(unpacker.next(&mut frozen).unwrap());
    }
}
