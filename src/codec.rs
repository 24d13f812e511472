//! AMQP 0-9-1 binary encoding and decoding
//!
//! This module is the only place in the crate that touches raw bytes. It
//! provides three layers, each building on the last:
//!
//! - primitive domain encode/decode (`encode_short_string`, `decode_long`, …)
//! - field table / field array encode/decode (recursive, length-prefixed)
//! - frame-level encode/decode (`encode_frame`/`decode_frame`), used by the
//!   connection engine to turn a byte stream into `Frame`s and back
//!
//! Nothing here owns any state beyond the buffer it is handed; there is no
//! notion of a connection or a channel at this layer.
//!
//! # Examples
//!
//! ```rust
//! use amqp091_proto::codec::{encode_frame, decode_frame, DecodeOutcome, FrameKind};
//!
//! let payload = vec![0u8; 4];
//! let framed = encode_frame(FrameKind::Method, 0, &payload);
//! match decode_frame(&framed) {
//!     DecodeOutcome::Frame(frame, consumed) => {
//!         assert_eq!(consumed, framed.len());
//!         assert_eq!(frame.channel_id, 0);
//!     }
//!     _ => unreachable!(),
//! }
//! ```

use bytes::{Buf, BufMut, BytesMut};
use crate::error::AmqpError;
use crate::types::{Decimal, FieldTable, FieldValue};

/// Frame end sentinel byte (AMQP 0-9-1 §2.3.5).
pub const FRAME_END: u8 = 0xCE;

/// Minimum frame size accepted before tuning negotiation completes.
pub const FRAME_MIN_SIZE: u32 = 4096;

/// Literal protocol header for AMQP 0-9-1 with the 2011 errata.
pub const PROTOCOL_HEADER: [u8; 8] = [0x41, 0x4D, 0x51, 0x50, 0x00, 0x00, 0x09, 0x01];

/// Frame type tag, carried in the first octet of every non-header frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Method = 1,
    ContentHeader = 2,
    ContentBody = 3,
    Heartbeat = 8,
}

impl FrameKind {
    fn from_u8(b: u8) -> Option<Self> {
        match b {
            1 => Some(FrameKind::Method),
            2 => Some(FrameKind::ContentHeader),
            3 => Some(FrameKind::ContentBody),
            8 => Some(FrameKind::Heartbeat),
            _ => None,
        }
    }
}

/// A decoded frame, stripped of its envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub kind: FrameKind,
    pub channel_id: u16,
    pub payload: Vec<u8>,
}

/// Result of attempting to decode one frame out of a byte buffer.
pub enum DecodeOutcome {
    /// A full frame was decoded; the `usize` is how many bytes it consumed.
    Frame(Frame, usize),
    /// Not enough bytes buffered yet; try again once more data arrives.
    Incomplete,
    /// The buffer does not hold a well-formed frame (wrong sentinel or
    /// unknown frame type).
    BadFrame(AmqpError),
}

/// Encode a frame: `type(u8) | channel_id(u16) | length(u32) | payload | 0xCE`.
pub fn encode_frame(kind: FrameKind, channel_id: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(7 + payload.len() + 1);
    buf.put_u8(kind as u8);
    buf.put_u16(channel_id);
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    buf.put_u8(FRAME_END);
    buf.to_vec()
}

/// Decode the next frame from the front of `buf`, if one is fully present.
pub fn decode_frame(buf: &[u8]) -> DecodeOutcome {
    if buf.len() < 7 {
        return DecodeOutcome::Incomplete;
    }
    let kind_byte = buf[0];
    let channel_id = u16::from_be_bytes([buf[1], buf[2]]);
    let length = u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]) as usize;
    let total = 7 + length + 1;
    if buf.len() < total {
        return DecodeOutcome::Incomplete;
    }
    let kind = match FrameKind::from_u8(kind_byte) {
        Some(k) => k,
        None => {
            return DecodeOutcome::BadFrame(AmqpError::framing(format!(
                "unknown frame type {kind_byte}"
            )))
        }
    };
    if buf[total - 1] != FRAME_END {
        return DecodeOutcome::BadFrame(AmqpError::framing("missing frame-end sentinel"));
    }
    let payload = buf[7..7 + length].to_vec();
    DecodeOutcome::Frame(
        Frame {
            kind,
            channel_id,
            payload,
        },
        total,
    )
}

// ---------------------------------------------------------------------
// Primitive domain encode/decode
// ---------------------------------------------------------------------

pub fn encode_short_string(buf: &mut BytesMut, s: &str) -> Result<(), AmqpError> {
    if s.len() > u8::MAX as usize {
        return Err(AmqpError::syntax("short string longer than 255 bytes"));
    }
    buf.put_u8(s.len() as u8);
    buf.put_slice(s.as_bytes());
    Ok(())
}

pub fn decode_short_string(buf: &mut impl Buf) -> Result<String, AmqpError> {
    if buf.remaining() < 1 {
        return Err(AmqpError::framing("truncated short string length"));
    }
    let len = buf.get_u8() as usize;
    if buf.remaining() < len {
        return Err(AmqpError::framing("truncated short string body"));
    }
    let mut bytes = vec![0u8; len];
    buf.copy_to_slice(&mut bytes);
    String::from_utf8(bytes).map_err(|e| AmqpError::syntax(format!("short string not utf-8: {e}")))
}

pub fn encode_long_string(buf: &mut BytesMut, s: &str) {
    buf.put_u32(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

pub fn decode_long_string(buf: &mut impl Buf) -> Result<String, AmqpError> {
    if buf.remaining() < 4 {
        return Err(AmqpError::framing("truncated long string length"));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(AmqpError::framing("truncated long string body"));
    }
    let mut bytes = vec![0u8; len];
    buf.copy_to_slice(&mut bytes);
    String::from_utf8(bytes).map_err(|e| AmqpError::syntax(format!("long string not utf-8: {e}")))
}

pub fn encode_byte_array(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u32(data.len() as u32);
    buf.put_slice(data);
}

pub fn decode_byte_array(buf: &mut impl Buf) -> Result<Vec<u8>, AmqpError> {
    if buf.remaining() < 4 {
        return Err(AmqpError::framing("truncated byte array length"));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(AmqpError::framing("truncated byte array body"));
    }
    let mut bytes = vec![0u8; len];
    buf.copy_to_slice(&mut bytes);
    Ok(bytes)
}

/// Encode a field value, including its leading tag byte.
pub fn encode_field_value(buf: &mut BytesMut, value: &FieldValue) {
    buf.put_u8(value.tag());
    match value {
        FieldValue::Boolean(b) => buf.put_u8(if *b { 1 } else { 0 }),
        FieldValue::ShortShortInt(v) => buf.put_i8(*v),
        FieldValue::ShortShortUint(v) => buf.put_u8(*v),
        FieldValue::ShortInt(v) => buf.put_i16(*v),
        FieldValue::ShortUint(v) => buf.put_u16(*v),
        FieldValue::LongInt(v) => buf.put_i32(*v),
        FieldValue::LongUint(v) => buf.put_u32(*v),
        FieldValue::LongLongInt(v) => buf.put_i64(*v),
        FieldValue::Float(v) => buf.put_f32(*v),
        FieldValue::Double(v) => buf.put_f64(*v),
        FieldValue::Decimal(d) => {
            buf.put_u8(d.scale);
            buf.put_i32(d.value);
        }
        FieldValue::LongString(s) => encode_long_string(buf, s),
        FieldValue::Array(items) => encode_field_array(buf, items),
        FieldValue::Timestamp(t) => buf.put_u64(*t),
        FieldValue::Table(t) => encode_table(buf, t),
        FieldValue::Void => {}
        FieldValue::ByteArray(data) => encode_byte_array(buf, data),
    }
}

pub fn decode_field_value(buf: &mut impl Buf) -> Result<FieldValue, AmqpError> {
    if buf.remaining() < 1 {
        return Err(AmqpError::framing("truncated field value tag"));
    }
    let tag = buf.get_u8();
    Ok(match tag {
        b't' => {
            if buf.remaining() < 1 {
                return Err(AmqpError::framing("truncated boolean"));
            }
            FieldValue::Boolean(buf.get_u8() != 0)
        }
        b'b' => FieldValue::ShortShortInt(read_i8(buf)?),
        b'B' => FieldValue::ShortShortUint(read_u8(buf)?),
        b's' => FieldValue::ShortInt(read_i16(buf)?),
        b'u' => FieldValue::ShortUint(read_u16(buf)?),
        b'I' => FieldValue::LongInt(read_i32(buf)?),
        b'i' => FieldValue::LongUint(read_u32(buf)?),
        b'l' => FieldValue::LongLongInt(read_i64(buf)?),
        b'f' => FieldValue::Float(f32::from_bits(read_u32(buf)?)),
        b'd' => FieldValue::Double(f64::from_bits(read_u64(buf)?)),
        b'D' => {
            let scale = read_u8(buf)?;
            let value = read_i32(buf)?;
            FieldValue::Decimal(Decimal::new(scale, value))
        }
        b'S' => FieldValue::LongString(decode_long_string(buf)?),
        b'A' => FieldValue::Array(decode_field_array(buf)?),
        b'T' => FieldValue::Timestamp(read_u64(buf)?),
        b'F' => FieldValue::Table(decode_table(buf)?),
        b'V' => FieldValue::Void,
        b'x' => FieldValue::ByteArray(decode_byte_array(buf)?),
        other => return Err(AmqpError::framing(format!("unknown field value tag {other:#x}"))),
    })
}

fn read_u8(buf: &mut impl Buf) -> Result<u8, AmqpError> {
    if buf.remaining() < 1 {
        return Err(AmqpError::framing("truncated u8"));
    }
    Ok(buf.get_u8())
}
fn read_i8(buf: &mut impl Buf) -> Result<i8, AmqpError> {
    Ok(read_u8(buf)? as i8)
}
fn read_u16(buf: &mut impl Buf) -> Result<u16, AmqpError> {
    if buf.remaining() < 2 {
        return Err(AmqpError::framing("truncated u16"));
    }
    Ok(buf.get_u16())
}
fn read_i16(buf: &mut impl Buf) -> Result<i16, AmqpError> {
    Ok(read_u16(buf)? as i16)
}
fn read_u32(buf: &mut impl Buf) -> Result<u32, AmqpError> {
    if buf.remaining() < 4 {
        return Err(AmqpError::framing("truncated u32"));
    }
    Ok(buf.get_u32())
}
fn read_i32(buf: &mut impl Buf) -> Result<i32, AmqpError> {
    Ok(read_u32(buf)? as i32)
}
fn read_u64(buf: &mut impl Buf) -> Result<u64, AmqpError> {
    if buf.remaining() < 8 {
        return Err(AmqpError::framing("truncated u64"));
    }
    Ok(buf.get_u64())
}
fn read_i64(buf: &mut impl Buf) -> Result<i64, AmqpError> {
    Ok(read_u64(buf)? as i64)
}

/// Field arrays share the field table's `u32` length prefix, but the prefix
/// counts encoded bytes rather than element count.
pub fn encode_field_array(buf: &mut BytesMut, items: &[FieldValue]) {
    let mut body = BytesMut::new();
    for item in items {
        encode_field_value(&mut body, item);
    }
    buf.put_u32(body.len() as u32);
    buf.put_slice(&body);
}

pub fn decode_field_array(buf: &mut impl Buf) -> Result<Vec<FieldValue>, AmqpError> {
    if buf.remaining() < 4 {
        return Err(AmqpError::framing("truncated field array length"));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(AmqpError::framing("truncated field array body"));
    }
    let mut body = buf.copy_to_bytes(len);
    let mut items = Vec::new();
    while body.has_remaining() {
        items.push(decode_field_value(&mut body)?);
    }
    Ok(items)
}

/// `u32`-length-prefixed body of `key:shortstr | tag:u8 | value` pairs.
pub fn encode_table(buf: &mut BytesMut, table: &FieldTable) {
    let mut body = BytesMut::new();
    for (key, value) in table {
        // key length is bounded by `encode_short_string`'s own check; table
        // keys built through this crate's API are always short enough.
        let _ = encode_short_string(&mut body, key);
        encode_field_value(&mut body, value);
    }
    buf.put_u32(body.len() as u32);
    buf.put_slice(&body);
}

pub fn decode_table(buf: &mut impl Buf) -> Result<FieldTable, AmqpError> {
    if buf.remaining() < 4 {
        return Err(AmqpError::framing("truncated table length"));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(AmqpError::framing("truncated table body"));
    }
    let mut body = buf.copy_to_bytes(len);
    let mut table = FieldTable::new();
    while body.has_remaining() {
        let key = decode_short_string(&mut body)?;
        let value = decode_field_value(&mut body)?;
        table.insert(key, value);
    }
    Ok(table)
}

// ---------------------------------------------------------------------
// Bit-field packing helper, shared by method and property encoding
// ---------------------------------------------------------------------

/// Accumulates consecutive `bit` fields LSB-first into shared octets; any
/// non-bit field flushes the pending octet before encoding its own value.
#[derive(Default)]
pub struct BitPacker {
    pending: u8,
    count: u8,
}

impl BitPacker {
    pub fn new() -> Self {
        BitPacker::default()
    }

    pub fn push(&mut self, buf: &mut BytesMut, bit: bool) {
        if bit {
            self.pending |= 1 << self.count;
        }
        self.count += 1;
        if self.count == 8 {
            buf.put_u8(self.pending);
            self.pending = 0;
            self.count = 0;
        }
    }

    pub fn flush(&mut self, buf: &mut BytesMut) {
        if self.count > 0 {
            buf.put_u8(self.pending);
            self.pending = 0;
            self.count = 0;
        }
    }
}

/// Mirror of `BitPacker` for decoding: reads octets on demand, handing back
/// one bit at a time LSB-first.
#[derive(Default)]
pub struct BitUnpacker {
    current: u8,
    count: u8,
}

impl BitUnpacker {
    pub fn new() -> Self {
        BitUnpacker::default()
    }

    pub fn next(&mut self, buf: &mut impl Buf) -> Result<bool, AmqpError> {
        if self.count == 0 {
            self.current = read_u8(buf)?;
            self.count = 8;
        }
        let bit = self.current & 1 != 0;
        self.current >>= 1;
        self.count -= 1;
        Ok(bit)
    }

    /// Discard any unread bits in the current octet; called whenever a
    /// non-bit field follows.
    pub fn reset(&mut self) {
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trip() {
        let payload = vec![1, 2, 3, 4, 5];
        let encoded = encode_frame(FrameKind::Method, 7, &payload);
        assert_eq!(*encoded.last().unwrap(), FRAME_END);
        match decode_frame(&encoded) {
            DecodeOutcome::Frame(frame, consumed) => {
                assert_eq!(consumed, encoded.len());
                assert_eq!(frame.channel_id, 7);
                assert_eq!(frame.payload, payload);
                assert!(matches!(frame.kind, FrameKind::Method));
            }
            _ => panic!("expected a complete frame"),
        }
    }

    #[test]
    fn decode_frame_incomplete_on_short_buffer() {
        let encoded = encode_frame(FrameKind::Heartbeat, 0, &[]);
        assert!(matches!(
            decode_frame(&encoded[..encoded.len() - 2]),
            DecodeOutcome::Incomplete
        ));
    }

    #[test]
    fn decode_frame_bad_sentinel() {
        let mut encoded = encode_frame(FrameKind::Method, 0, &[0x01]);
        let last = encoded.len() - 1;
        encoded[last] = 0x00;
        assert!(matches!(decode_frame(&encoded), DecodeOutcome::BadFrame(_)));
    }

    #[test]
    fn short_string_round_trip() {
        let mut buf = BytesMut::new();
        encode_short_string(&mut buf, "hello").unwrap();
        let mut frozen = buf.freeze();
        assert_eq!(decode_short_string(&mut frozen).unwrap(), "hello");
    }

    #[test]
    fn short_string_rejects_overlong() {
        let long = "x".repeat(256);
        let mut buf = BytesMut::new();
        assert!(encode_short_string(&mut buf, &long).is_err());
    }

    #[test]
    fn table_round_trip_with_nested_array() {
        let mut table = FieldTable::new();
        table.insert("LOGIN".to_string(), FieldValue::LongString("guest".to_string()));
        table.insert(
            "nums".to_string(),
            FieldValue::Array(vec![FieldValue::from_i64(1), FieldValue::from_i64(300)]),
        );
        let mut buf = BytesMut::new();
        encode_table(&mut buf, &table);
        let mut frozen = buf.freeze();
        let decoded = decode_table(&mut frozen).unwrap();
        assert_eq!(decoded, table);
    }

    #[test]
    fn decimal_round_trip() {
        let mut buf = BytesMut::new();
        let value = FieldValue::Decimal(Decimal::new(2, 12345));
        encode_field_value(&mut buf, &value);
        let mut frozen = buf.freeze();
        assert_eq!(decode_field_value(&mut frozen).unwrap(), value);
    }

    #[test]
    fn bit_packer_packs_lsb_first_and_flushes_on_demand() {
        let mut buf = BytesMut::new();
        let mut packer = BitPacker::new();
        packer.push(&mut buf, true);
        packer.push(&mut buf, false);
        packer.push(&mut buf, true);
        packer.flush(&mut buf);
        assert_eq!(buf.to_vec(), vec![0b0000_0101]);

        let mut frozen = buf.freeze();
        let mut unpacker = BitUnpacker::new();
        assert_eq!(unpacker.next(&mut frozen).unwrap(), true);
        assert_eq!(unpacker.next(&mut frozen).unwrap(), false);
        assert_eq!(unpacker.next(&mut frozen).unwrap(), true);
    }

    #[test]
    fn protocol_header_is_bit_exact() {
        assert_eq!(PROTOCOL_HEADER, [0x41, 0x4D, 0x51, 0x50, 0x00, 0x00, 0x09, 0x01]);
    }
}
