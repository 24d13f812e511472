//! AMQP 0-9-1 field value type system
//!
//! This module provides the tagged value type used throughout field tables,
//! field arrays, and content properties: `FieldValue`. Unlike AMQP 1.0's rich
//! composite type system, AMQP 0-9-1 has a single flat tag set (the 2011
//! errata set) shared by table values and array elements.
//!
//! # Tag set
//!
//! | Tag | Domain | Rust representation |
//! |-----|--------|----------------------|
//! | `t` | boolean | `bool` |
//! | `b` | signed byte | `i8` |
//! | `B` | unsigned byte (octet) | `u8` |
//! | `s` | signed short | `i16` |
//! | `u` | unsigned short | `u16` |
//! | `I` | signed long | `i32` |
//! | `i` | unsigned long | `u32` |
//! | `l` | signed longlong | `i64` |
//! | `f` | float | `f32` |
//! | `d` | double | `f64` |
//! | `D` | decimal | `{scale: u8, value: i32}` |
//! | `S` | long string | `String` (or raw bytes for non-UTF-8 payloads) |
//! | `A` | field array | `Vec<FieldValue>` |
//! | `T` | timestamp | `u64` (POSIX seconds) |
//! | `F` | field table | `FieldTable` |
//! | `V` | void | `()` |
//! | `x` | byte array | `Vec<u8>` |

use std::collections::BTreeMap;

/// A decimal value: `value * 10^-scale`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decimal {
    pub scale: u8,
    pub value: i32,
}

impl Decimal {
    pub fn new(scale: u8, value: i32) -> Self {
        Decimal { scale, value }
    }

    pub fn to_f64(&self) -> f64 {
        self.value as f64 * 10f64.powi(-(self.scale as i32))
    }
}

/// An ordered association of short-string keys to tagged values.
///
/// Keys preserve insertion order on encode; `BTreeMap` is used for storage
/// since field table keys are compared by exact byte equality and ordering
/// doesn't affect protocol correctness (unlike, say, HTTP headers).
pub type FieldTable = BTreeMap<String, FieldValue>;

/// A single AMQP 0-9-1 field-table/array value, tagged per the 2011 errata.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Boolean(bool),
    ShortShortInt(i8),
    ShortShortUint(u8),
    ShortInt(i16),
    ShortUint(u16),
    LongInt(i32),
    LongUint(u32),
    LongLongInt(i64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    LongString(String),
    Array(Vec<FieldValue>),
    Timestamp(u64),
    Table(FieldTable),
    Void,
    ByteArray(Vec<u8>),
}

impl FieldValue {
    /// The wire tag byte for this value's domain.
    pub fn tag(&self) -> u8 {
        match self {
            FieldValue::Boolean(_) => b't',
            FieldValue::ShortShortInt(_) => b'b',
            FieldValue::ShortShortUint(_) => b'B',
            FieldValue::ShortInt(_) => b's',
            FieldValue::ShortUint(_) => b'u',
            FieldValue::LongInt(_) => b'I',
            FieldValue::LongUint(_) => b'i',
            FieldValue::LongLongInt(_) => b'l',
            FieldValue::Float(_) => b'f',
            FieldValue::Double(_) => b'd',
            FieldValue::Decimal(_) => b'D',
            FieldValue::LongString(_) => b'S',
            FieldValue::Array(_) => b'A',
            FieldValue::Timestamp(_) => b'T',
            FieldValue::Table(_) => b'F',
            FieldValue::Void => b'V',
            FieldValue::ByteArray(_) => b'x',
        }
    }

    /// Build the narrowest signed-integer `FieldValue` that fits `v`,
    /// falling back to `l` (64-bit signed) for values outside `i32` range.
    ///
    /// Mirrors the host-integer auto-tagging a caller gets for free when
    /// building a table from native types rather than explicit `FieldValue`s.
    pub fn from_i64(v: i64) -> Self {
        if let Ok(v) = i8::try_from(v) {
            FieldValue::ShortShortInt(v)
        } else if let Ok(v) = i16::try_from(v) {
            FieldValue::ShortInt(v)
        } else if let Ok(v) = i32::try_from(v) {
            FieldValue::LongInt(v)
        } else {
            FieldValue::LongLongInt(v)
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::from_i64(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::LongString(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::LongString(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrowest_signed_tag_is_chosen() {
        assert!(matches!(FieldValue::from_i64(1), FieldValue::ShortShortInt(1)));
        assert!(matches!(FieldValue::from_i64(1000), FieldValue::ShortInt(1000)));
        assert!(matches!(FieldValue::from_i64(100_000), FieldValue::LongInt(100_000)));
        assert!(matches!(FieldValue::from_i64(i64::MAX), FieldValue::LongLongInt(_)));
    }

    #[test]
    fn decimal_to_f64() {
        let d = Decimal::new(2, 12345);
        assert!((d.to_f64() - 123.45).abs() < 1e-9);
    }

    #[test]
    fn tag_bytes_match_errata() {
        assert_eq!(FieldValue::Boolean(true).tag(), b't');
        assert_eq!(FieldValue::Table(FieldTable::new()).tag(), b'F');
        assert_eq!(FieldValue::Void.tag(), b'V');
    }
}
