//! AMQP field domains and their wire encoding.
//!
//! Method arguments are serialized back to back in declaration order with no
//! padding. Consecutive `bit` arguments share octets, least significant bit
//! first, eight to an octet; any other argument closes the current octet.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Maximum length of a short string.
pub const MAX_SHORT_STRING_LENGTH: usize = 255;

/// Deepest nesting of tables and arrays accepted inside a field table.
pub const MAX_TABLE_DEPTH: usize = 64;

/// Errors raised while reading or writing method arguments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// The payload ended in the middle of a value.
    #[error("Unexpected end of payload while reading {0}")]
    Truncated(&'static str),

    /// A short string longer than 255 bytes was supplied for encoding.
    #[error("Short string of {0} bytes exceeds 255")]
    ShortStringTooLong(usize),

    /// A field table entry carried an unknown type tag.
    #[error("Unknown field table value type {0:#04x}")]
    UnknownTableType(u8),

    /// A field table key was not valid UTF-8.
    #[error("Field table key is not valid UTF-8")]
    InvalidKey,

    /// A field table key is longer than a short string allows.
    #[error("Field table key of {0} bytes exceeds 255")]
    KeyTooLong(usize),

    /// Tables and arrays were nested deeper than [`MAX_TABLE_DEPTH`].
    #[error("Field table nested deeper than {MAX_TABLE_DEPTH} levels")]
    NestingTooDeep,

    /// Bytes remained after the last declared argument.
    #[error("{0} trailing bytes after the last argument")]
    TrailingBytes(usize),

    /// A value did not match the declared argument domain.
    #[error("Argument '{field}' expects {expected}, got {actual}")]
    TypeMismatch {
        field: &'static str,
        expected: FieldType,
        actual: FieldType,
    },

    /// The number of values did not match the declared arguments.
    #[error("Expected {expected} arguments, got {actual}")]
    Arity { expected: usize, actual: usize },

    /// No argument with this name is declared for the method.
    #[error("No argument named '{0}'")]
    NoSuchField(String),
}

/// The domain of a declared method argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Octet,
    Short,
    Long,
    LongLong,
    Bit,
    ShortStr,
    LongStr,
    Timestamp,
    Table,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FieldType::Octet => "octet",
            FieldType::Short => "short",
            FieldType::Long => "long",
            FieldType::LongLong => "longlong",
            FieldType::Bit => "bit",
            FieldType::ShortStr => "shortstr",
            FieldType::LongStr => "longstr",
            FieldType::Timestamp => "timestamp",
            FieldType::Table => "table",
        };
        f.write_str(name)
    }
}

/// A declared method argument: wire name and domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
}

/// A decoded (or to-be-encoded) method argument.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Octet(u8),
    Short(u16),
    Long(u32),
    LongLong(u64),
    Bit(bool),
    ShortStr(Bytes),
    LongStr(Bytes),
    Timestamp(u64),
    Table(FieldTable),
}

impl FieldValue {
    /// The domain of this value.
    #[must_use]
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Octet(_) => FieldType::Octet,
            FieldValue::Short(_) => FieldType::Short,
            FieldValue::Long(_) => FieldType::Long,
            FieldValue::LongLong(_) => FieldType::LongLong,
            FieldValue::Bit(_) => FieldType::Bit,
            FieldValue::ShortStr(_) => FieldType::ShortStr,
            FieldValue::LongStr(_) => FieldType::LongStr,
            FieldValue::Timestamp(_) => FieldType::Timestamp,
            FieldValue::Table(_) => FieldType::Table,
        }
    }

    /// Short string value from a `&str`.
    #[must_use]
    pub fn short_str(s: &str) -> Self {
        FieldValue::ShortStr(Bytes::copy_from_slice(s.as_bytes()))
    }

    /// Long string value from raw bytes.
    #[must_use]
    pub fn long_str(data: impl Into<Bytes>) -> Self {
        FieldValue::LongStr(data.into())
    }

    /// The zero value of a domain.
    #[must_use]
    pub fn default_for(ty: FieldType) -> Self {
        match ty {
            FieldType::Octet => FieldValue::Octet(0),
            FieldType::Short => FieldValue::Short(0),
            FieldType::Long => FieldValue::Long(0),
            FieldType::LongLong => FieldValue::LongLong(0),
            FieldType::Bit => FieldValue::Bit(false),
            FieldType::ShortStr => FieldValue::ShortStr(Bytes::new()),
            FieldType::LongStr => FieldValue::LongStr(Bytes::new()),
            FieldType::Timestamp => FieldValue::Timestamp(0),
            FieldType::Table => FieldValue::Table(FieldTable::new()),
        }
    }
}

/// A value stored in a field table.
#[derive(Debug, Clone, PartialEq)]
pub enum TableValue {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    F32(f32),
    F64(f64),
    Decimal { scale: u8, value: u32 },
    LongStr(Bytes),
    Bytes(Bytes),
    Timestamp(u64),
    Table(FieldTable),
    Array(Vec<TableValue>),
    Void,
}

impl TableValue {
    fn tag(&self) -> u8 {
        match self {
            TableValue::Bool(_) => b't',
            TableValue::I8(_) => b'b',
            TableValue::U8(_) => b'B',
            TableValue::I16(_) => b's',
            TableValue::U16(_) => b'u',
            TableValue::I32(_) => b'I',
            TableValue::U32(_) => b'i',
            TableValue::I64(_) => b'l',
            TableValue::F32(_) => b'f',
            TableValue::F64(_) => b'd',
            TableValue::Decimal { .. } => b'D',
            TableValue::LongStr(_) => b'S',
            TableValue::Bytes(_) => b'x',
            TableValue::Timestamp(_) => b'T',
            TableValue::Table(_) => b'F',
            TableValue::Array(_) => b'A',
            TableValue::Void => b'V',
        }
    }

    fn encoded_len(&self) -> usize {
        1 + match self {
            TableValue::Bool(_) | TableValue::I8(_) | TableValue::U8(_) => 1,
            TableValue::I16(_) | TableValue::U16(_) => 2,
            TableValue::I32(_) | TableValue::U32(_) | TableValue::F32(_) => 4,
            TableValue::I64(_) | TableValue::F64(_) | TableValue::Timestamp(_) => 8,
            TableValue::Decimal { .. } => 5,
            TableValue::LongStr(b) | TableValue::Bytes(b) => 4 + b.len(),
            TableValue::Table(t) => t.encoded_len(),
            TableValue::Array(items) => 4 + items.iter().map(TableValue::encoded_len).sum::<usize>(),
            TableValue::Void => 0,
        }
    }

    fn write(&self, buf: &mut BytesMut) {
        buf.put_u8(self.tag());
        match self {
            TableValue::Bool(v) => buf.put_u8(u8::from(*v)),
            TableValue::I8(v) => buf.put_i8(*v),
            TableValue::U8(v) => buf.put_u8(*v),
            TableValue::I16(v) => buf.put_i16(*v),
            TableValue::U16(v) => buf.put_u16(*v),
            TableValue::I32(v) => buf.put_i32(*v),
            TableValue::U32(v) => buf.put_u32(*v),
            TableValue::I64(v) => buf.put_i64(*v),
            TableValue::F32(v) => buf.put_f32(*v),
            TableValue::F64(v) => buf.put_f64(*v),
            TableValue::Decimal { scale, value } => {
                buf.put_u8(*scale);
                buf.put_u32(*value);
            }
            TableValue::LongStr(b) | TableValue::Bytes(b) => {
                buf.put_u32(b.len() as u32);
                buf.extend_from_slice(b);
            }
            TableValue::Timestamp(v) => buf.put_u64(*v),
            TableValue::Table(t) => t.write(buf),
            TableValue::Array(items) => {
                let len: usize = items.iter().map(TableValue::encoded_len).sum();
                buf.put_u32(len as u32);
                for item in items {
                    item.write(buf);
                }
            }
            TableValue::Void => {}
        }
    }

    fn check(&self, depth: usize) -> Result<(), FieldError> {
        match self {
            TableValue::Table(t) => t.check(depth + 1),
            TableValue::Array(items) => {
                let depth = nested(depth + 1)?;
                items.iter().try_for_each(|item| item.check(depth))
            }
            _ => Ok(()),
        }
    }

    fn read(buf: &mut Bytes, depth: usize) -> Result<Self, FieldError> {
        let tag = read_u8(buf, "table value type")?;
        let value = match tag {
            b't' => TableValue::Bool(read_u8(buf, "boolean")? != 0),
            b'b' => TableValue::I8(read_u8(buf, "signed octet")? as i8),
            b'B' => TableValue::U8(read_u8(buf, "octet")?),
            b's' => TableValue::I16(read_u16(buf, "signed short")? as i16),
            b'u' => TableValue::U16(read_u16(buf, "short")?),
            b'I' => TableValue::I32(read_u32(buf, "signed long")? as i32),
            b'i' => TableValue::U32(read_u32(buf, "long")?),
            b'l' => TableValue::I64(read_u64(buf, "signed longlong")? as i64),
            b'f' => TableValue::F32(f32::from_bits(read_u32(buf, "float")?)),
            b'd' => TableValue::F64(f64::from_bits(read_u64(buf, "double")?)),
            b'D' => TableValue::Decimal {
                scale: read_u8(buf, "decimal scale")?,
                value: read_u32(buf, "decimal value")?,
            },
            b'S' => TableValue::LongStr(read_long_bytes(buf, "long string")?),
            b'x' => TableValue::Bytes(read_long_bytes(buf, "byte array")?),
            b'T' => TableValue::Timestamp(read_u64(buf, "timestamp")?),
            b'F' => TableValue::Table(FieldTable::read(buf, depth + 1)?),
            b'A' => {
                let depth = nested(depth + 1)?;
                let mut body = read_long_bytes(buf, "array")?;
                let mut items = Vec::new();
                while body.has_remaining() {
                    items.push(TableValue::read(&mut body, depth)?);
                }
                TableValue::Array(items)
            }
            b'V' => TableValue::Void,
            other => return Err(FieldError::UnknownTableType(other)),
        };
        Ok(value)
    }
}

/// An ordered AMQP field table.
///
/// Entry order is preserved so that a decoded table re-encodes to the same bytes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldTable {
    entries: Vec<(String, TableValue)>,
}

impl FieldTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, replacing an existing entry with the same key in place.
    pub fn insert(&mut self, key: impl Into<String>, value: TableValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Builder-style [`FieldTable::insert`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: TableValue) -> Self {
        self.insert(key, value);
        self
    }

    /// Look up an entry by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&TableValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TableValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn body_len(&self) -> usize {
        self.entries
            .iter()
            .map(|(k, v)| 1 + k.len() + v.encoded_len())
            .sum()
    }

    /// Size on the wire including the 4-byte length prefix.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        4 + self.body_len()
    }

    fn write(&self, buf: &mut BytesMut) {
        buf.put_u32(self.body_len() as u32);
        for (key, value) in &self.entries {
            buf.put_u8(key.len() as u8);
            buf.extend_from_slice(key.as_bytes());
            value.write(buf);
        }
    }

    /// Check that every key fits a short string and nesting stays within
    /// [`MAX_TABLE_DEPTH`].
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::KeyTooLong`] or [`FieldError::NestingTooDeep`].
    pub fn check(&self, depth: usize) -> Result<(), FieldError> {
        let depth = nested(depth)?;
        for (key, value) in &self.entries {
            if key.len() > MAX_SHORT_STRING_LENGTH {
                return Err(FieldError::KeyTooLong(key.len()));
            }
            value.check(depth)?;
        }
        Ok(())
    }

    fn read(buf: &mut Bytes, depth: usize) -> Result<Self, FieldError> {
        let depth = nested(depth)?;
        let mut body = read_long_bytes(buf, "field table")?;
        let mut table = FieldTable::new();
        while body.has_remaining() {
            let key = read_short_bytes(&mut body, "field table key")?;
            let key = String::from_utf8(key.to_vec()).map_err(|_| FieldError::InvalidKey)?;
            let value = TableValue::read(&mut body, depth)?;
            table.entries.push((key, value));
        }
        Ok(table)
    }
}

fn nested(depth: usize) -> Result<usize, FieldError> {
    if depth > MAX_TABLE_DEPTH {
        Err(FieldError::NestingTooDeep)
    } else {
        Ok(depth)
    }
}

fn ensure(buf: &Bytes, n: usize, what: &'static str) -> Result<(), FieldError> {
    if buf.remaining() < n {
        Err(FieldError::Truncated(what))
    } else {
        Ok(())
    }
}

fn read_u8(buf: &mut Bytes, what: &'static str) -> Result<u8, FieldError> {
    ensure(buf, 1, what)?;
    Ok(buf.get_u8())
}

fn read_u16(buf: &mut Bytes, what: &'static str) -> Result<u16, FieldError> {
    ensure(buf, 2, what)?;
    Ok(buf.get_u16())
}

fn read_u32(buf: &mut Bytes, what: &'static str) -> Result<u32, FieldError> {
    ensure(buf, 4, what)?;
    Ok(buf.get_u32())
}

fn read_u64(buf: &mut Bytes, what: &'static str) -> Result<u64, FieldError> {
    ensure(buf, 8, what)?;
    Ok(buf.get_u64())
}

fn read_short_bytes(buf: &mut Bytes, what: &'static str) -> Result<Bytes, FieldError> {
    let len = read_u8(buf, what)? as usize;
    ensure(buf, len, what)?;
    Ok(buf.split_to(len))
}

fn read_long_bytes(buf: &mut Bytes, what: &'static str) -> Result<Bytes, FieldError> {
    let len = read_u32(buf, what)? as usize;
    ensure(buf, len, what)?;
    Ok(buf.split_to(len))
}

/// Check that `values` match the declared argument list.
///
/// # Errors
///
/// Returns an error on arity or domain mismatch, or an oversized short string.
pub fn validate(specs: &[FieldSpec], values: &[FieldValue]) -> Result<(), FieldError> {
    if specs.len() != values.len() {
        return Err(FieldError::Arity {
            expected: specs.len(),
            actual: values.len(),
        });
    }
    for (spec, value) in specs.iter().zip(values) {
        if spec.ty != value.field_type() {
            return Err(FieldError::TypeMismatch {
                field: spec.name,
                expected: spec.ty,
                actual: value.field_type(),
            });
        }
        match value {
            FieldValue::ShortStr(s) if s.len() > MAX_SHORT_STRING_LENGTH => {
                return Err(FieldError::ShortStringTooLong(s.len()));
            }
            FieldValue::Table(t) => t.check(0)?,
            _ => {}
        }
    }
    Ok(())
}

/// Size of the encoded argument list.
#[must_use]
pub fn encoded_len(values: &[FieldValue]) -> usize {
    let mut len = 0;
    let mut bits_in_octet = 0u8;
    for value in values {
        if let FieldValue::Bit(_) = value {
            if bits_in_octet == 0 {
                len += 1;
            }
            bits_in_octet = (bits_in_octet + 1) % 8;
            continue;
        }
        bits_in_octet = 0;
        len += match value {
            FieldValue::Octet(_) => 1,
            FieldValue::Short(_) => 2,
            FieldValue::Long(_) => 4,
            FieldValue::LongLong(_) | FieldValue::Timestamp(_) => 8,
            FieldValue::ShortStr(s) => 1 + s.len(),
            FieldValue::LongStr(s) => 4 + s.len(),
            FieldValue::Table(t) => t.encoded_len(),
            FieldValue::Bit(_) => unreachable!(),
        };
    }
    len
}

/// Encode an argument list. Values must already be [`validate`]d.
pub fn encode_fields(values: &[FieldValue], buf: &mut BytesMut) {
    let mut bit_octet = 0u8;
    let mut bits_in_octet = 0u8;

    for value in values {
        if let FieldValue::Bit(b) = value {
            if *b {
                bit_octet |= 1 << bits_in_octet;
            }
            bits_in_octet += 1;
            if bits_in_octet == 8 {
                buf.put_u8(bit_octet);
                bit_octet = 0;
                bits_in_octet = 0;
            }
            continue;
        }

        if bits_in_octet > 0 {
            buf.put_u8(bit_octet);
            bit_octet = 0;
            bits_in_octet = 0;
        }

        match value {
            FieldValue::Octet(v) => buf.put_u8(*v),
            FieldValue::Short(v) => buf.put_u16(*v),
            FieldValue::Long(v) => buf.put_u32(*v),
            FieldValue::LongLong(v) | FieldValue::Timestamp(v) => buf.put_u64(*v),
            FieldValue::ShortStr(s) => {
                buf.put_u8(s.len() as u8);
                buf.extend_from_slice(s);
            }
            FieldValue::LongStr(s) => {
                buf.put_u32(s.len() as u32);
                buf.extend_from_slice(s);
            }
            FieldValue::Table(t) => t.write(buf),
            FieldValue::Bit(_) => unreachable!(),
        }
    }

    if bits_in_octet > 0 {
        buf.put_u8(bit_octet);
    }
}

/// Decode an argument list, consuming the whole payload.
///
/// # Errors
///
/// Returns an error if the payload is short, carries an unknown table type,
/// or has bytes left over after the last argument.
pub fn decode_fields(specs: &[FieldSpec], buf: &mut Bytes) -> Result<Vec<FieldValue>, FieldError> {
    let mut values = Vec::with_capacity(specs.len());
    let mut bit_octet = 0u8;
    let mut bits_left = 0u8;

    for spec in specs {
        if spec.ty == FieldType::Bit {
            if bits_left == 0 {
                bit_octet = read_u8(buf, spec.name)?;
                bits_left = 8;
            }
            values.push(FieldValue::Bit(bit_octet & 1 != 0));
            bit_octet >>= 1;
            bits_left -= 1;
            continue;
        }
        bits_left = 0;

        let value = match spec.ty {
            FieldType::Octet => FieldValue::Octet(read_u8(buf, spec.name)?),
            FieldType::Short => FieldValue::Short(read_u16(buf, spec.name)?),
            FieldType::Long => FieldValue::Long(read_u32(buf, spec.name)?),
            FieldType::LongLong => FieldValue::LongLong(read_u64(buf, spec.name)?),
            FieldType::Timestamp => FieldValue::Timestamp(read_u64(buf, spec.name)?),
            FieldType::ShortStr => FieldValue::ShortStr(read_short_bytes(buf, spec.name)?),
            FieldType::LongStr => FieldValue::LongStr(read_long_bytes(buf, spec.name)?),
            FieldType::Table => FieldValue::Table(FieldTable::read(buf, 0)?),
            FieldType::Bit => unreachable!(),
        };
        values.push(value);
    }

    if buf.has_remaining() {
        return Err(FieldError::TrailingBytes(buf.remaining()));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BITS: &[FieldSpec] = &[
        FieldSpec { name: "ticket", ty: FieldType::Short },
        FieldSpec { name: "a", ty: FieldType::Bit },
        FieldSpec { name: "b", ty: FieldType::Bit },
        FieldSpec { name: "c", ty: FieldType::Bit },
        FieldSpec { name: "name", ty: FieldType::ShortStr },
        FieldSpec { name: "d", ty: FieldType::Bit },
    ];

    #[test]
    fn test_bit_packing() {
        let values = vec![
            FieldValue::Short(7),
            FieldValue::Bit(true),
            FieldValue::Bit(false),
            FieldValue::Bit(true),
            FieldValue::short_str("q"),
            FieldValue::Bit(true),
        ];
        validate(BITS, &values).unwrap();

        let mut buf = BytesMut::new();
        encode_fields(&values, &mut buf);
        assert_eq!(&buf[..], &[0x00, 0x07, 0b101, 0x01, b'q', 0x01]);
        assert_eq!(encoded_len(&values), buf.len());

        let decoded = decode_fields(BITS, &mut buf.freeze()).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_nine_bits_span_two_octets() {
        let specs: Vec<FieldSpec> = (0..9)
            .map(|_| FieldSpec { name: "flag", ty: FieldType::Bit })
            .collect();
        let values: Vec<FieldValue> = (0..9).map(|i| FieldValue::Bit(i % 2 == 0)).collect();

        let mut buf = BytesMut::new();
        encode_fields(&values, &mut buf);
        assert_eq!(buf.len(), 2);
        assert_eq!(encoded_len(&values), 2);
        assert_eq!(decode_fields(&specs, &mut buf.freeze()).unwrap(), values);
    }

    #[test]
    fn test_table_preserves_order_and_types() {
        let nested = FieldTable::new().with("inner", TableValue::I32(-5));
        let table = FieldTable::new()
            .with("z", TableValue::LongStr(Bytes::from_static(b"last-first")))
            .with("a", TableValue::Bool(true))
            .with("n", TableValue::Table(nested))
            .with("list", TableValue::Array(vec![TableValue::U8(1), TableValue::Void]))
            .with("d", TableValue::Decimal { scale: 2, value: 314 });

        let specs = [FieldSpec { name: "arguments", ty: FieldType::Table }];
        let values = vec![FieldValue::Table(table.clone())];

        let mut buf = BytesMut::new();
        encode_fields(&values, &mut buf);
        let original = buf.clone().freeze();
        assert_eq!(encoded_len(&values), original.len());

        let decoded = decode_fields(&specs, &mut original.clone()).unwrap();
        let FieldValue::Table(decoded_table) = &decoded[0] else {
            panic!("expected table");
        };
        let keys: Vec<&str> = decoded_table.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["z", "a", "n", "list", "d"]);

        let mut again = BytesMut::new();
        encode_fields(&decoded, &mut again);
        assert_eq!(again.freeze(), original);
    }

    #[test]
    fn test_truncated_payload() {
        let specs = [FieldSpec { name: "delivery-tag", ty: FieldType::LongLong }];
        let mut buf = Bytes::from_static(&[0, 0, 0, 1]);
        assert_eq!(
            decode_fields(&specs, &mut buf),
            Err(FieldError::Truncated("delivery-tag"))
        );
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let specs = [FieldSpec { name: "active", ty: FieldType::Bit }];
        let mut buf = Bytes::from_static(&[1, 0xFF]);
        assert_eq!(decode_fields(&specs, &mut buf), Err(FieldError::TrailingBytes(1)));
    }

    #[test]
    fn test_unknown_table_type() {
        let specs = [FieldSpec { name: "arguments", ty: FieldType::Table }];
        let mut buf = Bytes::from_static(&[0, 0, 0, 3, 1, b'k', b'?']);
        assert_eq!(
            decode_fields(&specs, &mut buf),
            Err(FieldError::UnknownTableType(b'?'))
        );
    }

    fn nested_arrays(levels: usize) -> Bytes {
        // key "k" -> 'A' -> 'A' -> ... -> empty array; each level is 5 bytes
        let mut buf = BytesMut::with_capacity(6 + 5 * levels);
        buf.put_u32((2 + 5 * levels) as u32);
        buf.put_u8(1);
        buf.put_u8(b'k');
        for level in (0..levels).rev() {
            buf.put_u8(b'A');
            buf.put_u32((5 * level) as u32);
        }
        buf.freeze()
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let specs = [FieldSpec { name: "client-properties", ty: FieldType::Table }];

        let mut shallow = nested_arrays(MAX_TABLE_DEPTH);
        assert!(decode_fields(&specs, &mut shallow).is_ok());

        let mut deep = nested_arrays(MAX_TABLE_DEPTH + 1);
        assert_eq!(decode_fields(&specs, &mut deep), Err(FieldError::NestingTooDeep));

        // Far past any stack budget; must fail fast, not recurse.
        let mut hostile = nested_arrays(20_000);
        assert_eq!(decode_fields(&specs, &mut hostile), Err(FieldError::NestingTooDeep));
    }

    #[test]
    fn test_deep_nested_tables_rejected() {
        let mut table = FieldTable::new();
        for _ in 0..=MAX_TABLE_DEPTH {
            table = FieldTable::new().with("t", TableValue::Table(table));
        }
        let specs = [FieldSpec { name: "arguments", ty: FieldType::Table }];
        assert_eq!(
            validate(&specs, &[FieldValue::Table(table)]),
            Err(FieldError::NestingTooDeep)
        );
    }

    #[test]
    fn test_long_table_key_rejected() {
        let specs = [FieldSpec { name: "server-properties", ty: FieldType::Table }];
        let key = "k".repeat(300);
        let table = FieldTable::new().with(key.as_str(), TableValue::Bool(true));
        assert_eq!(
            validate(&specs, &[FieldValue::Table(table)]),
            Err(FieldError::KeyTooLong(300))
        );

        let inner = FieldTable::new().with(key.as_str(), TableValue::Void);
        let outer = FieldTable::new().with(
            "list",
            TableValue::Array(vec![TableValue::Table(inner)]),
        );
        assert_eq!(
            validate(&specs, &[FieldValue::Table(outer)]),
            Err(FieldError::KeyTooLong(300))
        );

        let ok = FieldTable::new().with("k".repeat(255), TableValue::Bool(true));
        assert!(validate(&specs, &[FieldValue::Table(ok)]).is_ok());
    }

    #[test]
    fn test_validate_mismatch() {
        let specs = [FieldSpec { name: "active", ty: FieldType::Bit }];
        assert!(matches!(
            validate(&specs, &[FieldValue::Octet(1)]),
            Err(FieldError::TypeMismatch { field: "active", .. })
        ));
        assert!(matches!(
            validate(&specs, &[]),
            Err(FieldError::Arity { expected: 1, actual: 0 })
        ));
        let long = "x".repeat(256);
        let specs = [FieldSpec { name: "queue", ty: FieldType::ShortStr }];
        assert_eq!(
            validate(&specs, &[FieldValue::short_str(&long)]),
            Err(FieldError::ShortStringTooLong(256))
        );
    }
}
