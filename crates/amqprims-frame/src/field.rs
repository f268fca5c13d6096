//! Field tables, used for method arguments and message headers.

use std::collections::BTreeMap;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::wire::{put_long_str, put_short_str, WireReader};

/// An AMQP field table. Ordered so encoding is deterministic.
pub type FieldTable = BTreeMap<String, FieldValue>;

/// A typed field-table value (RabbitMQ's variant of the 0-9-1 type set).
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
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
    LongString(Bytes),
    Array(Vec<FieldValue>),
    Timestamp(u64),
    Table(FieldTable),
    ByteArray(Bytes),
    Void,
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::I32(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::I64(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::LongString(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::LongString(Bytes::from(value))
    }
}

impl From<FieldTable> for FieldValue {
    fn from(value: FieldTable) -> Self {
        FieldValue::Table(value)
    }
}

pub(crate) fn put_table(dst: &mut BytesMut, table: &FieldTable) -> Result<()> {
    let mut body = BytesMut::new();
    for (name, value) in table {
        put_short_str(&mut body, name)?;
        put_value(&mut body, value)?;
    }
    put_long_str(dst, &body)
}

fn put_value(dst: &mut BytesMut, value: &FieldValue) -> Result<()> {
    match value {
        FieldValue::Bool(v) => {
            dst.put_u8(b't');
            dst.put_u8(u8::from(*v));
        }
        FieldValue::I8(v) => {
            dst.put_u8(b'b');
            dst.put_i8(*v);
        }
        FieldValue::U8(v) => {
            dst.put_u8(b'B');
            dst.put_u8(*v);
        }
        FieldValue::I16(v) => {
            dst.put_u8(b's');
            dst.put_i16(*v);
        }
        FieldValue::U16(v) => {
            dst.put_u8(b'u');
            dst.put_u16(*v);
        }
        FieldValue::I32(v) => {
            dst.put_u8(b'I');
            dst.put_i32(*v);
        }
        FieldValue::U32(v) => {
            dst.put_u8(b'i');
            dst.put_u32(*v);
        }
        FieldValue::I64(v) => {
            dst.put_u8(b'l');
            dst.put_i64(*v);
        }
        FieldValue::F32(v) => {
            dst.put_u8(b'f');
            dst.put_f32(*v);
        }
        FieldValue::F64(v) => {
            dst.put_u8(b'd');
            dst.put_f64(*v);
        }
        FieldValue::Decimal { scale, value } => {
            dst.put_u8(b'D');
            dst.put_u8(*scale);
            dst.put_u32(*value);
        }
        FieldValue::LongString(v) => {
            dst.put_u8(b'S');
            put_long_str(dst, v)?;
        }
        FieldValue::Array(values) => {
            dst.put_u8(b'A');
            let mut body = BytesMut::new();
            for value in values {
                put_value(&mut body, value)?;
            }
            put_long_str(dst, &body)?;
        }
        FieldValue::Timestamp(v) => {
            dst.put_u8(b'T');
            dst.put_u64(*v);
        }
        FieldValue::Table(table) => {
            dst.put_u8(b'F');
            put_table(dst, table)?;
        }
        FieldValue::ByteArray(v) => {
            dst.put_u8(b'x');
            put_long_str(dst, v)?;
        }
        FieldValue::Void => dst.put_u8(b'V'),
    }
    Ok(())
}

pub(crate) fn read_table(reader: &mut WireReader) -> Result<FieldTable> {
    let raw = reader.long_str()?;
    let mut inner = WireReader::new(raw, reader.what());
    let mut table = FieldTable::new();
    while inner.remaining() > 0 {
        let name = inner.short_str()?;
        let value = read_value(&mut inner)?;
        table.insert(name, value);
    }
    Ok(table)
}

fn read_value(reader: &mut WireReader) -> Result<FieldValue> {
    let tag = reader.octet()?;
    let value = match tag {
        b't' => FieldValue::Bool(reader.octet()? != 0),
        b'b' => FieldValue::I8(reader.octet()? as i8),
        b'B' => FieldValue::U8(reader.octet()?),
        b's' => FieldValue::I16(reader.short()? as i16),
        b'u' => FieldValue::U16(reader.short()?),
        b'I' => FieldValue::I32(reader.long()? as i32),
        b'i' => FieldValue::U32(reader.long()?),
        b'l' => FieldValue::I64(reader.longlong()? as i64),
        b'f' => FieldValue::F32(f32::from_bits(reader.long()?)),
        b'd' => FieldValue::F64(f64::from_bits(reader.longlong()?)),
        b'D' => FieldValue::Decimal {
            scale: reader.octet()?,
            value: reader.long()?,
        },
        b'S' => FieldValue::LongString(reader.long_str()?),
        b'A' => {
            let raw = reader.long_str()?;
            let mut inner = WireReader::new(raw, reader.what());
            let mut values = Vec::new();
            while inner.remaining() > 0 {
                values.push(read_value(&mut inner)?);
            }
            FieldValue::Array(values)
        }
        b'T' => FieldValue::Timestamp(reader.longlong()?),
        b'F' => FieldValue::Table(read_table(reader)?),
        b'x' => FieldValue::ByteArray(reader.long_str()?),
        b'V' => FieldValue::Void,
        other => {
            return Err(FrameError::Malformed(format!(
                "{}: unknown field type '{}'",
                reader.what(),
                other as char
            )));
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_table_reads_back() {
        let mut inner = FieldTable::new();
        inner.insert("depth".to_string(), FieldValue::U8(2));

        let mut table = FieldTable::new();
        table.insert("x-match".to_string(), "all".into());
        table.insert("x-priority".to_string(), 10i32.into());
        table.insert("flag".to_string(), true.into());
        table.insert(
            "list".to_string(),
            FieldValue::Array(vec![FieldValue::I64(-1), FieldValue::Void]),
        );
        table.insert("nested".to_string(), inner.into());

        let mut buf = BytesMut::new();
        put_table(&mut buf, &table).unwrap();

        let mut reader = WireReader::new(buf.freeze(), "table");
        assert_eq!(read_table(&mut reader).unwrap(), table);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn empty_table_is_four_zero_bytes() {
        let mut buf = BytesMut::new();
        put_table(&mut buf, &FieldTable::new()).unwrap();
        assert_eq!(buf.as_ref(), &[0, 0, 0, 0]);
    }

    #[test]
    fn unknown_field_type_is_malformed() {
        let mut buf = BytesMut::new();
        let mut body = BytesMut::new();
        put_short_str(&mut body, "k").unwrap();
        body.put_u8(b'?');
        put_long_str(&mut buf, &body).unwrap();

        let mut reader = WireReader::new(buf.freeze(), "table");
        assert!(matches!(
            read_table(&mut reader),
            Err(FrameError::Malformed(_))
        ));
    }
}
