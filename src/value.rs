use std::fmt::{self, Display, Formatter};

use bytes::{Buf, BufMut, Bytes};

use crate::column::Column;
use crate::error::{err_protocol, Error, Result};
use crate::io::BufMutExt;
use crate::protocol::text::ColumnType;

/// A single MySQL value, used both for bound parameters and decoded result
/// cells.
///
/// Integers decode as [`Int`][Value::Int] unless the column carries the
/// `UNSIGNED` flag, in which case they decode as [`UInt`][Value::UInt].
/// Date and time values decode to their canonical string forms
/// (`YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS[.ffffff]`, `[-]HH:MM:SS[.ffffff]`);
/// a `TIME` is a duration and may exceed 24 hours.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some((*v).into()),
            Value::Double(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Text(s) => Some(s.as_bytes()),
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// The binary-protocol type and unsignedness this value binds as.
    pub(crate) fn param_type(&self) -> (ColumnType, bool) {
        match self {
            Value::Null => (ColumnType::Null, false),
            Value::Int(_) => (ColumnType::LongLong, false),
            Value::UInt(_) => (ColumnType::LongLong, true),
            Value::Float(_) => (ColumnType::Float, false),
            Value::Double(_) => (ColumnType::Double, false),
            Value::Text(_) => (ColumnType::VarString, false),
            Value::Bytes(_) => (ColumnType::Blob, false),
        }
    }

    /// Append the binary-protocol encoding of this value. NULL encodes to
    /// nothing; it lives in the NULL bitmap.
    pub(crate) fn encode_binary(&self, buf: &mut Vec<u8>) {
        match self {
            Value::Null => {}
            Value::Int(v) => buf.put_i64_le(*v),
            Value::UInt(v) => buf.put_u64_le(*v),
            Value::Float(v) => buf.put_f32_le(*v),
            Value::Double(v) => buf.put_f64_le(*v),
            Value::Text(s) => buf.put_str_lenenc(s),
            Value::Bytes(b) => buf.put_bytes_lenenc(b),
        }
    }

    /// Decode a text-protocol cell.
    pub(crate) fn decode_text(raw: Option<Bytes>, column: &Column) -> Result<Self> {
        let raw = match raw {
            Some(raw) => raw,
            None => return Ok(Value::Null),
        };

        Ok(match column.type_info() {
            ColumnType::Null => Value::Null,

            ColumnType::Tiny
            | ColumnType::Short
            | ColumnType::Long
            | ColumnType::Int24
            | ColumnType::LongLong
            | ColumnType::Year => {
                let text = std::str::from_utf8(&raw).map_err(Error::decode)?;

                if column.is_unsigned() {
                    Value::UInt(text.parse().map_err(Error::decode)?)
                } else {
                    Value::Int(text.parse().map_err(Error::decode)?)
                }
            }

            ColumnType::Float => {
                let text = std::str::from_utf8(&raw).map_err(Error::decode)?;

                Value::Float(text.parse().map_err(Error::decode)?)
            }

            ColumnType::Double => {
                let text = std::str::from_utf8(&raw).map_err(Error::decode)?;

                Value::Double(text.parse().map_err(Error::decode)?)
            }

            // everything else arrives as its canonical text; raw binary
            // columns (charset 63 blobs, BIT, GEOMETRY) stay bytes
            _ => from_raw_text(&raw, column),
        })
    }

    /// Decode a binary-protocol cell. `raw` holds the value content with
    /// length prefixes already stripped.
    pub(crate) fn decode_binary(raw: Option<Bytes>, column: &Column) -> Result<Self> {
        let mut raw = match raw {
            Some(raw) => raw,
            None => return Ok(Value::Null),
        };

        let unsigned = column.is_unsigned();

        Ok(match column.type_info() {
            ColumnType::Null => Value::Null,

            ColumnType::Tiny if unsigned => Value::UInt(raw.get_u8().into()),
            ColumnType::Tiny => Value::Int(raw.get_i8().into()),

            ColumnType::Short | ColumnType::Year if unsigned => {
                Value::UInt(raw.get_u16_le().into())
            }
            ColumnType::Short | ColumnType::Year => Value::Int(raw.get_i16_le().into()),

            ColumnType::Long | ColumnType::Int24 if unsigned => {
                Value::UInt(raw.get_u32_le().into())
            }
            ColumnType::Long | ColumnType::Int24 => Value::Int(raw.get_i32_le().into()),

            ColumnType::LongLong if unsigned => Value::UInt(raw.get_u64_le()),
            ColumnType::LongLong => Value::Int(raw.get_i64_le()),

            ColumnType::Float => Value::Float(f32::from_le_bytes(
                raw[..4].try_into().map_err(Error::decode)?,
            )),

            ColumnType::Double => Value::Double(f64::from_le_bytes(
                raw[..8].try_into().map_err(Error::decode)?,
            )),

            ColumnType::Date => Value::Text(decode_date(&raw)?),

            ColumnType::Datetime | ColumnType::Timestamp => {
                Value::Text(decode_datetime(&raw)?)
            }

            ColumnType::Time => Value::Text(decode_time(&raw)?),

            _ => from_raw_text(&raw, column),
        })
    }
}

fn from_raw_text(raw: &Bytes, column: &Column) -> Value {
    if column.is_binary()
        && matches!(
            column.type_info(),
            ColumnType::TinyBlob
                | ColumnType::MediumBlob
                | ColumnType::LongBlob
                | ColumnType::Blob
                | ColumnType::VarString
                | ColumnType::String
                | ColumnType::Bit
                | ColumnType::Geometry
        )
    {
        return Value::Bytes(raw.to_vec());
    }

    match String::from_utf8(raw.to_vec()) {
        Ok(text) => Value::Text(text),
        Err(err) => Value::Bytes(err.into_bytes()),
    }
}

// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_binary_resultset.html#sect_protocol_binary_resultset_row_value_date
// `raw` is {0, 4, 7, 11} bytes; zero length is the zero date

fn decode_date(raw: &[u8]) -> Result<String> {
    if raw.is_empty() {
        return Ok("0000-00-00".to_owned());
    }

    if raw.len() < 4 {
        return Err(err_protocol!("DATE value with {} byte(s)", raw.len()));
    }

    let year = u16::from_le_bytes([raw[0], raw[1]]);

    Ok(format!("{:04}-{:02}-{:02}", year, raw[2], raw[3]))
}

fn decode_datetime(raw: &[u8]) -> Result<String> {
    if raw.is_empty() {
        return Ok("0000-00-00 00:00:00".to_owned());
    }

    let mut out = decode_date(raw)?;

    if raw.len() >= 7 {
        out.push_str(&format!(" {:02}:{:02}:{:02}", raw[4], raw[5], raw[6]));
    } else {
        out.push_str(" 00:00:00");
    }

    if raw.len() >= 11 {
        let micros = u32::from_le_bytes([raw[7], raw[8], raw[9], raw[10]]);
        out.push_str(&format!(".{:06}", micros));
    }

    Ok(out)
}

// `raw` is {0, 8, 12} bytes: negative(1) days(4) hours(1) minutes(1)
// seconds(1) [micros(4)]. A TIME is a duration; total hours may exceed 24.
fn decode_time(raw: &[u8]) -> Result<String> {
    if raw.is_empty() {
        return Ok("00:00:00".to_owned());
    }

    if raw.len() < 8 {
        return Err(err_protocol!("TIME value with {} byte(s)", raw.len()));
    }

    let negative = raw[0] == 1;
    let days = u32::from_le_bytes([raw[1], raw[2], raw[3], raw[4]]);
    let hours = u64::from(days) * 24 + u64::from(raw[5]);

    let mut out = format!(
        "{}{:02}:{:02}:{:02}",
        if negative { "-" } else { "" },
        hours,
        raw[6],
        raw[7]
    );

    if raw.len() >= 12 {
        let micros = u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]);
        out.push_str(&format!(".{:06}", micros));
    }

    Ok(out)
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Int(v) => Display::fmt(v, f),
            Value::UInt(v) => Display::fmt(v, f),
            Value::Float(v) => Display::fmt(v, f),
            Value::Double(v) => Display::fmt(v, f),
            Value::Text(s) => f.write_str(s),
            Value::Bytes(b) => Display::fmt(&String::from_utf8_lossy(b), f),
        }
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Int(v.into())
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Int(v.into())
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::UInt(v.into())
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::UInt(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt(v.into())
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Int(v.into())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
