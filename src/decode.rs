//! Conversions from wire [`Value`]s into plain Rust types.

use crate::error::{Error, Result};
use crate::value::Value;

/// A type that can be produced from a result-set [`Value`].
///
/// Integer conversions are checked; a value that does not fit the target
/// type is a [`Error::Decode`]. Values delivered as text (the text
/// protocol sends numbers as decimal strings) parse transparently.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

macro_rules! impl_from_value_for_int {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Result<Self> {
                    match value {
                        Value::Int(v) => <$ty>::try_from(*v).map_err(Error::decode),
                        Value::UInt(v) => <$ty>::try_from(*v).map_err(Error::decode),
                        Value::Text(s) => s.parse().map_err(Error::decode),

                        other => Err(mismatch(stringify!($ty), other)),
                    }
                }
            }
        )*
    };
}

impl_from_value_for_int!(i8, i16, i32, i64, u8, u16, u32, u64);

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Float(v) => Ok((*v).into()),
            Value::Double(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            Value::UInt(v) => Ok(*v as f64),
            Value::Text(s) => s.parse().map_err(Error::decode),

            other => Err(mismatch("f64", other)),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Float(v) => Ok(*v),
            Value::Text(s) => s.parse().map_err(Error::decode),

            // narrowing from DOUBLE is deliberate; MySQL FLOAT columns
            // arrive as Float already
            other => f64::from_value(other).map(|v| v as f32),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        // BOOL is TINYINT(1) on the wire
        Ok(i64::from_value(value)? != 0)
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            Value::Int(v) => Ok(v.to_string()),
            Value::UInt(v) => Ok(v.to_string()),
            Value::Float(v) => Ok(v.to_string()),
            Value::Double(v) => Ok(v.to_string()),

            other => Err(mismatch("String", other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            Value::Text(s) => Ok(s.clone().into_bytes()),

            other => Err(mismatch("Vec<u8>", other)),
        }
    }
}

impl<T> FromValue for Option<T>
where
    T: FromValue,
{
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

fn mismatch(expected: &str, value: &Value) -> Error {
    Error::Decode(
        format!(
            "cannot decode {} from a {} value",
            expected,
            match value {
                Value::Null => "NULL",
                Value::Int(_) => "BIGINT",
                Value::UInt(_) => "BIGINT UNSIGNED",
                Value::Float(_) => "FLOAT",
                Value::Double(_) => "DOUBLE",
                Value::Text(_) => "text",
                Value::Bytes(_) => "binary",
            }
        )
        .into(),
    )
}
