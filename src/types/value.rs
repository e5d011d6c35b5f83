use std::fmt;

use serde_json::Value as Json;

use super::constants::{codes, Datatype};
use super::error::{Error, Result, SqliteError};

/// Dynamically typed value shared by columns, parameters, and function I/O.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit IEEE float.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// Opaque bytes.
    Blob(Vec<u8>),
}

impl Value {
    /// The engine datatype tag for this value.
    pub fn datatype(&self) -> Datatype {
        match self {
            Value::Null => Datatype::Null,
            Value::Integer(_) => Datatype::Integer,
            Value::Float(_) => Datatype::Float,
            Value::Text(_) => Datatype::Text,
            Value::Blob(_) => Datatype::Blob,
        }
    }

    /// Returns true for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer payload, if any.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Float payload, if any.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Text payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Blob payload, if any.
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
            Value::Blob(v) => write!(f, "x'{}'", hex::encode(v)),
        }
    }
}

/// Values a host callable may hand back, before normalization.
///
/// [`to_scalar`] collapses this closed set onto [`Value`].
#[derive(Debug, Clone, PartialEq)]
pub enum ExtendedValue {
    /// Already a dynamic value.
    Value(Value),
    /// Booleans become 0/1 integers.
    Bool(bool),
    /// "Nothing returned" becomes NULL.
    Undefined,
    /// JSON scalars convert; arrays and objects are rejected.
    Json(Json),
    /// Textual conversion of an arbitrary host object.
    Display(String),
}

impl ExtendedValue {
    /// Stringifies any [`fmt::Display`] value.
    pub fn display(value: impl fmt::Display) -> Self {
        ExtendedValue::Display(value.to_string())
    }
}

/// Normalizes a host value onto the five-variant value model.
pub fn to_scalar(value: ExtendedValue) -> Result<Value> {
    match value {
        ExtendedValue::Value(v) => Ok(v),
        ExtendedValue::Bool(b) => Ok(Value::Integer(i64::from(b))),
        ExtendedValue::Undefined => Ok(Value::Null),
        ExtendedValue::Display(s) => Ok(Value::Text(s)),
        ExtendedValue::Json(json) => json_to_scalar(json),
    }
}

fn json_to_scalar(json: Json) -> Result<Value> {
    match json {
        Json::Null => Ok(Value::Null),
        Json::Bool(b) => Ok(Value::Integer(i64::from(b))),
        Json::String(s) => Ok(Value::Text(s)),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Integer(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::Float(f))
            } else {
                Err(Error::misuse(format!("number {n} is not representable")))
            }
        }
        Json::Array(_) => Err(unsupported("array")),
        Json::Object(_) => Err(unsupported("object")),
    }
}

fn unsupported(kind: &str) -> Error {
    Error::Sqlite(SqliteError::with_message(
        codes::MISUSE,
        format!("unsupported value type: {kind}"),
    ))
}

impl From<Value> for ExtendedValue {
    fn from(v: Value) -> Self {
        ExtendedValue::Value(v)
    }
}

impl From<()> for ExtendedValue {
    fn from(_: ()) -> Self {
        ExtendedValue::Undefined
    }
}

impl From<bool> for ExtendedValue {
    fn from(v: bool) -> Self {
        ExtendedValue::Bool(v)
    }
}

impl From<Json> for ExtendedValue {
    fn from(v: Json) -> Self {
        ExtendedValue::Json(v)
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident via $conv:expr),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant($conv(v))
                }
            }

            impl From<$ty> for ExtendedValue {
                fn from(v: $ty) -> Self {
                    ExtendedValue::Value(Value::from(v))
                }
            }
        )*
    };
}

value_from! {
    i64 => Integer via |v| v,
    i32 => Integer via i64::from,
    u32 => Integer via i64::from,
    f64 => Float via |v| v,
    String => Text via |v| v,
    &str => Text via str::to_owned,
    Vec<u8> => Blob via |v| v,
    &[u8] => Blob via <[u8]>::to_vec,
}

impl<T> From<Option<T>> for Value
where
    Value: From<T>,
{
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Value::from)
    }
}

impl<T> From<Option<T>> for ExtendedValue
where
    ExtendedValue: From<T>,
{
    fn from(v: Option<T>) -> Self {
        v.map_or(ExtendedValue::Value(Value::Null), ExtendedValue::from)
    }
}
