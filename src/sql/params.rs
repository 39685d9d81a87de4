//! Values written to and read from the store, and their sqlx binding.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Serialize, Serializer};
use sqlx::encode::{Encode, IsNull};
use sqlx::sqlite::{Sqlite, SqliteTypeInfo};
use sqlx::Database;
use std::collections::BTreeMap;
use std::fmt;

/// Storage format for `Value::Date`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A single cell. Binds as a positional parameter and serializes as plain JSON.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Bool(bool),
    Date(NaiveDate),
    /// Stored as milliseconds since the Unix epoch.
    Timestamp(DateTime<Utc>),
}

/// Column name to value, as written by insert/update.
pub type ContentValues = BTreeMap<String, Value>;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Real(f) => Some(*f),
            _ => None,
        }
    }

    /// Convert a JSON request value. Arrays of bytes become blobs; objects and other arrays are rejected.
    pub fn from_json(v: &serde_json::Value) -> Result<Self, crate::error::AppError> {
        use serde_json::Value as Json;
        Ok(match v {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Real(f)
                } else {
                    return Err(crate::error::AppError::BadRequest(format!("number out of range: {}", n)));
                }
            }
            Json::String(s) => Value::Text(s.clone()),
            Json::Array(items) => {
                let mut bytes = Vec::with_capacity(items.len());
                for item in items {
                    let b = item
                        .as_u64()
                        .and_then(|n| u8::try_from(n).ok())
                        .ok_or_else(|| crate::error::AppError::BadRequest("arrays must hold bytes (0-255)".into()))?;
                    bytes.push(b);
                }
                Value::Blob(bytes)
            }
            Json::Object(_) => {
                return Err(crate::error::AppError::BadRequest("nested objects are not supported".into()))
            }
        })
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Real(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Value::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Integer(n) => serializer.serialize_i64(*n),
            Value::Real(n) => serializer.serialize_f64(*n),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Blob(b) => b.serialize(serializer),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Date(d) => serializer.serialize_str(&d.format(DATE_FORMAT).to_string()),
            Value::Timestamp(t) => serializer.serialize_str(&t.to_rfc3339()),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Real(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Blob(b)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Timestamp(t)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<'q> Encode<'q, Sqlite> for Value {
    fn encode_by_ref(
        &self,
        buf: &mut <Sqlite as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Integer(n) => <i64 as Encode<Sqlite>>::encode_by_ref(n, buf),
            Value::Real(n) => <f64 as Encode<Sqlite>>::encode_by_ref(n, buf),
            Value::Text(s) => <String as Encode<Sqlite>>::encode_by_ref(s, buf),
            Value::Blob(b) => <Vec<u8> as Encode<Sqlite>>::encode_by_ref(b, buf),
            Value::Bool(b) => <bool as Encode<Sqlite>>::encode_by_ref(b, buf),
            Value::Date(d) => {
                let s = d.format(DATE_FORMAT).to_string();
                <String as Encode<Sqlite>>::encode(s, buf)
            }
            Value::Timestamp(t) => <i64 as Encode<Sqlite>>::encode(t.timestamp_millis(), buf),
        }
    }
}

impl sqlx::Type<Sqlite> for Value {
    fn type_info() -> SqliteTypeInfo {
        <str as sqlx::Type<Sqlite>>::type_info()
    }

    fn compatible(_ty: &SqliteTypeInfo) -> bool {
        true
    }
}
