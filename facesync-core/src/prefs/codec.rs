//! Conversion between dynamically typed payload values and [`PrefValue`].
//!
//! Inbound payloads carry arbitrary JSON-like values. Only integers that
//! fit in an `i32`, strings and booleans are accepted; everything else is
//! rejected before it can reach a store.

use serde_json::Value;
use thiserror::Error;

use super::value::PrefValue;

/// Errors from encoding a preference entry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("Preference {key} of type {kind} is not supported")]
    UnsupportedType { key: String, kind: &'static str },
}

/// A single typed entry of a sync payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEntry {
    pub key: String,
    pub value: PrefValue,
}

impl PayloadEntry {
    pub fn new(key: impl Into<String>, value: impl Into<PrefValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Encodes a dynamically typed value into a payload entry.
pub fn encode(key: &str, value: &Value) -> Result<PayloadEntry, CodecError> {
    let unsupported = |kind| CodecError::UnsupportedType {
        key: key.to_string(),
        kind,
    };

    let value = match value {
        Value::Bool(b) => PrefValue::Bool(*b),
        Value::String(s) => PrefValue::String(s.clone()),
        Value::Number(n) => {
            if n.is_f64() {
                return Err(unsupported("float"));
            }
            let int = n
                .as_i64()
                .and_then(|i| i32::try_from(i).ok())
                .ok_or_else(|| unsupported("long"))?;
            PrefValue::Int(int)
        }
        Value::Null => return Err(unsupported("null")),
        Value::Array(_) => return Err(unsupported("array")),
        Value::Object(_) => return Err(unsupported("map")),
    };

    Ok(PayloadEntry {
        key: key.to_string(),
        value,
    })
}

/// Returns the stored value unchanged.
pub fn decode(entry: &PayloadEntry) -> PrefValue {
    entry.value.clone()
}

/// Converts a typed value back into its wire representation.
pub fn to_wire(value: &PrefValue) -> Value {
    match value {
        PrefValue::Bool(b) => Value::Bool(*b),
        PrefValue::Int(i) => Value::from(*i),
        PrefValue::String(s) => Value::String(s.clone()),
    }
}
