//! Response decoding
//!
//! The backend reports logical failures as a JSON object with an `error`
//! field inside an otherwise successful response.

use pooldash_core::{PoolError, PoolResult};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Backend-authored error message, if the payload carries one
pub fn backend_error(value: &Value) -> Option<String> {
    match value.get("error")? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Fail on a backend `error` field, otherwise hand the payload back
pub fn check(value: Value) -> PoolResult<Value> {
    match backend_error(&value) {
        Some(msg) => Err(PoolError::Backend(msg)),
        None => Ok(value),
    }
}

/// Decode a payload into `T`
pub fn decode<T: DeserializeOwned>(value: Value) -> PoolResult<T> {
    let value = check(value)?;
    Ok(serde_json::from_value(value)?)
}

/// Decode a list payload; anything that is not an array is an empty list
pub fn decode_list<T: DeserializeOwned>(value: Value) -> PoolResult<Vec<T>> {
    match check(value)? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(PoolError::from))
            .collect(),
        _ => Ok(Vec::new()),
    }
}

/// Acknowledge a write
pub fn ack(value: Value) -> PoolResult<()> {
    check(value).map(|_| ())
}
