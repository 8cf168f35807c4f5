//! Wire and storage encoding for readings.
//!
//! The wire payload is a flat JSON object: an RFC 3339 `timestamp` plus one
//! numeric entry per measurement. Clients historically also nested their
//! measurements one level deep (`{"readings": {"lux": 800}}`), so decoding
//! flattens one level of object nesting before interpreting fields.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::{ParseError, ParseResult};
use crate::reading::{Reading, truncate_to_second};

/// Key treated as the measurement time rather than a measurement.
const TIMESTAMP_KEY: &str = "timestamp";

/// Encode a reading as a wire payload.
///
/// The client id travels out of band (in the request path), so it is not
/// part of the payload.
pub fn encode(reading: &Reading) -> Value {
    let mut map = Map::with_capacity(reading.fields.len() + 1);
    map.insert(
        TIMESTAMP_KEY.to_string(),
        Value::String(
            reading
                .timestamp
                .format(&Rfc3339)
                .unwrap_or_else(|_| reading.timestamp.to_string()),
        ),
    );
    for (name, value) in &reading.fields {
        map.insert(name.clone(), (*value).into());
    }
    Value::Object(map)
}

/// Decode a wire payload into a reading for `client_id`.
///
/// A missing timestamp defaults to the time of decoding. Non-numeric
/// measurement values are rejected rather than silently dropped.
pub fn decode(client_id: &str, payload: &[u8]) -> ParseResult<Reading> {
    let value: Value = serde_json::from_slice(payload)?;
    decode_value(client_id, value)
}

/// Decode an already-parsed JSON value. See [`decode`].
pub fn decode_value(client_id: &str, value: Value) -> ParseResult<Reading> {
    let Value::Object(map) = value else {
        return Err(ParseError::NotAnObject(type_name(&value).to_string()));
    };

    let map = flatten(map);
    let mut timestamp = None;
    let mut fields = BTreeMap::new();

    for (key, value) in map {
        if key == TIMESTAMP_KEY {
            timestamp = Some(parse_timestamp(&value)?);
            continue;
        }
        match value.as_f64() {
            Some(v) if v.is_finite() => {
                fields.insert(key, v);
            }
            _ => return Err(ParseError::NonNumericField { field: key }),
        }
    }

    if fields.is_empty() {
        return Err(ParseError::EmptyPayload);
    }

    Ok(Reading {
        client_id: client_id.to_string(),
        timestamp: truncate_to_second(timestamp.unwrap_or_else(OffsetDateTime::now_utc)),
        fields,
    })
}

/// Flatten one level of object nesting, the shape the original sensor
/// clients emit (`{"readings": {"lux": 800}}` becomes `{"lux": 800}`).
fn flatten(map: Map<String, Value>) -> Map<String, Value> {
    let mut flat = Map::with_capacity(map.len());
    for (key, value) in map {
        match value {
            Value::Object(inner) => {
                for (inner_key, inner_value) in inner {
                    flat.insert(inner_key, inner_value);
                }
            }
            other => {
                flat.insert(key, other);
            }
        }
    }
    flat
}

fn parse_timestamp(value: &Value) -> ParseResult<OffsetDateTime> {
    match value {
        Value::String(s) => OffsetDateTime::parse(s, &Rfc3339)
            .or_else(|_| parse_plain_datetime(s))
            .map_err(|_| ParseError::InvalidTimestamp(s.clone())),
        Value::Number(n) => {
            let secs = n
                .as_i64()
                .ok_or_else(|| ParseError::InvalidTimestamp(n.to_string()))?;
            OffsetDateTime::from_unix_timestamp(secs)
                .map_err(|_| ParseError::InvalidTimestamp(n.to_string()))
        }
        other => Err(ParseError::InvalidTimestamp(type_name(other).to_string())),
    }
}

/// Accept the `YYYY-MM-DD HH:MM:SS` shape legacy clients send, read as UTC.
fn parse_plain_datetime(s: &str) -> Result<OffsetDateTime, time::error::Parse> {
    use time::PrimitiveDateTime;
    use time::macros::format_description;

    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    PrimitiveDateTime::parse(s, format).map(|dt| dt.assume_utc())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
