//! Serialization codec for durable documents.
//!
//! In memory a date is the tagged value `{"$date": <epoch millis>}`. On disk
//! documents are compact JSON strings in which every date is written as a
//! 24-character ISO-8601 UTC timestamp (`2024-03-01T09:30:00.000Z`). Reading
//! runs a revival pass that turns any such 24-character timestamp back into
//! a tagged date. The pass is structural, so a plain string that happens to
//! look like a timestamp is revived too.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::error::{CodecError, Result};
use crate::types::Document;

/// Tag key of an in-memory date value.
pub const DATE_TAG: &str = "$date";

const ISO_DATE_LEN: usize = 24;

// ============================================================================
// Date helpers
// ============================================================================

/// Wrap a timestamp as a tagged date value.
pub fn date_value(at: DateTime<Utc>) -> Value {
    let mut m = Map::new();
    m.insert(DATE_TAG.to_string(), Value::from(at.timestamp_millis()));
    Value::Object(m)
}

/// The current time as a tagged date value.
pub fn now_value() -> Value {
    date_value(Utc::now())
}

/// Read a tagged date value.
pub fn as_date(value: &Value) -> Option<DateTime<Utc>> {
    let obj = value.as_object()?;
    if obj.len() != 1 {
        return None;
    }
    let ms = obj.get(DATE_TAG)?.as_i64()?;
    DateTime::from_timestamp_millis(ms)
}

/// Format a timestamp the way it is written to the durable store.
pub fn format_iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_iso(s: &str) -> Option<DateTime<Utc>> {
    if s.len() != ISO_DATE_LEN {
        return None;
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

pub(crate) fn duration_from_secs(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

/// Serde adapter keeping a `DateTime<Utc>` field as a tagged date, so typed
/// records go through the same date encoding as documents.
pub mod tagged_date {
    use chrono::{DateTime, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        super::date_value(*at).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let value = Value::deserialize(d)?;
        super::as_date(&value).ok_or_else(|| D::Error::custom("expected a tagged date"))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::de::Error as _;
        use serde::{Deserialize, Deserializer, Serialize, Serializer};
        use serde_json::Value;

        pub fn serialize<S: Serializer>(
            at: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            at.map(super::super::date_value).serialize(s)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<Value>::deserialize(d)? {
                None | Some(Value::Null) => Ok(None),
                Some(value) => super::super::as_date(&value)
                    .map(Some)
                    .ok_or_else(|| D::Error::custom("expected a tagged date")),
            }
        }
    }
}

// ============================================================================
// Encode / decode
// ============================================================================

/// Replace tagged dates with their ISO string form. Dates whose ISO form is
/// not 24 characters would not be revived on read, so they are rejected.
fn encode_dates(value: &Value) -> std::result::Result<Value, CodecError> {
    if let Some(at) = as_date(value) {
        let iso = format_iso(at);
        if iso.len() != ISO_DATE_LEN {
            return Err(CodecError::DateOutOfRange(at.timestamp_millis()));
        }
        return Ok(Value::String(iso));
    }
    Ok(match value {
        Value::Object(obj) => {
            let mut out = Map::with_capacity(obj.len());
            for (k, v) in obj {
                out.insert(k.clone(), encode_dates(v)?);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(encode_dates)
                .collect::<std::result::Result<_, _>>()?,
        ),
        other => other.clone(),
    })
}

/// Revival pass: 24-character ISO timestamps become tagged dates.
pub fn revive_dates(value: Value) -> Value {
    match value {
        Value::String(s) => match parse_iso(&s) {
            Some(at) => date_value(at),
            None => Value::String(s),
        },
        Value::Object(obj) => {
            Value::Object(obj.into_iter().map(|(k, v)| (k, revive_dates(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(revive_dates).collect()),
        other => other,
    }
}

/// Serialize a document to its durable string form.
pub fn serialize(doc: &Document) -> Result<String> {
    let encoded = encode_dates(&Value::Object(doc.clone()))?;
    serde_json::to_string(&encoded)
        .map_err(|e| CodecError::Serialize(e).into())
}

/// Serialize any serde value through the same date encoding.
pub fn serialize_value(value: &Value) -> Result<String> {
    serde_json::to_string(&encode_dates(value)?).map_err(|e| CodecError::Serialize(e).into())
}

/// Parse a durable string and revive its dates.
pub fn deserialize(raw: &str) -> Result<Document> {
    match deserialize_value(raw)? {
        Value::Object(doc) => Ok(doc),
        other => Err(CodecError::NotADocument(kind_name(&other)).into()),
    }
}

/// Parse a durable string of any JSON shape and revive its dates.
pub fn deserialize_value(raw: &str) -> Result<Value> {
    let parsed: Value = serde_json::from_str(raw).map_err(CodecError::Parse)?;
    Ok(revive_dates(parsed))
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
