use crate::errors::PersistError;
use crate::model::{PropertyRecord, Reading};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde_json::{Map, Value};

const SECONDS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const MAX_FRACTION_DIGITS: usize = 6;

/// Parses a telemetry timestamp. Accepted shapes, in order:
///
/// * `YYYY-MM-DDTHH:MM:SS.ffffffZ`
/// * `YYYY-MM-DDTHH:MM:SS.ffffff`
/// * `YYYY-MM-DDTHH:MM:SS`
///
/// The fraction carries one to six digits. Anything else yields `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let (body, zulu) = match raw.strip_suffix('Z') {
        Some(body) => (body, true),
        None => (raw, false),
    };

    let (whole, fraction) = match body.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (body, None),
    };

    // The trailing Z only appears together with a fraction.
    if zulu && fraction.is_none() {
        return None;
    }

    let base = NaiveDateTime::parse_from_str(whole, SECONDS_FORMAT).ok()?;

    let micros = match fraction {
        None => 0,
        Some(digits) => parse_micros(digits)?,
    };

    Some((base + Duration::microseconds(micros)).and_utc())
}

fn parse_micros(digits: &str) -> Option<i64> {
    if digits.is_empty()
        || digits.len() > MAX_FRACTION_DIGITS
        || !digits.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    format!("{:0<width$}", digits, width = MAX_FRACTION_DIGITS)
        .parse()
        .ok()
}

/// Coerces `last_value` into a float. A missing value counts as zero.
pub fn coerce_value(value: Option<&Value>) -> Result<f64, PersistError> {
    match value {
        None => Ok(0.0),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| PersistError::InvalidValue(n.to_string())),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| PersistError::InvalidValue(format!("{:?}", s))),
        Some(Value::Bool(b)) => Ok(if *b { 1.0 } else { 0.0 }),
        Some(other) => Err(PersistError::InvalidValue(other.to_string())),
    }
}

/// Turns a raw property record into a [`Reading`].
///
/// Fails when the record is not an object, has no string `id`, or carries a
/// `last_value` that cannot become a float. The whole record is rejected in
/// those cases. Other wrongly typed fields are stored as NULL.
pub fn validate(record: &PropertyRecord) -> Result<Reading, PersistError> {
    let obj = record
        .as_object()
        .ok_or_else(|| PersistError::NotAnObject(record.to_string()))?;

    let property_id = text(obj, "id").ok_or(PersistError::MissingField("id"))?;
    let last_value = coerce_value(obj.get("last_value"))?;

    Ok(Reading {
        property_id,
        href: text(obj, "href"),
        name: text(obj, "name"),
        last_value,
        value_type: text(obj, "type"),
        created_at: timestamp(obj, "created_at"),
        updated_at: timestamp(obj, "updated_at"),
        value_updated_at: timestamp(obj, "value_updated_at"),
        linked_to_trigger: obj.get("linked_to_trigger").and_then(Value::as_bool),
        permission: text(obj, "permission"),
        persist: obj.get("persist").and_then(Value::as_bool),
        tag: obj.get("tag").and_then(Value::as_i64),
        thing_id: text(obj, "thing_id"),
        thing_name: text(obj, "thing_name"),
        update_parameter: obj.get("update_parameter").and_then(Value::as_f64),
        update_strategy: text(obj, "update_strategy"),
        variable_name: text(obj, "variable_name"),
    })
}

fn text(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_owned)
}

fn timestamp(obj: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    obj.get(key).and_then(Value::as_str).and_then(parse_timestamp)
}
