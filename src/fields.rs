//! Normalization of metric/dimension specifications and date expressions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ReportError;

/// Canonical structured field as sent on the wire.
pub type FieldObject = Map<String, Value>;

/// Kind of field list being normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Metrics,
    Dimensions,
}

impl FieldKind {
    /// Key every structured element must carry.
    fn required_key(self) -> &'static str {
        match self {
            FieldKind::Metrics => "expression",
            FieldKind::Dimensions => "name",
        }
    }

    fn permitted_keys(self) -> &'static [&'static str] {
        match self {
            FieldKind::Metrics => &["expression", "alias"],
            FieldKind::Dimensions => &["name"],
        }
    }
}

impl FromStr for FieldKind {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "metrics" => Ok(FieldKind::Metrics),
            "dimensions" => Ok(FieldKind::Dimensions),
            other => Err(ReportError::InvalidValue(format!(
                "Unsupported field kind '{}', expected 'metrics' or 'dimensions'",
                other
            ))),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Metrics => f.write_str("metrics"),
            FieldKind::Dimensions => f.write_str("dimensions"),
        }
    }
}

/// One user-supplied field element: a bare name or a structured object.
///
/// Anything else deserializes into `Invalid` so that it can be rejected with a
/// value error at normalization time instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldSpec {
    Name(String),
    Object(FieldObject),
    Invalid(Value),
}

impl From<&str> for FieldSpec {
    fn from(name: &str) -> Self {
        FieldSpec::Name(name.to_string())
    }
}

impl From<String> for FieldSpec {
    fn from(name: String) -> Self {
        FieldSpec::Name(name)
    }
}

impl From<FieldObject> for FieldSpec {
    fn from(object: FieldObject) -> Self {
        FieldSpec::Object(object)
    }
}

impl From<Value> for FieldSpec {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => FieldSpec::Name(s),
            Value::Object(o) => FieldSpec::Object(o),
            other => FieldSpec::Invalid(other),
        }
    }
}

/// Convert a field list into the canonical wire shape for `kind`.
pub fn normalize(fields: &[FieldSpec], kind: FieldKind) -> Result<Vec<FieldObject>, ReportError> {
    fields
        .iter()
        .map(|field| normalize_one(field, kind))
        .collect()
}

fn normalize_one(field: &FieldSpec, kind: FieldKind) -> Result<FieldObject, ReportError> {
    match field {
        FieldSpec::Name(name) => {
            let mut object = Map::new();
            object.insert(kind.required_key().to_string(), Value::String(name.clone()));
            Ok(object)
        }
        FieldSpec::Object(object) => {
            let permitted = kind.permitted_keys();
            let unknown: Vec<&str> = object
                .keys()
                .map(String::as_str)
                .filter(|key| !permitted.contains(key))
                .collect();
            if !unknown.is_empty() {
                return Err(ReportError::InvalidValue(format!(
                    "Unsupported keys {:?} in {} field, permitted keys are {:?}",
                    unknown, kind, permitted
                )));
            }
            if !object.contains_key(kind.required_key()) {
                return Err(ReportError::InvalidValue(format!(
                    "{} field is missing required key '{}'",
                    kind,
                    kind.required_key()
                )));
            }
            Ok(object.clone())
        }
        FieldSpec::Invalid(value) => Err(ReportError::InvalidValue(format!(
            "{} field must be a string or an object, got {}",
            kind,
            json_kind(value)
        ))),
    }
}

/// A date expression before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum DateInput {
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Text(String),
    /// Input that cannot express a calendar date; carries a description of its kind.
    Unsupported(String),
}

impl From<NaiveDate> for DateInput {
    fn from(date: NaiveDate) -> Self {
        DateInput::Date(date)
    }
}

impl From<NaiveDateTime> for DateInput {
    fn from(datetime: NaiveDateTime) -> Self {
        DateInput::DateTime(datetime)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for DateInput {
    fn from(datetime: DateTime<Tz>) -> Self {
        DateInput::DateTime(datetime.naive_local())
    }
}

impl From<chrono::Duration> for DateInput {
    fn from(_: chrono::Duration) -> Self {
        DateInput::Unsupported("duration".to_string())
    }
}

impl From<&str> for DateInput {
    fn from(text: &str) -> Self {
        DateInput::Text(text.to_string())
    }
}

impl From<String> for DateInput {
    fn from(text: String) -> Self {
        DateInput::Text(text)
    }
}

impl From<&Value> for DateInput {
    fn from(value: &Value) -> Self {
        match value {
            Value::String(s) => DateInput::Text(s.clone()),
            other => DateInput::Unsupported(json_kind(other).to_string()),
        }
    }
}

/// Normalize a date expression to `YYYY-MM-DD` or a verbatim relative keyword.
pub fn normalize_date(value: &DateInput) -> Result<String, ReportError> {
    match value {
        DateInput::Date(date) => Ok(format_date(*date)),
        DateInput::DateTime(datetime) => Ok(format_date(datetime.date())),
        DateInput::Text(text) => {
            if is_relative_keyword(text) {
                return Ok(text.clone());
            }
            parse_iso_date(text).map(format_date).ok_or_else(|| {
                ReportError::InvalidValue(format!(
                    "Unrecognized date expression '{}', expected YYYY-MM-DD, 'today', 'yesterday' or 'NDaysAgo'",
                    text
                ))
            })
        }
        DateInput::Unsupported(kind) => Err(ReportError::InvalidType(format!(
            "Date expression must be a date, a date/time or a string, got {}",
            kind
        ))),
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn is_relative_keyword(text: &str) -> bool {
    if text == "today" || text == "yesterday" {
        return true;
    }
    match text.strip_suffix("DaysAgo") {
        Some(days) => {
            days.chars().all(|c| c.is_ascii_digit()) && days.chars().any(|c| c != '0')
        }
        None => false,
    }
}

fn parse_iso_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
        return Some(datetime.date_naive());
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|datetime| datetime.date())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
