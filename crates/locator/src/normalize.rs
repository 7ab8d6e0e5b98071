use model::{document::FieldValue, station::FieldKind};
use serde_json::Value;

/// A value or a whole payload that could not be brought into canonical form.
#[derive(Debug, thiserror::Error)]
pub enum NormalizationError {
    #[error("field `{field}`: can not convert {raw} to {expected}")]
    Field {
        field: String,
        raw: String,
        expected: &'static str,
    },
    #[error("malformed table: {0}")]
    Table(#[from] csv::Error),
    #[error("table has no header row")]
    MissingHeader,
    #[error("malformed spreadsheet: {0}")]
    Spreadsheet(String),
    #[error("spreadsheet has no worksheet")]
    EmptySheet,
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a json array of objects")]
    NotAnArray,
}

impl NormalizationError {
    fn field(field: &str, raw: &Value, expected: &'static str) -> Self {
        Self::Field {
            field: field.to_owned(),
            raw: raw.to_string(),
            expected,
        }
    }
}

pub type Result<T> = std::result::Result<T, NormalizationError>;

/// Converts a loosely typed source value into the declared kind.
///
/// Numeric text may carry thousands separators and surrounding whitespace;
/// empty text and `null` become zero. Text normalization never fails.
pub fn normalize(field: &str, raw: &Value, kind: FieldKind) -> Result<FieldValue> {
    match kind {
        FieldKind::Int => normalize_int(field, raw).map(FieldValue::Int),
        FieldKind::Float => normalize_float(field, raw).map(FieldValue::Float),
        FieldKind::Text => Ok(FieldValue::Text(normalize_text(raw))),
    }
}

pub fn normalize_int(field: &str, raw: &Value) -> Result<i64> {
    match raw {
        Value::Null => Ok(0),
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().and_then(truncate_to_int))
            .ok_or_else(|| NormalizationError::field(field, raw, "int")),
        Value::String(text) => {
            let clean = clean_numeric(text);
            if clean.is_empty() {
                return Ok(0);
            }
            clean
                .parse::<i64>()
                .ok()
                .or_else(|| {
                    clean
                        .parse::<f64>()
                        .ok()
                        .and_then(truncate_to_int)
                })
                .ok_or_else(|| NormalizationError::field(field, raw, "int"))
        }
        _ => Err(NormalizationError::field(field, raw, "int")),
    }
}

pub fn normalize_float(field: &str, raw: &Value) -> Result<f64> {
    match raw {
        Value::Null => Ok(0.0),
        Value::Number(number) => number
            .as_f64()
            .ok_or_else(|| NormalizationError::field(field, raw, "float")),
        Value::String(text) => {
            let clean = clean_numeric(text);
            if clean.is_empty() {
                return Ok(0.0);
            }
            clean
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .ok_or_else(|| NormalizationError::field(field, raw, "float"))
        }
        _ => Err(NormalizationError::field(field, raw, "float")),
    }
}

pub fn normalize_text(raw: &Value) -> String {
    match raw {
        Value::Null => String::new(),
        Value::String(text) => text.trim().to_owned(),
        other => other.to_string().trim().to_owned(),
    }
}

/// The integral part of `value`, unless it does not fit an `i64`.
fn truncate_to_int(value: f64) -> Option<i64> {
    // 2^63, the first value past i64::MAX
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    let value = value.trunc();
    (value.is_finite() && (-LIMIT..LIMIT).contains(&value)).then_some(value as i64)
}

fn clean_numeric(text: &str) -> String {
    text.replace(',', "").trim().to_owned()
}
