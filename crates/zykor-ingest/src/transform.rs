//! Transformer: raw payload → typed, defaulted records
//!
//! The default policy never fails on a value:
//!
//! - numbers: JSON numbers or numeric strings; empty, `"null"`, garbage and
//!   non-finite values become `0`
//! - text: absent becomes `""`; numbers and booleans are stringified
//! - dates: the part before `T`; empty, invalid and `0001-01-01` become null
//! - timestamps: timezone suffix dropped, wall-clock time kept; invalid
//!   becomes null
//!
//! A payload without the descriptor's item container yields no records.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{IngestError, Result};
use crate::models::RawCapture;
use crate::record::{FieldValue, NormalizedRecord, DATE_FORMAT};
use crate::schema::{FieldKind, FieldSpec, SchemaDescriptor};

/// Placeholder the POS writes for "no date"
const SENTINEL_DATE: &str = "0001-01-01";

pub struct Transformer<'a> {
    descriptor: &'a SchemaDescriptor,
}

impl<'a> Transformer<'a> {
    pub fn new(descriptor: &'a SchemaDescriptor) -> Self {
        Self { descriptor }
    }

    /// Transform a capture, logging and swallowing a malformed payload
    ///
    /// Returns the records plus the malformed-payload reason, if any.
    pub fn transform(&self, capture: &RawCapture) -> (Vec<NormalizedRecord>, Option<IngestError>) {
        match self.try_transform(capture.id, &capture.source_payload) {
            Ok(records) => (records, None),
            Err(err) => {
                warn!(
                    raw_capture_id = capture.id,
                    data_type = %self.descriptor.data_type,
                    error = %err,
                    "Payload has no item list, nothing to ingest"
                );
                (Vec::new(), Some(err))
            },
        }
    }

    /// Transform a payload, failing with `MalformedSourcePayload` when the
    /// item container is missing or not a list
    pub fn try_transform(&self, raw_capture_id: i64, payload: &Value) -> Result<Vec<NormalizedRecord>> {
        let container = &self.descriptor.container;
        let items = payload
            .get(container)
            .ok_or_else(|| IngestError::MalformedSourcePayload {
                raw_capture_id,
                reason: format!("missing '{container}'"),
            })?
            .as_array()
            .ok_or_else(|| IngestError::MalformedSourcePayload {
                raw_capture_id,
                reason: format!("'{container}' is not a list"),
            })?;

        let mut records = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            match item.as_object() {
                Some(object) => records.push(self.transform_item(index, object)),
                None => warn!(
                    raw_capture_id,
                    source_index = index,
                    "Skipping payload item that is not an object"
                ),
            }
        }

        debug!(
            raw_capture_id,
            data_type = %self.descriptor.data_type,
            items = items.len(),
            records = records.len(),
            "Payload transformed"
        );
        Ok(records)
    }

    /// Map one payload item; `index` is its position in the payload list
    pub fn transform_item(&self, index: usize, item: &Map<String, Value>) -> NormalizedRecord {
        let mut record = NormalizedRecord::with_capacity(index, self.descriptor.fields.len());
        for field in &self.descriptor.fields {
            let value = match &field.kind {
                FieldKind::WeekOfYear { date_column } => {
                    let date = match record.get(date_column) {
                        Some(FieldValue::Date(date)) => *date,
                        _ => None,
                    };
                    FieldValue::Integer(date.map(week_of_year).unwrap_or(0))
                },
                kind => coerce(kind, source_value(item, field)),
            };
            record.set(field.column.as_str(), value);
        }
        record
    }
}

/// First present, non-null, non-empty source value, else the fallback
fn source_value<'v>(item: &'v Map<String, Value>, field: &'v FieldSpec) -> Option<&'v Value> {
    field
        .sources
        .iter()
        .filter_map(|path| lookup(item, path))
        .find(|value| is_present(value))
        .or(field.fallback.as_ref())
}

/// Resolve a dotted path against nested objects
///
/// An exact key match wins first, so keys that contain dots still resolve.
pub fn lookup<'v>(item: &'v Map<String, Value>, path: &str) -> Option<&'v Value> {
    if let Some(value) = item.get(path) {
        return Some(value);
    }
    let mut segments = path.split('.');
    let mut current = item.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Apply the default policy for one non-derived field kind
pub fn coerce(kind: &FieldKind, value: Option<&Value>) -> FieldValue {
    match kind {
        FieldKind::Text => FieldValue::Text(coerce_text(value)),
        FieldKind::Integer => FieldValue::Integer(coerce_integer(value)),
        FieldKind::Float => FieldValue::Float(coerce_float(value)),
        FieldKind::Bool => FieldValue::Bool(coerce_bool(value)),
        FieldKind::Date => FieldValue::Date(coerce_date(value)),
        FieldKind::Timestamp => FieldValue::Timestamp(coerce_timestamp(value)),
        FieldKind::Hour => FieldValue::Integer(coerce_hour(value)),
        FieldKind::MonthOfYearMonth => FieldValue::Integer(coerce_month(value)),
        FieldKind::Json => FieldValue::Json(value.filter(|v| !v.is_null()).cloned()),
        FieldKind::WeekOfYear { .. } => FieldValue::Integer(0),
    }
}

pub fn coerce_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

pub fn coerce_float(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => parse_decimal(s),
        _ => None,
    };
    parsed.filter(|f| f.is_finite()).unwrap_or(0.0)
}

/// Integers go through `f64` and truncate, so `"12.9"` becomes `12`
pub fn coerce_integer(value: Option<&Value>) -> i64 {
    if let Some(Value::Number(n)) = value {
        if let Some(i) = n.as_i64() {
            return i;
        }
    }
    if let Some(Value::String(s)) = value {
        if let Ok(i) = s.trim().parse::<i64>() {
            return i;
        }
    }
    let f = coerce_float(value);
    if f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        f.trunc() as i64
    } else {
        0
    }
}

pub fn coerce_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "sim" | "yes" | "s"
        ),
        _ => false,
    }
}

pub fn coerce_date(value: Option<&Value>) -> Option<NaiveDate> {
    let raw = value?.as_str()?.trim();
    let date_part = raw.split(['T', ' ']).next()?.trim();
    if date_part.is_empty() || date_part == SENTINEL_DATE {
        return None;
    }
    NaiveDate::parse_from_str(date_part, DATE_FORMAT).ok()
}

/// Parse a timestamp and keep its local wall-clock time
///
/// Accepts `2025-02-01T18:48:53-0300`, RFC 3339 (`Z`, `+00:00`) and naive
/// forms with `T` or a space. Fractional seconds are dropped.
pub fn coerce_timestamp(value: Option<&Value>) -> Option<NaiveDateTime> {
    let raw = value?.as_str()?.trim();
    if raw.is_empty() || raw.starts_with(SENTINEL_DATE) {
        return None;
    }

    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.naive_local())
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z").map(|dt| dt.naive_local()))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()?;

    parsed.with_nanosecond(0)
}

/// Hour of day from `"18:00"`, `"18"` or `18`
pub fn coerce_hour(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::String(s)) if s.contains(':') => {
            let hour = s.split(':').next().map(|h| Value::String(h.to_string()));
            coerce_integer(hour.as_ref())
        },
        other => coerce_integer(other),
    }
}

/// Month from `"2025-02"`; bare numbers pass through
pub fn coerce_month(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::String(s)) if s.contains('-') => {
            let month = s.split('-').nth(1).map(|m| Value::String(m.to_string()));
            coerce_integer(month.as_ref())
        },
        other => coerce_integer(other),
    }
}

/// Week of the year, weeks starting on Sunday, first week = 1
pub fn week_of_year(date: NaiveDate) -> i64 {
    let Some(jan_first) = NaiveDate::from_ymd_opt(date.year(), 1, 1) else {
        return 0;
    };
    let days = (date - jan_first).num_days();
    let offset = i64::from(jan_first.weekday().num_days_from_sunday());
    (days + offset + 1 + 6) / 7
}

/// Parse a decimal string, accepting a comma as the decimal separator
fn parse_decimal(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        return None;
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        return Some(f);
    }
    if trimmed.contains(',') && !trimmed.contains('.') {
        return trimmed.replace(',', ".").parse::<f64>().ok();
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_float_policy() {
        let cases = [
            (json!(12.5), 12.5),
            (json!("12.5"), 12.5),
            (json!("12,5"), 12.5),
            (json!(" 7 "), 7.0),
            (json!(""), 0.0),
            (json!("null"), 0.0),
            (json!("abc"), 0.0),
            (json!("NaN"), 0.0),
            (json!("inf"), 0.0),
            (json!(null), 0.0),
            (json!(true), 0.0),
            (json!({"v": 1}), 0.0),
        ];
        for (input, expected) in cases {
            assert_eq!(coerce_float(Some(&input)), expected, "input {input}");
        }
        assert_eq!(coerce_float(None), 0.0);
    }

    #[test]
    fn test_integer_policy() {
        let cases = [
            (json!(4), 4),
            (json!("4"), 4),
            (json!("12.9"), 12),
            (json!(-3.7), -3),
            (json!(""), 0),
            (json!("x"), 0),
            (json!(1e300), 0),
        ];
        for (input, expected) in cases {
            assert_eq!(coerce_integer(Some(&input)), expected, "input {input}");
        }
    }

    #[test]
    fn test_text_and_bool_policy() {
        assert_eq!(coerce_text(None), "");
        assert_eq!(coerce_text(Some(&json!(null))), "");
        assert_eq!(coerce_text(Some(&json!(812))), "812");
        assert_eq!(coerce_text(Some(&json!("Mesa 4"))), "Mesa 4");
        assert!(coerce_bool(Some(&json!(true))));
        assert!(coerce_bool(Some(&json!("true"))));
        assert!(coerce_bool(Some(&json!(1))));
        assert!(!coerce_bool(Some(&json!("false"))));
        assert!(!coerce_bool(None));
    }

    #[test]
    fn test_date_policy() {
        let cases = [
            (json!("2025-02-01"), Some(date(2025, 2, 1))),
            (json!("2025-02-01T00:00:00"), Some(date(2025, 2, 1))),
            (json!("2025-02-01 10:00:00"), Some(date(2025, 2, 1))),
            (json!("0001-01-01"), None),
            (json!("0001-01-01T00:00:00"), None),
            (json!(""), None),
            (json!("2025-13-45"), None),
            (json!("ontem"), None),
            (json!(20250201), None),
        ];
        for (input, expected) in cases {
            assert_eq!(coerce_date(Some(&input)), expected, "input {input}");
        }
        assert_eq!(coerce_date(None), None);
    }

    #[test]
    fn test_timestamp_strips_timezone() {
        let expected = date(2025, 2, 1).and_hms_opt(18, 48, 53);
        for input in [
            "2025-02-01T18:48:53-0300",
            "2025-02-01T18:48:53-03:00",
            "2025-02-01T18:48:53+0000",
            "2025-02-01T18:48:53+00:00",
            "2025-02-01T18:48:53Z",
            "2025-02-01T18:48:53.250Z",
            "2025-02-01T18:48:53",
            "2025-02-01 18:48:53",
        ] {
            assert_eq!(coerce_timestamp(Some(&json!(input))), expected, "input {input}");
        }
        assert_eq!(coerce_timestamp(Some(&json!("undefined"))), None);
        assert_eq!(coerce_timestamp(Some(&json!(""))), None);
        assert_eq!(coerce_timestamp(Some(&json!("0001-01-01T00:00:00"))), None);
        assert_eq!(coerce_timestamp(Some(&json!("0001-01-01 00:00:00-0300"))), None);
    }

    #[test]
    fn test_hour_and_month() {
        assert_eq!(coerce_hour(Some(&json!("18:00"))), 18);
        assert_eq!(coerce_hour(Some(&json!("7"))), 7);
        assert_eq!(coerce_hour(Some(&json!(23))), 23);
        assert_eq!(coerce_hour(Some(&json!("xx:00"))), 0);
        assert_eq!(coerce_month(Some(&json!("2025-02"))), 2);
        assert_eq!(coerce_month(Some(&json!(11))), 11);
        assert_eq!(coerce_month(Some(&json!("fev"))), 0);
    }

    #[test]
    fn test_week_of_year() {
        // 2025-01-01 is a Wednesday
        assert_eq!(week_of_year(date(2025, 1, 1)), 1);
        assert_eq!(week_of_year(date(2025, 1, 4)), 1);
        assert_eq!(week_of_year(date(2025, 1, 5)), 2);
        // 2023-01-01 is a Sunday
        assert_eq!(week_of_year(date(2023, 1, 1)), 1);
        assert_eq!(week_of_year(date(2023, 1, 7)), 1);
        assert_eq!(week_of_year(date(2023, 1, 8)), 2);
        assert_eq!(week_of_year(date(2024, 12, 31)), 53);
    }

    #[test]
    fn test_lookup_nested_and_dotted_keys() {
        let item = json!({"category": {"id": "c1"}, "a.b": 1});
        let map = item.as_object().unwrap();
        assert_eq!(lookup(map, "category.id"), Some(&json!("c1")));
        assert_eq!(lookup(map, "a.b"), Some(&json!(1)));
        assert_eq!(lookup(map, "category.name"), None);
        assert_eq!(lookup(map, "category.id.x"), None);
    }

    #[test]
    fn test_source_fallbacks() {
        let descriptor = SchemaDescriptor::new("s", "t", "list", 10).fields(vec![
            FieldSpec::float("valor").at(&["$valor", "valor"]),
            FieldSpec::text("tipo").at(&["type"]).or("receita"),
            FieldSpec::date("dia"),
            FieldSpec::week_of("semana", "dia"),
        ]);
        let transformer = Transformer::new(&descriptor);

        let item = json!({"$valor": "", "valor": "30.5", "type": null, "dia": "0001-01-01"});
        let record = transformer.transform_item(2, item.as_object().unwrap());

        assert_eq!(record.source_index(), 2);
        assert_eq!(record.get("valor"), Some(&FieldValue::Float(30.5)));
        assert_eq!(record.get("tipo"), Some(&FieldValue::Text("receita".into())));
        assert_eq!(record.get("dia"), Some(&FieldValue::Date(None)));
        assert_eq!(record.get("semana"), Some(&FieldValue::Integer(0)));
    }

    #[test]
    fn test_malformed_payload_and_non_object_items() {
        let descriptor = SchemaDescriptor::new("s", "t", "list", 10)
            .fields(vec![FieldSpec::text("id")]);
        let transformer = Transformer::new(&descriptor);

        assert!(matches!(
            transformer.try_transform(5, &json!({})),
            Err(IngestError::MalformedSourcePayload { raw_capture_id: 5, .. })
        ));
        assert!(transformer.try_transform(5, &json!({"list": "x"})).is_err());

        let records = transformer
            .try_transform(5, &json!({"list": [{"id": "a"}, 42, {"id": "b"}]}))
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].source_index(), 2);
    }
}
