//! Output normalization: decode captured text, then reshape it into the
//! outward field names and units declared by the tool.

use chrono::{DateTime, SecondsFormat};
use serde_json::{json, Map, Number, Value};

use crate::error::BridgeError;

/// How captured text should be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Whole-payload JSON, then newline-delimited JSON, then raw text.
    Auto,
    Json,
    JsonLines,
    Text,
}

/// Unit conversion applied to a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum Conversion {
    Keep,
    /// Epoch seconds to an RFC 3339 UTC timestamp.
    EpochToTimestamp,
    /// Integer minor currency units to a decimal major-unit amount. The
    /// exponent comes from the sibling `currency_field` when given, else 2.
    Money { currency_field: Option<String> },
    /// Apply field rules to a nested object, or to each element of a nested array.
    Nested(Vec<FieldRule>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    /// Key of the source field, or a JSON pointer when it starts with `/`.
    pub from: String,
    pub to: String,
    pub convert: Conversion,
}

impl FieldRule {
    pub fn keep(name: &str) -> Self {
        Self::renamed(name, name)
    }

    pub fn renamed(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            convert: Conversion::Keep,
        }
    }

    pub fn timestamp(name: &str) -> Self {
        Self::keep(name).converted(Conversion::EpochToTimestamp)
    }

    pub fn money(name: &str) -> Self {
        Self::keep(name).converted(Conversion::Money {
            currency_field: None,
        })
    }

    pub fn converted(mut self, convert: Conversion) -> Self {
        self.convert = convert;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Passthrough,
    /// A single record, optionally read from `source` and wrapped under `key`.
    /// A missing record fails with `missing` as the message when given.
    Record {
        source: Option<String>,
        key: Option<String>,
        fields: Vec<FieldRule>,
        missing: Option<String>,
    },
    /// An array of records read from `source`, optionally wrapped under
    /// `key` alongside a `count`.
    Collection {
        source: Option<String>,
        key: Option<String>,
        fields: Vec<FieldRule>,
        count: bool,
    },
}

/// Per-call description of the expected output.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub format: OutputFormat,
    pub raw_fallback: bool,
    pub shape: Shape,
    pub limit: Option<usize>,
    pub replace_with: Option<String>,
    pub note: Option<String>,
    /// Call inputs added to a `Record` before field mapping, for values the
    /// remote response does not echo back. Never overrides response fields.
    pub merge: Map<String, Value>,
}

impl OutputSpec {
    /// Structured when possible, raw text otherwise.
    pub fn auto() -> Self {
        Self {
            format: OutputFormat::Auto,
            raw_fallback: true,
            shape: Shape::Passthrough,
            limit: None,
            replace_with: None,
            note: None,
            merge: Map::new(),
        }
    }

    /// Whole-payload JSON; anything else is a decode error.
    pub fn json() -> Self {
        Self {
            format: OutputFormat::Json,
            raw_fallback: false,
            ..Self::auto()
        }
    }

    /// Newline-delimited JSON; anything else is a decode error.
    pub fn json_lines() -> Self {
        Self {
            format: OutputFormat::JsonLines,
            raw_fallback: false,
            ..Self::auto()
        }
    }

    pub fn text() -> Self {
        Self {
            format: OutputFormat::Text,
            ..Self::auto()
        }
    }

    pub fn shaped(mut self, shape: Shape) -> Self {
        self.shape = shape;
        self
    }

    pub fn limited(mut self, limit: Option<i64>) -> Self {
        self.limit = limit.and_then(|l| usize::try_from(l).ok());
        self
    }

    pub fn replaced_with(mut self, message: impl Into<String>) -> Self {
        self.replace_with = Some(message.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn merging(mut self, name: &str, value: Value) -> Self {
        self.merge.insert(name.to_string(), value);
        self
    }
}

/// Decode captured program output and normalize it.
pub fn normalize_text(raw: &str, spec: &OutputSpec) -> Result<Value, BridgeError> {
    if let Some(message) = &spec.replace_with {
        return Ok(Value::String(message.clone()));
    }

    match decode(raw, spec)? {
        Decoded::Structured(value) => normalize_value(value, spec),
        Decoded::Text(text) => Ok(attach_note(Value::String(text), spec)),
    }
}

/// Normalize an already structured result, such as a remote response.
pub fn normalize_value(value: Value, spec: &OutputSpec) -> Result<Value, BridgeError> {
    if let Some(message) = &spec.replace_with {
        return Ok(Value::String(message.clone()));
    }

    let value = match spec.limit {
        Some(limit) => truncate(value, limit),
        None => value,
    };
    let shaped = apply_shape(value, spec)?;
    Ok(attach_note(shaped, spec))
}

enum Decoded {
    Structured(Value),
    Text(String),
}

fn decode(raw: &str, spec: &OutputSpec) -> Result<Decoded, BridgeError> {
    let trimmed = raw.trim();

    let structured = match spec.format {
        OutputFormat::Text => return Ok(Decoded::Text(trimmed.to_string())),
        OutputFormat::Json => decode_whole(trimmed),
        OutputFormat::JsonLines if trimmed.is_empty() => Ok(Value::Array(Vec::new())),
        OutputFormat::JsonLines => decode_lines(trimmed),
        OutputFormat::Auto => decode_whole(trimmed).or_else(|_| decode_lines(trimmed)),
    };

    match structured {
        Ok(value) => Ok(Decoded::Structured(value)),
        Err(_) if spec.raw_fallback => Ok(Decoded::Text(trimmed.to_string())),
        Err(e) => Err(BridgeError::OutputDecode(e)),
    }
}

fn decode_whole(text: &str) -> Result<Value, String> {
    serde_json::from_str(text).map_err(|e| format!("expected a JSON document: {}", e))
}

fn decode_lines(text: &str) -> Result<Value, String> {
    let mut records = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record = serde_json::from_str(line)
            .map_err(|e| format!("line {} is not a JSON record: {}", n + 1, e))?;
        records.push(record);
    }
    if records.is_empty() {
        return Err("no JSON records in output".to_string());
    }
    Ok(Value::Array(records))
}

fn truncate(value: Value, limit: usize) -> Value {
    match value {
        Value::Array(mut items) => {
            items.truncate(limit);
            Value::Array(items)
        }
        other => other,
    }
}

fn lookup<'a>(value: &'a Value, from: &str) -> Option<&'a Value> {
    if from.starts_with('/') {
        value.pointer(from)
    } else {
        value.get(from)
    }
}

fn select(value: Value, source: &Option<String>) -> Option<Value> {
    match source {
        Some(pointer) => value.pointer(pointer).cloned(),
        None => Some(value),
    }
}

fn apply_shape(value: Value, spec: &OutputSpec) -> Result<Value, BridgeError> {
    let limit = spec.limit;
    match &spec.shape {
        Shape::Passthrough => Ok(value),
        Shape::Record {
            source,
            key,
            fields,
            missing,
        } => {
            let record = select(value, source).filter(|v| !v.is_null());
            let record = match (record, missing) {
                (Some(record), _) => record,
                (None, Some(message)) => return Err(BridgeError::NotFound(message.clone())),
                (None, None) => {
                    return Err(BridgeError::OutputDecode(format!(
                        "no record at {}",
                        source.as_deref().unwrap_or("/")
                    )))
                }
            };
            let record = match record {
                Value::Object(mut map) => {
                    for (name, value) in &spec.merge {
                        map.entry(name.clone()).or_insert_with(|| value.clone());
                    }
                    Value::Object(map)
                }
                other => other,
            };
            let mapped = map_fields(&record, fields)?;
            Ok(wrap(key, mapped))
        }
        Shape::Collection {
            source,
            key,
            fields,
            count,
        } => {
            let items = match select(value, source) {
                Some(Value::Array(items)) => items,
                Some(other) => {
                    return Err(BridgeError::OutputDecode(format!(
                        "expected an array at {}, got {}",
                        source.as_deref().unwrap_or("/"),
                        crate::types::json_type_name(&other)
                    )))
                }
                None => {
                    return Err(BridgeError::OutputDecode(format!(
                        "no array at {}",
                        source.as_deref().unwrap_or("/")
                    )))
                }
            };
            let take = limit.unwrap_or(items.len());
            let mapped = items
                .iter()
                .take(take)
                .map(|item| map_fields(item, fields))
                .collect::<Result<Vec<_>, _>>()?;

            match (key, count) {
                (Some(key), true) => Ok(json!({ "count": mapped.len(), key.as_str(): mapped })),
                (Some(key), false) => Ok(json!({ key.as_str(): mapped })),
                (None, true) => Ok(json!({ "count": mapped.len(), "items": mapped })),
                (None, false) => Ok(Value::Array(mapped)),
            }
        }
    }
}

fn wrap(key: &Option<String>, value: Value) -> Value {
    match key {
        Some(key) => json!({ key.as_str(): value }),
        None => value,
    }
}

fn map_fields(record: &Value, fields: &[FieldRule]) -> Result<Value, BridgeError> {
    if fields.is_empty() {
        return Ok(record.clone());
    }

    let mut out = Map::new();
    for rule in fields {
        let value = match lookup(record, &rule.from) {
            Some(value) => convert(record, value, rule)?,
            None => Value::Null,
        };
        out.insert(rule.to.clone(), value);
    }
    Ok(Value::Object(out))
}

fn convert(record: &Value, value: &Value, rule: &FieldRule) -> Result<Value, BridgeError> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    match &rule.convert {
        Conversion::Keep => Ok(value.clone()),
        Conversion::EpochToTimestamp => {
            let secs = value.as_i64().ok_or_else(|| {
                BridgeError::OutputDecode(format!(
                    "field '{}' is not an epoch timestamp",
                    rule.from
                ))
            })?;
            epoch_to_timestamp(secs).map(Value::String).ok_or_else(|| {
                BridgeError::OutputDecode(format!("field '{}' is out of range", rule.from))
            })
        }
        Conversion::Money { currency_field } => {
            let minor = value.as_i64().ok_or_else(|| {
                BridgeError::OutputDecode(format!(
                    "field '{}' is not an integer amount",
                    rule.from
                ))
            })?;
            let exponent = currency_field
                .as_deref()
                .and_then(|f| lookup(record, f))
                .and_then(Value::as_str)
                .map(currency_exponent)
                .unwrap_or(DEFAULT_EXPONENT);
            Ok(minor_to_major(minor, exponent))
        }
        Conversion::Nested(rules) => match value {
            Value::Array(items) => items
                .iter()
                .map(|item| map_fields(item, rules))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => map_fields(other, rules),
        },
    }
}

fn attach_note(value: Value, spec: &OutputSpec) -> Value {
    match (&spec.note, value) {
        (None, value) => value,
        (Some(note), Value::Object(mut map)) => {
            map.insert("message".to_string(), Value::String(note.clone()));
            Value::Object(map)
        }
        (Some(note), other) => json!({ "result": other, "message": note }),
    }
}

/// RFC 3339 UTC with millisecond precision, e.g. `2024-01-31T12:00:00.000Z`.
pub fn epoch_to_timestamp(secs: i64) -> Option<String> {
    DateTime::from_timestamp(secs, 0).map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

const DEFAULT_EXPONENT: u32 = 2;

/// ISO 4217 currencies without a minor unit.
const ZERO_DECIMAL: &[&str] = &[
    "bif", "clp", "djf", "gnf", "jpy", "kmf", "krw", "mga", "pyg", "rwf", "ugx", "vnd", "vuv",
    "xaf", "xof", "xpf",
];

const THREE_DECIMAL: &[&str] = &["bhd", "jod", "kwd", "omr", "tnd"];

/// Number of minor-unit digits of a currency code.
pub fn currency_exponent(code: &str) -> u32 {
    let code = code.to_ascii_lowercase();
    if ZERO_DECIMAL.contains(&code.as_str()) {
        0
    } else if THREE_DECIMAL.contains(&code.as_str()) {
        3
    } else {
        DEFAULT_EXPONENT
    }
}

/// Exact decimal rendering of a minor-unit amount: `1999, 2` is `"19.99"`.
pub fn format_minor_units(minor: i64, exponent: u32) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let digits = minor.unsigned_abs().to_string();
    let exponent = exponent as usize;
    if exponent == 0 {
        return format!("{}{}", sign, digits);
    }
    let padded = format!("{:0>width$}", digits, width = exponent + 1);
    let (whole, frac) = padded.split_at(padded.len() - exponent);
    format!("{}{}.{}", sign, whole, frac)
}

/// Inverse of [`format_minor_units`] for well-formed decimal strings.
pub fn parse_major_units(text: &str, exponent: u32) -> Option<i64> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (whole, frac) = body.split_once('.').unwrap_or((body, ""));
    if frac.len() > exponent as usize || whole.is_empty() {
        return None;
    }
    let digits = format!("{}{:0<width$}", whole, frac, width = exponent as usize);
    let magnitude: i128 = digits.parse().ok()?;
    let signed = if negative { -magnitude } else { magnitude };
    i64::try_from(signed).ok()
}

/// Decimal major-unit amount as a JSON number. The number is the float
/// nearest to the exact decimal, so scaling it back by `10^exponent` and
/// rounding yields `minor` for every amount below 2^50 in magnitude.
pub fn minor_to_major(minor: i64, exponent: u32) -> Value {
    let exact = format_minor_units(minor, exponent);
    exact
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::String(exact))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_auto_decodes_whole_json() {
        let out = normalize_text("[{\"a\":1}]\n", &OutputSpec::auto()).unwrap();
        assert_eq!(out, json!([{"a": 1}]));
    }

    #[test]
    fn test_auto_decodes_json_lines() {
        let raw = "{\"name\":\"main\",\"protected\":true}\n{\"name\":\"dev\",\"protected\":false}\n";
        let out = normalize_text(raw, &OutputSpec::auto()).unwrap();
        assert_eq!(
            out,
            json!([{"name": "main", "protected": true}, {"name": "dev", "protected": false}])
        );
    }

    #[test]
    fn test_auto_falls_back_to_trimmed_text() {
        let out = normalize_text("https://github.com/o/r/issues/7\n", &OutputSpec::auto()).unwrap();
        assert_eq!(out, json!("https://github.com/o/r/issues/7"));
    }

    #[test]
    fn test_strict_json_reports_decode_error() {
        let err = normalize_text("not json", &OutputSpec::json()).unwrap_err();
        assert!(matches!(err, BridgeError::OutputDecode(_)));
    }

    #[test]
    fn test_strict_lines_reports_bad_line() {
        let err = normalize_text("{\"a\":1}\noops\n", &OutputSpec::json_lines()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_empty_json_lines_is_empty_list() {
        assert_eq!(normalize_text("\n", &OutputSpec::json_lines()).unwrap(), json!([]));
        assert_eq!(normalize_text("", &OutputSpec::auto()).unwrap(), json!(""));
    }

    #[test]
    fn test_replace_with_ignores_output() {
        let spec = OutputSpec::auto().replaced_with("Workflow ci.yml triggered");
        assert_eq!(normalize_text("", &spec).unwrap(), json!("Workflow ci.yml triggered"));
    }

    #[test]
    fn test_limit_truncates_arrays() {
        let spec = OutputSpec::json().limited(Some(2));
        let out = normalize_text("[1,2,3,4]", &spec).unwrap();
        assert_eq!(out, json!([1, 2]));
    }

    #[test]
    fn test_collection_renames_and_converts() {
        let spec = OutputSpec::auto().shaped(Shape::Collection {
            source: Some("/data".into()),
            key: Some("payments".into()),
            fields: vec![
                FieldRule::keep("id"),
                FieldRule::money("amount"),
                FieldRule::timestamp("created"),
                FieldRule::renamed("customer", "customer_id"),
            ],
            count: true,
        });
        let remote = json!({"data": [
            {"id": "pi_1", "amount": 5000, "created": 1700000000, "customer": "cus_1", "extra": 1}
        ]});
        let out = normalize_value(remote, &spec).unwrap();
        assert_eq!(out["count"], 1);
        assert_eq!(out["payments"][0]["id"], "pi_1");
        assert_eq!(out["payments"][0]["amount"], json!(50.0));
        assert_eq!(out["payments"][0]["created"], "2023-11-14T22:13:20.000Z");
        assert_eq!(out["payments"][0]["customer_id"], "cus_1");
        assert!(out["payments"][0].get("extra").is_none());
    }

    #[test]
    fn test_record_missing_reports_not_found() {
        let spec = OutputSpec::auto().shaped(Shape::Record {
            source: Some("/data/0".into()),
            key: Some("customer".into()),
            fields: vec![FieldRule::keep("id")],
            missing: Some("Customer not found".into()),
        });
        let err = normalize_value(json!({"data": []}), &spec).unwrap_err();
        assert_eq!(err, BridgeError::NotFound("Customer not found".into()));
        assert_eq!(err.to_string(), "Customer not found");
    }

    #[test]
    fn test_merge_fills_only_absent_fields() {
        let spec = OutputSpec::json()
            .merging("amount", json!(5000))
            .merging("id", json!("ignored"))
            .shaped(Shape::Record {
                source: None,
                key: Some("payment_link".into()),
                fields: vec![
                    FieldRule::keep("id"),
                    FieldRule::money("amount"),
                ],
                missing: None,
            });
        let out = normalize_value(json!({"id": "plink_1"}), &spec).unwrap();
        assert_eq!(out, json!({"payment_link": {"id": "plink_1", "amount": 50.0}}));
    }

    #[test]
    fn test_nested_money_uses_currency_exponent() {
        let spec = OutputSpec::auto().shaped(Shape::Record {
            source: None,
            key: None,
            fields: vec![FieldRule::keep("available").converted(Conversion::Nested(vec![
                FieldRule::keep("amount").converted(Conversion::Money {
                    currency_field: Some("currency".into()),
                }),
                FieldRule::keep("currency"),
            ]))],
            missing: None,
        });
        let out = normalize_value(
            json!({"available": [
                {"amount": 12345, "currency": "usd"},
                {"amount": 500, "currency": "jpy"}
            ]}),
            &spec,
        )
        .unwrap();
        assert_eq!(out["available"][0]["amount"], json!(123.45));
        assert_eq!(out["available"][1]["amount"], json!(500.0));
    }

    #[test]
    fn test_null_timestamp_stays_null() {
        let spec = OutputSpec::auto().shaped(Shape::Record {
            source: None,
            key: None,
            fields: vec![FieldRule::timestamp("due_date")],
            missing: None,
        });
        let out = normalize_value(json!({"due_date": null}), &spec).unwrap();
        assert_eq!(out, json!({"due_date": null}));
    }

    #[test]
    fn test_note_attached_to_object() {
        let spec = OutputSpec::auto().with_note("Invoice sent to customer");
        let out = normalize_value(json!({"id": "in_1"}), &spec).unwrap();
        assert_eq!(out["message"], "Invoice sent to customer");
    }

    #[test]
    fn test_format_minor_units() {
        assert_eq!(format_minor_units(1999, 2), "19.99");
        assert_eq!(format_minor_units(5, 2), "0.05");
        assert_eq!(format_minor_units(-250, 2), "-2.50");
        assert_eq!(format_minor_units(500, 0), "500");
        assert_eq!(format_minor_units(1, 3), "0.001");
        assert_eq!(format_minor_units(i64::MIN, 2), "-92233720368547758.08");
    }

    proptest! {
        #[test]
        fn prop_decimal_string_round_trips(minor in any::<i64>(), exponent in 0u32..4) {
            let text = format_minor_units(minor, exponent);
            prop_assert_eq!(parse_major_units(&text, exponent), Some(minor));
        }

        #[test]
        fn prop_json_amount_scales_back_exactly(minor in -(1i64 << 50)..(1i64 << 50)) {
            let major = minor_to_major(minor, 2).as_f64().unwrap();
            prop_assert_eq!((major * 100.0).round() as i64, minor);
        }
    }
}
