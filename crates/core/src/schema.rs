//! Schema validation of raw call arguments against a tool's parameter contract.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{BridgeError, ValidationRule};
use crate::types::{json_type_name, Arguments, ParamSpec, ParamType, ToolDescriptor};

/// Arguments that passed validation: every required parameter is present,
/// every value has its declared type, and declared defaults are filled in.
/// Parameters the contract does not declare are not carried over.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedArgs {
    values: Arguments,
}

impl ValidatedArgs {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// String value, treating an empty string as absent.
    pub fn str(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn require_str(&self, name: &str) -> Result<&str, BridgeError> {
        self.values
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| BridgeError::validation(name, ValidationRule::Missing))
    }

    /// Integer value. Validation guarantees every supplied `integer`
    /// parameter fits, so `None` means absent.
    pub fn i64(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(whole_i64)
    }

    pub fn require_i64(&self, name: &str) -> Result<i64, BridgeError> {
        self.i64(name)
            .ok_or_else(|| BridgeError::validation(name, ValidationRule::Missing))
    }

    /// Boolean value; absent means false.
    pub fn flag(&self, name: &str) -> bool {
        self.values
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// String items of an array parameter; absent means empty.
    pub fn str_list(&self, name: &str) -> Vec<String> {
        self.values
            .get(name)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn as_map(&self) -> &Arguments {
        &self.values
    }

    pub fn into_map(self) -> Arguments {
        self.values
    }
}

/// Check `args` against the descriptor's contract.
///
/// Parameters are checked in name order, so the reported parameter is
/// deterministic when several are wrong. `null` counts as absent.
pub fn validate(descriptor: &ToolDescriptor, args: &Arguments) -> Result<ValidatedArgs, BridgeError> {
    let mut values = Map::new();

    for (name, spec) in descriptor.params.iter() {
        match args.get(name).filter(|v| !v.is_null()) {
            Some(value) => {
                check_value(name, spec, value)?;
                values.insert(name.clone(), value.clone());
            }
            None if spec.required => {
                return Err(BridgeError::validation(name.as_str(), ValidationRule::Missing));
            }
            None => {
                if let Some(default) = &spec.default {
                    values.insert(name.clone(), default.clone());
                }
            }
        }
    }

    for name in args.keys().filter(|k| descriptor.params.get(k).is_none()) {
        debug!(tool = %descriptor.name, param = %name, "Ignoring undeclared parameter");
    }

    Ok(ValidatedArgs { values })
}

fn check_value(name: &str, spec: &ParamSpec, value: &Value) -> Result<(), BridgeError> {
    if !spec.kind.matches(value) {
        return Err(BridgeError::validation(
            name,
            ValidationRule::WrongType {
                expected: spec.kind,
                found: json_type_name(value),
            },
        ));
    }

    if spec.kind == ParamType::Integer {
        integer(name, value)?;
    }

    if let (Some(items), Some(array)) = (spec.items, value.as_array()) {
        for (index, item) in array.iter().enumerate() {
            if !items.matches(item) || (items == ParamType::Integer && whole_i64(item).is_none()) {
                return Err(BridgeError::validation(
                    name,
                    ValidationRule::WrongItemType {
                        index,
                        expected: items,
                        found: json_type_name(item),
                    },
                ));
            }
        }
    }

    if let Some(allowed) = &spec.allowed {
        let found = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if !allowed.iter().any(|a| *a == found) {
            return Err(BridgeError::validation(
                name,
                ValidationRule::NotAllowed {
                    allowed: allowed.clone(),
                    found,
                },
            ));
        }
    }

    Ok(())
}

/// A whole number that fits in an `i64`. `7.0` counts; `7.5` and `1e20` do not.
pub fn whole_i64(value: &Value) -> Option<i64> {
    // i64::MIN is exactly -2^63; i64::MAX as f64 rounds up to 2^63.
    const LOW: f64 = i64::MIN as f64;
    const HIGH: f64 = i64::MAX as f64;
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && *f >= LOW && *f < HIGH)
            .map(|f| f as i64)
    })
}

/// Check one value under the `integer` rules and return it.
pub fn integer(name: &str, value: &Value) -> Result<i64, BridgeError> {
    let Some(number) = value.as_f64() else {
        return Err(BridgeError::validation(
            name,
            ValidationRule::WrongType {
                expected: ParamType::Integer,
                found: json_type_name(value),
            },
        ));
    };
    if let Some(whole) = whole_i64(value) {
        return Ok(whole);
    }
    if value.is_u64() || number.fract() == 0.0 {
        return Err(BridgeError::validation(
            name,
            ValidationRule::BadFormat {
                expected: "a 64-bit integer",
                found: value.to_string(),
            },
        ));
    }
    Err(BridgeError::validation(name, ValidationRule::NotInteger))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ParamContract, ParamSpec};
    use serde_json::json;

    fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new(
            "issue_list",
            "List issues",
            ParamContract::new()
                .param("repo", ParamSpec::string("Repository").required())
                .param(
                    "state",
                    ParamSpec::string("State").one_of(&["open", "closed", "all"]),
                )
                .param("limit", ParamSpec::integer("Max").default_value(json!(30)))
                .param("labels", ParamSpec::array_of(ParamType::String, "Labels"))
                .param("draft", ParamSpec::boolean("Draft")),
        )
    }

    fn args(value: Value) -> Arguments {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_valid_arguments_pass_unchanged() {
        let validated = validate(
            &descriptor(),
            &args(json!({"repo": "o/r", "state": "open", "limit": 5})),
        )
        .unwrap();
        assert_eq!(validated.str("repo"), Some("o/r"));
        assert_eq!(validated.str("state"), Some("open"));
        assert_eq!(validated.i64("limit"), Some(5));
    }

    #[test]
    fn test_missing_required_names_parameter() {
        let err = validate(&descriptor(), &args(json!({"state": "open"}))).unwrap_err();
        assert_eq!(
            err,
            BridgeError::validation("repo", ValidationRule::Missing)
        );
    }

    #[test]
    fn test_null_required_counts_as_missing() {
        let err = validate(&descriptor(), &args(json!({"repo": null}))).unwrap_err();
        assert!(matches!(err, BridgeError::Validation { ref param, rule: ValidationRule::Missing } if param == "repo"));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let err = validate(&descriptor(), &args(json!({"repo": 42}))).unwrap_err();
        assert_eq!(
            err,
            BridgeError::validation(
                "repo",
                ValidationRule::WrongType {
                    expected: ParamType::String,
                    found: "number"
                }
            )
        );
    }

    #[test]
    fn test_fractional_integer_rejected() {
        let err = validate(&descriptor(), &args(json!({"repo": "o/r", "limit": 2.5}))).unwrap_err();
        assert_eq!(err, BridgeError::validation("limit", ValidationRule::NotInteger));
    }

    #[test]
    fn test_whole_float_accepted_as_integer() {
        let validated = validate(&descriptor(), &args(json!({"repo": "o/r", "limit": 7.0}))).unwrap();
        assert_eq!(validated.i64("limit"), Some(7));
    }

    #[test]
    fn test_out_of_enum_rejected() {
        let err = validate(&descriptor(), &args(json!({"repo": "o/r", "state": "merged"}))).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("'state'"));
        assert!(msg.contains("open, closed, all"));
        assert!(msg.contains("merged"));
    }

    #[test]
    fn test_array_item_type_checked() {
        let err = validate(&descriptor(), &args(json!({"repo": "o/r", "labels": ["a", 1]}))).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Validation {
                rule: ValidationRule::WrongItemType { index: 1, .. },
                ..
            }
        ));
    }

    #[test]
    fn test_default_applied_only_when_absent() {
        let validated = validate(&descriptor(), &args(json!({"repo": "o/r"}))).unwrap();
        assert_eq!(validated.i64("limit"), Some(30));
        assert!(validated.get("state").is_none());
        assert!(!validated.flag("draft"));
    }

    #[test]
    fn test_undeclared_parameters_dropped() {
        let validated = validate(&descriptor(), &args(json!({"repo": "o/r", "extra": "x"}))).unwrap();
        assert!(validated.get("extra").is_none());
    }

    #[test]
    fn test_empty_string_reads_as_absent() {
        let validated = validate(&descriptor(), &args(json!({"repo": ""}))).unwrap();
        assert_eq!(validated.str("repo"), None);
        assert_eq!(validated.require_str("repo").unwrap(), "");
    }

    #[test]
    fn test_integer_outside_i64_rejected() {
        for huge in [json!(18446744073709551615u64), json!(1e20)] {
            let err = validate(&descriptor(), &args(json!({"repo": "o/r", "limit": huge}))).unwrap_err();
            assert!(
                matches!(
                    err,
                    BridgeError::Validation {
                        ref param,
                        rule: ValidationRule::BadFormat { expected: "a 64-bit integer", .. }
                    } if param == "limit"
                ),
                "{:?}",
                err
            );
        }
    }

    #[test]
    fn test_largest_i64_accepted() {
        let validated = validate(
            &descriptor(),
            &args(json!({"repo": "o/r", "limit": i64::MAX})),
        )
        .unwrap();
        assert_eq!(validated.require_i64("limit").unwrap(), i64::MAX);
    }

    #[test]
    fn test_integer_helper() {
        assert_eq!(integer("n", &json!(500.0)).unwrap(), 500);
        assert_eq!(
            integer("n", &json!(2.5)).unwrap_err(),
            BridgeError::validation("n", ValidationRule::NotInteger)
        );
        assert!(matches!(
            integer("n", &json!("5")).unwrap_err(),
            BridgeError::Validation { rule: ValidationRule::WrongType { found: "string", .. }, .. }
        ));
    }
}
