//! Resolution, coercion and validation of crew start inputs
//!
//! Each declared parameter takes the user's value, else its default. The
//! value is coerced to the declared type and checked against required-ness,
//! bounds and options. Every problem is collected so the caller can report
//! all offending parameters at once.

use std::collections::BTreeMap;

use cd_api_contract::InputParam;
use chrono::NaiveDate;
use serde_json::{Map, Number, Value};

use crate::error::InputIssue;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Declared type, as named by the backend's metadata discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Text,
    Integer,
    Float,
    Boolean,
    Date,
    List,
    Object,
    Other,
}

impl ParamKind {
    pub fn from_declared(declared: Option<&str>) -> Self {
        let Some(declared) = declared else {
            return ParamKind::Text;
        };
        match declared.trim().to_ascii_lowercase().as_str() {
            "" | "str" | "string" => ParamKind::Text,
            "int" | "integer" => ParamKind::Integer,
            "float" | "number" => ParamKind::Float,
            "bool" | "boolean" => ParamKind::Boolean,
            "date" => ParamKind::Date,
            "list" | "array" => ParamKind::List,
            "dict" | "object" => ParamKind::Object,
            _ => ParamKind::Other,
        }
    }
}

/// Null, blank string or empty array
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// String form used for option matching
fn string_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Coerce `value` to `kind`
pub fn coerce(value: &Value, kind: ParamKind) -> Result<Value, String> {
    match kind {
        ParamKind::Text => match value {
            Value::String(s) => Ok(Value::String(s.clone())),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            _ => Err("must be text".to_string()),
        },
        ParamKind::Integer => coerce_integer(value).ok_or_else(|| "must be an integer".to_string()),
        ParamKind::Float => as_f64(value)
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| "must be a number".to_string()),
        ParamKind::Boolean => coerce_bool(value).ok_or_else(|| "must be true or false".to_string()),
        ParamKind::Date => match value {
            Value::String(s) if parse_date(s).is_some() => Ok(Value::String(s.trim().to_string())),
            _ => Err("must be a date (YYYY-MM-DD)".to_string()),
        },
        ParamKind::List => match value {
            Value::Array(_) => Ok(value.clone()),
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.starts_with('[') {
                    match serde_json::from_str::<Value>(trimmed) {
                        Ok(parsed @ Value::Array(_)) => Ok(parsed),
                        _ => Err("must be a list".to_string()),
                    }
                } else {
                    Ok(Value::Array(
                        trimmed
                            .split(',')
                            .map(str::trim)
                            .filter(|item| !item.is_empty())
                            .map(|item| Value::String(item.to_string()))
                            .collect(),
                    ))
                }
            }
            _ => Err("must be a list".to_string()),
        },
        ParamKind::Object => match value {
            Value::Object(_) => Ok(value.clone()),
            Value::String(s) => match serde_json::from_str::<Value>(s.trim()) {
                Ok(parsed @ Value::Object(_)) => Ok(parsed),
                _ => Err("must be an object".to_string()),
            },
            _ => Err("must be an object".to_string()),
        },
        ParamKind::Other => Ok(value.clone()),
    }
}

/// 2^63; `i64::MAX as f64` rounds up to this, so the upper bound is exclusive
const I64_LIMIT: f64 = 9_223_372_036_854_775_808.0;

/// Whole floats inside the i64 range only; `as` would silently saturate
fn float_to_i64(f: f64) -> Option<i64> {
    let in_range = f.is_finite() && f >= -I64_LIMIT && f < I64_LIMIT;
    (in_range && f.fract() == 0.0).then_some(f as i64)
}

fn coerce_integer(value: &Value) -> Option<Value> {
    let n = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(float_to_i64))?,
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(float_to_i64))?
        }
        _ => return None,
    };
    Some(Value::from(n))
}

fn coerce_bool(value: &Value) -> Option<Value> {
    let b = match value {
        Value::Bool(b) => *b,
        Value::Number(n) => match n.as_i64() {
            Some(1) => true,
            Some(0) => false,
            _ => return None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => true,
            "false" | "no" | "off" | "0" => false,
            _ => return None,
        },
        _ => return None,
    };
    Some(Value::Bool(b))
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

fn check_bounds(value: &Value, kind: ParamKind, param: &InputParam) -> Option<String> {
    match kind {
        ParamKind::Integer | ParamKind::Float => {
            let n = as_f64(value)?;
            if let Some(min) = param.min.as_ref().and_then(as_f64) {
                if n < min {
                    return Some(format!("must be at least {}", string_form(param.min.as_ref()?)));
                }
            }
            if let Some(max) = param.max.as_ref().and_then(as_f64) {
                if n > max {
                    return Some(format!("must be at most {}", string_form(param.max.as_ref()?)));
                }
            }
            None
        }
        ParamKind::Date => {
            let date = value.as_str().and_then(parse_date)?;
            let bound = |b: &Option<Value>| b.as_ref().and_then(Value::as_str).and_then(parse_date);
            if let Some(min) = bound(&param.min) {
                if date < min {
                    return Some(format!("must be on or after {}", min.format(DATE_FORMAT)));
                }
            }
            if let Some(max) = bound(&param.max) {
                if date > max {
                    return Some(format!("must be on or before {}", max.format(DATE_FORMAT)));
                }
            }
            None
        }
        _ => None,
    }
}

fn check_options(value: &Value, param: &InputParam) -> Option<String> {
    let options = param.options.as_ref().filter(|o| !o.is_empty())?;
    let allowed: Vec<String> = options.iter().map(string_form).collect();
    let fits = |v: &Value| allowed.contains(&string_form(v));

    let ok = match value {
        Value::Array(items) => items.iter().all(fits),
        other => fits(other),
    };
    (!ok).then(|| format!("must be one of: {}", allowed.join(", ")))
}

/// Resolve the inputs to send with a start command
///
/// Optional parameters left empty are omitted. User values for names the
/// schema does not declare are forwarded unchanged.
pub fn resolve_inputs(
    schema: &BTreeMap<String, InputParam>,
    user: &Map<String, Value>,
) -> Result<Map<String, Value>, Vec<InputIssue>> {
    let mut resolved = Map::new();
    let mut issues = Vec::new();

    for (name, param) in schema {
        let raw = user
            .get(name)
            .filter(|v| !is_empty_value(v))
            .or_else(|| param.default.as_ref().filter(|v| !is_empty_value(v)));

        let Some(raw) = raw else {
            if param.required {
                issues.push(InputIssue::new(name, "is required"));
            }
            continue;
        };

        let kind = ParamKind::from_declared(param.param_type.as_deref());
        let value = match coerce(raw, kind) {
            Ok(value) => value,
            Err(message) => {
                issues.push(InputIssue::new(name, message));
                continue;
            }
        };

        if is_empty_value(&value) {
            if param.required {
                issues.push(InputIssue::new(name, "is required"));
            }
            continue;
        }
        if let Some(message) = check_bounds(&value, kind, param) {
            issues.push(InputIssue::new(name, message));
            continue;
        }
        if let Some(message) = check_options(&value, param) {
            issues.push(InputIssue::new(name, message));
            continue;
        }

        resolved.insert(name.clone(), value);
    }

    for (name, value) in user {
        if !schema.contains_key(name) {
            resolved.insert(name.clone(), value.clone());
        }
    }

    if issues.is_empty() {
        Ok(resolved)
    } else {
        Err(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn param(kind: &str, required: bool) -> InputParam {
        InputParam {
            param_type: Some(kind.into()),
            required,
            ..Default::default()
        }
    }

    fn user(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_required_text_resolved() {
        let schema = BTreeMap::from([("topic".to_string(), param("str", true))]);
        let inputs = resolve_inputs(&schema, &user(json!({"topic": "AI"}))).unwrap();
        assert_eq!(Value::Object(inputs), json!({"topic": "AI"}));
    }

    #[test]
    fn test_every_offending_parameter_reported() {
        let schema = BTreeMap::from([
            ("topic".to_string(), param("str", true)),
            (
                "count".to_string(),
                InputParam {
                    min: Some(json!(1)),
                    ..param("int", false)
                },
            ),
            ("when".to_string(), param("date", false)),
        ]);
        let issues = resolve_inputs(
            &schema,
            &user(json!({"topic": "  ", "count": "0", "when": "tomorrow"})),
        )
        .unwrap_err();

        let names: Vec<_> = issues.iter().map(|i| i.parameter.as_str()).collect();
        assert_eq!(names, vec!["count", "topic", "when"]);
        assert_eq!(issues[0].message, "must be at least 1");
    }

    #[test]
    fn test_defaults_and_omitted_optionals() {
        let schema = BTreeMap::from([
            (
                "depth".to_string(),
                InputParam {
                    default: Some(json!("3")),
                    ..param("int", true)
                },
            ),
            ("notes".to_string(), param("str", false)),
        ]);
        let inputs = resolve_inputs(&schema, &Map::new()).unwrap();
        assert_eq!(Value::Object(inputs), json!({"depth": 3}));
    }

    #[test]
    fn test_coercions() {
        assert_eq!(coerce(&json!("4.0"), ParamKind::Integer), Ok(json!(4)));
        assert!(coerce(&json!("4.5"), ParamKind::Integer).is_err());
        assert_eq!(coerce(&json!("2.5"), ParamKind::Float), Ok(json!(2.5)));
        assert_eq!(coerce(&json!("yes"), ParamKind::Boolean), Ok(json!(true)));
        assert_eq!(coerce(&json!("off"), ParamKind::Boolean), Ok(json!(false)));
        assert_eq!(coerce(&json!(7), ParamKind::Text), Ok(json!("7")));
        assert_eq!(coerce(&json!("a, b,,c"), ParamKind::List), Ok(json!(["a", "b", "c"])));
        assert_eq!(coerce(&json!("[1, 2]"), ParamKind::List), Ok(json!([1, 2])));
        assert_eq!(coerce(&json!(r#"{"k": 1}"#), ParamKind::Object), Ok(json!({"k": 1})));
        assert!(coerce(&json!("2025-02-30"), ParamKind::Date).is_err());
    }

    #[test]
    fn test_integer_coercion_rejects_out_of_range_floats() {
        for raw in [json!("1e30"), json!(1e30), json!("-1e19"), json!("inf"), json!("NaN")] {
            assert!(
                coerce(&raw, ParamKind::Integer).is_err(),
                "{raw} should not coerce to an integer"
            );
        }
        assert_eq!(
            coerce(&json!("1e18"), ParamKind::Integer),
            Ok(json!(1_000_000_000_000_000_000i64))
        );
        assert_eq!(coerce(&json!(-4.0), ParamKind::Integer), Ok(json!(-4)));
        assert_eq!(float_to_i64(-I64_LIMIT), Some(i64::MIN));
        assert_eq!(float_to_i64(I64_LIMIT), None);
    }

    #[test]
    fn test_date_bounds() {
        let schema = BTreeMap::from([(
            "since".to_string(),
            InputParam {
                min: Some(json!("2025-01-01")),
                max: Some(json!("2025-12-31")),
                ..param("date", true)
            },
        )]);
        assert!(resolve_inputs(&schema, &user(json!({"since": "2025-06-01"}))).is_ok());
        let issues = resolve_inputs(&schema, &user(json!({"since": "2024-12-31"}))).unwrap_err();
        assert_eq!(issues[0].message, "must be on or after 2025-01-01");
    }

    #[test]
    fn test_options_constrain_by_string_form() {
        let schema = BTreeMap::from([(
            "tone".to_string(),
            InputParam {
                options: Some(vec![json!("formal"), json!("casual")]),
                ..param("str", true)
            },
        )]);
        assert!(resolve_inputs(&schema, &user(json!({"tone": "casual"}))).is_ok());
        assert!(resolve_inputs(&schema, &user(json!({"tone": "rude"}))).is_err());
    }

    #[test]
    fn test_unknown_inputs_forwarded() {
        let schema = BTreeMap::new();
        let inputs = resolve_inputs(&schema, &user(json!({"extra": [1]}))).unwrap();
        assert_eq!(Value::Object(inputs), json!({"extra": [1]}));
    }
}
