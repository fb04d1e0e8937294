//! Message binder
//!
//! Maps parsed argument values onto fields of a typed request message,
//! coercing by the declared field type.

use super::message::{ApiMessage, FieldSchema, FieldType, Message};
use crate::error::{CliError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A parsed argument value, before coercion
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<String>),
    /// `KEY=VALUE` pairs; iteration order is key order
    Map(BTreeMap<String, String>),
}

impl ArgValue {
    fn describe(&self) -> String {
        match self {
            ArgValue::Str(s) => s.clone(),
            ArgValue::Int(i) => i.to_string(),
            ArgValue::Float(f) => f.to_string(),
            ArgValue::Bool(b) => b.to_string(),
            ArgValue::List(items) => items.join(","),
            ArgValue::Map(map) => map
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

/// One argument-to-field assignment
#[derive(Debug, Clone)]
pub struct Binding {
    /// Argument name used in error messages, e.g. `--boot-disk-size`
    pub arg: String,
    /// Dotted field path in the request message
    pub field: String,
    pub value: ArgValue,
}

impl Binding {
    pub fn new(arg: &str, field: &str, value: ArgValue) -> Self {
        Self {
            arg: arg.to_string(),
            field: field.to_string(),
            value,
        }
    }
}

/// Apply every binding in order; absent arguments are simply not listed
pub fn bind(message: &mut Message, bindings: &[Binding]) -> Result<()> {
    for binding in bindings {
        bind_one(message, binding)?;
    }
    Ok(())
}

pub fn bind_one(message: &mut Message, binding: &Binding) -> Result<()> {
    let field = message
        .schemas()
        .field_at(message.type_name(), &binding.field)
        .map_err(|_| {
            CliError::bind(
                &binding.arg,
                format!("[{}] is not a field of the request", binding.field),
            )
        })?
        .clone();

    let value = coerce_field(&field, &binding.value)
        .map_err(|reason| CliError::bind(&binding.arg, reason))?;
    tracing::debug!("Bound {} -> {}", binding.arg, binding.field);
    message.set_path(&binding.field, value)
}

/// Coerce a value for `field`, honoring repetition
pub fn coerce_field(field: &FieldSchema, value: &ArgValue) -> std::result::Result<Value, String> {
    if !field.repeated {
        if let ArgValue::List(items) = value {
            if items.len() != 1 {
                return Err(format!("expected a single value, got [{}]", value.describe()));
            }
            return coerce_scalar(field, &items[0]);
        }
        return coerce_single(field, value);
    }

    let items: Vec<String> = match value {
        ArgValue::List(items) => items.clone(),
        ArgValue::Str(s) => split_list(s),
        other => vec![other.describe()],
    };
    items
        .iter()
        .map(|item| coerce_scalar(field, item))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map(Value::Array)
}

/// Split a comma-separated list, dropping empty items
pub fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn coerce_single(field: &FieldSchema, value: &ArgValue) -> std::result::Result<Value, String> {
    match (field.field_type, value) {
        (FieldType::Map, ArgValue::Map(map)) => Ok(label_map(map)),
        (FieldType::Map, ArgValue::Str(s)) => Ok(label_map(&parse_key_values(s)?)),
        (FieldType::Message, ArgValue::Map(map)) => Ok(Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )),
        (FieldType::Message, _) => Err("expected KEY=VALUE pairs".to_string()),
        (FieldType::Bool, ArgValue::Bool(b)) => Ok(Value::Bool(*b)),
        (FieldType::Int32 | FieldType::Int64, ArgValue::Int(i)) => int_value(field, *i),
        (FieldType::Float, ArgValue::Float(f)) => float_value(*f),
        (FieldType::Float, ArgValue::Int(i)) => float_value(*i as f64),
        (FieldType::Duration, ArgValue::Int(i)) if *i >= 0 => Ok(Value::String(format!("{i}s"))),
        (_, ArgValue::Map(_)) => Err("expected a single value, not KEY=VALUE pairs".to_string()),
        (_, other) => coerce_scalar(field, &other.describe()),
    }
}

fn coerce_scalar(field: &FieldSchema, raw: &str) -> std::result::Result<Value, String> {
    match field.field_type {
        FieldType::String => Ok(Value::String(raw.to_string())),
        FieldType::Int32 | FieldType::Int64 => {
            let parsed: i64 = raw
                .trim()
                .parse()
                .map_err(|_| format!("[{raw}] is not an integer"))?;
            int_value(field, parsed)
        }
        FieldType::Float => {
            let parsed: f64 = raw
                .trim()
                .parse()
                .map_err(|_| format!("[{raw}] is not a number"))?;
            float_value(parsed)
        }
        FieldType::Bool => match raw.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(Value::Bool(true)),
            "false" | "no" | "0" => Ok(Value::Bool(false)),
            _ => Err(format!("[{raw}] is not a boolean")),
        },
        FieldType::Duration => parse_duration(raw)
            .map(|secs| Value::String(format!("{secs}s")))
            .ok_or_else(|| format!("[{raw}] is not a valid duration")),
        FieldType::Enum => enum_value(field, raw),
        FieldType::Map => Ok(label_map(&parse_key_values(raw)?)),
        FieldType::Message => Err("expected KEY=VALUE pairs".to_string()),
    }
}

fn int_value(field: &FieldSchema, value: i64) -> std::result::Result<Value, String> {
    let below = field.min.is_some_and(|min| value < min);
    let above = field.max.is_some_and(|max| value > max);
    if below || above {
        return Err(format!(
            "value [{}] exceeds bounded range [{}, {}]",
            value,
            field.min.map(|m| m.to_string()).unwrap_or_else(|| "-inf".into()),
            field.max.map(|m| m.to_string()).unwrap_or_else(|| "inf".into()),
        ));
    }
    match field.field_type {
        FieldType::Int32 => {
            if i32::try_from(value).is_err() {
                return Err(format!("value [{value}] exceeds bounded range of a 32-bit integer"));
            }
            Ok(Value::from(value))
        }
        _ => Ok(Value::String(value.to_string())),
    }
}

fn float_value(value: f64) -> std::result::Result<Value, String> {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| format!("[{value}] is not a finite number"))
}

/// Case-insensitive enum match; dashes stand for underscores
fn enum_value(field: &FieldSchema, raw: &str) -> std::result::Result<Value, String> {
    let wanted = raw.trim().replace('-', "_").to_uppercase();
    field
        .enum_values
        .iter()
        .find(|name| name.to_uppercase() == wanted)
        .map(|name| Value::String(name.clone()))
        .ok_or_else(|| {
            let choices: Vec<String> = field
                .enum_values
                .iter()
                .map(|v| v.to_lowercase().replace('_', "-"))
                .collect();
            format!(
                "[{}] is not a valid enum value; must be one of [{}]",
                raw,
                choices.join(", ")
            )
        })
}

fn label_map(map: &BTreeMap<String, String>) -> Value {
    let object: Map<String, Value> = map
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    Value::Object(object)
}

/// Parse `k1=v1,k2=v2`; a bare key maps to an empty value
pub fn parse_key_values(raw: &str) -> std::result::Result<BTreeMap<String, String>, String> {
    let mut out = BTreeMap::new();
    for item in split_list(raw) {
        let (key, value) = item.split_once('=').unwrap_or((item.as_str(), ""));
        if key.is_empty() {
            return Err(format!("[{item}] has an empty key"));
        }
        out.insert(key.to_string(), value.to_string());
    }
    Ok(out)
}

/// Parse `90`, `90s`, `5m`, `2h`, `1d` or combinations like `1h30m` into seconds
pub fn parse_duration(raw: &str) -> Option<u64> {
    let raw = raw.trim().to_lowercase();
    if raw.is_empty() {
        return None;
    }
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(secs);
    }
    let mut total: u64 = 0;
    let mut number = String::new();
    for c in raw.chars() {
        if c.is_ascii_digit() {
            number.push(c);
            continue;
        }
        let n: u64 = number.parse().ok()?;
        number.clear();
        let unit = match c {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            'd' => 86_400,
            _ => return None,
        };
        total = total.checked_add(n.checked_mul(unit)?)?;
    }
    number.is_empty().then_some(total)
}
