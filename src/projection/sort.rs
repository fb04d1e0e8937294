//! Client-side sorting for `--sort-by` and projection `:sort=N` attributes

use super::key::Key;
use crate::error::{CliError, Result};
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub key: Key,
    pub descending: bool,
}

/// Parse `--sort-by=~creationTimestamp,name`; `~` reverses a key
pub fn parse_sort_by(spec: &str) -> Result<Vec<SortKey>> {
    spec.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|field| {
            let (descending, field) = match field.strip_prefix('~') {
                Some(rest) => (true, rest),
                None => (false, field),
            };
            let key = Key::parse(field)
                .map_err(|e| CliError::usage(format!("Invalid --sort-by key [{field}]: {e}")))?;
            Ok(SortKey { key, descending })
        })
        .collect()
}

/// Stable multi-key sort of resources
pub fn sort_resources(resources: &mut [Value], keys: &[SortKey]) {
    if keys.is_empty() {
        return;
    }
    resources.sort_by(|a, b| {
        for sk in keys {
            let ord = compare_values(&sk.key.get(a), &sk.key.get(b));
            let ord = if sk.descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values; missing values sort first
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => {
            // int64 fields arrive as strings
            match (x.parse::<f64>(), y.parse::<f64>()) {
                (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                _ => x.cmp(y),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(_), Value::Object(_)) => a.to_string().cmp(&b.to_string()),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_sort_by() {
        let keys = parse_sort_by("~creationTimestamp, name").unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys[0].descending);
        assert_eq!(keys[1].key.to_string(), "name");
        assert!(parse_sort_by("a[x]").is_err());
    }

    #[test]
    fn test_sort_is_stable_multi_key() {
        let mut items = vec![
            json!({"zone": "b", "name": "x", "n": 1}),
            json!({"zone": "a", "name": "y", "n": 2}),
            json!({"zone": "b", "name": "w", "n": 3}),
            json!({"zone": "a", "name": "y", "n": 4}),
        ];
        sort_resources(&mut items, &parse_sort_by("zone,~name").unwrap());
        let order: Vec<i64> = items.iter().map(|i| i["n"].as_i64().unwrap()).collect();
        assert_eq!(order, vec![2, 4, 1, 3]);
    }

    #[test]
    fn test_numeric_strings_compare_numerically() {
        assert_eq!(compare_values(&json!("10"), &json!("9")), Ordering::Greater);
        assert_eq!(compare_values(&json!(null), &json!("a")), Ordering::Less);
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
    }
}
