//! Projection transforms
//!
//! Each transform maps a key's value (and optionally the whole resource) to a
//! new value. Bad arguments or unusable input yield the `undefined` argument,
//! which defaults to the empty string; transforms never fail a listing.

use super::key::Key;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct TransformArg {
    pub name: Option<String>,
    pub value: String,
}

/// One `.name(args)` call in a key's transform chain
#[derive(Debug, Clone, PartialEq)]
pub struct TransformCall {
    pub name: String,
    pub args: Vec<TransformArg>,
}

impl TransformCall {
    pub fn new(name: &str, args: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            args: args
                .iter()
                .map(|a| TransformArg {
                    name: None,
                    value: a.to_string(),
                })
                .collect(),
        }
    }

    pub fn positional(&self) -> Vec<&str> {
        self.args
            .iter()
            .filter(|a| a.name.is_none())
            .map(|a| a.value.as_str())
            .collect()
    }

    /// Argument by keyword, or by its position when not given by keyword
    pub fn arg(&self, name: &str, position: usize) -> Option<&str> {
        self.args
            .iter()
            .find(|a| a.name.as_deref() == Some(name))
            .map(|a| a.value.as_str())
            .or_else(|| self.positional().get(position).copied())
    }

    fn undefined(&self, position: usize) -> Value {
        Value::String(self.arg("undefined", position).unwrap_or_default().to_string())
    }
}

const KNOWN: &[&str] = &[
    "basename", "color", "date", "duration", "firstof", "float", "format", "join", "len", "list",
    "lower", "map", "notnull", "scope", "segment", "size", "slice", "sort", "split", "upper",
    "uri", "yesno",
];

pub fn is_known(name: &str) -> bool {
    KNOWN.contains(&name)
}

/// Apply a chain left to right; `map()` applies the rest of the chain per element
pub fn apply_chain(calls: &[TransformCall], value: Value, resource: &Value) -> Value {
    let mut value = value;
    for (i, call) in calls.iter().enumerate() {
        if call.name == "map" {
            let rest = &calls[i + 1..];
            return match value {
                Value::Array(items) => Value::Array(
                    items
                        .into_iter()
                        .map(|item| apply_chain(rest, item, resource))
                        .collect(),
                ),
                other => apply_chain(rest, other, resource),
            };
        }
        value = apply(call, &value, resource);
    }
    value
}

pub fn apply(call: &TransformCall, value: &Value, resource: &Value) -> Value {
    match call.name.as_str() {
        "basename" => basename(call, value),
        "color" => value.clone(),
        "date" => date(call, value),
        "duration" => duration(call, value, resource),
        "firstof" => firstof(call, resource),
        "float" => float(call, value),
        "format" => format(call, value),
        "join" => join(call, value),
        "len" => len(value),
        "list" => list(call, value),
        "lower" => map_str(value, |s| s.to_lowercase()),
        "upper" => map_str(value, |s| s.to_uppercase()),
        "notnull" => notnull(value),
        "scope" => scope(call, value),
        "segment" => segment(call, value),
        "size" => size(call, value),
        "slice" => slice(call, value),
        "sort" => sort(call, value),
        "split" => split(call, value),
        "uri" => uri(call, value, resource),
        "yesno" => yesno(call, value),
        _ => Value::Null,
    }
}

/// Plain text of a scalar; containers render as compact JSON
pub fn text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn map_str(value: &Value, f: impl Fn(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(f(s)),
        other => other.clone(),
    }
}

fn basename(call: &TransformCall, value: &Value) -> Value {
    match value.as_str() {
        Some(s) if !s.is_empty() => {
            let trimmed = s.trim_end_matches(['/', '\\']);
            let base = trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed);
            Value::String(base.to_string())
        }
        _ => call.undefined(0),
    }
}

fn segment(call: &TransformCall, value: &Value) -> Value {
    let Some(s) = value.as_str().filter(|s| !s.is_empty()) else {
        return call.undefined(1);
    };
    let index = call
        .arg("index", 0)
        .and_then(|i| i.parse::<i64>().ok())
        .unwrap_or(-1);
    let parts: Vec<&str> = s.split('/').collect();
    let len = parts.len() as i64;
    let idx = if index < 0 { len + index } else { index };
    if idx < 0 || idx >= len {
        return call.undefined(1);
    }
    Value::String(parts[idx as usize].to_string())
}

/// Scope name of a URL: the part after `/zones/` or `/regions/`
fn scope(call: &TransformCall, value: &Value) -> Value {
    let Some(s) = value.as_str().filter(|s| !s.is_empty()) else {
        return Value::String(String::new());
    };
    let wanted: Vec<String> = match call.positional() {
        p if p.is_empty() => vec!["zones".into(), "regions".into()],
        p => p.iter().map(|c| format!("{}s", c.trim_end_matches('s'))).collect(),
    };
    for collection in wanted {
        let marker = format!("/{collection}/");
        if let Some(pos) = s.find(&marker) {
            let rest = &s[pos + marker.len()..];
            return Value::String(rest.split('/').next().unwrap_or(rest).to_string());
        }
    }
    basename(&TransformCall::new("basename", &[]), value)
}

fn uri(call: &TransformCall, value: &Value, resource: &Value) -> Value {
    for candidate in [value, resource] {
        for field in ["selfLink", "SelfLink"] {
            if let Some(link) = candidate.get(field).and_then(|l| l.as_str()) {
                return Value::String(link.to_string());
            }
        }
    }
    match value.as_str() {
        Some(s) if s.starts_with("http") => Value::String(s.to_string()),
        _ => call.undefined(0),
    }
}

fn firstof(call: &TransformCall, resource: &Value) -> Value {
    for name in call.positional() {
        let Ok(key) = Key::parse(name) else {
            continue;
        };
        let v = key.get(resource);
        if !is_empty(&v) {
            return v;
        }
    }
    Value::String(String::new())
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn format(call: &TransformCall, value: &Value) -> Value {
    let positional = call.positional();
    let Some(template) = positional.first() else {
        return Value::String(text(value));
    };
    let args: Vec<String> = if positional.len() > 1 {
        positional[1..]
            .iter()
            .map(|k| Key::parse(k).map(|key| text(&key.get(value))).unwrap_or_default())
            .collect()
    } else {
        // With no keys `{0}` is the value itself, first element for lists
        let v = match value {
            Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
            other => other.clone(),
        };
        vec![text(&v)]
    };

    let mut out = String::new();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '{' {
            out.push(c);
            continue;
        }
        let mut index = String::new();
        let mut closed = false;
        for d in chars.by_ref() {
            if d == '}' {
                closed = true;
                break;
            }
            index.push(d);
        }
        match index.parse::<usize>() {
            Ok(i) if closed => out.push_str(args.get(i).map(String::as_str).unwrap_or_default()),
            _ => {
                out.push('{');
                out.push_str(&index);
                if closed {
                    out.push('}');
                }
            }
        }
    }
    Value::String(out)
}

fn join(call: &TransformCall, value: &Value) -> Value {
    let sep = call.arg("sep", 0).unwrap_or("/");
    let parts: Vec<String> = match value {
        Value::Array(items) => items.iter().map(text).collect(),
        Value::String(s) => s.chars().map(String::from).collect(),
        _ => return call.undefined(1),
    };
    if parts.is_empty() {
        return call.undefined(1);
    }
    Value::String(parts.join(sep))
}

fn len(value: &Value) -> Value {
    let n = match value {
        Value::Array(a) => a.len(),
        Value::Object(o) => o.len(),
        Value::String(s) => s.chars().count(),
        _ => 0,
    };
    Value::from(n)
}

fn list(call: &TransformCall, value: &Value) -> Value {
    let show = call.arg("show", 0).unwrap_or_default();
    let separator = call.arg("separator", 2).unwrap_or(",");
    let parts: Vec<String> = match value {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| match show {
                "keys" => k.clone(),
                "values" => text(v),
                _ => format!("{k}={}", text(v)),
            })
            .collect(),
        Value::Array(items) => items.iter().map(text).collect(),
        Value::Null => Vec::new(),
        other => return other.clone(),
    };
    if parts.is_empty() {
        return call.undefined(1);
    }
    Value::String(parts.join(separator))
}

fn notnull(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().filter(|v| !v.is_null()).cloned().collect()),
        _ => Value::Array(Vec::new()),
    }
}

fn split(call: &TransformCall, value: &Value) -> Value {
    let sep = call.arg("sep", 0).unwrap_or(",");
    match value.as_str() {
        Some(s) if !s.is_empty() => Value::Array(
            s.split(sep)
                .map(|p| Value::String(p.to_string()))
                .collect(),
        ),
        _ => call.undefined(1),
    }
}

fn sort(call: &TransformCall, value: &Value) -> Value {
    let Value::Array(items) = value else {
        return value.clone();
    };
    let key = call.arg("attr", 0).and_then(|k| Key::parse(k).ok());
    let mut items = items.clone();
    items.sort_by(|a, b| match &key {
        Some(key) => super::sort::compare_values(&key.get(a), &key.get(b)),
        None => super::sort::compare_values(a, b),
    });
    Value::Array(items)
}

/// Python-style `start:stop:step` over lists and strings
fn slice(call: &TransformCall, value: &Value) -> Value {
    let spec = call.arg("op", 0).unwrap_or(":");
    let items: Vec<Value> = match value {
        Value::Array(items) => items.clone(),
        Value::String(s) => s.chars().map(|c| Value::String(c.to_string())).collect(),
        _ => return Value::String(String::new()),
    };

    let parts: Vec<&str> = spec.split(':').collect();
    let parse = |s: Option<&&str>| -> std::result::Result<Option<i64>, ()> {
        match s.map(|s| s.trim()) {
            None | Some("") => Ok(None),
            Some(n) => n.parse().map(Some).map_err(|_| ()),
        }
    };
    let (Ok(start), Ok(stop), Ok(step)) = (
        parse(parts.first()),
        parse(parts.get(1)),
        parse(parts.get(2)),
    ) else {
        return Value::String(String::new());
    };
    if parts.len() > 3 || step == Some(0) {
        return Value::String(String::new());
    }

    let len = items.len() as i64;
    let step = step.unwrap_or(1);
    let selected: Vec<Value> = if parts.len() == 1 {
        // A bare index selects a single element
        let Some(i) = start else {
            return Value::String(String::new());
        };
        let idx = if i < 0 { len + i } else { i };
        if idx < 0 || idx >= len {
            return Value::String(String::new());
        }
        vec![items[idx as usize].clone()]
    } else {
        let clamp = |i: i64, lo: i64, hi: i64| -> i64 {
            let i = if i < 0 { i + len } else { i };
            i.clamp(lo, hi)
        };
        let mut out = Vec::new();
        if step > 0 {
            let mut i = start.map_or(0, |s| clamp(s, 0, len));
            let end = stop.map_or(len, |s| clamp(s, 0, len));
            while i < end {
                out.push(items[i as usize].clone());
                i += step;
            }
        } else {
            let mut i = start.map_or(len - 1, |s| clamp(s, -1, len - 1));
            let end = stop.map_or(-1, |s| clamp(s, -1, len - 1));
            while i > end {
                out.push(items[i as usize].clone());
                i += step;
            }
        }
        out
    };

    if value.is_string() {
        Value::String(selected.iter().map(text).collect())
    } else {
        Value::Array(selected)
    }
}

fn yesno(call: &TransformCall, value: &Value) -> Value {
    let truthy = !is_empty(value) && *value != Value::Bool(false);
    let (yes, no) = (call.arg("yes", 0), call.arg("no", 1));
    Value::String(match (truthy, yes, no) {
        (true, Some(y), _) => y.to_string(),
        (true, None, _) => text(value),
        (false, _, Some(n)) => n.to_string(),
        (false, _, None) => "No".to_string(),
    })
}

/// `%g`-style rendering with `precision` significant digits
fn float(call: &TransformCall, value: &Value) -> Value {
    let Some(f) = as_f64(value) else {
        return match value {
            Value::Null => call.undefined(2),
            other => Value::String(text(other)),
        };
    };
    let precision = call
        .arg("precision", 0)
        .and_then(|p| p.parse::<usize>().ok())
        .unwrap_or(6)
        .max(1);
    Value::String(format_significant(f, precision))
}

fn format_significant(f: f64, precision: usize) -> String {
    if f == 0.0 {
        return "0.0".to_string();
    }
    let exponent = f.abs().log10().floor() as i32;
    if exponent < -4 || exponent >= precision as i32 {
        let mantissa = format!("{:.*e}", precision - 1, f);
        let (m, e) = mantissa.split_once('e').unwrap_or((mantissa.as_str(), "0"));
        let m = trim_fraction(m);
        let e: i32 = e.parse().unwrap_or(0);
        let sign = if e < 0 { "-" } else { "+" };
        return format!("{}e{}{:02}", m.trim_end_matches(".0"), sign, e.abs());
    }
    let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
    let s = trim_fraction(&format!("{:.*}", decimals, f));
    if s.contains('.') {
        s
    } else {
        format!("{s}.0")
    }
}

fn trim_fraction(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    let t = s.trim_end_matches('0');
    if t.ends_with('.') {
        format!("{t}0")
    } else {
        t.to_string()
    }
}

const SIZE_UNITS: &[&str] = &["KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

fn unit_scale(unit: &str) -> Option<f64> {
    let unit = unit.trim().to_ascii_uppercase();
    let unit = unit.trim_end_matches("IB").trim_end_matches('B');
    let power = match unit {
        "" => 0,
        "K" => 1,
        "M" => 2,
        "G" => 3,
        "T" => 4,
        "P" => 5,
        "E" => 6,
        _ => return None,
    };
    Some(1024f64.powi(power))
}

/// Human readable binary size, `zero` for zero or missing
fn size(call: &TransformCall, value: &Value) -> Value {
    let zero = call.arg("zero", 0).unwrap_or("0");
    let precision = call
        .arg("precision", 1)
        .and_then(|p| p.parse::<usize>().ok())
        .unwrap_or(1);
    let units_in = call.arg("units_in", 2).and_then(unit_scale).unwrap_or(1.0);

    let Some(amount) = as_f64(value) else {
        return Value::String(zero.to_string());
    };
    let mut bytes = amount * units_in;
    if bytes == 0.0 {
        return Value::String(zero.to_string());
    }
    if let Some(out) = call.arg("units_out", 3).and_then(|u| unit_scale(u).map(|s| (u, s))) {
        let (unit, scale) = out;
        return Value::String(format!("{:.*} {}", precision, bytes / scale, unit));
    }
    if bytes.abs() < 1024.0 {
        return Value::String(format!("{} bytes", bytes as i64));
    }
    let mut unit = SIZE_UNITS[0];
    for candidate in SIZE_UNITS {
        bytes /= 1024.0;
        unit = candidate;
        if bytes.abs() < 1024.0 {
            break;
        }
    }
    Value::String(format!("{:.*} {}", precision, bytes, unit))
}

/// Parse RFC 3339 and the offset-less forms APIs return
pub fn parse_datetime(s: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive).fixed_offset());
        }
    }
    None
}

fn date(call: &TransformCall, value: &Value) -> Value {
    let fmt = call
        .arg("format", 0)
        .unwrap_or("%Y-%m-%dT%H:%M:%S")
        .replace("%f", "%6f");
    let unit = call
        .arg("unit", 1)
        .and_then(|u| u.parse::<f64>().ok())
        .unwrap_or(1.0);

    let parsed = match value {
        Value::Number(n) => n.as_f64().and_then(|secs| {
            let secs = secs / unit;
            let whole = secs.floor();
            let nanos = ((secs - whole) * 1e9) as u32;
            DateTime::from_timestamp(whole as i64, nanos).map(|d| d.fixed_offset())
        }),
        Value::String(s) => parse_datetime(s),
        _ => None,
    };
    let Some(mut dt) = parsed else {
        return call.undefined(2);
    };
    if call.arg("tz", 3).is_some_and(|tz| tz.eq_ignore_ascii_case("UTC")) {
        dt = dt.with_timezone(&Utc).fixed_offset();
    }
    Value::String(dt.format(&fmt).to_string())
}

const DAY: f64 = 86_400.0;
const YEAR: f64 = 365.0 * DAY;

/// ISO 8601 duration of a number of seconds
pub fn iso_duration(seconds: f64, parts: usize, precision: usize, calendar: bool) -> String {
    let negative = seconds < 0.0;
    let mut rest = seconds.abs();
    let mut date_parts = Vec::new();
    let mut time_parts = Vec::new();

    if calendar {
        let years = (rest / YEAR).floor();
        rest -= years * YEAR;
        if years > 0.0 {
            date_parts.push(format!("{}Y", years as u64));
        }
        let days = (rest / DAY).floor();
        rest -= days * DAY;
        if days > 0.0 {
            date_parts.push(format!("{}D", days as u64));
        }
    }
    let hours = (rest / 3600.0).floor();
    rest -= hours * 3600.0;
    if hours > 0.0 {
        time_parts.push(format!("{}H", hours as u64));
    }
    let minutes = (rest / 60.0).floor();
    rest -= minutes * 60.0;
    if minutes > 0.0 {
        time_parts.push(format!("{}M", minutes as u64));
    }
    let secs = trim_fraction(&format!("{:.*}", precision, rest));
    let secs = secs.trim_end_matches(".0").to_string();
    if secs != "0" {
        time_parts.push(format!("{secs}S"));
    }

    // Keep only the `parts` most significant components
    let total = date_parts.len() + time_parts.len();
    if total > parts {
        let mut drop = total - parts;
        while drop > 0 && !time_parts.is_empty() {
            time_parts.pop();
            drop -= 1;
        }
        date_parts.truncate(date_parts.len() - drop.min(date_parts.len()));
    }

    let mut out = String::from(if negative { "-P" } else { "P" });
    if date_parts.is_empty() && time_parts.is_empty() {
        out.push('0');
        return out;
    }
    out.push_str(&date_parts.concat());
    if !time_parts.is_empty() {
        out.push('T');
        out.push_str(&time_parts.concat());
    }
    out
}

/// Parse `"66s"`, `"1.5"` or a number into seconds
pub fn seconds_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('s').parse().ok(),
        _ => None,
    }
}

fn duration(call: &TransformCall, value: &Value, resource: &Value) -> Value {
    let undefined = call.arg("undefined", 6).unwrap_or_default();
    let number = |name: &str, pos: usize, default: usize| -> Option<usize> {
        match call.arg(name, pos) {
            None => Some(default),
            Some(s) => s.parse::<usize>().ok(),
        }
    };
    let (Some(parts), Some(precision)) = (number("parts", 2, 3), number("precision", 3, 3)) else {
        return Value::String(undefined.to_string());
    };
    let calendar = call
        .arg("calendar", 4)
        .map_or(true, |c| !c.eq_ignore_ascii_case("false"));
    let unit = call
        .arg("unit", 5)
        .and_then(|u| u.parse::<f64>().ok())
        .unwrap_or(1.0);

    let start = call.arg("start", 0).filter(|s| !s.is_empty());
    let end = call.arg("end", 1).filter(|s| !s.is_empty());
    let time_at = |key: &str| -> Option<DateTime<FixedOffset>> {
        let v = Key::parse(key).ok()?.get(resource);
        parse_datetime(v.as_str()?)
    };

    let seconds = if start.is_some() || end.is_some() {
        let now = Utc::now().fixed_offset();
        let begin = match start {
            Some(k) => time_at(k),
            None => Some(now),
        };
        let finish = match end {
            Some(k) => time_at(k),
            None => Some(now),
        };
        let (Some(begin), Some(finish)) = (begin, finish) else {
            return Value::String(undefined.to_string());
        };
        (finish - begin).num_microseconds().map(|us| us as f64 / 1e6)
    } else if let Some(s) = value.as_str().filter(|s| s.starts_with('P') || s.starts_with("-P")) {
        return Value::String(s.to_string());
    } else if let Some(dt) = value.as_str().and_then(parse_datetime) {
        (Utc::now().fixed_offset() - dt)
            .num_microseconds()
            .map(|us| us as f64 / 1e6)
    } else {
        seconds_of(value).map(|s| s / unit)
    };

    match seconds {
        Some(s) if s.is_finite() && s.abs() < 1e11 => {
            Value::String(iso_duration(s, parts.max(1), precision, calendar))
        }
        _ => Value::String(undefined.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(name: &str, args: &[&str], value: Value) -> Value {
        apply(&TransformCall::new(name, args), &value, &json!({}))
    }

    fn run_kw(name: &str, kwargs: &[(&str, &str)], value: Value) -> Value {
        let call = TransformCall {
            name: name.to_string(),
            args: kwargs
                .iter()
                .map(|(k, v)| TransformArg {
                    name: Some(k.to_string()),
                    value: v.to_string(),
                })
                .collect(),
        };
        apply(&call, &value, &json!({}))
    }

    #[test]
    fn test_duration_defaults() {
        assert_eq!(run("duration", &[], json!(66)), json!("PT1M6S"));
        assert_eq!(run("duration", &[], json!(600)), json!("PT10M"));
        assert_eq!(run("duration", &[], json!(86400)), json!("P1D"));
        assert_eq!(run("duration", &[], json!(28 * 86400)), json!("P28D"));
        assert_eq!(run("duration", &[], json!("PT28M")), json!("PT28M"));
        assert_eq!(run("duration", &[], json!("not a float")), json!(""));
        assert_eq!(run("duration", &[], json!(0)), json!("P0"));
    }

    #[test]
    fn test_duration_exact_hours() {
        assert_eq!(run_kw("duration", &[("calendar", "false")], json!(86400)), json!("PT24H"));
        assert_eq!(run_kw("duration", &[("calendar", "false")], json!(28 * 86400)), json!("PT672H"));
        assert_eq!(run_kw("duration", &[("parts", "1.234")], json!(66)), json!(""));
        assert_eq!(run_kw("duration", &[("undefined", "UNDEFINED")], json!(1e12)), json!("UNDEFINED"));
    }

    #[test]
    fn test_size() {
        assert_eq!(run("size", &["-"], json!(1099511627776u64)), json!("1.0 TiB"));
        assert_eq!(run("size", &["-"], json!(1073741824)), json!("1.0 GiB"));
        assert_eq!(run("size", &["-"], json!(1153434)), json!("1.1 MiB"));
        assert_eq!(run("size", &["-"], json!(123)), json!("123 bytes"));
        assert_eq!(run("size", &["-"], json!(0)), json!("-"));
        assert_eq!(run("size", &["-"], Value::Null), json!("-"));
    }

    #[test]
    fn test_format() {
        let resource = json!({"status": "PASSED", "path": "/dir/base.suffix"});
        let call = TransformCall::new("format", &["{0} -- {1}", "status", "path"]);
        assert_eq!(apply(&call, &resource, &resource), json!("PASSED -- /dir/base.suffix"));
        assert_eq!(run("format", &["-- {0} --"], json!("abc")), json!("-- abc --"));
        assert_eq!(run("format", &["-- {0} --"], json!(["a", "b"])), json!("-- a --"));
        assert_eq!(run("format", &["-- {0} --"], Value::Null), json!("--  --"));
    }

    #[test]
    fn test_join_and_list() {
        assert_eq!(run("join", &["/"], json!([1, 2, 3, 4])), json!("1/2/3/4"));
        assert_eq!(run("join", &["/"], json!("abcd")), json!("a/b/c/d"));
        assert_eq!(run("join", &["/"], json!([])), json!(""));
        assert_eq!(run("join", &["/"], json!(123)), json!(""));

        let dict = json!({"a": 1, "b": 2});
        assert_eq!(run("list", &[], dict.clone()), json!("a=1,b=2"));
        assert_eq!(run_kw("list", &[("show", "keys")], dict.clone()), json!("a,b"));
        assert_eq!(run_kw("list", &[("separator", ";")], json!([1, "b"])), json!("1;b"));
        assert_eq!(run_kw("list", &[("undefined", "EMPTY")], json!({})), json!("EMPTY"));
    }

    #[test]
    fn test_slice_python_semantics() {
        assert_eq!(run("slice", &["1:3"], json!([0, 1, 2, 3])), json!([1, 2]));
        assert_eq!(run("slice", &["::-1"], json!([0, 1, 2])), json!([2, 1, 0]));
        assert_eq!(run("slice", &["-1"], json!([0, 1, 2])), json!([2]));
        assert_eq!(run("slice", &["1:"], json!("abc")), json!("bc"));
        assert_eq!(run("slice", &["a:b"], json!([0, 1])), json!(""));
        assert_eq!(run("slice", &["::0"], json!([0, 1])), json!(""));
    }

    #[test]
    fn test_scope_and_basename() {
        let zone = json!("https://compute.googleapis.com/compute/v1/projects/p/zones/us-central1-a");
        assert_eq!(run("scope", &[], zone.clone()), json!("us-central1-a"));
        assert_eq!(run("basename", &[], zone), json!("us-central1-a"));
        let disk = json!("projects/p/regions/us-east1/disks/d");
        assert_eq!(run("scope", &[], disk.clone()), json!("us-east1"));
        assert_eq!(run("scope", &["disk"], disk), json!("d"));
        assert_eq!(run("basename", &[], json!("")), json!(""));
    }

    #[test]
    fn test_segment() {
        let link = json!("https://foo/projects/p/zones/z/instances/bar");
        assert_eq!(run("segment", &[], link.clone()), json!("bar"));
        assert_eq!(run("segment", &["0"], link.clone()), json!("https:"));
        assert_eq!(run("segment", &["1"], link.clone()), json!(""));
        assert_eq!(run("segment", &["20"], link), json!(""));
    }

    #[test]
    fn test_notnull_firstof_len() {
        assert_eq!(run("notnull", &[], json!([1, null, 3])), json!([1, 3]));
        assert_eq!(run("notnull", &[], json!(5)), json!([]));
        let resource = json!({"a": "", "b": "bee"});
        let call = TransformCall::new("firstof", &["a", "b"]);
        assert_eq!(apply(&call, &Value::Null, &resource), json!("bee"));
        assert_eq!(run("len", &[], json!([1, 2])), json!(2));
        assert_eq!(run("len", &[], json!("abc")), json!(3));
    }

    #[test]
    fn test_float_significant_digits() {
        assert_eq!(run("float", &[], json!(1.0)), json!("1.0"));
        assert_eq!(run("float", &[], json!(-1.3333333)), json!("-1.33333"));
        assert_eq!(run("float", &[], json!(123.4567)), json!("123.457"));
        assert_eq!(run("float", &[], json!(0.0009)), json!("0.0009"));
        assert_eq!(run("float", &[], json!(9e-8)), json!("9e-08"));
    }

    #[test]
    fn test_date_from_epoch_and_string() {
        assert_eq!(run("date", &[], json!(1234567890)), json!("2009-02-13T23:31:30"));
        assert_eq!(
            run("date", &["%Y-%m-%dT%H:%M:%S.%f%z"], json!("2016-01-19T10:51:11.941-08:00")),
            json!("2016-01-19T10:51:11.941000-0800")
        );
        assert_eq!(run("date", &[], json!("garbage")), json!(""));
    }

    #[test]
    fn test_map_applies_rest_per_element() {
        let calls = vec![TransformCall::new("map", &[]), TransformCall::new("basename", &[])];
        let out = apply_chain(&calls, json!(["a/b", "c/d"]), &json!({}));
        assert_eq!(out, json!(["b", "d"]));
    }
}
