//! Output formatters
//!
//! Printers consume a stream of resources, one [`Printer::add_record`] call
//! each, and render them according to a [`Projection`]. Structured printers
//! (YAML, JSON) emit as they go; the table printer buffers a page of rows to
//! size its columns. Any projection with `:sort=N` columns buffers every
//! record first so the output is ordered.

pub mod csv;
pub mod json;
pub mod list;
pub mod table;
pub mod yaml;

use crate::console::Console;
use crate::error::{CliError, Result};
use crate::projection::Projection;
use serde_json::{Map, Value};

pub const DEFAULT_FORMAT: &str = "yaml";

const FORMATS: &[&str] = &[
    "table", "yaml", "json", "csv", "value", "get", "list", "none", "disable",
];

pub trait Printer {
    fn add_record(&mut self, resource: &Value) -> Result<()>;

    /// Flush buffered output; called once after the last record
    fn finish(&mut self) -> Result<()>;
}

/// Where printers write: stdout, or stdout without session capture for `[private]`
#[derive(Clone)]
pub struct Sink {
    console: Console,
    private: bool,
}

impl Sink {
    pub fn new(console: &Console, private: bool) -> Self {
        Self {
            console: console.clone(),
            private,
        }
    }

    pub fn write(&self, text: &str) -> Result<()> {
        if self.private {
            self.console.write_out_private(text)
        } else {
            self.console.write_out(text)
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.console.stdout_is_terminal()
    }
}

pub fn is_known_format(name: &str) -> bool {
    FORMATS.contains(&name)
}

/// Build the printer for `projection`; `single` marks describe-style output of one resource
pub fn printer_for(projection: &Projection, console: &Console, single: bool) -> Result<Box<dyn Printer>> {
    let sink = Sink::new(console, projection.has_attr("private"));
    let format = if projection.format.is_empty() {
        DEFAULT_FORMAT
    } else {
        projection.format.as_str()
    };
    let sorted = projection.has_sort() && format != "table";
    let inner = build_printer(format, projection.clone(), sink, single)?;
    if sorted {
        return Ok(Box::new(SortedPrinter {
            projection: projection.clone(),
            inner,
            records: Vec::new(),
        }));
    }
    Ok(inner)
}

fn build_printer(format: &str, projection: Projection, sink: Sink, single: bool) -> Result<Box<dyn Printer>> {
    Ok(match format {
        "table" => Box::new(table::TablePrinter::new(projection, sink)),
        "yaml" => Box::new(yaml::YamlPrinter::new(projection, sink, single)),
        "json" => Box::new(json::JsonPrinter::new(projection, sink, single)),
        "csv" => Box::new(csv::CsvPrinter::csv(projection, sink)),
        "value" => Box::new(csv::CsvPrinter::value(projection, sink)),
        "get" => Box::new(csv::CsvPrinter::get(projection, sink)),
        "list" => Box::new(list::ListPrinter::new(projection, sink)),
        "none" | "disable" => Box::new(NullPrinter),
        other => {
            return Err(CliError::Projection(format!(
                "unknown format [{other}]; must be one of: {}",
                FORMATS.join(", ")
            )))
        }
    })
}

/// Print a slice of resources in one go
pub fn print_all(projection: &Projection, console: &Console, resources: &[Value], single: bool) -> Result<()> {
    let mut printer = printer_for(projection, console, single)?;
    for resource in resources {
        printer.add_record(resource)?;
    }
    printer.finish()
}

/// Holds every record until `finish`, then replays them in `:sort=N` order
///
/// Tables sort their own rows since one resource may expand to several.
struct SortedPrinter {
    projection: Projection,
    inner: Box<dyn Printer>,
    records: Vec<Value>,
}

impl Printer for SortedPrinter {
    fn add_record(&mut self, resource: &Value) -> Result<()> {
        self.records.push(resource.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let mut records = std::mem::take(&mut self.records);
        self.projection.sort_resources(&mut records);
        for record in &records {
            self.inner.add_record(record)?;
        }
        self.inner.finish()
    }
}

struct NullPrinter;

impl Printer for NullPrinter {
    fn add_record(&mut self, _resource: &Value) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Recursively order object keys
pub fn sorted_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for k in keys {
                out.insert(k.clone(), sorted_keys(&map[k]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted_keys).collect()),
        other => other.clone(),
    }
}

/// Resource as structured printers show it: projected, or whole with sorted keys
pub fn structured(projection: &Projection, resource: &Value) -> Value {
    if projection.columns.is_empty() {
        sorted_keys(resource)
    } else {
        projection.project(resource)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::console::CapturedOutput;

    pub fn render(format: &str, resources: &[Value], single: bool) -> String {
        let (console, out) = Console::captured(&[], false);
        let projection = Projection::parse(format).unwrap();
        print_all(&projection, &console, resources, single).unwrap();
        stdout_of(&out)
    }

    pub fn stdout_of(out: &CapturedOutput) -> String {
        out.stdout.contents()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::render;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_format_is_error() {
        let (console, _) = Console::captured(&[], false);
        let p = Projection::parse("xml").unwrap();
        assert!(matches!(printer_for(&p, &console, false), Err(CliError::Projection(_))));
    }

    #[test]
    fn test_none_prints_nothing() {
        assert_eq!(render("none", &[json!({"name": "a"})], false), "");
    }

    fn unsorted() -> Vec<Value> {
        vec![
            json!({"name": "b", "zone": "z1"}),
            json!({"name": "a", "zone": "z2"}),
            json!({"name": "c", "zone": "z1"}),
        ]
    }

    #[test]
    fn test_sort_attribute_orders_value_and_get() {
        assert_eq!(render("value(name:sort=1)", &unsorted(), false), "a\nb\nc\n");
        assert_eq!(
            render("get[terminator=';'](name:sort=1:reverse)", &unsorted(), false),
            "c;b;a;"
        );
    }

    #[test]
    fn test_sort_attribute_orders_csv_and_list() {
        assert_eq!(
            render("csv(name:sort=2, zone:sort=1)", &unsorted(), false),
            "name,zone\nb,z1\nc,z1\na,z2\n"
        );
        assert_eq!(render("list(name:sort=1)", &unsorted(), false), "a\nb\nc\n");
    }

    #[test]
    fn test_sort_attribute_orders_structured_output() {
        assert_eq!(
            render("yaml(name:sort=1)", &unsorted(), false),
            "---\nname: a\n---\nname: b\n---\nname: c\n"
        );
        let out = render("json(name:sort=1:reverse)", &unsorted(), false);
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, json!([{"name": "c"}, {"name": "b"}, {"name": "a"}]));
    }

    #[test]
    fn test_without_sort_attribute_input_order_is_kept() {
        assert_eq!(render("value(name)", &unsorted(), false), "b\na\nc\n");
    }

    #[test]
    fn test_sorted_keys_is_recursive() {
        let v = sorted_keys(&json!({"b": 1, "a": {"d": 1, "c": [{"z": 1, "y": 2}]}}));
        assert_eq!(v.to_string(), r#"{"a":{"c":[{"y":2,"z":1}],"d":1},"b":1}"#);
    }
}
