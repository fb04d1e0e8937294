//! Delimited printers: `csv`, `value` and `get`
//!
//! `csv` prints a heading and quotes fields that need it. `value` and `get`
//! print raw cells; `value` separates with tabs, `get` takes its terminator
//! from the `terminator` attribute.

use super::{Printer, Sink};
use crate::error::Result;
use crate::projection::{cell_text, Projection};
use serde_json::Value;

pub struct CsvPrinter {
    projection: Projection,
    sink: Sink,
    delimiter: String,
    terminator: String,
    quoting: bool,
    heading: bool,
    heading_done: bool,
}

impl CsvPrinter {
    pub fn csv(projection: Projection, sink: Sink) -> Self {
        let delimiter = projection
            .attr("delimiter")
            .or_else(|| projection.attr("separator"))
            .unwrap_or(",")
            .to_string();
        let terminator = projection.attr("terminator").unwrap_or("\n").to_string();
        let heading = !projection.has_attr("no-heading");
        Self {
            projection,
            sink,
            delimiter,
            terminator,
            quoting: true,
            heading,
            heading_done: false,
        }
    }

    pub fn value(projection: Projection, sink: Sink) -> Self {
        let delimiter = projection
            .attr("delimiter")
            .or_else(|| projection.attr("separator"))
            .unwrap_or("\t")
            .to_string();
        let terminator = projection.attr("terminator").unwrap_or("\n").to_string();
        let quoting = projection.has_attr("quote");
        Self {
            projection,
            sink,
            delimiter,
            terminator,
            quoting,
            heading: false,
            heading_done: true,
        }
    }

    pub fn get(projection: Projection, sink: Sink) -> Self {
        let mut printer = Self::value(projection, sink);
        if let Some(terminator) = printer.projection.attr("terminator") {
            printer.terminator = unescape(terminator);
        }
        printer
    }

    fn field(&self, text: &str) -> String {
        if !self.quoting {
            return text.to_string();
        }
        let force = self.projection.has_attr("quote");
        let needs = text.contains(self.delimiter.as_str())
            || text.contains('\n')
            || text.contains('\r')
            || text.contains('"');
        if force || needs {
            format!("\"{}\"", text.replace('"', "\"\""))
        } else {
            text.to_string()
        }
    }

    fn write_row(&self, cells: &[String]) -> Result<()> {
        let fields: Vec<String> = cells.iter().map(|c| self.field(c)).collect();
        self.sink
            .write(&format!("{}{}", fields.join(&self.delimiter), self.terminator))
    }
}

fn unescape(s: &str) -> String {
    s.replace("\\n", "\n").replace("\\t", "\t")
}

impl Printer for CsvPrinter {
    fn add_record(&mut self, resource: &Value) -> Result<()> {
        if self.projection.columns.is_empty() {
            return self.write_row(&[cell_text(resource)]);
        }
        if self.heading && !self.heading_done {
            self.heading_done = true;
            let headings: Vec<String> = self
                .projection
                .columns
                .iter()
                .map(|c| {
                    c.label.clone().unwrap_or_else(|| {
                        c.key.as_ref().map(|k| k.to_string()).unwrap_or_else(|| c.heading().to_lowercase())
                    })
                })
                .collect();
            self.write_row(&headings)?;
        }
        for row in self.projection.rows(resource) {
            let cells: Vec<String> = row.iter().map(cell_text).collect();
            self.write_row(&cells)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::format::test_support::render;
    use serde_json::json;

    #[test]
    fn test_csv_quotes_when_needed() {
        let out = render(
            "csv(name, description)",
            &[
                json!({"name": "a", "description": "plain"}),
                json!({"name": "b", "description": "has, comma"}),
                json!({"name": "c", "description": "say \"hi\""}),
            ],
            false,
        );
        assert_eq!(
            out,
            "name,description\na,plain\nb,\"has, comma\"\nc,\"say \"\"hi\"\"\"\n"
        );
    }

    #[test]
    fn test_csv_no_heading_and_quote() {
        let out = render("csv[no-heading,quote](name)", &[json!({"name": "a"})], false);
        assert_eq!(out, "\"a\"\n");
    }

    #[test]
    fn test_value_is_tab_separated_and_raw() {
        let out = render(
            "value(name, zone.basename())",
            &[json!({"name": "vm, 1", "zone": "projects/p/zones/us-east1-b"})],
            false,
        );
        assert_eq!(out, "vm, 1\tus-east1-b\n");
    }

    #[test]
    fn test_value_expands_slices() {
        let out = render(
            "value(networkInterfaces[].networkIP)",
            &[json!({"networkInterfaces": [{"networkIP": "10.0.0.2"}, {"networkIP": "10.0.0.3"}]})],
            false,
        );
        assert_eq!(out, "10.0.0.2\n10.0.0.3\n");
    }

    #[test]
    fn test_get_uses_terminator() {
        let out = render(
            "get[terminator=';'](name)",
            &[json!({"name": "a"}), json!({"name": "b"})],
            false,
        );
        assert_eq!(out, "a;b;");
    }
}
