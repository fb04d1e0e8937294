//! List printer: one row per line, cells joined by a delimiter

use super::{Printer, Sink};
use crate::error::Result;
use crate::projection::{cell_text, Projection};
use serde_json::Value;

const DEFAULT_DELIMITER: &str = "  ";

pub struct ListPrinter {
    projection: Projection,
    sink: Sink,
    delimiter: String,
}

impl ListPrinter {
    pub fn new(projection: Projection, sink: Sink) -> Self {
        let delimiter = projection
            .attr("delimiter")
            .unwrap_or(DEFAULT_DELIMITER)
            .to_string();
        Self {
            projection,
            sink,
            delimiter,
        }
    }
}

impl Printer for ListPrinter {
    fn add_record(&mut self, resource: &Value) -> Result<()> {
        if self.projection.columns.is_empty() {
            return self.sink.write(&format!("{}\n", cell_text(resource)));
        }
        for row in self.projection.rows(resource) {
            let line: Vec<String> = row.iter().map(cell_text).collect();
            self.sink
                .write(&format!("{}\n", line.join(&self.delimiter).trim_end()))?;
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
    fn test_default_delimiter() {
        let out = render(
            "list(name, status)",
            &[json!({"name": "a", "status": "UP"}), json!({"name": "b"})],
            false,
        );
        assert_eq!(out, "a  UP\nb\n");
    }

    #[test]
    fn test_custom_delimiter_and_scalars() {
        let out = render("list[delimiter=' | '](name, status)", &[json!({"name": "a", "status": "UP"})], false);
        assert_eq!(out, "a | UP\n");
        assert_eq!(render("list", &[json!("https://x/a")], false), "https://x/a\n");
    }
}
