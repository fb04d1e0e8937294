//! JSON printer
//!
//! Lists print as one array, streamed element by element; a described
//! resource prints as a bare object. Two-space indentation throughout.

use super::{structured, Printer, Sink};
use crate::error::{CliError, Result};
use crate::projection::Projection;
use serde_json::Value;

pub struct JsonPrinter {
    projection: Projection,
    sink: Sink,
    single: bool,
    count: usize,
}

impl JsonPrinter {
    pub fn new(projection: Projection, sink: Sink, single: bool) -> Self {
        Self {
            projection,
            sink,
            single,
            count: 0,
        }
    }
}

fn pretty(value: &Value) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| CliError::Serialization(e.to_string()))
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|l| format!("  {l}"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl Printer for JsonPrinter {
    fn add_record(&mut self, resource: &Value) -> Result<()> {
        let value = structured(&self.projection, resource);
        let text = pretty(&value)?;
        if self.single {
            self.count += 1;
            return self.sink.write(&format!("{text}\n"));
        }
        let prefix = if self.count == 0 { "[\n" } else { ",\n" };
        self.count += 1;
        self.sink.write(&format!("{prefix}{}", indent(&text)))
    }

    fn finish(&mut self) -> Result<()> {
        if self.single {
            return Ok(());
        }
        if self.count == 0 {
            self.sink.write("[]\n")
        } else {
            self.sink.write("\n]\n")
        }
    }
}
