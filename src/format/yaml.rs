//! YAML printer
//!
//! Streamed records each start with a `---` document marker; a single
//! described resource is printed bare.

use super::{structured, Printer, Sink};
use crate::error::{CliError, Result};
use crate::projection::Projection;
use serde_json::Value;

pub struct YamlPrinter {
    projection: Projection,
    sink: Sink,
    single: bool,
}

impl YamlPrinter {
    pub fn new(projection: Projection, sink: Sink, single: bool) -> Self {
        Self {
            projection,
            sink,
            single,
        }
    }
}

/// Block-style YAML for one value, newline terminated
pub fn to_yaml(value: &Value) -> Result<String> {
    let mut text =
        serde_yaml::to_string(value).map_err(|e| CliError::Serialization(e.to_string()))?;
    if !text.ends_with('\n') {
        text.push('\n');
    }
    Ok(text)
}

impl Printer for YamlPrinter {
    fn add_record(&mut self, resource: &Value) -> Result<()> {
        let value = structured(&self.projection, resource);
        let body = to_yaml(&value)?;
        if self.single {
            self.sink.write(&body)
        } else {
            self.sink.write(&format!("---\n{body}"))
        }
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}
