//! Resource projections
//!
//! A projection selects and transforms the keys of a resource for display:
//! `table[box](name, zone.basename(), status)`. Filters and `--sort-by`
//! share the key grammar.
//!
//! - [`lexer`] - Character cursor shared by the parsers
//! - [`key`] - Dotted key paths with `[N]` and `[]` segments
//! - [`parser`] - Projection expressions
//! - [`transforms`] - `.basename()`, `.date()`, `.size()` and friends
//! - [`filter`] - `--filter` expressions
//! - [`sort`] - `--sort-by` and column sort attributes

pub mod filter;
pub mod key;
pub mod lexer;
pub mod parser;
pub mod sort;
pub mod transforms;

use crate::error::{CliError, Result};
use key::Key;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use transforms::TransformCall;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Default)]
pub struct Column {
    /// `None` for columns that are a bare transform such as `firstof(a,b)`
    pub key: Option<Key>,
    pub transforms: Vec<TransformCall>,
    pub label: Option<String>,
    pub sort: Option<u32>,
    pub descending: bool,
    pub align: Align,
    pub wrap: bool,
    /// Dropped from the table when empty in every row
    pub optional: bool,
    pub width: Option<usize>,
}

impl Column {
    pub fn heading(&self) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        match self.key.as_ref().and_then(Key::last_name) {
            Some(name) => upper_snake(name),
            None => self
                .transforms
                .first()
                .map(|t| t.name.to_uppercase())
                .unwrap_or_default(),
        }
    }

    /// Value of this column for `resource`
    pub fn evaluate(&self, resource: &Value) -> Value {
        let value = match &self.key {
            Some(key) => key.get(resource),
            None => resource.clone(),
        };
        transforms::apply_chain(&self.transforms, value, resource)
    }
}

/// `creationTimestamp` -> `CREATION_TIMESTAMP`
pub fn upper_snake(name: &str) -> String {
    let mut out = String::new();
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_uppercase() && prev_lower {
            out.push('_');
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        if c == '-' {
            out.push('_');
        } else {
            out.extend(c.to_uppercase());
        }
    }
    out
}

/// A parsed `--format` value
#[derive(Debug, Clone, Default)]
pub struct Projection {
    /// Printer name, empty when only columns were given
    pub format: String,
    pub attrs: Vec<(String, Option<String>)>,
    pub columns: Vec<Column>,
}

impl Projection {
    pub fn parse(expression: &str) -> Result<Projection> {
        parser::parse(expression).map_err(CliError::Projection)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|(n, _)| n == name)
    }

    /// Attribute value; flags without a value read as `""`
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_deref().unwrap_or_default())
    }

    /// Fill what the user left out from a command's default format
    pub fn merged_with(mut self, default: Option<&Projection>) -> Projection {
        let Some(default) = default else {
            return self;
        };
        if self.format.is_empty() {
            self.format = default.format.clone();
        }
        if self.columns.is_empty() && self.format == default.format {
            self.columns = default.columns.clone();
        }
        let mut attrs = default.attrs.clone();
        for (name, value) in self.attrs {
            attrs.retain(|(n, _)| *n != name);
            attrs.push((name, value));
        }
        self.attrs = attrs;
        self
    }

    pub fn headings(&self) -> Vec<String> {
        self.columns.iter().map(Column::heading).collect()
    }

    /// Table rows for one resource
    ///
    /// A `[]` key yields one row per array element; columns sharing that
    /// array are evaluated per element, the rest repeat. An absent or
    /// empty array yields a single row with those cells empty.
    pub fn rows(&self, resource: &Value) -> Vec<Vec<Value>> {
        let slice = self
            .columns
            .iter()
            .filter_map(|c| c.key.as_ref())
            .find_map(Key::split_at_slice);

        let Some((array_key, _)) = slice else {
            return vec![self.columns.iter().map(|c| c.evaluate(resource)).collect()];
        };

        let elements = match array_key.get(resource) {
            Value::Array(items) if !items.is_empty() => items,
            _ => {
                return vec![self
                    .columns
                    .iter()
                    .map(|c| match c.key.as_ref().and_then(Key::split_at_slice) {
                        Some((prefix, _)) if prefix == array_key => Value::Null,
                        _ => c.evaluate(resource),
                    })
                    .collect()];
            }
        };

        elements
            .iter()
            .map(|element| {
                self.columns
                    .iter()
                    .map(|c| match c.key.as_ref().and_then(Key::split_at_slice) {
                        Some((prefix, rest)) if prefix == array_key => {
                            transforms::apply_chain(&c.transforms, rest.get(element), resource)
                        }
                        _ => c.evaluate(resource),
                    })
                    .collect()
            })
            .collect()
    }

    /// Projected resource for structured printers
    ///
    /// Columns that evaluate to nothing are left out.
    pub fn project(&self, resource: &Value) -> Value {
        if self.columns.is_empty() {
            return resource.clone();
        }
        let mut out = Map::new();
        for column in &self.columns {
            let value = column.evaluate(resource);
            if value.is_null() {
                continue;
            }
            let path: Vec<String> = match &column.key {
                Some(key) if !key.has_slice() => key
                    .segments
                    .iter()
                    .filter_map(|s| match s {
                        key::KeySegment::Name(n) => Some(n.clone()),
                        _ => None,
                    })
                    .collect(),
                _ => vec![column.heading().to_lowercase()],
            };
            insert_path(&mut out, &path, value);
        }
        Value::Object(out)
    }

    /// True when any column carries a `:sort=N` attribute
    pub fn has_sort(&self) -> bool {
        self.columns.iter().any(|c| c.sort.is_some())
    }

    /// Apply column `:sort=N` attributes, stable
    pub fn sort_rows(&self, rows: &mut [Vec<Value>]) {
        if !self.has_sort() {
            return;
        }
        rows.sort_by(|a, b| self.compare_rows(a, b));
    }

    /// Order whole resources by the values their `:sort=N` columns evaluate to, stable
    pub fn sort_resources(&self, resources: &mut Vec<Value>) {
        if !self.has_sort() {
            return;
        }
        let mut keyed: Vec<(Vec<Value>, Value)> = resources
            .drain(..)
            .map(|r| (self.rows(&r).into_iter().next().unwrap_or_default(), r))
            .collect();
        keyed.sort_by(|a, b| self.compare_rows(&a.0, &b.0));
        resources.extend(keyed.into_iter().map(|(_, r)| r));
    }

    fn compare_rows(&self, a: &[Value], b: &[Value]) -> Ordering {
        let mut order: Vec<(u32, usize, bool)> = self
            .columns
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.sort.map(|n| (n, i, c.descending)))
            .collect();
        order.sort();
        for (_, index, descending) in &order {
            let left = a.get(*index).unwrap_or(&Value::Null);
            let right = b.get(*index).unwrap_or(&Value::Null);
            let ord = sort::compare_values(left, right);
            let ord = if *descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

fn insert_path(out: &mut Map<String, Value>, path: &[String], value: Value) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    if rest.is_empty() {
        out.insert(first.clone(), value);
        return;
    }
    let entry = out
        .entry(first.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    if let Value::Object(child) = entry {
        insert_path(child, rest, value);
    }
}

/// Display text for a table or value cell
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(cell_text).collect::<Vec<_>>().join(";"),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{k}={}", cell_text(v)))
            .collect::<Vec<_>>()
            .join(";"),
    }
}
