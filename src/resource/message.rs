//! Typed API messages
//!
//! Request and resource messages are described by schemas loaded from the
//! embedded `messages.json`. Everything above this module sees a message
//! only through [`ApiMessage`]: declared-field iteration, get and set by
//! name, and conversion to JSON in schema order.

use crate::error::{CliError, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

const MESSAGES_JSON: &str = include_str!("../resources/messages.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Int32,
    /// Serialized as a JSON string
    Int64,
    Float,
    Bool,
    /// Serialized as `"<seconds>s"`
    Duration,
    Enum,
    Message,
    /// String-keyed map such as `labels`
    Map,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub repeated: bool,
    /// Allowed names for enum fields
    #[serde(default, rename = "enum")]
    pub enum_values: Vec<String>,
    /// Message type for message fields
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageSchema {
    pub fields: Vec<FieldSchema>,
}

impl MessageSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Deserialize)]
struct MessagesFile {
    messages: BTreeMap<String, MessageSchema>,
}

/// Message schemas known to this invocation
#[derive(Debug, Clone, Default)]
pub struct Schemas {
    messages: Arc<BTreeMap<String, MessageSchema>>,
}

static SCHEMAS: OnceLock<Schemas> = OnceLock::new();

impl Schemas {
    pub fn global() -> &'static Schemas {
        SCHEMAS.get_or_init(|| match Self::from_json(MESSAGES_JSON) {
            Ok(schemas) => schemas,
            Err(e) => {
                tracing::error!("Failed to load embedded message schemas: {}", e);
                Schemas::default()
            }
        })
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let file: MessagesFile = serde_json::from_str(content)?;
        Ok(Self {
            messages: Arc::new(file.messages),
        })
    }

    pub fn schema(&self, type_name: &str) -> Result<&MessageSchema> {
        self.messages
            .get(type_name)
            .ok_or_else(|| CliError::Internal(format!("Unknown message type [{type_name}]")))
    }

    /// An empty message of `type_name`
    pub fn new_message(&self, type_name: &str) -> Result<Message> {
        self.schema(type_name)?;
        Ok(Message {
            type_name: type_name.to_string(),
            schemas: self.clone(),
            values: Map::new(),
        })
    }

    /// Resolve a dotted field path to the schema of its final field
    pub fn field_at(&self, type_name: &str, path: &str) -> Result<&FieldSchema> {
        let mut current = type_name;
        let mut parts = path.split('.').peekable();
        while let Some(part) = parts.next() {
            let schema = self.schema(current)?;
            let field = schema.field(part).ok_or_else(|| {
                CliError::Internal(format!("Message [{current}] has no field [{part}]"))
            })?;
            if parts.peek().is_none() {
                return Ok(field);
            }
            current = field.message.as_deref().ok_or_else(|| {
                CliError::Internal(format!("Field [{part}] of [{current}] is not a message"))
            })?;
        }
        Err(CliError::Internal(format!("Empty field path for [{type_name}]")))
    }

    /// Reorder a JSON object to follow the declared field order of `type_name`
    pub fn ordered(&self, type_name: &str, value: &Value) -> Value {
        let (Ok(schema), Some(object)) = (self.schema(type_name), value.as_object()) else {
            return value.clone();
        };
        let mut out = Map::new();
        for field in &schema.fields {
            let Some(v) = object.get(&field.name) else {
                continue;
            };
            let v = match (&field.message, v) {
                (Some(nested), Value::Array(items)) => {
                    Value::Array(items.iter().map(|i| self.ordered(nested, i)).collect())
                }
                (Some(nested), _) => self.ordered(nested, v),
                (None, _) => v.clone(),
            };
            out.insert(field.name.clone(), v);
        }
        // Undeclared keys (server-populated output fields) follow in arrival order
        for (k, v) in object {
            if !out.contains_key(k) {
                out.insert(k.clone(), v.clone());
            }
        }
        Value::Object(out)
    }
}

/// The narrow interface the rest of the crate uses on messages
pub trait ApiMessage {
    fn type_name(&self) -> &str;

    /// Set fields, in declared order
    fn fields(&self) -> Vec<(&str, &Value)>;

    fn get(&self, name: &str) -> Option<&Value>;

    /// Assign a top-level field; the value must already be coerced
    fn set(&mut self, name: &str, value: Value) -> Result<()>;

    fn to_value(&self) -> Value;
}

/// A schema-backed message
#[derive(Debug, Clone)]
pub struct Message {
    type_name: String,
    schemas: Schemas,
    values: Map<String, Value>,
}

impl Message {
    pub fn schemas(&self) -> &Schemas {
        &self.schemas
    }

    pub fn schema(&self) -> Result<&MessageSchema> {
        self.schemas.schema(&self.type_name)
    }

    /// Assign a dotted path, creating intermediate sub-messages on demand
    pub fn set_path(&mut self, path: &str, value: Value) -> Result<()> {
        // Validates every segment before anything is written
        self.schemas.field_at(&self.type_name, path)?;

        let mut parts: Vec<&str> = path.split('.').collect();
        let Some(last) = parts.pop() else {
            return Ok(());
        };
        let mut target = &mut self.values;
        for part in parts {
            let entry = target
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            let Value::Object(map) = entry else {
                return Err(CliError::Internal(format!("Field [{part}] is not a message")));
            };
            target = map;
        }
        target.insert(last.to_string(), value);
        Ok(())
    }

    /// Read a dotted path
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.values.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current)
    }
}

impl ApiMessage for Message {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn fields(&self) -> Vec<(&str, &Value)> {
        let Ok(schema) = self.schema() else {
            return Vec::new();
        };
        schema
            .fields
            .iter()
            .filter_map(|f| self.values.get(&f.name).map(|v| (f.name.as_str(), v)))
            .collect()
    }

    fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    fn set(&mut self, name: &str, value: Value) -> Result<()> {
        if self.schema()?.field(name).is_none() {
            return Err(CliError::Internal(format!(
                "Message [{}] has no field [{}]",
                self.type_name, name
            )));
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    fn to_value(&self) -> Value {
        self.schemas
            .ordered(&self.type_name, &Value::Object(self.values.clone()))
    }
}
