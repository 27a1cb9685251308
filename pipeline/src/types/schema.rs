use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bail;
use crate::error::{ErrorKind, PipelineResult};
use crate::types::Record;

/// Type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Long,
    Double,
    Boolean,
    Array,
    Object,
    /// Accepts any JSON value.
    Any,
}

impl FieldType {
    /// Returns `true` if a non-null `value` is of this type.
    ///
    /// Integers are accepted where doubles are expected.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Long => value.is_i64() || value.is_u64(),
            FieldType::Double => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
            FieldType::Any => true,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Long => "long",
            FieldType::Double => "double",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
            FieldType::Any => "any",
        };

        f.write_str(name)
    }
}

/// A named, typed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub nullable: bool,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, field_type: FieldType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable,
        }
    }
}

/// Shape of the records a transform produces, declared to the output on creation.
///
/// A schema without fields is open and accepts every record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

impl Schema {
    pub fn new(name: impl Into<String>, fields: Vec<FieldSchema>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Creates an open schema.
    pub fn open(name: impl Into<String>) -> Self {
        Self::new(name, vec![])
    }

    pub fn is_open(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Checks a record against the declared fields.
    ///
    /// Non-nullable fields must be present and non-null, and every present non-null value
    /// must match its declared type. Undeclared fields are allowed.
    pub fn validate(&self, record: &Record) -> PipelineResult<()> {
        for field in &self.fields {
            match record.get(&field.name) {
                None | Some(Value::Null) if !field.nullable => {
                    bail!(
                        ErrorKind::SchemaMismatch,
                        "Record does not match the output schema",
                        format!(
                            "field `{}` of schema `{}` is not nullable but is missing or null",
                            field.name, self.name
                        )
                    );
                }
                Some(value) if !value.is_null() && !field.field_type.matches(value) => {
                    bail!(
                        ErrorKind::SchemaMismatch,
                        "Record does not match the output schema",
                        format!(
                            "field `{}` of schema `{}` expects {} but got `{value}`",
                            field.name, self.name, field.field_type
                        )
                    );
                }
                _ => {}
            }
        }

        Ok(())
    }
}
