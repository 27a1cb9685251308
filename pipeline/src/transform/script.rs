//! Declarative mapping scripts.
//!
//! A script is a JSON file holding named entry points. Each entry point maps fields of an
//! input record to the fields of an output record:
//!
//! ```json
//! {
//!   "offers": {
//!     "schema": "offer",
//!     "explode": "offers",
//!     "fields": [
//!       {"name": "url", "source": "url", "type": "string"},
//!       {"name": "price", "source": "$item.price", "type": "double", "nullable": true}
//!     ]
//!   }
//! }
//! ```
//!
//! Without `explode` every input yields exactly one output. With it, one output is produced
//! per element of the array found at that path, and `$item` refers to the element.

use std::collections::BTreeMap;
use std::iter;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ErrorKind, PipelineResult};
use crate::transform::{RecordIter, Transform};
use crate::types::{FieldSchema, FieldType, Record, Schema, lookup_segment};
use crate::{bail, pipeline_error};

/// Prefix referring to the current element of an exploded array.
const ITEM_PREFIX: &str = "$item";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EntryPoint {
    schema: String,
    #[serde(default)]
    explode: Option<String>,
    fields: Vec<FieldMapping>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldMapping {
    name: String,
    source: String,
    #[serde(rename = "type", default = "default_field_type")]
    field_type: FieldType,
    #[serde(default)]
    nullable: bool,
}

fn default_field_type() -> FieldType {
    FieldType::Any
}

/// Transform backed by one entry point of a mapping script.
#[derive(Debug, Clone)]
pub struct ScriptTransform {
    schema: Schema,
    explode: Option<String>,
    fields: Arc<[FieldMapping]>,
}

impl ScriptTransform {
    /// Loads `entry_point` from the script at `path`.
    pub fn load(path: &Path, entry_point: &str) -> PipelineResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|err| {
            pipeline_error!(
                ErrorKind::InvalidConfiguration,
                "Failed to read transform script",
                path.display(),
                source: err
            )
        })?;

        Self::parse(&contents, entry_point)
    }

    /// Builds the transform from the script source.
    pub fn parse(contents: &str, entry_point: &str) -> PipelineResult<Self> {
        let mut entry_points: BTreeMap<String, EntryPoint> = serde_json::from_str(contents)
            .map_err(|err| {
                pipeline_error!(
                    ErrorKind::InvalidConfiguration,
                    "Invalid transform script",
                    err,
                    source: err
                )
            })?;

        let available = entry_points.keys().cloned().collect::<Vec<_>>().join(", ");
        let Some(entry) = entry_points.remove(entry_point) else {
            bail!(
                ErrorKind::InvalidConfiguration,
                "Unknown transform script entry point",
                format!("`{entry_point}` is not defined, available entry points: {available}")
            );
        };

        let schema = Schema::new(
            entry.schema,
            entry
                .fields
                .iter()
                .map(|field| FieldSchema::new(&field.name, field.field_type, field.nullable))
                .collect(),
        );

        Ok(Self {
            schema,
            explode: entry.explode,
            fields: entry.fields.into(),
        })
    }
}

impl Transform for ScriptTransform {
    fn schema(&self) -> Schema {
        self.schema.clone()
    }

    fn transform(&self, record: Record) -> RecordIter {
        let fields = self.fields.clone();

        let Some(explode) = &self.explode else {
            return Box::new(iter::once(map_fields(&fields, &record, None)));
        };

        match record.lookup(explode) {
            None | Some(Value::Null) => Box::new(iter::empty()),
            Some(Value::Array(items)) => {
                let items = items.clone();
                Box::new(
                    items
                        .into_iter()
                        .map(move |item| map_fields(&fields, &record, Some(&item))),
                )
            }
            Some(other) => Box::new(iter::once(Err(pipeline_error!(
                ErrorKind::TransformError,
                "Exploded value is not an array",
                format!("`{explode}` holds `{other}`")
            )))),
        }
    }
}

/// Builds one output record.
fn map_fields(
    fields: &[FieldMapping],
    record: &Record,
    item: Option<&Value>,
) -> PipelineResult<Record> {
    let mut output = Record::new();

    for field in fields {
        let value = resolve(&field.source, record, item)
            .cloned()
            .unwrap_or(Value::Null);

        if value.is_null() && !field.nullable {
            bail!(
                ErrorKind::TransformError,
                "Missing value for a required field",
                format!("field `{}` read from `{}`", field.name, field.source)
            );
        }

        if !value.is_null() && !field.field_type.matches(&value) {
            bail!(
                ErrorKind::TransformError,
                "Value does not have the declared type",
                format!(
                    "field `{}` expects {} but `{}` holds `{value}`",
                    field.name, field.field_type, field.source
                )
            );
        }

        output.insert(field.name.clone(), value);
    }

    Ok(output)
}

/// Resolves a source path against the record or the current item.
fn resolve<'a>(source: &str, record: &'a Record, item: Option<&'a Value>) -> Option<&'a Value> {
    match source.strip_prefix(ITEM_PREFIX) {
        Some("") => item,
        Some(rest) => {
            let rest = rest.strip_prefix('.')?;
            rest.split('.').try_fold(item?, lookup_segment)
        }
        None => record.lookup(source),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const SCRIPT: &str = r#"{
        "pages": {
            "schema": "page",
            "fields": [
                {"name": "url", "source": "url", "type": "string"},
                {"name": "title", "source": "meta.title", "type": "string", "nullable": true}
            ]
        },
        "offers": {
            "schema": "offer",
            "explode": "offers",
            "fields": [
                {"name": "url", "source": "url", "type": "string"},
                {"name": "price", "source": "$item.price", "type": "double"},
                {"name": "raw", "source": "$item"}
            ]
        }
    }"#;

    fn page() -> Record {
        Record::try_from(json!({
            "url": "https://example.com/p",
            "meta": {"title": "Lamp"},
            "offers": [{"price": 10.5}, {"price": 12}],
        }))
        .unwrap()
    }

    fn collect(transform: &ScriptTransform, record: Record) -> PipelineResult<Vec<Record>> {
        transform.transform(record).collect()
    }

    #[test]
    fn maps_fields_one_to_one() {
        let transform = ScriptTransform::parse(SCRIPT, "pages").unwrap();

        let outputs = collect(&transform, page()).unwrap();

        assert_eq!(
            outputs,
            vec![Record::new().with("url", "https://example.com/p").with("title", "Lamp")]
        );
        assert_eq!(transform.schema().name, "page");
        assert_eq!(transform.schema().fields.len(), 2);
    }

    #[test]
    fn nullable_fields_default_to_null() {
        let transform = ScriptTransform::parse(SCRIPT, "pages").unwrap();
        let record = Record::new().with("url", "https://example.com/q");

        let outputs = collect(&transform, record).unwrap();

        assert_eq!(outputs[0].get("title"), Some(&Value::Null));
    }

    #[test]
    fn explodes_arrays_into_one_output_per_element() {
        let transform = ScriptTransform::parse(SCRIPT, "offers").unwrap();

        let outputs = collect(&transform, page()).unwrap();

        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].get("price"), Some(&json!(10.5)));
        assert_eq!(outputs[1].get("price"), Some(&json!(12)));
        assert_eq!(outputs[1].get("raw"), Some(&json!({"price": 12})));
    }

    #[test]
    fn missing_arrays_produce_nothing() {
        let transform = ScriptTransform::parse(SCRIPT, "offers").unwrap();

        let outputs = collect(&transform, Record::new().with("url", "u")).unwrap();

        assert!(outputs.is_empty());
    }

    #[test]
    fn missing_required_values_fail_the_record() {
        let transform = ScriptTransform::parse(SCRIPT, "pages").unwrap();

        let err = collect(&transform, Record::new().with("title", "x")).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TransformError);
        assert!(err.detail().unwrap().contains("field `url`"));
    }

    #[test]
    fn type_mismatches_fail_the_record() {
        let transform = ScriptTransform::parse(SCRIPT, "offers").unwrap();
        let record = Record::try_from(json!({"url": "u", "offers": [{"price": "free"}]})).unwrap();

        let err = collect(&transform, record).unwrap_err();

        assert!(err.detail().unwrap().contains("expects double"));
    }

    #[test]
    fn unknown_entry_points_list_the_available_ones() {
        let err = ScriptTransform::parse(SCRIPT, "reviews").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
        assert!(err.detail().unwrap().contains("offers, pages"));
    }

    #[test]
    fn loads_scripts_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.json");
        std::fs::write(&path, SCRIPT).unwrap();

        assert!(ScriptTransform::load(&path, "offers").is_ok());
        assert_eq!(
            ScriptTransform::load(&dir.path().join("missing.json"), "offers")
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidConfiguration
        );
    }
}
