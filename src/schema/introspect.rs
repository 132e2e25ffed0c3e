//! SchemaInfo - metadata resolved once per model family.

use serde_json::Value;

use super::{FieldType, Schema};
use crate::error::ModelError;
use crate::Record;

/// Key, auto, and stored field sets of a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaInfo {
    pub keys: Vec<String>,
    pub autos: Vec<String>,
    pub stored: Vec<String>,
}

impl SchemaInfo {
    /// Resolve the field sets, rejecting schemas that cannot back a model.
    pub fn resolve(collection: &str, schema: &Schema) -> Result<Self, ModelError> {
        let keys: Vec<String> = schema
            .fields()
            .filter(|(_, spec)| spec.key)
            .map(|(name, _)| name.to_string())
            .collect();
        let autos: Vec<String> = schema
            .fields()
            .filter(|(_, spec)| spec.is_auto())
            .map(|(name, _)| name.to_string())
            .collect();
        let stored: Vec<String> = schema
            .fields()
            .filter(|(_, spec)| !spec.is_auto() && !spec.is_derived())
            .map(|(name, _)| name.to_string())
            .collect();

        if keys.is_empty() {
            return Err(ModelError::InvalidSchema {
                collection: collection.to_string(),
                reason: "no key found".into(),
            });
        }
        if stored.is_empty() {
            return Err(ModelError::InvalidSchema {
                collection: collection.to_string(),
                reason: "no stored, not generated field found".into(),
            });
        }

        Ok(Self {
            keys,
            autos,
            stored,
        })
    }

    pub fn is_key(&self, field: &str) -> bool {
        self.keys.iter().any(|k| k == field)
    }

    pub fn is_auto(&self, field: &str) -> bool {
        self.autos.iter().any(|a| a == field)
    }
}

fn is_absent(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

/// Return a copy of `record` with every omitted (missing or null) field that has
/// a default filled in. Nested objects are completed before their container.
pub fn fill_defaults(schema: &Schema, record: &Record) -> Record {
    let mut out = record.clone();
    for (name, spec) in schema.fields() {
        if let Some(default) = spec.default() {
            if is_absent(out.get(name)) {
                let value = default.produce(&out);
                out.insert(name.to_string(), value);
            }
        }
        let filled = match (&spec.ty, out.get(name)) {
            (FieldType::Object(inner), Some(Value::Object(nested))) => {
                Some(Value::Object(fill_defaults(inner, nested)))
            }
            (FieldType::Array(item_ty), Some(Value::Array(items))) => match item_ty.as_ref() {
                FieldType::Object(inner) => Some(Value::Array(
                    items
                        .iter()
                        .map(|item| match item {
                            Value::Object(nested) => Value::Object(fill_defaults(inner, nested)),
                            other => other.clone(),
                        })
                        .collect(),
                )),
                _ => None,
            },
            _ => None,
        };
        if let Some(value) = filled {
            out.insert(name.to_string(), value);
        }
    }
    out
}
