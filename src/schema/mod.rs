//! Schemas - declarative field-type descriptions of a collection.
//!
//! A [`Schema`] is an ordered list of named [`FieldSpec`]s. Field order is
//! preserved everywhere a schema is walked (validation, defaults, derivation,
//! public projection).
//!
//! ## Example
//!
//! ```ignore
//! use typed_model::{FieldSpec, Schema};
//!
//! let schema = Schema::new()
//!     .field("id", FieldSpec::id().key().auto())
//!     .field("test", FieldSpec::int().public())
//!     .field("a", FieldSpec::int().optional());
//! ```

mod field;
mod introspect;
mod types;

pub use field::{DefaultValue, DeriveContext, DeriveFuture, Derivation, FieldSource, FieldSpec};
pub use introspect::{fill_defaults, SchemaInfo};
pub use types::FieldType;

use serde_json::{json, Map, Value};

/// Ordered mapping from field name to [`FieldSpec`].
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<(String, FieldSpec)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field. Re-declaring a name replaces the earlier spec in place.
    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = spec,
            None => self.fields.push((name, spec)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, spec)| spec)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// JSON description of the schema: type and flags per field.
    pub fn describe(&self) -> Value {
        let mut out = Map::new();
        for (name, spec) in self.fields() {
            let mut entry = json!({
                "type": spec.ty.name(),
                "key": spec.key,
                "auto": spec.is_auto(),
                "optional": spec.optional,
                "public": spec.public,
                "derived": spec.is_derived(),
                "default": spec.default().is_some(),
            });
            if let Some(mapped) = &spec.mapped {
                entry["mapped"] = Value::String(mapped.clone());
            }
            if let FieldType::Object(inner) = &spec.ty {
                entry["keys"] = inner.describe();
            }
            out.insert(name.to_string(), entry);
        }
        Value::Object(out)
    }
}
