//! Models - schema-driven record handles bound to a store.
//!
//! A [`ModelType`] pairs a collection name with its [`Schema`] and is the
//! factory for the three multiplicity handles: [`ManyModel`] (zero or more
//! records), [`OneModel`] (exactly one) and [`NoneModel`] (asserts absence).
//! Every handle owns its own [`RecordCore`], which validates records, tracks
//! the identities it loaded, and translates storage failures.
//!
//! ## Example
//!
//! ```ignore
//! use typed_model::{FieldSpec, Filter, InMemoryStore, ModelType, Schema, TableDef};
//!
//! let users = ModelType::new(
//!     "users",
//!     Schema::new()
//!         .field("id", FieldSpec::id().key().auto().public())
//!         .field("name", FieldSpec::string().public()),
//! )?;
//! let store = Arc::new(InMemoryStore::with_tables([TableDef::new("users").primary_key(["id"]).auto("id")]));
//!
//! let mut user = users.one(store.clone(), Some(record));
//! user.store().await?;
//!
//! let mut all = users.many(store, Vec::new());
//! all.load_query(Filter::new().like("name", "a%")).await?;
//! ```

mod identity;
mod many;
mod none;
mod one;
mod record;

use std::sync::Arc;

use serde_json::Value;

use crate::error::ModelError;
use crate::schema::{Schema, SchemaInfo};
use crate::store::Store;
use crate::Record;

pub use identity::{assert_identity, key_tuples};
pub use many::ManyModel;
pub use none::NoneModel;
pub use one::OneModel;
pub use record::RecordCore;

struct ModelTypeInner {
    collection: String,
    schema: Schema,
    info: SchemaInfo,
}

/// A model family: collection name, schema, and the field sets resolved from it.
///
/// Cheap to clone; clones share the resolved schema.
#[derive(Clone)]
pub struct ModelType {
    inner: Arc<ModelTypeInner>,
}

impl std::fmt::Debug for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelType")
            .field("collection", &self.inner.collection)
            .field("keys", &self.inner.info.keys)
            .field("autos", &self.inner.info.autos)
            .finish()
    }
}

impl ModelType {
    /// Resolve `schema` for `collection`. Fails with
    /// [`ModelError::InvalidSchema`] when the schema has no key field or no
    /// field a caller can store.
    pub fn new(collection: impl Into<String>, schema: Schema) -> Result<Self, ModelError> {
        let collection = collection.into();
        let info = SchemaInfo::resolve(&collection, &schema)?;
        Ok(Self {
            inner: Arc::new(ModelTypeInner {
                collection,
                schema,
                info,
            }),
        })
    }

    pub fn collection(&self) -> &str {
        &self.inner.collection
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    pub fn info(&self) -> &SchemaInfo {
        &self.inner.info
    }

    pub fn keys(&self) -> &[String] {
        &self.inner.info.keys
    }

    pub fn autos(&self) -> &[String] {
        &self.inner.info.autos
    }

    /// Collection handle over `contents` (defaults filled in).
    pub fn many(&self, store: Arc<dyn Store>, contents: Vec<Record>) -> ManyModel {
        ManyModel::new(self.clone(), store, contents)
    }

    /// Singleton handle, optionally seeded with a caller record.
    pub fn one(&self, store: Arc<dyn Store>, content: Option<Record>) -> OneModel {
        OneModel::new(self.clone(), store, content)
    }

    /// Absence handle.
    pub fn none(&self, store: Arc<dyn Store>) -> NoneModel {
        NoneModel::new(self.clone(), store)
    }
}

/// Identifier accepted by [`OneModel::load_by_id`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordId {
    /// A bare value; only valid when the schema has a single key field.
    Scalar(Value),
    /// Values for every key field.
    Keys(Record),
}

impl From<Value> for RecordId {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(keys) => RecordId::Keys(keys),
            other => RecordId::Scalar(other),
        }
    }
}

impl From<Record> for RecordId {
    fn from(keys: Record) -> Self {
        RecordId::Keys(keys)
    }
}

impl From<i32> for RecordId {
    fn from(id: i32) -> Self {
        RecordId::Scalar(Value::from(id))
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        RecordId::Scalar(Value::from(id))
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        RecordId::Scalar(Value::from(id))
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        RecordId::Scalar(Value::from(id))
    }
}
