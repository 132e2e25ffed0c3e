mod error;
mod filter;
mod model;
mod schema;
mod store;

/// A record: field name to JSON value. Null and missing both mean "absent".
pub type Record = serde_json::Map<String, serde_json::Value>;

pub use error::{ModelError, StoreError, StoreErrorKind};
pub use filter::{Condition, Direction, Filter, FilterError, Order, Query};
pub use model::{
    assert_identity, key_tuples, ManyModel, ModelType, NoneModel, OneModel, RecordCore, RecordId,
};
pub use schema::{
    fill_defaults, DefaultValue, DeriveContext, DeriveFuture, Derivation, FieldSource, FieldSpec,
    FieldType, Schema, SchemaInfo,
};
pub use store::{ForeignKey, InMemoryStore, Store, StoreResult, TableDef};

// Re-export so stores can be implemented without a direct dependency.
pub use async_trait::async_trait;
