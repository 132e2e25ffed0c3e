//! Stores - the storage boundary models load from and persist to.
//!
//! A [`Store`] executes filtered queries and bulk mutations against named
//! collections and returns raw records. Implementations map their native
//! failures onto [`StoreErrorKind`](crate::StoreErrorKind) so models can
//! reclassify them (uniqueness, reference, other constraint, other).
//!
//! ## Example
//!
//! ```ignore
//! use typed_model::{InMemoryStore, TableDef};
//!
//! let store = InMemoryStore::with_tables([
//!     TableDef::new("users").primary_key(["id"]).auto("id"),
//!     TableDef::new("comment")
//!         .primary_key(["id", "userid"])
//!         .auto("id")
//!         .references("userid", "users", "id"),
//! ]);
//! ```

mod in_memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;
use crate::filter::{Filter, Query};
use crate::Record;

pub use in_memory::{ForeignKey, InMemoryStore, TableDef};

pub type StoreResult<T> = Result<T, StoreError>;

/// Abstract storage for schema-driven models.
#[async_trait]
pub trait Store: Send + Sync {
    /// Records of `collection` matching the query.
    async fn find(&self, collection: &str, query: &Query) -> StoreResult<Vec<Record>>;

    /// Records of `collection` matching a filter over key fields only.
    async fn find_by_ids(
        &self,
        collection: &str,
        filter: &Filter,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> StoreResult<Vec<Record>>;

    /// Insert `records`, returning for each one (in order) the values the store
    /// generated for the `returning` fields.
    async fn insert(
        &self,
        collection: &str,
        records: &[Record],
        returning: &[String],
    ) -> StoreResult<Vec<Record>>;

    /// Overwrite the fields of `record` on the row matching `filter`.
    async fn update_one(&self, collection: &str, filter: &Filter, record: &Record) -> StoreResult<()>;

    /// Delete every row matching `filter`.
    async fn remove(&self, collection: &str, filter: &Filter) -> StoreResult<()>;

    /// Convert an external identifier representation into the store's own.
    fn to_id(&self, external: &Value) -> Value;

    /// Convert a stored identifier into its external representation.
    fn from_id(&self, internal: &Value) -> Value;
}
