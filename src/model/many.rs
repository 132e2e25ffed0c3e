//! ManyModel - a handle over zero or more records of one collection.

use std::sync::Arc;

use serde_json::json;

use super::{ModelType, RecordCore};
use crate::error::{ModelError, StoreErrorKind};
use crate::filter::{Filter, Order, Query};
use crate::store::Store;
use crate::Record;

/// Collection handle. Holds an ordered buffer of records and the
/// [`RecordCore`] that loads, validates and persists them.
///
/// A handle is loaded at most once; create a new one to query again.
pub struct ManyModel {
    pub(crate) core: RecordCore,
    pub(crate) contents: Vec<Record>,
    pub(crate) is_one: bool,
}

impl ManyModel {
    /// Handle over caller-supplied records, defaults filled in.
    pub fn new(model: ModelType, store: Arc<dyn Store>, contents: Vec<Record>) -> Self {
        let core = RecordCore::new(store, model);
        let contents = core.fill_defaults(contents);
        let is_one = contents.len() == 1;
        Self {
            core,
            contents,
            is_one,
        }
    }

    pub fn model(&self) -> &ModelType {
        self.core.model()
    }

    pub fn core(&self) -> &RecordCore {
        &self.core
    }

    pub fn contents(&self) -> &[Record] {
        &self.contents
    }

    /// Mutable access to the buffer. Mutating key fields of loaded records
    /// makes the next [`update`](Self::update) fail.
    pub fn contents_mut(&mut self) -> &mut Vec<Record> {
        &mut self.contents
    }

    pub fn into_contents(self) -> Vec<Record> {
        self.contents
    }

    /// Replace the buffer wholesale. Defaults are filled and derived values
    /// are recomputed on next request.
    pub fn set_contents(&mut self, contents: Vec<Record>) {
        self.contents = self.core.fill_defaults(contents);
        self.is_one = self.contents.len() == 1;
        self.core.reset_derived();
    }

    /// The single record, if this handle is known to hold exactly one.
    pub fn content(&self) -> Result<&Record, ModelError> {
        self.ensure_one()?;
        Ok(&self.contents[0])
    }

    pub fn content_mut(&mut self) -> Result<&mut Record, ModelError> {
        self.ensure_one()?;
        Ok(&mut self.contents[0])
    }

    pub fn set_content(&mut self, content: Record) {
        self.set_contents(vec![content]);
    }

    fn ensure_one(&self) -> Result<(), ModelError> {
        if self.is_one && self.contents.len() == 1 {
            return Ok(());
        }
        Err(ModelError::NotUnique {
            collection: self.core.collection().to_string(),
            detail: json!({ "reason": "handle does not hold exactly one record", "content": self.contents }),
        })
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    /// Validate the buffer in place; see [`RecordCore::check_types`].
    pub fn check_types(&mut self) -> Result<(), ModelError> {
        self.core.check_types(&mut self.contents)
    }

    /// Load every record matching `filter`, ordered and paged.
    pub async fn load(
        &mut self,
        filter: Filter,
        limit: Option<usize>,
        offset: Option<usize>,
        order: Vec<Order>,
    ) -> Result<&mut Self, ModelError> {
        let query = Query {
            filter,
            limit,
            offset,
            order,
        };
        self.load_query(query).await
    }

    #[tracing::instrument(level = "debug", skip(self, query), fields(collection = self.core.collection()))]
    pub async fn load_query(&mut self, query: impl Into<Query>) -> Result<&mut Self, ModelError> {
        let query = query.into();
        self.contents = self.core.fetch(&query).await?;
        self.is_one = false;
        Ok(self)
    }

    /// Load the single record matching `filter`.
    ///
    /// Fails with [`ModelError::NotFound`] on no match and
    /// [`ModelError::NotUnique`] on more than one.
    #[tracing::instrument(level = "debug", skip(self, filter), fields(collection = self.core.collection()))]
    pub async fn load_one(&mut self, filter: Filter) -> Result<&mut Self, ModelError> {
        self.core.ensure_unloaded()?;
        let rows = self.core.query(&Query::new(filter.clone()).limit(2)).await?;
        let row = self.core.exactly_one(rows, &filter)?;
        self.contents = self.core.load(vec![row])?;
        self.is_one = true;
        Ok(self)
    }

    /// Assert no record matches `filter`. The buffer is left untouched, but
    /// the handle counts as loaded afterwards.
    #[tracing::instrument(level = "debug", skip(self, filter), fields(collection = self.core.collection()))]
    pub async fn load_none(&mut self, filter: Filter) -> Result<&mut Self, ModelError> {
        self.core.fetch_none(&filter).await?;
        Ok(self)
    }

    /// Load by key values. `filter` must name exactly the key fields, with
    /// equality or `IN` conditions.
    #[tracing::instrument(level = "debug", skip(self, filter), fields(collection = self.core.collection()))]
    pub async fn load_by_keys(
        &mut self,
        filter: Filter,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<&mut Self, ModelError> {
        self.contents = self.core.fetch_by_keys(&filter, limit, offset).await?;
        self.is_one = false;
        Ok(self)
    }

    #[tracing::instrument(level = "debug", skip(self, filter), fields(collection = self.core.collection()))]
    pub async fn load_one_by_keys(&mut self, filter: Filter) -> Result<&mut Self, ModelError> {
        self.core.require_keys(&filter)?;
        self.core.ensure_unloaded()?;
        let rows = self.core.query_by_keys(&filter, Some(2), None).await?;
        let row = self.core.exactly_one(rows, &filter)?;
        self.contents = self.core.load(vec![row])?;
        self.is_one = true;
        Ok(self)
    }

    #[tracing::instrument(level = "debug", skip(self, filter), fields(collection = self.core.collection()))]
    pub async fn load_none_by_keys(&mut self, filter: Filter) -> Result<&mut Self, ModelError> {
        self.core.fetch_none_by_keys(&filter).await?;
        Ok(self)
    }

    /// Insert the buffer. Generated auto values are merged back into the
    /// records.
    #[tracing::instrument(level = "debug", skip(self), fields(collection = self.core.collection()))]
    pub async fn store(&mut self) -> Result<&mut Self, ModelError> {
        let collection = self.core.collection().to_string();
        self.core
            .store(&mut self.contents, |err, records| match err.kind {
                StoreErrorKind::UniqueViolation => ModelError::NotUnique {
                    collection,
                    detail: json!({ "triedToStore": records }),
                },
                StoreErrorKind::ReferenceViolation | StoreErrorKind::ConstraintViolation => {
                    ModelError::ConstraintFailed {
                        collection,
                        records: records.to_vec(),
                    }
                }
                StoreErrorKind::Other => ModelError::from_store(&collection, "store", err),
            })
            .await?;
        Ok(self)
    }

    /// Persist in-place changes to loaded (or stored) records. Key fields,
    /// record count and order must be unchanged since the load.
    #[tracing::instrument(level = "debug", skip(self), fields(collection = self.core.collection()))]
    pub async fn update(&mut self) -> Result<&mut Self, ModelError> {
        self.core.update(&mut self.contents).await?;
        Ok(self)
    }

    /// Delete every buffered record from the store in one call.
    ///
    /// With a multi-field key the filter is one `IN` set per key field, so
    /// rows combining key values of different buffered records are removed
    /// too.
    #[tracing::instrument(level = "debug", skip(self), fields(collection = self.core.collection()))]
    pub async fn delete_all(&mut self) -> Result<&mut Self, ModelError> {
        if self.contents.is_empty() {
            return Ok(self);
        }
        let filter = self.core.keys_in_filter(&self.contents);
        let collection = self.core.collection();
        let contents = &self.contents;
        self.core
            .remove(&filter, |err| match err.kind {
                StoreErrorKind::ReferenceViolation => ModelError::IsReference {
                    collection: collection.to_string(),
                    records: contents.clone(),
                },
                _ => ModelError::from_store(collection, "delete", err),
            })
            .await?;
        Ok(self)
    }

    /// Public projection of every record, derived values included.
    pub async fn get_public(&self) -> Result<Vec<Record>, ModelError> {
        self.core.public(&self.contents).await
    }

    /// Every record with its derived fields computed.
    pub async fn get_with_derived(&self) -> Result<Vec<Record>, ModelError> {
        self.core.with_derived(&self.contents).await
    }
}
