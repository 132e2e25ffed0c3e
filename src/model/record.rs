//! RecordCore - validation, identity tracking, and storage translation shared
//! by every multiplicity handle.

use std::sync::Arc;

use futures_util::future::try_join_all;
use serde_json::{json, Value};
use tokio::sync::OnceCell;

use super::identity::{assert_identity, key_tuples};
use super::ModelType;
use crate::error::{ModelError, StoreError};
use crate::filter::{Condition, Filter, Query};
use crate::schema::{fill_defaults, DeriveContext, Derivation, FieldType};
use crate::store::Store;
use crate::Record;

/// State a handle keeps about its buffer: the store, the model family, whether
/// the buffer came from a load, the identity snapshot, and the derived cache.
///
/// The derived cache is write-once: after the first [`RecordCore::with_derived`]
/// call its values are reused even if the records are mutated afterwards.
/// Callers must finish mutating before asking for derived values. The cache is
/// dropped only when the buffer is replaced wholesale (load, store).
pub struct RecordCore {
    store: Arc<dyn Store>,
    model: ModelType,
    from_db: bool,
    loaded_keys: Option<Vec<Vec<Value>>>,
    derived: OnceCell<Vec<Record>>,
}

impl RecordCore {
    pub fn new(store: Arc<dyn Store>, model: ModelType) -> Self {
        Self {
            store,
            model,
            from_db: false,
            loaded_keys: None,
            derived: OnceCell::new(),
        }
    }

    pub fn model(&self) -> &ModelType {
        &self.model
    }

    pub fn collection(&self) -> &str {
        self.model.collection()
    }

    pub fn keys(&self) -> &[String] {
        &self.model.info().keys
    }

    /// True once a load-family call has consumed a query result.
    pub fn is_loaded(&self) -> bool {
        self.from_db
    }

    pub fn loaded_keys(&self) -> Option<&[Vec<Value>]> {
        self.loaded_keys.as_deref()
    }

    pub(crate) fn reset_derived(&mut self) {
        self.derived = OnceCell::new();
    }

    pub fn fill_defaults(&self, records: Vec<Record>) -> Vec<Record> {
        records
            .iter()
            .map(|record| fill_defaults(self.model.schema(), record))
            .collect()
    }

    /// Refuse a second load before any query is issued.
    pub fn ensure_unloaded(&self) -> Result<(), ModelError> {
        if self.from_db {
            return Err(ModelError::AlreadyLoaded {
                collection: self.collection().to_string(),
            });
        }
        Ok(())
    }

    /// Consume a query result: marshal identifiers and capture the identity
    /// snapshot.
    pub fn load(&mut self, rows: Vec<Record>) -> Result<Vec<Record>, ModelError> {
        self.ensure_unloaded()?;
        self.from_db = true;
        let contents: Vec<Record> = rows.into_iter().map(|row| self.convert_ids(row)).collect();
        self.loaded_keys = Some(key_tuples(self.keys(), &contents));
        self.reset_derived();
        tracing::debug!(collection = self.collection(), count = contents.len(), "loaded");
        Ok(contents)
    }

    fn convert_ids(&self, mut record: Record) -> Record {
        for (name, spec) in self.model.schema().fields() {
            let Some(value) = record.get_mut(name) else {
                continue;
            };
            let converted = match (&spec.ty, &*value) {
                (_, Value::Null) => None,
                (FieldType::Id, id) => Some(self.store.from_id(id)),
                (FieldType::Array(inner), Value::Array(items)) if matches!(**inner, FieldType::Id) => {
                    Some(Value::Array(items.iter().map(|id| self.store.from_id(id)).collect()))
                }
                _ => None,
            };
            if let Some(converted) = converted {
                *value = converted;
            }
        }
        record
    }

    fn marshal_id(&self, value: &Value) -> Value {
        match value {
            Value::Array(items) => Value::Array(items.iter().map(|id| self.store.to_id(id)).collect()),
            other => self.store.to_id(other),
        }
    }

    /// True if the filter names exactly the key fields, no more and no fewer.
    pub fn has_valid_keys(&self, filter: &Filter) -> bool {
        filter.len() == self.keys().len() && filter.fields().all(|f| self.keys().iter().any(|k| k == f))
    }

    pub fn require_keys(&self, filter: &Filter) -> Result<(), ModelError> {
        if self.has_valid_keys(filter) {
            return Ok(());
        }
        Err(ModelError::NotAllKeysGiven {
            collection: self.collection().to_string(),
            keys: self.keys().to_vec(),
            given: filter.to_json(),
        })
    }

    /// Copy of `filter` with identifier key values passed through `to_id`.
    fn marshal_key_filter(&self, filter: &Filter) -> Filter {
        let mut out = filter.clone();
        for key in self.keys() {
            let is_id = matches!(self.model.schema().get(key).map(|s| &s.ty), Some(FieldType::Id));
            if !is_id {
                continue;
            }
            if let Some(condition) = out.get_mut(key) {
                *condition = match &*condition {
                    Condition::Eq(value) => Condition::Eq(self.marshal_id(value)),
                    Condition::In(values) => Condition::In(values.iter().map(|v| self.store.to_id(v)).collect()),
                    other => other.clone(),
                };
            }
        }
        out
    }

    /// Run a general query without touching the buffer state.
    pub async fn query(&self, query: &Query) -> Result<Vec<Record>, ModelError> {
        self.store
            .find(self.collection(), query)
            .await
            .map_err(|e| ModelError::from_store(self.collection(), "find", e))
    }

    /// Run a key lookup without touching the buffer state. The filter must
    /// name exactly the key fields.
    pub async fn query_by_keys(
        &self,
        filter: &Filter,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<Record>, ModelError> {
        self.require_keys(filter)?;
        let filter = self.marshal_key_filter(filter);
        self.store
            .find_by_ids(self.collection(), &filter, limit, offset)
            .await
            .map_err(|e| ModelError::from_store(self.collection(), "find by ids", e))
    }

    /// Run a general query and load its result.
    pub async fn fetch(&mut self, query: &Query) -> Result<Vec<Record>, ModelError> {
        self.ensure_unloaded()?;
        let rows = self.query(query).await?;
        self.load(rows)
    }

    /// Run a key lookup and load its result.
    pub async fn fetch_by_keys(
        &mut self,
        filter: &Filter,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<Record>, ModelError> {
        self.require_keys(filter)?;
        self.ensure_unloaded()?;
        let rows = self.query_by_keys(filter, limit, offset).await?;
        self.load(rows)
    }

    /// Absence-expecting load: fails with [`ModelError::DoesExist`] if
    /// anything matches `filter`. Counts as this handle's one load.
    pub async fn fetch_none(&mut self, filter: &Filter) -> Result<(), ModelError> {
        self.ensure_unloaded()?;
        let rows = self.query(&Query::new(filter.clone()).limit(2)).await?;
        self.expect_none(&rows, filter)?;
        self.load(rows)?;
        Ok(())
    }

    /// Key-based [`fetch_none`](Self::fetch_none).
    pub async fn fetch_none_by_keys(&mut self, filter: &Filter) -> Result<(), ModelError> {
        self.require_keys(filter)?;
        self.ensure_unloaded()?;
        let rows = self.query_by_keys(filter, Some(2), None).await?;
        self.expect_none(&rows, filter)?;
        self.load(rows)?;
        Ok(())
    }

    /// The single row of a uniqueness-expecting load.
    pub fn exactly_one(&self, mut rows: Vec<Record>, filter: &Filter) -> Result<Record, ModelError> {
        match rows.len() {
            0 => Err(ModelError::NotFound {
                collection: self.collection().to_string(),
                filter: filter.to_json(),
            }),
            1 => Ok(rows.remove(0)),
            _ => Err(ModelError::NotUnique {
                collection: self.collection().to_string(),
                detail: json!({ "filter": filter, "content": rows[0], "something": rows[1] }),
            }),
        }
    }

    /// Succeeds only for an empty result of an absence-expecting load.
    pub fn expect_none(&self, rows: &[Record], filter: &Filter) -> Result<(), ModelError> {
        if rows.is_empty() {
            return Ok(());
        }
        Err(ModelError::DoesExist {
            collection: self.collection().to_string(),
            detail: json!({ "shouldNotExist": filter, "butDoes": rows }),
        })
    }

    /// Validate records against the schema, in place.
    ///
    /// Auto fields are skipped and derived values stripped. Absent optional
    /// fields become explicit nulls.
    pub fn check_types(&self, records: &mut [Record]) -> Result<(), ModelError> {
        for record in records.iter_mut() {
            for (name, spec) in self.model.schema().fields() {
                if spec.is_auto() {
                    continue;
                }
                if spec.is_derived() {
                    record.remove(name);
                    continue;
                }
                let mismatch = match record.get(name).filter(|v| !v.is_null()) {
                    Some(value) => !spec.ty.check(value),
                    None => !spec.optional,
                };
                if mismatch {
                    return Err(ModelError::TypeMismatch {
                        collection: self.collection().to_string(),
                        field: name.to_string(),
                        value: record.get(name).cloned().unwrap_or(Value::Null),
                        record: record.clone(),
                    });
                }
                if record.get(name).map(Value::is_null).unwrap_or(true) {
                    record.insert(name.to_string(), Value::Null);
                }
            }
        }
        Ok(())
    }

    /// Filter selecting `record` by its key fields.
    pub fn key_filter(&self, record: &Record) -> Filter {
        self.keys().iter().fold(Filter::new(), |filter, key| {
            filter.eq(key.clone(), record.get(key).cloned().unwrap_or(Value::Null))
        })
    }

    /// Filter `key IN (values of records)` for every key field.
    pub fn keys_in_filter(&self, records: &[Record]) -> Filter {
        self.keys().iter().fold(Filter::new(), |filter, key| {
            let values = records
                .iter()
                .map(|record| record.get(key).cloned().unwrap_or(Value::Null));
            filter.one_of(key.clone(), values)
        })
    }

    fn without_autos(&self, record: &Record) -> Record {
        let mut out = record.clone();
        for auto in &self.model.info().autos {
            out.remove(auto);
        }
        out
    }

    /// Validate and insert `records`, merging generated auto values back in
    /// position order. Storage failures are turned into model errors by
    /// `classify`.
    pub async fn store<F>(&mut self, records: &mut Vec<Record>, classify: F) -> Result<(), ModelError>
    where
        F: FnOnce(StoreError, &[Record]) -> ModelError,
    {
        if records.is_empty() {
            return Ok(());
        }
        self.check_types(records)?;

        let generated = match self
            .store
            .insert(self.collection(), records, &self.model.info().autos)
            .await
        {
            Ok(generated) => generated,
            Err(err) => {
                tracing::warn!(collection = self.collection(), error = %err, "store failed");
                return Err(classify(err, records.as_slice()));
            }
        };
        for (record, autos) in records.iter_mut().zip(generated) {
            record.extend(autos);
        }

        self.loaded_keys = Some(key_tuples(self.keys(), records));
        self.reset_derived();
        tracing::debug!(collection = self.collection(), count = records.len(), "stored");
        Ok(())
    }

    /// Persist `records` after checking they still carry the loaded identities.
    ///
    /// Every record is written by its own `update_one`; with more than one
    /// record the writes are in flight concurrently and the first failure
    /// fails the call. Writes that already succeeded are not rolled back.
    pub async fn update(&self, records: &mut [Record]) -> Result<(), ModelError> {
        let current = key_tuples(self.keys(), records);
        assert_identity(self.collection(), self.loaded_keys(), &current)?;
        self.check_types(records)?;

        let collection = self.collection();
        let store = &self.store;
        let writes = records.iter().map(|record| {
            let filter = self.key_filter(record);
            let payload = self.without_autos(record);
            async move { store.update_one(collection, &filter, &payload).await }
        });
        try_join_all(writes)
            .await
            .map_err(|e| ModelError::from_store(collection, "update", e))?;
        tracing::debug!(collection, count = records.len(), "updated");
        Ok(())
    }

    /// Remove every row matching `filter`.
    pub async fn remove<F>(&self, filter: &Filter, classify: F) -> Result<(), ModelError>
    where
        F: FnOnce(StoreError) -> ModelError,
    {
        match self.store.remove(self.collection(), filter).await {
            Ok(()) => {
                tracing::debug!(collection = self.collection(), filter = %filter, "removed");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(collection = self.collection(), error = %err, "remove failed");
                Err(classify(err))
            }
        }
    }

    /// Records with every derived field computed. Memoized; see the type docs.
    pub async fn with_derived(&self, records: &[Record]) -> Result<Vec<Record>, ModelError> {
        let computed = self
            .derived
            .get_or_try_init(|| self.compute_derived(records))
            .await?;
        Ok(computed.clone())
    }

    async fn compute_derived(&self, records: &[Record]) -> Result<Vec<Record>, ModelError> {
        let derivations: Vec<(&str, &Derivation)> = self
            .model
            .schema()
            .fields()
            .filter_map(|(name, spec)| spec.derivation().map(|d| (name, d)))
            .collect();
        let ctx = DeriveContext::new(self.store.clone(), self.model.clone());

        let per_record = records.iter().map(|record| {
            let fields = derivations.iter().map(|(name, derivation)| {
                let pending = derivation.evaluate(record, ctx.clone());
                async move { pending.await.map(|value| (name.to_string(), value)) }
            });
            async move {
                let values = try_join_all(fields).await?;
                let mut out = record.clone();
                out.extend(values);
                Ok::<Record, ModelError>(out)
            }
        });
        try_join_all(per_record).await
    }

    /// Public projection of the records: public, non-null fields under their
    /// mapped names.
    pub async fn public(&self, records: &[Record]) -> Result<Vec<Record>, ModelError> {
        let derived = self.with_derived(records).await?;
        let schema = self.model.schema();
        Ok(derived
            .iter()
            .map(|record| {
                schema
                    .fields()
                    .filter(|(_, spec)| spec.public)
                    .filter_map(|(name, spec)| {
                        record
                            .get(name)
                            .filter(|v| !v.is_null())
                            .map(|v| (spec.public_name(name).to_string(), v.clone()))
                    })
                    .collect()
            })
            .collect())
    }
}
