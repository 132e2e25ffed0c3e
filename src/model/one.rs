//! OneModel - a handle over exactly one record.

use std::sync::Arc;

use serde_json::{json, Value};

use super::{ManyModel, ModelType, RecordId};
use crate::error::{ModelError, StoreErrorKind};
use crate::filter::Filter;
use crate::store::Store;
use crate::Record;

/// Singleton handle. Wraps a [`ManyModel`] whose buffer holds one record once
/// loaded or seeded.
pub struct OneModel {
    many: ManyModel,
}

impl OneModel {
    pub fn new(model: ModelType, store: Arc<dyn Store>, content: Option<Record>) -> Self {
        Self {
            many: ManyModel::new(model, store, content.into_iter().collect()),
        }
    }

    pub fn model(&self) -> &ModelType {
        self.many.model()
    }

    /// The record. Fails with [`ModelError::NotUnique`] until the handle holds
    /// exactly one.
    pub fn content(&self) -> Result<&Record, ModelError> {
        self.many.content()
    }

    pub fn content_mut(&mut self) -> Result<&mut Record, ModelError> {
        self.many.content_mut()
    }

    pub fn set_content(&mut self, content: Record) {
        self.many.set_content(content);
    }

    /// Overwrite one field of the record.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Result<&mut Self, ModelError> {
        self.many.content_mut()?.insert(field.into(), value.into());
        Ok(self)
    }

    pub fn into_content(self) -> Option<Record> {
        self.many.into_contents().into_iter().next()
    }

    /// Validate the record in place.
    pub fn check_types(&mut self) -> Result<(), ModelError> {
        self.many.check_types()
    }

    /// Load the single record matching `filter`.
    pub async fn load(&mut self, filter: Filter) -> Result<&mut Self, ModelError> {
        self.many.load_one(filter).await?;
        Ok(self)
    }

    /// Load the record whose key fields equal `filter`.
    pub async fn load_by_keys(&mut self, filter: Filter) -> Result<&mut Self, ModelError> {
        self.many.load_one_by_keys(filter).await?;
        Ok(self)
    }

    /// Assert no record matches `filter`. The handle stays empty.
    pub async fn load_none(&mut self, filter: Filter) -> Result<&mut Self, ModelError> {
        self.many.load_none(filter).await?;
        Ok(self)
    }

    pub async fn load_none_by_keys(&mut self, filter: Filter) -> Result<&mut Self, ModelError> {
        self.many.load_none_by_keys(filter).await?;
        Ok(self)
    }

    /// Load by identifier. A scalar is accepted only when the schema has a
    /// single key field.
    pub async fn load_by_id(&mut self, id: impl Into<RecordId>) -> Result<&mut Self, ModelError> {
        let filter = self.id_filter(id.into())?;
        self.load_by_keys(filter).await
    }

    fn id_filter(&self, id: RecordId) -> Result<Filter, ModelError> {
        let keys = self.model().keys();
        match id {
            RecordId::Scalar(value) if keys.len() == 1 => Ok(Filter::new().eq(keys[0].clone(), value)),
            RecordId::Scalar(value) => Err(ModelError::NotAllKeysGiven {
                collection: self.model().collection().to_string(),
                keys: keys.to_vec(),
                given: value,
            }),
            RecordId::Keys(values) => Ok(values
                .into_iter()
                .fold(Filter::new(), |filter, (field, value)| filter.eq(field, value))),
        }
    }

    /// Insert the record. An existing identity fails with
    /// [`ModelError::DoesExist`]; an empty handle with
    /// [`ModelError::NotUnique`].
    #[tracing::instrument(level = "debug", skip(self), fields(collection = self.model().collection()))]
    pub async fn store(&mut self) -> Result<&mut Self, ModelError> {
        self.many.content()?;
        let collection = self.model().collection().to_string();
        let many = &mut self.many;
        many.core
            .store(&mut many.contents, |err, records| match err.kind {
                StoreErrorKind::UniqueViolation => ModelError::DoesExist {
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

    pub async fn update(&mut self) -> Result<&mut Self, ModelError> {
        self.many.content()?;
        self.many.update().await?;
        Ok(self)
    }

    /// Delete the record by its key fields.
    #[tracing::instrument(level = "debug", skip(self), fields(collection = self.model().collection()))]
    pub async fn delete(&mut self) -> Result<&mut Self, ModelError> {
        let record = self.many.content()?;
        let core = &self.many.core;
        let filter = core.key_filter(record);
        core.remove(&filter, |err| match err.kind {
            StoreErrorKind::ReferenceViolation => ModelError::IsReference {
                collection: core.collection().to_string(),
                records: vec![record.clone()],
            },
            _ => ModelError::from_store(core.collection(), "delete", err),
        })
        .await?;
        Ok(self)
    }

    /// Public projection of the record.
    pub async fn get_public(&self) -> Result<Record, ModelError> {
        self.many.content()?;
        let mut public = self.many.get_public().await?;
        Ok(public.remove(0))
    }

    /// The record with its derived fields computed.
    pub async fn get_with_derived(&self) -> Result<Record, ModelError> {
        self.many.content()?;
        let mut derived = self.many.get_with_derived().await?;
        Ok(derived.remove(0))
    }
}
