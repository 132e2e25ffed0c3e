//! NoneModel - asserts that no record matches.

use std::sync::Arc;

use super::{ModelType, RecordCore};
use crate::error::ModelError;
use crate::filter::Filter;
use crate::store::Store;

/// Absence handle. Never holds records; its load succeeds only when nothing
/// matches, and fails with [`ModelError::DoesExist`] otherwise. Like every
/// handle it loads at most once.
pub struct NoneModel {
    core: RecordCore,
}

impl NoneModel {
    pub fn new(model: ModelType, store: Arc<dyn Store>) -> Self {
        Self {
            core: RecordCore::new(store, model),
        }
    }

    pub fn model(&self) -> &ModelType {
        self.core.model()
    }

    #[tracing::instrument(level = "debug", skip(self, filter), fields(collection = self.core.collection()))]
    pub async fn load_none(&mut self, filter: Filter) -> Result<&mut Self, ModelError> {
        self.core.fetch_none(&filter).await?;
        Ok(self)
    }

    /// Like [`load_none`](Self::load_none), but `filter` must name exactly the
    /// key fields.
    #[tracing::instrument(level = "debug", skip(self, filter), fields(collection = self.core.collection()))]
    pub async fn load_none_by_keys(&mut self, filter: Filter) -> Result<&mut Self, ModelError> {
        self.core.fetch_none_by_keys(&filter).await?;
        Ok(self)
    }
}
