//! Identity tracking between load and update.

use serde_json::{json, Value};

use crate::error::ModelError;
use crate::Record;

/// Key tuple of every record, in order. Missing key values read as null.
pub fn key_tuples(keys: &[String], records: &[Record]) -> Vec<Vec<Value>> {
    records
        .iter()
        .map(|record| {
            keys.iter()
                .map(|key| record.get(key).cloned().unwrap_or(Value::Null))
                .collect()
        })
        .collect()
}

/// Assert that `current` presents exactly the identities captured at load (or
/// store) time: same count, same key tuples, same order.
///
/// A mismatch means the caller corrupted the buffer's identity, not that the
/// data is bad, so it is reported as [`ModelError::Unexpected`].
pub fn assert_identity(
    collection: &str,
    loaded: Option<&[Vec<Value>]>,
    current: &[Vec<Value>],
) -> Result<(), ModelError> {
    let Some(loaded) = loaded else {
        tracing::warn!(collection, "update on a model that was never loaded or stored");
        return Err(ModelError::unexpected(
            collection,
            "tried to update a model that was never loaded or stored",
        ));
    };
    if loaded == current {
        return Ok(());
    }
    tracing::warn!(
        collection,
        loaded = loaded.len(),
        current = current.len(),
        "identity mismatch on update"
    );
    Err(ModelError::unexpected(
        collection,
        format!(
            "tried to update but ids did not match loaded ids. loaded keys: {} new keys: {}",
            json!(loaded),
            json!(current)
        ),
    ))
}
