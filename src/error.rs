use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Record;

/// Why a storage call was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreErrorKind {
    /// A primary key or unique constraint would be violated.
    UniqueViolation,
    /// Rows are still referenced by other rows.
    ReferenceViolation,
    /// Any other constraint, e.g. a dangling foreign key on insert.
    ConstraintViolation,
    /// Everything else (unknown collection, poisoned lock, driver failure).
    Other,
}

/// Error returned by a [`Store`](crate::Store) implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unique(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::UniqueViolation, message)
    }

    pub fn reference(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::ReferenceViolation, message)
    }

    pub fn constraint(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::ConstraintViolation, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Other, message)
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            StoreErrorKind::UniqueViolation => "unique violation",
            StoreErrorKind::ReferenceViolation => "reference violation",
            StoreErrorKind::ConstraintViolation => "constraint violation",
            StoreErrorKind::Other => "store error",
        };
        write!(f, "{}: {}", kind, self.message)
    }
}

impl Error for StoreError {}

/// Error type for every model operation.
///
/// Validation and identity errors are raised before any storage call is made.
/// Storage failures are reclassified into this taxonomy exactly once, at the
/// handle that issued the call. Nothing here is retried.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// A uniqueness-expecting load matched zero records.
    NotFound { collection: String, filter: Value },
    /// A uniqueness-expecting load matched two or more records, or a
    /// single-record accessor was used on a buffer that does not hold exactly one.
    NotUnique { collection: String, detail: Value },
    /// An absence-expecting load matched a record, or a single record could
    /// not be stored because its identity already exists.
    DoesExist { collection: String, detail: Value },
    /// A delete was rejected because other data still references the records.
    IsReference {
        collection: String,
        records: Vec<Record>,
    },
    /// A store violated a non-uniqueness storage constraint.
    ConstraintFailed {
        collection: String,
        records: Vec<Record>,
    },
    /// A record failed schema validation.
    TypeMismatch {
        collection: String,
        field: String,
        value: Value,
        record: Record,
    },
    /// A key-based operation did not name exactly the key fields.
    NotAllKeysGiven {
        collection: String,
        keys: Vec<String>,
        given: Value,
    },
    /// Any other storage failure, or corrupted identity on update. Fatal.
    Unexpected {
        collection: String,
        context: String,
        source: Option<StoreError>,
    },
    /// The schema cannot back a model (no key, or nothing a caller can store).
    InvalidSchema { collection: String, reason: String },
    /// A load was attempted on a handle that has already been loaded.
    AlreadyLoaded { collection: String },
}

impl ModelError {
    pub(crate) fn unexpected(collection: &str, context: impl Into<String>) -> Self {
        ModelError::Unexpected {
            collection: collection.to_string(),
            context: context.into(),
            source: None,
        }
    }

    pub(crate) fn from_store(collection: &str, context: &str, err: StoreError) -> Self {
        ModelError::Unexpected {
            collection: collection.to_string(),
            context: context.to_string(),
            source: Some(err),
        }
    }

    /// The collection the failing operation ran against.
    pub fn collection(&self) -> &str {
        match self {
            ModelError::NotFound { collection, .. }
            | ModelError::NotUnique { collection, .. }
            | ModelError::DoesExist { collection, .. }
            | ModelError::IsReference { collection, .. }
            | ModelError::ConstraintFailed { collection, .. }
            | ModelError::TypeMismatch { collection, .. }
            | ModelError::NotAllKeysGiven { collection, .. }
            | ModelError::Unexpected { collection, .. }
            | ModelError::InvalidSchema { collection, .. }
            | ModelError::AlreadyLoaded { collection } => collection,
        }
    }
}

fn records_json(records: &[Record]) -> String {
    serde_json::to_string(records).unwrap_or_else(|_| "<unprintable>".into())
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::NotFound { collection, filter } => {
                write!(f, "object not found in {}: filter {}", collection, filter)
            }
            ModelError::NotUnique { collection, detail } => {
                write!(f, "object not unique in {}: {}", collection, detail)
            }
            ModelError::DoesExist { collection, detail } => {
                write!(f, "object does exist in {}: {}", collection, detail)
            }
            ModelError::IsReference {
                collection,
                records,
            } => write!(
                f,
                "object is still referenced in {}: {}",
                collection,
                records_json(records)
            ),
            ModelError::ConstraintFailed {
                collection,
                records,
            } => write!(
                f,
                "object fails to meet constraints in {}: {}",
                collection,
                records_json(records)
            ),
            ModelError::TypeMismatch {
                collection,
                field,
                value,
                ..
            } => write!(
                f,
                "type constraints not met in {}: field \"{}\" has value {}",
                collection, field, value
            ),
            ModelError::NotAllKeysGiven {
                collection,
                keys,
                given,
            } => write!(
                f,
                "not all keys given for {}: expected {:?}, got {}",
                collection, keys, given
            ),
            ModelError::Unexpected {
                collection,
                context,
                source,
            } => match source {
                Some(err) => write!(f, "unexpected model error in {}: {}: {}", collection, context, err),
                None => write!(f, "unexpected model error in {}: {}", collection, context),
            },
            ModelError::InvalidSchema { collection, reason } => {
                write!(f, "types not well defined for {}: {}", collection, reason)
            }
            ModelError::AlreadyLoaded { collection } => write!(
                f,
                "load on already loaded model for {}, refusing to load twice",
                collection
            ),
        }
    }
}

impl Error for ModelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ModelError::Unexpected {
                source: Some(err), ..
            } => Some(err),
            _ => None,
        }
    }
}
