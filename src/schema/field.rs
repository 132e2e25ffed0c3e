//! FieldSpec - per-field schema descriptor.

use std::fmt;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture};
use serde_json::Value;

use super::{FieldType, Schema};
use crate::error::ModelError;
use crate::model::{ManyModel, ModelType};
use crate::store::Store;
use crate::Record;

/// Future returned by an asynchronous derivation.
pub type DeriveFuture = BoxFuture<'static, Result<Value, ModelError>>;

/// What a derivation gets besides the record: the store it was loaded from and
/// the model family it belongs to, so it can query sibling data.
#[derive(Clone)]
pub struct DeriveContext {
    store: Arc<dyn Store>,
    model: ModelType,
}

impl DeriveContext {
    pub(crate) fn new(store: Arc<dyn Store>, model: ModelType) -> Self {
        Self { store, model }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// The model family of the handle whose records are being derived.
    pub fn model(&self) -> &ModelType {
        &self.model
    }

    /// A fresh, empty collection handle on `model` sharing this store.
    pub fn many(&self, model: &ModelType) -> ManyModel {
        model.many(self.store.clone(), Vec::new())
    }
}

/// Value substituted when the caller omits a field.
#[derive(Clone)]
pub enum DefaultValue {
    Literal(Value),
    /// Called with the in-progress record.
    Generator(Arc<dyn Fn(&Record) -> Value + Send + Sync>),
}

impl DefaultValue {
    pub(crate) fn produce(&self, record: &Record) -> Value {
        match self {
            DefaultValue::Literal(value) => value.clone(),
            DefaultValue::Generator(generate) => generate(record),
        }
    }
}

/// Computation behind a derived field.
#[derive(Clone)]
pub enum Derivation {
    Pure(Arc<dyn Fn(&Record) -> Value + Send + Sync>),
    Async(Arc<dyn Fn(Record, DeriveContext) -> DeriveFuture + Send + Sync>),
}

impl Derivation {
    pub(crate) fn evaluate(&self, record: &Record, ctx: DeriveContext) -> DeriveFuture {
        match self {
            Derivation::Pure(derive) => Box::pin(future::ready(Ok(derive(record)))),
            Derivation::Async(derive) => derive(record.clone(), ctx),
        }
    }
}

/// Where a field's value comes from.
#[derive(Clone)]
pub enum FieldSource {
    /// Supplied by the caller.
    Stored,
    /// Generated by the store on insert (e.g. a sequence).
    Auto,
    /// Supplied by the caller, or filled from a default when omitted.
    Default(DefaultValue),
    /// Computed on read; never supplied by the caller nor persisted.
    Derived(Derivation),
}

impl fmt::Debug for FieldSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldSource::Stored => write!(f, "Stored"),
            FieldSource::Auto => write!(f, "Auto"),
            FieldSource::Default(DefaultValue::Literal(v)) => write!(f, "Default({})", v),
            FieldSource::Default(DefaultValue::Generator(_)) => write!(f, "Default(<fn>)"),
            FieldSource::Derived(Derivation::Pure(_)) => write!(f, "Derived(<fn>)"),
            FieldSource::Derived(Derivation::Async(_)) => write!(f, "Derived(<async fn>)"),
        }
    }
}

/// Schema descriptor for one field.
///
/// ```ignore
/// let id = FieldSpec::id().key().auto();
/// let email = FieldSpec::email().public().mapped("mail");
/// let score = FieldSpec::int().default_value(0);
/// ```
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub ty: FieldType,
    pub key: bool,
    pub optional: bool,
    pub public: bool,
    pub mapped: Option<String>,
    pub source: FieldSource,
}

impl FieldSpec {
    pub fn of(ty: FieldType) -> Self {
        Self {
            ty,
            key: false,
            optional: false,
            public: false,
            mapped: None,
            source: FieldSource::Stored,
        }
    }

    pub fn int() -> Self {
        Self::of(FieldType::Int)
    }

    pub fn float() -> Self {
        Self::of(FieldType::Float)
    }

    pub fn boolean() -> Self {
        Self::of(FieldType::Bool)
    }

    pub fn string() -> Self {
        Self::of(FieldType::String)
    }

    pub fn email() -> Self {
        Self::of(FieldType::Email)
    }

    pub fn id() -> Self {
        Self::of(FieldType::Id)
    }

    pub fn json() -> Self {
        Self::of(FieldType::Json)
    }

    pub fn array(inner: FieldType) -> Self {
        Self::of(FieldType::Array(Box::new(inner)))
    }

    pub fn object(schema: Schema) -> Self {
        Self::of(FieldType::Object(schema))
    }

    pub fn key(mut self) -> Self {
        self.key = true;
        self
    }

    pub fn auto(mut self) -> Self {
        self.source = FieldSource::Auto;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }

    /// Emit the field under `name` in the public projection.
    pub fn mapped(mut self, name: impl Into<String>) -> Self {
        self.mapped = Some(name.into());
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.source = FieldSource::Default(DefaultValue::Literal(value.into()));
        self
    }

    pub fn default_with<F>(mut self, generate: F) -> Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        self.source = FieldSource::Default(DefaultValue::Generator(Arc::new(generate)));
        self
    }

    pub fn derived<F>(mut self, derive: F) -> Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        self.source = FieldSource::Derived(Derivation::Pure(Arc::new(derive)));
        self
    }

    /// Derived field computed asynchronously, e.g. by querying other collections
    /// through the [`DeriveContext`].
    pub fn derived_async<F>(mut self, derive: F) -> Self
    where
        F: Fn(Record, DeriveContext) -> DeriveFuture + Send + Sync + 'static,
    {
        self.source = FieldSource::Derived(Derivation::Async(Arc::new(derive)));
        self
    }

    pub fn is_auto(&self) -> bool {
        matches!(self.source, FieldSource::Auto)
    }

    pub fn is_derived(&self) -> bool {
        matches!(self.source, FieldSource::Derived(_))
    }

    pub fn default(&self) -> Option<&DefaultValue> {
        match &self.source {
            FieldSource::Default(default) => Some(default),
            _ => None,
        }
    }

    pub fn derivation(&self) -> Option<&Derivation> {
        match &self.source {
            FieldSource::Derived(derivation) => Some(derivation),
            _ => None,
        }
    }

    /// Name the field is emitted under in the public projection.
    pub fn public_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.mapped.as_deref().unwrap_or(name)
    }
}
