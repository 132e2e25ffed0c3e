//! Primitive field types and their value checks.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::Schema;

/// The primitive kind of a field.
#[derive(Debug, Clone)]
pub enum FieldType {
    /// Signed or unsigned integer.
    Int,
    /// Any JSON number.
    Float,
    Bool,
    String,
    /// A string shaped like an e-mail address.
    Email,
    /// An opaque identifier: integer or string. Marshaled through the store's
    /// `to_id` / `from_id` on the way in and out.
    Id,
    /// Homogeneous array of the inner type.
    Array(Box<FieldType>),
    /// Nested object described by its own schema.
    Object(Schema),
    /// Any non-null JSON value.
    Json,
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("email pattern compiles")
    })
}

impl FieldType {
    /// Returns true if `value` (known to be non-null) conforms to this type.
    pub fn check(&self, value: &Value) -> bool {
        match self {
            FieldType::Int => value.is_i64() || value.is_u64(),
            FieldType::Float => value.is_number(),
            FieldType::Bool => value.is_boolean(),
            FieldType::String => value.is_string(),
            FieldType::Email => value
                .as_str()
                .map(|s| email_regex().is_match(s))
                .unwrap_or(false),
            FieldType::Id => value.is_i64() || value.is_u64() || value.is_string(),
            FieldType::Array(inner) => match value {
                Value::Array(items) => items.iter().all(|item| !item.is_null() && inner.check(item)),
                _ => false,
            },
            FieldType::Object(schema) => match value {
                Value::Object(map) => schema.fields().all(|(name, spec)| {
                    if spec.is_derived() {
                        return true;
                    }
                    match map.get(name) {
                        None | Some(Value::Null) => spec.optional || spec.is_auto(),
                        Some(v) => spec.ty.check(v),
                    }
                }),
                _ => false,
            },
            FieldType::Json => !value.is_null(),
        }
    }

    /// True for identifier fields and arrays of identifiers.
    pub fn is_id(&self) -> bool {
        match self {
            FieldType::Id => true,
            FieldType::Array(inner) => inner.is_id(),
            _ => false,
        }
    }

    /// Short lowercase name used in descriptions and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Bool => "bool",
            FieldType::String => "string",
            FieldType::Email => "email",
            FieldType::Id => "id",
            FieldType::Array(_) => "array",
            FieldType::Object(_) => "object",
            FieldType::Json => "json",
        }
    }
}
