//! Filters, ordering, and paging passed to the storage boundary.
//!
//! A [`Filter`] maps field names to a [`Condition`]; all conditions must hold
//! for a record to match. Filters can be built fluently or parsed from JSON:
//!
//! ```ignore
//! let f = Filter::new().eq("test", 1).one_of("id", [1, 2, 3]);
//! let g = Filter::from_json(&json!({
//!     "test": 1,
//!     "id": [1, 2, 3],
//!     "name": { "op": "like", "val": "Fr%" },
//! }))?;
//! assert_eq!(f.len(), 2);
//! ```

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{OnceLock, RwLock};

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::Record;

/// Condition on a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Equality. `Eq(Value::Null)` matches missing and null values.
    Eq(Value),
    /// Membership.
    In(Vec<Value>),
    /// SQL-style pattern: `%` matches any run of characters, `_` exactly one.
    Like(String),
    /// Case-insensitive [`Condition::Like`].
    ILike(String),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    /// `true` matches non-null values, `false` matches missing or null ones.
    Exists(bool),
}

/// Order two JSON scalars of the same kind. Mixed kinds are unordered.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

type LikeCache = RwLock<HashMap<(String, bool), Regex>>;

/// Compiled LIKE patterns, keyed by pattern and case sensitivity.
fn like_cache() -> &'static LikeCache {
    static CACHE: OnceLock<LikeCache> = OnceLock::new();
    CACHE.get_or_init(LikeCache::default)
}

fn like_regex(pattern: &str, case_insensitive: bool) -> Option<Regex> {
    let key = (pattern.to_string(), case_insensitive);
    if let Some(re) = like_cache().read().ok().and_then(|cache| cache.get(&key).cloned()) {
        return Some(re);
    }

    let mut expr = String::from("^");
    let mut literal = String::new();
    for ch in pattern.chars() {
        match ch {
            '%' | '_' => {
                expr.push_str(&regex::escape(&literal));
                literal.clear();
                expr.push_str(if ch == '%' { ".*" } else { "." });
            }
            other => literal.push(other),
        }
    }
    expr.push_str(&regex::escape(&literal));
    expr.push('$');
    let re = RegexBuilder::new(&expr)
        .case_insensitive(case_insensitive)
        .dot_matches_new_line(true)
        .build()
        .ok()?;
    // a poisoned cache only costs a recompile
    if let Ok(mut cache) = like_cache().write() {
        cache.insert(key, re.clone());
    }
    Some(re)
}

fn like_matches(pattern: &str, text: &str, case_insensitive: bool) -> bool {
    like_regex(pattern, case_insensitive)
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

impl Condition {
    /// Evaluate the condition against a field value (`None` when missing).
    pub fn matches(&self, value: Option<&Value>) -> bool {
        let present = value.filter(|v| !v.is_null());
        match self {
            Condition::Eq(Value::Null) => present.is_none(),
            Condition::Eq(expected) => present == Some(expected),
            Condition::In(options) => present.map(|v| options.contains(v)).unwrap_or(false),
            Condition::Like(pattern) => present
                .and_then(Value::as_str)
                .map(|s| like_matches(pattern, s, false))
                .unwrap_or(false),
            Condition::ILike(pattern) => present
                .and_then(Value::as_str)
                .map(|s| like_matches(pattern, s, true))
                .unwrap_or(false),
            Condition::Lt(bound) => Self::compare(present, bound, |o| o == Ordering::Less),
            Condition::Lte(bound) => Self::compare(present, bound, |o| o != Ordering::Greater),
            Condition::Gt(bound) => Self::compare(present, bound, |o| o == Ordering::Greater),
            Condition::Gte(bound) => Self::compare(present, bound, |o| o != Ordering::Less),
            Condition::Exists(expected) => present.is_some() == *expected,
        }
    }

    fn compare(value: Option<&Value>, bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
        value
            .and_then(|v| compare_values(v, bound))
            .map(accept)
            .unwrap_or(false)
    }

    /// JSON form: a literal for equality, `{ "op": .., "val": .. }` otherwise.
    pub fn to_json(&self) -> Value {
        match self {
            Condition::Eq(value) => value.clone(),
            Condition::In(values) => json!({ "op": "in", "val": values }),
            Condition::Like(pattern) => json!({ "op": "like", "val": pattern }),
            Condition::ILike(pattern) => json!({ "op": "ilike", "val": pattern }),
            Condition::Lt(value) => json!({ "op": "lt", "val": value }),
            Condition::Lte(value) => json!({ "op": "lte", "val": value }),
            Condition::Gt(value) => json!({ "op": "gt", "val": value }),
            Condition::Gte(value) => json!({ "op": "gte", "val": value }),
            Condition::Exists(value) => json!({ "op": "exists", "val": value }),
        }
    }

    fn from_json(field: &str, value: &Value) -> Result<Self, FilterError> {
        let op_object = value
            .as_object()
            .filter(|obj| obj.len() == 2 && obj.contains_key("op") && obj.contains_key("val"));
        let Some(obj) = op_object else {
            return Ok(match value {
                Value::Array(values) => Condition::In(values.clone()),
                other => Condition::Eq(other.clone()),
            });
        };

        let val = &obj["val"];
        let pattern = || {
            val.as_str()
                .map(str::to_string)
                .ok_or_else(|| FilterError::new(field, "pattern must be a string"))
        };
        match obj["op"].as_str() {
            Some("in") => match val {
                Value::Array(values) => Ok(Condition::In(values.clone())),
                _ => Err(FilterError::new(field, "\"in\" expects an array")),
            },
            Some("like") => Ok(Condition::Like(pattern()?)),
            Some("ilike") => Ok(Condition::ILike(pattern()?)),
            Some("lt") => Ok(Condition::Lt(val.clone())),
            Some("lte") => Ok(Condition::Lte(val.clone())),
            Some("gt") => Ok(Condition::Gt(val.clone())),
            Some("gte") => Ok(Condition::Gte(val.clone())),
            Some("exists") => val
                .as_bool()
                .map(Condition::Exists)
                .ok_or_else(|| FilterError::new(field, "\"exists\" expects a bool")),
            Some(other) => Err(FilterError::new(field, format!("unknown operator \"{}\"", other))),
            None => Err(FilterError::new(field, "operator must be a string")),
        }
    }
}

/// A filter that could not be parsed from JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterError {
    pub field: String,
    pub message: String,
}

impl FilterError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid filter on \"{}\": {}", self.field, self.message)
    }
}

impl std::error::Error for FilterError {}

/// Conjunction of per-field conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: BTreeMap<String, Condition>,
}

impl Filter {
    /// The empty filter; matches every record.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, condition: Condition) -> Self {
        self.conditions.insert(field.into(), condition);
        self
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Condition::Eq(value.into()))
    }

    pub fn one_of<I, V>(self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.with(field, Condition::In(values.into_iter().map(Into::into).collect()))
    }

    pub fn like(self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.with(field, Condition::Like(pattern.into()))
    }

    pub fn ilike(self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.with(field, Condition::ILike(pattern.into()))
    }

    pub fn lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Condition::Lt(value.into()))
    }

    pub fn lte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Condition::Lte(value.into()))
    }

    pub fn gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Condition::Gt(value.into()))
    }

    pub fn gte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Condition::Gte(value.into()))
    }

    pub fn exists(self, field: impl Into<String>, exists: bool) -> Self {
        self.with(field, Condition::Exists(exists))
    }

    /// Parse `{ field: literal | [values] | { "op": .., "val": .. } }`.
    /// Array literals mean membership.
    pub fn from_json(value: &Value) -> Result<Self, FilterError> {
        let obj = value
            .as_object()
            .ok_or_else(|| FilterError::new("", "filter must be a JSON object"))?;
        let mut filter = Filter::new();
        for (field, condition) in obj {
            filter = filter.with(field.clone(), Condition::from_json(field, condition)?);
        }
        Ok(filter)
    }

    pub fn get(&self, field: &str) -> Option<&Condition> {
        self.conditions.get(field)
    }

    pub(crate) fn get_mut(&mut self, field: &str) -> Option<&mut Condition> {
        self.conditions.get_mut(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.conditions.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Condition)> {
        self.conditions.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// True if every condition holds for `record`.
    pub fn matches(&self, record: &Record) -> bool {
        self.conditions
            .iter()
            .all(|(field, condition)| condition.matches(record.get(field)))
    }

    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .conditions
            .iter()
            .map(|(field, condition)| (field.clone(), condition.to_json()))
            .collect();
        Value::Object(map)
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Asc,
    Desc,
}

/// One ordering term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub field: String,
    pub direction: Direction,
}

impl Order {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }

    /// Compare two records on this term. Nulls sort first ascending.
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let left = a.get(&self.field).filter(|v| !v.is_null());
        let right = b.get(&self.field).filter(|v| !v.is_null());
        let ordering = match (left, right) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
        };
        match self.direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        }
    }
}

/// A filtered, ordered, paged query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Filter,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub order: Vec<Order>,
}

impl Query {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn order_by(mut self, order: Order) -> Self {
        self.order.push(order);
        self
    }
}

impl From<Filter> for Query {
    fn from(filter: Filter) -> Self {
        Query::new(filter)
    }
}
