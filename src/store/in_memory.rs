//! InMemoryStore - HashMap-backed store for testing and development.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::Value;

use super::{Store, StoreResult};
use crate::error::StoreError;
use crate::filter::{Filter, Query};
use crate::Record;

/// `column` must hold a value present in `table.references` (or be null).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: String,
    pub table: String,
    pub references: String,
}

/// Declaration of one in-memory table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableDef {
    name: String,
    primary_key: Vec<String>,
    autos: Vec<String>,
    unique: Vec<Vec<String>>,
    foreign_keys: Vec<ForeignKey>,
}

impl TableDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Column filled from a per-table sequence (starting at 1) when omitted.
    pub fn auto(mut self, column: impl Into<String>) -> Self {
        self.autos.push(column.into());
        self
    }

    pub fn unique<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique.push(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn references(
        mut self,
        column: impl Into<String>,
        table: impl Into<String>,
        references: impl Into<String>,
    ) -> Self {
        self.foreign_keys.push(ForeignKey {
            column: column.into(),
            table: table.into(),
            references: references.into(),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn unique_sets(&self) -> impl Iterator<Item = &Vec<String>> {
        std::iter::once(&self.primary_key)
            .filter(|pk| !pk.is_empty())
            .chain(self.unique.iter())
    }
}

struct Table {
    def: TableDef,
    rows: Vec<Record>,
    sequences: HashMap<String, i64>,
}

impl Table {
    fn new(def: TableDef) -> Self {
        Self {
            def,
            rows: Vec::new(),
            sequences: HashMap::new(),
        }
    }
}

type Tables = HashMap<String, Table>;

/// Tuple of `columns` in `record`, or `None` if any of them is null.
fn tuple(record: &Record, columns: &[String]) -> Option<Vec<Value>> {
    columns
        .iter()
        .map(|c| record.get(c).filter(|v| !v.is_null()).cloned())
        .collect()
}

fn check_unique(def: &TableDef, existing: &[&Record], candidate: &Record) -> StoreResult<()> {
    for columns in def.unique_sets() {
        let Some(values) = tuple(candidate, columns) else {
            continue;
        };
        if existing
            .iter()
            .any(|row| tuple(row, columns).as_ref() == Some(&values))
        {
            return Err(StoreError::unique(format!(
                "duplicate key value violates unique constraint on {}({})",
                def.name,
                columns.join(", ")
            )));
        }
    }
    Ok(())
}

fn check_foreign_keys(tables: &Tables, def: &TableDef, candidate: &Record) -> StoreResult<()> {
    for fk in &def.foreign_keys {
        let Some(value) = candidate.get(&fk.column).filter(|v| !v.is_null()) else {
            continue;
        };
        let found = tables
            .get(&fk.table)
            .map(|t| t.rows.iter().any(|row| row.get(&fk.references) == Some(value)))
            .unwrap_or(false);
        if !found {
            return Err(StoreError::constraint(format!(
                "insert or update on {} violates foreign key {} -> {}({})",
                def.name, fk.column, fk.table, fk.references
            )));
        }
    }
    Ok(())
}

/// In-memory store backed by a HashMap of tables.
///
/// Enforces primary keys, unique column sets, auto sequences, and foreign
/// keys, reporting violations with the matching [`StoreErrorKind`](crate::StoreErrorKind).
/// Clone-friendly via Arc.
#[derive(Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Create a new store without tables.
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a store with `defs` declared.
    pub fn with_tables<I>(defs: I) -> Self
    where
        I: IntoIterator<Item = TableDef>,
    {
        let tables: Tables = defs
            .into_iter()
            .map(|def| (def.name.clone(), Table::new(def)))
            .collect();
        Self {
            tables: Arc::new(RwLock::new(tables)),
        }
    }

    /// Declare a table on a live store. Redeclaring a table drops its rows.
    pub fn define(&self, def: TableDef) -> StoreResult<()> {
        let mut tables = self.write()?;
        tables.insert(def.name.clone(), Table::new(def));
        Ok(())
    }

    /// Snapshot of every row of `collection`, in insertion order.
    pub fn rows(&self, collection: &str) -> StoreResult<Vec<Record>> {
        let tables = self.read()?;
        Ok(Self::get(&tables, collection)?.rows.clone())
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::other("lock poisoned"))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::other("lock poisoned"))
    }

    fn get<'a>(tables: &'a Tables, collection: &str) -> StoreResult<&'a Table> {
        tables
            .get(collection)
            .ok_or_else(|| StoreError::other(format!("relation \"{}\" does not exist", collection)))
    }

    fn select(rows: &[Record], query: &Query) -> Vec<Record> {
        let mut matched: Vec<Record> = rows
            .iter()
            .filter(|row| query.filter.matches(row))
            .cloned()
            .collect();
        if !query.order.is_empty() {
            matched.sort_by(|a, b| {
                query
                    .order
                    .iter()
                    .map(|order| order.compare(a, b))
                    .find(|o| o.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        matched.into_iter().skip(offset).take(limit).collect()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn find(&self, collection: &str, query: &Query) -> StoreResult<Vec<Record>> {
        let tables = self.read()?;
        let table = Self::get(&tables, collection)?;
        Ok(Self::select(&table.rows, query))
    }

    async fn find_by_ids(
        &self,
        collection: &str,
        filter: &Filter,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> StoreResult<Vec<Record>> {
        let query = Query {
            filter: filter.clone(),
            limit,
            offset,
            order: Vec::new(),
        };
        self.find(collection, &query).await
    }

    async fn insert(
        &self,
        collection: &str,
        records: &[Record],
        returning: &[String],
    ) -> StoreResult<Vec<Record>> {
        let mut tables = self.write()?;
        let table = Self::get(&tables, collection)?;
        let def = &table.def;

        let mut sequences = table.sequences.clone();
        let mut staged: Vec<Record> = Vec::with_capacity(records.len());
        for record in records {
            let mut row = record.clone();
            for auto in &def.autos {
                if row.get(auto).map(Value::is_null).unwrap_or(true) {
                    let next = sequences.entry(auto.clone()).or_insert(0);
                    *next += 1;
                    row.insert(auto.clone(), Value::from(*next));
                }
            }
            let existing: Vec<&Record> = table.rows.iter().chain(staged.iter()).collect();
            check_unique(def, &existing, &row)?;
            check_foreign_keys(&tables, def, &row)?;
            staged.push(row);
        }

        let generated: Vec<Record> = staged
            .iter()
            .map(|row| {
                returning
                    .iter()
                    .filter_map(|field| row.get(field).map(|v| (field.clone(), v.clone())))
                    .collect()
            })
            .collect();

        if let Some(table) = tables.get_mut(collection) {
            table.rows.extend(staged);
            table.sequences = sequences;
        }
        tracing::debug!(collection, count = generated.len(), "in-memory insert");
        Ok(generated)
    }

    async fn update_one(&self, collection: &str, filter: &Filter, record: &Record) -> StoreResult<()> {
        let mut tables = self.write()?;
        let table = Self::get(&tables, collection)?;
        let Some(index) = table.rows.iter().position(|row| filter.matches(row)) else {
            return Ok(());
        };

        let mut updated = table.rows[index].clone();
        for (field, value) in record {
            updated.insert(field.clone(), value.clone());
        }
        let others: Vec<&Record> = table
            .rows
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, row)| row)
            .collect();
        check_unique(&table.def, &others, &updated)?;
        check_foreign_keys(&tables, &table.def, &updated)?;

        if let Some(table) = tables.get_mut(collection) {
            table.rows[index] = updated;
        }
        Ok(())
    }

    async fn remove(&self, collection: &str, filter: &Filter) -> StoreResult<()> {
        let mut tables = self.write()?;
        let table = Self::get(&tables, collection)?;
        let doomed: Vec<&Record> = table.rows.iter().filter(|row| filter.matches(row)).collect();
        if doomed.is_empty() {
            return Ok(());
        }

        for other in tables.values() {
            for fk in other.def.foreign_keys.iter().filter(|fk| fk.table == collection) {
                let referenced = other.rows.iter().any(|row| {
                    let is_doomed_self = other.def.name == collection && filter.matches(row);
                    !is_doomed_self
                        && row.get(&fk.column).filter(|v| !v.is_null()).is_some_and(|value| {
                            doomed.iter().any(|d| d.get(&fk.references) == Some(value))
                        })
                });
                if referenced {
                    return Err(StoreError::reference(format!(
                        "delete on {} violates foreign key {}.{} -> {}({})",
                        collection, other.def.name, fk.column, collection, fk.references
                    )));
                }
            }
        }

        if let Some(table) = tables.get_mut(collection) {
            table.rows.retain(|row| !filter.matches(row));
        }
        Ok(())
    }

    fn to_id(&self, external: &Value) -> Value {
        match external {
            Value::String(s) => s
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| external.clone()),
            other => other.clone(),
        }
    }

    fn from_id(&self, internal: &Value) -> Value {
        internal.clone()
    }
}
