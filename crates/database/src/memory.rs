use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::{
    quote_ident, Backend, BackendError, FilterOperator, OrderDirection, QueryCriteria, Record,
};

/// Every table of a [`MemoryBackend`], by name.
pub type Tables = BTreeMap<String, MemoryTable>;

/// A stored procedure registered on a [`MemoryBackend`].
pub type Procedure =
    Arc<dyn Fn(&mut Tables, &Record) -> Result<Value, BackendError> + Send + Sync>;

/// Rows of one in-memory table plus the unique constraints enforced on them.
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    unique_keys: Vec<Vec<String>>,
    rows: Vec<Record>,
}

impl MemoryTable {
    pub fn new(unique_keys: &[&[&str]]) -> Self {
        Self {
            unique_keys: unique_keys
                .iter()
                .map(|key| key.iter().map(|c| c.to_string()).collect())
                .collect(),
            rows: Vec::new(),
        }
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn push_row(&mut self, row: Record) {
        self.rows.push(row);
    }

    fn key_of(record: &Record, columns: &[String]) -> Option<Vec<Value>> {
        columns
            .iter()
            .map(|c| record.get(c).filter(|v| !v.is_null()).cloned())
            .collect()
    }

    fn position_by_key(&self, columns: &[String], key: &[Value]) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| Self::key_of(row, columns).as_deref() == Some(key))
    }

    fn check_unique(&self, table: &str, records: &[Record]) -> Result<(), BackendError> {
        for columns in &self.unique_keys {
            let mut seen: HashSet<String> = HashSet::new();
            for record in records {
                let Some(key) = Self::key_of(record, columns) else { continue };
                if self.position_by_key(columns, &key).is_some()
                    || !seen.insert(Value::Array(key.clone()).to_string())
                {
                    return Err(BackendError::rejected(
                        table,
                        format!(
                            "duplicate key value violates unique constraint on ({})",
                            columns.join(", ")
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct MemoryState {
    tables: Tables,
    procedures: BTreeMap<String, Procedure>,
    failing_selects: HashSet<String>,
    failing_writes: HashSet<String>,
}

/// An in-process [`Backend`] holding tables as vectors of JSON rows.
///
/// Enforces declared unique keys the way Postgres would (whole-statement
/// rejection) and can be told to fail reads or writes on a table.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_table(&self, table: &str, unique_keys: &[&[&str]]) {
        let mut state = self.state.lock().await;
        state.tables.insert(table.to_string(), MemoryTable::new(unique_keys));
    }

    /// Appends rows without constraint checks, creating the table (keyed on `id`) if needed.
    pub async fn seed(&self, table: &str, rows: Vec<Record>) {
        let mut state = self.state.lock().await;
        let entry = state
            .tables
            .entry(table.to_string())
            .or_insert_with(|| MemoryTable::new(&[&["id"]]));
        entry.rows.extend(rows);
    }

    pub async fn drop_table(&self, table: &str) {
        self.state.lock().await.tables.remove(table);
    }

    pub async fn rows(&self, table: &str) -> Vec<Record> {
        let state = self.state.lock().await;
        state.tables.get(table).map(|t| t.rows.clone()).unwrap_or_default()
    }

    pub async fn register_procedure(&self, name: &str, procedure: Procedure) {
        self.state.lock().await.procedures.insert(name.to_string(), procedure);
    }

    /// Every subsequent select against `table` fails with a query error.
    pub async fn fail_selects_on(&self, table: &str) {
        self.state.lock().await.failing_selects.insert(table.to_string());
    }

    /// Every subsequent insert, update or upsert against `table` is rejected.
    pub async fn fail_writes_on(&self, table: &str) {
        self.state.lock().await.failing_writes.insert(table.to_string());
    }

    fn table_mut<'a>(
        state: &'a mut MemoryState,
        table: &str,
    ) -> Result<&'a mut MemoryTable, BackendError> {
        if state.failing_writes.contains(table) {
            return Err(BackendError::rejected(table, "write refused"));
        }
        state
            .tables
            .get_mut(table)
            .ok_or_else(|| BackendError::RelationNotFound(table.to_string()))
    }
}

fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (a, b) if a == b => Some(Ordering::Equal),
        _ => None,
    }
}

fn matches_criteria(row: &Record, criteria: &QueryCriteria) -> Result<bool, BackendError> {
    for condition in &criteria.conditions {
        let op = FilterOperator::parse(condition.operator)?;
        let field = row.get(&condition.column).unwrap_or(&Value::Null);
        let expected = condition.value.as_ref().unwrap_or(&Value::Null);

        let ok = match op {
            FilterOperator::IsNull => field.is_null(),
            FilterOperator::IsNotNull => !field.is_null(),
            _ if field.is_null() || expected.is_null() => false,
            FilterOperator::Eq => compare_values(field, expected) == Some(Ordering::Equal),
            FilterOperator::NotEq => {
                matches!(compare_values(field, expected), Some(o) if o != Ordering::Equal)
            }
            FilterOperator::Lt => compare_values(field, expected) == Some(Ordering::Less),
            FilterOperator::Lte => matches!(
                compare_values(field, expected),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOperator::Gt => compare_values(field, expected) == Some(Ordering::Greater),
            FilterOperator::Gte => matches!(
                compare_values(field, expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

#[async_trait::async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn select(
        &self,
        table: &str,
        criteria: QueryCriteria,
    ) -> Result<Vec<Record>, BackendError> {
        quote_ident(table)?;
        let state = self.state.lock().await;
        if state.failing_selects.contains(table) {
            return Err(BackendError::query(table, "connection reset while reading"));
        }
        let stored = state
            .tables
            .get(table)
            .ok_or_else(|| BackendError::RelationNotFound(table.to_string()))?;

        let mut rows = Vec::new();
        for row in &stored.rows {
            if matches_criteria(row, &criteria)? {
                rows.push(row.clone());
            }
        }

        for (column, direction) in criteria.order_by.iter().rev() {
            rows.sort_by(|a, b| {
                let ordering = compare_values(
                    a.get(column).unwrap_or(&Value::Null),
                    b.get(column).unwrap_or(&Value::Null),
                )
                .unwrap_or(Ordering::Equal);
                match direction {
                    OrderDirection::Asc => ordering,
                    OrderDirection::Desc => ordering.reverse(),
                }
            });
        }

        let offset = criteria.offset.unwrap_or(0).max(0) as usize;
        let limit = criteria.limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        let rows = rows.into_iter().skip(offset).take(limit);

        Ok(match &criteria.columns {
            Some(columns) => rows
                .map(|row| {
                    columns
                        .iter()
                        .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
                        .collect::<Record>()
                })
                .collect(),
            None => rows.collect(),
        })
    }

    async fn count(&self, table: &str) -> Result<i64, BackendError> {
        let state = self.state.lock().await;
        if state.failing_selects.contains(table) {
            return Err(BackendError::query(table, "connection reset while reading"));
        }
        state
            .tables
            .get(table)
            .map(|t| t.rows.len() as i64)
            .ok_or_else(|| BackendError::RelationNotFound(table.to_string()))
    }

    async fn insert(&self, table: &str, records: &[Record]) -> Result<u64, BackendError> {
        let mut state = self.state.lock().await;
        let stored = Self::table_mut(&mut state, table)?;
        stored.check_unique(table, records)?;
        stored.rows.extend(records.iter().cloned());
        Ok(records.len() as u64)
    }

    async fn update(
        &self,
        table: &str,
        key_column: &str,
        record: &Record,
    ) -> Result<u64, BackendError> {
        let mut state = self.state.lock().await;
        let stored = Self::table_mut(&mut state, table)?;
        let key = record
            .get(key_column)
            .ok_or_else(|| {
                BackendError::rejected(table, format!("record has no {} value", key_column))
            })?;

        let mut affected = 0;
        for row in stored.rows.iter_mut() {
            if row.get(key_column) == Some(key) {
                for (column, value) in record {
                    row.insert(column.clone(), value.clone());
                }
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn upsert(
        &self,
        table: &str,
        records: &[Record],
        conflict_columns: &[&str],
        insert_only: &[&str],
    ) -> Result<u64, BackendError> {
        let mut state = self.state.lock().await;
        let stored = Self::table_mut(&mut state, table)?;

        let conflict: Vec<String> = conflict_columns.iter().map(|c| c.to_string()).collect();
        if !stored.unique_keys.iter().any(|key| *key == conflict) {
            return Err(BackendError::rejected(
                table,
                "there is no unique constraint matching the ON CONFLICT specification",
            ));
        }

        let mut seen: HashSet<String> = HashSet::new();
        for record in records {
            let key = MemoryTable::key_of(record, &conflict)
                .ok_or_else(|| BackendError::rejected(table, "null value in conflict column"))?;
            if !seen.insert(Value::Array(key).to_string()) {
                return Err(BackendError::rejected(
                    table,
                    "ON CONFLICT DO UPDATE command cannot affect row a second time",
                ));
            }
        }

        for record in records {
            let key = MemoryTable::key_of(record, &conflict).unwrap_or_default();
            match stored.position_by_key(&conflict, &key) {
                Some(index) => {
                    let row = &mut stored.rows[index];
                    for (column, value) in record {
                        if !insert_only.contains(&column.as_str()) {
                            row.insert(column.clone(), value.clone());
                        }
                    }
                }
                None => stored.rows.push(record.clone()),
            }
        }
        Ok(records.len() as u64)
    }

    async fn rpc(&self, function: &str, args: &Record) -> Result<Value, BackendError> {
        let mut state = self.state.lock().await;
        let procedure = state
            .procedures
            .get(function)
            .cloned()
            .ok_or_else(|| BackendError::ProcedureNotFound(function.to_string()))?;
        procedure(&mut state.tables, args)
    }

    async fn procedure_exists(&self, function: &str) -> Result<bool, BackendError> {
        Ok(self.state.lock().await.procedures.contains_key(function))
    }
}
