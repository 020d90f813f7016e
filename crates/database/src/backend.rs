use serde_json::{Map, Value};

use crate::{BackendError, QueryCriteria};

/// A row as the backend hands it out: column name to JSON value.
pub type Record = Map<String, Value>;

/// The storage collaborator the migration pipeline talks to.
///
/// Implementations must report a missing table as
/// [`BackendError::RelationNotFound`] and a missing stored procedure as
/// [`BackendError::ProcedureNotFound`].
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Finds rows of `table` matching the criteria.
    async fn select(
        &self,
        table: &str,
        criteria: QueryCriteria,
    ) -> Result<Vec<Record>, BackendError>;

    /// Counts all rows of `table`.
    async fn count(&self, table: &str) -> Result<i64, BackendError>;

    /// Inserts every record. The whole call fails if any row is rejected.
    async fn insert(&self, table: &str, records: &[Record]) -> Result<u64, BackendError>;

    /// Updates the row whose `key_column` equals the record's value for it,
    /// writing every other field present in the record.
    async fn update(
        &self,
        table: &str,
        key_column: &str,
        record: &Record,
    ) -> Result<u64, BackendError>;

    /// Inserts records, updating the fields present in a record when a row with
    /// the same `conflict_columns` values already exists.
    ///
    /// Columns in `insert_only` are written for new rows but never overwritten
    /// on an existing one.
    async fn upsert(
        &self,
        table: &str,
        records: &[Record],
        conflict_columns: &[&str],
        insert_only: &[&str],
    ) -> Result<u64, BackendError>;

    /// Invokes a stored procedure with named arguments.
    async fn rpc(&self, function: &str, args: &Record) -> Result<Value, BackendError>;

    /// Whether a stored procedure with this name is callable.
    async fn procedure_exists(&self, function: &str) -> Result<bool, BackendError>;
}

/// Validates a table, column or function name and returns it double-quoted.
pub fn quote_ident(ident: &str) -> Result<String, BackendError> {
    let valid = !ident.is_empty()
        && ident.len() <= 63
        && ident
            .chars()
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false)
        && ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid {
        return Err(BackendError::InvalidIdentifier(ident.to_string()));
    }
    Ok(format!("\"{}\"", ident))
}

/// Union of the keys of `records`, in first-seen order.
pub fn record_columns(records: &[Record]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}
