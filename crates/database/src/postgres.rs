use serde_json::Value;
use sqlx::{
    postgres::{PgArguments, PgPoolOptions},
    types::Json,
    PgPool, Postgres, Row,
};
use tracing::info;

use crate::{
    quote_ident, record_columns, Backend, BackendError, FilterOperator, QueryCriteria, Record,
};

/// Postgres error code for `undefined_table`.
const UNDEFINED_TABLE: &str = "42P01";
/// Postgres error code for `undefined_function`.
const UNDEFINED_FUNCTION: &str = "42883";
/// Class 23 covers integrity constraint violations.
const INTEGRITY_VIOLATION_CLASS: &str = "23";

/// Alias used for the function call in [`rpc_sql`]; scalar results come back wrapped under it.
const RPC_ALIAS: &str = "r";

enum Target<'a> {
    Relation(&'a str),
    Procedure(&'a str),
}

fn map_sqlx_error(err: sqlx::Error, target: Target<'_>) -> BackendError {
    let name = match target {
        Target::Relation(name) | Target::Procedure(name) => name,
    };

    if let sqlx::Error::Database(db_err) = &err {
        let code = db_err.code();
        match (code.as_deref(), &target) {
            (Some(UNDEFINED_TABLE), Target::Relation(table)) => {
                return BackendError::RelationNotFound(table.to_string())
            }
            (Some(UNDEFINED_FUNCTION), Target::Procedure(function)) => {
                return BackendError::ProcedureNotFound(function.to_string())
            }
            (Some(c), Target::Relation(table)) if c.starts_with(INTEGRITY_VIOLATION_CLASS) => {
                return BackendError::rejected(table, db_err.message())
            }
            _ => {}
        }
    }
    BackendError::query(name, err.to_string())
}

/// Builds the SELECT for `criteria`. Each returned row has a single jsonb column named `row`.
pub fn select_sql(
    table: &str,
    criteria: &QueryCriteria,
) -> Result<(String, Vec<Value>), BackendError> {
    let table_ident = quote_ident(table)?;

    let projection = match &criteria.columns {
        Some(columns) if !columns.is_empty() => {
            let pairs = columns
                .iter()
                .map(|c| Ok(format!("'{}', t.{}", c, quote_ident(c)?)))
                .collect::<Result<Vec<_>, BackendError>>()?;
            format!("jsonb_build_object({})", pairs.join(", "))
        }
        _ => "to_jsonb(t)".to_string(),
    };

    let mut sql = format!("SELECT {} AS row FROM {} AS t", projection, table_ident);
    let mut values = Vec::new();

    let mut clauses = Vec::new();
    for condition in &criteria.conditions {
        let column = quote_ident(&condition.column)?;
        let op = FilterOperator::parse(condition.operator)?;
        if op.takes_value() {
            values.push(condition.value.clone().unwrap_or(Value::Null));
            clauses.push(format!(
                "to_jsonb(t.{}) {} ${}::jsonb",
                column,
                op.as_sql(),
                values.len()
            ));
        } else {
            clauses.push(format!("t.{} {}", column, op.as_sql()));
        }
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    if !criteria.order_by.is_empty() {
        let orders = criteria
            .order_by
            .iter()
            .map(|(column, direction)| {
                Ok(format!("t.{} {}", quote_ident(column)?, direction.as_sql()))
            })
            .collect::<Result<Vec<_>, BackendError>>()?;
        sql.push_str(" ORDER BY ");
        sql.push_str(&orders.join(", "));
    }

    if let Some(limit) = criteria.limit {
        sql.push_str(&format!(" LIMIT {}", limit.max(0)));
    }
    if let Some(offset) = criteria.offset {
        sql.push_str(&format!(" OFFSET {}", offset.max(0)));
    }

    Ok((sql, values))
}

/// Conflict handling for [`insert_sql`].
#[derive(Debug, Clone, Copy)]
pub struct OnConflict<'a> {
    pub columns: &'a [&'a str],
    /// Written on insert, left untouched when the row already exists.
    pub insert_only: &'a [&'a str],
}

/// Builds an INSERT fed by a jsonb array bound to `$1`. With `on_conflict`
/// the statement becomes an upsert that overwrites only the supplied columns.
pub fn insert_sql(
    table: &str,
    columns: &[String],
    on_conflict: Option<OnConflict<'_>>,
) -> Result<String, BackendError> {
    let table_ident = quote_ident(table)?;
    let column_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Result<Vec<_>, _>>()?
        .join(", ");

    let mut sql = format!(
        "INSERT INTO {table} ({cols}) \
         SELECT {cols} FROM jsonb_populate_recordset(NULL::{table}, $1)",
        table = table_ident,
        cols = column_list,
    );

    if let Some(OnConflict { columns: conflict, insert_only }) = on_conflict {
        let conflict_list = conflict
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Result<Vec<_>, _>>()?
            .join(", ");

        let assignments = columns
            .iter()
            .filter(|c| !conflict.contains(&c.as_str()) && !insert_only.contains(&c.as_str()))
            .map(|c| {
                let ident = quote_ident(c)?;
                Ok(format!("{} = EXCLUDED.{}", ident, ident))
            })
            .collect::<Result<Vec<_>, BackendError>>()?;

        if assignments.is_empty() {
            sql.push_str(&format!(" ON CONFLICT ({}) DO NOTHING", conflict_list));
        } else {
            sql.push_str(&format!(
                " ON CONFLICT ({}) DO UPDATE SET {}",
                conflict_list,
                assignments.join(", ")
            ));
        }
    }

    Ok(sql)
}

/// Builds an UPDATE keyed on `key_column`, reading the new values from a
/// jsonb object bound to `$1`.
pub fn update_sql(
    table: &str,
    key_column: &str,
    columns: &[String],
) -> Result<String, BackendError> {
    let table_ident = quote_ident(table)?;
    let key_ident = quote_ident(key_column)?;

    let assignments = columns
        .iter()
        .filter(|c| c.as_str() != key_column)
        .map(|c| {
            let ident = quote_ident(c)?;
            Ok(format!("{} = s.{}", ident, ident))
        })
        .collect::<Result<Vec<_>, BackendError>>()?;

    if assignments.is_empty() {
        return Err(BackendError::rejected(table, "update carries no columns besides the key"));
    }

    Ok(format!(
        "UPDATE {table} AS t SET {sets} \
         FROM jsonb_populate_record(NULL::{table}, $1) AS s WHERE t.{key} = s.{key}",
        table = table_ident,
        sets = assignments.join(", "),
        key = key_ident,
    ))
}

/// Builds a call to `function` with named arguments bound to `$1..$n`.
pub fn rpc_sql(function: &str, arg_names: &[&str]) -> Result<String, BackendError> {
    let function_ident = quote_ident(function)?;
    let args = arg_names
        .iter()
        .enumerate()
        .map(|(i, name)| Ok(format!("{} => ${}", quote_ident(name)?, i + 1)))
        .collect::<Result<Vec<_>, BackendError>>()?;

    Ok(format!(
        "SELECT to_jsonb({alias}) AS result FROM {function}({args}) AS {alias}",
        alias = RPC_ALIAS,
        function = function_ident,
        args = args.join(", "),
    ))
}

fn bind_rpc_arg<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    value: &Value,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(Json(other.clone())),
    }
}

/// Scalar functions used in FROM come back as `{"r": value}`.
fn unwrap_rpc_value(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.len() == 1 && map.contains_key(RPC_ALIAS) => {
            map.remove(RPC_ALIAS).unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn into_record(value: Value, table: &str) -> Result<Record, BackendError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(BackendError::query(table, format!("expected a row object, got {}", other))),
    }
}

/// [`Backend`] over a sqlx Postgres pool.
#[derive(Clone)]
pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    pub async fn connect(database_url: &str) -> Result<Self, BackendError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| BackendError::query("database", e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database connectivity and basic health
    pub async fn check_health(&self) -> Result<(), BackendError> {
        info!("Checking database connectivity...");

        let row = sqlx::query("SELECT version(), current_database(), current_user")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| BackendError::query("database", e.to_string()))?;

        let column = |index: usize| -> Result<String, BackendError> {
            row.try_get(index)
                .map_err(|e| BackendError::query("database", e.to_string()))
        };
        let version = column(0)?;
        let database = column(1)?;
        let user = column(2)?;

        info!("Database health check passed:");
        info!("  Version: {}", version);
        info!("  Database: {}", database);
        info!("  User: {}", user);

        Ok(())
    }

    async fn write(
        &self,
        table: &str,
        records: &[Record],
        on_conflict: Option<OnConflict<'_>>,
    ) -> Result<u64, BackendError> {
        if records.is_empty() {
            return Ok(0);
        }
        let columns = record_columns(records);
        let sql = insert_sql(table, &columns, on_conflict)?;
        let payload = Value::Array(records.iter().cloned().map(Value::Object).collect());

        sqlx::query(&sql)
            .bind(Json(payload))
            .execute(&self.pool)
            .await
            .map(|result| result.rows_affected())
            .map_err(|e| map_sqlx_error(e, Target::Relation(table)))
    }
}

#[async_trait::async_trait]
impl Backend for PgBackend {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn select(
        &self,
        table: &str,
        criteria: QueryCriteria,
    ) -> Result<Vec<Record>, BackendError> {
        let (sql, values) = select_sql(table, &criteria)?;
        let mut query = sqlx::query(&sql);
        for value in values {
            query = query.bind(Json(value));
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, Target::Relation(table)))?;

        rows.into_iter()
            .map(|row| {
                let Json(value): Json<Value> = row
                    .try_get("row")
                    .map_err(|e| BackendError::query(table, e.to_string()))?;
                into_record(value, table)
            })
            .collect()
    }

    async fn count(&self, table: &str) -> Result<i64, BackendError> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table)?);
        sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, Target::Relation(table)))
    }

    async fn insert(&self, table: &str, records: &[Record]) -> Result<u64, BackendError> {
        self.write(table, records, None).await
    }

    async fn update(
        &self,
        table: &str,
        key_column: &str,
        record: &Record,
    ) -> Result<u64, BackendError> {
        if !record.contains_key(key_column) {
            return Err(BackendError::rejected(
                table,
                format!("record has no {} value", key_column),
            ));
        }
        let columns: Vec<String> = record.keys().cloned().collect();
        let sql = update_sql(table, key_column, &columns)?;

        sqlx::query(&sql)
            .bind(Json(Value::Object(record.clone())))
            .execute(&self.pool)
            .await
            .map(|result| result.rows_affected())
            .map_err(|e| map_sqlx_error(e, Target::Relation(table)))
    }

    async fn upsert(
        &self,
        table: &str,
        records: &[Record],
        conflict_columns: &[&str],
        insert_only: &[&str],
    ) -> Result<u64, BackendError> {
        let on_conflict = OnConflict {
            columns: conflict_columns,
            insert_only,
        };
        self.write(table, records, Some(on_conflict)).await
    }

    async fn rpc(&self, function: &str, args: &Record) -> Result<Value, BackendError> {
        let names: Vec<&str> = args.keys().map(String::as_str).collect();
        let sql = rpc_sql(function, &names)?;

        let mut query = sqlx::query(&sql);
        for value in args.values() {
            query = bind_rpc_arg(query, value);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, Target::Procedure(function)))?;

        let mut values = rows
            .into_iter()
            .map(|row| {
                let Json(value): Json<Value> = row
                    .try_get("result")
                    .map_err(|e| BackendError::query(function, e.to_string()))?;
                Ok(unwrap_rpc_value(value))
            })
            .collect::<Result<Vec<_>, BackendError>>()?;

        Ok(match values.len() {
            0 => Value::Null,
            1 => values.remove(0),
            _ => Value::Array(values),
        })
    }

    async fn procedure_exists(&self, function: &str) -> Result<bool, BackendError> {
        quote_ident(function)?;
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM pg_proc p
                JOIN pg_namespace n ON n.oid = p.pronamespace
                WHERE p.proname = $1 AND n.nspname = ANY(current_schemas(false))
            )
            "#,
        )
        .bind(function)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| BackendError::query(function, e.to_string()))
    }
}
