mod backend;
mod criteria;
mod env;
mod error;
mod memory;

#[cfg(feature = "postgres")]
mod postgres;

pub use backend::{quote_ident, record_columns, Backend, Record};
pub use criteria::{FilterCondition, FilterOperator, OrderDirection, QueryCriteria};
pub use env::DatabaseEnv;
pub use error::BackendError;
pub use memory::{MemoryBackend, MemoryTable, Procedure, Tables};

#[cfg(feature = "postgres")]
pub use postgres::{insert_sql, rpc_sql, select_sql, update_sql, OnConflict, PgBackend};
