use serde::Serialize;
use tracing::debug;
use wheel_database::{Backend, BackendError};

/// Result of probing a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableProbe {
    pub exists: bool,
    pub row_count: Option<i64>,
}

impl TableProbe {
    pub fn missing() -> Self {
        Self { exists: false, row_count: None }
    }

    pub fn present(row_count: i64) -> Self {
        Self { exists: true, row_count: Some(row_count) }
    }

    pub fn has_rows(&self) -> bool {
        self.row_count.unwrap_or(0) > 0
    }
}

/// Checks whether `table` exists and how many rows it holds.
///
/// A missing relation is a normal negative answer. Every other backend
/// failure is returned as an error.
pub async fn probe_table(backend: &dyn Backend, table: &str) -> Result<TableProbe, BackendError> {
    match backend.count(table).await {
        Ok(count) => {
            debug!("Probed {}: {} rows", table, count);
            Ok(TableProbe::present(count))
        }
        Err(BackendError::RelationNotFound(_)) => {
            debug!("Probed {}: does not exist", table);
            Ok(TableProbe::missing())
        }
        Err(e) => Err(e),
    }
}
