use serde::Serialize;
use tracing::{debug, error, info};
use wheel_database::{Backend, Record};

use crate::config::DEFAULT_BATCH_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub batch_index: usize,
    /// Offset of the batch's first record in the input.
    pub first_record: usize,
    pub size: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpsertOutcome {
    pub succeeded: u64,
    pub failed: u64,
    pub errors: Vec<BatchFailure>,
}

impl UpsertOutcome {
    /// Whether the record at `index` of the input belonged to a failed batch.
    pub fn record_failed(&self, index: usize) -> bool {
        self.errors
            .iter()
            .any(|e| index >= e.first_record && index < e.first_record + e.size)
    }
}

/// Upserts `records` in sequential batches of `batch_size` on `conflict_keys`.
///
/// `insert_only` columns keep their stored value when the row already exists.
/// A rejected batch is recorded and the remaining batches still run. A batch
/// is accepted or rejected as a whole by the backend.
pub async fn upsert_batches(
    backend: &dyn Backend,
    table: &str,
    records: &[Record],
    conflict_keys: &[&str],
    insert_only: &[&str],
    batch_size: usize,
) -> UpsertOutcome {
    let batch_size = if batch_size == 0 { DEFAULT_BATCH_SIZE } else { batch_size };
    let total_batches = records.len().div_ceil(batch_size);
    let mut outcome = UpsertOutcome::default();

    for (batch_index, chunk) in records.chunks(batch_size).enumerate() {
        debug!(
            "Upserting batch {}/{} into {} ({} records)",
            batch_index + 1,
            total_batches,
            table,
            chunk.len()
        );

        match backend.upsert(table, chunk, conflict_keys, insert_only).await {
            Ok(_) => outcome.succeeded += chunk.len() as u64,
            Err(e) => {
                error!(
                    "Batch {}/{} into {} failed: {}",
                    batch_index + 1,
                    total_batches,
                    table,
                    e
                );
                outcome.failed += chunk.len() as u64;
                outcome.errors.push(BatchFailure {
                    batch_index,
                    first_record: batch_index * batch_size,
                    size: chunk.len(),
                    message: e.to_string(),
                });
            }
        }
    }

    info!(
        "Upserted {} records into {} ({} succeeded, {} failed)",
        records.len(),
        table,
        outcome.succeeded,
        outcome.failed
    );
    outcome
}
