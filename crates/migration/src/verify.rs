use serde::Serialize;
use tracing::{info, warn};
use wheel_database::Backend;

use crate::config::TableNames;
use crate::probe::probe_table;
use crate::stats::{
    ENTITY_CHALLENGES, ENTITY_PHASES, ENTITY_PROGRESS, ENTITY_STEPS, ENTITY_STEP_TOOLS,
    ENTITY_TOOLS,
};
use crate::MigrationStats;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationEntry {
    pub entity: String,
    pub table: String,
    /// `None` when the table does not exist or could not be counted.
    pub row_count: Option<i64>,
    pub expected_min: u64,
    pub consistent: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub entries: Vec<VerificationEntry>,
    pub warnings: Vec<String>,
}

impl Verification {
    pub fn is_consistent(&self) -> bool {
        self.warnings.is_empty()
    }
}

fn target_tables(tables: &TableNames) -> [(&'static str, &str); 6] {
    [
        (ENTITY_PHASES, &tables.phases),
        (ENTITY_STEPS, &tables.steps),
        (ENTITY_CHALLENGES, &tables.steps),
        (ENTITY_PROGRESS, &tables.progress),
        (ENTITY_TOOLS, &tables.tools),
        (ENTITY_STEP_TOOLS, &tables.step_tools),
    ]
}

/// Re-counts every target table and checks it against the run's stats.
///
/// Each entity's table must hold at least the rows the run claims to have
/// written or left in place. Mismatches are reported, never repaired.
pub async fn verify(
    backend: &dyn Backend,
    tables: &TableNames,
    stats: &MigrationStats,
) -> Verification {
    let mut verification = Verification::default();

    for (entity, table) in target_tables(tables) {
        let expected_min = stats
            .get(entity)
            .map(|s| s.processed.saturating_sub(s.skipped).saturating_sub(s.errors))
            .unwrap_or(0);

        let row_count = match probe_table(backend, table).await {
            Ok(probe) => probe.row_count,
            Err(e) => {
                verification.warnings.push(format!("could not count {}: {}", table, e));
                None
            }
        };

        let consistent = match row_count {
            Some(count) => count.max(0) as u64 >= expected_min,
            None => expected_min == 0,
        };
        if !consistent {
            let message = format!(
                "{} holds {} rows but {} {} rows were expected",
                table,
                row_count.map(|c| c.to_string()).unwrap_or_else(|| "no".to_string()),
                expected_min,
                entity
            );
            warn!("{}", message);
            verification.warnings.push(message);
        }

        info!(
            "Verified {} ({}): {:?} rows, expected at least {}",
            entity, table, row_count, expected_min
        );
        verification.entries.push(VerificationEntry {
            entity: entity.to_string(),
            table: table.to_string(),
            row_count,
            expected_min,
            consistent,
        });
    }

    verification
}
