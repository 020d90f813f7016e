use serde_json::Value;
use tracing::{error, info, warn};
use wheel_database::{BackendError, Record};

use super::{require_source, StageContext, StageExit, StageResult};
use crate::config::{MIGRATE_CHALLENGE_PROGRESS, MIGRATE_STEP_PROGRESS};
use crate::probe::probe_table;
use crate::stats::ENTITY_PROGRESS;
use crate::MigrationStats;

/// Moves company progress into the unified table through server-side procedures.
///
/// Guarded: a populated target is left alone unless the run is forced.
pub(super) async fn run(ctx: &StageContext<'_>, stats: &mut MigrationStats) -> StageResult {
    let tables = &ctx.config.tables;

    let target = require_source(ctx, &tables.progress).await?;
    if target.has_rows() && !ctx.config.force {
        warn!(
            "{} already holds {} rows, set FORCE_MIGRATION=true to migrate progress again",
            tables.progress,
            target.row_count.unwrap_or(0)
        );
        return Err(StageExit::Skipped(format!(
            "{} already populated (set FORCE_MIGRATION=true to override)",
            tables.progress
        )));
    }

    let sources = [
        (&tables.legacy_step_progress, MIGRATE_STEP_PROGRESS),
        (&tables.legacy_challenge_progress, MIGRATE_CHALLENGE_PROGRESS),
    ];

    let mut present = Vec::new();
    for (table, procedure) in sources {
        match probe_table(ctx.backend, table).await {
            Ok(probe) if probe.exists => present.push((table, procedure)),
            Ok(_) => info!("Legacy progress table {} does not exist", table),
            Err(e) => return Err(StageExit::Failed(format!("failed to probe {}: {}", table, e))),
        }
    }
    if present.is_empty() {
        warn!("No legacy progress tables found, skipping");
        return Err(StageExit::Skipped("no legacy progress tables exist".to_string()));
    }

    let entity = stats.entity(ENTITY_PROGRESS);
    for (table, procedure) in present {
        let before = ctx.backend.count(&tables.progress).await;

        match ctx.backend.rpc(procedure, &Record::new()).await {
            Ok(result) => {
                let moved = match rows_moved(&result) {
                    Some(moved) => Ok(moved),
                    None => {
                        let after = ctx.backend.count(&tables.progress).await;
                        count_delta(before, after)
                    }
                };
                match moved {
                    Ok(moved) => {
                        info!("{}() moved {} rows from {}", procedure, moved, table);
                        entity.processed += moved;
                        entity.migrated += moved;
                    }
                    Err(e) => {
                        error!(
                            "{}() ran but rows moved from {} could not be counted: {}",
                            procedure, table, e
                        );
                        entity.errors += 1;
                    }
                }
            }
            Err(e) => {
                error!("{}() failed: {}", procedure, e);
                entity.errors += 1;
            }
        }
    }
    Ok(())
}

/// Row count reported by a progress procedure, when it reports one.
fn rows_moved(result: &Value) -> Option<u64> {
    match result {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Rows added to the target between two counts.
fn count_delta(
    before: Result<i64, BackendError>,
    after: Result<i64, BackendError>,
) -> Result<u64, BackendError> {
    Ok((after? - before?).max(0) as u64)
}
