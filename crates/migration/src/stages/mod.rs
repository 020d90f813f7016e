mod challenges;
mod phases;
mod progress;
mod steps;
mod tools;

use tracing::{info, warn};
use wheel_database::{Backend, BackendError, QueryCriteria, Record};

use crate::probe::{probe_table, TableProbe};
use crate::snapshot::write_snapshot;
use crate::{MigrationConfig, MigrationStats, Stage};

/// Shared, read-only inputs for a stage.
pub struct StageContext<'a> {
    pub backend: &'a dyn Backend,
    pub config: &'a MigrationConfig,
}

/// Why a stage stopped early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageExit {
    Skipped(String),
    Failed(String),
}

pub type StageResult = Result<(), StageExit>;

/// Runs one stage, recording into `stats`. Stats gathered before an early exit are kept.
pub async fn run_stage(
    stage: Stage,
    ctx: &StageContext<'_>,
    stats: &mut MigrationStats,
) -> StageResult {
    match stage {
        Stage::Phases => phases::run(ctx, stats).await,
        Stage::Steps => steps::run(ctx, stats).await,
        Stage::Challenges => challenges::run(ctx, stats).await,
        Stage::Progress => progress::run(ctx, stats).await,
        Stage::Tools => tools::run(ctx, stats).await,
    }
}

/// Probes a source table; absent means skip, a failing probe aborts the stage.
async fn require_source(ctx: &StageContext<'_>, table: &str) -> Result<TableProbe, StageExit> {
    match probe_table(ctx.backend, table).await {
        Ok(probe) if probe.exists => {
            info!("Source table {} has {} rows", table, probe.row_count.unwrap_or(0));
            Ok(probe)
        }
        Ok(_) => {
            warn!("Source table {} does not exist, skipping", table);
            Err(StageExit::Skipped(format!("source table {} does not exist", table)))
        }
        Err(e) => Err(StageExit::Failed(format!("failed to probe {}: {}", table, e))),
    }
}

/// Reads a whole source table. Failure here aborts only the current stage.
async fn fetch_source(
    ctx: &StageContext<'_>,
    table: &str,
    criteria: QueryCriteria,
) -> Result<Vec<Record>, StageExit> {
    match ctx.backend.select(table, criteria).await {
        Ok(rows) => Ok(rows),
        Err(BackendError::RelationNotFound(_)) => {
            warn!("Source table {} disappeared, skipping", table);
            Err(StageExit::Skipped(format!("source table {} does not exist", table)))
        }
        Err(e) => Err(StageExit::Failed(format!("failed to fetch {}: {}", table, e))),
    }
}

/// Writes a snapshot of `rows` when a backup directory is configured.
fn snapshot_source(ctx: &StageContext<'_>, table: &str, rows: &[Record]) -> StageResult {
    let Some(dir) = &ctx.config.backup_dir else {
        return Ok(());
    };
    write_snapshot(dir, table, rows)
        .map(|path| info!("Backed up {} to {}", table, path.display()))
        .map_err(|e| StageExit::Failed(format!("failed to back up {}: {}", table, e)))
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
