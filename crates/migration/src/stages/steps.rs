use tracing::info;
use wheel_database::{OrderDirection, QueryCriteria};

use super::{fetch_source, require_source, snapshot_source, StageContext, StageResult};
use crate::mapper::{map_legacy_to_target, needs_step_enrichment, MappingKind};
use crate::stats::ENTITY_STEPS;
use crate::upsert::upsert_batches;
use crate::MigrationStats;

/// Fills default difficulty, timing, outcome and prerequisite values on existing steps.
pub(super) async fn run(ctx: &StageContext<'_>, stats: &mut MigrationStats) -> StageResult {
    let table = &ctx.config.tables.steps;
    require_source(ctx, table).await?;

    let steps = fetch_source(
        ctx,
        table,
        QueryCriteria::new().order_by("order_index", OrderDirection::Asc),
    )
    .await?;

    let (pending, complete): (Vec<_>, Vec<_>) = steps.into_iter().partition(needs_step_enrichment);
    info!("{} steps need defaults, {} are already complete", pending.len(), complete.len());

    let entity = stats.entity(ENTITY_STEPS);
    entity.processed += (pending.len() + complete.len()) as u64;
    entity.skipped += complete.len() as u64;
    if pending.is_empty() {
        return Ok(());
    }

    snapshot_source(ctx, table, &pending)?;

    let updates: Vec<_> = pending
        .iter()
        .map(|step| map_legacy_to_target(MappingKind::StepUpdate, step))
        .collect();

    let outcome = upsert_batches(
        ctx.backend,
        table,
        &updates,
        &["id"],
        &[],
        ctx.config.effective_batch_size(),
    )
    .await;

    entity.updated += outcome.succeeded;
    entity.errors += outcome.failed;
    Ok(())
}
