use tracing::{debug, error, info, warn};
use wheel_database::{OrderDirection, QueryCriteria};

use super::{fetch_source, require_source, snapshot_source, StageContext, StageResult};
use crate::mapper::{map_legacy_to_target, phase_needs_color, MappingKind};
use crate::stats::ENTITY_PHASES;
use crate::MigrationStats;

/// Assigns a palette colour to every phase that has none.
pub(super) async fn run(ctx: &StageContext<'_>, stats: &mut MigrationStats) -> StageResult {
    let table = &ctx.config.tables.phases;
    require_source(ctx, table).await?;

    let phases = fetch_source(
        ctx,
        table,
        QueryCriteria::new().order_by("order_index", OrderDirection::Asc),
    )
    .await?;

    let pending: Vec<_> = phases.iter().filter(|p| phase_needs_color(p)).collect();
    info!("{} of {} phases are missing a color", pending.len(), phases.len());

    let entity = stats.entity(ENTITY_PHASES);
    entity.processed += phases.len() as u64;
    entity.skipped += (phases.len() - pending.len()) as u64;
    if pending.is_empty() {
        return Ok(());
    }

    let originals: Vec<_> = pending.iter().map(|p| (*p).clone()).collect();
    snapshot_source(ctx, table, &originals)?;

    for phase in pending {
        let update = map_legacy_to_target(MappingKind::PhaseUpdate, phase);
        let id = update.get("id").cloned().unwrap_or_default();

        match ctx.backend.update(table, "id", &update).await {
            Ok(0) => {
                warn!("Phase {} vanished before it could be updated", id);
                entity.errors += 1;
            }
            Ok(_) => {
                debug!("Phase {} colored {}", id, update["color"]);
                entity.updated += 1;
            }
            Err(e) => {
                error!("Failed to update phase {}: {}", id, e);
                entity.errors += 1;
            }
        }
    }
    Ok(())
}
