use std::cmp::Ordering;
use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, error, info, warn};
use wheel_database::{BackendError, QueryCriteria, Record};

use super::{fetch_source, require_source, snapshot_source, StageContext, StageExit, StageResult};
use crate::mapper::{identity_key, map_legacy_to_target, merge_challenge_into_step, MappingKind};
use crate::stats::ENTITY_CHALLENGES;
use crate::MigrationStats;

/// Folds legacy challenges into `steps`, keeping each challenge id.
pub(super) async fn run(ctx: &StageContext<'_>, stats: &mut MigrationStats) -> StageResult {
    let tables = &ctx.config.tables;
    require_source(ctx, &tables.challenges).await?;

    // Legacy tables order by either `order_index` or `order`, so sort here.
    let mut challenges = fetch_source(ctx, &tables.challenges, QueryCriteria::new()).await?;
    challenges.sort_by(compare_position);
    info!("Consolidating {} challenges into {}", challenges.len(), tables.steps);
    if challenges.is_empty() {
        return Ok(());
    }
    snapshot_source(ctx, &tables.challenges, &challenges)?;

    let phase_ids = load_phase_ids(ctx).await?;
    let entity = stats.entity(ENTITY_CHALLENGES);

    for challenge in &challenges {
        entity.processed += 1;

        let Some(id) = challenge.get("id").filter(|v| !v.is_null()).cloned() else {
            let raw = Value::Object(challenge.clone());
            error!("Challenge without an id cannot be migrated: {}", raw);
            entity.errors += 1;
            continue;
        };

        if let (Some(known), Some(phase_id)) = (&phase_ids, challenge.get("phase_id")) {
            if !phase_id.is_null() && !known.contains(&identity_key(phase_id)) {
                error!("Challenge {} references unknown phase {}", identity_key(&id), phase_id);
                entity.errors += 1;
                continue;
            }
        }

        let existing = match find_step(ctx, &id).await {
            Ok(existing) => existing,
            Err(e) => {
                error!("Failed to look up step {}: {}", identity_key(&id), e);
                entity.errors += 1;
                continue;
            }
        };

        match existing {
            Some(step) => {
                let merged = merge_challenge_into_step(&step, challenge);
                match ctx.backend.update(&tables.steps, "id", &merged).await {
                    Ok(_) => {
                        debug!("Merged challenge {} into existing step", identity_key(&id));
                        entity.updated += 1;
                    }
                    Err(e) => {
                        error!("Failed to merge challenge {}: {}", identity_key(&id), e);
                        entity.errors += 1;
                    }
                }
            }
            None => {
                let step = map_legacy_to_target(MappingKind::ChallengeToStep, challenge);
                match ctx.backend.insert(&tables.steps, std::slice::from_ref(&step)).await {
                    Ok(_) => {
                        debug!("Inserted step {} from challenge", identity_key(&id));
                        entity.migrated += 1;
                    }
                    Err(e) => {
                        error!("Failed to insert step {}: {}", identity_key(&id), e);
                        entity.errors += 1;
                    }
                }
            }
        }
    }
    Ok(())
}

fn position(challenge: &Record) -> Option<f64> {
    ["order_index", "order"]
        .iter()
        .filter_map(|field| challenge.get(*field))
        .find_map(Value::as_f64)
}

/// Ascending by position; challenges without one go last.
fn compare_position(a: &Record, b: &Record) -> Ordering {
    match (position(a), position(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

async fn find_step(ctx: &StageContext<'_>, id: &Value) -> Result<Option<Record>, BackendError> {
    let rows = ctx
        .backend
        .select(
            &ctx.config.tables.steps,
            QueryCriteria::new().add_valued_filter("id", "=", id.clone()).limit(1),
        )
        .await?;
    Ok(rows.into_iter().next())
}

/// Known phase ids, or `None` when the phases table is absent and references cannot be checked.
async fn load_phase_ids(ctx: &StageContext<'_>) -> Result<Option<HashSet<String>>, StageExit> {
    let table = &ctx.config.tables.phases;
    match ctx
        .backend
        .select(table, QueryCriteria::new().select_columns(&["id"]))
        .await
    {
        Ok(rows) => Ok(Some(
            rows.iter()
                .filter_map(|row| row.get("id"))
                .map(identity_key)
                .collect(),
        )),
        Err(BackendError::RelationNotFound(_)) => {
            warn!("Table {} does not exist, phase references are not checked", table);
            Ok(None)
        }
        Err(e) => Err(StageExit::Failed(format!("failed to load phases from {}: {}", table, e))),
    }
}
