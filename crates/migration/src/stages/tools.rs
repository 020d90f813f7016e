use std::collections::HashSet;

use serde_json::{json, Value};
use tracing::{info, warn};
use wheel_database::{QueryCriteria, Record};

use super::{
    fetch_source, now_rfc3339, require_source, snapshot_source, StageContext, StageResult,
};
use crate::dedupe::dedupe_by_key;
use crate::mapper::{
    association_step_id, identity_key, map_legacy_to_target, tool_identity, MappingKind,
};
use crate::stats::{ENTITY_STEP_TOOLS, ENTITY_TOOLS};
use crate::upsert::upsert_batches;
use crate::MigrationStats;

/// Kept from the first write so re-runs leave existing rows' identity and age alone.
const TOOL_INSERT_ONLY: &[&str] = &["created_at"];
const LINK_INSERT_ONLY: &[&str] = &["id", "created_at"];

/// Splits legacy embedded tool rows into `tools` and `step_tools`.
pub(super) async fn run(ctx: &StageContext<'_>, stats: &mut MigrationStats) -> StageResult {
    let tables = &ctx.config.tables;
    require_source(ctx, &tables.legacy_step_tools).await?;

    let legacy = fetch_source(ctx, &tables.legacy_step_tools, QueryCriteria::new()).await?;
    info!("Read {} legacy tool associations from {}", legacy.len(), tables.legacy_step_tools);
    if legacy.is_empty() {
        return Ok(());
    }
    snapshot_source(ctx, &tables.legacy_step_tools, &legacy)?;

    let batch_size = ctx.config.effective_batch_size();
    let now = now_rfc3339();

    // Tools: one per identity, first legacy row wins.
    let with_identity: Vec<&Record> = legacy
        .iter()
        .filter(|row| tool_identity(row).is_some())
        .collect();
    let tool_rows = with_identity.len();
    let tools = dedupe_by_key(with_identity, |row| {
        tool_identity(row).map(|v| identity_key(&v))
    });
    let tool_records: Vec<Record> = tools
        .unique
        .iter()
        .map(|row| {
            let mut tool = map_legacy_to_target(MappingKind::LegacyToolToTool, row);
            fill_timestamp(&mut tool, "created_at", &now);
            fill_timestamp(&mut tool, "updated_at", &now);
            tool
        })
        .collect();

    let tool_outcome = upsert_batches(
        ctx.backend,
        &tables.tools,
        &tool_records,
        &["id"],
        TOOL_INSERT_ONLY,
        batch_size,
    )
    .await;
    let failed_tools: HashSet<String> = tool_records
        .iter()
        .enumerate()
        .filter(|(index, _)| tool_outcome.record_failed(*index))
        .filter_map(|(_, tool)| tool.get("id").map(identity_key))
        .collect();

    let tool_stats = stats.entity(ENTITY_TOOLS);
    tool_stats.processed += tool_rows as u64;
    tool_stats.skipped += tools.dropped as u64;
    tool_stats.migrated += tool_outcome.succeeded;
    tool_stats.errors += tool_outcome.failed;

    // Associations: one per (step, tool) pair.
    let link_stats = stats.entity(ENTITY_STEP_TOOLS);
    link_stats.processed += legacy.len() as u64;

    let mut links = Vec::new();
    for row in &legacy {
        let (Some(step_id), Some(tool_id)) = (association_step_id(row), tool_identity(row)) else {
            let raw = Value::Object(row.clone());
            warn!("Legacy tool row without step or tool id: {}", raw);
            link_stats.errors += 1;
            continue;
        };
        if failed_tools.contains(&identity_key(&tool_id)) {
            warn!(
                "Tool {} was not written, skipping its link to step {}",
                identity_key(&tool_id),
                identity_key(&step_id)
            );
            link_stats.errors += 1;
            continue;
        }
        let mut link = map_legacy_to_target(MappingKind::LegacyMappingToStepTool, row);
        fill_timestamp(&mut link, "created_at", &now);
        links.push(link);
    }

    let links = dedupe_by_key(links, |link| {
        (
            link.get("step_id").map(identity_key),
            link.get("tool_id").map(identity_key),
        )
    });
    link_stats.skipped += links.dropped as u64;

    let link_outcome = upsert_batches(
        ctx.backend,
        &tables.step_tools,
        &links.unique,
        &["step_id", "tool_id"],
        LINK_INSERT_ONLY,
        batch_size,
    )
    .await;
    link_stats.migrated += link_outcome.succeeded;
    link_stats.errors += link_outcome.failed;

    info!(
        "Migrated {} tools and {} step links ({} duplicate tool rows, {} duplicate links)",
        tool_outcome.succeeded, link_outcome.succeeded, tools.dropped, links.dropped
    );
    Ok(())
}

fn fill_timestamp(record: &mut Record, field: &str, now: &str) {
    if record.get(field).map(Value::is_null).unwrap_or(true) {
        record.insert(field.to_string(), json!(now));
    }
}
