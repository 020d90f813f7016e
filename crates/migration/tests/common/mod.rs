#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{json, Value};
use wheel_database::{BackendError, MemoryBackend, Procedure, Record, Tables};
use wheel_migration::{MIGRATE_CHALLENGE_PROGRESS, MIGRATE_STEP_PROGRESS};

pub fn record(value: Value) -> Record {
    value.as_object().cloned().expect("fixture rows are objects")
}

pub fn records(values: Vec<Value>) -> Vec<Record> {
    values.into_iter().map(record).collect()
}

/// Target tables with their unique keys, without procedures or legacy tables.
pub async fn bare_target_schema() -> MemoryBackend {
    let backend = MemoryBackend::new();
    backend.create_table("phases", &[&["id"]]).await;
    backend.create_table("steps", &[&["id"]]).await;
    backend.create_table("tools", &[&["id"]]).await;
    backend
        .create_table("step_tools", &[&["id"], &["step_id", "tool_id"]])
        .await;
    backend
        .create_table("company_step_progress", &[&["company_id", "step_id"]])
        .await;
    backend
}

/// Target schema with both progress procedures, but no legacy tables.
pub async fn target_schema() -> MemoryBackend {
    let backend = bare_target_schema().await;
    backend
        .register_procedure(
            MIGRATE_STEP_PROGRESS,
            move_progress("company_journey_steps", "step_id"),
        )
        .await;
    backend
        .register_procedure(
            MIGRATE_CHALLENGE_PROGRESS,
            move_progress("company_challenge_progress", "challenge_id"),
        )
        .await;
    backend
}

/// Copies every row of `source` into `company_step_progress` and returns how many moved.
fn move_progress(source: &'static str, step_column: &'static str) -> Procedure {
    Arc::new(
        move |tables: &mut Tables, _args: &Record| -> Result<Value, BackendError> {
            let rows = tables
                .get(source)
                .map(|t| t.rows().to_vec())
                .unwrap_or_default();
            let target = tables.get_mut("company_step_progress").ok_or_else(|| {
                BackendError::RelationNotFound("company_step_progress".to_string())
            })?;
            for row in &rows {
                let field = |name: &str, default: Value| row.get(name).cloned().unwrap_or(default);
                target.push_row(record(json!({
                    "company_id": field("company_id", Value::Null),
                    "step_id": field(step_column, Value::Null),
                    "status": field("status", json!("not_started")),
                    "completion_percentage": field("completion_percentage", json!(0)),
                })));
            }
            Ok(json!(rows.len()))
        },
    )
}

/// A small but complete legacy dataset touching every stage.
pub async fn seeded_backend() -> MemoryBackend {
    let backend = target_schema().await;
    backend
        .seed(
            "phases",
            records(vec![
                json!({"id": "p1", "name": "Validate", "order_index": 0, "color": null}),
                json!({"id": "p2", "name": "Build", "order_index": 1, "color": "#000000"}),
            ]),
        )
        .await;
    backend
        .seed(
            "steps",
            records(vec![
                json!({
                    "id": "s1", "name": "Interview customers", "phase_id": "p1", "order_index": 0,
                    "difficulty_level": null,
                    "estimated_time_min": null, "estimated_time_max": null,
                    "key_outcomes": null, "prerequisite_steps": null, "is_custom": null
                }),
                json!({
                    "id": "s2", "name": "Ship MVP", "phase_id": "p2", "order_index": 1,
                    "difficulty_level": 4,
                    "estimated_time_min": 10, "estimated_time_max": 20,
                    "key_outcomes": ["mvp"], "prerequisite_steps": [], "is_custom": true
                }),
            ]),
        )
        .await;
    backend
        .seed(
            "journey_challenges",
            records(vec![json!({
                "id": "c1", "name": "Validate Idea", "phase_id": "p1", "order_index": 1
            })]),
        )
        .await;
    backend
        .seed(
            "journey_step_tools",
            records(vec![
                json!({"id": "t1", "step_id": "s1", "name": "Typeform", "ranking": 4}),
                json!({"id": "t1", "step_id": "s2", "name": "Typeform", "ranking": 4}),
                json!({"tool_id": "t2", "challenge_id": "c1", "tool_name": "Notion"}),
            ]),
        )
        .await;
    backend
        .seed(
            "company_journey_steps",
            records(vec![
                json!({"company_id": "co1", "step_id": "s1",
                       "status": "completed", "completion_percentage": 100}),
                json!({"company_id": "co1", "step_id": "s2",
                       "status": "in_progress", "completion_percentage": 40}),
            ]),
        )
        .await;
    backend
}

pub fn find<'a>(rows: &'a [Record], column: &str, value: &str) -> Option<&'a Record> {
    rows.iter().find(|row| row.get(column).and_then(Value::as_str) == Some(value))
}

pub fn sorted_ids(rows: &[Record]) -> Vec<String> {
    let mut ids: Vec<String> = rows
        .iter()
        .filter_map(|row| row.get("id").and_then(Value::as_str).map(str::to_string))
        .collect();
    ids.sort();
    ids
}
