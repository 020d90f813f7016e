//! Pure record transformations from the legacy table shapes to the target schema.
//!
//! Every mapping keeps the source identity field, since the target tables
//! reuse the legacy primary keys and existing foreign keys must keep resolving.

use serde_json::{json, Value};
use uuid::Uuid;
use wheel_database::Record;

pub const PHASE_PALETTE: [&str; 8] = [
    "#3B82F6", "#10B981", "#F59E0B", "#EF4444", "#8B5CF6", "#EC4899", "#06B6D4", "#84CC16",
];

pub const DEFAULT_DIFFICULTY_LEVEL: i64 = 3;
pub const DEFAULT_ESTIMATED_TIME_MIN: i64 = 30;
pub const DEFAULT_ESTIMATED_TIME_MAX: i64 = 60;
pub const DEFAULT_RELEVANCE_SCORE: f64 = 0.5;
pub const MAX_RANKING: f64 = 5.0;

pub const DEFAULT_TOOL_TYPE: &str = "external";
pub const DEFAULT_TOOL_STATUS: &str = "approved";
pub const DEFAULT_TOOL_SOURCE: &str = "migration";
pub const UNNAMED_TOOL: &str = "Unnamed Tool";
pub const UNNAMED_STEP: &str = "Unnamed Step";

const STEP_ENRICHMENT_FIELDS: [&str; 6] = [
    "difficulty_level",
    "estimated_time_min",
    "estimated_time_max",
    "key_outcomes",
    "prerequisite_steps",
    "is_custom",
];

/// Target field ← first non-null source field in the list.
const CHALLENGE_TO_STEP_FIELDS: &[(&str, &[&str])] = &[
    ("id", &["id"]),
    ("name", &["name", "title"]),
    ("description", &["description"]),
    ("phase_id", &["phase_id"]),
    ("order_index", &["order_index", "order"]),
    ("difficulty_level", &["difficulty_level", "difficulty"]),
    ("estimated_time_min", &["estimated_time_min"]),
    ("estimated_time_max", &["estimated_time_max"]),
    ("key_outcomes", &["key_outcomes"]),
    ("prerequisite_steps", &["prerequisite_steps", "prerequisites"]),
    ("is_custom", &["is_custom"]),
];

const LEGACY_TOOL_FIELDS: &[(&str, &[&str])] = &[
    ("name", &["name", "tool_name"]),
    ("description", &["description"]),
    ("url", &["url", "website"]),
    ("logo_url", &["logo_url", "logo"]),
    ("type", &["type", "tool_type"]),
    ("category", &["category"]),
    ("subcategory", &["subcategory"]),
    ("is_premium", &["is_premium"]),
    ("pros", &["pros"]),
    ("cons", &["cons"]),
    ("customer_stage", &["customer_stage"]),
    ("status", &["status"]),
    ("source", &["source"]),
    ("created_at", &["created_at"]),
    ("updated_at", &["updated_at"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingKind {
    PhaseUpdate,
    StepUpdate,
    ChallengeToStep,
    LegacyToolToTool,
    LegacyMappingToStepTool,
}

pub fn map_legacy_to_target(kind: MappingKind, record: &Record) -> Record {
    match kind {
        MappingKind::PhaseUpdate => phase_update(record),
        MappingKind::StepUpdate => step_update(record),
        MappingKind::ChallengeToStep => challenge_to_step(record),
        MappingKind::LegacyToolToTool => legacy_tool_to_tool(record),
        MappingKind::LegacyMappingToStepTool => legacy_mapping_to_step_tool(record),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn first_present<'a>(record: &'a Record, sources: &[&str]) -> Option<&'a Value> {
    sources
        .iter()
        .filter_map(|field| record.get(*field))
        .find(|v| !v.is_null())
}

fn as_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

/// Text form of an identity value, used for dedupe keys and placeholders.
pub fn identity_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn phase_color(order_index: i64) -> &'static str {
    PHASE_PALETTE[order_index.rem_euclid(PHASE_PALETTE.len() as i64) as usize]
}

pub fn phase_needs_color(record: &Record) -> bool {
    record.get("color").map(is_blank).unwrap_or(true)
}

pub fn step_enrichment_default(field: &str) -> Value {
    match field {
        "difficulty_level" => json!(DEFAULT_DIFFICULTY_LEVEL),
        "estimated_time_min" => json!(DEFAULT_ESTIMATED_TIME_MIN),
        "estimated_time_max" => json!(DEFAULT_ESTIMATED_TIME_MAX),
        "key_outcomes" | "prerequisite_steps" => json!([]),
        "is_custom" => json!(false),
        _ => Value::Null,
    }
}

pub fn needs_step_enrichment(record: &Record) -> bool {
    STEP_ENRICHMENT_FIELDS
        .iter()
        .any(|field| record.get(*field).map(Value::is_null).unwrap_or(true))
}

/// Maps a 1–5 ranking to a 0–1 relevance score; absent or unreadable rankings give 0.5.
pub fn relevance_from_ranking(ranking: Option<&Value>) -> f64 {
    match ranking.and_then(as_f64) {
        Some(r) => (r / MAX_RANKING).clamp(0.0, 1.0),
        None => DEFAULT_RELEVANCE_SCORE,
    }
}

/// Identity of the tool embedded in a legacy association row: `tool_id`, else `id`.
pub fn tool_identity(record: &Record) -> Option<Value> {
    first_present(record, &["tool_id", "id"])
        .filter(|v| !is_blank(v))
        .cloned()
}

/// Step referenced by a legacy association row: `step_id`, else the older `challenge_id`.
pub fn association_step_id(record: &Record) -> Option<Value> {
    first_present(record, &["step_id", "challenge_id"])
        .filter(|v| !is_blank(v))
        .cloned()
}

/// Deterministic association id so repeated runs write the same row.
pub fn step_tool_id(step_id: &Value, tool_id: &Value) -> String {
    let name = format!("step_tools:{}:{}", identity_key(step_id), identity_key(tool_id));
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

fn placeholder_name(id: Option<&Value>, prefix: &str, fallback: &str) -> String {
    match id.map(identity_key) {
        Some(key) if !key.is_empty() => {
            let short: String = key.chars().take(8).collect();
            format!("{} {}", prefix, short)
        }
        _ => fallback.to_string(),
    }
}

fn phase_update(record: &Record) -> Record {
    let mut out = Record::new();
    out.insert("id".to_string(), record.get("id").cloned().unwrap_or(Value::Null));

    let color = match record.get("color") {
        Some(existing) if !is_blank(existing) => existing.clone(),
        _ => {
            let order_index = record.get("order_index").and_then(as_f64).unwrap_or(0.0) as i64;
            json!(phase_color(order_index))
        }
    };
    out.insert("color".to_string(), color);
    out
}

fn step_update(record: &Record) -> Record {
    let mut out = record.clone();
    for field in STEP_ENRICHMENT_FIELDS {
        if out.get(field).map(Value::is_null).unwrap_or(true) {
            out.insert(field.to_string(), step_enrichment_default(field));
        }
    }
    out
}

fn challenge_to_step(record: &Record) -> Record {
    let mut out = Record::new();
    for (target, sources) in CHALLENGE_TO_STEP_FIELDS {
        let value = first_present(record, sources).cloned().unwrap_or(Value::Null);
        out.insert(target.to_string(), value);
    }

    if out.get("name").map(is_blank).unwrap_or(true) {
        let name = placeholder_name(record.get("id"), "Step", UNNAMED_STEP);
        out.insert("name".to_string(), json!(name));
    }
    for field in STEP_ENRICHMENT_FIELDS {
        if out.get(field).map(Value::is_null).unwrap_or(true) {
            out.insert(field.to_string(), step_enrichment_default(field));
        }
    }
    out
}

/// Folds a legacy challenge into an existing step with the same id.
///
/// For each enrichment field the challenge's value wins, then the step's own
/// value, then the default. The step keeps its name; an empty step
/// description is filled from the challenge.
pub fn merge_challenge_into_step(existing: &Record, challenge: &Record) -> Record {
    let mut out = Record::new();
    out.insert(
        "id".to_string(),
        existing.get("id").or_else(|| challenge.get("id")).cloned().unwrap_or(Value::Null),
    );

    for field in STEP_ENRICHMENT_FIELDS {
        let sources = CHALLENGE_TO_STEP_FIELDS
            .iter()
            .find(|(target, _)| *target == field)
            .map(|(_, sources)| *sources)
            .unwrap_or(&[]);
        let value = first_present(challenge, sources)
            .or_else(|| existing.get(field).filter(|v| !v.is_null()))
            .cloned()
            .unwrap_or_else(|| step_enrichment_default(field));
        out.insert(field.to_string(), value);
    }

    let existing_blank = existing.get("description").map(is_blank).unwrap_or(true);
    if existing_blank {
        if let Some(description) = challenge.get("description").filter(|v| !is_blank(v)) {
            out.insert("description".to_string(), description.clone());
        }
    }
    out
}

fn legacy_tool_to_tool(record: &Record) -> Record {
    let identity = tool_identity(record);

    let mut out = Record::new();
    out.insert("id".to_string(), identity.clone().unwrap_or(Value::Null));
    for (target, sources) in LEGACY_TOOL_FIELDS {
        let value = first_present(record, sources).cloned().unwrap_or(Value::Null);
        out.insert(target.to_string(), value);
    }

    if out.get("name").map(is_blank).unwrap_or(true) {
        let name = placeholder_name(identity.as_ref(), "Tool", UNNAMED_TOOL);
        out.insert("name".to_string(), json!(name));
    }

    let defaults = [
        ("type", json!(DEFAULT_TOOL_TYPE)),
        ("status", json!(DEFAULT_TOOL_STATUS)),
        ("source", json!(DEFAULT_TOOL_SOURCE)),
        ("is_premium", json!(false)),
    ];
    for (field, default) in defaults {
        if out.get(field).map(is_blank).unwrap_or(true) {
            out.insert(field.to_string(), default);
        }
    }

    // Leave timestamps to the caller rather than writing explicit nulls.
    for field in ["created_at", "updated_at"] {
        if out.get(field).map(Value::is_null).unwrap_or(false) {
            out.remove(field);
        }
    }
    out
}

fn legacy_mapping_to_step_tool(record: &Record) -> Record {
    let step_id = association_step_id(record).unwrap_or(Value::Null);
    let tool_id = tool_identity(record).unwrap_or(Value::Null);

    let mut out = Record::new();
    out.insert("id".to_string(), json!(step_tool_id(&step_id, &tool_id)));
    out.insert("step_id".to_string(), step_id);
    out.insert("tool_id".to_string(), tool_id);
    out.insert(
        "relevance_score".to_string(),
        json!(relevance_from_ranking(record.get("ranking"))),
    );
    if let Some(created_at) = record.get("created_at").filter(|v| !v.is_null()) {
        out.insert("created_at".to_string(), created_at.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_phase_color_uses_palette_modulo() {
        let phase = record(json!({
            "id": "p1", "name": "Validate", "order_index": 9, "color": null
        }));
        let mapped = map_legacy_to_target(MappingKind::PhaseUpdate, &phase);
        assert_eq!(mapped["id"], json!("p1"));
        assert_eq!(mapped["color"], json!(PHASE_PALETTE[1]));
        assert_eq!(phase_color(-1), PHASE_PALETTE[7]);
        assert_eq!(mapped.len(), 2);
    }

    #[test]
    fn test_phase_color_keeps_existing() {
        let phase = record(json!({"id": "p1", "order_index": 0, "color": "#000000"}));
        assert!(!phase_needs_color(&phase));
        let mapped = map_legacy_to_target(MappingKind::PhaseUpdate, &phase);
        assert_eq!(mapped["color"], json!("#000000"));
        assert!(phase_needs_color(&record(json!({"id": "p2", "color": "  "}))));
    }

    #[test]
    fn test_step_update_fills_only_null_fields() {
        let step = record(json!({
            "id": "s1",
            "name": "Interview customers",
            "difficulty_level": 5,
            "estimated_time_min": null,
            "key_outcomes": ["10 interviews"],
        }));
        assert!(needs_step_enrichment(&step));
        let mapped = map_legacy_to_target(MappingKind::StepUpdate, &step);
        assert_eq!(mapped["id"], json!("s1"));
        assert_eq!(mapped["name"], json!("Interview customers"));
        assert_eq!(mapped["difficulty_level"], json!(5));
        assert_eq!(mapped["estimated_time_min"], json!(30));
        assert_eq!(mapped["estimated_time_max"], json!(60));
        assert_eq!(mapped["key_outcomes"], json!(["10 interviews"]));
        assert_eq!(mapped["prerequisite_steps"], json!([]));
        assert_eq!(mapped["is_custom"], json!(false));
        assert!(!needs_step_enrichment(&mapped));
    }

    #[test]
    fn test_challenge_to_step_preserves_id_and_defaults() {
        let challenge = record(json!({
            "id": "c1", "name": "Validate Idea", "phase_id": "p1", "order_index": 1
        }));
        let step = map_legacy_to_target(MappingKind::ChallengeToStep, &challenge);
        assert_eq!(step["id"], json!("c1"));
        assert_eq!(step["name"], json!("Validate Idea"));
        assert_eq!(step["phase_id"], json!("p1"));
        assert_eq!(step["order_index"], json!(1));
        assert_eq!(step["difficulty_level"], json!(3));
        assert_eq!(step["estimated_time_min"], json!(30));
        assert_eq!(step["estimated_time_max"], json!(60));
        assert_eq!(step["is_custom"], json!(false));
    }

    #[test]
    fn test_challenge_renamed_fields_and_placeholder() {
        let challenge = record(json!({
            "id": "abcdef1234", "title": null, "difficulty": 4, "order": 2
        }));
        let step = map_legacy_to_target(MappingKind::ChallengeToStep, &challenge);
        assert_eq!(step["name"], json!("Step abcdef12"));
        assert_eq!(step["difficulty_level"], json!(4));
        assert_eq!(step["order_index"], json!(2));
    }

    #[test]
    fn test_merge_prefers_challenge_then_existing_then_default() {
        let existing = record(json!({
            "id": "c1",
            "name": "Existing",
            "description": "",
            "difficulty_level": 2,
            "estimated_time_min": null,
            "estimated_time_max": 90,
        }));
        let challenge = record(json!({
            "id": "c1",
            "description": "From challenge",
            "difficulty_level": null,
            "estimated_time_max": 120,
            "key_outcomes": ["a"],
        }));
        let merged = merge_challenge_into_step(&existing, &challenge);
        assert_eq!(merged["id"], json!("c1"));
        assert_eq!(merged["difficulty_level"], json!(2));
        assert_eq!(merged["estimated_time_min"], json!(30));
        assert_eq!(merged["estimated_time_max"], json!(120));
        assert_eq!(merged["key_outcomes"], json!(["a"]));
        assert_eq!(merged["prerequisite_steps"], json!([]));
        assert_eq!(merged["description"], json!("From challenge"));
        assert!(merged.get("name").is_none());
    }

    #[test]
    fn test_tool_defaults_and_placeholders() {
        let row = record(json!({
            "id": "0123456789abcdef", "step_id": "s1", "website": "https://x.io"
        }));
        let tool = map_legacy_to_target(MappingKind::LegacyToolToTool, &row);
        assert_eq!(tool["id"], json!("0123456789abcdef"));
        assert_eq!(tool["name"], json!("Tool 01234567"));
        assert_eq!(tool["url"], json!("https://x.io"));
        assert_eq!(tool["type"], json!("external"));
        assert_eq!(tool["status"], json!("approved"));
        assert_eq!(tool["source"], json!("migration"));
        assert_eq!(tool["is_premium"], json!(false));
        assert!(tool.get("created_at").is_none());
        assert!(tool.get("step_id").is_none());

        let nameless = record(json!({"name": ""}));
        let anonymous = map_legacy_to_target(MappingKind::LegacyToolToTool, &nameless);
        assert_eq!(anonymous["name"], json!(UNNAMED_TOOL));
    }

    #[test]
    fn test_tool_identity_prefers_tool_id() {
        let row = record(json!({"id": "row-1", "tool_id": "t9"}));
        assert_eq!(tool_identity(&row), Some(json!("t9")));
        let row = record(json!({"id": "t1"}));
        assert_eq!(tool_identity(&row), Some(json!("t1")));
        assert_eq!(tool_identity(&record(json!({"id": ""}))), None);
    }

    #[test]
    fn test_relevance_rescale() {
        for r in 1..=5 {
            assert_eq!(relevance_from_ranking(Some(&json!(r))), r as f64 / 5.0);
        }
        assert_eq!(relevance_from_ranking(Some(&json!(4))), 0.8);
        assert_eq!(relevance_from_ranking(Some(&json!("3"))), 0.6);
        assert_eq!(relevance_from_ranking(None), 0.5);
        assert_eq!(relevance_from_ranking(Some(&Value::Null)), 0.5);
        assert_eq!(relevance_from_ranking(Some(&json!("high"))), 0.5);
        assert_eq!(relevance_from_ranking(Some(&json!(9))), 1.0);
    }

    #[test]
    fn test_step_tool_mapping() {
        let row = record(json!({
            "id": "t1", "challenge_id": "c1", "ranking": 4, "created_at": "2024-01-01T00:00:00Z"
        }));
        let mapped = map_legacy_to_target(MappingKind::LegacyMappingToStepTool, &row);
        assert_eq!(mapped["step_id"], json!("c1"));
        assert_eq!(mapped["tool_id"], json!("t1"));
        assert_eq!(mapped["relevance_score"], json!(0.8));
        assert_eq!(mapped["created_at"], json!("2024-01-01T00:00:00Z"));

        let again = map_legacy_to_target(MappingKind::LegacyMappingToStepTool, &row);
        assert_eq!(mapped["id"], again["id"]);

        let other = record(json!({"id": "t1", "step_id": "s2"}));
        let other = map_legacy_to_target(MappingKind::LegacyMappingToStepTool, &other);
        assert_ne!(mapped["id"], other["id"]);
        assert_eq!(other["relevance_score"], json!(0.5));
    }
}
