mod common;

use anyhow::Result;
use serde_json::json;
use wheel_database::Backend;
use wheel_migration::mapper::PHASE_PALETTE;
use wheel_migration::{
    MigrationConfig, MigrationError, Orchestrator, RunStatus, Stage, StageStatus,
    ENTITY_CHALLENGES, ENTITY_PHASES, ENTITY_PROGRESS, ENTITY_STEPS, ENTITY_STEP_TOOLS,
    ENTITY_TOOLS,
};

use common::{
    bare_target_schema, find, record, records, seeded_backend, sorted_ids, target_schema,
};

#[tokio::test]
async fn test_full_run_migrates_every_entity() -> Result<()> {
    let backend = seeded_backend().await;
    let config = MigrationConfig::default();

    let report = Orchestrator::new(&backend, &config).execute(&Stage::ALL).await?;

    assert_eq!(report.stages.len(), 5);
    assert!(report.stages.iter().all(|s| s.status == StageStatus::Completed));
    assert_eq!(report.status(), RunStatus::Success);
    assert!(report.verification.is_consistent());

    let phases = report.stats.get(ENTITY_PHASES).unwrap();
    assert_eq!((phases.processed, phases.updated, phases.skipped), (2, 1, 1));
    let steps = report.stats.get(ENTITY_STEPS).unwrap();
    assert_eq!((steps.processed, steps.updated, steps.skipped), (2, 1, 1));
    assert_eq!(report.stats.get(ENTITY_CHALLENGES).unwrap().migrated, 1);
    assert_eq!(report.stats.get(ENTITY_PROGRESS).unwrap().migrated, 2);

    let tools = report.stats.get(ENTITY_TOOLS).unwrap();
    assert_eq!((tools.processed, tools.migrated, tools.skipped), (3, 2, 1));
    let links = report.stats.get(ENTITY_STEP_TOOLS).unwrap();
    assert_eq!((links.processed, links.migrated, links.errors), (3, 3, 0));

    assert_eq!(backend.rows("company_step_progress").await.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_rerun_leaves_targets_unchanged() -> Result<()> {
    let backend = seeded_backend().await;
    let config = MigrationConfig::default();
    let orchestrator = Orchestrator::new(&backend, &config);

    orchestrator.execute(&Stage::ALL).await?;
    let tables = ["phases", "steps", "tools", "step_tools", "company_step_progress"];
    let mut first = Vec::new();
    for table in tables {
        first.push((backend.count(table).await?, sorted_ids(&backend.rows(table).await)));
    }
    let first_phases = backend.rows("phases").await;

    let second = orchestrator.execute(&Stage::ALL).await?;
    for (table, expected) in tables.iter().zip(first) {
        assert_eq!(backend.count(table).await?, expected.0, "row count of {}", table);
        assert_eq!(sorted_ids(&backend.rows(table).await), expected.1, "ids of {}", table);
    }
    assert_eq!(backend.rows("phases").await, first_phases);

    assert_eq!(second.status(), RunStatus::Success);
    let phases = second.stats.get(ENTITY_PHASES).unwrap();
    assert_eq!((phases.updated, phases.skipped), (0, 2));
    let steps = second.stats.get(ENTITY_STEPS).unwrap();
    assert_eq!((steps.updated, steps.skipped), (0, 3));
    // Progress is guarded on the second pass.
    let progress = second.stages.iter().find(|s| s.stage == Stage::Progress).unwrap();
    assert!(matches!(progress.status, StageStatus::Skipped { .. }));
    Ok(())
}

#[tokio::test]
async fn test_challenge_becomes_step_with_defaults() -> Result<()> {
    let backend = target_schema().await;
    backend
        .seed(
            "phases",
            records(vec![json!({
                "id": "p1", "name": "Validate", "order_index": 0, "color": "#3B82F6"
            })]),
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
    let config = MigrationConfig::default();

    let report = Orchestrator::new(&backend, &config).run(&[Stage::Challenges]).await;
    assert_eq!(report.status(), RunStatus::Success);

    let steps = backend.rows("steps").await;
    assert_eq!(steps.len(), 1);
    let step = find(&steps, "id", "c1").unwrap();
    assert_eq!(step["name"], json!("Validate Idea"));
    assert_eq!(step["phase_id"], json!("p1"));
    assert_eq!(step["order_index"], json!(1));
    assert_eq!(step["difficulty_level"], json!(3));
    assert_eq!(step["estimated_time_min"], json!(30));
    assert_eq!(step["estimated_time_max"], json!(60));
    assert_eq!(step["is_custom"], json!(false));
    assert_eq!(step["key_outcomes"], json!([]));
    Ok(())
}

#[tokio::test]
async fn test_shared_tool_is_written_once_with_rescaled_links() -> Result<()> {
    let backend = target_schema().await;
    backend
        .seed(
            "journey_step_tools",
            records(vec![
                json!({"id": "t1", "step_id": "s1", "name": "Typeform", "ranking": 4}),
                json!({"id": "t1", "step_id": "s2", "name": "Typeform", "ranking": 4}),
            ]),
        )
        .await;
    let config = MigrationConfig::default();

    let report = Orchestrator::new(&backend, &config).execute(&[Stage::Tools]).await?;
    assert_eq!(report.status(), RunStatus::Success);

    let tools = backend.rows("tools").await;
    assert_eq!(sorted_ids(&tools), vec!["t1".to_string()]);
    assert_eq!(tools[0]["type"], json!("external"));
    assert_eq!(tools[0]["status"], json!("approved"));
    assert_eq!(tools[0]["source"], json!("migration"));

    let links = backend.rows("step_tools").await;
    assert_eq!(links.len(), 2);
    assert!(links
        .iter()
        .all(|l| l["relevance_score"] == json!(0.8) && l["tool_id"] == json!("t1")));
    assert!(find(&links, "step_id", "s1").is_some());
    assert!(find(&links, "step_id", "s2").is_some());
    assert_ne!(links[0]["id"], links[1]["id"]);

    assert_eq!(report.stats.get(ENTITY_TOOLS).unwrap().skipped, 1);
    Ok(())
}

#[tokio::test]
async fn test_failing_source_fails_only_its_stage() -> Result<()> {
    let backend = seeded_backend().await;
    backend.fail_selects_on("journey_step_tools").await;
    let config = MigrationConfig::default();

    let report = Orchestrator::new(&backend, &config).execute(&Stage::ALL).await?;

    let status_of = |stage: Stage| {
        report
            .stages
            .iter()
            .find(|s| s.stage == stage)
            .map(|s| s.status.clone())
    };
    assert!(matches!(status_of(Stage::Tools), Some(StageStatus::Failed { .. })));
    assert_eq!(status_of(Stage::Phases), Some(StageStatus::Completed));
    assert_eq!(status_of(Stage::Steps), Some(StageStatus::Completed));
    assert_eq!(status_of(Stage::Challenges), Some(StageStatus::Completed));
    assert_eq!(status_of(Stage::Progress), Some(StageStatus::Completed));

    assert_eq!(report.total_errors(), 1);
    assert_eq!(report.status().to_string(), "completed with 1 errors");
    assert!(backend.rows("tools").await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_rejected_link_batch_is_counted_and_run_continues() -> Result<()> {
    let backend = seeded_backend().await;
    backend.fail_writes_on("step_tools").await;
    let config = MigrationConfig::default().with_batch_size(2);

    let report = Orchestrator::new(&backend, &config).run(&[Stage::Tools]).await;

    assert_eq!(report.stages[0].status, StageStatus::Completed);
    assert_eq!(report.stats.get(ENTITY_TOOLS).unwrap().migrated, 2);
    let links = report.stats.get(ENTITY_STEP_TOOLS).unwrap();
    assert_eq!((links.migrated, links.errors), (0, 3));
    assert_eq!(report.status(), RunStatus::CompletedWithErrors(3));
    assert_eq!(backend.rows("tools").await.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_missing_sources_skip_their_stages() -> Result<()> {
    let backend = target_schema().await;
    let config = MigrationConfig::default();

    let report = Orchestrator::new(&backend, &config).execute(&Stage::ALL).await?;

    for stage in [Stage::Challenges, Stage::Progress, Stage::Tools] {
        let outcome = report.stages.iter().find(|s| s.stage == stage).unwrap();
        assert!(matches!(outcome.status, StageStatus::Skipped { .. }), "{} should skip", stage);
    }
    assert_eq!(report.status(), RunStatus::Success);
    Ok(())
}

#[tokio::test]
async fn test_progress_gate_respects_force() -> Result<()> {
    let backend = seeded_backend().await;
    backend
        .seed(
            "company_step_progress",
            vec![record(json!({"company_id": "co9", "step_id": "s9", "status": "completed"}))],
        )
        .await;

    let guarded = MigrationConfig::default();
    let report = Orchestrator::new(&backend, &guarded).run(&[Stage::Progress]).await;
    match &report.stages[0].status {
        StageStatus::Skipped { reason } => assert!(reason.contains("FORCE_MIGRATION")),
        other => panic!("expected skip, got {:?}", other),
    }
    assert_eq!(backend.count("company_step_progress").await?, 1);

    let forced = MigrationConfig::default().with_force(true);
    let report = Orchestrator::new(&backend, &forced).run(&[Stage::Progress]).await;
    assert_eq!(report.stages[0].status, StageStatus::Completed);
    assert_eq!(report.stats.get(ENTITY_PROGRESS).unwrap().migrated, 2);
    assert_eq!(backend.count("company_step_progress").await?, 3);
    Ok(())
}

#[tokio::test]
async fn test_preflight_names_every_missing_capability() {
    let backend = wheel_database::MemoryBackend::new();
    backend.create_table("steps", &[&["id"]]).await;
    backend.create_table("company_journey_steps", &[]).await;
    let config = MigrationConfig::default();

    let err = Orchestrator::new(&backend, &config)
        .execute(&[Stage::Progress, Stage::Tools])
        .await
        .unwrap_err();

    match err {
        MigrationError::MissingCapabilities(missing) => {
            assert_eq!(missing.len(), 4);
            assert!(missing.contains(&"table step_tools".to_string()));
            assert!(missing.contains(&"function migrate_step_progress()".to_string()));
            assert!(!missing.contains(&"function migrate_challenge_progress()".to_string()));
        }
        other => panic!("expected missing capabilities, got {:?}", other),
    }
    assert!(backend.rows("tools").await.is_empty());
}

#[tokio::test]
async fn test_stage_order_is_fixed_regardless_of_selection_order() {
    let backend = seeded_backend().await;
    let config = MigrationConfig::default();

    let report = Orchestrator::new(&backend, &config)
        .run(&[Stage::Tools, Stage::Phases, Stage::Tools])
        .await;
    let order: Vec<Stage> = report.stages.iter().map(|s| s.stage).collect();
    assert_eq!(order, vec![Stage::Phases, Stage::Tools]);

    let phases = backend.rows("phases").await;
    assert_eq!(find(&phases, "id", "p1").unwrap()["color"], json!(PHASE_PALETTE[0]));
    assert_eq!(find(&phases, "id", "p2").unwrap()["color"], json!("#000000"));
}

#[tokio::test]
async fn test_full_run_without_progress_procedures_or_legacy_tables() -> Result<()> {
    let backend = bare_target_schema().await;
    backend
        .seed(
            "phases",
            records(vec![json!({"id": "p1", "order_index": 0, "color": null})]),
        )
        .await;
    let config = MigrationConfig::default();

    let report = Orchestrator::new(&backend, &config).execute(&Stage::ALL).await?;

    let phases = backend.rows("phases").await;
    assert_eq!(find(&phases, "id", "p1").unwrap()["color"], json!(PHASE_PALETTE[0]));
    let progress = report
        .stages
        .iter()
        .find(|s| s.stage == Stage::Progress)
        .unwrap();
    assert!(matches!(progress.status, StageStatus::Skipped { .. }));
    assert_eq!(report.status(), RunStatus::Success);
    Ok(())
}
