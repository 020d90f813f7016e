use chrono::Utc;
use tracing::{error, info, warn};
use wheel_database::Backend;

use crate::preflight::{check_capabilities, required_capabilities};
use crate::report::MigrationReport;
use crate::stages::{run_stage, StageContext, StageExit};
use crate::verify::verify;
use crate::{MigrationConfig, MigrationError, MigrationStats, Stage, StageOutcome, StageStatus};

/// Runs the selected stages in order and produces a report.
pub struct Orchestrator<'a> {
    backend: &'a dyn Backend,
    config: &'a MigrationConfig,
}

impl<'a> Orchestrator<'a> {
    pub fn new(backend: &'a dyn Backend, config: &'a MigrationConfig) -> Self {
        Self { backend, config }
    }

    /// Fails fast when the database lacks anything the selected stages need.
    pub async fn preflight(&self, stages: &[Stage]) -> Result<(), MigrationError> {
        let required = required_capabilities(stages, &self.config.tables);
        check_capabilities(self.backend, &required).await
    }

    /// Runs every selected stage, in pipeline order, then verifies the targets.
    ///
    /// A failing stage never stops the ones after it.
    pub async fn run(&self, stages: &[Stage]) -> MigrationReport {
        let started_at = Utc::now();
        let mut selected = stages.to_vec();
        selected.sort();
        selected.dedup();
        info!("Running {} stages against the {} backend", selected.len(), self.backend.name());

        let ctx = StageContext {
            backend: self.backend,
            config: self.config,
        };

        let mut outcomes = Vec::with_capacity(selected.len());
        let mut totals = MigrationStats::new();

        for (index, stage) in selected.iter().enumerate() {
            info!("[STEP] {}/{}: {}", index + 1, selected.len(), stage.title());

            let mut stage_stats = MigrationStats::new();
            let status = match run_stage(*stage, &ctx, &mut stage_stats).await {
                Ok(()) => {
                    info!("{} completed", stage.title());
                    StageStatus::Completed
                }
                Err(StageExit::Skipped(reason)) => {
                    warn!("{} skipped: {}", stage.title(), reason);
                    StageStatus::Skipped { reason }
                }
                Err(StageExit::Failed(error)) => {
                    error!("{} failed: {}", stage.title(), error);
                    StageStatus::Failed { error }
                }
            };

            totals.merge(&stage_stats);
            outcomes.push(StageOutcome {
                stage: *stage,
                status,
                stats: stage_stats,
            });
        }

        let verification = verify(self.backend, &self.config.tables, &totals).await;

        MigrationReport {
            stages: outcomes,
            stats: totals,
            verification,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Preflight followed by a run. Only preflight problems are returned as errors.
    pub async fn execute(&self, stages: &[Stage]) -> Result<MigrationReport, MigrationError> {
        self.preflight(stages).await?;
        Ok(self.run(stages).await)
    }
}
