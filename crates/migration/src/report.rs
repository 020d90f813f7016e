use std::fmt;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use colored::*;
use serde::Serialize;

use crate::verify::Verification;
use crate::{MigrationError, MigrationStats, StageOutcome, StageStatus};

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    CompletedWithErrors(u64),
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => f.write_str("success"),
            RunStatus::CompletedWithErrors(n) => write!(f, "completed with {} errors", n),
        }
    }
}

impl Serialize for RunStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub stages: Vec<StageOutcome>,
    pub stats: MigrationStats,
    pub verification: Verification,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl MigrationReport {
    /// Record errors plus one for every stage that failed outright.
    pub fn total_errors(&self) -> u64 {
        let failed_stages = self.stages.iter().filter(|s| s.is_failed()).count() as u64;
        self.stats.total_errors() + failed_stages
    }

    pub fn status(&self) -> RunStatus {
        match self.total_errors() {
            0 => RunStatus::Success,
            n => RunStatus::CompletedWithErrors(n),
        }
    }

    pub fn print(&self) {
        println!();
        println!("{}", "=== Migration report ===".bold());

        for outcome in &self.stages {
            let tag = "[STEP]".cyan().bold();
            match &outcome.status {
                StageStatus::Completed => {
                    println!("{} {} {}", tag, outcome.stage.title(), "completed".green())
                }
                StageStatus::Skipped { reason } => println!(
                    "{} {} {} ({})",
                    tag,
                    outcome.stage.title(),
                    "skipped".yellow(),
                    reason
                ),
                StageStatus::Failed { error } => {
                    println!("{} {} {}: {}", tag, outcome.stage.title(), "failed".red(), error)
                }
            }
        }

        if self.stats.is_empty() {
            println!("{} No records were processed", "[INFO]".blue().bold());
        }
        for (entity, stats) in self.stats.iter() {
            let tag = if stats.errors > 0 {
                "[ERROR]".red().bold()
            } else {
                "[INFO]".blue().bold()
            };
            println!(
                "{} {:<12} processed {:>5}  migrated {:>5}  updated {:>5}  \
                 skipped {:>5}  errors {:>5}",
                tag,
                entity,
                stats.processed,
                stats.migrated,
                stats.updated,
                stats.skipped,
                stats.errors
            );
        }

        for entry in &self.verification.entries {
            let count = entry
                .row_count
                .map(|c| c.to_string())
                .unwrap_or_else(|| "missing".to_string());
            println!(
                "{} {:<12} {} rows in {} (expected at least {})",
                "[INFO]".blue().bold(),
                entry.entity,
                count,
                entry.table,
                entry.expected_min
            );
        }
        for warning in &self.verification.warnings {
            println!("{} {}", "[WARNING]".yellow().bold(), warning);
        }

        let elapsed = self.finished_at - self.started_at;
        match self.status() {
            RunStatus::Success => println!(
                "{} Migration finished: {} ({} ms)",
                "[SUCCESS]".green().bold(),
                self.status(),
                elapsed.num_milliseconds()
            ),
            status => println!(
                "{} Migration finished: {} ({} ms)",
                "[WARNING]".yellow().bold(),
                status,
                elapsed.num_milliseconds()
            ),
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<(), MigrationError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| MigrationError::io(parent.display().to_string(), e))?;
        }

        #[derive(Serialize)]
        struct Document<'a> {
            status: RunStatus,
            total_errors: u64,
            #[serde(flatten)]
            report: &'a MigrationReport,
        }

        let content = serde_json::to_string_pretty(&Document {
            status: self.status(),
            total_errors: self.total_errors(),
            report: self,
        })?;
        fs::write(path, content).map_err(|e| MigrationError::io(path.display().to_string(), e))
    }
}
