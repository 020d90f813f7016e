use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;
use wheel_common::{flag_var, optional_var, parsed_var, EnvVars};
use wheel_database::quote_ident;

use crate::MigrationError;

pub const DEFAULT_BATCH_SIZE: usize = 20;

pub const MIGRATE_STEP_PROGRESS: &str = "migrate_step_progress";
pub const MIGRATE_CHALLENGE_PROGRESS: &str = "migrate_challenge_progress";

/// Physical names of every table the pipeline touches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableNames {
    pub phases: String,
    pub steps: String,
    pub challenges: String,
    pub legacy_step_tools: String,
    pub tools: String,
    pub step_tools: String,
    pub legacy_step_progress: String,
    pub legacy_challenge_progress: String,
    pub progress: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            phases: "phases".to_string(),
            steps: "steps".to_string(),
            challenges: "journey_challenges".to_string(),
            legacy_step_tools: "journey_step_tools".to_string(),
            tools: "tools".to_string(),
            step_tools: "step_tools".to_string(),
            legacy_step_progress: "company_journey_steps".to_string(),
            legacy_challenge_progress: "company_challenge_progress".to_string(),
            progress: "company_step_progress".to_string(),
        }
    }
}

impl TableNames {
    fn slots(&mut self) -> [(&'static str, &mut String); 9] {
        [
            ("PHASES", &mut self.phases),
            ("STEPS", &mut self.steps),
            ("CHALLENGES", &mut self.challenges),
            ("LEGACY_STEP_TOOLS", &mut self.legacy_step_tools),
            ("TOOLS", &mut self.tools),
            ("STEP_TOOLS", &mut self.step_tools),
            ("LEGACY_STEP_PROGRESS", &mut self.legacy_step_progress),
            ("LEGACY_CHALLENGE_PROGRESS", &mut self.legacy_challenge_progress),
            ("PROGRESS", &mut self.progress),
        ]
    }

    /// Applies `WHEEL_TABLE_<ROLE>` overrides on top of the defaults.
    pub fn from_env() -> Result<Self, MigrationError> {
        let mut tables = Self::default();
        for (role, slot) in tables.slots() {
            if let Some(name) = optional_var(&format!("WHEEL_TABLE_{}", role)) {
                *slot = name.trim().to_string();
            }
        }
        tables.validate()?;
        Ok(tables)
    }

    pub fn validate(&self) -> Result<(), MigrationError> {
        let mut tables = self.clone();
        for (role, name) in tables.slots() {
            quote_ident(name)
                .map_err(|e| MigrationError::Config(format!("table for {}: {}", role, e)))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationConfig {
    pub tables: TableNames,
    pub batch_size: usize,
    /// Re-run progress migration even when the target already holds rows.
    pub force: bool,
    pub backup_dir: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            tables: TableNames::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            force: false,
            backup_dir: None,
            report_path: None,
        }
    }
}

impl MigrationConfig {
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = Some(dir.into());
        self
    }

    /// Batch size actually used; zero falls back to the default.
    pub fn effective_batch_size(&self) -> usize {
        if self.batch_size == 0 {
            DEFAULT_BATCH_SIZE
        } else {
            self.batch_size
        }
    }
}

impl EnvVars for MigrationConfig {
    fn load() -> Result<Self> {
        let batch_size: usize = parsed_var("MIGRATION_BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
        Ok(Self {
            tables: TableNames::from_env()?,
            batch_size,
            force: flag_var("FORCE_MIGRATION"),
            backup_dir: optional_var("MIGRATION_BACKUP_DIR").map(PathBuf::from),
            report_path: optional_var("MIGRATION_REPORT_PATH").map(PathBuf::from),
        })
    }

    fn get_env_var(&self, key: &str) -> Option<String> {
        match key {
            "FORCE_MIGRATION" => Some(self.force.to_string()),
            "MIGRATION_BATCH_SIZE" => Some(self.batch_size.to_string()),
            "MIGRATION_BACKUP_DIR" => self.backup_dir.as_ref().map(|p| p.display().to_string()),
            "MIGRATION_REPORT_PATH" => self.report_path.as_ref().map(|p| p.display().to_string()),
            _ => None,
        }
    }
}
