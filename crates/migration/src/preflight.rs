use std::fmt;

use tracing::{debug, error, info};
use wheel_database::Backend;

use crate::config::{TableNames, MIGRATE_CHALLENGE_PROGRESS, MIGRATE_STEP_PROGRESS};
use crate::probe::probe_table;
use crate::{MigrationError, Stage};

/// Something the database must provide before a run may start.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Capability {
    Relation(String),
    /// A server-side function, needed only while its legacy `source` table exists.
    Procedure { name: String, source: Option<String> },
}

impl Capability {
    fn procedure(name: &str, source: &str) -> Self {
        Capability::Procedure {
            name: name.to_string(),
            source: Some(source.to_string()),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Relation(name) => write!(f, "table {}", name),
            Capability::Procedure { name, .. } => write!(f, "function {}()", name),
        }
    }
}

/// Capabilities needed by the selected stages.
///
/// Stages whose source doubles as their target (phase and step enrichment)
/// need nothing here: an absent table just skips them.
pub fn required_capabilities(stages: &[Stage], tables: &TableNames) -> Vec<Capability> {
    let mut required = Vec::new();
    for stage in stages {
        match stage {
            Stage::Phases | Stage::Steps => {}
            Stage::Challenges => required.push(Capability::Relation(tables.steps.clone())),
            Stage::Progress => {
                required.push(Capability::Relation(tables.progress.clone()));
                required.push(Capability::procedure(
                    MIGRATE_STEP_PROGRESS,
                    &tables.legacy_step_progress,
                ));
                required.push(Capability::procedure(
                    MIGRATE_CHALLENGE_PROGRESS,
                    &tables.legacy_challenge_progress,
                ));
            }
            Stage::Tools => {
                required.push(Capability::Relation(tables.tools.clone()));
                required.push(Capability::Relation(tables.step_tools.clone()));
            }
        }
    }
    required.sort();
    required.dedup();
    required
}

/// Asserts every capability is present. Never creates or alters schema.
pub async fn check_capabilities(
    backend: &dyn Backend,
    capabilities: &[Capability],
) -> Result<(), MigrationError> {
    let mut missing = Vec::new();

    for capability in capabilities {
        let present = match capability {
            Capability::Relation(table) => probe_table(backend, table).await?.exists,
            Capability::Procedure { name, source } => {
                if let Some(source) = source {
                    if !probe_table(backend, source).await?.exists {
                        debug!("{} is absent, {}() is not needed", source, name);
                        continue;
                    }
                }
                backend.procedure_exists(name).await?
            }
        };
        if !present {
            error!("Missing required {}", capability);
            missing.push(capability.to_string());
        }
    }

    if !missing.is_empty() {
        return Err(MigrationError::MissingCapabilities(missing));
    }
    info!("All {} required capabilities are available", capabilities.len());
    Ok(())
}
