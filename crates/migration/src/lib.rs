mod config;
mod error;
mod orchestrator;
mod report;
mod stages;
mod stats;
mod verify;

pub mod dedupe;
pub mod mapper;
pub mod preflight;
pub mod probe;
pub mod snapshot;
pub mod upsert;

pub use config::{
    MigrationConfig, TableNames, DEFAULT_BATCH_SIZE, MIGRATE_CHALLENGE_PROGRESS,
    MIGRATE_STEP_PROGRESS,
};
pub use error::MigrationError;
pub use orchestrator::Orchestrator;
pub use report::{MigrationReport, RunStatus};
pub use stages::{run_stage, StageContext, StageExit, StageResult};
pub use stats::{
    EntityStats, MigrationStats, Stage, StageOutcome, StageStatus, ENTITY_CHALLENGES, ENTITY_PHASES,
    ENTITY_PROGRESS, ENTITY_STEPS, ENTITY_STEP_TOOLS, ENTITY_TOOLS,
};
pub use verify::{verify, Verification, VerificationEntry};
