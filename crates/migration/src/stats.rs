use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

pub const ENTITY_PHASES: &str = "phases";
pub const ENTITY_STEPS: &str = "steps";
pub const ENTITY_CHALLENGES: &str = "challenges";
pub const ENTITY_PROGRESS: &str = "progress";
pub const ENTITY_TOOLS: &str = "tools";
pub const ENTITY_STEP_TOOLS: &str = "step_tools";

/// The five pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Phases,
    Steps,
    Challenges,
    Progress,
    Tools,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Phases,
        Stage::Steps,
        Stage::Challenges,
        Stage::Progress,
        Stage::Tools,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Phases => "phases",
            Stage::Steps => "steps",
            Stage::Challenges => "challenges",
            Stage::Progress => "progress",
            Stage::Tools => "tools",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Stage::Phases => "Phase enrichment",
            Stage::Steps => "Step enrichment",
            Stage::Challenges => "Challenge consolidation",
            Stage::Progress => "Progress migration",
            Stage::Tools => "Tool association migration",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown stage {:?}", s))
    }
}

/// Counters for one entity kind within a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityStats {
    pub processed: u64,
    /// Rows newly written to the target.
    pub migrated: u64,
    /// Existing target rows rewritten.
    pub updated: u64,
    /// Rows intentionally left alone (already complete, duplicates).
    pub skipped: u64,
    pub errors: u64,
}

impl EntityStats {
    pub fn merge(&mut self, other: &EntityStats) {
        self.processed += other.processed;
        self.migrated += other.migrated;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }
}

/// Per-entity statistics accumulated over a run. Never persisted to the database.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MigrationStats {
    entities: BTreeMap<String, EntityStats>,
}

impl MigrationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(&mut self, name: &str) -> &mut EntityStats {
        self.entities.entry(name.to_string()).or_default()
    }

    pub fn get(&self, name: &str) -> Option<&EntityStats> {
        self.entities.get(name)
    }

    pub fn merge(&mut self, other: &MigrationStats) {
        for (name, stats) in &other.entities {
            self.entity(name).merge(stats);
        }
    }

    pub fn total_errors(&self) -> u64 {
        self.entities.values().map(|s| s.errors).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EntityStats)> {
        self.entities.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct StageOutcome {
    pub stage: Stage,
    #[serde(flatten)]
    pub status: StageStatus,
    pub stats: MigrationStats,
}

impl StageOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, StageStatus::Failed { .. })
    }
}
