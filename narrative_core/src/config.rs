//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::boundary::BoundaryConfig;
use crate::consistency::IssuePolicy;
use crate::context_assembler::TierPolicy;
use crate::error::Result;
use crate::stage::StageSchedule;

/// Deadlines for collaborator calls, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub retrieval_ms: u64,
    pub goal_check_ms: u64,
    pub generation_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            retrieval_ms: 10_000,
            goal_check_ms: 60_000,
            generation_ms: 120_000,
        }
    }
}

impl Timeouts {
    pub fn retrieval(&self) -> Duration {
        Duration::from_millis(self.retrieval_ms)
    }

    pub fn goal_check(&self) -> Duration {
        Duration::from_millis(self.goal_check_ms)
    }

    pub fn generation(&self) -> Duration {
        Duration::from_millis(self.generation_ms)
    }
}

/// Configuration for the context engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Hard ceiling on the assembled context size, in estimated tokens.
    pub max_context_tokens: usize,

    /// Maximum retrieval snippets included per context.
    pub retrieval_top_k: usize,

    pub tiers: TierPolicy,
    pub boundary: BoundaryConfig,
    pub timeouts: Timeouts,
    pub policy: IssuePolicy,
    pub stages: StageSchedule,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 12_000,
            retrieval_top_k: 5,
            tiers: TierPolicy::default(),
            boundary: BoundaryConfig::default(),
            timeouts: Timeouts::default(),
            policy: IssuePolicy::default(),
            stages: StageSchedule::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }
}
