//! Engine error taxonomy.
//!
//! Anything that would silently weaken a narrative guarantee is surfaced here
//! instead of being corrected: a required fragment that does not fit, a prior
//! unit without a summary, a critical consistency issue.

use story_bible::StateError;
use thiserror::Error;

use crate::collaborators::UpstreamError;
use crate::consistency::ConsistencyIssue;
use crate::ingest::IngestError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("required fragments need {required} tokens but the budget is {max_tokens}")]
    BudgetInfeasible { required: usize, max_tokens: usize },

    #[error("unit {unit_ordinal} has no compressed summary")]
    SummaryMissing { unit_ordinal: u32 },

    #[error("{} critical consistency issue(s)", .issues.len())]
    ConsistencyCritical { issues: Vec<ConsistencyIssue> },

    #[error(transparent)]
    UpstreamFailure(#[from] UpstreamError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Ingest(#[from] IngestError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
