//! Contracts for the external collaborators: text generation, similarity
//! search and the semantic goal check.
//!
//! The engine never retries a collaborator. Every call runs under a
//! caller-supplied timeout and every failure surfaces as `UpstreamError`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use story_bible::ChapterId;

use crate::stage::StageParams;

/// Failure reported by, or while waiting for, an external collaborator.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// Network hiccups, rate limits and the like.
    #[error("transient upstream failure: {0}")]
    Transient(String),

    /// Quota exhaustion, bad credentials and other failures retrying cannot fix.
    #[error("permanent upstream failure: {0}")]
    Permanent(String),

    #[error("upstream call timed out after {0:?}")]
    Timeout(Duration),
}

/// A single similarity-search hit. Scores are comparable within one call only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub chapter_id: ChapterId,
    pub snippet: String,
    pub score: f32,
}

/// Similarity search over previously accepted chapters.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievalHit>, UpstreamError>;
}

/// Semantic judgement of whether recent chapters achieve a unit's dramatic goal.
#[async_trait]
pub trait GoalJudge: Send + Sync {
    async fn goal_achieved(
        &self,
        dramatic_goal: &str,
        recent_chapters: &[String],
    ) -> Result<bool, UpstreamError>;
}

/// Token usage reported by the generation collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Text produced by the generation collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    pub usage: TokenUsage,
}

/// The external text-generation service.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, context: &str, params: &StageParams) -> Result<Generation, UpstreamError>;
}

/// Retriever used when no similarity search is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetrieval;

#[async_trait]
impl Retriever for NoRetrieval {
    async fn search(&self, _query: &str, _top_k: usize) -> Result<Vec<RetrievalHit>, UpstreamError> {
        Ok(Vec::new())
    }
}

/// Await a collaborator call, turning an elapsed deadline into `UpstreamError::Timeout`.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, UpstreamError>
where
    F: Future<Output = Result<T, UpstreamError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(UpstreamError::Timeout(limit)),
    }
}
