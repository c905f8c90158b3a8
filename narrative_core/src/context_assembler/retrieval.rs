//! Retrieval adapter - wraps the similarity-search collaborator.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::time::Duration;

use story_bible::{ChapterId, NarrativeStateStore};
use tracing::{debug, warn};

use crate::collaborators::{with_timeout, RetrievalHit, Retriever};

/// Hits returned by one search, or the fact that search was unavailable.
#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    pub hits: Vec<RetrievalHit>,

    /// Search failed or timed out and the context was built without it.
    pub degraded: bool,
}

impl RetrievalOutcome {
    pub fn found(hits: Vec<RetrievalHit>) -> Self {
        Self {
            hits,
            degraded: false,
        }
    }

    pub fn degraded() -> Self {
        Self {
            hits: Vec::new(),
            degraded: true,
        }
    }
}

/// A retrieval hit resolved to its story position.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedSnippet {
    pub chapter_id: ChapterId,
    pub unit_ordinal: u32,
    pub chapter_ordinal: u32,
    pub snippet: String,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct RetrievalAdapter {
    top_k: usize,
}

impl RetrievalAdapter {
    pub fn new(top_k: usize) -> Self {
        Self { top_k }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Run the search under `limit`. Failures degrade to an empty outcome.
    pub async fn search(
        &self,
        retriever: &dyn Retriever,
        query: &str,
        limit: Duration,
    ) -> RetrievalOutcome {
        if self.top_k == 0 {
            return RetrievalOutcome::found(Vec::new());
        }
        match with_timeout(limit, retriever.search(query, self.top_k)).await {
            Ok(hits) => {
                debug!(hits = hits.len(), "retrieval returned");
                RetrievalOutcome::found(hits)
            }
            Err(error) => {
                warn!(%error, "retrieval unavailable, building context without it");
                RetrievalOutcome::degraded()
            }
        }
    }

    /// Deduplicate, order and truncate raw hits.
    ///
    /// Hits for chapters already in `covered`, duplicate chapter ids and hits
    /// for unknown chapters are dropped. Order is score descending with ties
    /// broken by story position, so equal input yields equal output.
    pub fn rank(
        &self,
        state: &NarrativeStateStore,
        hits: &[RetrievalHit],
        covered: &HashSet<ChapterId>,
    ) -> Vec<RankedSnippet> {
        let mut seen = HashSet::new();
        let mut ranked: Vec<RankedSnippet> = Vec::new();

        for hit in hits {
            if covered.contains(&hit.chapter_id) || !seen.insert(hit.chapter_id) {
                continue;
            }
            let Some((unit_ordinal, chapter_ordinal)) = state.chapter_position(hit.chapter_id) else {
                debug!(chapter = %hit.chapter_id, "dropping hit for unknown chapter");
                continue;
            };
            ranked.push(RankedSnippet {
                chapter_id: hit.chapter_id,
                unit_ordinal,
                chapter_ordinal,
                snippet: hit.snippet.clone(),
                score: hit.score,
            });
        }

        ranked.sort_by(snippet_order);
        ranked.truncate(self.top_k);
        ranked
    }
}

/// Compare two snippets the way `rank` orders them.
pub fn snippet_order(a: &RankedSnippet, b: &RankedSnippet) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| (a.unit_ordinal, a.chapter_ordinal).cmp(&(b.unit_ordinal, b.chapter_ordinal)))
}
