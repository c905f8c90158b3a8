//! Context Assembler - builds the generation context for one chapter under a token budget.
//!
//! Assembly works as follows:
//! 1. **History**: Every earlier unit contributes its summary at a tier chosen by distance
//! 2. **Pyramid**: The active unit contributes its synopsis, digests of older chapters,
//!    and the immediately preceding chapter in full
//! 3. **Retrieval**: Similarity hits not already covered by the pyramid are ranked
//! 4. **Budget**: Required fragments are always kept; optional ones fill what remains
//! 5. **Rendering**: Selected fragments are emitted in canonical section order

mod budget;
mod compressor;
mod pyramid;
mod retrieval;

pub use budget::*;
pub use compressor::*;
pub use pyramid::*;
pub use retrieval::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use story_bible::{ChapterId, NarrativeStateStore, SummaryTier, Unit};

use crate::error::Result;
use crate::text::estimate_tokens;

/// Priority of the unit synopsis among optional fragments.
pub const SYNOPSIS_PRIORITY: u32 = 900;

/// Base priority of chapter digests; more recent chapters rank higher.
pub const DIGEST_PRIORITY: u32 = 500;

/// Base priority of retrieval snippets; better-ranked hits rank higher.
pub const RETRIEVAL_PRIORITY: u32 = 100;

/// What a fragment carries; decides its section in the rendered context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FragmentKind {
    /// Global story outline.
    Outline,
    /// Compressed summary of an earlier unit.
    UnitHistory { unit_ordinal: u32, tier: SummaryTier },
    /// One-paragraph synopsis of the active unit (pyramid L3).
    Synopsis,
    /// Digest of an older chapter in the active unit (pyramid L2).
    ChapterDigest { chapter_ordinal: u32 },
    /// Similarity-search snippet.
    Retrieved { unit_ordinal: u32, chapter_ordinal: u32 },
    /// Full text of the immediately preceding chapter (pyramid L0).
    PrecedingChapter { unit_ordinal: u32, chapter_ordinal: u32 },
}

/// A candidate piece of context with its size and selection class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    pub kind: FragmentKind,
    pub label: String,
    pub text: String,
    pub estimated_tokens: usize,

    /// Required fragments appear in every context or the build fails.
    pub required: bool,

    /// Higher is more valuable; only meaningful for optional fragments.
    pub priority: u32,
}

impl Fragment {
    fn build(kind: FragmentKind, label: String, text: String, required: bool, priority: u32) -> Self {
        let estimated_tokens = estimate_tokens(&label) + estimate_tokens(&text);
        Self {
            kind,
            label,
            text,
            estimated_tokens,
            required,
            priority,
        }
    }

    /// A fragment that must appear in full.
    pub fn required(kind: FragmentKind, label: impl Into<String>, text: impl Into<String>) -> Self {
        Self::build(kind, label.into(), text.into(), true, u32::MAX)
    }

    /// A fragment included only as budget allows.
    pub fn optional(
        kind: FragmentKind,
        label: impl Into<String>,
        text: impl Into<String>,
        priority: u32,
    ) -> Self {
        Self::build(kind, label.into(), text.into(), false, priority)
    }
}

/// What the budget kept and dropped for one context build.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetReport {
    pub max_tokens: usize,
    pub used_tokens: usize,
    pub required_tokens: usize,
    pub selected: Vec<String>,
    pub dropped: Vec<String>,

    /// Tier chosen for every earlier unit, in unit order.
    pub history_tiers: Vec<(u32, SummaryTier)>,

    /// The retrieval collaborator failed or timed out; no snippets were considered.
    pub retrieval_degraded: bool,
}

/// The assembled context ready for the generation collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembledContext {
    pub fragments: Vec<Fragment>,
    pub report: BudgetReport,
}

impl AssembledContext {
    /// Format the context as a prompt string.
    pub fn to_prompt_string(&self) -> String {
        let mut prompt = String::new();
        for fragment in &self.fragments {
            prompt.push_str("## ");
            prompt.push_str(&fragment.label);
            prompt.push('\n');
            prompt.push_str(fragment.text.trim_end());
            prompt.push_str("\n\n");
        }
        prompt
    }
}

/// Builds candidate fragments from the store and selects them under the budget.
pub struct ContextAssembler {
    compressor: CrossUnitCompressor,
    pyramid: PyramidAssembler,
    retrieval: RetrievalAdapter,
    allocator: TokenBudgetAllocator,
    max_tokens: usize,
}

impl ContextAssembler {
    /// Create a context assembler.
    pub fn new(tiers: TierPolicy, retrieval_top_k: usize, max_tokens: usize) -> Self {
        Self {
            compressor: CrossUnitCompressor::new(tiers),
            pyramid: PyramidAssembler::new(),
            retrieval: RetrievalAdapter::new(retrieval_top_k),
            allocator: TokenBudgetAllocator::new(),
            max_tokens,
        }
    }

    pub fn compressor(&self) -> &CrossUnitCompressor {
        &self.compressor
    }

    pub fn retrieval(&self) -> &RetrievalAdapter {
        &self.retrieval
    }

    /// Query text for the similarity search: the active unit's synopsis plus the
    /// digest of the latest accepted chapter.
    pub fn retrieval_query(&self, state: &NarrativeStateStore, unit: &Unit) -> String {
        let mut query = unit.synopsis_or_goal().to_string();
        if let Some(latest) = state.last_chapters(unit.id, 1).first() {
            if let Some(summary) = state.chapter_summary(latest.id) {
                query.push('\n');
                query.push_str(&summary.digest);
            }
        }
        query
    }

    /// Assemble the context for chapter `chapter_ordinal` of `unit`.
    pub fn assemble(
        &self,
        state: &NarrativeStateStore,
        unit: &Unit,
        chapter_ordinal: u32,
        retrieved: &RetrievalOutcome,
    ) -> Result<AssembledContext> {
        let mut fragments = Vec::new();

        if let Some(outline) = state.outline() {
            fragments.push(Fragment::required(FragmentKind::Outline, "Story outline", outline));
        }

        let history = self.compressor.compress_history(state, unit)?;
        let history_tiers = history.iter().map(|h| (h.unit_ordinal, h.tier)).collect();
        for entry in history {
            fragments.push(Fragment::required(
                FragmentKind::UnitHistory {
                    unit_ordinal: entry.unit_ordinal,
                    tier: entry.tier,
                },
                format!("Volume {}: {} ({})", entry.unit_ordinal, entry.title, entry.tier),
                entry.text,
            ));
        }

        let blocks = self.pyramid.assemble(state, unit, chapter_ordinal);
        let covered: HashSet<ChapterId> = blocks.iter().filter_map(|b| b.chapter_id).collect();
        let mut preceding = None;
        for block in blocks {
            match block.layer {
                PyramidLayer::Synopsis => fragments.push(Fragment::optional(
                    FragmentKind::Synopsis,
                    block.label,
                    block.text,
                    SYNOPSIS_PRIORITY,
                )),
                PyramidLayer::Digest { chapter_ordinal } => fragments.push(Fragment::optional(
                    FragmentKind::ChapterDigest { chapter_ordinal },
                    block.label,
                    block.text,
                    DIGEST_PRIORITY + chapter_ordinal,
                )),
                PyramidLayer::Recent {
                    unit_ordinal,
                    chapter_ordinal,
                } => {
                    preceding = Some(Fragment::required(
                        FragmentKind::PrecedingChapter {
                            unit_ordinal,
                            chapter_ordinal,
                        },
                        block.label,
                        block.text,
                    ));
                }
            }
        }

        let ranked = self.retrieval.rank(state, &retrieved.hits, &covered);
        let ranked_count = ranked.len() as u32;
        for (rank, snippet) in ranked.into_iter().enumerate() {
            fragments.push(Fragment::optional(
                FragmentKind::Retrieved {
                    unit_ordinal: snippet.unit_ordinal,
                    chapter_ordinal: snippet.chapter_ordinal,
                },
                format!(
                    "Related passage (volume {}, chapter {})",
                    snippet.unit_ordinal, snippet.chapter_ordinal
                ),
                snippet.snippet,
                RETRIEVAL_PRIORITY + (ranked_count - rank as u32),
            ));
        }

        // The preceding chapter closes the context so it sits next to the new text.
        fragments.extend(preceding);

        let allocation = self.allocator.allocate(fragments, self.max_tokens)?;
        let report = BudgetReport {
            max_tokens: allocation.max_tokens,
            used_tokens: allocation.used_tokens,
            required_tokens: allocation.required_tokens,
            selected: allocation.selected.iter().map(|f| f.label.clone()).collect(),
            dropped: allocation.dropped.iter().map(|f| f.label.clone()).collect(),
            history_tiers,
            retrieval_degraded: retrieved.degraded,
        };

        Ok(AssembledContext {
            fragments: allocation.selected,
            report,
        })
    }
}
