//! Compressed summaries of closed units and accepted chapters.

use serde::{Deserialize, Serialize};

use super::{ChapterId, UnitId};

/// Detail tiers for a closed unit's summary, most detailed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SummaryTier {
    Full,
    Medium,
    Minimal,
}

impl SummaryTier {
    /// Word-equivalent cap for this tier.
    pub fn word_cap(&self) -> usize {
        match self {
            SummaryTier::Full => 800,
            SummaryTier::Medium => 500,
            SummaryTier::Minimal => 200,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SummaryTier::Full => "full",
            SummaryTier::Medium => "medium",
            SummaryTier::Minimal => "minimal",
        }
    }
}

impl std::fmt::Display for SummaryTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Precomputed tiers of a closed unit's summary. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitSummary {
    pub unit_id: UnitId,
    full: String,
    medium: String,
    minimal: String,
}

impl UnitSummary {
    /// Build a summary from already-capped tier texts.
    pub fn new(
        unit_id: UnitId,
        full: impl Into<String>,
        medium: impl Into<String>,
        minimal: impl Into<String>,
    ) -> Self {
        Self {
            unit_id,
            full: full.into(),
            medium: medium.into(),
            minimal: minimal.into(),
        }
    }

    /// Text of the requested tier.
    pub fn tier(&self, tier: SummaryTier) -> &str {
        match tier {
            SummaryTier::Full => &self.full,
            SummaryTier::Medium => &self.medium,
            SummaryTier::Minimal => &self.minimal,
        }
    }
}

/// Short digest of an accepted chapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterSummary {
    pub chapter_id: ChapterId,
    pub digest: String,
}

impl ChapterSummary {
    pub fn new(chapter_id: ChapterId, digest: impl Into<String>) -> Self {
        Self {
            chapter_id,
            digest: digest.into(),
        }
    }
}
