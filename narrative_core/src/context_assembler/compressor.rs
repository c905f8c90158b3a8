//! Cross-unit compression: earlier units are represented at a detail tier
//! chosen by their distance from the unit being generated.

use serde::{Deserialize, Serialize};
use tracing::debug;

use story_bible::{word_count, NarrativeStateStore, SummaryTier, Unit, UnitId, UnitSummary};

use crate::error::{EngineError, Result};
use crate::text::truncate_sentences;

/// Distance thresholds separating the tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierPolicy {
    /// Units at most this far back get the full tier.
    pub full_within: u32,
    /// Units at most this far back (and beyond `full_within`) get the medium tier.
    pub medium_within: u32,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            full_within: 2,
            medium_within: 5,
        }
    }
}

impl TierPolicy {
    /// Tier for a source unit `distance` units before the target.
    pub fn tier_for(&self, distance: u32) -> SummaryTier {
        if distance <= self.full_within {
            SummaryTier::Full
        } else if distance <= self.medium_within {
            SummaryTier::Medium
        } else {
            SummaryTier::Minimal
        }
    }
}

/// Summary texts handed over when a unit closes. Missing tiers are derived
/// from the tier above.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryDraft {
    pub full: String,
    pub medium: Option<String>,
    pub minimal: Option<String>,
}

impl SummaryDraft {
    pub fn new(full: impl Into<String>) -> Self {
        Self {
            full: full.into(),
            medium: None,
            minimal: None,
        }
    }

    pub fn with_medium(mut self, medium: impl Into<String>) -> Self {
        self.medium = Some(medium.into());
        self
    }

    pub fn with_minimal(mut self, minimal: impl Into<String>) -> Self {
        self.minimal = Some(minimal.into());
        self
    }
}

/// One earlier unit as it appears in a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedUnit {
    pub unit_ordinal: u32,
    pub title: String,
    pub tier: SummaryTier,
    pub text: String,
}

pub struct CrossUnitCompressor {
    policy: TierPolicy,
}

impl CrossUnitCompressor {
    pub fn new(policy: TierPolicy) -> Self {
        Self { policy }
    }

    pub fn with_defaults() -> Self {
        Self::new(TierPolicy::default())
    }

    pub fn policy(&self) -> TierPolicy {
        self.policy
    }

    /// Precompute the three tiers of a closing unit's summary.
    ///
    /// Each tier is capped at the smaller of its own word cap and the length of
    /// the tier above, so detail never grows as tiers shrink.
    pub fn precompute(&self, unit_id: UnitId, draft: &SummaryDraft) -> UnitSummary {
        let (full, _) = truncate_sentences(&draft.full, SummaryTier::Full.word_cap());

        let medium_cap = SummaryTier::Medium.word_cap().min(word_count(&full));
        let medium_source = draft.medium.as_deref().unwrap_or(&full);
        let (medium, _) = truncate_sentences(medium_source, medium_cap);

        let minimal_cap = SummaryTier::Minimal.word_cap().min(word_count(&medium));
        let minimal_source = draft.minimal.as_deref().unwrap_or(&medium);
        let (minimal, cut) = truncate_sentences(minimal_source, minimal_cap);

        debug!(
            unit = %unit_id,
            full_words = word_count(&full),
            medium_words = word_count(&medium),
            minimal_words = word_count(&minimal),
            minimal_truncated = cut,
            "precomputed summary tiers"
        );

        UnitSummary::new(unit_id, full, medium, minimal)
    }

    /// Tier for `source` when generating `target`.
    pub fn tier_for(&self, target: &Unit, source: &Unit) -> SummaryTier {
        self.policy
            .tier_for(target.ordinal.saturating_sub(source.ordinal))
    }

    /// Compressed representation of `source` for a context built for `target`.
    pub fn compress(
        &self,
        state: &NarrativeStateStore,
        target: &Unit,
        source: &Unit,
    ) -> Result<CompressedUnit> {
        let summary = state
            .unit_summary(source.id)
            .ok_or(EngineError::SummaryMissing {
                unit_ordinal: source.ordinal,
            })?;
        let tier = self.tier_for(target, source);

        Ok(CompressedUnit {
            unit_ordinal: source.ordinal,
            title: source.title.clone(),
            tier,
            text: summary.tier(tier).to_string(),
        })
    }

    /// Every unit before `target`, compressed, in unit order.
    pub fn compress_history(
        &self,
        state: &NarrativeStateStore,
        target: &Unit,
    ) -> Result<Vec<CompressedUnit>> {
        state
            .units_before(target.ordinal)
            .into_iter()
            .map(|source| self.compress(state, target, source))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_text(sentences: usize, words_per_sentence: usize) -> String {
        (0..sentences)
            .map(|i| {
                let mut words: Vec<String> =
                    (0..words_per_sentence - 1).map(|w| format!("w{}s{}", w, i)).collect();
                words.push("end.".to_string());
                words.join(" ")
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn closed_store(count: u32, draft: &SummaryDraft) -> (NarrativeStateStore, Vec<UnitId>) {
        let compressor = CrossUnitCompressor::with_defaults();
        let mut store = NarrativeStateStore::new();
        let mut ids = Vec::new();
        for ordinal in 1..=count {
            let id = store.add_unit(Unit::new(ordinal, format!("Volume {}", ordinal), "goal", 10));
            store.close_unit(id, "done").unwrap();
            store.put_unit_summary(compressor.precompute(id, draft)).unwrap();
            ids.push(id);
        }
        (store, ids)
    }

    #[test]
    fn test_tier_boundaries_are_exact() {
        let policy = TierPolicy::default();
        assert_eq!(policy.tier_for(1), SummaryTier::Full);
        assert_eq!(policy.tier_for(2), SummaryTier::Full);
        assert_eq!(policy.tier_for(3), SummaryTier::Medium);
        assert_eq!(policy.tier_for(5), SummaryTier::Medium);
        assert_eq!(policy.tier_for(6), SummaryTier::Minimal);
        assert_eq!(policy.tier_for(40), SummaryTier::Minimal);
    }

    #[test]
    fn test_precompute_caps_each_tier() {
        let compressor = CrossUnitCompressor::with_defaults();
        let summary = compressor.precompute(UnitId::new(), &SummaryDraft::new(long_text(100, 10)));

        assert!(word_count(summary.tier(SummaryTier::Full)) <= 800);
        assert!(word_count(summary.tier(SummaryTier::Medium)) <= 500);
        let minimal = summary.tier(SummaryTier::Minimal);
        assert!(word_count(minimal) <= 200);
        assert!(minimal.ends_with(crate::text::TRUNCATION_MARKER));
    }

    #[test]
    fn test_precompute_clamps_supplied_tiers_to_tier_above() {
        let compressor = CrossUnitCompressor::with_defaults();
        let draft = SummaryDraft::new("Short full summary.")
            .with_medium(long_text(5, 10))
            .with_minimal(long_text(3, 10));
        let summary = compressor.precompute(UnitId::new(), &draft);

        let full = word_count(summary.tier(SummaryTier::Full));
        let medium = word_count(summary.tier(SummaryTier::Medium));
        let minimal = word_count(summary.tier(SummaryTier::Minimal));
        assert!(full >= medium && medium >= minimal);
    }

    #[test]
    fn test_detail_is_monotonic_in_distance() {
        let (mut store, ids) = closed_store(12, &SummaryDraft::new(long_text(120, 10)));
        let target_id = store.add_unit(Unit::new(13, "Target", "goal", 10));
        let compressor = CrossUnitCompressor::with_defaults();
        let target = store.unit(target_id).unwrap();

        let mut previous_len = usize::MAX;
        let mut previous_tier = SummaryTier::Full;
        for id in ids.iter().rev() {
            let source = store.unit(*id).unwrap();
            let compressed = compressor.compress(&store, target, source).unwrap();
            let len = word_count(&compressed.text);
            assert!(len <= previous_len, "detail grew at unit {}", source.ordinal);
            assert!(compressed.tier >= previous_tier);
            previous_len = len;
            previous_tier = compressed.tier;
        }
    }

    #[test]
    fn test_missing_summary_is_fatal() {
        let mut store = NarrativeStateStore::new();
        store.add_unit(Unit::new(1, "Open", "goal", 10));
        let target_id = store.add_unit(Unit::new(2, "Next", "goal", 10));
        let target = store.unit(target_id).unwrap().clone();

        let compressor = CrossUnitCompressor::with_defaults();
        assert!(matches!(
            compressor.compress_history(&store, &target),
            Err(EngineError::SummaryMissing { unit_ordinal: 1 })
        ));
    }
}
