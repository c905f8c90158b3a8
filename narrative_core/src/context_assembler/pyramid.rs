//! Pyramid digest of the active unit: the synopsis on top, short digests for
//! older chapters, and the immediately preceding chapter verbatim at the base.

use story_bible::{Chapter, ChapterId, NarrativeStateStore, Unit};

use crate::text::truncate_sentences;

/// Word cap for the digest derived when a chapter has no stored summary.
const FALLBACK_DIGEST_WORDS: usize = 60;

/// Layer of a pyramid block, most compressed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PyramidLayer {
    /// L3: one-paragraph synopsis of the unit.
    Synopsis,
    /// L2: digest of a chapter older than the preceding one.
    Digest { chapter_ordinal: u32 },
    /// L0: the immediately preceding chapter in full.
    Recent { unit_ordinal: u32, chapter_ordinal: u32 },
}

/// A labeled block of the pyramid digest.
#[derive(Debug, Clone)]
pub struct PyramidBlock {
    pub layer: PyramidLayer,
    pub label: String,
    pub text: String,

    /// Chapter the block was taken from, if any.
    pub chapter_id: Option<ChapterId>,
}

#[derive(Debug, Clone, Default)]
pub struct PyramidAssembler;

impl PyramidAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Ordered blocks for generating chapter `target_chapter` of `unit`.
    ///
    /// The preceding chapter is the latest accepted chapter of the unit before
    /// the target. For a unit's first chapter it is the last chapter of the
    /// previous unit, so continuity survives the unit boundary.
    pub fn assemble(
        &self,
        state: &NarrativeStateStore,
        unit: &Unit,
        target_chapter: u32,
    ) -> Vec<PyramidBlock> {
        let mut blocks = vec![PyramidBlock {
            layer: PyramidLayer::Synopsis,
            label: format!("Volume {} synopsis: {}", unit.ordinal, unit.title),
            text: unit.synopsis_or_goal().to_string(),
            chapter_id: None,
        }];

        let mut earlier: Vec<&Chapter> = state
            .chapters_of(unit.id)
            .into_iter()
            .filter(|c| c.ordinal < target_chapter)
            .collect();

        let preceding = match earlier.pop() {
            Some(chapter) => Some((unit.ordinal, chapter)),
            None => state.previous_unit(unit).and_then(|previous| {
                state
                    .last_chapters(previous.id, 1)
                    .into_iter()
                    .next()
                    .map(|chapter| (previous.ordinal, chapter))
            }),
        };

        for chapter in earlier {
            blocks.push(PyramidBlock {
                layer: PyramidLayer::Digest {
                    chapter_ordinal: chapter.ordinal,
                },
                label: format!("Chapter {} digest", chapter.ordinal),
                text: self.digest(state, chapter),
                chapter_id: Some(chapter.id),
            });
        }

        if let Some((unit_ordinal, chapter)) = preceding {
            blocks.push(PyramidBlock {
                layer: PyramidLayer::Recent {
                    unit_ordinal,
                    chapter_ordinal: chapter.ordinal,
                },
                label: format!(
                    "Previous chapter (volume {}, chapter {})",
                    unit_ordinal, chapter.ordinal
                ),
                text: chapter.text.clone(),
                chapter_id: Some(chapter.id),
            });
        }

        blocks
    }

    fn digest(&self, state: &NarrativeStateStore, chapter: &Chapter) -> String {
        match state.chapter_summary(chapter.id) {
            Some(summary) => summary.digest.clone(),
            None => truncate_sentences(&chapter.text, FALLBACK_DIGEST_WORDS).0,
        }
    }
}
