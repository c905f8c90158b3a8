//! Chapter definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{word_count, ChapterId, UnitId};

/// An accepted chapter. Never mutated after acceptance; regeneration creates a
/// new chapter and the old one is discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub id: ChapterId,
    pub unit_id: UnitId,

    /// 1-based position within its unit.
    pub ordinal: u32,

    pub text: String,
    pub word_count: usize,
    pub generated_at: DateTime<Utc>,
}

impl Chapter {
    /// Create a chapter, measuring its word count.
    pub fn new(unit_id: UnitId, ordinal: u32, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            id: ChapterId::new(),
            unit_id,
            ordinal,
            word_count: word_count(&text),
            text,
            generated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_chapter_counts_words() {
        let chapter = Chapter::new(UnitId::new(), 3, "Mira opened the hatch.");
        assert_eq!(chapter.ordinal, 3);
        assert_eq!(chapter.word_count, 4);
    }
}
