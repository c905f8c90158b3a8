//! Entity definitions for the story.

mod chapter;
mod character;
mod summary;
mod unit;

pub use chapter::*;
pub use character::*;
pub use summary::*;
pub use unit::*;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a unit (volume).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitId(pub Uuid);

impl UnitId {
    /// Create a new random unit ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a unit ID from a specific UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for UnitId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an accepted chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChapterId(pub Uuid);

impl ChapterId {
    /// Create a new random chapter ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a nil chapter ID (useful for records established before any chapter).
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for ChapterId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChapterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Counts word-equivalents: every CJK ideograph counts as one, and every other
/// whitespace-separated run counts as one.
pub fn word_count(text: &str) -> usize {
    let mut count = 0;
    let mut in_word = false;

    for ch in text.chars() {
        if is_cjk(ch) {
            count += 1;
            in_word = false;
        } else if ch.is_whitespace() {
            in_word = false;
        } else if !in_word {
            count += 1;
            in_word = true;
        }
    }

    count
}

/// Whether a character belongs to the CJK ideograph blocks.
pub fn is_cjk(ch: char) -> bool {
    matches!(ch,
        '\u{4e00}'..='\u{9fff}'
        | '\u{3400}'..='\u{4dbf}'
        | '\u{f900}'..='\u{faff}'
        | '\u{20000}'..='\u{2a6df}')
}
