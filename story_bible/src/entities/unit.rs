//! Unit (volume) definitions.

use serde::{Deserialize, Serialize};

use super::UnitId;
use crate::error::StateError;

/// Hard ceiling on chapters per unit.
pub const MAX_UNIT_CHAPTERS: u32 = 20;

/// Lifecycle of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum UnitStatus {
    #[default]
    Active,
    Closed,
}

/// A semantically bounded narrative arc spanning several chapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,

    /// 1-based position of the unit in the story.
    pub ordinal: u32,

    pub title: String,

    /// What must happen for this unit to be dramatically complete.
    pub dramatic_goal: String,

    /// One-paragraph synopsis used as the top layer of the pyramid digest.
    pub synopsis: Option<String>,

    pub estimated_chapters: u32,
    pub actual_chapters: u32,
    pub status: UnitStatus,

    /// Why the unit was closed, once it is.
    pub close_reason: Option<String>,
}

impl Unit {
    /// Create a new active unit.
    pub fn new(
        ordinal: u32,
        title: impl Into<String>,
        dramatic_goal: impl Into<String>,
        estimated_chapters: u32,
    ) -> Self {
        Self {
            id: UnitId::new(),
            ordinal,
            title: title.into(),
            dramatic_goal: dramatic_goal.into(),
            synopsis: None,
            estimated_chapters,
            actual_chapters: 0,
            status: UnitStatus::Active,
            close_reason: None,
        }
    }

    /// Set the one-paragraph synopsis.
    pub fn with_synopsis(mut self, synopsis: impl Into<String>) -> Self {
        self.synopsis = Some(synopsis.into());
        self
    }

    pub fn is_closed(&self) -> bool {
        self.status == UnitStatus::Closed
    }

    /// The synopsis, falling back to the dramatic goal.
    pub fn synopsis_or_goal(&self) -> &str {
        self.synopsis.as_deref().unwrap_or(&self.dramatic_goal)
    }

    /// Count one more accepted chapter, returning its 1-based ordinal.
    pub(crate) fn record_chapter(&mut self) -> Result<u32, StateError> {
        if self.is_closed() {
            return Err(StateError::UnitClosed(self.ordinal));
        }
        if self.actual_chapters >= MAX_UNIT_CHAPTERS {
            return Err(StateError::UnitFull {
                unit_ordinal: self.ordinal,
                cap: MAX_UNIT_CHAPTERS,
            });
        }
        self.actual_chapters += 1;
        Ok(self.actual_chapters)
    }

    /// Close the unit. Closed units are immutable.
    pub(crate) fn close(&mut self, reason: impl Into<String>) -> Result<(), StateError> {
        if self.is_closed() {
            return Err(StateError::UnitClosed(self.ordinal));
        }
        self.status = UnitStatus::Closed;
        self.close_reason = Some(reason.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_unit() {
        let unit = Unit::new(1, "Arrival", "The crew reaches the station", 12);
        assert_eq!(unit.actual_chapters, 0);
        assert!(!unit.is_closed());
        assert_eq!(unit.synopsis_or_goal(), "The crew reaches the station");
    }

    #[test]
    fn test_record_chapter_until_cap() {
        let mut unit = Unit::new(1, "Long", "Goal", 18);
        for expected in 1..=MAX_UNIT_CHAPTERS {
            assert_eq!(unit.record_chapter().unwrap(), expected);
        }
        assert!(matches!(
            unit.record_chapter(),
            Err(StateError::UnitFull { cap: MAX_UNIT_CHAPTERS, .. })
        ));
    }

    #[test]
    fn test_closed_unit_is_immutable() {
        let mut unit = Unit::new(2, "Siege", "Hold the gate", 10);
        unit.close("hard cap exceeded").unwrap();
        assert!(unit.is_closed());
        assert!(matches!(unit.record_chapter(), Err(StateError::UnitClosed(2))));
        assert!(unit.close("again").is_err());
        assert_eq!(unit.close_reason.as_deref(), Some("hard cap exceeded"));
    }
}
