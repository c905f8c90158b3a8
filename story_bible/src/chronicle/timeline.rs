//! Timeline of story-time markers.

use serde::{Deserialize, Serialize};

use crate::entities::ChapterId;
use crate::error::StateError;

/// How a marker was expressed in the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerKind {
    /// "Day 12"
    Absolute,
    /// "three days later"
    Relative,
}

/// A time marker recorded from an accepted chapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub chapter_id: ChapterId,

    /// Marker as it appeared in the text.
    pub label: String,

    pub kind: MarkerKind,

    /// Resolved position in story days.
    pub position: i64,

    /// Flashback events are exempt from the ordering constraint.
    pub flashback: bool,
}

impl TimelineEvent {
    pub fn new(
        chapter_id: ChapterId,
        label: impl Into<String>,
        kind: MarkerKind,
        position: i64,
    ) -> Self {
        Self {
            chapter_id,
            label: label.into(),
            kind,
            position,
            flashback: false,
        }
    }

    pub fn as_flashback(mut self) -> Self {
        self.flashback = true;
        self
    }
}

/// Append-only sequence of timeline events.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Timeline {
    events: Vec<TimelineEvent>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Story-day position of the latest non-flashback event, or 0 before any.
    pub fn current_position(&self) -> i64 {
        self.events
            .iter()
            .rev()
            .find(|e| !e.flashback)
            .map(|e| e.position)
            .unwrap_or(0)
    }

    /// Append an event, rejecting non-flashback markers that move backwards.
    pub fn append(&mut self, event: TimelineEvent) -> Result<(), StateError> {
        let current = self.current_position();
        if !event.flashback && event.position < current {
            return Err(StateError::TimelineRegression {
                label: event.label,
                position: event.position,
                current,
            });
        }
        self.events.push(event);
        Ok(())
    }

    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    /// Events recorded from a specific chapter.
    pub fn events_in(&self, chapter_id: ChapterId) -> impl Iterator<Item = &TimelineEvent> {
        self.events.iter().filter(move |e| e.chapter_id == chapter_id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
