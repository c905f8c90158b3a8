//! Plot threads.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::ChapterId;

/// Unique identifier for plot threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub Uuid);

impl ThreadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ThreadId {
    fn default() -> Self {
        Self::new()
    }
}

/// What kind of thread this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadKind {
    /// An event or conflict that plays out and ends.
    Conflict,
    /// A question the story withholds until it is answered.
    Mystery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadStatus {
    Open,
    Resolved { chapter: ChapterId },
}

/// A tracked plot thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotThread {
    pub id: ThreadId,
    pub name: String,
    pub kind: ThreadKind,

    /// Phrases whose presence in a sentence refers to this thread.
    pub keywords: Vec<String>,

    pub status: ThreadStatus,
}

impl PlotThread {
    pub fn new(name: impl Into<String>, kind: ThreadKind) -> Self {
        Self {
            id: ThreadId::new(),
            name: name.into(),
            kind,
            keywords: Vec::new(),
            status: ThreadStatus::Open,
        }
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keywords.push(keyword.into());
        self
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.status, ThreadStatus::Resolved { .. })
    }

    /// Keywords, or the thread name when none were given.
    pub fn match_terms(&self) -> Vec<&str> {
        if self.keywords.is_empty() {
            vec![self.name.as_str()]
        } else {
            self.keywords.iter().map(String::as_str).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_terms_fall_back_to_name() {
        let thread = PlotThread::new("the missing crew", ThreadKind::Mystery);
        assert_eq!(thread.match_terms(), vec!["the missing crew"]);

        let thread = thread.with_keyword("missing crew").with_keyword("crew vanished");
        assert_eq!(thread.match_terms(), vec!["missing crew", "crew vanished"]);
        assert!(!thread.is_resolved());
    }
}
