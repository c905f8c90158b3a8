//! Boundary detection - decides when the active unit has reached its dramatic completion.
//!
//! Hard limits are checked first:
//! 1. Below the minimum chapter count a unit never closes
//! 2. At or past the hard cap a unit always closes
//! 3. Below the evaluation window nothing is evaluated
//!
//! Inside the window three independent signals vote and the unit closes only
//! when enough of them agree.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use story_bible::{Unit, MAX_UNIT_CHAPTERS};
use tracing::{debug, warn};

use crate::collaborators::{with_timeout, GoalJudge};
use crate::text::keywords;

/// Limits and thresholds for boundary detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    /// No unit closes before this many chapters.
    pub min_chapters: u32,

    /// A unit is forced closed at `estimated + hard_cap_margin` chapters.
    pub hard_cap_margin: u32,

    /// Signals are evaluated from `estimated - evaluation_window` chapters on.
    pub evaluation_window: u32,

    /// Agreeing signals needed to close.
    pub required_votes: usize,

    /// Fraction of goal keywords that must appear in recent chapters.
    pub keyword_coverage: f32,

    /// Absolute unit size cap.
    pub max_unit_chapters: u32,

    /// How many of the latest chapters feed the signals.
    pub recent_chapters: usize,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            min_chapters: 8,
            hard_cap_margin: 3,
            evaluation_window: 2,
            required_votes: 2,
            keyword_coverage: 0.6,
            max_unit_chapters: MAX_UNIT_CHAPTERS,
            recent_chapters: 3,
        }
    }
}

/// One signal's opinion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Vote {
    Yes,
    No,
    /// The signal could not be computed and counts neither way.
    Abstain,
}

impl Vote {
    fn from_bool(value: bool) -> Self {
        if value {
            Vote::Yes
        } else {
            Vote::No
        }
    }
}

/// The three boundary signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalVotes {
    pub semantic: Vote,
    pub keyword: Vote,
    pub count: Vote,
}

impl SignalVotes {
    pub fn yes_count(&self) -> usize {
        [self.semantic, self.keyword, self.count]
            .iter()
            .filter(|v| **v == Vote::Yes)
            .count()
    }
}

/// Why a boundary decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryReason {
    MinimumNotReached,
    HardCapExceeded,
    UnitSizeCap,
    CountNotReached,
    SignalsAgree { yes: usize },
    SignalsDisagree { yes: usize },
}

impl fmt::Display for BoundaryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundaryReason::MinimumNotReached => write!(f, "minimum chapters not reached"),
            BoundaryReason::HardCapExceeded => write!(f, "hard cap exceeded"),
            BoundaryReason::UnitSizeCap => write!(f, "unit size cap reached"),
            BoundaryReason::CountNotReached => write!(f, "chapter count not reached"),
            BoundaryReason::SignalsAgree { yes } => write!(f, "{} of 3 signals agree", yes),
            BoundaryReason::SignalsDisagree { yes } => {
                write!(f, "only {} of 3 signals agree", yes)
            }
        }
    }
}

/// Result of evaluating a unit boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryDecision {
    pub should_close: bool,
    pub reason: BoundaryReason,

    /// Present only when signals were evaluated.
    pub votes: Option<SignalVotes>,
}

impl BoundaryDecision {
    fn limit(should_close: bool, reason: BoundaryReason) -> Self {
        Self {
            should_close,
            reason,
            votes: None,
        }
    }

    /// Reason as display text.
    pub fn reason_text(&self) -> String {
        self.reason.to_string()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BoundaryDetector {
    config: BoundaryConfig,
}

impl BoundaryDetector {
    pub fn new(config: BoundaryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BoundaryConfig {
        &self.config
    }

    /// Decide from chapter counts alone, or `None` when signals must vote.
    pub fn precheck(&self, unit: &Unit) -> Option<BoundaryDecision> {
        let actual = unit.actual_chapters;
        let estimated = unit.estimated_chapters;

        if actual < self.config.min_chapters {
            return Some(BoundaryDecision::limit(false, BoundaryReason::MinimumNotReached));
        }
        if actual >= estimated.saturating_add(self.config.hard_cap_margin) {
            return Some(BoundaryDecision::limit(true, BoundaryReason::HardCapExceeded));
        }
        if actual >= self.config.max_unit_chapters {
            return Some(BoundaryDecision::limit(true, BoundaryReason::UnitSizeCap));
        }
        if actual < estimated.saturating_sub(self.config.evaluation_window) {
            return Some(BoundaryDecision::limit(false, BoundaryReason::CountNotReached));
        }
        None
    }

    /// Keyword-presence signal: share of goal keywords found in recent chapters.
    pub fn keyword_vote(&self, dramatic_goal: &str, recent: &[String]) -> Vote {
        let goal_terms = keywords(dramatic_goal);
        if goal_terms.is_empty() {
            return Vote::Abstain;
        }
        let haystack = recent.join("\n").to_lowercase();
        let found = goal_terms.iter().filter(|t| haystack.contains(t.as_str())).count();
        let coverage = found as f32 / goal_terms.len() as f32;
        debug!(found, total = goal_terms.len(), coverage, "goal keyword coverage");
        Vote::from_bool(coverage >= self.config.keyword_coverage)
    }

    /// Chapter-count sufficiency signal.
    pub fn count_vote(&self, unit: &Unit) -> Vote {
        Vote::from_bool(unit.actual_chapters >= unit.estimated_chapters)
    }

    /// Combine signal votes into a decision.
    pub fn decide(&self, votes: SignalVotes) -> BoundaryDecision {
        let yes = votes.yes_count();
        let should_close = yes >= self.config.required_votes;
        let reason = if should_close {
            BoundaryReason::SignalsAgree { yes }
        } else {
            BoundaryReason::SignalsDisagree { yes }
        };
        BoundaryDecision {
            should_close,
            reason,
            votes: Some(votes),
        }
    }

    /// Evaluate the boundary of `unit` given its latest chapter texts.
    ///
    /// The semantic signal abstains when no judge is configured or the judge
    /// fails or times out.
    pub async fn evaluate(
        &self,
        unit: &Unit,
        recent: &[String],
        judge: Option<&dyn GoalJudge>,
        limit: Duration,
    ) -> BoundaryDecision {
        if let Some(decision) = self.precheck(unit) {
            return decision;
        }

        let semantic = match judge {
            Some(judge) => {
                match with_timeout(limit, judge.goal_achieved(&unit.dramatic_goal, recent)).await {
                    Ok(achieved) => Vote::from_bool(achieved),
                    Err(error) => {
                        warn!(unit = unit.ordinal, %error, "goal check failed, abstaining");
                        Vote::Abstain
                    }
                }
            }
            None => Vote::Abstain,
        };

        self.decide(SignalVotes {
            semantic,
            keyword: self.keyword_vote(&unit.dramatic_goal, recent),
            count: self.count_vote(unit),
        })
    }
}
