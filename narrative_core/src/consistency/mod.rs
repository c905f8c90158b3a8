//! Consistency Tracker - validates generated text against the narrative state.
//!
//! Four checks run over every chapter:
//! - **Character**: unknown names, undeclared abilities, dead characters on stage
//! - **Timeline**: time markers that move story time backwards
//! - **Setting**: re-descriptions contradicting a first-established fact
//! - **Plot**: resolved threads recurring, mysteries answered off the record
//!
//! The tracker only reports. Whether to regenerate is the caller's decision,
//! expressed through [`IssuePolicy`] and the resulting [`Verdict`].

mod character;
mod names;
mod plot;
mod setting;
mod timeline;

pub use character::*;
pub use names::*;
pub use plot::*;
pub use setting::*;
pub use timeline::*;

use serde::{Deserialize, Serialize};
use std::fmt;

use story_bible::NarrativeStateStore;

use crate::error::{EngineError, Result};
use crate::text::{contains_phrase, split_paragraphs, split_sentences};

/// Issue severity, least severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// How a plot thread was contradicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlotProblem {
    /// A resolved thread plays out again.
    ResolvedRecurs,
    /// An open mystery is answered without a recorded resolution.
    UnrecordedResolution,
}

/// Closed set of issue kinds, each with its own payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueKind {
    UnknownCharacter {
        name: String,
    },
    AbilityInconsistency {
        character: String,
        ability: String,
    },
    DeadCharacterAppears {
        character: String,
    },
    TimelineError {
        marker: String,
        position: i64,
        established: i64,
    },
    SettingContradiction {
        key: String,
        established: String,
        found: String,
    },
    PlotInconsistency {
        thread: String,
        problem: PlotProblem,
    },
}

impl IssueKind {
    /// Stable snake_case code of the kind.
    pub fn code(&self) -> &'static str {
        match self {
            IssueKind::UnknownCharacter { .. } => "unknown_character",
            IssueKind::AbilityInconsistency { .. } => "ability_inconsistency",
            IssueKind::DeadCharacterAppears { .. } => "dead_character_appears",
            IssueKind::TimelineError { .. } => "timeline_error",
            IssueKind::SettingContradiction { .. } => "setting_contradiction",
            IssueKind::PlotInconsistency { .. } => "plot_inconsistency",
        }
    }

    /// The entity the issue is about.
    pub fn subject(&self) -> &str {
        match self {
            IssueKind::UnknownCharacter { name } => name,
            IssueKind::AbilityInconsistency { character, .. } => character,
            IssueKind::DeadCharacterAppears { character } => character,
            IssueKind::TimelineError { marker, .. } => marker,
            IssueKind::SettingContradiction { key, .. } => key,
            IssueKind::PlotInconsistency { thread, .. } => thread,
        }
    }
}

/// A single finding from one validation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
}

impl ConsistencyIssue {
    pub fn new(kind: IssueKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
        }
    }

    pub fn subject(&self) -> &str {
        self.kind.subject()
    }
}

impl fmt::Display for ConsistencyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.kind.code(), self.message)
    }
}

const FLASHBACK_OPEN: &str = "[flashback]";
const FLASHBACK_CLOSE: &str = "[/flashback]";
const FLASHBACK_CUES: &[&str] = &["flashback", "remembered", "回憶", "回忆"];

/// A paragraph of chapter text, or a run of its sentences, and whether it is
/// told as a flashback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paragraph {
    pub text: String,
    pub flashback: bool,
}

/// Chapter text split into paragraphs with flashback scoping resolved.
///
/// Everything between `[flashback]` and `[/flashback]` tags is a flashback.
/// Outside tags a cue word ("remembered") marks only its own sentence, so a
/// paragraph mixing memory and present action is split into runs.
#[derive(Debug, Clone)]
pub struct ChapterText {
    paragraphs: Vec<Paragraph>,
}

impl ChapterText {
    pub fn parse(text: &str) -> Self {
        let mut paragraphs = Vec::new();
        let mut in_block = false;

        for paragraph in split_paragraphs(text) {
            let lower = paragraph.to_lowercase();
            if lower.contains(FLASHBACK_OPEN) {
                in_block = true;
            }
            let close = lower.contains(FLASHBACK_CLOSE);
            if in_block {
                paragraphs.push(Paragraph {
                    text: paragraph,
                    flashback: true,
                });
            } else {
                push_cued_runs(&mut paragraphs, &paragraph);
            }
            if close {
                in_block = false;
            }
        }

        Self { paragraphs }
    }

    pub fn paragraphs(&self) -> &[Paragraph] {
        &self.paragraphs
    }

    /// Paragraphs told in the story's present.
    pub fn present(&self) -> impl Iterator<Item = &Paragraph> {
        self.paragraphs.iter().filter(|p| !p.flashback)
    }
}

fn is_cued(sentence: &str) -> bool {
    FLASHBACK_CUES.iter().any(|cue| contains_phrase(sentence, cue))
}

/// Split a paragraph into runs of consecutive sentences that agree on
/// whether they carry a flashback cue.
fn push_cued_runs(out: &mut Vec<Paragraph>, paragraph: &str) {
    if !is_cued(paragraph) {
        out.push(Paragraph {
            text: paragraph.to_string(),
            flashback: false,
        });
        return;
    }

    let mut run: Vec<&str> = Vec::new();
    let mut run_flashback = false;
    for sentence in split_sentences(paragraph) {
        let flashback = is_cued(sentence);
        if flashback != run_flashback && !run.is_empty() {
            out.push(Paragraph {
                text: run.join(" "),
                flashback: run_flashback,
            });
            run.clear();
        }
        run_flashback = flashback;
        run.push(sentence);
    }
    if !run.is_empty() {
        out.push(Paragraph {
            text: run.join(" "),
            flashback: run_flashback,
        });
    }
}

/// One independent consistency check.
pub trait ConsistencyCheck: Send + Sync {
    fn name(&self) -> &'static str;

    fn check(
        &self,
        chapter: &ChapterText,
        state: &NarrativeStateStore,
        names: &NameIndex,
    ) -> Vec<ConsistencyIssue>;
}

/// Runs every registered check and concatenates their issues.
pub struct ConsistencyTracker {
    checks: Vec<Box<dyn ConsistencyCheck>>,
}

impl ConsistencyTracker {
    /// A tracker with no checks.
    pub fn empty() -> Self {
        Self { checks: Vec::new() }
    }

    /// Character, timeline, setting and plot checks, in that order.
    pub fn standard() -> Self {
        Self::empty()
            .with_check(CharacterCheck)
            .with_check(TimelineCheck)
            .with_check(SettingCheck)
            .with_check(PlotCheck)
    }

    pub fn with_check(mut self, check: impl ConsistencyCheck + 'static) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    pub fn check_names(&self) -> Vec<&'static str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    /// Validate chapter text against the state using a prebuilt name index.
    pub fn check(
        &self,
        text: &str,
        state: &NarrativeStateStore,
        names: &NameIndex,
    ) -> Vec<ConsistencyIssue> {
        let chapter = ChapterText::parse(text);
        self.checks
            .iter()
            .flat_map(|check| check.check(&chapter, state, names))
            .collect()
    }
}

impl Default for ConsistencyTracker {
    fn default() -> Self {
        Self::standard()
    }
}

/// The caller's retry policy over validation results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuePolicy {
    /// Treat high-severity issues as grounds for regeneration.
    pub regenerate_on_high: bool,
}

impl IssuePolicy {
    /// Lowest severity that rejects a chapter.
    pub fn reject_threshold(&self) -> Severity {
        if self.regenerate_on_high {
            Severity::High
        } else {
            Severity::Critical
        }
    }
}

/// What the caller should do with a validated chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Accept,
    /// Accept, but the issues deserve attention.
    Warn,
    /// Regenerate.
    Reject,
}

/// Issues of one validation call with the verdict under a policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub verdict: Verdict,
    pub issues: Vec<ConsistencyIssue>,
    pub threshold: Severity,
}

impl ValidationReport {
    pub fn new(issues: Vec<ConsistencyIssue>, policy: &IssuePolicy) -> Self {
        let threshold = policy.reject_threshold();
        let worst = issues.iter().map(|i| i.severity).max();
        let verdict = match worst {
            Some(severity) if severity >= threshold => Verdict::Reject,
            Some(severity) if severity >= Severity::High => Verdict::Warn,
            _ => Verdict::Accept,
        };
        Self {
            verdict,
            issues,
            threshold,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.verdict != Verdict::Reject
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    pub fn has_critical(&self) -> bool {
        self.count(Severity::Critical) > 0
    }

    /// The issues, or `ConsistencyCritical` carrying those at or above the
    /// rejection threshold when the verdict is `Reject`.
    pub fn into_result(self) -> Result<Vec<ConsistencyIssue>> {
        if self.verdict != Verdict::Reject {
            return Ok(self.issues);
        }
        let threshold = self.threshold;
        Err(EngineError::ConsistencyCritical {
            issues: self
                .issues
                .into_iter()
                .filter(|i| i.severity >= threshold)
                .collect(),
        })
    }
}
