//! Setting check: re-descriptions that contradict a first-established fact.

use story_bible::{NarrativeStateStore, SettingFact};

use super::{ChapterText, ConsistencyCheck, ConsistencyIssue, IssueKind, NameIndex, Severity};
use crate::text::{contains_phrase, split_sentences};

/// Pairs of mutually exclusive descriptor groups.
const DESCRIPTOR_PAIRS: &[(&[&str], &[&str])] = &[
    (
        &["abandoned", "deserted", "empty", "derelict", "desolate", "廢棄", "废弃", "荒廢", "荒废"],
        &["bustling", "crowded", "busy", "inhabited", "thriving", "lively", "熱鬧", "热闹", "繁華", "繁华"],
    ),
    (
        &["destroyed", "ruined", "collapsed", "razed", "摧毀", "摧毁", "廢墟", "废墟"],
        &["intact", "pristine", "undamaged", "完好"],
    ),
    (
        &["locked", "sealed", "封閉", "封闭"],
        &["unlocked", "unsealed", "開放", "开放"],
    ),
    (
        &["dark", "unlit", "pitch-black", "黑暗"],
        &["lit", "bright", "illuminated", "明亮"],
    ),
];

fn first_descriptor<'a>(text: &str, group: &[&'a str]) -> Option<&'a str> {
    group.iter().copied().find(|word| contains_phrase(text, word))
}

/// Descriptors in `text` that contradict `established`, paired with the
/// descriptor they contradict.
pub fn contradicting_descriptors(established: &str, text: &str) -> Vec<(&'static str, &'static str)> {
    let mut found = Vec::new();
    for (left, right) in DESCRIPTOR_PAIRS {
        for (side, other) in [(left, right), (right, left)] {
            if let (Some(was), Some(now)) = (
                first_descriptor(established, side),
                first_descriptor(text, other),
            ) {
                found.push((was, now));
            }
        }
    }
    found
}

/// Whether a sentence describes a subject with any tracked descriptor.
pub fn has_descriptor(sentence: &str) -> bool {
    DESCRIPTOR_PAIRS.iter().any(|(left, right)| {
        first_descriptor(sentence, left).is_some() || first_descriptor(sentence, right).is_some()
    })
}

/// First sentence of `text` describing the subject `key`, if any.
pub fn describing_sentence<'t>(text: &'t str, key: &str) -> Option<&'t str> {
    split_sentences(text)
        .into_iter()
        .find(|sentence| contains_phrase(sentence, key) && has_descriptor(sentence))
}

/// Flags contradicting re-descriptions: high when the full key is named,
/// medium when only its head noun is.
#[derive(Debug, Clone, Copy, Default)]
pub struct SettingCheck;

impl SettingCheck {
    fn check_fact(&self, fact: &SettingFact, chapter: &ChapterText) -> Option<ConsistencyIssue> {
        for paragraph in chapter.present() {
            for sentence in split_sentences(&paragraph.text) {
                let severity = if contains_phrase(sentence, &fact.key) {
                    Severity::High
                } else if contains_phrase(sentence, fact.head_noun()) {
                    Severity::Medium
                } else {
                    continue;
                };
                if let Some((was, now)) = contradicting_descriptors(&fact.description, sentence)
                    .into_iter()
                    .next()
                {
                    return Some(ConsistencyIssue::new(
                        IssueKind::SettingContradiction {
                            key: fact.key.clone(),
                            established: fact.description.clone(),
                            found: sentence.to_string(),
                        },
                        severity,
                        format!(
                            "{} was established as {} but is described as {}",
                            fact.key, was, now
                        ),
                    ));
                }
            }
        }
        None
    }
}

impl ConsistencyCheck for SettingCheck {
    fn name(&self) -> &'static str {
        "setting"
    }

    fn check(
        &self,
        chapter: &ChapterText,
        state: &NarrativeStateStore,
        _names: &NameIndex,
    ) -> Vec<ConsistencyIssue> {
        state
            .settings()
            .facts()
            .iter()
            .filter_map(|fact| self.check_fact(fact, chapter))
            .collect()
    }
}
