//! Plot check: resolved threads recurring and mysteries answered off the record.

use std::collections::HashSet;

use story_bible::{NarrativeStateStore, PlotThread, ThreadKind};

use super::{
    ChapterText, ConsistencyCheck, ConsistencyIssue, IssueKind, NameIndex, PlotProblem, Severity,
};
use crate::text::{contains_phrase, split_sentences};

const RECURRENCE_CUES: &[&str] = &[
    "again", "once more", "still", "continues", "continued", "renewed", "resumed", "再次", "又一次",
    "重新", "再度",
];

const RESOLUTION_CUES: &[&str] = &[
    "revealed", "solved", "the truth", "turned out", "finally understood", "真相", "揭曉", "揭晓",
    "原來", "原来",
];

fn mentions_thread(sentence: &str, thread: &PlotThread) -> bool {
    thread
        .match_terms()
        .into_iter()
        .any(|term| contains_phrase(sentence, term))
}

fn has_cue(sentence: &str, cues: &[&str]) -> bool {
    cues.iter().any(|cue| contains_phrase(sentence, cue))
}

/// Flags a resolved thread playing out again and an open mystery being
/// answered without a recorded resolution (both medium).
#[derive(Debug, Clone, Copy, Default)]
pub struct PlotCheck;

impl ConsistencyCheck for PlotCheck {
    fn name(&self) -> &'static str {
        "plot"
    }

    fn check(
        &self,
        chapter: &ChapterText,
        state: &NarrativeStateStore,
        _names: &NameIndex,
    ) -> Vec<ConsistencyIssue> {
        let mut flagged = HashSet::new();
        let mut issues = Vec::new();

        for paragraph in chapter.present() {
            for sentence in split_sentences(&paragraph.text) {
                for thread in state.threads() {
                    if flagged.contains(&thread.id) || !mentions_thread(sentence, thread) {
                        continue;
                    }
                    let problem = if thread.is_resolved() && has_cue(sentence, RECURRENCE_CUES) {
                        PlotProblem::ResolvedRecurs
                    } else if !thread.is_resolved()
                        && thread.kind == ThreadKind::Mystery
                        && has_cue(sentence, RESOLUTION_CUES)
                    {
                        PlotProblem::UnrecordedResolution
                    } else {
                        continue;
                    };

                    flagged.insert(thread.id);
                    let message = match problem {
                        PlotProblem::ResolvedRecurs => {
                            format!("\"{}\" was resolved but recurs: {}", thread.name, sentence)
                        }
                        PlotProblem::UnrecordedResolution => format!(
                            "mystery \"{}\" is answered without a recorded resolution: {}",
                            thread.name, sentence
                        ),
                    };
                    issues.push(ConsistencyIssue::new(
                        IssueKind::PlotInconsistency {
                            thread: thread.name.clone(),
                            problem,
                        },
                        Severity::Medium,
                        message,
                    ));
                }
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use story_bible::ChapterId;

    fn store() -> NarrativeStateStore {
        let mut store = NarrativeStateStore::new();
        store.add_thread(
            PlotThread::new("Siege of Karst", ThreadKind::Conflict)
                .with_keyword("siege")
                .with_keyword("Karst"),
        );
        store.add_thread(PlotThread::new("the missing captain", ThreadKind::Mystery));
        store
            .resolve_thread("Siege of Karst", ChapterId::new())
            .unwrap();
        store
    }

    fn run(store: &NarrativeStateStore, text: &str) -> Vec<ConsistencyIssue> {
        PlotCheck.check(&ChapterText::parse(text), store, &NameIndex::default())
    }

    #[test]
    fn test_resolved_thread_recurs() {
        let issues = run(&store(), "The siege began again at dawn. The siege continued.");

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Medium);
        assert_eq!(
            issues[0].kind,
            IssueKind::PlotInconsistency {
                thread: "Siege of Karst".into(),
                problem: PlotProblem::ResolvedRecurs,
            }
        );
    }

    #[test]
    fn test_mystery_answered_off_record() {
        let issues = run(
            &store(),
            "At last the truth about the missing captain was revealed.",
        );
        assert_eq!(issues.len(), 1);
        assert!(matches!(
            issues[0].kind,
            IssueKind::PlotInconsistency {
                problem: PlotProblem::UnrecordedResolution,
                ..
            }
        ));
    }

    #[test]
    fn test_plain_references_are_clean() {
        let text = "Veterans of Karst drank in silence. Nobody spoke of the missing captain.";
        assert!(run(&store(), text).is_empty());
    }

    #[test]
    fn test_recalling_resolved_thread_in_flashback() {
        assert!(run(&store(), "She remembered the siege raging again and again.").is_empty());
    }
}
