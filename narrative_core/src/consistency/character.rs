//! Character check: unknown names, undeclared abilities, dead characters on stage.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use story_bible::NarrativeStateStore;

use super::{ChapterText, ConsistencyCheck, ConsistencyIssue, IssueKind, NameIndex, Severity};

const SPEECH_VERBS: &str = "said|asked|replied|shouted|whispered|muttered|answered|cried|called|snapped|growled|murmured";

// Name before a speech verb: "Voss said".
static RE_SPEAKER_BEFORE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"\b([A-Z][a-z]+)\s+(?:{})\b", SPEECH_VERBS)).expect("valid regex")
});

// Name after a speech verb: "said Voss".
static RE_SPEAKER_AFTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"\b(?:{})\s+([A-Z][a-z]+)\b", SPEECH_VERBS)).expect("valid regex")
});

static RE_HONORIFIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:Mr|Mrs|Ms|Dr|Captain|Commander|General|Lord|Lady|Sir|Master|Professor)\.?\s+([A-Z][a-z]+)\b")
        .expect("valid regex")
});

// "Mira used her fire magic", "Jonas cast a ward."
static RE_ABILITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b([A-Z][a-z]+)\s+(?:used|uses|cast|casts|wielded|wields|summoned|summons|activated|activates|invoked|invokes|unleashed|unleashes)\s+(?:(?:his|her|their|its|the|a|an)\s+)?([a-z][a-z\- ]*?)(?:\s+(?:to|on|at|against|and|with)\b|[.,;:!?]|$)",
    )
    .expect("valid regex")
});

// "林月施展了火球術"; the actor is the registered name right before the verb.
static RE_ABILITY_CJK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:使用|施展|發動|发动|祭出)了?(\p{Han}{1,8})").expect("valid regex")
});

/// Capitalized words that take speech verbs without being names.
const NOT_NAMES: &[&str] = &[
    "he", "she", "they", "we", "you", "it", "everyone", "everybody", "someone", "somebody",
    "nobody", "anyone", "one", "then", "and", "but", "who", "what", "voice", "the",
];

/// Flags unknown characters (high), abilities missing from a profile (high)
/// and dead characters outside flashbacks (critical).
#[derive(Debug, Clone, Copy, Default)]
pub struct CharacterCheck;

impl CharacterCheck {
    fn unknown_names(&self, chapter: &ChapterText, names: &NameIndex) -> Vec<ConsistencyIssue> {
        let mut seen = HashSet::new();
        let mut issues = Vec::new();

        for paragraph in chapter.paragraphs() {
            let candidates = [&*RE_SPEAKER_BEFORE, &*RE_SPEAKER_AFTER, &*RE_HONORIFIC]
                .into_iter()
                .flat_map(|re| re.captures_iter(&paragraph.text))
                .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()));

            for candidate in candidates {
                let lower = candidate.to_lowercase();
                if NOT_NAMES.contains(&lower.as_str()) || names.is_known(&candidate) {
                    continue;
                }
                if seen.insert(lower) {
                    issues.push(ConsistencyIssue::new(
                        IssueKind::UnknownCharacter {
                            name: candidate.clone(),
                        },
                        Severity::High,
                        format!("{} is not a registered character", candidate),
                    ));
                }
            }
        }

        issues
    }

    fn abilities(
        &self,
        chapter: &ChapterText,
        state: &NarrativeStateStore,
        names: &NameIndex,
    ) -> Vec<ConsistencyIssue> {
        let mut seen = HashSet::new();
        let mut issues = Vec::new();

        for paragraph in chapter.paragraphs() {
            let text = paragraph.text.as_str();
            let mut uses: Vec<(String, String)> = Vec::new();

            for caps in RE_ABILITY.captures_iter(text) {
                if let (Some(actor), Some(ability)) = (caps.get(1), caps.get(2)) {
                    if let Some(canonical) = names.canonical(actor.as_str()) {
                        uses.push((canonical.to_string(), ability.as_str().trim().to_string()));
                    }
                }
            }
            for caps in RE_ABILITY_CJK.captures_iter(text) {
                let (Some(whole), Some(ability)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                if let Some(canonical) = names.name_ending(&text[..whole.start()]) {
                    uses.push((canonical.to_string(), ability.as_str().to_string()));
                }
            }

            for (character, ability) in uses {
                let Some(profile) = state.character(&character) else {
                    continue;
                };
                if profile.has_ability(&ability) || !seen.insert((character.clone(), ability.clone())) {
                    continue;
                }
                issues.push(ConsistencyIssue::new(
                    IssueKind::AbilityInconsistency {
                        character: character.clone(),
                        ability: ability.clone(),
                    },
                    Severity::High,
                    format!("{} uses \"{}\", which is not in their profile", character, ability),
                ));
            }
        }

        issues
    }

    fn dead_on_stage(
        &self,
        chapter: &ChapterText,
        state: &NarrativeStateStore,
        names: &NameIndex,
    ) -> Vec<ConsistencyIssue> {
        let mut flagged = HashSet::new();
        let mut issues = Vec::new();

        for paragraph in chapter.present() {
            for canonical in names.mentions(&paragraph.text) {
                let dead = state.character(canonical).is_some_and(|c| c.is_dead());
                if dead && flagged.insert(canonical.to_string()) {
                    issues.push(ConsistencyIssue::new(
                        IssueKind::DeadCharacterAppears {
                            character: canonical.to_string(),
                        },
                        Severity::Critical,
                        format!("{} is dead but appears outside a flashback", canonical),
                    ));
                }
            }
        }

        issues
    }
}

impl ConsistencyCheck for CharacterCheck {
    fn name(&self) -> &'static str {
        "character"
    }

    fn check(
        &self,
        chapter: &ChapterText,
        state: &NarrativeStateStore,
        names: &NameIndex,
    ) -> Vec<ConsistencyIssue> {
        let mut issues = self.unknown_names(chapter, names);
        issues.extend(self.abilities(chapter, state, names));
        issues.extend(self.dead_on_stage(chapter, state, names));
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use story_bible::{CharacterProfile, LifeStatus};

    fn store() -> NarrativeStateStore {
        let mut store = NarrativeStateStore::new();
        store
            .register_character(
                CharacterProfile::new("Mira")
                    .with_trait("stubborn")
                    .with_ability("fire magic")
                    .with_ability("piloting"),
            )
            .unwrap();
        store
            .register_character(
                CharacterProfile::new("Jonas Hale").with_life_status(LifeStatus::Dead),
            )
            .unwrap();
        store
            .register_character(CharacterProfile::new("林月").with_ability("火球術"))
            .unwrap();
        store
    }

    fn run(store: &NarrativeStateStore, text: &str) -> Vec<ConsistencyIssue> {
        let names = NameIndex::build(store);
        CharacterCheck.check(&ChapterText::parse(text), store, &names)
    }

    fn codes(issues: &[ConsistencyIssue]) -> Vec<&'static str> {
        issues.iter().map(|i| i.kind.code()).collect()
    }

    #[test]
    fn test_registered_cast_is_clean() {
        let store = store();
        let issues = run(
            &store,
            "\"Hold on,\" Mira said. She used her fire magic to light the corridor.\n\n\
             Everyone asked about the ship. Captain Mira nodded.",
        );
        assert!(issues.is_empty(), "{:?}", issues);
    }

    #[test]
    fn test_unknown_speaker() {
        let store = store();
        let issues = run(&store, "\"We leave at dawn,\" said Voss. Voss said nothing more.");

        assert_eq!(codes(&issues), vec!["unknown_character"]);
        assert_eq!(issues[0].severity, Severity::High);
        assert_eq!(issues[0].subject(), "Voss");
    }

    #[test]
    fn test_multi_word_name_parts_are_known() {
        let store = store();
        let issues = run(&store, "[flashback]\nHale said the engines would hold.\n[/flashback]");
        assert!(issues.is_empty(), "{:?}", issues);
    }

    #[test]
    fn test_undeclared_ability() {
        let store = store();
        let issues = run(&store, "Mira summoned a storm of ice against the drones.");

        assert_eq!(codes(&issues), vec!["ability_inconsistency"]);
        assert_eq!(
            issues[0].kind,
            IssueKind::AbilityInconsistency {
                character: "Mira".into(),
                ability: "storm of ice".into(),
            }
        );
    }

    #[test]
    fn test_cjk_ability() {
        let store = store();
        assert!(run(&store, "林月施展了火球術。").is_empty());

        let issues = run(&store, "林月施展了冰封術。");
        assert_eq!(codes(&issues), vec!["ability_inconsistency"]);
    }

    #[test]
    fn test_dead_character_outside_flashback_is_critical() {
        let store = store();
        let issues = run(&store, "Jonas Hale walked into the hangar.");

        assert_eq!(codes(&issues), vec!["dead_character_appears"]);
        assert_eq!(issues[0].severity, Severity::Critical);
    }

    #[test]
    fn test_dead_character_in_flashback_is_allowed() {
        let store = store();
        let issues = run(&store, "Mira remembered how Jonas Hale laughed at her jokes.");
        assert!(issues.is_empty(), "{:?}", issues);
    }
}
