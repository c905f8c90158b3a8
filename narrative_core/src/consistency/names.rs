//! Alias-to-canonical name index over registered characters.

use std::collections::{HashMap, HashSet};

use story_bible::{is_cjk, NarrativeStateStore};

use crate::text::{contains_phrase, is_word_boundary};

/// Lookup table from every registered name and alias to the canonical name.
///
/// Built once per store revision and consulted by the checks; nothing else
/// resolves names by ad hoc string comparison.
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    /// Lowercased name or alias -> canonical name.
    canonical: HashMap<String, String>,

    /// Names and aliases, longest first so "Jonas Hale" wins over "Jonas".
    surface: Vec<String>,

    /// Lowercased single words of multi-word names ("hale" for "Jonas Hale").
    name_words: HashSet<String>,

    revision: u64,
}

impl NameIndex {
    pub fn build(state: &NarrativeStateStore) -> Self {
        let mut index = Self {
            revision: state.revision(),
            ..Self::default()
        };

        for profile in state.characters() {
            for name in profile.all_names() {
                let key = name.to_lowercase();
                if key.is_empty() {
                    continue;
                }
                for word in key.split_whitespace() {
                    index.name_words.insert(word.to_string());
                }
                index.canonical.insert(key, profile.name.clone());
                index.surface.push(name.to_string());
            }
        }
        index
            .surface
            .sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then_with(|| a.cmp(b)));

        index
    }

    /// Store revision this index was built from.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }

    /// Canonical name for a name or alias.
    pub fn canonical(&self, name: &str) -> Option<&str> {
        self.canonical.get(&name.trim().to_lowercase()).map(String::as_str)
    }

    /// Whether a word refers to a registered character, alone or as part of a
    /// multi-word name.
    pub fn is_known(&self, word: &str) -> bool {
        let key = word.trim().to_lowercase();
        self.canonical.contains_key(&key) || self.name_words.contains(&key)
    }

    /// Canonical names mentioned in a text, longest matching name first.
    pub fn mentions(&self, text: &str) -> Vec<&str> {
        let mut found: Vec<&str> = Vec::new();
        for surface in &self.surface {
            if !contains_phrase(text, surface) {
                continue;
            }
            if let Some(canonical) = self.canonical(surface) {
                if !found.contains(&canonical) {
                    found.push(canonical);
                }
            }
        }
        found
    }

    /// Canonical name of the registered name that `prefix` ends with, if any.
    ///
    /// Non-CJK names must start a word: "Kamira" does not end with "Mira".
    pub fn name_ending(&self, prefix: &str) -> Option<&str> {
        let prefix = prefix.trim_end().to_lowercase();
        self.surface
            .iter()
            .find(|surface| {
                let surface = surface.to_lowercase();
                match prefix.strip_suffix(surface.as_str()) {
                    Some(head) => {
                        surface.chars().next().is_some_and(is_cjk)
                            || is_word_boundary(head.chars().last())
                    }
                    None => false,
                }
            })
            .and_then(|surface| self.canonical(surface))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use story_bible::CharacterProfile;

    fn store() -> NarrativeStateStore {
        let mut store = NarrativeStateStore::new();
        store
            .register_character(CharacterProfile::new("Jonas Hale").with_alias("the mechanic"))
            .unwrap();
        store
            .register_character(CharacterProfile::new("林月").with_alias("月兒"))
            .unwrap();
        store
    }

    #[test]
    fn test_canonical_lookup() {
        let index = NameIndex::build(&store());

        assert_eq!(index.len(), 4);
        assert_eq!(index.canonical("THE MECHANIC"), Some("Jonas Hale"));
        assert_eq!(index.canonical("月兒"), Some("林月"));
        assert!(index.is_known("Hale"));
        assert!(!index.is_known("Voss"));
    }

    #[test]
    fn test_mentions() {
        let index = NameIndex::build(&store());

        let mentions = index.mentions("The mechanic waved while 月兒 watched from the door.");
        assert!(mentions.contains(&"Jonas Hale"));
        assert!(mentions.contains(&"林月"));
        assert_eq!(mentions.len(), 2);

        assert!(index.mentions("Jonasson arrived.").is_empty());
    }

    #[test]
    fn test_name_ending() {
        let index = NameIndex::build(&store());
        assert_eq!(index.name_ending("然後林月"), Some("林月"));
        assert_eq!(index.name_ending("nobody"), None);
        assert_eq!(index.name_ending("then jonas hale "), Some("Jonas Hale"));
        assert_eq!(index.name_ending("(the mechanic"), Some("Jonas Hale"));
    }

    #[test]
    fn test_name_ending_needs_word_start() {
        let mut store = store();
        store.register_character(CharacterProfile::new("Mira")).unwrap();
        let index = NameIndex::build(&store);

        assert_eq!(index.name_ending("the stranger kamira"), None);
        assert_eq!(index.name_ending("the stranger mira"), Some("Mira"));
        assert_eq!(index.name_ending("mira"), Some("Mira"));
    }

    #[test]
    fn test_revision_tracks_store() {
        let mut store = store();
        let index = NameIndex::build(&store);
        assert_eq!(index.revision(), store.revision());

        store.register_character(CharacterProfile::new("Voss")).unwrap();
        assert_ne!(index.revision(), store.revision());
    }
}
