//! Setting facts: locations, objects and rules as first established.

use serde::{Deserialize, Serialize};

use crate::entities::ChapterId;

/// A description of a setting subject, fixed by the chapter that first established it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingFact {
    /// Location, object or rule, e.g. "research station".
    pub key: String,
    pub description: String,
    pub established_in: ChapterId,
}

impl SettingFact {
    pub fn new(
        key: impl Into<String>,
        description: impl Into<String>,
        established_in: ChapterId,
    ) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            established_in,
        }
    }

    /// Last word of the key ("station" for "research station"), used to spot
    /// shortened references.
    pub fn head_noun(&self) -> &str {
        self.key.split_whitespace().last().unwrap_or(&self.key)
    }
}

/// Declared setting subjects and their first-established facts.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SettingRegistry {
    subjects: Vec<String>,
    facts: Vec<SettingFact>,
}

impl SettingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a subject whose first description in an accepted chapter becomes its fact.
    pub fn declare(&mut self, key: impl Into<String>) {
        let key = key.into();
        if !self.subjects.iter().any(|s| s.eq_ignore_ascii_case(&key)) {
            self.subjects.push(key);
        }
    }

    /// Record a fact. Facts are append-only: a later fact for an already
    /// established key is not stored and `false` is returned.
    pub fn establish(&mut self, fact: SettingFact) -> bool {
        if self.fact(&fact.key).is_some() {
            return false;
        }
        self.declare(fact.key.clone());
        self.facts.push(fact);
        true
    }

    /// First-established fact for a key (case-insensitive).
    pub fn fact(&self, key: &str) -> Option<&SettingFact> {
        self.facts.iter().find(|f| f.key.eq_ignore_ascii_case(key))
    }

    pub fn facts(&self) -> &[SettingFact] {
        &self.facts
    }

    /// Declared subjects that no accepted chapter has described yet.
    pub fn undescribed_subjects(&self) -> impl Iterator<Item = &str> {
        self.subjects
            .iter()
            .filter(|s| self.fact(s).is_none())
            .map(String::as_str)
    }
}
