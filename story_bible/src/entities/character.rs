//! Character profiles.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ChapterId;
use crate::error::StateError;

/// Whether a character is alive in the story's present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LifeStatus {
    #[default]
    Alive,
    Dead,
    Unknown,
}

/// A registered character.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterProfile {
    pub name: String,

    /// Other names the text may use for this character.
    #[serde(default)]
    pub aliases: Vec<String>,

    pub traits: Vec<String>,
    pub abilities: Vec<String>,

    /// Other character name -> relationship description.
    #[serde(default)]
    pub relationships: BTreeMap<String, String>,

    pub life_status: LifeStatus,

    /// Chapter in which the character died.
    pub died_in: Option<ChapterId>,
}

impl CharacterProfile {
    /// Create a living character with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            traits: Vec::new(),
            abilities: Vec::new(),
            relationships: BTreeMap::new(),
            life_status: LifeStatus::Alive,
            died_in: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn with_trait(mut self, personality_trait: impl Into<String>) -> Self {
        self.traits.push(personality_trait.into());
        self
    }

    pub fn with_ability(mut self, ability: impl Into<String>) -> Self {
        self.abilities.push(ability.into());
        self
    }

    pub fn with_relationship(mut self, other: impl Into<String>, relation: impl Into<String>) -> Self {
        self.relationships.insert(other.into(), relation.into());
        self
    }

    pub fn with_life_status(mut self, status: LifeStatus) -> Self {
        self.life_status = status;
        self
    }

    pub fn is_dead(&self) -> bool {
        self.life_status == LifeStatus::Dead
    }

    /// Canonical name followed by every alias.
    pub fn all_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    /// Whether the profile lists an ability matching the described one.
    ///
    /// Matching is case-insensitive and accepts either phrase containing the other,
    /// so "fire" matches "fire magic" and vice versa.
    pub fn has_ability(&self, described: &str) -> bool {
        let described = described.trim().to_lowercase();
        if described.is_empty() {
            return true;
        }
        self.abilities.iter().any(|ability| {
            let ability = ability.to_lowercase();
            ability.contains(&described) || described.contains(&ability)
        })
    }

    /// Move the life status forward. Death is monotonic: a dead character only
    /// returns under an explicit flashback exception.
    pub(crate) fn transition(
        &mut self,
        status: LifeStatus,
        chapter: Option<ChapterId>,
        flashback_exception: bool,
    ) -> Result<(), StateError> {
        if self.is_dead() && status != LifeStatus::Dead && !flashback_exception {
            return Err(StateError::ResurrectionForbidden(self.name.clone()));
        }
        self.life_status = status;
        self.died_in = match status {
            LifeStatus::Dead => chapter.or(self.died_in),
            _ => None,
        };
        Ok(())
    }
}
