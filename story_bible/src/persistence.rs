//! Persistence contract and store snapshots.
//!
//! The store never assumes a storage medium. It reads and writes whole record
//! groups through `Persistence`, keyed by the constants below; reads must
//! reflect the most recent committed write.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::chronicle::{PlotThread, SettingRegistry, Timeline};
use crate::entities::{Chapter, ChapterSummary, CharacterProfile, Unit, UnitSummary};
use crate::error::StateError;
use crate::state_store::NarrativeStateStore;

pub const KEY_OUTLINE: &str = "outline";
pub const KEY_UNITS: &str = "units";
pub const KEY_CHAPTERS: &str = "chapters";
pub const KEY_UNIT_SUMMARIES: &str = "unit_summaries";
pub const KEY_CHAPTER_SUMMARIES: &str = "chapter_summaries";
pub const KEY_CHARACTERS: &str = "characters";
pub const KEY_TIMELINE: &str = "timeline";
pub const KEY_SETTINGS: &str = "settings";
pub const KEY_THREADS: &str = "plot_threads";

/// Key-addressed storage for narrative records.
pub trait Persistence: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StateError>;
    fn put(&self, key: &str, value: Value) -> Result<(), StateError>;
}

/// In-process storage, mostly useful for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    records: RwLock<HashMap<String, Value>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for MemoryPersistence {
    fn get(&self, key: &str) -> Result<Option<Value>, StateError> {
        let records = self
            .records
            .read()
            .map_err(|_| StateError::Persistence("memory store poisoned".to_string()))?;
        Ok(records.get(key).cloned())
    }

    fn put(&self, key: &str, value: Value) -> Result<(), StateError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StateError::Persistence("memory store poisoned".to_string()))?;
        records.insert(key.to_string(), value);
        Ok(())
    }
}

fn put_record<T: Serialize + ?Sized>(
    store: &dyn Persistence,
    key: &str,
    record: &T,
) -> Result<(), StateError> {
    let value = serde_json::to_value(record)
        .map_err(|e| StateError::Persistence(format!("encode {}: {}", key, e)))?;
    store.put(key, value)
}

fn get_record<T: DeserializeOwned + Default>(
    store: &dyn Persistence,
    key: &str,
) -> Result<T, StateError> {
    match store.get(key)? {
        Some(value) => serde_json::from_value(value)
            .map_err(|e| StateError::Persistence(format!("decode {}: {}", key, e))),
        None => Ok(T::default()),
    }
}

impl NarrativeStateStore {
    /// Write every record group to the given storage.
    pub fn save_to(&self, store: &dyn Persistence) -> Result<(), StateError> {
        put_record(store, KEY_OUTLINE, &self.outline)?;

        let units = self.units_ordered();
        put_record(store, KEY_UNITS, &units)?;

        let mut chapters: Vec<&Chapter> = Vec::new();
        for unit in &units {
            chapters.extend(self.chapters_of(unit.id));
        }
        put_record(store, KEY_CHAPTERS, &chapters)?;

        let unit_summaries: Vec<&UnitSummary> = units
            .iter()
            .filter_map(|u| self.unit_summaries.get(&u.id))
            .collect();
        put_record(store, KEY_UNIT_SUMMARIES, &unit_summaries)?;

        let chapter_summaries: Vec<&ChapterSummary> = chapters
            .iter()
            .filter_map(|c| self.chapter_summaries.get(&c.id))
            .collect();
        put_record(store, KEY_CHAPTER_SUMMARIES, &chapter_summaries)?;

        let characters: Vec<&CharacterProfile> = self.characters.values().collect();
        put_record(store, KEY_CHARACTERS, &characters)?;
        put_record(store, KEY_TIMELINE, &self.timeline)?;
        put_record(store, KEY_SETTINGS, &self.settings)?;
        put_record(store, KEY_THREADS, &self.threads)?;
        Ok(())
    }

    /// Rebuild a store from the given storage. Missing groups load empty.
    pub fn load_from(store: &dyn Persistence) -> Result<Self, StateError> {
        let mut state = NarrativeStateStore::new();
        state.outline = get_record::<Option<String>>(store, KEY_OUTLINE)?;

        for unit in get_record::<Vec<Unit>>(store, KEY_UNITS)? {
            state.unit_chapters.entry(unit.id).or_default();
            state.units.insert(unit.id, unit);
        }

        let mut chapters = get_record::<Vec<Chapter>>(store, KEY_CHAPTERS)?;
        chapters.sort_by_key(|c| c.ordinal);
        for chapter in chapters {
            if !state.units.contains_key(&chapter.unit_id) {
                return Err(StateError::UnknownUnit(chapter.unit_id));
            }
            state
                .unit_chapters
                .entry(chapter.unit_id)
                .or_default()
                .push(chapter.id);
            state.chapters.insert(chapter.id, chapter);
        }

        for summary in get_record::<Vec<UnitSummary>>(store, KEY_UNIT_SUMMARIES)? {
            state.unit_summaries.insert(summary.unit_id, summary);
        }
        for summary in get_record::<Vec<ChapterSummary>>(store, KEY_CHAPTER_SUMMARIES)? {
            state.chapter_summaries.insert(summary.chapter_id, summary);
        }
        for profile in get_record::<Vec<CharacterProfile>>(store, KEY_CHARACTERS)? {
            state.characters.insert(profile.name.to_lowercase(), profile);
        }

        state.timeline = get_record::<Timeline>(store, KEY_TIMELINE)?;
        state.settings = get_record::<SettingRegistry>(store, KEY_SETTINGS)?;
        state.threads = get_record::<Vec<PlotThread>>(store, KEY_THREADS)?;
        Ok(state)
    }
}
