//! Narrative state store - the single owner of every persistent entity.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::chronicle::{PlotThread, SettingFact, SettingRegistry, ThreadId, ThreadStatus, Timeline, TimelineEvent};
use crate::entities::{
    Chapter, ChapterId, ChapterSummary, CharacterProfile, LifeStatus, Unit, UnitId, UnitSummary,
};
use crate::error::StateError;

/// The complete narrative state at any point in the generation run.
///
/// Single writer (the commit step after each accepted chapter), many readers
/// (context assembly and validation). Every mutation bumps `revision` so
/// derived per-session caches know when to rebuild.
#[derive(Debug, Clone, Default)]
pub struct NarrativeStateStore {
    /// Global story outline.
    pub(crate) outline: Option<String>,

    pub(crate) units: HashMap<UnitId, Unit>,
    pub(crate) chapters: HashMap<ChapterId, Chapter>,

    /// Index: unit -> accepted chapters in ordinal order.
    pub(crate) unit_chapters: HashMap<UnitId, Vec<ChapterId>>,

    pub(crate) unit_summaries: HashMap<UnitId, UnitSummary>,
    pub(crate) chapter_summaries: HashMap<ChapterId, ChapterSummary>,

    /// Characters keyed by lowercased canonical name.
    pub(crate) characters: BTreeMap<String, CharacterProfile>,

    pub(crate) timeline: Timeline,
    pub(crate) settings: SettingRegistry,
    pub(crate) threads: Vec<PlotThread>,

    pub(crate) revision: u64,
}

impl NarrativeStateStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Monotonic counter bumped by every mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    pub fn set_outline(&mut self, outline: impl Into<String>) {
        self.outline = Some(outline.into());
        self.touch();
    }

    pub fn outline(&self) -> Option<&str> {
        self.outline.as_deref()
    }

    // ------------------------------------------------------------------
    // Units and chapters
    // ------------------------------------------------------------------

    /// Add a unit assigned by planning.
    pub fn add_unit(&mut self, unit: Unit) -> UnitId {
        let id = unit.id;
        self.unit_chapters.entry(id).or_default();
        self.units.insert(id, unit);
        self.touch();
        id
    }

    pub fn unit(&self, id: UnitId) -> Result<&Unit, StateError> {
        self.units.get(&id).ok_or(StateError::UnknownUnit(id))
    }

    /// All units in story order.
    pub fn units_ordered(&self) -> Vec<&Unit> {
        let mut units: Vec<_> = self.units.values().collect();
        units.sort_by_key(|u| u.ordinal);
        units
    }

    /// Units strictly before the given ordinal, in story order.
    pub fn units_before(&self, ordinal: u32) -> Vec<&Unit> {
        self.units_ordered()
            .into_iter()
            .filter(|u| u.ordinal < ordinal)
            .collect()
    }

    /// The unit immediately preceding the given one.
    pub fn previous_unit(&self, unit: &Unit) -> Option<&Unit> {
        self.units_before(unit.ordinal).into_iter().last()
    }

    /// Accept a chapter into an active unit, returning the stored chapter.
    pub fn accept_chapter(
        &mut self,
        unit_id: UnitId,
        text: impl Into<String>,
    ) -> Result<&Chapter, StateError> {
        let unit = self
            .units
            .get_mut(&unit_id)
            .ok_or(StateError::UnknownUnit(unit_id))?;
        let ordinal = unit.record_chapter()?;

        let chapter = Chapter::new(unit_id, ordinal, text);
        let id = chapter.id;
        self.unit_chapters.entry(unit_id).or_default().push(id);
        self.chapters.insert(id, chapter);
        self.touch();

        self.chapters.get(&id).ok_or(StateError::UnknownChapter(id))
    }

    pub fn chapter(&self, id: ChapterId) -> Option<&Chapter> {
        self.chapters.get(&id)
    }

    /// Accepted chapters of a unit in ordinal order.
    pub fn chapters_of(&self, unit_id: UnitId) -> Vec<&Chapter> {
        self.unit_chapters
            .get(&unit_id)
            .map(|ids| ids.iter().filter_map(|id| self.chapters.get(id)).collect())
            .unwrap_or_default()
    }

    /// Chapter of a unit at a 1-based ordinal.
    pub fn chapter_at(&self, unit_id: UnitId, ordinal: u32) -> Option<&Chapter> {
        self.chapters_of(unit_id)
            .into_iter()
            .find(|c| c.ordinal == ordinal)
    }

    /// The last `n` chapters of a unit, oldest first.
    pub fn last_chapters(&self, unit_id: UnitId, n: usize) -> Vec<&Chapter> {
        let chapters = self.chapters_of(unit_id);
        let skip = chapters.len().saturating_sub(n);
        chapters.into_iter().skip(skip).collect()
    }

    /// Story position of a chapter as (unit ordinal, chapter ordinal).
    pub fn chapter_position(&self, id: ChapterId) -> Option<(u32, u32)> {
        let chapter = self.chapters.get(&id)?;
        let unit = self.units.get(&chapter.unit_id)?;
        Some((unit.ordinal, chapter.ordinal))
    }

    /// Close a unit; closed units accept no further chapters.
    pub fn close_unit(&mut self, unit_id: UnitId, reason: impl Into<String>) -> Result<(), StateError> {
        self.units
            .get_mut(&unit_id)
            .ok_or(StateError::UnknownUnit(unit_id))?
            .close(reason)?;
        self.touch();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Summaries
    // ------------------------------------------------------------------

    /// Store the precomputed tiers of a closed unit. Append-only by unit id.
    pub fn put_unit_summary(&mut self, summary: UnitSummary) -> Result<(), StateError> {
        let unit = self.unit(summary.unit_id)?;
        if !unit.is_closed() {
            return Err(StateError::UnitNotClosed(unit.ordinal));
        }
        if self.unit_summaries.contains_key(&summary.unit_id) {
            return Err(StateError::DuplicateSummary(summary.unit_id));
        }
        self.unit_summaries.insert(summary.unit_id, summary);
        self.touch();
        Ok(())
    }

    pub fn unit_summary(&self, unit_id: UnitId) -> Option<&UnitSummary> {
        self.unit_summaries.get(&unit_id)
    }

    pub fn put_chapter_summary(&mut self, summary: ChapterSummary) -> Result<(), StateError> {
        if !self.chapters.contains_key(&summary.chapter_id) {
            return Err(StateError::UnknownChapter(summary.chapter_id));
        }
        self.chapter_summaries.insert(summary.chapter_id, summary);
        self.touch();
        Ok(())
    }

    pub fn chapter_summary(&self, chapter_id: ChapterId) -> Option<&ChapterSummary> {
        self.chapter_summaries.get(&chapter_id)
    }

    // ------------------------------------------------------------------
    // Characters
    // ------------------------------------------------------------------

    /// Register a character before its first use.
    pub fn register_character(&mut self, profile: CharacterProfile) -> Result<(), StateError> {
        let key = profile.name.to_lowercase();
        if self.characters.contains_key(&key) {
            return Err(StateError::DuplicateCharacter(profile.name));
        }
        self.characters.insert(key, profile);
        self.touch();
        Ok(())
    }

    /// Register a batch of characters. Either every profile is registered or,
    /// on a name clash with the store or within the batch, none is.
    pub fn register_characters(&mut self, profiles: Vec<CharacterProfile>) -> Result<(), StateError> {
        let mut batch = HashSet::new();
        for profile in &profiles {
            let key = profile.name.to_lowercase();
            if self.characters.contains_key(&key) || !batch.insert(key) {
                return Err(StateError::DuplicateCharacter(profile.name.clone()));
            }
        }
        for profile in profiles {
            self.characters.insert(profile.name.to_lowercase(), profile);
        }
        self.touch();
        Ok(())
    }

    /// Look up a character by canonical name or alias (case-insensitive).
    pub fn character(&self, name: &str) -> Option<&CharacterProfile> {
        let key = name.to_lowercase();
        self.characters.get(&key).or_else(|| {
            self.characters
                .values()
                .find(|c| c.aliases.iter().any(|a| a.to_lowercase() == key))
        })
    }

    /// All registered characters, ordered by canonical name.
    pub fn characters(&self) -> impl Iterator<Item = &CharacterProfile> {
        self.characters.values()
    }

    /// Change a character's life status. Dead characters only come back with a
    /// flashback exception.
    pub fn update_life_status(
        &mut self,
        name: &str,
        status: LifeStatus,
        chapter: Option<ChapterId>,
        flashback_exception: bool,
    ) -> Result<(), StateError> {
        let key = self
            .character(name)
            .map(|c| c.name.to_lowercase())
            .ok_or_else(|| StateError::UnknownCharacter(name.to_string()))?;
        if let Some(profile) = self.characters.get_mut(&key) {
            profile.transition(status, chapter, flashback_exception)?;
        }
        self.touch();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Chronicle
    // ------------------------------------------------------------------

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn record_timeline_event(&mut self, event: TimelineEvent) -> Result<(), StateError> {
        self.timeline.append(event)?;
        self.touch();
        Ok(())
    }

    pub fn settings(&self) -> &SettingRegistry {
        &self.settings
    }

    pub fn declare_setting(&mut self, key: impl Into<String>) {
        self.settings.declare(key);
        self.touch();
    }

    /// Establish a setting fact; returns `false` when the key was already established.
    pub fn establish_setting(&mut self, fact: SettingFact) -> bool {
        let added = self.settings.establish(fact);
        if added {
            self.touch();
        }
        added
    }

    pub fn add_thread(&mut self, thread: PlotThread) -> ThreadId {
        let id = thread.id;
        self.threads.push(thread);
        self.touch();
        id
    }

    pub fn threads(&self) -> &[PlotThread] {
        &self.threads
    }

    /// Mark a thread resolved in the given chapter.
    pub fn resolve_thread(&mut self, name: &str, chapter: ChapterId) -> Result<(), StateError> {
        let thread = self
            .threads
            .iter_mut()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| StateError::UnknownThread(name.to_string()))?;
        thread.status = ThreadStatus::Resolved { chapter };
        self.touch();
        Ok(())
    }
}
