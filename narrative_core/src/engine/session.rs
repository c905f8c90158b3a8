//! Per-session derived state owned by one engine.

use std::sync::Arc;

use story_bible::NarrativeStateStore;
use tracing::debug;

use crate::consistency::NameIndex;

/// Lookup structures derived from the store, rebuilt whenever the store's
/// revision moves. Owned by a single engine and never shared across sessions.
#[derive(Debug, Default)]
pub struct SessionCache {
    names: Option<Arc<NameIndex>>,
    rebuilds: u64,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name index for the given store state.
    pub fn names(&mut self, state: &NarrativeStateStore) -> Arc<NameIndex> {
        if let Some(index) = &self.names {
            if index.revision() == state.revision() {
                return Arc::clone(index);
            }
        }

        let index = Arc::new(NameIndex::build(state));
        debug!(
            revision = state.revision(),
            names = index.len(),
            "name index rebuilt"
        );
        self.names = Some(Arc::clone(&index));
        self.rebuilds += 1;
        index
    }

    /// How many times the index was built.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    pub fn clear(&mut self) {
        self.names = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use story_bible::CharacterProfile;

    #[test]
    fn test_rebuilds_only_on_revision_change() {
        let mut store = NarrativeStateStore::new();
        store.register_character(CharacterProfile::new("Mira")).unwrap();
        let mut cache = SessionCache::new();

        let first = cache.names(&store);
        let second = cache.names(&store);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.rebuilds(), 1);

        store.register_character(CharacterProfile::new("Voss")).unwrap();
        let third = cache.names(&store);
        assert_eq!(cache.rebuilds(), 2);
        assert!(third.canonical("voss").is_some());

        cache.clear();
        cache.names(&store);
        assert_eq!(cache.rebuilds(), 3);
    }
}
