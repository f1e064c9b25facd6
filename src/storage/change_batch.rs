// Copyright 2025 Recoshard Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Change batch - mutations collected during one scan pass
//!
//! Tasks never write to the store directly. They stage likes and unlikes
//! here while the pass runs, and the worker commits the batch once the pass
//! is over. On commit, sets that still fit their reserved slots are rewritten
//! in place. Every other changed set is relocated: all of their old records
//! are removed in one compaction, then the new versions are appended.

use rustc_hash::FxHashMap;

use crate::core::{EntityId, OwnerId, Preference, PreferenceSet, Result};

use super::traits::PreferenceSource;

/// Outcome of a [`ChangeBatch::commit`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitStats {
    /// Sets rewritten in place
    pub quick: usize,
    /// Sets deleted (if stored) and appended
    pub slow: usize,
    /// Touched sets that ended up equal to what is stored
    pub unchanged: usize,
}

impl CommitStats {
    /// Whether the commit wrote anything
    pub fn changed(&self) -> bool {
        self.quick > 0 || self.slow > 0
    }
}

#[derive(Debug)]
struct BatchEntry {
    /// Stored state before the first change; None for an owner created this pass
    original: Option<PreferenceSet>,
    working: PreferenceSet,
}

/// Pending preference changes of the current pass, one working copy per owner
#[derive(Debug, Default)]
pub struct ChangeBatch {
    index: FxHashMap<OwnerId, usize>,
    entries: Vec<BatchEntry>,
}

impl ChangeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of owners touched in this pass
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The staged state of an owner's set, if it was touched in this pass
    pub fn working_copy(&self, owner_id: OwnerId) -> Option<&PreferenceSet> {
        self.index.get(&owner_id).map(|&i| &self.entries[i].working)
    }

    fn entry_for(&mut self, existing: &PreferenceSet) -> &mut BatchEntry {
        let i = match self.index.get(&existing.owner_id()) {
            Some(&i) => i,
            None => {
                self.entries.push(BatchEntry {
                    original: Some(existing.clone()),
                    working: existing.clone(),
                });
                let i = self.entries.len() - 1;
                self.index.insert(existing.owner_id(), i);
                i
            }
        };
        &mut self.entries[i]
    }

    /// Stages adding `entity_id` to a stored set
    ///
    /// Returns whether the staged set changed, i.e. `false` when the entity
    /// is already there (in the store or staged earlier in this pass).
    pub fn add(&mut self, existing: &PreferenceSet, entity_id: EntityId) -> bool {
        let added = self.entry_for(existing).working.insert(entity_id);
        if added {
            log::trace!(
                "Staged liked item {} for existing owner {}",
                entity_id,
                existing.owner_id()
            );
        }
        added
    }

    /// Stages a brand new set for an owner absent from the store
    pub fn add_new(&mut self, preference: Preference) -> bool {
        if let Some(&i) = self.index.get(&preference.owner_id) {
            return self.entries[i].working.insert(preference.entity_id);
        }
        self.entries.push(BatchEntry {
            original: None,
            working: PreferenceSet::from_preference(preference),
        });
        self.index
            .insert(preference.owner_id, self.entries.len() - 1);
        log::trace!(
            "Staged liked item {} for new owner {}",
            preference.entity_id,
            preference.owner_id
        );
        true
    }

    /// Stages removing `entity_id` from a stored set
    ///
    /// Returns whether the staged set changed. An untouched owner that does
    /// not hold the entity is left out of the batch.
    pub fn remove(&mut self, existing: &PreferenceSet, entity_id: EntityId) -> bool {
        if let Some(&i) = self.index.get(&existing.owner_id()) {
            return self.entries[i].working.remove(entity_id);
        }
        if !existing.contains(entity_id) {
            return false;
        }
        log::trace!(
            "Staged removal of liked item {} from owner {}",
            entity_id,
            existing.owner_id()
        );
        self.entry_for(existing).working.remove(entity_id)
    }

    /// Removes an entity from a set staged earlier in this pass
    ///
    /// Used for owners that were not found in the store; returns `false`
    /// when no set is staged for the owner.
    pub fn remove_staged(&mut self, preference: Preference) -> bool {
        match self.index.get(&preference.owner_id) {
            Some(&i) => self.entries[i].working.remove(preference.entity_id),
            None => false,
        }
    }

    /// Applies every staged change to `source` and empties the batch
    ///
    /// The batch is emptied even when the source fails; a failed commit is
    /// not retried.
    pub fn commit(&mut self, source: &mut dyn PreferenceSource) -> Result<CommitStats> {
        self.index.clear();
        let entries = std::mem::take(&mut self.entries);

        let mut stats = CommitStats::default();
        let mut slow_originals = Vec::new();
        let mut slow_sets = Vec::new();

        // In-place rewrites first: they rely on offsets from the last scan
        for entry in entries {
            match entry.original {
                Some(original) if original.same_entities(&entry.working) => {
                    stats.unchanged += 1;
                }
                Some(original) => {
                    if source.try_quick_rewrite(&original, &entry.working)? {
                        stats.quick += 1;
                    } else {
                        slow_originals.push(original);
                        slow_sets.push(entry.working);
                    }
                }
                None => slow_sets.push(entry.working),
            }
        }

        stats.slow = slow_sets.len();
        if !slow_sets.is_empty() {
            source.delete(&slow_originals)?;
            source.add(&mut slow_sets)?;
        }

        if stats.changed() {
            log::debug!(
                "Committed {} quick and {} slow changes",
                stats.quick,
                stats.slow
            );
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Error;
    use crate::storage::{FileHeader, PreferenceFile};
    use tempfile::tempdir;

    fn scan(store: &mut PreferenceFile) -> Vec<PreferenceSet> {
        store.rewind().unwrap();
        let mut out = Vec::new();
        while let Some(set) = store.next().unwrap() {
            out.push(set);
        }
        out
    }

    fn seeded_store(dir: &std::path::Path, sets: &[(u64, &[u64])]) -> PreferenceFile {
        let mut store = PreferenceFile::open(dir.join("p.dat")).unwrap();
        let mut records: Vec<_> = sets
            .iter()
            .map(|(owner, ids)| PreferenceSet::new(*owner, 0, ids.iter().copied().collect(), 0))
            .collect();
        store.add(&mut records).unwrap();
        store
    }

    #[test]
    fn test_quick_path_keeps_offsets() {
        let dir = tempdir().unwrap();
        // {10} gets capacity 2, leaving one free slot
        let mut store = seeded_store(dir.path(), &[(1, &[10]), (2, &[20])]);
        let before = scan(&mut store);

        let mut batch = ChangeBatch::new();
        assert!(batch.add(&before[0], 11));
        let stats = batch.commit(&mut store).unwrap();
        assert_eq!(stats.quick, 1);
        assert_eq!(stats.slow, 0);
        assert!(batch.is_empty());

        let after = scan(&mut store);
        assert_eq!(after[0].offset(), before[0].offset());
        assert_eq!(after[0].clone().into_entity_ids(), vec![10, 11]);
        assert_eq!(after[1], before[1]);
    }

    #[test]
    fn test_slow_path_relocates() {
        let dir = tempdir().unwrap();
        let mut store = seeded_store(dir.path(), &[(1, &[10]), (2, &[20])]);
        let before = scan(&mut store);

        let mut batch = ChangeBatch::new();
        assert!(batch.add(&before[0], 11));
        assert!(batch.add(&before[0], 12));
        let stats = batch.commit(&mut store).unwrap();
        assert_eq!(stats, CommitStats { quick: 0, slow: 1, unchanged: 0 });

        let after = scan(&mut store);
        let owners: Vec<u64> = after.iter().map(|s| s.owner_id()).collect();
        assert_eq!(owners, vec![2, 1]);
        assert_eq!(after[1].clone().into_entity_ids(), vec![10, 11, 12]);
        assert_eq!(after[1].capacity(), 4);
        assert_eq!(store.preference_set_count(), 2);
        assert_eq!(store.preference_count(), 4);
    }

    #[test]
    fn test_new_owner_is_appended() {
        let dir = tempdir().unwrap();
        let mut store = seeded_store(dir.path(), &[(1, &[10])]);

        let mut batch = ChangeBatch::new();
        assert!(batch.add_new(Preference::new(7, 100)));
        assert!(batch.add_new(Preference::new(7, 101)));
        assert!(!batch.add_new(Preference::new(7, 100)));
        let stats = batch.commit(&mut store).unwrap();
        assert_eq!(stats.slow, 1);

        let after = scan(&mut store);
        assert_eq!(after.len(), 2);
        assert_eq!(after[1].owner_id(), 7);
        assert_eq!(after[1].clone().into_entity_ids(), vec![100, 101]);
    }

    #[test]
    fn test_changes_compose_within_pass() {
        let dir = tempdir().unwrap();
        let mut store = seeded_store(dir.path(), &[(1, &[10])]);
        let record = scan(&mut store).remove(0);

        let mut batch = ChangeBatch::new();
        assert!(batch.add(&record, 20));
        assert!(!batch.add(&record, 20));
        assert!(batch.remove(&record, 20));
        assert!(!batch.remove(&record, 20));
        assert!(batch.remove(&record, 10));
        assert!(batch.working_copy(1).unwrap().is_empty());

        batch.commit(&mut store).unwrap();
        let after = scan(&mut store);
        assert!(after[0].is_empty());
        assert_eq!(store.preference_count(), 0);
    }

    #[test]
    fn test_unchanged_entries_write_nothing() {
        let dir = tempdir().unwrap();
        let mut store = seeded_store(dir.path(), &[(1, &[10])]);
        let record = scan(&mut store).remove(0);
        let time = store.change_time_millis();

        let mut batch = ChangeBatch::new();
        batch.add(&record, 20);
        batch.remove(&record, 20);
        // Removing an absent entity from an untouched owner stages nothing
        assert!(!batch.remove(&PreferenceSet::empty(2), 5));
        assert_eq!(batch.len(), 1);

        let stats = batch.commit(&mut store).unwrap();
        assert_eq!(stats.unchanged, 1);
        assert!(!stats.changed());
        assert_eq!(store.change_time_millis(), time);
    }

    #[test]
    fn test_remove_staged() {
        let mut batch = ChangeBatch::new();
        assert!(!batch.remove_staged(Preference::new(3, 1)));
        batch.add_new(Preference::new(3, 1));
        assert!(batch.remove_staged(Preference::new(3, 1)));
        assert!(batch.working_copy(3).unwrap().is_empty());
    }

    struct FailingSource;

    impl PreferenceSource for FailingSource {
        fn rewind(&mut self) -> Result<()> {
            Ok(())
        }
        fn has_next(&mut self) -> Result<bool> {
            Ok(false)
        }
        fn next(&mut self) -> Result<Option<PreferenceSet>> {
            Ok(None)
        }
        fn try_quick_rewrite(&mut self, _: &PreferenceSet, _: &PreferenceSet) -> Result<bool> {
            Ok(false)
        }
        fn delete(&mut self, _: &[PreferenceSet]) -> Result<()> {
            Err(Error::io("disk full"))
        }
        fn add(&mut self, _: &mut [PreferenceSet]) -> Result<()> {
            Ok(())
        }
        fn flush(&mut self) -> Result<()> {
            Ok(())
        }
        fn close(&mut self) -> Result<()> {
            Ok(())
        }
        fn header(&self) -> FileHeader {
            FileHeader::default()
        }
    }

    #[test]
    fn test_batch_cleared_on_failure() {
        let stored = PreferenceSet::new(1, 2, [10].into_iter().collect(), 37);
        let mut batch = ChangeBatch::new();
        batch.add(&stored, 11);
        batch.add(&stored, 12);

        let result = batch.commit(&mut FailingSource);
        assert_eq!(result, Err(Error::io("disk full")));
        assert!(batch.is_empty());
        assert!(batch.working_copy(1).is_none());
    }
}
