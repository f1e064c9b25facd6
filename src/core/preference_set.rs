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

//! PreferenceSet - every entity liked by one owner

use std::collections::BTreeSet;

use super::types::{EntityId, OwnerId, Preference};

/// Size of the fixed record prefix: owner id (8) + capacity (4) + count (4)
pub const RECORD_PREFIX_SIZE: u64 = 16;

/// Size of one entity slot in a record
pub const ENTITY_SLOT_SIZE: u64 = 8;

/// The liked entities of one owner, as stored in (or destined for) a record
///
/// `offset` is the byte position of the record in the file it was read from.
/// It stays valid only until the next structural change of that file (a
/// delete or an append); an in-place rewrite keeps it valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferenceSet {
    owner_id: OwnerId,
    capacity: u32,
    entity_ids: BTreeSet<EntityId>,
    offset: u64,
}

impl PreferenceSet {
    /// Create a preference set as it was found on disk
    pub fn new(
        owner_id: OwnerId,
        capacity: u32,
        entity_ids: BTreeSet<EntityId>,
        offset: u64,
    ) -> Self {
        Self {
            owner_id,
            capacity,
            entity_ids,
            offset,
        }
    }

    /// Create an empty, not yet stored set
    pub fn empty(owner_id: OwnerId) -> Self {
        Self::new(owner_id, 0, BTreeSet::new(), 0)
    }

    /// Create a new, not yet stored set holding just the preferred entity
    ///
    /// Capacity and offset are zero; the store assigns both on append.
    pub fn from_preference(preference: Preference) -> Self {
        let mut set = Self::empty(preference.owner_id);
        set.entity_ids.insert(preference.entity_id);
        set
    }

    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    /// Number of entity slots reserved for this set in its record
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn set_capacity(&mut self, capacity: u32) {
        self.capacity = capacity;
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
    }

    /// Entity ids in ascending order
    pub fn entity_ids(&self) -> &BTreeSet<EntityId> {
        &self.entity_ids
    }

    pub fn contains(&self, entity_id: EntityId) -> bool {
        self.entity_ids.contains(&entity_id)
    }

    /// Add an entity; returns false if it was already there
    pub fn insert(&mut self, entity_id: EntityId) -> bool {
        self.entity_ids.insert(entity_id)
    }

    /// Remove an entity; returns false if it was not there
    pub fn remove(&mut self, entity_id: EntityId) -> bool {
        self.entity_ids.remove(&entity_id)
    }

    pub fn len(&self) -> usize {
        self.entity_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_ids.is_empty()
    }

    /// Whether the entities fit in the reserved slots
    pub fn fits_capacity(&self) -> bool {
        self.entity_ids.len() <= self.capacity as usize
    }

    /// Bytes the record occupies on disk, reserved slots included
    pub fn disk_size(&self) -> u64 {
        RECORD_PREFIX_SIZE + ENTITY_SLOT_SIZE * self.capacity as u64
    }

    /// Whether both sets hold exactly the same entities
    pub fn same_entities(&self, other: &PreferenceSet) -> bool {
        self.entity_ids == other.entity_ids
    }

    /// Jaccard similarity with another set, scaled to 0..=100
    ///
    /// `100 * |A ∩ B| / |A ∪ B|`, and 0 when both sets are empty.
    pub fn similarity_with(&self, other: &PreferenceSet) -> f32 {
        let common = self.entity_ids.intersection(&other.entity_ids).count();
        let union = self.entity_ids.len() + other.entity_ids.len() - common;
        if union == 0 {
            0.0
        } else {
            100.0 * common as f32 / union as f32
        }
    }

    /// Consume the set, yielding its entity ids in ascending order
    pub fn into_entity_ids(self) -> Vec<EntityId> {
        self.entity_ids.into_iter().collect()
    }
}
