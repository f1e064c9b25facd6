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

//! Identifier and request value types

use std::fmt;

/// Identifier of whoever owns a preference set (a user, a collection, ...)
pub type OwnerId = u64;

/// Identifier of a liked item
pub type EntityId = u64;

/// A single like or unlike request
///
/// Never persisted directly: it is folded into the owner's
/// [`PreferenceSet`](crate::core::PreferenceSet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Preference {
    pub owner_id: OwnerId,
    pub entity_id: EntityId,
}

impl Preference {
    pub fn new(owner_id: OwnerId, entity_id: EntityId) -> Self {
        Self {
            owner_id,
            entity_id,
        }
    }
}

impl fmt::Display for Preference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.owner_id, self.entity_id)
    }
}

/// A recommended entity with its aggregated similarity weight
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Recommendation {
    pub entity_id: EntityId,
    pub weight: f32,
}

impl Recommendation {
    pub fn new(entity_id: EntityId, weight: f32) -> Self {
        Self { entity_id, weight }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preference_display() {
        assert_eq!(Preference::new(7, 100).to_string(), "7 -> 100");
    }

    #[test]
    fn test_recommendation_new() {
        let rec = Recommendation::new(42, 66.5);
        assert_eq!(rec.entity_id, 42);
        assert_eq!(rec.weight, 66.5);
    }
}
