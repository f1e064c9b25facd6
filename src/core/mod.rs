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

//! Core types and definitions for Recoshard
//!
//! - [`OwnerId`], [`EntityId`] - 64-bit identifiers
//! - [`Preference`] - a single like/unlike request
//! - [`PreferenceSet`] - the entities liked by one owner
//! - [`Recommendation`] - a recommended entity and its weight
//! - [`Error`] - Error types for all operations

pub mod error;
pub mod preference_set;
pub mod types;

pub use error::{Error, Result};
pub use preference_set::{PreferenceSet, ENTITY_SLOT_SIZE, RECORD_PREFIX_SIZE};
pub use types::{EntityId, OwnerId, Preference, Recommendation};
