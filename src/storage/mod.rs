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

//! Storage layer for Recoshard
//!
//! This module provides:
//! - Configuration types
//! - The [`PreferenceSource`] trait consumed by the worker
//! - The binary preference file and its header
//! - The per-pass change batch

pub mod change_batch;
pub mod config;
pub mod file;
pub mod header;
pub mod traits;

pub use change_batch::{ChangeBatch, CommitStats};
pub use config::{
    StoreConfig, SyncMode, DEFAULT_MAX_RECOMMEND_TASKS, DEFAULT_MIN_CAPACITY,
    DEFAULT_MOVE_BUFFER_SIZE, DEFAULT_READ_AHEAD, DEFAULT_SIMILARITY_ROWS,
};
pub use file::{grow_capacity, PreferenceFile};
pub use header::{FileHeader, FILE_FORMAT_VERSION, FILE_MAGIC, HEADER_SIZE};
pub use traits::PreferenceSource;
