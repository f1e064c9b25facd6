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

//! # Recoshard - a file-backed recommendation shard
//!
//! Recoshard stores which entities each owner likes in a single binary file
//! and answers requests against it from one worker thread. Requests are
//! batched: every pass of the worker scans the whole file once and serves
//! all admitted requests together.
//!
//! ## Key Features
//!
//! - **Scan-shared requests** - reads, likes, unlikes and recommendations share one sequential scan
//! - **In-place rewrites** - records carry spare capacity so most likes never move data
//! - **Compacting deletes** - relocated records leave no holes behind
//! - **Similarity ranking** - Jaccard top-K neighbours weight the recommended entities
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use recoshard::{Recommender, StoreConfig};
//!
//! let shard = Recommender::open(&StoreConfig::new("preferences.dat")).unwrap();
//!
//! assert!(shard.add_preference(7, 100).wait().unwrap());
//! assert_eq!(shard.get_preferences(7).wait().unwrap(), Some(vec![100]));
//!
//! if let Some(list) = shard.recommend(7).wait().unwrap() {
//!     for r in list {
//!         println!("{} ({:.1})", r.entity_id, r.weight);
//!     }
//! }
//!
//! shard.shutdown().unwrap();
//! ```
//!
//! ## Modules
//!
//! - [`core`] - Core types ([`PreferenceSet`], [`Preference`], [`Recommendation`], [`Error`])
//! - [`storage`] - The preference file, its header and the per-pass change batch
//! - [`recommend`] - Similarity table and recommendation weighting
//! - [`worker`] - The request scheduler ([`Recommender`])
//! - [`common`] - Version information

pub mod common;
pub mod core;
pub mod recommend;
pub mod storage;
pub mod worker;

// Re-export main types for convenience
pub use core::{EntityId, Error, OwnerId, Preference, PreferenceSet, Recommendation, Result};

// Re-export storage types
pub use storage::{
    ChangeBatch, CommitStats, FileHeader, PreferenceFile, PreferenceSource, StoreConfig, SyncMode,
};

// Re-export ranking types
pub use recommend::{similarity, SimilarityTable};

// Re-export scheduler types
pub use worker::{Pending, Recommender, ShardStats, TaskKind};

// Re-export version info
pub use common::{version, version_info};
