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

//! Request scheduling for a shard
//!
//! - [`Recommender`] - owns the worker thread and accepts requests
//! - [`Pending`] - one-shot result of a request
//! - [`TaskKind`] - the request kinds a worker serves

pub mod pending;
pub mod recommender;
pub(crate) mod task;

pub use pending::Pending;
pub use recommender::{Recommender, ShardStats, WORKER_THREAD_NAME};
pub use task::TaskKind;
