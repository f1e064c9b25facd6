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

//! Recommender - the public entry point of a shard
//!
//! A single worker thread owns the preference store. Callers submit requests
//! from any thread and get a [`Pending`] back. The worker batches every
//! admissible request into one sequential scan of the store (a pass), hands
//! each record to every active task, then commits the pass's changes.
//!
//! At most `max_recommend_tasks` recommend requests are active in a pass;
//! further ones wait in FIFO order. Other requests are always admitted.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::core::{EntityId, Error, OwnerId, Preference, Recommendation, Result};
use crate::storage::{ChangeBatch, PreferenceFile, PreferenceSource, StoreConfig};

use super::pending::Pending;
use super::task::Task;

/// Name of the worker thread
pub const WORKER_THREAD_NAME: &str = "recoshard-worker";

/// Snapshot of a shard's counters, refreshed after every pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShardStats {
    pub preference_set_count: u64,
    pub preference_count: u64,
    /// Milliseconds since the Unix epoch
    pub change_time_millis: i64,
    /// Completed scan passes since start
    pub passes: u64,
}

/// Last published stats; readers always see the counters of one pass
#[derive(Default)]
struct StatsCell {
    current: Mutex<ShardStats>,
}

impl StatsCell {
    fn publish(&self, source: &dyn PreferenceSource, passes: u64) {
        let stats = ShardStats {
            preference_set_count: source.preference_set_count(),
            preference_count: source.preference_count(),
            change_time_millis: source.change_time_millis(),
            passes,
        };
        *self.current.lock() = stats;
    }

    fn snapshot(&self) -> ShardStats {
        *self.current.lock()
    }
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Task>,
    shutting_down: bool,
    stopped: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<QueueState>,
    wakeup: Condvar,
    stats: StatsCell,
    /// Most recommend tasks ever active at once
    #[cfg(test)]
    peak_recommending: std::sync::atomic::AtomicUsize,
}

/// Handle to a running shard
///
/// Dropping the handle shuts the shard down and closes its store.
pub struct Recommender {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<Result<()>>>,
    similarity_rows: usize,
}

impl Recommender {
    /// Opens the store named by `config` and starts its worker
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let store = PreferenceFile::open_with_config(config)?;
        Self::start(Box::new(store), config)
    }

    /// Starts a worker over an already opened store
    ///
    /// Only the scheduling settings of `config` are used here.
    pub fn start(source: Box<dyn PreferenceSource>, config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(Shared::default());
        shared.stats.publish(&*source, 0);

        let worker = Worker {
            shared: Arc::clone(&shared),
            source,
            batch: ChangeBatch::new(),
            active: Vec::new(),
            max_recommend_tasks: config.max_recommend_tasks,
            passes: 0,
        };
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker.run())?;

        Ok(Self {
            shared,
            worker: Some(handle),
            similarity_rows: config.similarity_rows,
        })
    }

    /// Entities liked by `owner_id`, ascending; `None` if the owner is unknown
    pub fn get_preferences(&self, owner_id: OwnerId) -> Pending<Option<Vec<EntityId>>> {
        let (task, pending) = Task::get_preferences(owner_id);
        self.submit(task);
        pending
    }

    /// Records that `owner_id` likes `entity_id`; resolves to `false` if it
    /// already did
    pub fn add_preference(&self, owner_id: OwnerId, entity_id: EntityId) -> Pending<bool> {
        let (task, pending) = Task::prefer(Preference::new(owner_id, entity_id));
        self.submit(task);
        pending
    }

    /// Forgets that `owner_id` likes `entity_id`; resolves to `false` if it
    /// did not
    pub fn remove_preference(&self, owner_id: OwnerId, entity_id: EntityId) -> Pending<bool> {
        let (task, pending) = Task::unprefer(Preference::new(owner_id, entity_id));
        self.submit(task);
        pending
    }

    /// Entities liked by the owners most similar to `owner_id`, heaviest
    /// first; `None` if the owner is unknown
    pub fn recommend(&self, owner_id: OwnerId) -> Pending<Option<Vec<Recommendation>>> {
        let (task, pending) = Task::recommend(owner_id, self.similarity_rows);
        self.submit(task);
        pending
    }

    /// Counters as of the last completed pass
    pub fn stats(&self) -> ShardStats {
        self.shared.stats.snapshot()
    }

    /// Returns `true` while the worker accepts requests
    pub fn is_running(&self) -> bool {
        let state = self.shared.state.lock();
        !state.stopped && !state.shutting_down
    }

    /// Stops the worker and closes the store
    ///
    /// Requests still queued or in progress resolve to
    /// [`Error::WorkerStopped`]. Returns the error that stopped the worker,
    /// if any, or the result of closing the store.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn submit(&self, task: Task) {
        let mut state = self.shared.state.lock();
        if state.stopped || state.shutting_down {
            // Dropping the task resolves its Pending with WorkerStopped
            log::debug!("Rejected {} request: worker is not running", task.kind());
            return;
        }
        state.pending.push_back(task);
        drop(state);
        self.shared.wakeup.notify_one();
    }

    fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.worker.take() else {
            return Ok(());
        };

        self.shared.state.lock().shutting_down = true;
        self.shared.wakeup.notify_all();

        match handle.join() {
            Ok(result) => result,
            Err(_) => Err(Error::internal("recommendation worker panicked")),
        }
    }
}

impl Drop for Recommender {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("Recommender shutdown failed: {}", e);
        }
    }
}

impl std::fmt::Debug for Recommender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recommender")
            .field("running", &self.is_running())
            .field("stats", &self.stats())
            .finish()
    }
}

/// State owned by the worker thread
struct Worker {
    shared: Arc<Shared>,
    source: Box<dyn PreferenceSource>,
    batch: ChangeBatch,
    active: Vec<Task>,
    max_recommend_tasks: usize,
    passes: u64,
}

impl Worker {
    fn run(mut self) -> Result<()> {
        log::info!(
            "Recommendation worker started with {} preference sets",
            self.source.preference_set_count()
        );

        let outcome = self.run_passes();
        let closed = self.source.close();

        // Unfinished requests resolve with WorkerStopped once dropped
        let abandoned = {
            let mut state = self.shared.state.lock();
            state.stopped = true;
            std::mem::take(&mut state.pending)
        };
        let dropped = abandoned.len() + self.active.len();
        drop(abandoned);
        self.active.clear();
        if dropped > 0 {
            log::warn!("Recommendation worker dropped {} unfinished requests", dropped);
        }

        match outcome {
            Ok(()) => {
                log::info!("Recommendation worker stopped after {} passes", self.passes);
                closed
            }
            Err(e) => {
                log::error!("Recommendation worker stopped on error: {}", e);
                if let Err(close_error) = closed {
                    log::error!("Cannot close preference store: {}", close_error);
                }
                Err(e)
            }
        }
    }

    fn run_passes(&mut self) -> Result<()> {
        self.source.rewind()?;
        while self.take_admissible() {
            self.run_pass()?;
        }
        Ok(())
    }

    /// Moves admissible requests into the active set, waiting for work if
    /// there is none; returns `false` once shutdown was requested
    fn take_admissible(&mut self) -> bool {
        let mut state = self.shared.state.lock();
        while !state.shutting_down && state.pending.is_empty() && self.active.is_empty() {
            self.shared.wakeup.wait(&mut state);
        }
        if state.shutting_down {
            return false;
        }

        let mut recommending = self.active.iter().filter(|t| t.is_recommend()).count();
        let mut deferred = VecDeque::new();
        while let Some(task) = state.pending.pop_front() {
            if task.is_recommend() {
                if recommending >= self.max_recommend_tasks {
                    deferred.push_back(task);
                    continue;
                }
                recommending += 1;
            }
            self.active.push(task);
        }
        state.pending = deferred;
        #[cfg(test)]
        self.shared
            .peak_recommending
            .fetch_max(recommending, std::sync::atomic::Ordering::Relaxed);
        true
    }

    fn run_pass(&mut self) -> Result<()> {
        let started = Instant::now();
        let serving = self.active.len();

        let mut scanned = 0u64;
        while self.source.has_next()? {
            let Some(set) = self.source.next()? else {
                break;
            };
            for task in self.active.iter_mut() {
                task.process_preference_set(&set, &mut self.batch);
            }
            scanned += 1;
        }

        let batch = &mut self.batch;
        self.active.retain_mut(|task| task.proceed_pass(batch));

        let commit = self.batch.commit(&mut *self.source)?;
        if commit.changed() {
            self.source.flush()?;
        }
        self.source.rewind()?;

        self.passes += 1;
        self.shared.stats.publish(&*self.source, self.passes);

        log::debug!(
            "Pass {} scanned {} sets for {} tasks in {:?}: {} still active, {} quick, {} slow",
            self.passes,
            scanned,
            serving,
            started.elapsed(),
            self.active.len(),
            commit.quick,
            commit.slow
        );
        Ok(())
    }
}
