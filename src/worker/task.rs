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

//! Request state machines driven by the worker's scan passes
//!
//! While a task is active the worker calls
//! [`Task::process_preference_set`] once for every stored set, in file
//! order. At the end of the pass it calls [`Task::proceed_pass`]: `true`
//! keeps the task for another full pass, `false` retires it. A task
//! delivers its result exactly once, when it retires.

use crate::core::{EntityId, OwnerId, Preference, PreferenceSet, Recommendation};
use crate::recommend::SimilarityTable;
use crate::storage::ChangeBatch;

use super::pending::{pending, Completion, Pending};

/// Request kinds, used for admission control and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    GetPreferences,
    Prefer,
    Unprefer,
    Recommend,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskKind::GetPreferences => "get-preferences",
            TaskKind::Prefer => "prefer",
            TaskKind::Unprefer => "unprefer",
            TaskKind::Recommend => "recommend",
        };
        f.write_str(name)
    }
}

/// A request owned by the worker
#[derive(Debug)]
pub(crate) enum Task {
    GetPreferences(GetPreferencesTask),
    Prefer(PreferTask),
    Unprefer(UnpreferTask),
    Recommend(RecommendTask),
}

impl Task {
    pub fn get_preferences(owner_id: OwnerId) -> (Task, Pending<Option<Vec<EntityId>>>) {
        let (completion, pending) = pending();
        let task = GetPreferencesTask {
            owner_id,
            found: None,
            completion,
        };
        (Task::GetPreferences(task), pending)
    }

    pub fn prefer(preference: Preference) -> (Task, Pending<bool>) {
        let (completion, pending) = pending();
        let task = PreferTask {
            preference,
            seen: false,
            added: false,
            completion,
        };
        (Task::Prefer(task), pending)
    }

    pub fn unprefer(preference: Preference) -> (Task, Pending<bool>) {
        let (completion, pending) = pending();
        let task = UnpreferTask {
            preference,
            seen: false,
            affected: false,
            completion,
        };
        (Task::Unprefer(task), pending)
    }

    pub fn recommend(
        owner_id: OwnerId,
        max_rows: usize,
    ) -> (Task, Pending<Option<Vec<Recommendation>>>) {
        let (completion, pending) = pending();
        let task = RecommendTask {
            owner_id,
            max_rows,
            phase: RecommendPhase::Locating(None),
            completion,
        };
        (Task::Recommend(task), pending)
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            Task::GetPreferences(_) => TaskKind::GetPreferences,
            Task::Prefer(_) => TaskKind::Prefer,
            Task::Unprefer(_) => TaskKind::Unprefer,
            Task::Recommend(_) => TaskKind::Recommend,
        }
    }

    pub fn is_recommend(&self) -> bool {
        matches!(self, Task::Recommend(_))
    }

    /// Called once per stored set during a pass
    pub fn process_preference_set(&mut self, set: &PreferenceSet, batch: &mut ChangeBatch) {
        match self {
            Task::GetPreferences(task) => task.process_preference_set(set),
            Task::Prefer(task) => task.process_preference_set(set, batch),
            Task::Unprefer(task) => task.process_preference_set(set, batch),
            Task::Recommend(task) => task.process_preference_set(set),
        }
    }

    /// Called once at the end of a pass; `true` keeps the task active
    pub fn proceed_pass(&mut self, batch: &mut ChangeBatch) -> bool {
        match self {
            Task::GetPreferences(task) => task.proceed_pass(),
            Task::Prefer(task) => task.proceed_pass(batch),
            Task::Unprefer(task) => task.proceed_pass(batch),
            Task::Recommend(task) => task.proceed_pass(),
        }
    }
}

/// Reads one owner's entities
#[derive(Debug)]
pub(crate) struct GetPreferencesTask {
    owner_id: OwnerId,
    found: Option<PreferenceSet>,
    completion: Completion<Option<Vec<EntityId>>>,
}

impl GetPreferencesTask {
    fn process_preference_set(&mut self, set: &PreferenceSet) {
        if set.owner_id() == self.owner_id {
            self.found = Some(set.clone());
        }
    }

    fn proceed_pass(&mut self) -> bool {
        let result = self.found.take().map(PreferenceSet::into_entity_ids);
        self.completion.complete(result);
        false
    }
}

/// Adds one like; the result tells whether it was new
#[derive(Debug)]
pub(crate) struct PreferTask {
    preference: Preference,
    seen: bool,
    added: bool,
    completion: Completion<bool>,
}

impl PreferTask {
    fn process_preference_set(&mut self, set: &PreferenceSet, batch: &mut ChangeBatch) {
        if set.owner_id() == self.preference.owner_id {
            self.seen = true;
            self.added = batch.add(set, self.preference.entity_id);
        }
    }

    fn proceed_pass(&mut self, batch: &mut ChangeBatch) -> bool {
        if !self.seen {
            self.added = batch.add_new(self.preference);
        }
        self.completion.complete(self.added);
        false
    }
}

/// Removes one like; the result tells whether anything was removed
#[derive(Debug)]
pub(crate) struct UnpreferTask {
    preference: Preference,
    seen: bool,
    affected: bool,
    completion: Completion<bool>,
}

impl UnpreferTask {
    fn process_preference_set(&mut self, set: &PreferenceSet, batch: &mut ChangeBatch) {
        if set.owner_id() == self.preference.owner_id {
            self.seen = true;
            self.affected = batch.remove(set, self.preference.entity_id);
        }
    }

    fn proceed_pass(&mut self, batch: &mut ChangeBatch) -> bool {
        if !self.seen {
            // Only a set created earlier in this same pass can hold it
            self.affected = batch.remove_staged(self.preference);
        }
        self.completion.complete(self.affected);
        false
    }
}

#[derive(Debug)]
enum RecommendPhase {
    /// First pass: looking for the subject's own set
    Locating(Option<PreferenceSet>),
    /// Second pass: ranking every other set against the subject
    Ranking(SimilarityTable),
}

/// Builds a recommendation list in two passes
#[derive(Debug)]
pub(crate) struct RecommendTask {
    owner_id: OwnerId,
    max_rows: usize,
    phase: RecommendPhase,
    completion: Completion<Option<Vec<Recommendation>>>,
}

impl RecommendTask {
    fn process_preference_set(&mut self, set: &PreferenceSet) {
        match &mut self.phase {
            RecommendPhase::Locating(subject) => {
                if set.owner_id() == self.owner_id {
                    *subject = Some(set.clone());
                }
            }
            RecommendPhase::Ranking(table) => {
                if set.owner_id() != self.owner_id {
                    table.process(set);
                }
            }
        }
    }

    fn proceed_pass(&mut self) -> bool {
        let subject = match &mut self.phase {
            RecommendPhase::Locating(subject) => subject.take(),
            RecommendPhase::Ranking(table) => {
                self.completion.complete(Some(table.recommendation_list()));
                return false;
            }
        };

        match subject {
            Some(subject) => {
                self.phase = RecommendPhase::Ranking(SimilarityTable::new(subject, self.max_rows));
                true
            }
            None => {
                self.completion.complete(None);
                false
            }
        }
    }
}
