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

//! Bounded top-K similarity table
//!
//! The table keeps the `max_rows` preference sets most similar to a subject
//! set, ordered by descending similarity. Rows with equal similarity keep
//! their arrival order. Once full, a candidate only gets in by being
//! strictly more similar than the last row.

use std::collections::hash_map::Entry;

use rustc_hash::FxHashMap;

use crate::core::{EntityId, PreferenceSet, Recommendation};

/// Jaccard similarity of two sets, scaled to 0..=100
///
/// Two empty sets have similarity 0.
#[inline]
pub fn similarity(a: &PreferenceSet, b: &PreferenceSet) -> f32 {
    a.similarity_with(b)
}

/// A retained candidate and its similarity to the subject
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityRow {
    pub set: PreferenceSet,
    pub similarity: f32,
}

/// The most similar sets seen so far for one subject
#[derive(Debug, Clone)]
pub struct SimilarityTable {
    subject: PreferenceSet,
    max_rows: usize,
    rows: Vec<SimilarityRow>,
}

impl SimilarityTable {
    pub fn new(subject: PreferenceSet, max_rows: usize) -> Self {
        Self {
            subject,
            max_rows,
            rows: Vec::with_capacity(max_rows.min(1024)),
        }
    }

    pub fn subject(&self) -> &PreferenceSet {
        &self.subject
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows in descending similarity order
    pub fn rows(&self) -> &[SimilarityRow] {
        &self.rows
    }

    /// Offers a candidate to the table; returns whether it was kept
    pub fn process(&mut self, candidate: &PreferenceSet) -> bool {
        let similarity = similarity(&self.subject, candidate);

        if self.rows.len() >= self.max_rows {
            match self.rows.last() {
                Some(last) if similarity > last.similarity => {
                    self.rows.pop();
                }
                _ => return false,
            }
        }

        // First row that is strictly less similar; equal rows stay ahead
        let position = self
            .rows
            .partition_point(|row| row.similarity >= similarity);
        self.rows.insert(
            position,
            SimilarityRow {
                set: candidate.clone(),
                similarity,
            },
        );
        true
    }

    /// Entities of the retained sets weighted by the similarity of every
    /// set that holds them, heaviest first
    ///
    /// Equal weights keep the order in which entities were first met:
    /// rows in table order, ids ascending within a row.
    pub fn recommendation_list(&self) -> Vec<Recommendation> {
        let mut index: FxHashMap<EntityId, usize> = FxHashMap::default();
        let mut list: Vec<Recommendation> = Vec::new();

        for row in &self.rows {
            for &entity_id in row.set.entity_ids() {
                match index.entry(entity_id) {
                    Entry::Occupied(slot) => list[*slot.get()].weight += row.similarity,
                    Entry::Vacant(slot) => {
                        slot.insert(list.len());
                        list.push(Recommendation::new(entity_id, row.similarity));
                    }
                }
            }
        }

        // Stable sort keeps first-met order for ties
        list.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        list
    }
}
