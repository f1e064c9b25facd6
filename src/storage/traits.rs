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

//! PreferenceSource trait - the storage surface driven by the worker
//!

use crate::core::{PreferenceSet, Result};

use super::header::FileHeader;

/// A sequentially scanned store of preference sets
///
/// The worker is the only caller: it rewinds, streams every record to the
/// active tasks, and then applies the pass's changes through
/// [`ChangeBatch`](super::ChangeBatch). Mutations happen only between scans.
///
/// # Example
///
/// ```ignore
/// source.rewind()?;
/// while let Some(set) = source.next()? {
///     // Process set...
/// }
/// source.close()?;
/// ```
pub trait PreferenceSource: Send {
    /// Moves the scan cursor back to the first record
    fn rewind(&mut self) -> Result<()>;

    /// Returns `true` if the current scan has another record
    fn has_next(&mut self) -> Result<bool>;

    /// Returns the next record in file order, or `None` at the end of the scan
    fn next(&mut self) -> Result<Option<PreferenceSet>>;

    /// Rewrites `original`'s record in place with the contents of `modified`
    ///
    /// Returns `false` without touching the store when `modified` holds more
    /// entities than `original`'s capacity. The scan position and every
    /// other record's offset are preserved.
    fn try_quick_rewrite(
        &mut self,
        original: &PreferenceSet,
        modified: &PreferenceSet,
    ) -> Result<bool>;

    /// Removes the given records, compacting the store
    ///
    /// The records must carry offsets read since the last structural change.
    /// All outstanding offsets are invalid afterwards.
    fn delete(&mut self, originals: &[PreferenceSet]) -> Result<()>;

    /// Appends the given records, growing their capacity where needed
    ///
    /// Each record's capacity and offset are updated to what was written.
    fn add(&mut self, records: &mut [PreferenceSet]) -> Result<()>;

    /// Persists the header
    fn flush(&mut self) -> Result<()>;

    /// Flushes and releases the underlying resources
    ///
    /// Every later call fails with [`Error::StoreClosed`](crate::Error::StoreClosed).
    fn close(&mut self) -> Result<()>;

    /// Current header values
    fn header(&self) -> FileHeader;

    /// Time of the last change, in milliseconds since the Unix epoch
    fn change_time_millis(&self) -> i64 {
        self.header().change_time_millis
    }

    /// Number of stored preference sets
    fn preference_set_count(&self) -> u64 {
        self.header().preference_set_count
    }

    /// Number of stored preferences across all sets
    fn preference_count(&self) -> u64 {
        self.header().preference_count
    }
}
