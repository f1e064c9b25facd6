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

//! Store and worker configuration
//!

use std::path::{Path, PathBuf};

use crate::core::{Error, Result};

/// Default cap on recommend tasks served by one pass
pub const DEFAULT_MAX_RECOMMEND_TASKS: usize = 4;

/// Default number of most similar owners kept per recommendation
pub const DEFAULT_SIMILARITY_ROWS: usize = 100;

/// Default number of records read ahead per refill
pub const DEFAULT_READ_AHEAD: usize = 100;

/// Default size of the buffer used to shift data while compacting
pub const DEFAULT_MOVE_BUFFER_SIZE: usize = 10 * 1024;

/// Default capacity growth unit
pub const DEFAULT_MIN_CAPACITY: u32 = 2;

/// Header sync mode for controlling durability vs performance tradeoff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Header is only written on close
    None = 0,
    /// Header is written on every flush
    #[default]
    Normal = 1,
    /// Header is written and the file is fsynced on every flush
    Full = 2,
}

impl From<i32> for SyncMode {
    fn from(value: i32) -> Self {
        match value {
            0 => SyncMode::None,
            2 => SyncMode::Full,
            _ => SyncMode::Normal,
        }
    }
}

impl From<SyncMode> for i32 {
    fn from(mode: SyncMode) -> Self {
        mode as i32
    }
}

impl std::str::FromStr for SyncMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(SyncMode::None),
            "normal" => Ok(SyncMode::Normal),
            "full" => Ok(SyncMode::Full),
            other => Err(Error::invalid_argument(format!(
                "unknown sync mode '{}', expected none, normal or full",
                other
            ))),
        }
    }
}

/// Configuration of a preference store and the worker that drives it
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path of the preference data file
    pub path: PathBuf,

    /// Maximum number of recommend tasks active in one pass
    /// Default: 4
    pub max_recommend_tasks: usize,

    /// Number of most similar owners kept when ranking
    /// Default: 100
    pub similarity_rows: usize,

    /// Records fetched per read-ahead refill
    /// Default: 100
    pub read_ahead: usize,

    /// Size in bytes of the buffer used to close holes on delete
    /// Default: 10240 (10KB)
    pub move_buffer_size: usize,

    /// Capacity growth unit; grown capacities are multiples of it
    /// Default: 2
    pub min_capacity: u32,

    /// Header sync strategy
    /// Default: Normal
    pub sync_mode: SyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("preferences.dat"),
            max_recommend_tasks: DEFAULT_MAX_RECOMMEND_TASKS,
            similarity_rows: DEFAULT_SIMILARITY_ROWS,
            read_ahead: DEFAULT_READ_AHEAD,
            move_buffer_size: DEFAULT_MOVE_BUFFER_SIZE,
            min_capacity: DEFAULT_MIN_CAPACITY,
            sync_mode: SyncMode::Normal,
        }
    }
}

impl StoreConfig {
    /// Creates a StoreConfig for the given data file with default values
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Builder method to set the recommend task cap
    pub fn with_max_recommend_tasks(mut self, count: usize) -> Self {
        self.max_recommend_tasks = count;
        self
    }

    /// Builder method to set the number of ranked similar owners
    pub fn with_similarity_rows(mut self, rows: usize) -> Self {
        self.similarity_rows = rows;
        self
    }

    /// Builder method to set the read-ahead batch size
    pub fn with_read_ahead(mut self, records: usize) -> Self {
        self.read_ahead = records;
        self
    }

    /// Builder method to set the compaction buffer size
    pub fn with_move_buffer_size(mut self, bytes: usize) -> Self {
        self.move_buffer_size = bytes;
        self
    }

    /// Builder method to set the capacity growth unit
    pub fn with_min_capacity(mut self, unit: u32) -> Self {
        self.min_capacity = unit;
        self
    }

    /// Builder method to set sync mode
    pub fn with_sync_mode(mut self, mode: SyncMode) -> Self {
        self.sync_mode = mode;
        self
    }

    /// Rejects values the store cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(Error::invalid_argument("data file path is empty"));
        }
        if self.max_recommend_tasks == 0 {
            return Err(Error::invalid_argument(
                "max_recommend_tasks must be at least 1",
            ));
        }
        if self.similarity_rows == 0 {
            return Err(Error::invalid_argument("similarity_rows must be at least 1"));
        }
        if self.read_ahead == 0 {
            return Err(Error::invalid_argument("read_ahead must be at least 1"));
        }
        if self.move_buffer_size == 0 {
            return Err(Error::invalid_argument("move_buffer_size must be at least 1"));
        }
        if self.min_capacity == 0 {
            return Err(Error::invalid_argument("min_capacity must be at least 1"));
        }
        Ok(())
    }

    /// Returns the data file path, made absolute against the working directory
    pub fn resolve_path(&self) -> Result<PathBuf> {
        resolve_against_cwd(&self.path)
    }
}

fn resolve_against_cwd(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.max_recommend_tasks, DEFAULT_MAX_RECOMMEND_TASKS);
        assert_eq!(config.similarity_rows, DEFAULT_SIMILARITY_ROWS);
        assert_eq!(config.read_ahead, 100);
        assert_eq!(config.move_buffer_size, 10240);
        assert_eq!(config.min_capacity, 2);
        assert_eq!(config.sync_mode, SyncMode::Normal);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = StoreConfig::new("/data/shard.pref")
            .with_max_recommend_tasks(2)
            .with_similarity_rows(10)
            .with_read_ahead(5)
            .with_move_buffer_size(64)
            .with_min_capacity(4)
            .with_sync_mode(SyncMode::Full);
        assert_eq!(config.path, PathBuf::from("/data/shard.pref"));
        assert_eq!(config.max_recommend_tasks, 2);
        assert_eq!(config.similarity_rows, 10);
        assert_eq!(config.read_ahead, 5);
        assert_eq!(config.move_buffer_size, 64);
        assert_eq!(config.min_capacity, 4);
        assert_eq!(config.sync_mode, SyncMode::Full);
    }

    #[test]
    fn test_validate_rejects_zeroes() {
        assert!(StoreConfig::default()
            .with_max_recommend_tasks(0)
            .validate()
            .is_err());
        assert!(StoreConfig::default().with_min_capacity(0).validate().is_err());
        assert!(StoreConfig::new("").validate().is_err());
    }

    #[test]
    fn test_sync_mode_parse() {
        assert_eq!("none".parse::<SyncMode>().unwrap(), SyncMode::None);
        assert_eq!("FULL".parse::<SyncMode>().unwrap(), SyncMode::Full);
        assert!("sometimes".parse::<SyncMode>().is_err());
        assert_eq!(SyncMode::from(2), SyncMode::Full);
        assert_eq!(SyncMode::from(7), SyncMode::Normal);
        assert_eq!(i32::from(SyncMode::None), 0);
    }

    #[test]
    fn test_resolve_path() {
        let absolute = StoreConfig::new("/var/lib/shard.pref");
        assert_eq!(
            absolute.resolve_path().unwrap(),
            PathBuf::from("/var/lib/shard.pref")
        );

        let relative = StoreConfig::new("shard.pref");
        let resolved = relative.resolve_path().unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("shard.pref"));
    }
}
