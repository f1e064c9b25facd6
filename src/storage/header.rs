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

//! Preference file header
//!
//! Layout (37 bytes, big-endian):
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ Magic             (4 bytes)  "PREF"                             │
//! │ Version           (1 byte)   Format version (currently 1)       │
//! │ Change Time       (8 bytes)  Last change, ms since Unix epoch   │
//! │ Set Count         (8 bytes)  Number of stored preference sets   │
//! │ Preference Count  (8 bytes)  Sum of entity counts of all sets   │
//! │ Data Size         (8 bytes)  Bytes of record data after header  │
//! └─────────────────────────────────────────────────────────────────┘

use crate::core::Result;

/// Magic bytes at the start of every preference file ("PREF" in ASCII)
pub const FILE_MAGIC: [u8; 4] = *b"PREF";

/// Current file format version
pub const FILE_FORMAT_VERSION: u8 = 1;

/// Header size in bytes
pub const HEADER_SIZE: u64 = 4 + 1 + 8 * 4;

/// Why a header could not be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderDefect {
    Truncated,
    BadMagic,
    UnsupportedVersion(u8),
    DataSizeOverflow(u64),
}

impl std::fmt::Display for HeaderDefect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeaderDefect::Truncated => write!(f, "header is truncated"),
            HeaderDefect::BadMagic => write!(f, "magic bytes do not match"),
            HeaderDefect::UnsupportedVersion(v) => {
                write!(f, "unsupported format version {}", v)
            }
            HeaderDefect::DataSizeOverflow(size) => {
                write!(f, "data size {} overflows the file offset range", size)
            }
        }
    }
}

/// File metadata kept at the start of the preference file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u8,
    pub change_time_millis: i64,
    pub preference_set_count: u64,
    pub preference_count: u64,
    pub data_size: u64,
}

impl Default for FileHeader {
    fn default() -> Self {
        Self {
            version: FILE_FORMAT_VERSION,
            change_time_millis: 0,
            preference_set_count: 0,
            preference_count: 0,
            data_size: 0,
        }
    }
}

impl FileHeader {
    /// Encode the header to its on-disk form
    pub fn encode(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = [0u8; HEADER_SIZE as usize];
        buf[0..4].copy_from_slice(&FILE_MAGIC);
        buf[4] = self.version;
        buf[5..13].copy_from_slice(&self.change_time_millis.to_be_bytes());
        buf[13..21].copy_from_slice(&self.preference_set_count.to_be_bytes());
        buf[21..29].copy_from_slice(&self.preference_count.to_be_bytes());
        buf[29..37].copy_from_slice(&self.data_size.to_be_bytes());
        buf
    }

    /// Decode a header, validating magic and version
    pub fn decode(data: &[u8]) -> std::result::Result<Self, HeaderDefect> {
        if data.len() < HEADER_SIZE as usize {
            return Err(HeaderDefect::Truncated);
        }
        if data[0..4] != FILE_MAGIC {
            return Err(HeaderDefect::BadMagic);
        }
        let version = data[4];
        if version != FILE_FORMAT_VERSION {
            return Err(HeaderDefect::UnsupportedVersion(version));
        }
        let data_size = u64::from_be_bytes(be8(&data[29..37]));
        if HEADER_SIZE.checked_add(data_size).is_none() {
            return Err(HeaderDefect::DataSizeOverflow(data_size));
        }
        Ok(Self {
            version,
            change_time_millis: i64::from_be_bytes(be8(&data[5..13])),
            preference_set_count: u64::from_be_bytes(be8(&data[13..21])),
            preference_count: u64::from_be_bytes(be8(&data[21..29])),
            data_size,
        })
    }

    /// Stamp the header with the current wall-clock time
    pub fn touch(&mut self) {
        self.change_time_millis = chrono::Utc::now().timestamp_millis();
    }

    /// Byte offset one past the last record
    ///
    /// Saturates for a data size that `decode` would have rejected.
    pub fn data_end(&self) -> u64 {
        HEADER_SIZE.saturating_add(self.data_size)
    }
}

pub(crate) fn be8(bytes: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&bytes[..8]);
    out
}

pub(crate) fn be4(bytes: &[u8]) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(&bytes[..4]);
    out
}

/// Convert a decode failure into the store's error type
pub(crate) fn format_error(path: &std::path::Path, defect: HeaderDefect) -> crate::core::Error {
    crate::core::Error::format(path.display().to_string(), defect.to_string())
}

/// Read and validate the header from raw file bytes
pub(crate) fn read_header(path: &std::path::Path, data: &[u8]) -> Result<FileHeader> {
    FileHeader::decode(data).map_err(|defect| format_error(path, defect))
}
