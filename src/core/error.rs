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

//! Error types for Recoshard
//!
//! This module defines all error types used by the storage engine and the
//! worker. An owner that cannot be found is not an error: it is reported as
//! `None` through the request's result.

use thiserror::Error;

/// Result type alias for Recoshard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Recoshard
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // =========================================================================
    // File format errors
    // =========================================================================
    /// The file is not a preference file or has an unsupported version
    #[error("'{path}' is not a valid preference file: {reason}")]
    Format { path: String, reason: String },

    /// A record read during a scan holds impossible values
    #[error("corrupt record at offset {offset}: {reason}")]
    CorruptRecord { offset: u64, reason: String },

    /// A record offset does not point into the data region
    #[error("invalid record offset {offset}")]
    InvalidOffset { offset: u64 },

    /// The store has been closed and cannot be used
    #[error("preference store is closed")]
    StoreClosed,

    /// A preference set grew beyond what a record can describe
    #[error("preference set of {count} entities does not fit in a record")]
    CapacityOverflow { count: usize },

    // =========================================================================
    // Worker errors
    // =========================================================================
    /// The worker terminated before the request could be answered
    #[error("recommender worker is stopped")]
    WorkerStopped,

    // =========================================================================
    // Other errors
    // =========================================================================
    /// Invalid argument or configuration value
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// IO error (wrapped)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Internal error for unexpected conditions
    #[error("{message}")]
    Internal { message: String },
}

impl Error {
    /// Create a new Format error
    pub fn format(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new CorruptRecord error
    pub fn corrupt_record(offset: u64, reason: impl Into<String>) -> Self {
        Error::CorruptRecord {
            offset,
            reason: reason.into(),
        }
    }

    /// Create a new IO error
    pub fn io(message: impl Into<String>) -> Self {
        Error::Io {
            message: message.into(),
        }
    }

    /// Create a new Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }

    /// Create a new InvalidArgument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    /// Check if the error leaves the store unusable
    ///
    /// Every error except a rejected argument, a closed store or a stopped
    /// worker means the file can no longer be trusted by this process.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::InvalidArgument(_) | Error::WorkerStopped | Error::StoreClosed
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            message: err.to_string(),
        }
    }
}
