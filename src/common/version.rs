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

//! Version and build information for Recoshard

use crate::storage::FILE_FORMAT_VERSION;

/// Crate version, as published in Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Git commit hash at build time
/// Set via RECOSHARD_GIT_COMMIT environment variable during compilation
pub const GIT_COMMIT: &str = match option_env!("RECOSHARD_GIT_COMMIT") {
    Some(commit) => commit,
    None => "unknown",
};

/// Returns the crate version string
pub fn version() -> &'static str {
    VERSION
}

/// Returns version info as a formatted string
pub fn version_info() -> String {
    format!(
        "recoshard {} (commit: {}, file format: v{})",
        VERSION, GIT_COMMIT, FILE_FORMAT_VERSION
    )
}
