// Copyright 2026 Simulacrum Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Memory engine error types

use thiserror::Error;

/// Result type for memory operations
pub type SimulacrumResult<T> = Result<T, SimulacrumError>;

/// Errors that can occur in the memory engine.
///
/// Only `Capacity` is fatal to callers: it risks silent data loss (disk
/// full, archive unwritable). Backend and embedding failures are recovered
/// locally by the components that hit them; consistency errors are logged
/// and the offending record skipped.
#[derive(Debug, Error)]
pub enum SimulacrumError {
    /// Generation backend unreachable or erroring
    #[error("Generation backend error: {0}")]
    Backend(String),

    /// Embedding provider unreachable or erroring
    #[error("Embedding provider error: {0}")]
    Embedding(String),

    /// Dangling reference, corrupt journal entry, unparseable archive
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// Cannot write archive or journal; the only genuinely fatal condition
    #[error("Capacity error: {0}")]
    Capacity(String),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for SimulacrumError {
    fn from(e: serde_json::Error) -> Self {
        SimulacrumError::Serialization(e.to_string())
    }
}
