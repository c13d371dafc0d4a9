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

//! Simulacrum core types
//!
//! The leaf layer of the Simulacrum memory engine:
//! - **Turn / Learning**: immutable, content-addressed records
//! - **ConversationDag**: append-only graph keyed by content hash
//! - **Config**: token budgets, chunk thresholds, decay policy
//! - **Provider traits**: the generation/embedding collaborator boundary
//!
//! Identity is derived, never assigned: two records with the same
//! identity-bearing fields hash to the same ID, which is what makes
//! deduplication an O(1) map insert everywhere above this layer.

pub mod config;
pub mod dag;
pub mod error;
pub mod provider;
pub mod turn;

// Re-exports
pub use config::{ChunkConfig, DecayPolicy, RetrievalConfig, StoreConfig, TokenBudget};
pub use dag::{ConsistencyReport, ConversationDag, DagStats};
pub use error::{SimulacrumError, SimulacrumResult};
pub use provider::{
    EmbeddingProvider, Generation, GenerationBackend, GenerationOptions, GenerationUsage,
};
pub use turn::{
    estimate_tokens, Learning, LearningCategory, LearningId, Turn, TurnId, TurnType,
};
