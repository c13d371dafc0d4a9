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

//! Collaborator traits: generation backend and embedding provider
//!
//! These are the only boundaries this engine crosses. Both are swappable
//! and mockable; every call through them is a suspension point. Failures
//! crossing back are recovered locally by the callers (heuristic fallback,
//! category skipped) rather than propagated.

use async_trait::async_trait;

use crate::error::SimulacrumResult;

/// Options for a generation call
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum tokens to generate
    pub max_tokens: usize,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 512,
        }
    }
}

/// Token usage reported by a generation call
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerationUsage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// Result of a generation call
#[derive(Debug, Clone)]
pub struct Generation {
    /// Generated text
    pub text: String,
    /// Token usage
    pub usage: GenerationUsage,
}

/// External text-generation model used by the summarizer
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text for a prompt
    async fn generate(
        &self,
        prompt: &str,
        options: GenerationOptions,
    ) -> SimulacrumResult<Generation>;
}

/// External embedding model used for semantic retrieval
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Fixed dimensionality of vectors produced by this provider
    fn dimensions(&self) -> usize;

    /// Embed a batch of texts, one vector per input
    async fn embed(&self, texts: &[String]) -> SimulacrumResult<Vec<Vec<f32>>>;
}
