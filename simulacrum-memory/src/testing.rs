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

//! Mock collaborators for tests
//!
//! Deterministic stand-ins for the generation and embedding providers so
//! the engine can be exercised without network access.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use simulacrum_core::{
    EmbeddingProvider, Generation, GenerationBackend, GenerationOptions, GenerationUsage,
    SimulacrumError, SimulacrumResult,
};

/// Generation backend returning a fixed response
pub struct MockGenerationBackend {
    response: String,
    calls: AtomicUsize,
}

impl MockGenerationBackend {
    pub fn always(response: &str) -> Self {
        Self {
            response: response.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for MockGenerationBackend {
    async fn generate(
        &self,
        prompt: &str,
        _options: GenerationOptions,
    ) -> SimulacrumResult<Generation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Generation {
            text: self.response.clone(),
            usage: GenerationUsage {
                prompt_tokens: prompt.split_whitespace().count(),
                completion_tokens: self.response.split_whitespace().count(),
            },
        })
    }
}

/// Generation backend that always errors
#[derive(Default)]
pub struct FailingGenerationBackend {
    calls: AtomicUsize,
}

impl FailingGenerationBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for FailingGenerationBackend {
    async fn generate(
        &self,
        _prompt: &str,
        _options: GenerationOptions,
    ) -> SimulacrumResult<Generation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SimulacrumError::Backend("backend unreachable".to_string()))
    }
}

/// Deterministic bag-of-words embedding provider.
///
/// Each lowercased word hashes to a dimension; texts sharing words get
/// correlated vectors, which is enough signal for retrieval tests.
pub struct MockEmbeddingProvider {
    dimensions: usize,
}

impl MockEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for word in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
            if word.is_empty() {
                continue;
            }
            let hash = blake3::hash(word.as_bytes());
            let bucket = u32::from_le_bytes(hash.as_bytes()[..4].try_into().unwrap()) as usize
                % self.dimensions;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, texts: &[String]) -> SimulacrumResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Embedding provider that always errors
pub struct FailingEmbeddingProvider {
    dimensions: usize,
}

impl FailingEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbeddingProvider {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, _texts: &[String]) -> SimulacrumResult<Vec<Vec<f32>>> {
        Err(SimulacrumError::Embedding("provider unreachable".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_embeddings_correlate_shared_words() {
        let provider = MockEmbeddingProvider::new(64);
        let vectors = provider
            .embed(&[
                "My name is Alex Chen".to_string(),
                "What is my name?".to_string(),
                "completely unrelated topic entirely".to_string(),
            ])
            .await
            .unwrap();

        let sim = |a: &[f32], b: &[f32]| -> f32 {
            a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
        };
        let related = sim(&vectors[0], &vectors[1]);
        let unrelated = sim(&vectors[0], &vectors[2]);
        assert!(related > unrelated);
    }
}
