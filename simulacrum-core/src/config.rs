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

//! Memory engine configuration

use serde::{Deserialize, Serialize};

/// Token budget and its sub-allocations.
///
/// `available()` is the hard ceiling for assembled context: the assembler
/// must never emit content whose estimated tokens exceed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBudget {
    /// Total context window budget
    pub total_tokens: usize,
    /// Reserved for the system prompt
    pub system_tokens: usize,
    /// Sub-budget for recent conversation turns
    pub recent_tokens: usize,
    /// Sub-budget for retrieved memory (semantic + chunks)
    pub memory_tokens: usize,
    /// Sub-budget for learnings
    pub learning_tokens: usize,
    /// Reserved for the model's response
    pub response_tokens: usize,
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self {
            total_tokens: 8_000,
            system_tokens: 1_000,
            recent_tokens: 2_000,
            memory_tokens: 2_500,
            learning_tokens: 1_000,
            response_tokens: 1_500,
        }
    }
}

impl TokenBudget {
    /// A budget with only the total set; sub-allocations scale from defaults
    pub fn with_total(total_tokens: usize) -> Self {
        Self {
            total_tokens,
            ..Default::default()
        }
    }

    /// Tokens available for assembled context
    pub fn available(&self) -> usize {
        self.total_tokens.saturating_sub(self.response_tokens)
    }
}

/// Configuration for hierarchical chunking and tier transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Turns accumulated into one HOT chunk
    pub hot_chunk_turns: usize,
    /// Number of most recent chunks kept HOT (full content in memory)
    pub hot_chunks: usize,
    /// WARM chunks consolidated into one COLD macro-chunk
    pub warm_consolidation_chunks: usize,
    /// Target size of the representative excerpt kept in CTF records
    pub ctf_excerpt_chars: usize,
    /// Summarize chunks on demotion
    pub auto_summarize: bool,
    /// Extract key facts on demotion
    pub auto_extract_facts: bool,
    /// Compute embeddings on demotion (requires a provider)
    pub auto_embed: bool,
    /// Archive full content when consolidating to COLD
    pub archive_cold_content: bool,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            hot_chunk_turns: 10,
            hot_chunks: 2,
            warm_consolidation_chunks: 3,
            ctf_excerpt_chars: 240,
            auto_summarize: true,
            auto_extract_facts: true,
            auto_embed: true,
            archive_cold_content: true,
        }
    }
}

/// Relevance thresholds and deadlines per retrieval category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Minimum relevance for a learning to be included
    pub learning_min_relevance: f32,
    /// Minimum relevance for a recalled turn to be included
    pub turn_min_relevance: f32,
    /// Minimum cosine score for semantic chunk retrieval
    pub semantic_min_score: f32,
    /// Maximum chunks returned by semantic retrieval
    pub semantic_limit: usize,
    /// Deadline for the whole retrieval fan-out, in milliseconds.
    /// A category missing its slice yields an empty result, not an error.
    pub deadline_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            learning_min_relevance: 0.2,
            turn_min_relevance: 0.1,
            semantic_min_score: 0.25,
            semantic_limit: 5,
            deadline_ms: 500,
        }
    }
}

/// Activity-day decay policy.
///
/// Decay is scheduled in activity days (calendar days with recorded user
/// engagement), not wall-clock days, so a vacation does not age memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayPolicy {
    /// Activity days without access before a project counts as stale
    pub stale_days: u32,
    /// Activity days without access before a project is archive-eligible
    pub archive_days: u32,
    /// Projects with fewer active learnings than this count as empty
    pub min_useful_learnings: usize,
    /// Projects with fewer memory nodes than this count as empty
    pub min_useful_nodes: usize,
}

impl Default for DecayPolicy {
    fn default() -> Self {
        Self {
            stale_days: 14,
            archive_days: 45,
            min_useful_learnings: 3,
            min_useful_nodes: 5,
        }
    }
}

/// Top-level configuration for a per-project store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Token budget for context assembly
    pub budget: TokenBudget,
    /// Chunking and tiering thresholds
    pub chunks: ChunkConfig,
    /// Retrieval thresholds and deadlines
    pub retrieval: RetrievalConfig,
    /// Lifecycle decay parameters
    pub decay: DecayPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_available() {
        let budget = TokenBudget::default();
        assert_eq!(budget.available(), 6_500);

        let tiny = TokenBudget {
            total_tokens: 100,
            response_tokens: 150,
            ..Default::default()
        };
        assert_eq!(tiny.available(), 0);
    }

    #[test]
    fn test_chunk_defaults_form_cascade() {
        let config = ChunkConfig::default();
        assert_eq!(config.hot_chunk_turns, 10);
        assert_eq!(config.hot_chunks, 2);
        assert_eq!(config.warm_consolidation_chunks, 3);
    }
}
