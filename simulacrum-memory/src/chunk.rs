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

//! Chunk types for hierarchical memory tiering
//!
//! A chunk tracks a contiguous run of turns as a unit. The defining
//! distinction between tiers is the `turns` field: HOT chunks carry full
//! content in memory, WARM and COLD chunks do not. Tier transitions are
//! one-directional (HOT -> WARM -> COLD); `force_refresh` on the chunk
//! manager is the only sanctioned reversal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use simulacrum_core::{Turn, TurnId};

/// Storage tier of a chunk, in decreasing fidelity and cost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkTier {
    /// Full turns held in memory
    Hot,
    /// Summary + embedding, content CTF-encoded
    Warm,
    /// Macro-summary only, full content archived to disk
    Cold,
}

impl ChunkTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkTier::Hot => "hot",
            ChunkTier::Warm => "warm",
            ChunkTier::Cold => "cold",
        }
    }
}

/// Identifier of a chunk
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkId(pub String);

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive range of turn indices owned by a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRange {
    pub start: usize,
    pub end: usize,
}

impl TurnRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false // inclusive range always covers at least one turn
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index <= self.end
    }
}

/// A contiguous run of turns plus tiering metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub tier: ChunkTier,
    /// Inclusive turn indices this chunk owns
    pub turn_range: TurnRange,
    /// IDs of the turns in this chunk, kept across tiers for recovery
    /// from the DAG and archive
    pub turn_ids: Vec<TurnId>,
    /// Full turns; present only while HOT
    pub turns: Option<Vec<Turn>>,
    /// Segment summary (WARM) or macro-summary (COLD)
    pub summary: String,
    /// Facts extracted at demotion time
    pub key_facts: Vec<String>,
    /// Cross-segment themes (COLD consolidation)
    pub themes: Vec<String>,
    /// Embedding of the summary, for semantic retrieval (WARM)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Hash over the member turn IDs, for change detection
    pub content_hash: String,
    /// Total estimated tokens of the member turns
    pub token_count: usize,
    pub timestamp_start: DateTime<Utc>,
    pub timestamp_end: DateTime<Utc>,
    /// CTF-encoded record; present only while WARM
    #[serde(skip)]
    pub ctf: Option<Vec<u8>>,
    /// Archive blob name; present once COLD content has been archived
    pub archive_ref: Option<String>,
    /// Macro chunk this chunk was consolidated into
    pub parent_chunk_id: Option<ChunkId>,
    /// Constituent chunks (macro chunks only)
    pub child_chunk_ids: Vec<ChunkId>,
}

impl Chunk {
    /// Seal a HOT chunk from a run of turns
    pub fn hot(turn_range: TurnRange, turns: Vec<Turn>) -> Self {
        let turn_ids: Vec<TurnId> = turns.iter().map(|t| t.id()).collect();
        let content_hash = Self::hash_turn_ids(&turn_ids);
        let id = ChunkId(format!(
            "chunk_{}_{}_{}",
            turn_range.start,
            turn_range.end,
            &content_hash[..12]
        ));
        let token_count = turns.iter().map(|t| t.token_count).sum();
        let timestamp_start = turns.first().map(|t| t.timestamp).unwrap_or_else(Utc::now);
        let timestamp_end = turns.last().map(|t| t.timestamp).unwrap_or_else(Utc::now);

        Self {
            id,
            tier: ChunkTier::Hot,
            turn_range,
            turn_ids,
            turns: Some(turns),
            summary: String::new(),
            key_facts: Vec::new(),
            themes: Vec::new(),
            embedding: None,
            content_hash,
            token_count,
            timestamp_start,
            timestamp_end,
            ctf: None,
            archive_ref: None,
            parent_chunk_id: None,
            child_chunk_ids: Vec::new(),
        }
    }

    /// Hash over member turn IDs
    pub fn hash_turn_ids(turn_ids: &[TurnId]) -> String {
        let joined: Vec<&str> = turn_ids.iter().map(|id| id.0.as_str()).collect();
        let hash = blake3::hash(joined.join(",").as_bytes());
        hex::encode(&hash.as_bytes()[..16])
    }

    /// Is full content held in memory?
    pub fn is_hot(&self) -> bool {
        self.tier == ChunkTier::Hot
    }

    /// Part of a consolidated macro chunk?
    pub fn is_consolidated(&self) -> bool {
        self.parent_chunk_id.is_some()
    }

    /// Compact view of this chunk for context windows
    pub fn to_summary(&self) -> ChunkSummaryView {
        ChunkSummaryView {
            chunk_id: self.id.clone(),
            tier: self.tier,
            turn_range: self.turn_range,
            summary: self.summary.clone(),
            themes: self.themes.clone(),
            token_count: simulacrum_core::estimate_tokens(&self.summary),
        }
    }
}

/// Summary-only view of a chunk, used when full content would blow a budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSummaryView {
    pub chunk_id: ChunkId,
    pub tier: ChunkTier,
    pub turn_range: TurnRange,
    pub summary: String,
    pub themes: Vec<String>,
    pub token_count: usize,
}
