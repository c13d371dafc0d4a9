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

//! Turn and Learning - the atomic units of conversation memory
//!
//! Both are immutable and content-addressable: the ID is a hash of the
//! identity-bearing fields, so equal content yields equal IDs and
//! deduplication is a map lookup. Never mutate a record after creation;
//! a change to an identity field is a different record with a different ID.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Digest width for content-addressed IDs. Collisions at conversation-scale
/// item counts are an accepted risk.
const ID_DIGEST_BYTES: usize = 16;

/// Roughly estimate token count as `max(1, round(words * 1.3))`.
///
/// Returns 0 for empty text.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    let word_count = text.split_whitespace().count();
    ((word_count as f64) * 1.3).round().max(1.0) as usize
}

fn content_id(data: &str) -> String {
    let hash = blake3::hash(data.as_bytes());
    hex::encode(&hash.as_bytes()[..ID_DIGEST_BYTES])
}

/// Content-addressed identifier of a [`Turn`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(pub String);

impl std::fmt::Display for TurnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content-addressed identifier of a [`Learning`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LearningId(pub String);

impl std::fmt::Display for LearningId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Types of conversation turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnType {
    /// User message
    User,
    /// Assistant response
    Assistant,
    /// System context/instructions
    System,
    /// Tool invocation
    ToolCall,
    /// Tool execution result
    ToolResult,
    /// Compressed summary of multiple turns
    Summary,
    /// Extracted insight/fact injected as a turn
    Learning,
    /// Saved state marker
    Checkpoint,
}

impl TurnType {
    /// Stable string form, used in the identity hash and on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnType::User => "user",
            TurnType::Assistant => "assistant",
            TurnType::System => "system",
            TurnType::ToolCall => "tool_call",
            TurnType::ToolResult => "tool_result",
            TurnType::Summary => "summary",
            TurnType::Learning => "learning",
            TurnType::Checkpoint => "checkpoint",
        }
    }

    /// Role this turn maps to in LLM message format
    pub fn role(&self) -> &'static str {
        match self {
            TurnType::User => "user",
            TurnType::Assistant | TurnType::ToolCall => "assistant",
            TurnType::ToolResult => "tool",
            TurnType::System
            | TurnType::Summary
            | TurnType::Learning
            | TurnType::Checkpoint => "system",
        }
    }
}

/// A single turn in a conversation.
///
/// Treat as immutable after construction. The ID is computed from
/// `(turn_type, content, parent_ids)`; all other fields are metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// The actual message content
    pub content: String,
    /// Type of this turn
    pub turn_type: TurnType,
    /// When this turn occurred
    pub timestamp: DateTime<Utc>,
    /// IDs of parent turns (enables DAG structure)
    pub parent_ids: Vec<TurnId>,
    /// Where this content came from (file, tool, model, etc.)
    pub source: Option<String>,
    /// Estimated tokens in this turn
    pub token_count: usize,
    /// Model that generated this (for assistant turns)
    pub model: Option<String>,
    /// Confidence score (for learning turns)
    pub confidence: Option<f32>,
    /// Semantic tags for retrieval
    pub tags: Vec<String>,
}

impl Turn {
    /// Create a new turn, estimating the token count from the content
    pub fn new(content: impl Into<String>, turn_type: TurnType) -> Self {
        let content = content.into();
        let token_count = estimate_tokens(&content);
        Self {
            content,
            turn_type,
            timestamp: Utc::now(),
            parent_ids: Vec::new(),
            source: None,
            token_count,
            model: None,
            confidence: None,
            tags: Vec::new(),
        }
    }

    /// Convenience: a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(content, TurnType::User)
    }

    /// Convenience: an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(content, TurnType::Assistant)
    }

    /// Convenience: a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(content, TurnType::System)
    }

    /// Set the parent turn IDs
    pub fn with_parents(mut self, parent_ids: Vec<TurnId>) -> Self {
        self.parent_ids = parent_ids;
        self
    }

    /// Set the source
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Set the generating model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set semantic tags
    pub fn with_tags(mut self, tags: Vec<impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(|t| t.into()).collect();
        self
    }

    /// Override the estimated token count with a supplied one
    pub fn with_token_count(mut self, token_count: usize) -> Self {
        self.token_count = token_count;
        self
    }

    /// Set the timestamp explicitly (replay paths)
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Content-addressable ID.
    ///
    /// Same `(turn_type, content, parent_ids)` = same ID, enabling O(1)
    /// deduplication. Timestamps, tags, and other metadata do not
    /// participate.
    pub fn id(&self) -> TurnId {
        let parents: Vec<&str> = self.parent_ids.iter().map(|p| p.0.as_str()).collect();
        let data = format!(
            "{}:{}:{}",
            self.turn_type.as_str(),
            self.content,
            parents.join(",")
        );
        TurnId(content_id(&data))
    }

    /// Can this turn be compressed/summarized?
    pub fn is_compressible(&self) -> bool {
        matches!(
            self.turn_type,
            TurnType::User | TurnType::Assistant | TurnType::ToolResult
        )
    }

    /// Convert to LLM message format
    pub fn to_message(&self) -> serde_json::Value {
        serde_json::json!({
            "role": self.turn_type.role(),
            "content": self.content,
        })
    }

    /// Create a compressed version of this turn, parented on the original
    pub fn compress(&self, summary: impl Into<String>) -> Turn {
        let id = self.id();
        Turn::new(summary, TurnType::Summary)
            .with_parents(vec![id.clone()])
            .with_source(format!("compressed:{id}"))
            .with_tags(self.tags.clone())
    }
}

/// Type of learning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningCategory {
    /// "Uses FastAPI"
    Fact,
    /// "Prefers pytest"
    Preference,
    /// "Tests required"
    Constraint,
    /// "Uses factory pattern"
    Pattern,
    /// "Sync DB doesn't work"
    DeadEnd,
}

impl LearningCategory {
    /// Stable string form, used in the identity hash
    pub fn as_str(&self) -> &'static str {
        match self {
            LearningCategory::Fact => "fact",
            LearningCategory::Preference => "preference",
            LearningCategory::Constraint => "constraint",
            LearningCategory::Pattern => "pattern",
            LearningCategory::DeadEnd => "dead_end",
        }
    }

    /// First-person framing for context injection.
    ///
    /// First-person voice helps the agent treat learnings as its own
    /// memories rather than logs about someone else.
    pub fn prompt_prefix(&self) -> &'static str {
        match self {
            LearningCategory::Fact => "I know:",
            LearningCategory::Preference => "I prefer:",
            LearningCategory::Constraint => "I must:",
            LearningCategory::Pattern => "I use:",
            LearningCategory::DeadEnd => "I tried and it failed:",
        }
    }
}

/// An extracted piece of knowledge from the conversation.
///
/// Learnings persist even when the originating conversation is compressed
/// away. Identity is `(category, fact)` only; usage counters and activity
/// stamps are metadata and do not change the ID. Superseded learnings are
/// never deleted, only excluded from active queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Learning {
    /// The actual learning/insight
    pub fact: String,
    /// Turn IDs this was extracted from
    pub source_turns: Vec<TurnId>,
    /// How confident we are in this learning (0-1)
    pub confidence: f32,
    /// Type of learning
    pub category: LearningCategory,
    /// When the learning was recorded
    pub timestamp: DateTime<Utc>,
    /// If this learning was updated, pointer to the newer version
    pub superseded_by: Option<LearningId>,
    /// How many times this learning has been retrieved and used
    pub use_count: u32,
    /// Explicit agent references to this learning (strongest signal)
    pub mention_count: u32,
    /// Activity day when created (vacation-proof decay)
    pub activity_day_created: u32,
    /// Activity day of last access
    pub activity_day_accessed: u32,
}

impl Learning {
    /// Create a new learning with full confidence
    pub fn new(fact: impl Into<String>, category: LearningCategory) -> Self {
        Self {
            fact: fact.into(),
            source_turns: Vec::new(),
            confidence: 1.0,
            category,
            timestamp: Utc::now(),
            superseded_by: None,
            use_count: 0,
            mention_count: 0,
            activity_day_created: 0,
            activity_day_accessed: 0,
        }
    }

    /// Set the confidence score
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Set the source turns
    pub fn with_source_turns(mut self, source_turns: Vec<TurnId>) -> Self {
        self.source_turns = source_turns;
        self
    }

    /// Stamp the activity day of creation
    pub fn with_activity_day(mut self, activity_day: u32) -> Self {
        self.activity_day_created = activity_day;
        self.activity_day_accessed = activity_day;
        self
    }

    /// Content-addressable ID, based on `(category, fact)` only
    pub fn id(&self) -> LearningId {
        let data = format!("{}:{}", self.category.as_str(), self.fact);
        LearningId(content_id(&data))
    }

    /// Is this learning still current (not superseded)?
    pub fn is_active(&self) -> bool {
        self.superseded_by.is_none()
    }

    /// New value with updated access tracking (immutable update)
    pub fn with_access(&self, activity_day: u32) -> Learning {
        let mut updated = self.clone();
        updated.use_count += 1;
        updated.activity_day_accessed = activity_day;
        updated
    }

    /// New value with an incremented mention count (immutable update)
    pub fn with_mention(&self) -> Learning {
        let mut updated = self.clone();
        updated.mention_count += 1;
        updated
    }

    /// Convert to a Turn for context injection, in first-person voice
    pub fn to_turn(&self) -> Turn {
        let mut turn = Turn::new(
            format!("{} {}", self.category.prompt_prefix(), self.fact),
            TurnType::Learning,
        )
        .with_parents(self.source_turns.clone());
        turn.confidence = Some(self.confidence);
        turn
    }
}
