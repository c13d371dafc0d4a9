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

//! The five memory types feeding context assembly
//!
//! - Working: what is actively being discussed (recent turns)
//! - Long-term: what has been learned (active learnings)
//! - Episodic: what has been tried (past episodes, dead ends)
//! - Semantic: what is known about the material (chunks, memory nodes)
//! - Procedural: how to think (heuristics)
//!
//! Relevance here is keyword overlap: cheap, deterministic, and good
//! enough to rank within a category. Embedding similarity handles the
//! semantic category separately.

use std::collections::HashSet;

use simulacrum_core::{Learning, Turn};

/// Lowercased alphanumeric words longer than two characters
pub fn keywords(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(|w| w.to_string())
        .collect()
}

/// Overlap score in [0, 1]: fraction of query keywords present in the text
pub fn relevance(query_keywords: &HashSet<String>, text: &str) -> f32 {
    if query_keywords.is_empty() {
        return 0.0;
    }
    let text_keywords = keywords(text);
    let hits = query_keywords.intersection(&text_keywords).count();
    hits as f32 / query_keywords.len() as f32
}

/// Score a learning against query keywords.
///
/// Blends keyword overlap with the learning's own confidence so that
/// equally-relevant facts rank by how much we trust them.
pub fn score_learning(query_keywords: &HashSet<String>, learning: &Learning) -> f32 {
    let overlap = relevance(query_keywords, &learning.fact);
    if overlap == 0.0 {
        return 0.0;
    }
    overlap * 0.8 + learning.confidence * 0.2
}

/// Score a turn against query keywords
pub fn score_turn(query_keywords: &HashSet<String>, turn: &Turn) -> f32 {
    relevance(query_keywords, &turn.content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use simulacrum_core::LearningCategory;

    #[test]
    fn test_keywords_filter_short_words() {
        let kw = keywords("Is it an API or a database?");
        assert!(kw.contains("api"));
        assert!(kw.contains("database"));
        assert!(!kw.contains("is"));
        assert!(!kw.contains("an"));
    }

    #[test]
    fn test_relevance_fraction() {
        let query = keywords("database migration plan");
        assert_eq!(relevance(&query, "the database migration plan looks good"), 1.0);
        assert!(relevance(&query, "the database is fine") < 0.5);
        assert_eq!(relevance(&query, "nothing related"), 0.0);
    }

    #[test]
    fn test_learning_score_blends_confidence() {
        let query = keywords("redis caching");
        let confident =
            Learning::new("Uses Redis for caching", LearningCategory::Fact).with_confidence(1.0);
        let shaky =
            Learning::new("Uses Redis for caching", LearningCategory::Fact).with_confidence(0.2);
        assert!(score_learning(&query, &confident) > score_learning(&query, &shaky));

        // Zero overlap stays zero regardless of confidence
        let unrelated = Learning::new("Prefers tabs", LearningCategory::Preference);
        assert_eq!(score_learning(&query, &unrelated), 0.0);
    }
}
