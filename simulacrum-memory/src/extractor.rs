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

//! Automatic learning extraction from conversation text
//!
//! Regex-based extraction of facts, constraints, patterns, and dead ends.
//! Patterns are compiled once at first use. Extraction quality gates are
//! conservative: short or generic captures are dropped rather than stored.

use std::sync::LazyLock;

use regex::Regex;
use simulacrum_core::{LearningCategory, Turn, TurnType};

/// Patterns over assistant responses
static RESPONSE_PATTERNS: LazyLock<Vec<(LearningCategory, Regex)>> = LazyLock::new(|| {
    let patterns: &[(LearningCategory, &str)] = &[
        (
            LearningCategory::Fact,
            r"(?i)(?:the |it )(?:is|has|takes|uses|requires) (\d+[^.,]*)",
        ),
        (
            LearningCategory::Fact,
            r"(?i)(?:default|defaults to) ([^.]+)",
        ),
        (
            LearningCategory::Fact,
            r"(?i)timeout (?:is|of) (\d+[^.,]*)",
        ),
        (
            LearningCategory::Constraint,
            r"(?i)(?:must|need to) (?:be |use |have )([^.]+)",
        ),
        (
            LearningCategory::Pattern,
            r"(?i)(?:whenever|every time|each time) ([^.]+)",
        ),
        (
            LearningCategory::DeadEnd,
            r"(?i)(?:tried|attempted) ([^.]+?) (?:but|however|didn't|failed)",
        ),
        (
            LearningCategory::DeadEnd,
            r"(?i)(?:doesn't|won't|can't) work (?:because|due to|since) ([^.]+)",
        ),
    ];
    patterns
        .iter()
        .map(|(cat, p)| (*cat, Regex::new(p).expect("static extraction regex")))
        .collect()
});

/// Patterns over user messages (personal facts, preferences, constraints)
static USER_PATTERNS: LazyLock<Vec<(LearningCategory, Regex)>> = LazyLock::new(|| {
    let patterns: &[(LearningCategory, &str)] = &[
        (
            LearningCategory::Fact,
            r"(?i)(?:my name is|i'm called|call me) ([a-zA-Z][a-zA-Z0-9_\- ]{1,30})",
        ),
        (
            LearningCategory::Fact,
            r"(?i)(?:i work (?:at|for|on)) ([^.]{3,50})",
        ),
        (
            LearningCategory::Fact,
            r"(?i)(?:i(?:'m| am) (?:using|working with|building)) ([^.]{3,50})",
        ),
        (
            LearningCategory::Preference,
            r"(?i)(?:i prefer|i like|i use) ([^.]{3,50})",
        ),
        (
            LearningCategory::Constraint,
            r"(?i)(?:cannot|can't|won't) ([^.]+)",
        ),
        (
            LearningCategory::Constraint,
            r"(?i)(?:blocked by|prevented by|limited by) ([^.]+)",
        ),
    ];
    patterns
        .iter()
        .map(|(cat, p)| (*cat, Regex::new(p).expect("static extraction regex")))
        .collect()
});

/// A learning extracted from text, before being recorded
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedLearning {
    pub text: String,
    pub category: LearningCategory,
    pub confidence: f32,
}

/// Regex-driven learning extractor
#[derive(Debug, Clone)]
pub struct LearningExtractor {
    /// Minimum confidence to report a learning
    pub min_confidence: f32,
}

impl Default for LearningExtractor {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
        }
    }
}

impl LearningExtractor {
    pub fn new(min_confidence: f32) -> Self {
        Self { min_confidence }
    }

    /// Extract learnings from free text (assistant responses)
    pub fn extract_from_text(&self, text: &str) -> Vec<ExtractedLearning> {
        self.run_patterns(text, &RESPONSE_PATTERNS)
    }

    /// Extract learnings from a turn. Assistant turns use the response
    /// patterns, user turns the personal-fact patterns; other turn types
    /// yield nothing.
    pub fn extract_from_turn(&self, turn: &Turn) -> Vec<ExtractedLearning> {
        match turn.turn_type {
            TurnType::Assistant => self.extract_from_text(&turn.content),
            TurnType::User => self.extract_user_facts(&turn.content),
            _ => Vec::new(),
        }
    }

    /// Extract user-stated facts (names, jobs, preferences, constraints).
    ///
    /// Explicit statements about oneself are high-signal, so these get a
    /// flat high confidence instead of the heuristic scoring used for
    /// assistant text; the length gates are looser for the same reason
    /// (names are short).
    pub fn extract_user_facts(&self, message: &str) -> Vec<ExtractedLearning> {
        let mut learnings = Vec::new();
        for (category, pattern) in USER_PATTERNS.iter() {
            for captures in pattern.captures_iter(message) {
                let captured = captures.get(1).map(|m| m.as_str().trim()).unwrap_or("");
                if captured.len() < 2 || captured.len() > 100 {
                    continue;
                }
                learnings.push(ExtractedLearning {
                    text: captured.to_string(),
                    category: *category,
                    confidence: 0.85,
                });
            }
        }
        deduplicate(learnings)
    }

    fn run_patterns(
        &self,
        text: &str,
        patterns: &[(LearningCategory, Regex)],
    ) -> Vec<ExtractedLearning> {
        let mut learnings = Vec::new();

        for (category, pattern) in patterns {
            for captures in pattern.captures_iter(text) {
                let captured = captures
                    .get(1)
                    .map(|m| m.as_str())
                    .unwrap_or_else(|| captures.get(0).map(|m| m.as_str()).unwrap_or(""));
                let captured = captured.trim();

                if captured.len() < 5 || captured.len() > 200 {
                    continue;
                }

                let confidence = confidence_for(captured, *category, text);
                if confidence >= self.min_confidence {
                    learnings.push(ExtractedLearning {
                        text: captured.to_string(),
                        category: *category,
                        confidence,
                    });
                }
            }
        }

        learnings = deduplicate(learnings);
        learnings.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        learnings
    }
}

fn confidence_for(learning: &str, category: LearningCategory, context: &str) -> f32 {
    let mut confidence = 0.5f32;
    let context_lower = context.to_lowercase();

    match category {
        LearningCategory::DeadEnd
            if ["failed", "error", "didn't work"]
                .iter()
                .any(|kw| context_lower.contains(kw)) =>
        {
            confidence += 0.15
        }
        LearningCategory::Constraint
            if ["must", "cannot", "blocked"]
                .iter()
                .any(|kw| context_lower.contains(kw)) =>
        {
            confidence += 0.15
        }
        _ => {}
    }

    // Numbers are usually reliable extractions
    if learning.chars().any(|c| c.is_ascii_digit()) {
        confidence += 0.1;
    }
    if learning.len() < 10 {
        confidence -= 0.2;
    }

    confidence.clamp(0.0, 1.0)
}

/// Remove near-duplicates (one capture containing another)
fn deduplicate(learnings: Vec<ExtractedLearning>) -> Vec<ExtractedLearning> {
    let mut seen: Vec<String> = Vec::new();
    let mut unique = Vec::new();

    for learning in learnings {
        let normalized = learning.text.to_lowercase();
        let duplicate = seen
            .iter()
            .any(|s| s.contains(&normalized) || normalized.contains(s.as_str()));
        if !duplicate {
            seen.push(normalized);
            unique.push(learning);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_fact_with_number() {
        let extractor = LearningExtractor::default();
        let learnings =
            extractor.extract_from_text("The request timeout is 30 seconds overall.");
        assert!(!learnings.is_empty());
        assert_eq!(learnings[0].category, LearningCategory::Fact);
        assert!(learnings[0].text.contains("30 seconds"));
    }

    #[test]
    fn test_extract_dead_end() {
        let extractor = LearningExtractor::default();
        let learnings = extractor
            .extract_from_text("I tried the sync driver but it failed under load.");
        assert!(learnings
            .iter()
            .any(|l| l.category == LearningCategory::DeadEnd));
    }

    #[test]
    fn test_extract_user_name() {
        let extractor = LearningExtractor::default();
        let learnings = extractor.extract_user_facts("Hi! My name is Alex Chen.");
        assert!(!learnings.is_empty());
        assert!(learnings[0].text.to_lowercase().contains("alex chen"));
        assert!(learnings[0].confidence >= 0.8);
    }

    #[test]
    fn test_user_preference() {
        let extractor = LearningExtractor::default();
        let learnings = extractor.extract_user_facts("I prefer explicit error handling.");
        assert!(learnings
            .iter()
            .any(|l| l.category == LearningCategory::Preference));
    }

    #[test]
    fn test_non_conversational_turns_yield_nothing() {
        let extractor = LearningExtractor::default();
        let turn = Turn::system("The API timeout is 5 seconds.");
        assert!(extractor.extract_from_turn(&turn).is_empty());
    }

    #[test]
    fn test_deduplication() {
        let extractor = LearningExtractor::default();
        // Both "uses 3 retries" patterns capture overlapping text
        let learnings = extractor
            .extract_from_text("The client uses 3 retries. It uses 3 retries by default.");
        let texts: Vec<&str> = learnings.iter().map(|l| l.text.as_str()).collect();
        let unique: std::collections::HashSet<&&str> = texts.iter().collect();
        assert_eq!(texts.len(), unique.len());
    }

    #[test]
    fn test_short_captures_dropped() {
        let extractor = LearningExtractor::default();
        let learnings = extractor.extract_from_text("It is 5.");
        assert!(learnings.is_empty());
    }
}
