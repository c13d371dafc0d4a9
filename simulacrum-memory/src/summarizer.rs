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

//! Chunk summarization with generative and heuristic backends
//!
//! Backend selection happens at construction, not per call. Generation
//! failures never cross this boundary: fact and theme extraction return
//! empty results, the primary summary falls back to the heuristic path.

use std::sync::Arc;

use simulacrum_core::{GenerationBackend, GenerationOptions, Turn, TurnType};
use tracing::{debug, warn};

/// Cap on facts extracted per call
const MAX_FACTS: usize = 10;
/// Cap on themes extracted per call
const MAX_THEMES: usize = 5;

const SUMMARIZE_PROMPT: &str = "Summarize this conversation segment in 2-3 sentences. \
Focus on what was asked, what was decided, and what was produced.\n\n\
Segment:\n{turns}\n\nSummary:";

const FACTS_PROMPT: &str = "Extract up to 10 concrete facts from this conversation segment. \
Output one fact per line, prefixed with '- '. Only include facts stated in the text; \
skip speculation.\n\nSegment:\n{turns}\n\nFacts:";

const THEMES_PROMPT: &str = "Identify up to 5 recurring themes across these segment summaries. \
Output one theme per line, prefixed with '- '. Themes are short noun phrases.\n\n\
Summaries:\n{summaries}\n\nThemes:";

const EXECUTIVE_PROMPT: &str = "Write a one-paragraph executive summary of this conversation \
period based on the segment summaries below. Lead with the overall goal, then the outcome.\n\n\
Summaries:\n{summaries}\n\nExecutive summary:";

/// Which backend drives summarization
#[derive(Clone)]
enum Backend {
    Generative(Arc<dyn GenerationBackend>),
    Heuristic,
}

/// Summarizer for chunk demotion and consolidation
#[derive(Clone)]
pub struct Summarizer {
    backend: Backend,
}

impl std::fmt::Debug for Summarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match self.backend {
            Backend::Generative(_) => "generative",
            Backend::Heuristic => "heuristic",
        };
        f.debug_struct("Summarizer").field("backend", &backend).finish()
    }
}

fn first_sentence(text: &str) -> String {
    let trimmed = text.trim();
    let end = trimmed
        .char_indices()
        .find(|(_, c)| matches!(c, '.' | '!' | '?'))
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(trimmed.len());
    let sentence: String = trimmed[..end].chars().take(200).collect();
    sentence.trim().to_string()
}

fn turns_to_text(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| {
            let content: String = t.content.chars().take(500).collect();
            format!("{}: {}", t.turn_type.as_str(), content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_list(text: &str, cap: usize) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            let item = line
                .strip_prefix("- ")
                .or_else(|| line.strip_prefix("* "))
                .or_else(|| {
                    // Numbered lists: "1. item"
                    line.split_once(". ")
                        .filter(|(n, _)| n.chars().all(|c| c.is_ascii_digit()))
                        .map(|(_, rest)| rest)
                })?;
            let item = item.trim();
            (!item.is_empty()).then(|| item.to_string())
        })
        .take(cap)
        .collect()
}

impl Summarizer {
    /// Summarizer driven by an external generation backend
    pub fn generative(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend: Backend::Generative(backend),
        }
    }

    /// Heuristic-only summarizer; no collaborator required
    pub fn heuristic() -> Self {
        Self {
            backend: Backend::Heuristic,
        }
    }

    /// Heuristic segment summary: first sentence of the first user turn.
    ///
    /// Falls back to the first sentence of the first turn of any type.
    fn heuristic_summary(turns: &[Turn]) -> String {
        let first_user = turns
            .iter()
            .find(|t| t.turn_type == TurnType::User)
            .or_else(|| turns.first());
        first_user.map(|t| first_sentence(&t.content)).unwrap_or_default()
    }

    async fn generate(&self, prompt: String, max_tokens: usize) -> Option<String> {
        let Backend::Generative(backend) = &self.backend else {
            return None;
        };
        // Deterministic: same prompt, temperature 0
        let options = GenerationOptions {
            temperature: 0.0,
            max_tokens,
        };
        match backend.generate(&prompt, options).await {
            Ok(generation) => Some(generation.text),
            Err(e) => {
                warn!(error = %e, "Generation backend failed; using fallback");
                None
            }
        }
    }

    /// Summarize a run of turns. Never fails: the heuristic path covers
    /// backend errors.
    pub async fn summarize_turns(&self, turns: &[Turn]) -> String {
        if turns.is_empty() {
            return String::new();
        }
        let prompt = SUMMARIZE_PROMPT.replace("{turns}", &turns_to_text(turns));
        match self.generate(prompt, 160).await {
            Some(text) if !text.trim().is_empty() => text.trim().to_string(),
            _ => Self::heuristic_summary(turns),
        }
    }

    /// Extract up to 10 facts. Returns an empty list on backend failure or
    /// with the heuristic backend; heuristic fact extraction is too
    /// unreliable to emit.
    pub async fn extract_facts(&self, turns: &[Turn]) -> Vec<String> {
        if turns.is_empty() {
            return Vec::new();
        }
        let prompt = FACTS_PROMPT.replace("{turns}", &turns_to_text(turns));
        match self.generate(prompt, 300).await {
            Some(text) => parse_list(&text, MAX_FACTS),
            None => Vec::new(),
        }
    }

    /// Extract up to 5 cross-segment themes. Empty on backend failure.
    pub async fn extract_themes(&self, summaries: &[String]) -> Vec<String> {
        if summaries.is_empty() {
            return Vec::new();
        }
        let prompt = THEMES_PROMPT.replace("{summaries}", &summaries.join("\n"));
        match self.generate(prompt, 120).await {
            Some(text) => parse_list(&text, MAX_THEMES),
            None => Vec::new(),
        }
    }

    /// Executive summary across segment summaries. The heuristic fallback
    /// joins the first sentences of the inputs.
    pub async fn executive_summary(&self, summaries: &[String]) -> String {
        if summaries.is_empty() {
            return String::new();
        }
        let prompt = EXECUTIVE_PROMPT.replace("{summaries}", &summaries.join("\n"));
        match self.generate(prompt, 220).await {
            Some(text) if !text.trim().is_empty() => text.trim().to_string(),
            _ => {
                debug!("Executive summary via heuristic join");
                summaries
                    .iter()
                    .map(|s| first_sentence(s))
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ")
            }
        }
    }
}
