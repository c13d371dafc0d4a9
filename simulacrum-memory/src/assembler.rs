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

//! Budget-constrained context rendering
//!
//! Takes pre-retrieved, pre-ranked section content and renders a single
//! prompt-ready string that never exceeds `budget.available()`. Sections
//! render in fixed priority order; when the budget runs out, lower-priority
//! sections are dropped whole before a higher-priority section is
//! shortened, and a section is never left half-rendered mid-item.
//!
//! Token accounting is done in words and converted once at the end, so the
//! ceiling check is exact against the same `words * 1.3` estimator used
//! everywhere else.

use serde::{Deserialize, Serialize};

use simulacrum_core::TokenBudget;

/// Context sections in fixed priority order (highest first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    /// Current focus hint
    FocusHint,
    /// Procedural heuristics
    Heuristics,
    /// High-relevance learnings
    Learnings,
    /// Failed episodes: what not to try
    DeadEnds,
    /// Recent conversation turns
    RecentConversation,
    /// Semantic memory: code/doc chunks
    CodeContext,
}

impl SectionKind {
    /// All sections, priority order
    pub const PRIORITY: [SectionKind; 6] = [
        SectionKind::FocusHint,
        SectionKind::Heuristics,
        SectionKind::Learnings,
        SectionKind::DeadEnds,
        SectionKind::RecentConversation,
        SectionKind::CodeContext,
    ];

    pub fn header(&self) -> &'static str {
        match self {
            SectionKind::FocusHint => "## Focus",
            SectionKind::Heuristics => "## Heuristics",
            SectionKind::Learnings => "## Learnings",
            SectionKind::DeadEnds => "## Dead Ends",
            SectionKind::RecentConversation => "## Recent Conversation",
            SectionKind::CodeContext => "## Context",
        }
    }
}

/// One ranked item within a section
#[derive(Debug, Clone)]
pub struct SectionItem {
    pub text: String,
    pub score: f32,
}

impl SectionItem {
    pub fn new(text: impl Into<String>, score: f32) -> Self {
        Self {
            text: text.into(),
            score,
        }
    }
}

/// Retrieved content for one section, items already ranked best-first
#[derive(Debug, Clone)]
pub struct Section {
    pub kind: SectionKind,
    pub items: Vec<SectionItem>,
    /// Optional per-section word cap (sub-budget), on top of the global one
    pub max_tokens: Option<usize>,
}

impl Section {
    pub fn new(kind: SectionKind, items: Vec<SectionItem>) -> Self {
        Self {
            kind,
            items,
            max_tokens: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Retrieval bookkeeping surfaced with the assembled context
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalStats {
    pub learnings_considered: usize,
    pub episodes_considered: usize,
    pub turns_considered: usize,
    pub semantic_hits: usize,
    /// Categories that missed their deadline slice and degraded to empty
    pub categories_timed_out: usize,
}

/// The assembled, budget-compliant context
#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub text: String,
    /// Estimated tokens of `text`
    pub token_count: usize,
    pub sections_included: Vec<SectionKind>,
    /// Whether anything was dropped or shortened to fit
    pub truncated: bool,
    pub stats: RetrievalStats,
}

fn words(text: &str) -> usize {
    text.split_whitespace().count()
}

fn words_to_tokens(words: usize) -> usize {
    if words == 0 {
        0
    } else {
        ((words as f64) * 1.3).round().max(1.0) as usize
    }
}

/// Largest word count whose token estimate fits in `max_tokens`
fn tokens_to_words(max_tokens: usize) -> usize {
    ((max_tokens as f64) / 1.3).floor() as usize
}

/// Cut an item to at most `max_words` words (item-level truncation for
/// items too large to fit even alone)
fn truncate_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render sections into a single string under the budget ceiling.
///
/// The hard invariant: `estimate_tokens(result.text) <= budget.available()`.
pub fn render(budget: &TokenBudget, sections: Vec<Section>, stats: RetrievalStats) -> AssembledContext {
    let available_words = tokens_to_words(budget.available());
    let mut parts: Vec<String> = Vec::new();
    let mut used_words = 0usize;
    let mut included: Vec<SectionKind> = Vec::new();
    let mut truncated = false;

    // Fixed priority order regardless of input order
    let mut ordered = sections;
    ordered.sort_by_key(|s| {
        SectionKind::PRIORITY
            .iter()
            .position(|k| *k == s.kind)
            .unwrap_or(usize::MAX)
    });

    'sections: for section in ordered {
        if section.items.is_empty() {
            continue;
        }
        let header = section.kind.header();
        let header_words = words(header);
        let section_cap = section.max_tokens.map(tokens_to_words);

        if used_words + header_words >= available_words {
            // No room for even a header: this section and everything below
            // it is dropped whole
            truncated = true;
            break 'sections;
        }

        let mut section_parts: Vec<String> = vec![header.to_string()];
        let mut section_words = header_words;
        let mut emitted_items = 0usize;
        let mut global_exhausted = false;

        for item in &section.items {
            let item_words = words(&item.text);
            let over_global = used_words + section_words + item_words > available_words;
            let over_cap = section_cap
                .map(|cap| section_words + item_words > cap)
                .unwrap_or(false);

            if !over_global && !over_cap {
                section_parts.push(item.text.clone());
                section_words += item_words;
                emitted_items += 1;
                continue;
            }

            // The section's own sub-budget ran out: end this section,
            // lower-priority sections still get their chance
            if !over_global {
                truncated = true;
                break;
            }

            // Budget violation class (c): a single item too large to fit
            // even alone gets truncated at the item level
            if emitted_items == 0 {
                let room_global = available_words.saturating_sub(used_words + section_words);
                let room = section_cap
                    .map(|cap| room_global.min(cap.saturating_sub(section_words)))
                    .unwrap_or(room_global);
                if room > 3 {
                    section_parts.push(truncate_words(&item.text, room));
                    section_words += room;
                    emitted_items += 1;
                }
            }
            truncated = true;
            global_exhausted = true;
            break;
        }

        if emitted_items > 0 {
            parts.push(section_parts.join("\n"));
            used_words += section_words;
            included.push(section.kind);
        }

        // The global budget is gone: this section was shortened (or could
        // not start); every lower-priority section is dropped whole
        if global_exhausted {
            break 'sections;
        }
    }

    let text = parts.join("\n\n");
    debug_assert!(words_to_tokens(words(&text)) <= budget.available().max(1));

    AssembledContext {
        token_count: words_to_tokens(words(&text)),
        text,
        sections_included: included,
        truncated,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simulacrum_core::estimate_tokens;

    fn budget(total: usize, response: usize) -> TokenBudget {
        TokenBudget {
            total_tokens: total,
            response_tokens: response,
            ..Default::default()
        }
    }

    fn section(kind: SectionKind, items: &[&str]) -> Section {
        Section::new(
            kind,
            items
                .iter()
                .enumerate()
                .map(|(i, text)| SectionItem::new(*text, 1.0 - i as f32 * 0.1))
                .collect(),
        )
    }

    #[test]
    fn test_everything_fits() {
        let result = render(
            &budget(1000, 100),
            vec![
                section(SectionKind::Learnings, &["- I know: uses Redis"]),
                section(SectionKind::RecentConversation, &["User: hello there"]),
            ],
            RetrievalStats::default(),
        );
        assert!(!result.truncated);
        assert_eq!(result.sections_included.len(), 2);
        assert!(result.text.contains("## Learnings"));
        assert!(result.text.contains("## Recent Conversation"));
        assert!(estimate_tokens(&result.text) <= 900);
    }

    #[test]
    fn test_budget_never_exceeded() {
        let long_item = "word ".repeat(500);
        for total in [20usize, 50, 120, 400, 2000] {
            let b = budget(total, 10);
            let result = render(
                &b,
                vec![
                    section(SectionKind::Heuristics, &[&long_item, &long_item]),
                    section(SectionKind::Learnings, &[&long_item]),
                    section(SectionKind::RecentConversation, &[&long_item]),
                ],
                RetrievalStats::default(),
            );
            assert!(
                estimate_tokens(&result.text) <= b.available(),
                "budget {total}: {} > {}",
                estimate_tokens(&result.text),
                b.available()
            );
        }
    }

    #[test]
    fn test_lower_priority_dropped_before_higher_shortened() {
        // Learnings (higher priority) fills most of the budget; recent
        // conversation must be dropped entirely, not interleaved
        let filler = "learning entry with several words here ".repeat(10);
        let result = render(
            &budget(100, 20),
            vec![
                section(SectionKind::RecentConversation, &["User: something recent"]),
                section(SectionKind::Learnings, &[&filler, &filler]),
            ],
            RetrievalStats::default(),
        );
        assert!(result.truncated);
        assert!(result.sections_included.contains(&SectionKind::Learnings));
        assert!(!result
            .sections_included
            .contains(&SectionKind::RecentConversation));
    }

    #[test]
    fn test_oversize_single_item_truncated_not_dropped() {
        let huge = "word ".repeat(1000);
        let b = budget(60, 10);
        let result = render(
            &b,
            vec![section(SectionKind::Learnings, &[&huge])],
            RetrievalStats::default(),
        );
        assert!(result.truncated);
        assert_eq!(result.sections_included, vec![SectionKind::Learnings]);
        assert!(estimate_tokens(&result.text) <= b.available());
        // Something of the item made it in
        assert!(result.text.contains("word"));
    }

    #[test]
    fn test_sections_render_in_priority_order() {
        let result = render(
            &budget(1000, 100),
            vec![
                section(SectionKind::CodeContext, &["code chunk"]),
                section(SectionKind::FocusHint, &["working on tiering"]),
                section(SectionKind::DeadEnds, &["tried sync IO"]),
            ],
            RetrievalStats::default(),
        );
        let focus = result.text.find("## Focus").unwrap();
        let dead = result.text.find("## Dead Ends").unwrap();
        let code = result.text.find("## Context").unwrap();
        assert!(focus < dead && dead < code);
    }

    #[test]
    fn test_per_section_sub_budget() {
        let item = "exactly five words in here";
        let mut section = Section::new(
            SectionKind::RecentConversation,
            (0..20).map(|_| SectionItem::new(item, 1.0)).collect(),
        );
        section = section.with_max_tokens(30); // ~23 words

        let result = render(&budget(10_000, 100), vec![section], RetrievalStats::default());
        // Cap ~23 words minus header allows 4 items (20 words + header)
        let count = result.text.matches("exactly five words").count();
        assert!(count < 20);
        assert!(count >= 3);
    }

    #[test]
    fn test_empty_sections_skipped() {
        let result = render(
            &budget(1000, 100),
            vec![
                Section::new(SectionKind::Heuristics, vec![]),
                section(SectionKind::Learnings, &["- something"]),
            ],
            RetrievalStats::default(),
        );
        assert!(!result.text.contains("## Heuristics"));
        assert_eq!(result.sections_included, vec![SectionKind::Learnings]);
    }

    #[test]
    fn test_zero_budget_yields_empty() {
        let b = budget(10, 50); // available = 0
        let result = render(
            &b,
            vec![section(SectionKind::Learnings, &["- anything"])],
            RetrievalStats::default(),
        );
        assert!(result.text.is_empty());
        assert_eq!(result.token_count, 0);
    }
}
