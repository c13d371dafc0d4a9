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

//! Document hierarchy: structural positions and trees
//!
//! Same hard/soft split as spatial matching: document and heading
//! containment constraints are hard, depth preference is soft.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(#{1,6})\s+(.+?)\s*$").expect("static heading regex"));

/// A node's position within a document hierarchy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralPosition {
    /// Document this position belongs to
    pub doc_path: String,
    /// Heading titles from the document root down to this position
    pub heading_path: Vec<String>,
}

impl StructuralPosition {
    pub fn new(doc_path: impl Into<String>, heading_path: Vec<String>) -> Self {
        Self {
            doc_path: doc_path.into(),
            heading_path,
        }
    }

    /// Depth in the hierarchy (number of enclosing headings)
    pub fn depth(&self) -> usize {
        self.heading_path.len()
    }
}

/// Structural constraints for a query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuralQuery {
    /// Exact document path (hard)
    pub doc_path: Option<String>,
    /// Heading the position must be under, case-insensitive (hard)
    pub under_heading: Option<String>,
    /// Preferred depth (soft: penalized by distance)
    pub max_depth: Option<usize>,
}

impl StructuralQuery {
    pub fn has_constraints(&self) -> bool {
        self.doc_path.is_some() || self.under_heading.is_some() || self.max_depth.is_some()
    }
}

/// Score a structural position against a query
pub fn structural_match(position: &StructuralPosition, query: &StructuralQuery) -> f32 {
    if let Some(doc_path) = &query.doc_path {
        if &position.doc_path != doc_path {
            return 0.0;
        }
    }

    if let Some(heading) = &query.under_heading {
        let needle = heading.to_lowercase();
        let contained = position
            .heading_path
            .iter()
            .any(|h| h.to_lowercase() == needle);
        if !contained {
            return 0.0;
        }
    }

    let mut score = 1.0f32;
    if let Some(max_depth) = query.max_depth {
        if position.depth() > max_depth {
            let over = position.depth() - max_depth;
            score *= (1.0 - 0.2 * over as f32).max(0.2);
        }
    }
    score
}

/// A heading in a parsed document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heading {
    pub title: String,
    pub level: usize,
    /// Byte offset of the heading line in the source
    pub offset: usize,
}

/// Flat outline of a markdown-style document.
///
/// Enough structure to assign a heading path to any offset; a full nested
/// tree is not needed for retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentTree {
    pub doc_path: String,
    pub headings: Vec<Heading>,
}

impl DocumentTree {
    /// Parse headings out of markdown-style content
    pub fn parse(doc_path: impl Into<String>, content: &str) -> Self {
        let headings = HEADING_RE
            .captures_iter(content)
            .map(|cap| Heading {
                title: cap[2].to_string(),
                level: cap[1].len(),
                offset: cap.get(0).map(|m| m.start()).unwrap_or(0),
            })
            .collect();
        Self {
            doc_path: doc_path.into(),
            headings,
        }
    }

    /// Heading path enclosing a byte offset
    pub fn heading_path_at(&self, offset: usize) -> Vec<String> {
        let mut stack: Vec<&Heading> = Vec::new();
        for heading in &self.headings {
            if heading.offset > offset {
                break;
            }
            while stack
                .last()
                .map(|top| top.level >= heading.level)
                .unwrap_or(false)
            {
                stack.pop();
            }
            stack.push(heading);
        }
        stack.iter().map(|h| h.title.clone()).collect()
    }

    /// Structural position for content at a byte offset
    pub fn position_at(&self, offset: usize) -> StructuralPosition {
        StructuralPosition::new(self.doc_path.clone(), self.heading_path_at(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "\
# Guide

intro text

## Setup

setup text

### Linux

linux text

## Usage

usage text
";

    #[test]
    fn test_parse_headings() {
        let tree = DocumentTree::parse("guide.md", DOC);
        let titles: Vec<&str> = tree.headings.iter().map(|h| h.title.as_str()).collect();
        assert_eq!(titles, vec!["Guide", "Setup", "Linux", "Usage"]);
        assert_eq!(tree.headings[2].level, 3);
    }

    #[test]
    fn test_heading_path_at_offset() {
        let tree = DocumentTree::parse("guide.md", DOC);
        let linux_offset = DOC.find("linux text").unwrap();
        assert_eq!(
            tree.heading_path_at(linux_offset),
            vec!["Guide", "Setup", "Linux"]
        );

        let usage_offset = DOC.find("usage text").unwrap();
        assert_eq!(tree.heading_path_at(usage_offset), vec!["Guide", "Usage"]);
    }

    #[test]
    fn test_structural_hard_constraints() {
        let position = StructuralPosition::new("guide.md", vec![
            "Guide".to_string(),
            "Setup".to_string(),
        ]);

        let under = StructuralQuery {
            under_heading: Some("setup".to_string()),
            ..Default::default()
        };
        assert_eq!(structural_match(&position, &under), 1.0);

        let wrong_doc = StructuralQuery {
            doc_path: Some("other.md".to_string()),
            ..Default::default()
        };
        assert_eq!(structural_match(&position, &wrong_doc), 0.0);

        let wrong_heading = StructuralQuery {
            under_heading: Some("Usage".to_string()),
            ..Default::default()
        };
        assert_eq!(structural_match(&position, &wrong_heading), 0.0);
    }

    #[test]
    fn test_depth_is_soft() {
        let deep = StructuralPosition::new(
            "guide.md",
            vec!["a".into(), "b".into(), "c".into(), "d".into()],
        );
        let query = StructuralQuery {
            max_depth: Some(2),
            ..Default::default()
        };
        let score = structural_match(&deep, &query);
        assert!(score > 0.0 && score < 1.0);
    }
}
