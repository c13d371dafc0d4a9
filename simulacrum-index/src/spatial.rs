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

//! Spatial context: WHERE a piece of content came from
//!
//! Matching semantics: every configured constraint that fails is a hard
//! reject (score 0.0), not a soft penalty. The single exception is the
//! heading-level constraint, which penalizes by distance instead.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Position a memory node was extracted from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpatialContext {
    /// A file location, optionally with line and section path
    File {
        path: String,
        line: Option<u32>,
        /// Heading path from document root, e.g. ["API", "Limitations"]
        section_path: Vec<String>,
    },
    /// A code location
    Code {
        module: String,
        class: Option<String>,
        function: Option<String>,
    },
    /// A web resource
    Url { url: String },
}

/// Spatial constraints for a query. All fields optional; an unset field
/// does not constrain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpatialQuery {
    /// Glob pattern the file path must match (hard)
    pub file_pattern: Option<String>,
    /// Substring the joined section path must contain, case-insensitive (hard)
    pub section_contains: Option<String>,
    /// Prefix the module path must start with (hard)
    pub module_prefix: Option<String>,
    /// Exact class name (hard)
    pub class_name: Option<String>,
    /// Exact function name (hard)
    pub function_name: Option<String>,
    /// Substring the URL must contain (hard)
    pub url_contains: Option<String>,
    /// Preferred heading depth (soft: penalized by distance)
    pub heading_level: Option<usize>,
}

impl SpatialQuery {
    /// Does this query constrain anything?
    pub fn has_constraints(&self) -> bool {
        self.file_pattern.is_some()
            || self.section_contains.is_some()
            || self.module_prefix.is_some()
            || self.class_name.is_some()
            || self.function_name.is_some()
            || self.url_contains.is_some()
            || self.heading_level.is_some()
    }
}

/// Translate a glob pattern to an anchored regex.
///
/// `**` crosses path separators, `*` does not, `?` matches one character.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut regex = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    // Swallow a following separator so "a/**/b" matches "a/b"
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        regex.push_str("(?:.*/)?");
                    } else {
                        regex.push_str(".*");
                    }
                } else {
                    regex.push_str("[^/]*");
                }
            }
            '?' => regex.push('.'),
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
    }
    regex.push('$');
    Regex::new(&regex).ok()
}

/// Score a spatial context against a query.
///
/// Returns 0.0 on any failed hard constraint; heading level is soft.
/// A query with no constraints scores 1.0.
pub fn spatial_match(context: &SpatialContext, query: &SpatialQuery) -> f32 {
    let mut score = 1.0f32;

    if let Some(pattern) = &query.file_pattern {
        let SpatialContext::File { path, .. } = context else {
            return 0.0;
        };
        match glob_to_regex(pattern) {
            Some(re) if re.is_match(path) => {}
            _ => return 0.0,
        }
    }

    if let Some(needle) = &query.section_contains {
        let SpatialContext::File { section_path, .. } = context else {
            return 0.0;
        };
        let joined = section_path.join(" > ").to_lowercase();
        if !joined.contains(&needle.to_lowercase()) {
            return 0.0;
        }
    }

    if let Some(prefix) = &query.module_prefix {
        let SpatialContext::Code { module, .. } = context else {
            return 0.0;
        };
        if !module.starts_with(prefix.as_str()) {
            return 0.0;
        }
    }

    if let Some(class_name) = &query.class_name {
        let SpatialContext::Code { class, .. } = context else {
            return 0.0;
        };
        if class.as_deref() != Some(class_name.as_str()) {
            return 0.0;
        }
    }

    if let Some(function_name) = &query.function_name {
        let SpatialContext::Code { function, .. } = context else {
            return 0.0;
        };
        if function.as_deref() != Some(function_name.as_str()) {
            return 0.0;
        }
    }

    if let Some(needle) = &query.url_contains {
        let SpatialContext::Url { url } = context else {
            return 0.0;
        };
        if !url.to_lowercase().contains(&needle.to_lowercase()) {
            return 0.0;
        }
    }

    // Soft constraint: prefer content at the requested heading depth
    if let Some(level) = query.heading_level {
        if let SpatialContext::File { section_path, .. } = context {
            let distance = section_path.len().abs_diff(level);
            score *= (1.0 - 0.15 * distance as f32).max(0.3);
        }
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_context(path: &str, sections: &[&str]) -> SpatialContext {
        SpatialContext::File {
            path: path.to_string(),
            line: None,
            section_path: sections.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_hard_reject_on_file_pattern() {
        let context = file_context("src/a.py", &[]);
        let query = SpatialQuery {
            file_pattern: Some("docs/*.md".to_string()),
            ..Default::default()
        };
        assert_eq!(spatial_match(&context, &query), 0.0);
    }

    #[test]
    fn test_glob_matching() {
        let query = SpatialQuery {
            file_pattern: Some("src/**/*.rs".to_string()),
            ..Default::default()
        };
        assert!(spatial_match(&file_context("src/index/vector.rs", &[]), &query) > 0.0);
        assert!(spatial_match(&file_context("src/lib.rs", &[]), &query) > 0.0);
        assert_eq!(spatial_match(&file_context("tests/lib.rs", &[]), &query), 0.0);

        let single_star = SpatialQuery {
            file_pattern: Some("src/*.rs".to_string()),
            ..Default::default()
        };
        assert_eq!(
            spatial_match(&file_context("src/nested/lib.rs", &[]), &single_star),
            0.0
        );
    }

    #[test]
    fn test_section_containment() {
        let context = file_context("docs/api.md", &["API", "Rate Limits"]);
        let hit = SpatialQuery {
            section_contains: Some("rate limits".to_string()),
            ..Default::default()
        };
        let miss = SpatialQuery {
            section_contains: Some("Authentication".to_string()),
            ..Default::default()
        };
        assert_eq!(spatial_match(&context, &hit), 1.0);
        assert_eq!(spatial_match(&context, &miss), 0.0);
    }

    #[test]
    fn test_code_constraints() {
        let context = SpatialContext::Code {
            module: "simulacrum.memory".to_string(),
            class: Some("ChunkManager".to_string()),
            function: Some("consolidate".to_string()),
        };

        let query = SpatialQuery {
            module_prefix: Some("simulacrum".to_string()),
            class_name: Some("ChunkManager".to_string()),
            function_name: Some("consolidate".to_string()),
            ..Default::default()
        };
        assert_eq!(spatial_match(&context, &query), 1.0);

        let wrong_class = SpatialQuery {
            class_name: Some("TierManager".to_string()),
            ..Default::default()
        };
        assert_eq!(spatial_match(&context, &wrong_class), 0.0);
    }

    #[test]
    fn test_kind_mismatch_is_hard_reject() {
        let code = SpatialContext::Code {
            module: "m".to_string(),
            class: None,
            function: None,
        };
        let file_query = SpatialQuery {
            file_pattern: Some("*.py".to_string()),
            ..Default::default()
        };
        assert_eq!(spatial_match(&code, &file_query), 0.0);
    }

    #[test]
    fn test_heading_level_is_soft() {
        let context = file_context("docs/guide.md", &["Setup", "Install", "Linux"]);
        let query = SpatialQuery {
            heading_level: Some(1),
            ..Default::default()
        };
        let score = spatial_match(&context, &query);
        assert!(score > 0.0 && score < 1.0);
    }

    #[test]
    fn test_unconstrained_query_scores_one() {
        let context = file_context("src/a.py", &[]);
        assert_eq!(spatial_match(&context, &SpatialQuery::default()), 1.0);
    }
}
