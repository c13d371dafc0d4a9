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

//! Compact Turn Format (CTF) - lossy encoding for warm-tier summaries
//!
//! The asymmetry is explicit in the types: [`SummaryRecord`] is the full
//! input, [`CompactRecord`] is what comes back. `decode(encode(x))`
//! reconstructs the structurally significant fields (summary text,
//! truncated excerpt, content hash, chunk identity) but exact formatting
//! and whitespace are gone. Callers must not depend on byte-for-byte
//! round-trips, only on the semantic round-trip of the documented fields.

use simulacrum_core::{SimulacrumError, SimulacrumResult};

use crate::chunk::TurnRange;

const MAGIC: &str = "CTF1";

/// Full summary record for a chunk, the encoder input
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRecord {
    pub chunk_id: String,
    pub turn_range: TurnRange,
    /// Segment summary, arbitrary formatting
    pub summary: String,
    /// Representative excerpt of the chunk content, untruncated
    pub excerpt: String,
    /// Content hash of the chunk
    pub content_hash: String,
    pub themes: Vec<String>,
}

/// Lossy record reconstructed by the decoder.
///
/// `summary` is whitespace-normalized; `excerpt` is truncated to the
/// codec's configured target. Everything else survives intact.
#[derive(Debug, Clone, PartialEq)]
pub struct CompactRecord {
    pub chunk_id: String,
    pub turn_range: TurnRange,
    pub summary: String,
    pub excerpt: String,
    pub content_hash: String,
    pub themes: Vec<String>,
}

/// Codec for a batch of chunk summaries
#[derive(Debug, Clone)]
pub struct CtfCodec {
    /// Excerpts are cut to this many characters
    excerpt_chars: usize,
}

impl Default for CtfCodec {
    fn default() -> Self {
        Self::new(240)
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\n', "\\n")
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

impl CtfCodec {
    pub fn new(excerpt_chars: usize) -> Self {
        Self { excerpt_chars }
    }

    /// The documented one-way projection from full to compact
    pub fn project(&self, record: &SummaryRecord) -> CompactRecord {
        CompactRecord {
            chunk_id: record.chunk_id.clone(),
            turn_range: record.turn_range,
            summary: normalize_whitespace(&record.summary),
            excerpt: truncate_chars(&normalize_whitespace(&record.excerpt), self.excerpt_chars),
            content_hash: record.content_hash.clone(),
            themes: record.themes.clone(),
        }
    }

    /// Encode a batch of summaries into compact bytes
    pub fn encode(&self, records: &[SummaryRecord]) -> Vec<u8> {
        let mut out = String::new();
        out.push_str(MAGIC);
        out.push(' ');
        out.push_str(&records.len().to_string());
        out.push('\n');

        for record in records {
            let compact = self.project(record);
            out.push_str(&format!(
                "C {} {} {} {} {}\n",
                compact.chunk_id,
                compact.turn_range.start,
                compact.turn_range.end,
                compact.content_hash,
                compact.themes.len(),
            ));
            out.push_str(&format!("S {}\n", escape(&compact.summary)));
            out.push_str(&format!("X {}\n", escape(&compact.excerpt)));
            for theme in &compact.themes {
                out.push_str(&format!("T {}\n", escape(theme)));
            }
        }

        out.into_bytes()
    }

    /// Decode compact bytes back into records
    pub fn decode(data: &[u8]) -> SimulacrumResult<Vec<CompactRecord>> {
        let text = std::str::from_utf8(data)
            .map_err(|e| SimulacrumError::Consistency(format!("CTF is not UTF-8: {e}")))?;
        let mut lines = text.lines();

        let header = lines
            .next()
            .ok_or_else(|| SimulacrumError::Consistency("empty CTF payload".to_string()))?;
        let mut header_parts = header.split(' ');
        if header_parts.next() != Some(MAGIC) {
            return Err(SimulacrumError::Consistency(format!(
                "bad CTF magic in header: {header:?}"
            )));
        }
        let count: usize = header_parts
            .next()
            .and_then(|c| c.parse().ok())
            .ok_or_else(|| SimulacrumError::Consistency("bad CTF record count".to_string()))?;

        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            let chunk_line = lines.next().ok_or_else(|| {
                SimulacrumError::Consistency("truncated CTF: missing chunk line".to_string())
            })?;
            let rest = chunk_line.strip_prefix("C ").ok_or_else(|| {
                SimulacrumError::Consistency(format!("bad CTF chunk line: {chunk_line:?}"))
            })?;
            let fields: Vec<&str> = rest.split(' ').collect();
            if fields.len() != 5 {
                return Err(SimulacrumError::Consistency(format!(
                    "bad CTF chunk line fields: {chunk_line:?}"
                )));
            }
            let parse_usize = |s: &str| {
                s.parse::<usize>().map_err(|_| {
                    SimulacrumError::Consistency(format!("bad CTF number: {s:?}"))
                })
            };
            let start = parse_usize(fields[1])?;
            let end = parse_usize(fields[2])?;
            let theme_count = parse_usize(fields[4])?;

            let summary_line = lines.next().ok_or_else(|| {
                SimulacrumError::Consistency("truncated CTF: missing summary".to_string())
            })?;
            let summary = unescape(summary_line.strip_prefix("S ").unwrap_or_else(|| {
                summary_line.strip_prefix('S').unwrap_or(summary_line)
            }));

            let excerpt_line = lines.next().ok_or_else(|| {
                SimulacrumError::Consistency("truncated CTF: missing excerpt".to_string())
            })?;
            let excerpt = unescape(excerpt_line.strip_prefix("X ").unwrap_or_else(|| {
                excerpt_line.strip_prefix('X').unwrap_or(excerpt_line)
            }));

            let mut themes = Vec::with_capacity(theme_count);
            for _ in 0..theme_count {
                let theme_line = lines.next().ok_or_else(|| {
                    SimulacrumError::Consistency("truncated CTF: missing theme".to_string())
                })?;
                let theme = theme_line.strip_prefix("T ").ok_or_else(|| {
                    SimulacrumError::Consistency(format!("bad CTF theme line: {theme_line:?}"))
                })?;
                themes.push(unescape(theme));
            }

            records.push(CompactRecord {
                chunk_id: fields[0].to_string(),
                turn_range: TurnRange::new(start, end),
                summary,
                excerpt,
                content_hash: fields[3].to_string(),
                themes,
            });
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(summary: &str, excerpt: &str) -> SummaryRecord {
        SummaryRecord {
            chunk_id: "chunk_0_9_abc".to_string(),
            turn_range: TurnRange::new(0, 9),
            summary: summary.to_string(),
            excerpt: excerpt.to_string(),
            content_hash: "deadbeef".to_string(),
            themes: vec!["caching".to_string(), "limits".to_string()],
        }
    }

    #[test]
    fn test_semantic_round_trip() {
        let codec = CtfCodec::new(50);
        let records = vec![
            record("Discussed   cache\nlimits", "User asked about caching."),
            record("Second summary", "Another excerpt"),
        ];

        let decoded = CtfCodec::decode(&codec.encode(&records)).unwrap();
        assert_eq!(decoded.len(), 2);

        for (original, compact) in records.iter().zip(&decoded) {
            assert_eq!(compact, &codec.project(original));
            assert_eq!(compact.chunk_id, original.chunk_id);
            assert_eq!(compact.content_hash, original.content_hash);
            assert_eq!(compact.turn_range, original.turn_range);
            assert_eq!(compact.themes, original.themes);
        }

        // Whitespace is explicitly not preserved
        assert_eq!(decoded[0].summary, "Discussed cache limits");
    }

    #[test]
    fn test_excerpt_truncated_to_target() {
        let codec = CtfCodec::new(10);
        let records = vec![record("s", "a very long excerpt that will be cut")];
        let decoded = CtfCodec::decode(&codec.encode(&records)).unwrap();
        assert_eq!(decoded[0].excerpt.chars().count(), 10);
    }

    #[test]
    fn test_newlines_survive_escaping() {
        let codec = CtfCodec::default();
        // Backslashes in content must not corrupt framing
        let records = vec![record("path C:\\data", "line")];
        let decoded = CtfCodec::decode(&codec.encode(&records)).unwrap();
        assert_eq!(decoded[0].summary, "path C:\\data");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(CtfCodec::decode(b"").is_err());
        assert!(CtfCodec::decode(b"NOPE 1\n").is_err());
        assert!(CtfCodec::decode(b"CTF1 1\nC incomplete\n").is_err());
    }

    #[test]
    fn test_empty_batch() {
        let codec = CtfCodec::default();
        let decoded = CtfCodec::decode(&codec.encode(&[])).unwrap();
        assert!(decoded.is_empty());
    }

    proptest! {
        #[test]
        fn prop_round_trip_preserves_documented_fields(
            summary in ".{0,200}",
            excerpt in ".{0,400}",
            hash in "[a-f0-9]{8,32}",
        ) {
            let codec = CtfCodec::new(100);
            let input = SummaryRecord {
                chunk_id: "c1".to_string(),
                turn_range: TurnRange::new(3, 7),
                summary,
                excerpt,
                content_hash: hash,
                themes: vec![],
            };
            let decoded = CtfCodec::decode(&codec.encode(std::slice::from_ref(&input))).unwrap();
            prop_assert_eq!(&decoded[0], &codec.project(&input));
        }
    }
}
