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

//! Chunk manager - the HOT/WARM/COLD tiering state machine
//!
//! Turns accumulate into HOT chunks; when more than the configured number
//! of HOT chunks exist, the oldest are summarized and demoted to WARM
//! (CTF-encoded, embedded); when enough WARM chunks accumulate, they are
//! consolidated into a single COLD macro-chunk and their full content is
//! archived to disk.
//!
//! Tier transitions run only inside [`consolidate`](ChunkManager::consolidate),
//! an explicit, externally-triggered pass that processes chunks oldest
//! first and reports what moved. If summarization or persistence fails for
//! a chunk, it simply stays HOT and is retried on the next pass; the turns
//! themselves always survive in the DAG.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use simulacrum_core::{ChunkConfig, EmbeddingProvider, SimulacrumError, SimulacrumResult, Turn};
use simulacrum_index::vector::cosine_similarity;
use tracing::{debug, info, warn};

use crate::chunk::{Chunk, ChunkId, ChunkTier, TurnRange};
use crate::ctf::{CompactRecord, CtfCodec, SummaryRecord};
use crate::summarizer::Summarizer;

const HOT_DIR: &str = "hot";
const WARM_DIR: &str = "warm";
const COLD_DIR: &str = "cold";
const ARCHIVE_DIR: &str = "archive";

/// What a tier-transition pass moved
#[derive(Debug, Clone, Default)]
pub struct ConsolidationReport {
    /// Chunks demoted HOT -> WARM
    pub hot_to_warm: Vec<ChunkId>,
    /// Constituent chunks moved WARM -> COLD
    pub warm_to_cold: Vec<ChunkId>,
    /// New COLD macro-chunks created
    pub macro_chunks: Vec<ChunkId>,
    /// Chunks whose demotion failed and remain in place
    pub failures: usize,
}

impl ConsolidationReport {
    pub fn is_empty(&self) -> bool {
        self.hot_to_warm.is_empty() && self.macro_chunks.is_empty() && self.failures == 0
    }
}

/// Content recovered from a chunk, at whatever fidelity its tier allows
#[derive(Debug, Clone)]
pub enum ExpandedContent {
    /// Full turns (HOT chunks, or COLD chunks via their archive blob)
    Full(Vec<Turn>),
    /// Lossy compact records (WARM chunks, decoded from CTF)
    Compact(Vec<CompactRecord>),
    /// Only the summary survives
    SummaryOnly(String),
}

/// Chunk storage statistics
#[derive(Debug, Clone)]
pub struct ChunkStats {
    pub total_chunks: usize,
    pub hot_chunks: usize,
    pub warm_chunks: usize,
    pub cold_chunks: usize,
    pub macro_chunks: usize,
    pub total_turns: usize,
    pub pending_turns: usize,
    pub hot_tokens: usize,
}

/// Orchestrates the lifecycle of conversation chunks across tiers
pub struct ChunkManager {
    base_path: PathBuf,
    config: ChunkConfig,
    summarizer: Summarizer,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    codec: CtfCodec,
    chunks: HashMap<String, Chunk>,
    turn_count: usize,
    pending: Vec<Turn>,
}

impl std::fmt::Debug for ChunkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkManager")
            .field("base_path", &self.base_path)
            .field("chunks", &self.chunks.len())
            .field("turn_count", &self.turn_count)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl ChunkManager {
    /// Create a manager rooted at `base_path`, loading any existing chunks
    pub fn new(
        base_path: impl Into<PathBuf>,
        config: ChunkConfig,
        summarizer: Summarizer,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> SimulacrumResult<Self> {
        let base_path = base_path.into();
        for dir in [HOT_DIR, WARM_DIR, COLD_DIR, ARCHIVE_DIR] {
            std::fs::create_dir_all(base_path.join(dir))?;
        }

        let mut manager = Self {
            base_path,
            config,
            summarizer,
            embedder,
            codec: CtfCodec::default(),
            chunks: HashMap::new(),
            turn_count: 0,
            pending: Vec::new(),
        };
        manager.codec = CtfCodec::new(manager.config.ctf_excerpt_chars);
        manager.load_existing()?;
        Ok(manager)
    }

    fn load_existing(&mut self) -> SimulacrumResult<()> {
        for dir in [HOT_DIR, WARM_DIR, COLD_DIR] {
            let tier_path = self.base_path.join(dir);
            for entry in std::fs::read_dir(&tier_path)? {
                let path = entry?.path();
                if path.extension().map(|e| e == "json").unwrap_or(false) {
                    match self.load_chunk_file(&path) {
                        Ok(chunk) => {
                            if chunk.turn_range.end + 1 > self.turn_count {
                                self.turn_count = chunk.turn_range.end + 1;
                            }
                            self.chunks.insert(chunk.id.0.clone(), chunk);
                        }
                        Err(e) => {
                            // Consistency error: skip the record, keep the rest usable
                            warn!(path = %path.display(), error = %e, "Skipping malformed chunk file");
                        }
                    }
                }
            }
        }
        debug!(chunks = self.chunks.len(), turns = self.turn_count, "Loaded chunk store");
        Ok(())
    }

    fn load_chunk_file(&self, path: &Path) -> SimulacrumResult<Chunk> {
        let content = std::fs::read_to_string(path)?;
        let mut chunk: Chunk = serde_json::from_str(&content)?;
        if chunk.tier == ChunkTier::Warm {
            let ctf_path = path.with_extension("ctf");
            if ctf_path.exists() {
                chunk.ctf = Some(std::fs::read(&ctf_path)?);
            }
        }
        Ok(chunk)
    }

    /// Number of turns ever bucketed (pending included)
    pub fn turn_count(&self) -> usize {
        self.turn_count
    }

    /// Turns waiting for the current HOT chunk to fill
    pub fn pending_turns(&self) -> &[Turn] {
        &self.pending
    }

    /// Feed one turn into the active HOT window.
    ///
    /// Pure in-memory bookkeeping plus one metadata write when a chunk
    /// seals; never suspends. Returns the sealed chunk's ID if this turn
    /// completed one.
    pub fn add_turn(&mut self, turn: Turn) -> SimulacrumResult<Option<ChunkId>> {
        self.pending.push(turn);
        self.turn_count += 1;

        if self.pending.len() < self.config.hot_chunk_turns {
            return Ok(None);
        }

        let turns = std::mem::take(&mut self.pending);
        let start = self.turn_count - turns.len();
        let end = self.turn_count - 1;
        let chunk = Chunk::hot(TurnRange::new(start, end), turns);
        let id = chunk.id.clone();

        self.save_chunk(&chunk)?;
        self.chunks.insert(id.0.clone(), chunk);
        debug!(chunk = %id, start, end, "Sealed HOT chunk");
        Ok(Some(id))
    }

    /// Run one tier-transition pass: demote surplus HOT chunks to WARM,
    /// then consolidate accumulated WARM chunks into COLD macro-chunks.
    /// Chunks are processed in turn-index order, oldest first.
    ///
    /// `turn_lookup` supplies full turns by ID for archiving; the DAG
    /// retains every turn, so archiving never depends on chunk state.
    pub async fn consolidate(
        &mut self,
        turn_lookup: &HashMap<String, Turn>,
    ) -> SimulacrumResult<ConsolidationReport> {
        let mut report = ConsolidationReport::default();

        // Phase 1: HOT -> WARM, oldest first, keeping the recency window
        let mut hot: Vec<(usize, String)> = self
            .chunks
            .values()
            .filter(|c| c.tier == ChunkTier::Hot)
            .map(|c| (c.turn_range.start, c.id.0.clone()))
            .collect();
        hot.sort();
        while hot.len() > self.config.hot_chunks {
            let (_, id) = hot.remove(0);
            match self.demote_to_warm(&id).await {
                Ok(()) => report.hot_to_warm.push(ChunkId(id)),
                Err(e @ SimulacrumError::Capacity(_)) => return Err(e),
                Err(e) => {
                    // Chunk stays HOT; retried on the next pass
                    warn!(chunk = %id, error = %e, "Demotion failed; chunk remains HOT");
                    report.failures += 1;
                }
            }
        }

        // Phase 2: WARM -> COLD consolidation, oldest first
        loop {
            let mut warm: Vec<(usize, String)> = self
                .chunks
                .values()
                .filter(|c| c.tier == ChunkTier::Warm && !c.is_consolidated())
                .map(|c| (c.turn_range.start, c.id.0.clone()))
                .collect();
            if warm.len() < self.config.warm_consolidation_chunks {
                break;
            }
            warm.sort();
            let batch: Vec<String> = warm
                .into_iter()
                .take(self.config.warm_consolidation_chunks)
                .map(|(_, id)| id)
                .collect();

            let macro_id = self.consolidate_macro(&batch, turn_lookup).await?;
            report
                .warm_to_cold
                .extend(batch.into_iter().map(ChunkId));
            report.macro_chunks.push(macro_id);
        }

        if !report.is_empty() {
            info!(
                demoted = report.hot_to_warm.len(),
                consolidated = report.warm_to_cold.len(),
                macros = report.macro_chunks.len(),
                failures = report.failures,
                "Consolidation pass complete"
            );
        }
        Ok(report)
    }

    /// Demote a HOT chunk to WARM: summarize, extract facts, embed,
    /// CTF-encode, then drop the in-memory turns.
    async fn demote_to_warm(&mut self, chunk_id: &str) -> SimulacrumResult<()> {
        let Some(chunk) = self.chunks.get(chunk_id).cloned() else {
            return Err(SimulacrumError::NotFound(chunk_id.to_string()));
        };
        let Some(turns) = chunk.turns.clone() else {
            return Ok(()); // already demoted
        };

        let summary = if self.config.auto_summarize {
            self.summarizer.summarize_turns(&turns).await
        } else {
            String::new()
        };

        let key_facts = if self.config.auto_extract_facts {
            self.summarizer.extract_facts(&turns).await
        } else {
            Vec::new()
        };

        let embedding = if self.config.auto_embed {
            self.embed_text(if summary.is_empty() {
                chunk_text(&turns)
            } else {
                summary.clone()
            })
            .await
        } else {
            None
        };

        let record = SummaryRecord {
            chunk_id: chunk_id.to_string(),
            turn_range: chunk.turn_range,
            summary: summary.clone(),
            excerpt: chunk_text(&turns),
            content_hash: chunk.content_hash.clone(),
            themes: Vec::new(),
        };
        let ctf = self.codec.encode(std::slice::from_ref(&record));

        // Persist the summary durably before dropping content from memory
        let mut warm = chunk;
        warm.tier = ChunkTier::Warm;
        warm.summary = summary;
        warm.key_facts = key_facts;
        warm.embedding = embedding;
        warm.ctf = Some(ctf);
        warm.turns = None;
        self.save_chunk(&warm)?;
        self.remove_chunk_file(ChunkTier::Hot, chunk_id);

        self.chunks.insert(chunk_id.to_string(), warm);
        Ok(())
    }

    /// Consolidate a batch of WARM chunks into one COLD macro-chunk,
    /// archiving each constituent's full content.
    async fn consolidate_macro(
        &mut self,
        batch: &[String],
        turn_lookup: &HashMap<String, Turn>,
    ) -> SimulacrumResult<ChunkId> {
        let mut children: Vec<Chunk> = batch
            .iter()
            .filter_map(|id| self.chunks.get(id).cloned())
            .collect();
        children.sort_by_key(|c| c.turn_range.start);

        let summaries: Vec<String> = children
            .iter()
            .map(|c| c.summary.clone())
            .filter(|s| !s.is_empty())
            .collect();
        let exec_summary = self.summarizer.executive_summary(&summaries).await;
        let themes = self.summarizer.extract_themes(&summaries).await;

        let mut key_facts: Vec<String> = Vec::new();
        for child in &children {
            for fact in &child.key_facts {
                if !key_facts.contains(fact) {
                    key_facts.push(fact.clone());
                }
            }
        }

        // Archive constituents and advance them to COLD
        for child in &mut children {
            let archive_ref = if self.config.archive_cold_content {
                Some(self.archive_chunk(child, turn_lookup)?)
            } else {
                None
            };
            child.tier = ChunkTier::Cold;
            child.archive_ref = archive_ref;
            child.ctf = None;
        }

        let start = children.first().map(|c| c.turn_range.start).unwrap_or(0);
        let end = children.last().map(|c| c.turn_range.end).unwrap_or(0);
        let turn_ids: Vec<_> = children.iter().flat_map(|c| c.turn_ids.clone()).collect();
        let content_hash = Chunk::hash_turn_ids(&turn_ids);

        let macro_chunk = Chunk {
            id: ChunkId(format!("macro_{}_{}_{}", start, end, &content_hash[..12])),
            tier: ChunkTier::Cold,
            turn_range: TurnRange::new(start, end),
            turn_ids,
            turns: None,
            summary: exec_summary,
            key_facts,
            themes,
            embedding: None,
            content_hash,
            token_count: children.iter().map(|c| c.token_count).sum(),
            timestamp_start: children
                .first()
                .map(|c| c.timestamp_start)
                .unwrap_or_else(chrono::Utc::now),
            timestamp_end: children
                .last()
                .map(|c| c.timestamp_end)
                .unwrap_or_else(chrono::Utc::now),
            ctf: None,
            archive_ref: None,
            parent_chunk_id: None,
            child_chunk_ids: children.iter().map(|c| c.id.clone()).collect(),
        };
        let macro_id = macro_chunk.id.clone();

        self.save_chunk(&macro_chunk)?;
        for mut child in children {
            child.parent_chunk_id = Some(macro_id.clone());
            self.save_chunk(&child)?;
            self.remove_chunk_file(ChunkTier::Warm, &child.id.0);
            self.chunks.insert(child.id.0.clone(), child);
        }
        self.chunks.insert(macro_id.0.clone(), macro_chunk);

        Ok(macro_id)
    }

    /// Compress and write a chunk's full content to the archive.
    /// Write failures here risk silent data loss and surface as Capacity.
    fn archive_chunk(
        &self,
        chunk: &Chunk,
        turn_lookup: &HashMap<String, Turn>,
    ) -> SimulacrumResult<String> {
        let turns: Vec<&Turn> = chunk
            .turn_ids
            .iter()
            .filter_map(|id| turn_lookup.get(&id.0))
            .collect();
        if turns.len() < chunk.turn_ids.len() {
            warn!(
                chunk = %chunk.id,
                missing = chunk.turn_ids.len() - turns.len(),
                "Some turns missing from lookup while archiving"
            );
        }

        let archive_ref = format!("{}.json.gz", chunk.id);
        let archive_path = self.base_path.join(ARCHIVE_DIR).join(&archive_ref);
        let write = || -> SimulacrumResult<()> {
            let json = serde_json::to_vec(&turns)?;
            let file = std::fs::File::create(&archive_path)?;
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder.write_all(&json)?;
            encoder.finish()?;
            Ok(())
        };
        write().map_err(|e| {
            SimulacrumError::Capacity(format!("cannot write archive {archive_ref}: {e}"))
        })?;
        Ok(archive_ref)
    }

    /// Recover a chunk's content at its tier's fidelity
    pub fn expand_chunk(&self, chunk_id: &ChunkId) -> SimulacrumResult<ExpandedContent> {
        let chunk = self
            .chunks
            .get(&chunk_id.0)
            .ok_or_else(|| SimulacrumError::NotFound(chunk_id.0.clone()))?;

        if let Some(turns) = &chunk.turns {
            return Ok(ExpandedContent::Full(turns.clone()));
        }
        if let Some(ctf) = &chunk.ctf {
            return Ok(ExpandedContent::Compact(CtfCodec::decode(ctf)?));
        }
        if let Some(archive_ref) = &chunk.archive_ref {
            return Ok(ExpandedContent::Full(self.load_archive(archive_ref)?));
        }
        Ok(ExpandedContent::SummaryOnly(chunk.summary.clone()))
    }

    fn load_archive(&self, archive_ref: &str) -> SimulacrumResult<Vec<Turn>> {
        let path = self.base_path.join(ARCHIVE_DIR).join(archive_ref);
        let file = std::fs::File::open(&path)?;
        let mut decoder = GzDecoder::new(file);
        let mut json = Vec::new();
        decoder.read_to_end(&mut json).map_err(|e| {
            SimulacrumError::Consistency(format!("unreadable archive {archive_ref}: {e}"))
        })?;
        serde_json::from_slice(&json).map_err(|e| {
            SimulacrumError::Consistency(format!("unparseable archive {archive_ref}: {e}"))
        })
    }

    /// The only sanctioned tier reversal: restore a chunk's full turns
    /// into memory, returning it to HOT.
    pub fn force_refresh(
        &mut self,
        chunk_id: &ChunkId,
        turn_lookup: &HashMap<String, Turn>,
    ) -> SimulacrumResult<()> {
        let chunk = self
            .chunks
            .get(&chunk_id.0)
            .cloned()
            .ok_or_else(|| SimulacrumError::NotFound(chunk_id.0.clone()))?;
        let previous_tier = chunk.tier;

        let turns: Vec<Turn> = if let Some(archive_ref) = &chunk.archive_ref {
            self.load_archive(archive_ref)?
        } else {
            let found: Vec<Turn> = chunk
                .turn_ids
                .iter()
                .filter_map(|id| turn_lookup.get(&id.0).cloned())
                .collect();
            if found.len() != chunk.turn_ids.len() {
                return Err(SimulacrumError::Consistency(format!(
                    "cannot refresh {chunk_id}: turns missing from lookup"
                )));
            }
            found
        };

        let mut refreshed = chunk;
        refreshed.tier = ChunkTier::Hot;
        refreshed.turns = Some(turns);
        refreshed.ctf = None;
        self.save_chunk(&refreshed)?;
        self.remove_chunk_file(previous_tier, &chunk_id.0);
        self.chunks.insert(chunk_id.0.clone(), refreshed);
        info!(chunk = %chunk_id, from = previous_tier.as_str(), "Force-refreshed chunk to HOT");
        Ok(())
    }

    async fn embed_text(&self, text: String) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed(&[text]).await {
            Ok(mut vectors) if !vectors.is_empty() => Some(vectors.remove(0)),
            Ok(_) => None,
            Err(e) => {
                // Not fatal: the chunk stays retrievable by keyword
                warn!(error = %e, "Embedding failed; chunk will be keyword-only");
                None
            }
        }
    }

    /// Score WARM and COLD chunks against a query.
    ///
    /// Chunks with embeddings are ranked by cosine similarity when a query
    /// vector is available; chunks without embeddings stay eligible via
    /// keyword matching over their summary and facts.
    pub fn relevant_chunks(
        &self,
        query: &str,
        query_vector: Option<&[f32]>,
        min_score: f32,
        limit: usize,
    ) -> Vec<(&Chunk, f32)> {
        let query_words: Vec<String> = query
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2)
            .map(|w| w.to_string())
            .collect();

        let mut scored: Vec<(&Chunk, f32)> = self
            .chunks
            .values()
            .filter(|c| c.tier != ChunkTier::Hot && !c.is_consolidated())
            .filter_map(|chunk| {
                let score = match (query_vector, &chunk.embedding) {
                    (Some(qv), Some(emb)) => cosine_similarity(qv, emb),
                    _ => keyword_score(&query_words, chunk),
                };
                (score >= min_score).then_some((chunk, score))
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored
    }

    /// All turns currently held in memory: HOT chunks plus the pending
    /// window, in turn order
    pub fn hot_turns(&self) -> Vec<Turn> {
        let mut hot: Vec<&Chunk> = self
            .chunks
            .values()
            .filter(|c| c.tier == ChunkTier::Hot)
            .collect();
        hot.sort_by_key(|c| c.turn_range.start);

        let mut turns: Vec<Turn> = hot
            .iter()
            .filter_map(|c| c.turns.as_ref())
            .flatten()
            .cloned()
            .collect();
        turns.extend(self.pending.iter().cloned());
        turns
    }

    pub fn chunk(&self, chunk_id: &ChunkId) -> Option<&Chunk> {
        self.chunks.get(&chunk_id.0)
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values()
    }

    /// All turn IDs referenced by any chunk (for building archive lookups)
    pub fn referenced_turn_ids(&self) -> Vec<String> {
        self.chunks
            .values()
            .flat_map(|c| c.turn_ids.iter().map(|id| id.0.clone()))
            .collect()
    }

    pub fn stats(&self) -> ChunkStats {
        let count_tier = |tier: ChunkTier| {
            self.chunks
                .values()
                .filter(|c| c.tier == tier && c.child_chunk_ids.is_empty())
                .count()
        };
        ChunkStats {
            total_chunks: self.chunks.len(),
            hot_chunks: count_tier(ChunkTier::Hot),
            warm_chunks: count_tier(ChunkTier::Warm),
            cold_chunks: count_tier(ChunkTier::Cold),
            macro_chunks: self
                .chunks
                .values()
                .filter(|c| !c.child_chunk_ids.is_empty())
                .count(),
            total_turns: self.turn_count,
            pending_turns: self.pending.len(),
            hot_tokens: self
                .chunks
                .values()
                .filter(|c| c.tier == ChunkTier::Hot)
                .map(|c| c.token_count)
                .sum(),
        }
    }

    fn tier_file(&self, tier: ChunkTier, chunk_id: &str) -> PathBuf {
        self.base_path
            .join(tier.as_str())
            .join(format!("{chunk_id}.json"))
    }

    fn save_chunk(&self, chunk: &Chunk) -> SimulacrumResult<()> {
        let path = self.tier_file(chunk.tier, &chunk.id.0);
        std::fs::write(&path, serde_json::to_string(chunk)?)?;
        if let Some(ctf) = &chunk.ctf {
            std::fs::write(path.with_extension("ctf"), ctf)?;
        }
        Ok(())
    }

    fn remove_chunk_file(&self, tier: ChunkTier, chunk_id: &str) {
        let path = self.tier_file(tier, chunk_id);
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(path.with_extension("ctf"));
    }
}

fn chunk_text(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| {
            let content: String = t.content.chars().take(500).collect();
            format!("{}: {}", t.turn_type.as_str(), content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn keyword_score(query_words: &[String], chunk: &Chunk) -> f32 {
    if query_words.is_empty() {
        return 0.0;
    }
    let haystack = format!(
        "{} {}",
        chunk.summary.to_lowercase(),
        chunk.key_facts.join(" ").to_lowercase()
    );
    let hits = query_words.iter().filter(|w| haystack.contains(w.as_str())).count();
    0.8 * hits as f32 / query_words.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use simulacrum_core::ConversationDag;

    fn turn_lookup(turns: &[Turn]) -> HashMap<String, Turn> {
        turns.iter().map(|t| (t.id().0, t.clone())).collect()
    }

    fn manager(dir: &Path, config: ChunkConfig) -> ChunkManager {
        ChunkManager::new(dir, config, Summarizer::heuristic(), None).unwrap()
    }

    fn ingest(manager: &mut ChunkManager, n: usize) -> Vec<Turn> {
        let mut turns = Vec::new();
        for i in 0..n {
            let turn = if i % 2 == 0 {
                Turn::user(format!("question number {i} about topic {}", i / 10))
            } else {
                Turn::assistant(format!("answer number {i} with detail {}", i / 10))
            };
            turns.push(turn.clone());
            manager.add_turn(turn).unwrap();
        }
        turns
    }

    #[tokio::test]
    async fn test_hot_chunk_sealing() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager(dir.path(), ChunkConfig::default());

        let mut sealed = 0;
        for i in 0..25 {
            if manager.add_turn(Turn::user(format!("turn {i}"))).unwrap().is_some() {
                sealed += 1;
            }
        }
        assert_eq!(sealed, 2);
        assert_eq!(manager.pending_turns().len(), 5);
        assert_eq!(manager.turn_count(), 25);
    }

    #[tokio::test]
    async fn test_cascade_200_turns() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager(dir.path(), ChunkConfig::default());

        let turns = ingest(&mut manager, 200);
        let lookup = turn_lookup(&turns);
        let report = manager.consolidate(&lookup).await.unwrap();
        assert!(!report.is_empty());

        let stats = manager.stats();
        // 200 turns at 10/chunk = 20 ingestion chunks, plus macro chunks
        assert!(stats.total_chunks >= 20, "got {}", stats.total_chunks);
        // Exactly the most recent 1-2 chunks are HOT
        assert!(stats.hot_chunks >= 1 && stats.hot_chunks <= 2);
        // 18 demoted, consolidated in threes
        assert!(stats.macro_chunks >= 1);
        assert_eq!(stats.macro_chunks, 6);

        // The HOT chunks are the most recent ones
        let max_hot_start = manager
            .chunks()
            .filter(|c| c.tier == ChunkTier::Hot)
            .map(|c| c.turn_range.start)
            .min()
            .unwrap();
        assert_eq!(max_hot_start, 180);
    }

    #[tokio::test]
    async fn test_tier_monotonicity() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager(dir.path(), ChunkConfig::default());

        let turns = ingest(&mut manager, 60);
        let lookup = turn_lookup(&turns);

        // Track the first chunk through passes: HOT at seal
        let first_id = {
            let mut ids: Vec<&Chunk> = manager.chunks().collect();
            ids.sort_by_key(|c| c.turn_range.start);
            ids[0].id.clone()
        };
        assert_eq!(manager.chunk(&first_id).unwrap().tier, ChunkTier::Hot);

        manager.consolidate(&lookup).await.unwrap();
        // After one full pass the oldest chunk has advanced to COLD
        assert_eq!(manager.chunk(&first_id).unwrap().tier, ChunkTier::Cold);
        assert!(manager.chunk(&first_id).unwrap().is_consolidated());

        // Another pass never reverts it
        manager.consolidate(&lookup).await.unwrap();
        assert_eq!(manager.chunk(&first_id).unwrap().tier, ChunkTier::Cold);
    }

    #[tokio::test]
    async fn test_warm_chunk_has_summary_embedding_and_ctf() {
        let dir = tempfile::tempdir().unwrap();
        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::new(crate::testing::MockEmbeddingProvider::new(16));
        let mut manager = ChunkManager::new(
            dir.path(),
            ChunkConfig::default(),
            Summarizer::heuristic(),
            Some(embedder),
        )
        .unwrap();

        let turns = ingest(&mut manager, 40);
        let lookup = turn_lookup(&turns);
        let report = manager.consolidate(&lookup).await.unwrap();
        assert_eq!(report.hot_to_warm.len(), 2);

        let warm_id = &report.hot_to_warm[0];
        let warm = manager.chunk(warm_id).unwrap();
        assert_eq!(warm.tier, ChunkTier::Warm);
        assert!(warm.turns.is_none());
        assert!(!warm.summary.is_empty());
        assert!(warm.embedding.is_some());
        assert!(warm.ctf.is_some());

        // Expansion of a WARM chunk yields the lossy compact form
        match manager.expand_chunk(warm_id).unwrap() {
            ExpandedContent::Compact(records) => {
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].content_hash, warm.content_hash);
            }
            other => panic!("expected compact content, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cold_archive_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager(dir.path(), ChunkConfig::default());

        let turns = ingest(&mut manager, 60);
        let lookup = turn_lookup(&turns);
        let report = manager.consolidate(&lookup).await.unwrap();
        assert!(!report.warm_to_cold.is_empty());

        // A consolidated chunk's full content is recoverable from archive
        let cold_id = &report.warm_to_cold[0];
        match manager.expand_chunk(cold_id).unwrap() {
            ExpandedContent::Full(restored) => {
                assert_eq!(restored.len(), 10);
                assert!(restored[0].content.contains("question number 0"));
            }
            other => panic!("expected full content from archive, got {other:?}"),
        }

        // The macro chunk carries an executive summary over its children
        let macro_chunk = manager.chunk(&report.macro_chunks[0]).unwrap();
        assert_eq!(macro_chunk.child_chunk_ids.len(), 3);
        assert_eq!(macro_chunk.turn_range, TurnRange::new(0, 29));
        assert!(!macro_chunk.summary.is_empty());
    }

    #[tokio::test]
    async fn test_force_refresh_restores_hot() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager(dir.path(), ChunkConfig::default());

        let turns = ingest(&mut manager, 40);
        let lookup = turn_lookup(&turns);
        let report = manager.consolidate(&lookup).await.unwrap();

        let warm_id = report.hot_to_warm[0].clone();
        manager.force_refresh(&warm_id, &lookup).unwrap();
        let refreshed = manager.chunk(&warm_id).unwrap();
        assert_eq!(refreshed.tier, ChunkTier::Hot);
        assert_eq!(refreshed.turns.as_ref().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_keyword_retrieval_without_embeddings() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager(dir.path(), ChunkConfig::default());

        for i in 0..30 {
            let content = if i < 10 {
                format!("discussing database migration step {i}")
            } else {
                format!("unrelated chatter number {i}")
            };
            manager.add_turn(Turn::user(content)).unwrap();
        }
        let lookup: HashMap<String, Turn> = HashMap::new();
        let mut cfg_manager = manager;
        cfg_manager.consolidate(&lookup).await.unwrap();

        // WARM chunks without embeddings are still keyword-eligible
        let results = cfg_manager.relevant_chunks("database migration", None, 0.1, 5);
        assert!(!results.is_empty());
        assert!(results[0].0.summary.to_lowercase().contains("database"));
    }

    #[tokio::test]
    async fn test_reload_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let turns;
        {
            let mut manager = manager(dir.path(), ChunkConfig::default());
            turns = ingest(&mut manager, 40);
            let lookup = turn_lookup(&turns);
            manager.consolidate(&lookup).await.unwrap();
        }

        let reloaded = manager(dir.path(), ChunkConfig::default());
        assert_eq!(reloaded.turn_count(), 40);
        let stats = reloaded.stats();
        assert_eq!(stats.hot_chunks, 2);
        assert_eq!(stats.warm_chunks, 2);

        // CTF payloads come back with WARM chunks
        let warm = reloaded
            .chunks()
            .find(|c| c.tier == ChunkTier::Warm)
            .unwrap();
        assert!(warm.ctf.is_some());
    }

    #[tokio::test]
    async fn test_hot_turns_includes_pending() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager(dir.path(), ChunkConfig::default());
        ingest(&mut manager, 25);

        let hot = manager.hot_turns();
        assert_eq!(hot.len(), 25);
        assert!(hot[24].content.contains("24"));
    }

    // Sanity check against a DAG-backed lookup, the way the store drives it
    #[tokio::test]
    async fn test_with_dag_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let mut dag = ConversationDag::new();
        let mut manager = manager(dir.path(), ChunkConfig::default());

        for i in 0..30 {
            let turn = Turn::user(format!("dag turn {i}"));
            dag.append_turn(turn.clone());
            manager.add_turn(turn).unwrap();
        }
        let lookup: HashMap<String, Turn> =
            dag.turns().map(|t| (t.id().0, t.clone())).collect();
        let report = manager.consolidate(&lookup).await.unwrap();
        assert_eq!(report.hot_to_warm.len(), 1);
    }
}
