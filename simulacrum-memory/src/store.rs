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

//! SimulacrumStore - per-project persistent conversation memory
//!
//! The single-writer facade over the DAG, chunk manager, multi-topology
//! index, episodes, journal, and event bus. Concurrent readers are always
//! safe (records are immutable); tier-transition bookkeeping serializes
//! through one lock; plain turn append stays cheap.
//!
//! Durability model: every record is journaled before any derived
//! structure sees it, and the whole store is reconstructable by replaying
//! the journal from empty.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use simulacrum_core::{
    ConsistencyReport, ConversationDag, EmbeddingProvider, Learning, LearningCategory, LearningId,
    SimulacrumResult, StoreConfig, TokenBudget, Turn, TurnId,
};
use simulacrum_index::{DocumentTree, MemoryNode, SpatialContext, UnifiedMemoryStore, UnifiedQuery};

use crate::activity::ActivityTracker;
use crate::assembler::{
    render, AssembledContext, RetrievalStats, Section, SectionItem, SectionKind,
};
use crate::bus::{EventBus, MemoryEvent};
use crate::chunk::{ChunkId, ChunkTier};
use crate::chunk_manager::{ChunkManager, ConsolidationReport, ExpandedContent};
use crate::episodes::{Episode, EpisodeManager};
use crate::extractor::LearningExtractor;
use crate::journal::{Journal, JournalRecord, JournalWatcher};
use crate::memory::{keywords, score_learning, score_turn};
use crate::summarizer::Summarizer;

const JOURNAL_FILE: &str = "journal.jsonl";
const DAG_FILE: &str = "dag.json";
const METADATA_FILE: &str = "metadata.json";
const CHUNKS_DIR: &str = "chunks";
const INDEX_DIR: &str = "index";
const EPISODES_DIR: &str = "episodes";

/// Default embedding width when no provider is wired (vectors only ever
/// come from a provider, so this just sizes the empty index)
const DEFAULT_EMBEDDING_DIMS: usize = 384;

/// Recent-conversation window for assembly
const RECENT_TURNS: usize = 10;
/// Heuristics included per assembly
const MAX_HEURISTICS: usize = 15;
/// Learnings included per assembly
const MAX_LEARNINGS: usize = 15;
/// Dead-end episodes included per assembly
const MAX_DEAD_ENDS: usize = 5;
/// Turns surfaced per semantically-matched chunk
const TURNS_PER_CHUNK_HIT: usize = 3;

/// Metadata index entry: chunk ID -> tier, range, hash
#[derive(Debug, Serialize, Deserialize)]
struct ChunkMetaEntry {
    tier: ChunkTier,
    start: usize,
    end: usize,
    content_hash: String,
}

/// Owned snapshot of a semantic chunk hit, taken under the chunk lock
struct ChunkHit {
    summary: String,
    turn_ids: Vec<TurnId>,
    score: f32,
}

/// Store-wide statistics
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub turns: usize,
    pub active_learnings: usize,
    pub total_learnings: usize,
    pub episodes: usize,
    pub hot_chunks: usize,
    pub warm_chunks: usize,
    pub cold_chunks: usize,
    pub total_chunks: usize,
    pub memory_nodes: usize,
    pub activity_day: u32,
}

/// Per-project persistent memory store
pub struct SimulacrumStore {
    base_path: PathBuf,
    config: StoreConfig,
    dag: RwLock<ConversationDag>,
    /// Tier-transition bookkeeping serializes through this lock only
    chunks: Mutex<ChunkManager>,
    unified: RwLock<UnifiedMemoryStore>,
    episodes: RwLock<EpisodeManager>,
    journal: Journal,
    bus: EventBus,
    activity: RwLock<ActivityTracker>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    extractor: LearningExtractor,
    heuristics: RwLock<Vec<String>>,
    focus_hint: RwLock<Option<String>>,
}

impl std::fmt::Debug for SimulacrumStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulacrumStore")
            .field("base_path", &self.base_path)
            .finish()
    }
}

impl SimulacrumStore {
    /// Open (or create) a store rooted at `base_path`.
    ///
    /// Loads persisted artifacts, then replays any journal entries the
    /// artifacts are missing; the journal always wins.
    pub fn open(
        base_path: impl Into<PathBuf>,
        config: StoreConfig,
        summarizer: Summarizer,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> SimulacrumResult<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;

        let dims = embedder
            .as_ref()
            .map(|e| e.dimensions())
            .unwrap_or(DEFAULT_EMBEDDING_DIMS);

        let dag = ConversationDag::load(&base_path.join(DAG_FILE)).unwrap_or_else(|e| {
            warn!(error = %e, "DAG artifact unreadable; rebuilding from journal");
            ConversationDag::new()
        });
        let chunks = ChunkManager::new(
            base_path.join(CHUNKS_DIR),
            config.chunks.clone(),
            summarizer,
            embedder.clone(),
        )?;
        let unified = UnifiedMemoryStore::load(base_path.join(INDEX_DIR), dims)
            .unwrap_or_else(|e| {
                warn!(error = %e, "Index artifacts unreadable; starting empty");
                UnifiedMemoryStore::new(base_path.join(INDEX_DIR), dims)
            });
        let episodes = EpisodeManager::new(base_path.join(EPISODES_DIR))?;
        let journal = Journal::new(base_path.join(JOURNAL_FILE));

        let store = Self {
            base_path,
            config,
            dag: RwLock::new(dag),
            chunks: Mutex::new(chunks),
            unified: RwLock::new(unified),
            episodes: RwLock::new(episodes),
            journal,
            bus: EventBus::default(),
            activity: RwLock::new(ActivityTracker::new()),
            embedder,
            extractor: LearningExtractor::default(),
            heuristics: RwLock::new(Vec::new()),
            focus_hint: RwLock::new(None),
        };
        store.replay_journal()?;
        store.catch_up_chunks();
        Ok(store)
    }

    /// Reconstruct a store at `base_path` purely from its journal,
    /// discarding all derived artifacts first.
    pub fn rebuild_from_journal(
        base_path: impl Into<PathBuf>,
        config: StoreConfig,
        summarizer: Summarizer,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> SimulacrumResult<Self> {
        let base_path = base_path.into();
        for artifact in [DAG_FILE, METADATA_FILE] {
            let _ = std::fs::remove_file(base_path.join(artifact));
        }
        for dir in [CHUNKS_DIR, INDEX_DIR, EPISODES_DIR] {
            let _ = std::fs::remove_dir_all(base_path.join(dir));
        }
        info!(path = %base_path.display(), "Rebuilding store from journal");
        Self::open(base_path, config, summarizer, embedder)
    }

    /// Replay the journal into in-memory state. Append idempotency makes
    /// this safe over partially-loaded artifacts.
    fn replay_journal(&self) -> SimulacrumResult<()> {
        let records = self.journal.replay()?;
        if records.is_empty() {
            return Ok(());
        }
        let mut dag = self.dag.write();
        let mut episodes = self.episodes.write();
        for record in records {
            match record {
                JournalRecord::Turn(turn) => {
                    dag.append_turn(turn);
                }
                JournalRecord::Learning(learning) => {
                    dag.append_learning(learning);
                }
                JournalRecord::Episode(episode) => {
                    episodes.add(episode)?;
                }
            }
        }
        Ok(())
    }

    /// Feed the chunk manager any turns it has not bucketed yet (restores
    /// the pending window after a restart, and the whole cascade after a
    /// rebuild).
    fn catch_up_chunks(&self) {
        let dag = self.dag.read();
        let mut turns: Vec<Turn> = dag.turns().cloned().collect();
        drop(dag);
        turns.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id().0.cmp(&b.id().0)));

        // Construction-time only: nothing else can hold the lock yet
        let mut chunks = match self.chunks.try_lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        let already = chunks.turn_count();
        if turns.len() <= already {
            return;
        }
        debug!(missing = turns.len() - already, "Catching chunk manager up from DAG");
        for turn in turns.into_iter().skip(already) {
            if let Err(e) = chunks.add_turn(turn) {
                warn!(error = %e, "Failed to re-bucket turn during catch-up");
            }
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Subscribe to memory events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<MemoryEvent> {
        self.bus.subscribe()
    }

    // ========================================================================
    // Turn API
    // ========================================================================

    /// Append a turn. Idempotent: re-appending an identical turn is a
    /// no-op returning the existing ID.
    pub async fn add_turn(&self, turn: Turn) -> SimulacrumResult<TurnId> {
        let (id, is_new) = {
            let mut dag = self.dag.write();
            let before = dag.turn_count();
            let id = dag.append_turn(turn.clone());
            (id, dag.turn_count() > before)
        };
        if !is_new {
            return Ok(id);
        }

        // Journal first: derived structures can always be rebuilt from it
        self.journal.append(&JournalRecord::Turn(turn.clone()))?;
        self.chunks.lock().await.add_turn(turn)?;
        self.activity.write().record_today();
        self.bus.publish(MemoryEvent::TurnAppended { turn_id: id.clone() });
        Ok(id)
    }

    /// Convenience: append a user message threaded on the active head
    pub async fn add_user(&self, content: impl Into<String>) -> SimulacrumResult<TurnId> {
        let turn = {
            let dag = self.dag.read();
            let parents = dag.active_head().cloned().into_iter().collect();
            Turn::user(content).with_parents(parents)
        };
        self.add_turn(turn).await
    }

    /// Convenience: append an assistant message threaded on the active head
    pub async fn add_assistant(&self, content: impl Into<String>) -> SimulacrumResult<TurnId> {
        let turn = {
            let dag = self.dag.read();
            let parents = dag.active_head().cloned().into_iter().collect();
            Turn::assistant(content).with_parents(parents)
        };
        self.add_turn(turn).await
    }

    pub fn get_turn(&self, id: &TurnId) -> Option<Turn> {
        self.dag.read().get_turn(id).cloned()
    }

    pub fn turn_count(&self) -> usize {
        self.dag.read().turn_count()
    }

    pub fn recent_turns(&self, n: usize) -> Vec<Turn> {
        self.dag.read().recent_turns(n).into_iter().cloned().collect()
    }

    /// Detect dangling parent references
    pub fn check_consistency(&self) -> ConsistencyReport {
        self.dag.read().check_consistency()
    }

    // ========================================================================
    // Learning API
    // ========================================================================

    /// Record a learning, stamped with the current activity day
    pub fn add_learning(
        &self,
        fact: impl Into<String>,
        category: LearningCategory,
        confidence: f32,
    ) -> SimulacrumResult<LearningId> {
        let day = self.activity.read().current_day();
        let learning = Learning::new(fact, category)
            .with_confidence(confidence)
            .with_activity_day(day);
        self.add_learning_record(learning)
    }

    /// Record a pre-built learning (merge and replay paths)
    pub fn add_learning_record(&self, learning: Learning) -> SimulacrumResult<LearningId> {
        let id = learning.id();
        let is_new = {
            let mut dag = self.dag.write();
            dag.get_learning(&id).is_none() && {
                dag.append_learning(learning.clone());
                true
            }
        };
        if is_new {
            self.journal.append(&JournalRecord::Learning(learning))?;
            self.bus.publish(MemoryEvent::LearningAdded {
                learning_id: id.clone(),
            });
        }
        Ok(id)
    }

    /// Supersede an existing learning with a newer one. The old record
    /// stays retrievable but disappears from active queries.
    pub fn supersede_learning(
        &self,
        old: &LearningId,
        replacement: Learning,
    ) -> SimulacrumResult<Option<LearningId>> {
        let (new_id, superseded) = {
            let mut dag = self.dag.write();
            let new_id = dag.supersede_learning(old, replacement.clone());
            (new_id, dag.get_learning(old).cloned())
        };
        if let Some(new_id) = &new_id {
            self.journal.append(&JournalRecord::Learning(replacement))?;
            // Re-journal the old record so the supersession pointer
            // survives a replay from empty
            if let Some(superseded) = superseded {
                self.journal.append(&JournalRecord::Learning(superseded))?;
            }
            self.bus.publish(MemoryEvent::LearningSuperseded {
                old: old.clone(),
                new: new_id.clone(),
            });
        }
        Ok(new_id)
    }

    pub fn get_learning(&self, id: &LearningId) -> Option<Learning> {
        self.dag.read().get_learning(id).cloned()
    }

    pub fn active_learnings(&self) -> Vec<Learning> {
        self.dag.read().active_learnings().cloned().collect()
    }

    /// Run the regex extractor over a turn and record what it finds
    pub fn extract_learnings(&self, turn: &Turn) -> SimulacrumResult<Vec<LearningId>> {
        let mut ids = Vec::new();
        for extracted in self.extractor.extract_from_turn(turn) {
            let day = self.activity.read().current_day();
            let learning = Learning::new(extracted.text, extracted.category)
                .with_confidence(extracted.confidence)
                .with_source_turns(vec![turn.id()])
                .with_activity_day(day);
            ids.push(self.add_learning_record(learning)?);
        }
        Ok(ids)
    }

    // ========================================================================
    // Episode API
    // ========================================================================

    /// Record a problem-solving episode
    pub fn record_episode(&self, episode: Episode) -> SimulacrumResult<String> {
        let id = self.episodes.write().add(episode.clone())?;
        self.journal.append(&JournalRecord::Episode(episode))?;
        Ok(id)
    }

    /// Failed episodes, newest first
    pub fn dead_ends(&self) -> Vec<Episode> {
        self.episodes.read().dead_ends().into_iter().cloned().collect()
    }

    // ========================================================================
    // Procedural memory and focus
    // ========================================================================

    pub fn add_heuristic(&self, heuristic: impl Into<String>) {
        self.heuristics.write().push(heuristic.into());
    }

    pub fn set_focus(&self, hint: impl Into<String>) {
        *self.focus_hint.write() = Some(hint.into());
    }

    pub fn clear_focus(&self) {
        *self.focus_hint.write() = None;
    }

    // ========================================================================
    // Tiering
    // ========================================================================

    /// Run one explicit tier-transition pass and report what moved
    pub async fn consolidate(&self) -> SimulacrumResult<ConsolidationReport> {
        let lookup: HashMap<String, Turn> = {
            let dag = self.dag.read();
            dag.turns().map(|t| (t.id().0, t.clone())).collect()
        };

        let report = {
            let mut chunks = self.chunks.lock().await;
            chunks.consolidate(&lookup).await?
        };

        for chunk_id in &report.hot_to_warm {
            self.bus.publish(MemoryEvent::ChunkDemoted {
                chunk_id: chunk_id.clone(),
                from: ChunkTier::Hot,
                to: ChunkTier::Warm,
            });
        }
        for chunk_id in &report.warm_to_cold {
            self.bus.publish(MemoryEvent::ChunkDemoted {
                chunk_id: chunk_id.clone(),
                from: ChunkTier::Warm,
                to: ChunkTier::Cold,
            });
        }
        if !report.is_empty() {
            self.bus.publish(MemoryEvent::ConsolidationCompleted {
                hot_to_warm: report.hot_to_warm.len(),
                warm_to_cold: report.warm_to_cold.len(),
            });
        }
        Ok(report)
    }

    /// Recover a chunk's content at its tier's fidelity
    pub async fn expand_chunk(&self, chunk_id: &ChunkId) -> SimulacrumResult<ExpandedContent> {
        self.chunks.lock().await.expand_chunk(chunk_id)
    }

    /// The only sanctioned tier reversal
    pub async fn force_refresh(&self, chunk_id: &ChunkId) -> SimulacrumResult<()> {
        let lookup: HashMap<String, Turn> = {
            let dag = self.dag.read();
            dag.turns().map(|t| (t.id().0, t.clone())).collect()
        };
        self.chunks.lock().await.force_refresh(chunk_id, &lookup)
    }

    // ========================================================================
    // Document ingestion (semantic memory)
    // ========================================================================

    /// Ingest a document into multi-topology memory: structural chunking
    /// by paragraph, spatial + structural annotation, optional embeddings.
    /// Returns the number of memory nodes created.
    pub async fn ingest_document(
        &self,
        file_path: &str,
        content: &str,
    ) -> SimulacrumResult<usize> {
        let tree = DocumentTree::parse(file_path, content);

        let mut nodes: Vec<MemoryNode> = Vec::new();
        let mut offset = 0usize;
        for paragraph in content.split("\n\n") {
            let trimmed = paragraph.trim();
            if !trimmed.is_empty() && !trimmed.starts_with('#') {
                let position = tree.position_at(offset);
                nodes.push(
                    MemoryNode::new(trimmed)
                        .with_spatial(SpatialContext::File {
                            path: file_path.to_string(),
                            line: None,
                            section_path: position.heading_path.clone(),
                        })
                        .with_structural(position),
                );
            }
            offset += paragraph.len() + 2;
        }

        // Embedding failures degrade to keyword-only nodes
        if let Some(embedder) = &self.embedder {
            let texts: Vec<String> = nodes.iter().map(|n| n.content.clone()).collect();
            match embedder.embed(&texts).await {
                Ok(vectors) if vectors.len() == nodes.len() => {
                    for (node, vector) in nodes.iter_mut().zip(vectors) {
                        node.embedding = Some(vector);
                    }
                }
                Ok(_) => warn!("Embedding batch size mismatch; ingesting without vectors"),
                Err(e) => warn!(error = %e, "Embedding failed; ingesting without vectors"),
            }
        }

        let count = nodes.len();
        let mut unified = self.unified.write();
        unified.add_document_tree(tree);
        for node in nodes {
            unified.add_node(node);
        }
        Ok(count)
    }

    /// Direct access for index-level queries
    pub fn with_index<R>(&self, f: impl FnOnce(&UnifiedMemoryStore) -> R) -> R {
        f(&self.unified.read())
    }

    /// Direct mutable access to the index (merge paths)
    pub fn with_index_mut<R>(&self, f: impl FnOnce(&mut UnifiedMemoryStore) -> R) -> R {
        f(&mut self.unified.write())
    }

    // ========================================================================
    // Context assembly
    // ========================================================================

    /// Assemble prompt-ready context for a query under the configured
    /// budget. Never fails outright: collaborator errors and deadline
    /// misses degrade to empty categories.
    pub async fn assemble_context(&self, query: &str) -> AssembledContext {
        let budget = self.config.budget.clone();
        self.assemble_context_with_budget(query, &budget).await
    }

    /// Assemble with an explicit budget. The hard ceiling is
    /// `budget.total_tokens - budget.response_tokens`.
    pub async fn assemble_context_with_budget(
        &self,
        query: &str,
        budget: &TokenBudget,
    ) -> AssembledContext {
        let retrieval = self.config.retrieval.clone();
        let deadline = Duration::from_millis(retrieval.deadline_ms.max(1));
        let query_keywords = keywords(query);
        let mut stats = RetrievalStats::default();

        // Fan out across memory types; a category that misses its slice
        // of the deadline contributes an empty result, never an error.
        let learnings_task = timeout(deadline, async {
            let learnings = self.active_learnings();
            let mut scored: Vec<(f32, DateTime<Utc>, String)> = learnings
                .iter()
                .filter_map(|l| {
                    let score = score_learning(&query_keywords, l);
                    (score >= retrieval.learning_min_relevance).then(|| {
                        (
                            score,
                            l.timestamp,
                            format!("- [{}] {}", l.category.as_str(), l.fact),
                        )
                    })
                })
                .collect();
            // Relevance first, recency breaks ties
            scored.sort_by(|a, b| {
                b.0.partial_cmp(&a.0)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.1.cmp(&a.1))
            });
            (learnings.len(), scored)
        });

        let dead_ends_task = timeout(deadline, async {
            let dead_ends = self.dead_ends();
            let items: Vec<SectionItem> = dead_ends
                .iter()
                .take(MAX_DEAD_ENDS)
                .map(|e| SectionItem::new(format!("- tried and failed: {}", e.summary), 0.8))
                .collect();
            (dead_ends.len(), items)
        });

        let recent_task = timeout(deadline, async {
            let turns = self.chunks.lock().await.hot_turns();
            let window: Vec<&Turn> = turns.iter().rev().take(RECENT_TURNS).collect();
            let items: Vec<SectionItem> = window
                .into_iter()
                .rev()
                .map(|t| {
                    let content: String = t.content.chars().take(300).collect();
                    let role = match t.turn_type.role() {
                        "user" => "User",
                        "assistant" => "Assistant",
                        other => other,
                    };
                    SectionItem::new(format!("**{role}**: {content}"), 1.0)
                })
                .collect();
            (items.len(), items)
        });

        let heuristics_task = timeout(deadline, async {
            self.heuristics
                .read()
                .iter()
                .take(MAX_HEURISTICS)
                .map(|h| SectionItem::new(format!("- {h}"), 1.0))
                .collect::<Vec<_>>()
        });

        let semantic_task = timeout(deadline, self.retrieve_semantic(query, &query_keywords));

        let (learnings_res, dead_res, recent_res, heuristics_res, semantic_res) = tokio::join!(
            learnings_task,
            dead_ends_task,
            recent_task,
            heuristics_task,
            semantic_task
        );

        let (learnings_considered, learning_items) = match learnings_res {
            Ok((considered, scored)) => (
                considered,
                scored
                    .into_iter()
                    .take(MAX_LEARNINGS)
                    .map(|(score, _, text)| SectionItem::new(text, score))
                    .collect::<Vec<_>>(),
            ),
            Err(_) => {
                stats.categories_timed_out += 1;
                (0, Vec::new())
            }
        };
        let (episodes_considered, dead_items) = match dead_res {
            Ok(v) => v,
            Err(_) => {
                stats.categories_timed_out += 1;
                (0, Vec::new())
            }
        };
        let (turns_considered, recent_items) = match recent_res {
            Ok(v) => v,
            Err(_) => {
                stats.categories_timed_out += 1;
                (0, Vec::new())
            }
        };
        let heuristic_items = match heuristics_res {
            Ok(v) => v,
            Err(_) => {
                stats.categories_timed_out += 1;
                Vec::new()
            }
        };
        let semantic_items = match semantic_res {
            Ok(v) => v,
            Err(_) => {
                stats.categories_timed_out += 1;
                Vec::new()
            }
        };

        stats.learnings_considered = learnings_considered;
        stats.episodes_considered = episodes_considered;
        stats.turns_considered = turns_considered;
        stats.semantic_hits = semantic_items.len();

        let focus_items: Vec<SectionItem> = self
            .focus_hint
            .read()
            .iter()
            .map(|hint| SectionItem::new(hint.clone(), 1.0))
            .collect();

        let sections = vec![
            Section::new(SectionKind::FocusHint, focus_items),
            Section::new(SectionKind::Heuristics, heuristic_items),
            Section::new(SectionKind::Learnings, learning_items)
                .with_max_tokens(budget.learning_tokens),
            Section::new(SectionKind::DeadEnds, dead_items),
            Section::new(SectionKind::RecentConversation, recent_items)
                .with_max_tokens(budget.recent_tokens),
            Section::new(SectionKind::CodeContext, semantic_items)
                .with_max_tokens(budget.memory_tokens),
        ];

        render(budget, sections, stats)
    }

    /// Semantic-memory retrieval: embed the query (when a provider is
    /// wired), rank chunks and memory nodes, and surface the most relevant
    /// underlying turns from the DAG.
    async fn retrieve_semantic(
        &self,
        query: &str,
        query_keywords: &std::collections::HashSet<String>,
    ) -> Vec<SectionItem> {
        let retrieval = &self.config.retrieval;

        let query_vector = match &self.embedder {
            Some(embedder) => match embedder.embed(&[query.to_string()]).await {
                Ok(mut vectors) if !vectors.is_empty() => Some(vectors.remove(0)),
                Ok(_) => None,
                Err(e) => {
                    // Category degrades to keyword matching
                    warn!(error = %e, "Query embedding failed; semantic retrieval degrades");
                    None
                }
            },
            None => None,
        };

        // Owned snapshot of chunk hits, taken under the tier lock
        let chunk_hits: Vec<ChunkHit> = {
            let chunks = self.chunks.lock().await;
            chunks
                .relevant_chunks(
                    query,
                    query_vector.as_deref(),
                    retrieval.semantic_min_score,
                    retrieval.semantic_limit,
                )
                .into_iter()
                .map(|(chunk, score)| ChunkHit {
                    summary: chunk.summary.clone(),
                    turn_ids: chunk.turn_ids.clone(),
                    score,
                })
                .collect()
        };

        let mut items: Vec<SectionItem> = Vec::new();
        {
            let dag = self.dag.read();
            for hit in &chunk_hits {
                // Pull the most relevant underlying turns; the DAG always
                // has them even after the chunk went lossy
                let mut scored_turns: Vec<(f32, &Turn)> = hit
                    .turn_ids
                    .iter()
                    .filter_map(|id| dag.get_turn(id))
                    .map(|t| (score_turn(query_keywords, t), t))
                    .filter(|(s, _)| *s > 0.0)
                    .collect();
                scored_turns.sort_by(|a, b| {
                    b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal)
                });

                if scored_turns.is_empty() {
                    if !hit.summary.is_empty() {
                        items.push(SectionItem::new(format!("- {}", hit.summary), hit.score));
                    }
                } else {
                    for (turn_score, turn) in scored_turns.into_iter().take(TURNS_PER_CHUNK_HIT) {
                        let content: String = turn.content.chars().take(300).collect();
                        items.push(SectionItem::new(
                            format!("- {content}"),
                            hit.score * 0.5 + turn_score * 0.5,
                        ));
                    }
                }
            }
        }

        // Memory nodes from the unified index
        {
            let unified = self.unified.read();
            let node_query = UnifiedQuery::new()
                .with_text(query)
                .with_limit(retrieval.semantic_limit);
            for (node, score) in unified.query(&node_query, query_vector.as_deref()) {
                if score < retrieval.semantic_min_score {
                    continue;
                }
                let content: String = node.content.chars().take(300).collect();
                items.push(SectionItem::new(format!("- {content}"), score));
            }
        }

        items.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        items
    }

    // ========================================================================
    // Cross-process sync
    // ========================================================================

    /// Watcher positioned at the start of this store's journal
    pub fn journal_watcher(&self) -> JournalWatcher {
        JournalWatcher::new(self.journal.path())
    }

    /// Watcher positioned at the current end of the journal
    pub fn journal_watcher_from_end(&self) -> SimulacrumResult<JournalWatcher> {
        JournalWatcher::from_end(&self.journal)
    }

    /// Replay entries another process appended since the watcher's last
    /// poll. Returns how many records were new to this store.
    pub async fn sync_from_watcher(
        &self,
        watcher: &mut JournalWatcher,
    ) -> SimulacrumResult<usize> {
        let mut applied = 0usize;
        for record in watcher.poll()? {
            match record {
                JournalRecord::Turn(turn) => {
                    let is_new = {
                        let mut dag = self.dag.write();
                        let before = dag.turn_count();
                        dag.append_turn(turn.clone());
                        dag.turn_count() > before
                    };
                    if is_new {
                        self.chunks.lock().await.add_turn(turn)?;
                        applied += 1;
                    }
                }
                JournalRecord::Learning(learning) => {
                    let id = learning.id();
                    let mut dag = self.dag.write();
                    if dag.get_learning(&id).is_none() {
                        dag.append_learning(learning);
                        applied += 1;
                    }
                }
                JournalRecord::Episode(episode) => {
                    let mut episodes = self.episodes.write();
                    if episodes.get(&episode.id).is_none() {
                        episodes.add(episode)?;
                        applied += 1;
                    }
                }
            }
        }
        Ok(applied)
    }

    // ========================================================================
    // Persistence & stats
    // ========================================================================

    /// Flush derived artifacts for warm start: DAG snapshot, index, and
    /// the chunk metadata index (ID -> tier, range, hash)
    pub async fn save(&self) -> SimulacrumResult<()> {
        self.dag.read().save(&self.base_path.join(DAG_FILE))?;
        self.unified
            .read()
            .save()
            .map_err(|e| simulacrum_core::SimulacrumError::Storage(e.to_string()))?;

        let metadata: HashMap<String, ChunkMetaEntry> = {
            let chunks = self.chunks.lock().await;
            chunks
                .chunks()
                .map(|c| {
                    (
                        c.id.0.clone(),
                        ChunkMetaEntry {
                            tier: c.tier,
                            start: c.turn_range.start,
                            end: c.turn_range.end,
                            content_hash: c.content_hash.clone(),
                        },
                    )
                })
                .collect()
        };
        std::fs::write(
            self.base_path.join(METADATA_FILE),
            serde_json::to_string_pretty(&metadata)?,
        )?;
        Ok(())
    }

    pub async fn stats(&self) -> StoreStats {
        let dag_stats = self.dag.read().stats();
        let chunk_stats = self.chunks.lock().await.stats();
        let node_count = self.unified.read().node_count();
        StoreStats {
            turns: dag_stats.total_turns,
            active_learnings: dag_stats.active_learnings,
            total_learnings: dag_stats.learnings,
            episodes: self.episodes.read().len(),
            hot_chunks: chunk_stats.hot_chunks,
            warm_chunks: chunk_stats.warm_chunks,
            cold_chunks: chunk_stats.cold_chunks,
            total_chunks: chunk_stats.total_chunks,
            memory_nodes: node_count,
            activity_day: self.activity.read().current_day(),
        }
    }

    /// Record engagement for decay bookkeeping
    pub fn record_activity(&self) {
        self.activity.write().record_today();
    }

    pub fn activity_day(&self) -> u32 {
        self.activity.read().current_day()
    }
}
