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

//! Simulacrum memory engine
//!
//! Durable, bounded-size memory for conversational agents:
//! - **Chunk tiering**: HOT (full turns) -> WARM (summary + embedding,
//!   CTF-encoded) -> COLD (macro-summary, content archived)
//! - **CTF codec**: compact lossy encoding for warm-tier summaries
//! - **Summarizer**: generative with a heuristic fallback; failures never
//!   cross its boundary
//! - **Context assembler**: merges working, long-term, episodic, semantic,
//!   and procedural memory into one string under a hard token ceiling
//! - **Journal**: append-only, checksummed, the primary durability and
//!   cross-process coordination mechanism
//! - **Store / Manager**: per-project persistence and multi-project
//!   lifecycle with activity-day decay
//!
//! ```rust,ignore
//! use simulacrum_memory::{SimulacrumStore, Summarizer};
//! use simulacrum_core::StoreConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = SimulacrumStore::open(
//!         "./memory/my-project",
//!         StoreConfig::default(),
//!         Summarizer::heuristic(),
//!         None,
//!     )?;
//!
//!     store.add_user("How do I configure the cache?").await?;
//!     store.add_assistant("Set the TTL to 300 seconds.").await?;
//!     store.consolidate().await?;
//!
//!     let context = store.assemble_context("cache configuration").await;
//!     println!("{}", context.text);
//!     Ok(())
//! }
//! ```

pub mod activity;
pub mod assembler;
pub mod bus;
pub mod chunk;
pub mod chunk_manager;
pub mod ctf;
pub mod episodes;
pub mod extractor;
pub mod journal;
pub mod manager;
pub mod memory;
pub mod store;
pub mod summarizer;
pub mod testing;

// Re-exports
pub use activity::ActivityTracker;
pub use assembler::{AssembledContext, RetrievalStats, Section, SectionItem, SectionKind};
pub use bus::{EventBus, MemoryEvent};
pub use chunk::{Chunk, ChunkId, ChunkSummaryView, ChunkTier, TurnRange};
pub use chunk_manager::{ChunkManager, ChunkStats, ConsolidationReport, ExpandedContent};
pub use ctf::{CompactRecord, CtfCodec, SummaryRecord};
pub use episodes::{Episode, EpisodeManager, EpisodeOutcome};
pub use extractor::{ExtractedLearning, LearningExtractor};
pub use journal::{Journal, JournalRecord, JournalWatcher};
pub use manager::{
    ArchiveMetadata, CleanupActions, HealthReport, ProjectMetadata, SimulacrumManager,
};
pub use store::{SimulacrumStore, StoreStats};
pub use summarizer::Summarizer;
