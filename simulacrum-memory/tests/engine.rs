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

//! End-to-end engine scenarios: ingestion cascades, budget ceilings,
//! semantic recall, collaborator failure, and journal replay.

use std::sync::Arc;

use simulacrum_core::{
    estimate_tokens, EmbeddingProvider, LearningCategory, StoreConfig, TokenBudget,
};
use simulacrum_memory::testing::{FailingGenerationBackend, MockEmbeddingProvider};
use simulacrum_memory::{
    Episode, EpisodeOutcome, SimulacrumManager, SimulacrumStore, Summarizer,
};

fn store_at(path: &std::path::Path, embedder: Option<Arc<dyn EmbeddingProvider>>) -> SimulacrumStore {
    SimulacrumStore::open(path, StoreConfig::default(), Summarizer::heuristic(), embedder).unwrap()
}

/// Ingest 200 alternating turns, planting a personal fact at turn 10
async fn ingest_conversation(store: &SimulacrumStore) {
    for i in 0..200 {
        let content = if i == 10 {
            "My name is Alex Chen".to_string()
        } else if i % 2 == 0 {
            format!("question number {i} about the project setup")
        } else {
            format!("answer number {i} covering the details")
        };
        if i % 2 == 0 {
            store.add_user(content).await.unwrap();
        } else {
            store.add_assistant(content).await.unwrap();
        }
    }
}

#[tokio::test]
async fn test_200_turn_tiering_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_at(dir.path(), None);

    ingest_conversation(&store).await;
    store.consolidate().await.unwrap();

    let stats = store.stats().await;
    assert_eq!(stats.turns, 200);
    // 200 turns / 10 per chunk = 20 ingestion chunks, plus macros
    assert!(stats.total_chunks >= 20, "got {}", stats.total_chunks);
    // Exactly the most recent 1-2 chunks are HOT
    assert!(
        stats.hot_chunks >= 1 && stats.hot_chunks <= 2,
        "got {} hot chunks",
        stats.hot_chunks
    );
    // At least one COLD macro-chunk exists
    assert!(stats.cold_chunks >= 1 || stats.total_chunks > 20);
}

#[tokio::test]
async fn test_semantic_recall_with_embedding_provider() {
    let dir = tempfile::tempdir().unwrap();
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbeddingProvider::new(64));
    let store = store_at(dir.path(), Some(embedder));

    ingest_conversation(&store).await;
    store.consolidate().await.unwrap();

    let budget = TokenBudget::with_total(4_000);
    let context = store
        .assemble_context_with_budget("What is my name?", &budget)
        .await;

    assert!(
        context.text.contains("Alex Chen"),
        "assembled context should recall the planted fact:\n{}",
        context.text
    );
    assert!(estimate_tokens(&context.text) <= budget.available());
}

#[tokio::test]
async fn test_recall_without_embeddings_may_omit_but_never_fails() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_at(dir.path(), None);

    ingest_conversation(&store).await;
    store.consolidate().await.unwrap();

    // Working + long-term memory only: the fact may legitimately be absent,
    // but assembly must stay valid and within budget
    let budget = TokenBudget::with_total(4_000);
    let context = store
        .assemble_context_with_budget("What is my name?", &budget)
        .await;
    assert!(estimate_tokens(&context.text) <= budget.available());
    assert!(context.text.contains("## Recent Conversation"));
}

#[tokio::test]
async fn test_budget_ceiling_across_budgets() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_at(dir.path(), None);

    ingest_conversation(&store).await;
    store
        .add_learning("the project uses tokio", LearningCategory::Fact, 0.9)
        .unwrap();
    store
        .record_episode(Episode::new("tried blocking IO", EpisodeOutcome::Failed))
        .unwrap();
    store.add_heuristic("prefer small, verifiable steps");
    store.consolidate().await.unwrap();

    for total in [50usize, 200, 1_000, 4_000, 16_000] {
        let budget = TokenBudget {
            total_tokens: total,
            response_tokens: total / 4,
            ..Default::default()
        };
        let context = store
            .assemble_context_with_budget("project setup details", &budget)
            .await;
        assert!(
            estimate_tokens(&context.text) <= budget.available(),
            "budget {total}: {} tokens emitted, {} available",
            estimate_tokens(&context.text),
            budget.available()
        );
    }
}

#[tokio::test]
async fn test_erroring_backend_degrades_gracefully() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FailingGenerationBackend::new());
    let store = SimulacrumStore::open(
        dir.path(),
        StoreConfig::default(),
        Summarizer::generative(backend.clone()),
        None,
    )
    .unwrap();

    for i in 0..30 {
        store.add_user(format!("message {i} about the build")).await.unwrap();
    }
    // Consolidation succeeds: summaries fall back to the heuristic path
    let report = store.consolidate().await.unwrap();
    assert!(!report.hot_to_warm.is_empty());
    assert!(backend.call_count() > 0);

    let stats = store.stats().await;
    assert!(stats.warm_chunks >= 1);

    // Assembly never fails on collaborator errors
    let context = store.assemble_context("build").await;
    assert!(!context.text.is_empty());
}

#[tokio::test]
async fn test_dead_ends_surface_in_context() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_at(dir.path(), None);

    store.add_user("let's try the migration").await.unwrap();
    store
        .record_episode(Episode::new(
            "migrating schema in one pass",
            EpisodeOutcome::Failed,
        ))
        .unwrap();

    let context = store.assemble_context("migration plan").await;
    assert!(context.text.contains("## Dead Ends"));
    assert!(context.text.contains("migrating schema in one pass"));
}

#[tokio::test]
async fn test_supersession_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_at(dir.path(), None);

    let old_id = store
        .add_learning("the timeout is 5 seconds", LearningCategory::Fact, 0.9)
        .unwrap();
    let replacement =
        simulacrum_core::Learning::new("the timeout is 30 seconds", LearningCategory::Fact);
    store.supersede_learning(&old_id, replacement).unwrap();

    let active = store.active_learnings();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].fact, "the timeout is 30 seconds");

    // Audit trail: superseded learning still retrievable
    let old = store.get_learning(&old_id).unwrap();
    assert!(old.superseded_by.is_some());

    // Assembly only sees the active one
    let context = store.assemble_context("timeout seconds").await;
    assert!(context.text.contains("30 seconds"));
    assert!(!context.text.contains("5 seconds"));

    // Supersession survives a rebuild from the journal alone
    drop(store);
    let rebuilt = SimulacrumStore::rebuild_from_journal(
        dir.path(),
        StoreConfig::default(),
        Summarizer::heuristic(),
        None,
    )
    .unwrap();
    assert_eq!(rebuilt.active_learnings().len(), 1);
    assert!(rebuilt.get_learning(&old_id).unwrap().superseded_by.is_some());
}

#[tokio::test]
async fn test_journal_replay_reconstructs_store() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = store_at(dir.path(), None);
        for i in 0..35 {
            store.add_user(format!("durable message {i}")).await.unwrap();
        }
        store
            .add_learning("journals are the source of truth", LearningCategory::Fact, 1.0)
            .unwrap();
        store
            .record_episode(Episode::new("skipped backups", EpisodeOutcome::Failed))
            .unwrap();
        // No save(): derived artifacts are deliberately stale
    }

    let rebuilt = SimulacrumStore::rebuild_from_journal(
        dir.path(),
        StoreConfig::default(),
        Summarizer::heuristic(),
        None,
    )
    .unwrap();

    let stats = rebuilt.stats().await;
    assert_eq!(stats.turns, 35);
    assert_eq!(stats.active_learnings, 1);
    assert_eq!(stats.episodes, 1);
    // The chunk cascade was rebuilt too: 35 turns = 3 sealed chunks + pending
    assert!(stats.total_chunks >= 3);
}

#[tokio::test]
async fn test_journal_watcher_cross_store_sync() {
    let dir = tempfile::tempdir().unwrap();
    let writer = store_at(&dir.path().join("project"), None);
    writer.add_user("first message").await.unwrap();

    // A second store over the same directory, catching up via the journal
    let reader = store_at(&dir.path().join("project"), None);
    let mut watcher = reader.journal_watcher_from_end().unwrap();

    writer.add_user("second message").await.unwrap();
    writer
        .add_learning("watchers replay increments", LearningCategory::Fact, 1.0)
        .unwrap();

    let applied = reader.sync_from_watcher(&mut watcher).await.unwrap();
    assert_eq!(applied, 2);
    assert_eq!(reader.turn_count(), 2);
    assert_eq!(reader.active_learnings().len(), 1);

    // Replaying the same entries again is a no-op
    let applied = reader.sync_from_watcher(&mut watcher).await.unwrap();
    assert_eq!(applied, 0);
}

#[tokio::test]
async fn test_document_ingestion_and_hybrid_query() {
    let dir = tempfile::tempdir().unwrap();
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbeddingProvider::new(64));
    let store = store_at(dir.path(), Some(embedder));

    let doc = "# Cache Guide\n\n\
               The cache evicts entries by TTL.\n\n\
               ## Limitations\n\n\
               The cache never stores entries above 1MB.\n";
    let created = store.ingest_document("docs/cache.md", doc).await.unwrap();
    assert_eq!(created, 2);

    let hits = store.with_index(|index| {
        index
            .query_spatial(
                simulacrum_index::SpatialQuery {
                    file_pattern: Some("docs/*.md".to_string()),
                    section_contains: Some("Limitations".to_string()),
                    ..Default::default()
                },
                10,
            )
            .into_iter()
            .map(|(node, _)| node.content.clone())
            .collect::<Vec<_>>()
    });
    assert_eq!(hits.len(), 1);
    assert!(hits[0].contains("1MB"));

    let context = store.assemble_context("cache entries limit").await;
    assert!(context.text.contains("1MB"));
}

#[tokio::test]
async fn test_manager_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let manager = SimulacrumManager::open(
        dir.path(),
        StoreConfig::default(),
        Summarizer::heuristic(),
        None,
    )
    .unwrap();

    let security = manager
        .create("security", "threat modeling and auth reviews", vec!["auth".to_string()])
        .unwrap();
    security
        .add_learning("rotate keys quarterly", LearningCategory::Constraint, 0.9)
        .unwrap();
    manager
        .create("performance", "profiling and tuning", vec!["latency".to_string()])
        .unwrap();

    // Routing by domain tags and description overlap
    let suggestions = manager.suggest("how should auth tokens rotate?", 2);
    assert_eq!(suggestions[0].0.name, "security");

    // Merge security into performance, deduplicating learnings
    let merged = manager.merge("security", "performance", false).await.unwrap();
    assert!(merged >= 1);
    let target = manager.get("performance").unwrap();
    assert_eq!(target.active_learnings().len(), 1);

    // Archive and restore round-trips through the gzipped journal
    manager.activate("performance").await.unwrap();
    manager.archive("security", "merged").unwrap();
    assert_eq!(manager.list().len(), 1);
    assert_eq!(manager.list_archived().len(), 1);

    let restored = manager.restore("security").unwrap();
    assert_eq!(restored.active_learnings().len(), 1);
    assert_eq!(
        restored.active_learnings()[0].fact,
        "rotate keys quarterly"
    );
}

#[tokio::test]
async fn test_manager_decay_and_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = StoreConfig::default();
    config.decay.stale_days = 3;
    config.decay.archive_days = 5;

    let manager =
        SimulacrumManager::open(dir.path(), config, Summarizer::heuristic(), None).unwrap();
    manager.create("old-project", "long forgotten", vec![]).unwrap();
    manager.activate("old-project").await.unwrap();
    manager.create("fresh", "current work", vec![]).unwrap();

    // Six active days pass without touching old-project
    for day in 1..=6 {
        manager
            .record_activity_on(
                chrono::NaiveDate::from_ymd_opt(2026, 8, day).unwrap(),
            )
            .unwrap();
    }
    manager.activate("fresh").await.unwrap();

    let health = manager.check_health();
    assert!(health.stale.iter().any(|(name, _)| name == "old-project"));
    assert!(health
        .archive_candidates
        .iter()
        .any(|name| name == "old-project"));

    // Dry run reports without acting
    let dry = manager.cleanup(true).unwrap();
    assert!(dry.archived.contains(&"old-project".to_string()));
    assert_eq!(manager.list().len(), 2);

    // Real run archives the stale project
    let actions = manager.cleanup(false).unwrap();
    assert!(actions.archived.contains(&"old-project".to_string()));
    assert_eq!(manager.list().len(), 1);
    assert_eq!(manager.list_archived().len(), 1);
}

#[tokio::test]
async fn test_event_bus_observes_engine_activity() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_at(dir.path(), None);
    let mut events = store.subscribe();

    store.add_user("watch this").await.unwrap();
    assert!(matches!(
        events.recv().await.unwrap(),
        simulacrum_memory::MemoryEvent::TurnAppended { .. }
    ));

    for i in 0..30 {
        store.add_user(format!("filler {i}")).await.unwrap();
    }
    store.consolidate().await.unwrap();

    // Drain until the demotion event shows up
    let mut saw_demotion = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, simulacrum_memory::MemoryEvent::ChunkDemoted { .. }) {
            saw_demotion = true;
        }
    }
    assert!(saw_demotion);
}
