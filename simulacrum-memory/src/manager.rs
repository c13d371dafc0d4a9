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

//! SimulacrumManager - multi-project lifecycle
//!
//! An explicit registry object constructed once and passed by handle; no
//! module-level state. Manages per-project stores: create, activate,
//! merge, archive, restore, and activity-day-driven cleanup.
//!
//! Archival keeps the journal (the primary reconstruction artifact)
//! gzip-compressed; restore decompresses and replays it, exercising the
//! same recovery path as crash repair.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use simulacrum_core::{
    DecayPolicy, EmbeddingProvider, SimulacrumError, SimulacrumResult, StoreConfig,
};

use crate::activity::ActivityTracker;
use crate::store::SimulacrumStore;
use crate::summarizer::Summarizer;

const REGISTRY_FILE: &str = "registry.json";
const ARCHIVE_DIR: &str = "archive";
const JOURNAL_FILE: &str = "journal.jsonl";

/// Registry metadata for a live project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub name: String,
    pub description: String,
    /// Domain tags for query routing
    pub domains: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u32,
    /// Activity day of the last access (decay clock)
    pub last_active_day: u32,
    pub learning_count: usize,
    pub node_count: usize,
}

/// Registry metadata for an archived project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    pub name: String,
    pub description: String,
    pub domains: Vec<String>,
    pub archived_at: DateTime<Utc>,
    pub reason: String,
    pub archive_path: PathBuf,
    pub learning_count: usize,
}

/// What `check_health` found
#[derive(Debug, Clone, Default)]
pub struct HealthReport {
    /// (name, activity days since last access)
    pub stale: Vec<(String, u32)>,
    /// Projects below the minimum-useful-content thresholds
    pub empty: Vec<String>,
    /// Projects past the archive threshold
    pub archive_candidates: Vec<String>,
    pub total_projects: usize,
    pub total_archived: usize,
}

/// What `cleanup` did (or would do)
#[derive(Debug, Clone, Default)]
pub struct CleanupActions {
    pub archived: Vec<String>,
    pub dry_run: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Registry {
    projects: HashMap<String, ProjectMetadata>,
    archived: HashMap<String, ArchiveMetadata>,
    activity: ActivityTracker,
}

/// Orchestrates multiple per-project stores
pub struct SimulacrumManager {
    base_path: PathBuf,
    config: StoreConfig,
    summarizer: Summarizer,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    registry: RwLock<Registry>,
    stores: DashMap<String, Arc<SimulacrumStore>>,
    active: RwLock<Option<String>>,
}

impl SimulacrumManager {
    /// Open a manager rooted at `base_path`, loading the registry if one
    /// exists. Corrupt registries start empty rather than failing.
    pub fn open(
        base_path: impl Into<PathBuf>,
        config: StoreConfig,
        summarizer: Summarizer,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> SimulacrumResult<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;
        std::fs::create_dir_all(base_path.join(ARCHIVE_DIR))?;

        let registry_path = base_path.join(REGISTRY_FILE);
        let registry = if registry_path.exists() {
            match std::fs::read_to_string(&registry_path)
                .map_err(SimulacrumError::from)
                .and_then(|c| serde_json::from_str(&c).map_err(SimulacrumError::from))
            {
                Ok(registry) => registry,
                Err(e) => {
                    warn!(error = %e, "Registry unreadable; starting empty");
                    Registry::default()
                }
            }
        } else {
            Registry::default()
        };

        Ok(Self {
            base_path,
            config,
            summarizer,
            embedder,
            registry: RwLock::new(registry),
            stores: DashMap::new(),
            active: RwLock::new(None),
        })
    }

    fn save_registry(&self) -> SimulacrumResult<()> {
        let registry = self.registry.read();
        let json = serde_json::to_string_pretty(&*registry)?;
        std::fs::write(self.base_path.join(REGISTRY_FILE), json)?;
        Ok(())
    }

    fn project_path(&self, name: &str) -> PathBuf {
        self.base_path.join(name)
    }

    fn open_store(&self, name: &str) -> SimulacrumResult<Arc<SimulacrumStore>> {
        let store = SimulacrumStore::open(
            self.project_path(name),
            self.config.clone(),
            self.summarizer.clone(),
            self.embedder.clone(),
        )?;
        Ok(Arc::new(store))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Spawn a new project
    pub fn create(
        &self,
        name: &str,
        description: &str,
        domains: Vec<String>,
    ) -> SimulacrumResult<Arc<SimulacrumStore>> {
        {
            let registry = self.registry.read();
            if registry.projects.contains_key(name) {
                return Err(SimulacrumError::Config(format!(
                    "project '{name}' already exists"
                )));
            }
        }

        let store = self.open_store(name)?;
        let now = Utc::now();
        let day = self.registry.read().activity.current_day();
        let metadata = ProjectMetadata {
            name: name.to_string(),
            description: description.to_string(),
            domains,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            last_active_day: day,
            learning_count: 0,
            node_count: 0,
        };

        self.registry
            .write()
            .projects
            .insert(name.to_string(), metadata);
        self.stores.insert(name.to_string(), store.clone());
        self.save_registry()?;
        info!(project = name, "Created project");
        Ok(store)
    }

    /// Get a project store, lazy-loading it from disk
    pub fn get(&self, name: &str) -> SimulacrumResult<Arc<SimulacrumStore>> {
        if !self.registry.read().projects.contains_key(name) {
            return Err(SimulacrumError::NotFound(format!("project '{name}'")));
        }
        if let Some(store) = self.stores.get(name) {
            return Ok(store.clone());
        }
        let store = self.open_store(name)?;
        self.stores.insert(name.to_string(), store.clone());
        Ok(store)
    }

    /// Activate a project, updating its access and decay bookkeeping
    pub async fn activate(&self, name: &str) -> SimulacrumResult<Arc<SimulacrumStore>> {
        let store = self.get(name)?;
        let stats = store.stats().await;

        {
            let mut registry = self.registry.write();
            registry.activity.record(Utc::now().date_naive());
            let day = registry.activity.current_day();
            if let Some(metadata) = registry.projects.get_mut(name) {
                metadata.last_accessed = Utc::now();
                metadata.access_count += 1;
                metadata.last_active_day = day;
                metadata.learning_count = stats.active_learnings;
                metadata.node_count = stats.memory_nodes;
            }
        }
        *self.active.write() = Some(name.to_string());
        self.save_registry()?;
        Ok(store)
    }

    /// Currently active project name
    pub fn active_name(&self) -> Option<String> {
        self.active.read().clone()
    }

    /// Delete a project outright. `confirm` must be true.
    pub fn delete(&self, name: &str, confirm: bool) -> SimulacrumResult<()> {
        if !confirm {
            return Err(SimulacrumError::Config(
                "must confirm project deletion".to_string(),
            ));
        }
        if self.registry.write().projects.remove(name).is_none() {
            return Err(SimulacrumError::NotFound(format!("project '{name}'")));
        }
        self.stores.remove(name);
        let was_active = self.active.read().as_deref() == Some(name);
        if was_active {
            *self.active.write() = None;
        }
        let path = self.project_path(name);
        if path.exists() {
            std::fs::remove_dir_all(&path)?;
        }
        self.save_registry()?;
        Ok(())
    }

    /// All live projects, most recently accessed first
    pub fn list(&self) -> Vec<ProjectMetadata> {
        let registry = self.registry.read();
        let mut projects: Vec<ProjectMetadata> = registry.projects.values().cloned().collect();
        projects.sort_by(|a, b| b.last_accessed.cmp(&a.last_accessed));
        projects
    }

    pub fn list_archived(&self) -> Vec<ArchiveMetadata> {
        let registry = self.registry.read();
        let mut archived: Vec<ArchiveMetadata> = registry.archived.values().cloned().collect();
        archived.sort_by(|a, b| b.archived_at.cmp(&a.archived_at));
        archived
    }

    // ========================================================================
    // Routing
    // ========================================================================

    /// Suggest projects for a query by domain tags, description overlap,
    /// and name match
    pub fn suggest(&self, query: &str, top_k: usize) -> Vec<(ProjectMetadata, f32)> {
        let query_lower = query.to_lowercase();
        let query_words: std::collections::HashSet<&str> =
            query_lower.split_whitespace().collect();

        let registry = self.registry.read();
        let mut scored: Vec<(ProjectMetadata, f32)> = registry
            .projects
            .values()
            .filter_map(|metadata| {
                let mut score = 0.0f32;
                for domain in &metadata.domains {
                    if query_lower.contains(&domain.to_lowercase()) {
                        score += 0.4;
                    }
                }
                let desc_words: std::collections::HashSet<String> = metadata
                    .description
                    .to_lowercase()
                    .split_whitespace()
                    .map(|w| w.to_string())
                    .collect();
                let overlap = query_words
                    .iter()
                    .filter(|w| desc_words.contains(**w))
                    .count();
                if overlap > 0 {
                    score += 0.3 * (overlap as f32 / 3.0).min(1.0);
                }
                if metadata.access_count > 0 {
                    score += 0.1;
                }
                if query_lower.contains(&metadata.name.to_lowercase()) {
                    score += 0.5;
                }
                (score > 0.0).then(|| (metadata.clone(), score.min(1.0)))
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        scored
    }

    // ========================================================================
    // Merge
    // ========================================================================

    /// Merge one project's knowledge into another, deduplicating by
    /// content identity. Returns the number of records merged.
    pub async fn merge(
        &self,
        source: &str,
        into: &str,
        delete_source: bool,
    ) -> SimulacrumResult<usize> {
        let source_store = self.get(source)?;
        let target_store = self.get(into)?;

        let mut merged = 0usize;

        // Active learnings: content-addressed IDs make dedup free
        for learning in source_store.active_learnings() {
            let id = learning.id();
            if target_store.get_learning(&id).is_none() {
                target_store.add_learning_record(learning)?;
                merged += 1;
            }
        }

        // Memory nodes and concept edges
        let (nodes, edges) = source_store.with_index(|index| {
            (
                index.nodes().cloned().collect::<Vec<_>>(),
                index.edges().cloned().collect::<Vec<_>>(),
            )
        });
        target_store.with_index_mut(|index| {
            for node in nodes {
                let id = node.id();
                if index.get_node(&id).is_none() {
                    index.add_node(node);
                    merged += 1;
                }
            }
            for edge in edges {
                index.add_concept_edge(edge);
            }
        });

        target_store.save().await?;

        {
            let mut registry = self.registry.write();
            let target_learning_count = target_store.active_learnings().len();
            if let Some(metadata) = registry.projects.get_mut(into) {
                metadata.learning_count = target_learning_count;
            }
        }

        if delete_source {
            self.delete(source, true)?;
        }
        self.save_registry()?;
        info!(source, into, merged, "Merged projects");
        Ok(merged)
    }

    // ========================================================================
    // Archive / restore
    // ========================================================================

    /// Archive a project: compress its journal, drop the live directory.
    /// The active project cannot be archived.
    pub fn archive(&self, name: &str, reason: &str) -> SimulacrumResult<ArchiveMetadata> {
        if *self.active.read() == Some(name.to_string()) {
            return Err(SimulacrumError::Config(
                "cannot archive the active project; switch first".to_string(),
            ));
        }
        let metadata = self
            .registry
            .read()
            .projects
            .get(name)
            .cloned()
            .ok_or_else(|| SimulacrumError::NotFound(format!("project '{name}'")))?;

        let journal_path = self.project_path(name).join(JOURNAL_FILE);
        let archive_name = format!("{}_{}.journal.gz", name, Utc::now().format("%Y%m%d_%H%M%S"));
        let archive_path = self.base_path.join(ARCHIVE_DIR).join(&archive_name);

        let compress = || -> SimulacrumResult<()> {
            let journal = if journal_path.exists() {
                std::fs::read(&journal_path)?
            } else {
                Vec::new()
            };
            let file = std::fs::File::create(&archive_path)?;
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder.write_all(&journal)?;
            encoder.finish()?;
            Ok(())
        };
        compress().map_err(|e| {
            SimulacrumError::Capacity(format!("cannot write archive for '{name}': {e}"))
        })?;

        let archive_metadata = ArchiveMetadata {
            name: name.to_string(),
            description: metadata.description.clone(),
            domains: metadata.domains.clone(),
            archived_at: Utc::now(),
            reason: reason.to_string(),
            archive_path,
            learning_count: metadata.learning_count,
        };

        {
            let mut registry = self.registry.write();
            registry.projects.remove(name);
            registry
                .archived
                .insert(name.to_string(), archive_metadata.clone());
        }
        self.stores.remove(name);
        let project_dir = self.project_path(name);
        if project_dir.exists() {
            std::fs::remove_dir_all(&project_dir)?;
        }
        self.save_registry()?;
        info!(project = name, reason, "Archived project");
        Ok(archive_metadata)
    }

    /// Restore an archived project by decompressing its journal and
    /// replaying it into a fresh store
    pub fn restore(&self, name: &str) -> SimulacrumResult<Arc<SimulacrumStore>> {
        let archive_metadata = self
            .registry
            .read()
            .archived
            .get(name)
            .cloned()
            .ok_or_else(|| SimulacrumError::NotFound(format!("archived project '{name}'")))?;

        let compressed = std::fs::read(&archive_metadata.archive_path).map_err(|e| {
            SimulacrumError::Consistency(format!(
                "archive missing for '{name}' at {}: {e}",
                archive_metadata.archive_path.display()
            ))
        })?;
        let mut decoder = GzDecoder::new(&compressed[..]);
        let mut journal = Vec::new();
        decoder.read_to_end(&mut journal).map_err(|e| {
            SimulacrumError::Consistency(format!("unreadable archive for '{name}': {e}"))
        })?;

        let project_dir = self.project_path(name);
        std::fs::create_dir_all(&project_dir)?;
        std::fs::write(project_dir.join(JOURNAL_FILE), journal)?;

        let store = self.open_store(name)?;
        let now = Utc::now();
        {
            let mut registry = self.registry.write();
            registry.archived.remove(name);
            let day = registry.activity.current_day();
            registry.projects.insert(
                name.to_string(),
                ProjectMetadata {
                    name: name.to_string(),
                    description: archive_metadata.description,
                    domains: archive_metadata.domains,
                    created_at: now,
                    last_accessed: now,
                    access_count: 0,
                    last_active_day: day,
                    learning_count: archive_metadata.learning_count,
                    node_count: 0,
                },
            );
        }
        let _ = std::fs::remove_file(&archive_metadata.archive_path);
        self.stores.insert(name.to_string(), store.clone());
        self.save_registry()?;
        info!(project = name, "Restored project from archive");
        Ok(store)
    }

    // ========================================================================
    // Decay & cleanup
    // ========================================================================

    /// Record a day of user engagement (drives all decay clocks)
    pub fn record_activity(&self) -> SimulacrumResult<()> {
        self.registry.write().activity.record(Utc::now().date_naive());
        self.save_registry()
    }

    /// Record engagement on a specific date (testing and backfill)
    pub fn record_activity_on(&self, date: chrono::NaiveDate) -> SimulacrumResult<()> {
        self.registry.write().activity.record(date);
        self.save_registry()
    }

    /// Evaluate staleness and emptiness against the decay policy
    pub fn check_health(&self) -> HealthReport {
        let policy: &DecayPolicy = &self.config.decay;
        let registry = self.registry.read();
        let current_day = registry.activity.current_day();

        let mut report = HealthReport {
            total_projects: registry.projects.len(),
            total_archived: registry.archived.len(),
            ..Default::default()
        };

        for (name, metadata) in &registry.projects {
            let idle_days = current_day.saturating_sub(metadata.last_active_day);
            if idle_days >= policy.stale_days {
                report.stale.push((name.clone(), idle_days));
            }
            if idle_days >= policy.archive_days {
                report.archive_candidates.push(name.clone());
            }
            if metadata.learning_count < policy.min_useful_learnings
                && metadata.node_count < policy.min_useful_nodes
            {
                report.empty.push(name.clone());
            }
        }
        report.stale.sort_by(|a, b| b.1.cmp(&a.1));
        report.archive_candidates.sort();
        report.empty.sort();
        report
    }

    /// Archive projects past the decay threshold. Projects with useful
    /// content below the minimums are archived; the active project is
    /// always skipped.
    pub fn cleanup(&self, dry_run: bool) -> SimulacrumResult<CleanupActions> {
        let health = self.check_health();
        let mut actions = CleanupActions {
            dry_run,
            ..Default::default()
        };

        for name in &health.archive_candidates {
            if self.active_name().as_deref() == Some(name.as_str()) {
                continue;
            }
            if dry_run {
                actions.archived.push(name.clone());
            } else {
                match self.archive(name, "stale") {
                    Ok(_) => actions.archived.push(name.clone()),
                    Err(e) => warn!(project = name, error = %e, "Cleanup archive failed"),
                }
            }
        }
        Ok(actions)
    }

    /// Manager-wide statistics
    pub fn stats(&self) -> HashMap<String, usize> {
        let registry = self.registry.read();
        let mut stats = HashMap::new();
        stats.insert("projects".to_string(), registry.projects.len());
        stats.insert("archived".to_string(), registry.archived.len());
        stats.insert(
            "total_learnings".to_string(),
            registry.projects.values().map(|m| m.learning_count).sum(),
        );
        stats.insert(
            "activity_days".to_string(),
            registry.activity.current_day() as usize,
        );
        stats
    }
}
