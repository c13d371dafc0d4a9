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

//! Episode tracking - what has been tried before
//!
//! Episodes record past problem-solving attempts so the assembler can
//! inject "what not to try" context. Failed episodes are the dead ends.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use simulacrum_core::SimulacrumResult;

/// How an episode ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeOutcome {
    Succeeded,
    Failed,
    Partial,
    Abandoned,
}

impl EpisodeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpisodeOutcome::Succeeded => "succeeded",
            EpisodeOutcome::Failed => "failed",
            EpisodeOutcome::Partial => "partial",
            EpisodeOutcome::Abandoned => "abandoned",
        }
    }
}

/// A past problem-solving attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    /// What was attempted
    pub summary: String,
    pub outcome: EpisodeOutcome,
    pub timestamp: DateTime<Utc>,
    /// Models used during the attempt
    pub models_used: Vec<String>,
    /// Conversation size at the time
    pub turn_count: usize,
    /// Key insights extracted from the episode
    pub learnings_extracted: Vec<String>,
}

impl Episode {
    pub fn new(summary: impl Into<String>, outcome: EpisodeOutcome) -> Self {
        let summary = summary.into();
        let hash = blake3::hash(format!("{}:{}", outcome.as_str(), summary).as_bytes());
        Self {
            id: format!("ep_{}", hex::encode(&hash.as_bytes()[..8])),
            summary,
            outcome,
            timestamp: Utc::now(),
            models_used: Vec::new(),
            turn_count: 0,
            learnings_extracted: Vec::new(),
        }
    }

    pub fn with_models(mut self, models_used: Vec<String>) -> Self {
        self.models_used = models_used;
        self
    }

    pub fn with_turn_count(mut self, turn_count: usize) -> Self {
        self.turn_count = turn_count;
        self
    }

    pub fn with_learnings(mut self, learnings_extracted: Vec<String>) -> Self {
        self.learnings_extracted = learnings_extracted;
        self
    }
}

/// Per-project episode store, one JSON file per episode
#[derive(Debug)]
pub struct EpisodeManager {
    base_path: PathBuf,
    episodes: HashMap<String, Episode>,
}

impl EpisodeManager {
    pub fn new(base_path: impl Into<PathBuf>) -> SimulacrumResult<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;

        let mut episodes = HashMap::new();
        for entry in std::fs::read_dir(&base_path)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                match std::fs::read_to_string(&path)
                    .map_err(|e| e.to_string())
                    .and_then(|c| serde_json::from_str::<Episode>(&c).map_err(|e| e.to_string()))
                {
                    Ok(episode) => {
                        episodes.insert(episode.id.clone(), episode);
                    }
                    Err(e) => warn!(path = %path.display(), error = %e, "Skipping corrupt episode"),
                }
            }
        }

        Ok(Self {
            base_path,
            episodes,
        })
    }

    /// Record an episode. Idempotent by content-derived ID.
    pub fn add(&mut self, episode: Episode) -> SimulacrumResult<String> {
        let id = episode.id.clone();
        if !self.episodes.contains_key(&id) {
            let path = self.base_path.join(format!("{id}.json"));
            std::fs::write(&path, serde_json::to_string_pretty(&episode)?)?;
            self.episodes.insert(id.clone(), episode);
        }
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<&Episode> {
        self.episodes.get(id)
    }

    /// Recent episodes, newest first
    pub fn episodes(&self, limit: usize) -> Vec<&Episode> {
        let mut all: Vec<&Episode> = self.episodes.values().collect();
        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        all.truncate(limit);
        all
    }

    /// Failed attempts, for "what not to try"
    pub fn dead_ends(&self) -> Vec<&Episode> {
        let mut failed: Vec<&Episode> = self
            .episodes
            .values()
            .filter(|e| e.outcome == EpisodeOutcome::Failed)
            .collect();
        failed.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        failed
    }

    /// Successful attempts, for learning what works
    pub fn successes(&self) -> Vec<&Episode> {
        self.episodes
            .values()
            .filter(|e| e.outcome == EpisodeOutcome::Succeeded)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }
}
