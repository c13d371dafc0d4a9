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

//! ConversationDag - graph-based conversation structure
//!
//! Unlike linear chat history, conversations form a DAG: branches when
//! exploring alternatives, merges when conclusions are reached, dead ends
//! marked rather than deleted. Turns are keyed by content hash, so append
//! is idempotent and order-independent.
//!
//! Forward parent references are tolerated: a turn whose parents have not
//! arrived yet is accepted and flagged, and a consistency-check pass can
//! report parents that never materialized.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::SimulacrumResult;
use crate::turn::{Learning, LearningId, Turn, TurnId, TurnType};

/// Directed acyclic graph of conversation turns and extracted learnings.
///
/// - Content-addressable: records identified by hash
/// - Immutable history: records never modified, only added
/// - Supersession instead of deletion: learnings keep an audit trail
#[derive(Debug, Default, Clone)]
pub struct ConversationDag {
    /// All turns indexed by content-hash ID
    turns: HashMap<String, Turn>,
    /// Extracted learnings indexed by ID
    learnings: HashMap<String, Learning>,
    /// Parent ID -> set of child IDs
    children: HashMap<String, HashSet<String>>,
    /// Turn IDs with no parents (conversation starts)
    roots: HashSet<String>,
    /// Turn IDs with no children (current endpoints)
    heads: HashSet<String>,
    /// Current position in the conversation
    active_head: Option<TurnId>,
    /// Turn IDs marked as dead ends (don't continue)
    dead_ends: HashSet<String>,
    /// Parent IDs referenced before (or without) their turn arriving
    dangling_parents: HashSet<String>,
}

/// Serialized form of the DAG; graph structure is rebuilt on load
#[derive(Debug, Serialize, Deserialize)]
struct DagSnapshot {
    turns: Vec<Turn>,
    learnings: Vec<Learning>,
    active_head: Option<TurnId>,
    dead_ends: Vec<String>,
}

/// Report from a consistency-check pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyReport {
    /// Parent IDs referenced by some turn but absent from the DAG
    pub dangling_parents: Vec<String>,
}

impl ConsistencyReport {
    /// Did the check pass without findings?
    pub fn is_clean(&self) -> bool {
        self.dangling_parents.is_empty()
    }
}

/// DAG statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagStats {
    pub total_turns: usize,
    pub roots: usize,
    pub heads: usize,
    pub dead_ends: usize,
    pub learnings: usize,
    pub active_learnings: usize,
    pub dangling_parents: usize,
}

impl ConversationDag {
    /// Create an empty DAG
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn.
    ///
    /// Idempotent: appending a turn whose ID already exists is a no-op and
    /// returns the existing ID. Parents that are not yet present are
    /// accepted and flagged as dangling until they arrive.
    pub fn append_turn(&mut self, turn: Turn) -> TurnId {
        let turn_id = turn.id();

        if self.turns.contains_key(&turn_id.0) {
            return turn_id;
        }

        if turn.parent_ids.is_empty() {
            self.roots.insert(turn_id.0.clone());
        } else {
            for parent_id in &turn.parent_ids {
                if !self.turns.contains_key(&parent_id.0) {
                    self.dangling_parents.insert(parent_id.0.clone());
                }
                self.children
                    .entry(parent_id.0.clone())
                    .or_default()
                    .insert(turn_id.0.clone());
                self.heads.remove(&parent_id.0);
            }
        }

        // A newly arrived turn may resolve an earlier forward reference
        self.dangling_parents.remove(&turn_id.0);

        // A parent arriving after its children is not a head
        let has_children = self
            .children
            .get(&turn_id.0)
            .map(|c| !c.is_empty())
            .unwrap_or(false);
        if !has_children {
            self.heads.insert(turn_id.0.clone());
        }
        self.active_head = Some(turn_id.clone());
        self.turns.insert(turn_id.0.clone(), turn);

        turn_id
    }

    /// Convenience: append a user message parented on the active head
    pub fn append_user(&mut self, content: impl Into<String>) -> TurnId {
        let parents = self.active_head.iter().cloned().collect();
        self.append_turn(Turn::user(content).with_parents(parents))
    }

    /// Convenience: append an assistant message parented on the active head
    pub fn append_assistant(&mut self, content: impl Into<String>) -> TurnId {
        let parents = self.active_head.iter().cloned().collect();
        self.append_turn(Turn::assistant(content).with_parents(parents))
    }

    /// Append a learning. Idempotent by content-addressed ID.
    ///
    /// Re-appending an existing learning is a no-op except that a
    /// supersession pointer on the incoming copy is merged in; the pointer
    /// is metadata, not identity, and replay must be able to restore it.
    pub fn append_learning(&mut self, learning: Learning) -> LearningId {
        let id = learning.id();
        match self.learnings.entry(id.0.clone()) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                if entry.get().superseded_by.is_none() && learning.superseded_by.is_some() {
                    entry.get_mut().superseded_by = learning.superseded_by;
                }
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(learning);
            }
        }
        id
    }

    /// Get a turn by ID
    pub fn get_turn(&self, id: &TurnId) -> Option<&Turn> {
        self.turns.get(&id.0)
    }

    /// Get a learning by ID. Superseded learnings remain retrievable.
    pub fn get_learning(&self, id: &LearningId) -> Option<&Learning> {
        self.learnings.get(&id.0)
    }

    /// Supersede `old` with a newer learning.
    ///
    /// The new learning is appended and the old record is rewritten with a
    /// supersession pointer. The old learning keeps its ID and stays
    /// retrievable via [`get_learning`](Self::get_learning); only active
    /// queries exclude it.
    pub fn supersede_learning(
        &mut self,
        old: &LearningId,
        replacement: Learning,
    ) -> Option<LearningId> {
        if !self.learnings.contains_key(&old.0) {
            return None;
        }
        let new_id = self.append_learning(replacement);
        if let Some(entry) = self.learnings.get_mut(&old.0) {
            entry.superseded_by = Some(new_id.clone());
        }
        Some(new_id)
    }

    /// All learnings not superseded by newer versions
    pub fn active_learnings(&self) -> impl Iterator<Item = &Learning> {
        self.learnings.values().filter(|l| l.is_active())
    }

    /// All learnings, superseded included
    pub fn all_learnings(&self) -> impl Iterator<Item = &Learning> {
        self.learnings.values()
    }

    /// All turns, in no particular order
    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.values()
    }

    /// Number of turns in the DAG
    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    /// Current position in the conversation
    pub fn active_head(&self) -> Option<&TurnId> {
        self.active_head.as_ref()
    }

    /// Switch the active head to a known turn
    pub fn checkout(&mut self, turn_id: &TurnId) -> bool {
        if self.turns.contains_key(&turn_id.0) {
            self.active_head = Some(turn_id.clone());
            true
        } else {
            false
        }
    }

    /// Mark a turn (default: the active head) as a dead end
    pub fn mark_dead_end(&mut self, turn_id: Option<&TurnId>) {
        let target = turn_id.cloned().or_else(|| self.active_head.clone());
        if let Some(id) = target {
            self.dead_ends.insert(id.0);
        }
    }

    /// Is this turn on a dead-end path?
    pub fn is_dead_end(&self, turn_id: &TurnId) -> bool {
        self.dead_ends.contains(&turn_id.0)
    }

    /// Path from root to a specific turn, chronological order.
    ///
    /// Follows the first parent at each step (the main thread).
    pub fn path_to(&self, turn_id: &TurnId) -> Vec<&Turn> {
        let mut path = Vec::new();
        let mut current = Some(turn_id.clone());

        while let Some(id) = current {
            let Some(turn) = self.turns.get(&id.0) else {
                break;
            };
            path.push(turn);
            current = turn.parent_ids.first().cloned();
        }

        path.reverse();
        path
    }

    /// The n most recent turns on the active path
    pub fn recent_turns(&self, n: usize) -> Vec<&Turn> {
        let Some(head) = &self.active_head else {
            return Vec::new();
        };
        let path = self.path_to(head);
        let skip = path.len().saturating_sub(n);
        path.into_iter().skip(skip).collect()
    }

    /// Find turns with matching tags, most recent first
    pub fn find_related_turns(&self, tags: &HashSet<String>, limit: usize) -> Vec<&Turn> {
        let mut matches: Vec<&Turn> = self
            .turns
            .values()
            .filter(|t| t.tags.iter().any(|tag| tags.contains(tag)))
            .collect();
        matches.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matches.truncate(limit);
        matches
    }

    /// Check for parents referenced but never appended.
    ///
    /// Dangling parents are tolerated at append time; this pass reports the
    /// ones that never materialized so callers can decide what to do.
    pub fn check_consistency(&self) -> ConsistencyReport {
        let mut dangling: Vec<String> = self
            .dangling_parents
            .iter()
            .filter(|id| !self.turns.contains_key(*id))
            .cloned()
            .collect();
        dangling.sort();
        if !dangling.is_empty() {
            warn!(count = dangling.len(), "DAG has unresolved parent references");
        }
        ConsistencyReport {
            dangling_parents: dangling,
        }
    }

    /// DAG statistics
    pub fn stats(&self) -> DagStats {
        DagStats {
            total_turns: self.turns.len(),
            roots: self.roots.len(),
            heads: self.heads.len(),
            dead_ends: self.dead_ends.len(),
            learnings: self.learnings.len(),
            active_learnings: self.active_learnings().count(),
            dangling_parents: self.check_consistency().dangling_parents.len(),
        }
    }

    /// Save the DAG to a JSON file
    pub fn save(&self, path: &Path) -> SimulacrumResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut turns: Vec<Turn> = self.turns.values().cloned().collect();
        turns.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        let snapshot = DagSnapshot {
            turns,
            learnings: self.learnings.values().cloned().collect(),
            active_head: self.active_head.clone(),
            dead_ends: self.dead_ends.iter().cloned().collect(),
        };
        let json = serde_json::to_string(&snapshot)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a DAG from a JSON file. Returns an empty DAG if the file is
    /// missing; a corrupt file is a consistency error on the caller.
    pub fn load(path: &Path) -> SimulacrumResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)?;
        let snapshot: DagSnapshot = serde_json::from_str(&content)?;

        let mut dag = Self::new();
        for turn in snapshot.turns {
            dag.append_turn(turn);
        }
        for learning in snapshot.learnings {
            let id = learning.id();
            dag.learnings.insert(id.0, learning);
        }
        dag.dead_ends = snapshot.dead_ends.into_iter().collect();
        if let Some(head) = snapshot.active_head {
            if dag.turns.contains_key(&head.0) {
                dag.active_head = Some(head);
            }
        }
        Ok(dag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turn::LearningCategory;

    #[test]
    fn test_append_is_idempotent() {
        let mut dag = ConversationDag::new();
        let id1 = dag.append_turn(Turn::user("hello"));
        let id2 = dag.append_turn(Turn::user("hello"));
        assert_eq!(id1, id2);
        assert_eq!(dag.turn_count(), 1);
    }

    #[test]
    fn test_append_order_independent() {
        let a = Turn::user("first");
        let b = Turn::assistant("second").with_parents(vec![a.id()]);

        let mut forward = ConversationDag::new();
        forward.append_turn(a.clone());
        forward.append_turn(b.clone());

        let mut reversed = ConversationDag::new();
        reversed.append_turn(b.clone());
        reversed.append_turn(a.clone());

        assert_eq!(forward.turn_count(), reversed.turn_count());
        assert!(reversed.check_consistency().is_clean());
    }

    #[test]
    fn test_dangling_parent_flagged_then_resolved() {
        let a = Turn::user("root");
        let b = Turn::assistant("child").with_parents(vec![a.id()]);

        let mut dag = ConversationDag::new();
        dag.append_turn(b);
        let report = dag.check_consistency();
        assert_eq!(report.dangling_parents, vec![a.id().0.clone()]);

        dag.append_turn(a);
        assert!(dag.check_consistency().is_clean());
    }

    #[test]
    fn test_conversation_threading() {
        let mut dag = ConversationDag::new();
        dag.append_user("q1");
        dag.append_assistant("a1");
        dag.append_user("q2");
        let head = dag.append_assistant("a2");

        let path = dag.path_to(&head);
        assert_eq!(path.len(), 4);
        assert_eq!(path[0].content, "q1");
        assert_eq!(path[3].content, "a2");

        let recent = dag.recent_turns(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "q2");
    }

    #[test]
    fn test_supersession_is_non_destructive() {
        let mut dag = ConversationDag::new();
        let old = Learning::new("timeout is 5s", LearningCategory::Fact);
        let old_id = dag.append_learning(old);

        let newer = Learning::new("timeout is 30s", LearningCategory::Fact);
        let new_id = dag
            .supersede_learning(&old_id, newer)
            .expect("old learning exists");

        // Excluded from active queries
        let active: Vec<_> = dag.active_learnings().collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].fact, "timeout is 30s");

        // But never physically deleted
        let old = dag.get_learning(&old_id).expect("still retrievable");
        assert_eq!(old.superseded_by.as_ref(), Some(&new_id));
    }

    #[test]
    fn test_replayed_supersession_pointer_merges() {
        // Replay order: old without pointer, replacement, old with pointer
        let old = Learning::new("timeout is 5s", LearningCategory::Fact);
        let newer = Learning::new("timeout is 30s", LearningCategory::Fact);
        let mut old_with_pointer = old.clone();
        old_with_pointer.superseded_by = Some(newer.id());

        let mut dag = ConversationDag::new();
        dag.append_learning(old.clone());
        dag.append_learning(newer);
        dag.append_learning(old_with_pointer);

        assert_eq!(dag.active_learnings().count(), 1);
        assert!(dag.get_learning(&old.id()).unwrap().superseded_by.is_some());
    }

    #[test]
    fn test_learning_dedup() {
        let mut dag = ConversationDag::new();
        dag.append_learning(Learning::new("Uses tokio", LearningCategory::Fact));
        dag.append_learning(Learning::new("Uses tokio", LearningCategory::Fact));
        assert_eq!(dag.all_learnings().count(), 1);
    }

    #[test]
    fn test_dead_end_marking() {
        let mut dag = ConversationDag::new();
        let id = dag.append_user("try approach A");
        dag.mark_dead_end(None);
        assert!(dag.is_dead_end(&id));
    }

    #[test]
    fn test_find_related_turns() {
        let mut dag = ConversationDag::new();
        dag.append_turn(Turn::user("about caching").with_tags(vec!["cache"]));
        dag.append_turn(Turn::user("about auth").with_tags(vec!["auth"]));

        let tags: HashSet<String> = ["cache".to_string()].into();
        let related = dag.find_related_turns(&tags, 10);
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].content, "about caching");
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dag.json");

        let mut dag = ConversationDag::new();
        dag.append_user("persist me");
        let head = dag.append_assistant("done");
        dag.append_learning(Learning::new("persists fine", LearningCategory::Fact));
        dag.mark_dead_end(None);
        dag.save(&path).unwrap();

        let loaded = ConversationDag::load(&path).unwrap();
        assert_eq!(loaded.turn_count(), 2);
        assert_eq!(loaded.active_learnings().count(), 1);
        assert!(loaded.is_dead_end(&head));
        assert_eq!(loaded.active_head(), Some(&head));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let dag = ConversationDag::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(dag.turn_count(), 0);
    }
}
