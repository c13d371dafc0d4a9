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

//! Concept relationship graph
//!
//! Models typed relationships between memory nodes. Nodes with many inbound
//! references are "hub" knowledge and rank higher in retrieval.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

/// Type of relationship between two concepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    /// Target asserts the opposite of source
    Contradicts,
    /// Source expands on target
    Elaborates,
    /// Source replaces target
    Supersedes,
    /// Source requires target
    DependsOn,
    /// Source provides evidence for target
    Supports,
    /// Generic association
    RelatesTo,
}

/// A typed, weighted edge in the concept graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptEdge {
    pub source_id: String,
    pub target_id: String,
    pub relation: RelationType,
    pub weight: f32,
}

impl ConceptEdge {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relation: RelationType,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            relation,
            weight: 1.0,
        }
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }
}

/// Topological constraints for a query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologicalQuery {
    /// Anchor node: results must be connected to it
    pub related_to: Option<String>,
    /// Restrict to one edge type (direct edges only)
    pub relation: Option<RelationType>,
    /// How many hops to explore when no relation filter is set
    pub max_depth: usize,
}

impl TopologicalQuery {
    pub fn has_constraints(&self) -> bool {
        self.related_to.is_some()
    }
}

/// Directed graph of concept relationships
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ConceptGraph {
    outgoing: HashMap<String, Vec<ConceptEdge>>,
    incoming: HashMap<String, Vec<ConceptEdge>>,
}

impl ConceptGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an edge. Duplicate (source, target, relation) triples are ignored.
    pub fn add_edge(&mut self, edge: ConceptEdge) {
        let exists = self
            .outgoing
            .get(&edge.source_id)
            .map(|edges| {
                edges
                    .iter()
                    .any(|e| e.target_id == edge.target_id && e.relation == edge.relation)
            })
            .unwrap_or(false);
        if exists {
            return;
        }
        self.incoming
            .entry(edge.target_id.clone())
            .or_default()
            .push(edge.clone());
        self.outgoing
            .entry(edge.source_id.clone())
            .or_default()
            .push(edge);
    }

    /// Outgoing edges from a node, optionally filtered by relation
    pub fn outgoing(&self, node_id: &str, relation: Option<RelationType>) -> Vec<&ConceptEdge> {
        self.outgoing
            .get(node_id)
            .map(|edges| {
                edges
                    .iter()
                    .filter(|e| relation.map(|r| e.relation == r).unwrap_or(true))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Incoming edges to a node, optionally filtered by relation
    pub fn incoming(&self, node_id: &str, relation: Option<RelationType>) -> Vec<&ConceptEdge> {
        self.incoming
            .get(node_id)
            .map(|edges| {
                edges
                    .iter()
                    .filter(|e| relation.map(|r| e.relation == r).unwrap_or(true))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of other nodes referencing this one (hub score signal)
    pub fn inbound_count(&self, node_id: &str) -> usize {
        self.incoming.get(node_id).map(Vec::len).unwrap_or(0)
    }

    /// Nodes contradicting the given node, in either direction
    pub fn find_contradictions(&self, node_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .outgoing(node_id, Some(RelationType::Contradicts))
            .iter()
            .map(|e| e.target_id.clone())
            .chain(
                self.incoming(node_id, Some(RelationType::Contradicts))
                    .iter()
                    .map(|e| e.source_id.clone()),
            )
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// All node IDs reachable within `depth` hops (either direction),
    /// mapped to their hop distance. The anchor itself is excluded.
    pub fn neighborhood(&self, node_id: &str, depth: usize) -> HashMap<String, usize> {
        let mut distances: HashMap<String, usize> = HashMap::new();
        let mut queue: VecDeque<(String, usize)> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();

        visited.insert(node_id.to_string());
        queue.push_back((node_id.to_string(), 0));

        while let Some((current, dist)) = queue.pop_front() {
            if dist >= depth {
                continue;
            }
            let neighbors = self
                .outgoing(&current, None)
                .iter()
                .map(|e| e.target_id.clone())
                .chain(
                    self.incoming(&current, None)
                        .iter()
                        .map(|e| e.source_id.clone()),
                )
                .collect::<Vec<_>>();
            for neighbor in neighbors {
                if visited.insert(neighbor.clone()) {
                    distances.insert(neighbor.clone(), dist + 1);
                    queue.push_back((neighbor, dist + 1));
                }
            }
        }

        distances
    }

    /// Remove all references to a node
    pub fn remove_node(&mut self, node_id: &str) {
        self.outgoing.remove(node_id);
        self.incoming.remove(node_id);
        for edges in self.outgoing.values_mut() {
            edges.retain(|e| e.target_id != node_id);
        }
        for edges in self.incoming.values_mut() {
            edges.retain(|e| e.source_id != node_id);
        }
    }

    /// Drop edges below a weight floor. Returns how many were pruned.
    pub fn prune(&mut self, min_weight: f32) -> usize {
        let before = self.edge_count();
        for edges in self.outgoing.values_mut() {
            edges.retain(|e| e.weight >= min_weight);
        }
        for edges in self.incoming.values_mut() {
            edges.retain(|e| e.weight >= min_weight);
        }
        before - self.edge_count()
    }

    /// Total number of edges
    pub fn edge_count(&self) -> usize {
        self.outgoing.values().map(Vec::len).sum()
    }

    /// All edges, for serialization and merging
    pub fn edges(&self) -> impl Iterator<Item = &ConceptEdge> {
        self.outgoing.values().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> ConceptGraph {
        let mut g = ConceptGraph::new();
        g.add_edge(ConceptEdge::new("a", "b", RelationType::Elaborates));
        g.add_edge(ConceptEdge::new("b", "c", RelationType::DependsOn));
        g.add_edge(ConceptEdge::new("d", "a", RelationType::Contradicts));
        g
    }

    #[test]
    fn test_add_edge_dedups() {
        let mut g = ConceptGraph::new();
        g.add_edge(ConceptEdge::new("a", "b", RelationType::Supports));
        g.add_edge(ConceptEdge::new("a", "b", RelationType::Supports));
        assert_eq!(g.edge_count(), 1);

        // Different relation between the same pair is a new edge
        g.add_edge(ConceptEdge::new("a", "b", RelationType::Contradicts));
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn test_contradictions_both_directions() {
        let g = graph();
        assert_eq!(g.find_contradictions("a"), vec!["d".to_string()]);
        assert_eq!(g.find_contradictions("d"), vec!["a".to_string()]);
    }

    #[test]
    fn test_neighborhood_depth() {
        let g = graph();
        let one_hop = g.neighborhood("a", 1);
        assert_eq!(one_hop.len(), 2); // b and d
        assert_eq!(one_hop.get("b"), Some(&1));

        let two_hops = g.neighborhood("a", 2);
        assert_eq!(two_hops.len(), 3); // b, d, c
        assert_eq!(two_hops.get("c"), Some(&2));
    }

    #[test]
    fn test_inbound_count() {
        let g = graph();
        assert_eq!(g.inbound_count("a"), 1);
        assert_eq!(g.inbound_count("d"), 0);
    }

    #[test]
    fn test_prune_weak_edges() {
        let mut g = ConceptGraph::new();
        g.add_edge(ConceptEdge::new("a", "b", RelationType::RelatesTo).with_weight(0.1));
        g.add_edge(ConceptEdge::new("a", "c", RelationType::RelatesTo).with_weight(0.9));
        assert_eq!(g.prune(0.5), 1);
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn test_remove_node() {
        let mut g = graph();
        g.remove_node("a");
        assert_eq!(g.inbound_count("b"), 0);
        assert!(g.find_contradictions("d").is_empty());
    }
}
