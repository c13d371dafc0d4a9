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

//! Unified store supporting all memory topologies
//!
//! One queryable store over spatial, topological, structural, and faceted
//! views of the same nodes, plus embedding similarity. Queries may
//! constrain any subset of axes simultaneously; results must satisfy ALL
//! configured constraints, and unconstrained axes contribute score 1.0.
//!
//! Pure in-memory: no method here suspends. Query-time embeddings are the
//! caller's job (pass the vector in).

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::concept::{ConceptEdge, ConceptGraph, RelationType, TopologicalQuery};
use crate::error::IndexResult;
use crate::facets::{facet_match, FacetQuery, FacetedIndex};
use crate::node::{MemoryNode, NodeId};
use crate::spatial::{spatial_match, SpatialQuery};
use crate::structural::{structural_match, DocumentTree, StructuralQuery};
use crate::vector::{VectorIndex, VectorMatch};

// Persisted artifact names
const NODES_FILE: &str = "nodes.json";
const GRAPH_FILE: &str = "graph.json";
const TREES_FILE: &str = "trees.json";
const VECTORS_FILE: &str = "vectors.bin.gz";

/// A query over any subset of the four axes plus text similarity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnifiedQuery {
    /// Keyword fallback text; also the text the caller embedded if a
    /// query vector is supplied
    pub text: Option<String>,
    /// Spatial constraints
    pub spatial: Option<SpatialQuery>,
    /// Structural constraints
    pub structural: Option<StructuralQuery>,
    /// Facet constraints
    pub facets: Option<FacetQuery>,
    /// Topological constraints
    pub topological: Option<TopologicalQuery>,
    /// Maximum results
    pub limit: usize,
}

impl UnifiedQuery {
    pub fn new() -> Self {
        Self {
            limit: 10,
            ..Default::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_spatial(mut self, spatial: SpatialQuery) -> Self {
        self.spatial = Some(spatial);
        self
    }

    pub fn with_structural(mut self, structural: StructuralQuery) -> Self {
        self.structural = Some(structural);
        self
    }

    pub fn with_facets(mut self, facets: FacetQuery) -> Self {
        self.facets = Some(facets);
        self
    }

    pub fn related_to(mut self, node_id: &NodeId, relation: Option<RelationType>) -> Self {
        self.topological = Some(TopologicalQuery {
            related_to: Some(node_id.0.clone()),
            relation,
            max_depth: 2,
        });
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Store statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedStoreStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub faceted_nodes: usize,
    pub embedded_nodes: usize,
    pub document_trees: usize,
}

/// Unified multi-topology memory store
#[derive(Debug)]
pub struct UnifiedMemoryStore {
    base_path: PathBuf,
    embedding_dims: usize,
    nodes: HashMap<String, MemoryNode>,
    concept_graph: ConceptGraph,
    facet_index: FacetedIndex,
    document_trees: HashMap<String, DocumentTree>,
    vector_index: VectorIndex,
}

impl UnifiedMemoryStore {
    /// Create an empty store rooted at `base_path`
    pub fn new(base_path: impl Into<PathBuf>, embedding_dims: usize) -> Self {
        Self {
            base_path: base_path.into(),
            embedding_dims,
            nodes: HashMap::new(),
            concept_graph: ConceptGraph::new(),
            facet_index: FacetedIndex::new(),
            document_trees: HashMap::new(),
            vector_index: VectorIndex::new(embedding_dims),
        }
    }

    /// Change embedding dimensionality, re-indexing nodes whose stored
    /// vectors match the new width
    pub fn set_embedding_dims(&mut self, dims: usize) {
        if dims == self.embedding_dims {
            return;
        }
        debug!(old = self.embedding_dims, new = dims, "Re-indexing vectors");
        self.embedding_dims = dims;
        self.vector_index = VectorIndex::new(dims);
        for node in self.nodes.values() {
            if let Some(embedding) = &node.embedding {
                if embedding.len() == dims {
                    let _ = self.vector_index.add(node.id().0, embedding.clone());
                }
            }
        }
    }

    pub fn embedding_dims(&self) -> usize {
        self.embedding_dims
    }

    /// Add a node, updating every index that has something to say about it
    pub fn add_node(&mut self, node: MemoryNode) -> NodeId {
        let id = node.id();

        if let Some(facets) = &node.facets {
            self.facet_index.add(id.0.clone(), facets);
        }
        for edge in &node.edges {
            self.concept_graph.add_edge(edge.clone());
        }
        if let Some(embedding) = &node.embedding {
            if let Err(e) = self.vector_index.add(id.0.clone(), embedding.clone()) {
                warn!(node = %id, error = %e, "Skipping embedding with wrong dimensions");
            }
        }

        self.nodes.insert(id.0.clone(), node);
        id
    }

    /// Add a concept edge directly (merge paths)
    pub fn add_concept_edge(&mut self, edge: ConceptEdge) {
        self.concept_graph.add_edge(edge);
    }

    /// Register a parsed document tree for structural lookups
    pub fn add_document_tree(&mut self, tree: DocumentTree) {
        self.document_trees.insert(tree.doc_path.clone(), tree);
    }

    pub fn document_tree(&self, doc_path: &str) -> Option<&DocumentTree> {
        self.document_trees.get(doc_path)
    }

    pub fn get_node(&self, id: &NodeId) -> Option<&MemoryNode> {
        self.nodes.get(&id.0)
    }

    /// Remove a node from the store and all indexes
    pub fn remove_node(&mut self, id: &NodeId) -> bool {
        if self.nodes.remove(&id.0).is_none() {
            return false;
        }
        self.facet_index.remove(&id.0);
        self.vector_index.remove(&id.0);
        self.concept_graph.remove_node(&id.0);
        true
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Most recent nodes
    pub fn recent(&self, limit: usize) -> Vec<&MemoryNode> {
        let mut nodes: Vec<&MemoryNode> = self.nodes.values().collect();
        nodes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        nodes.truncate(limit);
        nodes
    }

    /// Nodes contradicting the given node
    pub fn find_contradictions(&self, id: &NodeId) -> Vec<&MemoryNode> {
        self.concept_graph
            .find_contradictions(&id.0)
            .iter()
            .filter_map(|nid| self.nodes.get(nid))
            .collect()
    }

    /// Nodes that elaborate on the given node
    pub fn find_elaborations(&self, id: &NodeId) -> Vec<&MemoryNode> {
        self.concept_graph
            .incoming(&id.0, Some(RelationType::Elaborates))
            .iter()
            .filter_map(|e| self.nodes.get(&e.source_id))
            .collect()
    }

    /// Nodes related within `depth` hops
    pub fn find_related(&self, id: &NodeId, depth: usize) -> Vec<&MemoryNode> {
        self.concept_graph
            .neighborhood(&id.0, depth)
            .keys()
            .filter_map(|nid| self.nodes.get(nid))
            .collect()
    }

    /// Hybrid query across any subset of axes.
    ///
    /// `query_vector` is the embedded form of `query.text`, if the caller
    /// has an embedding provider wired; without it, text matching falls
    /// back to keyword containment. Returns nodes satisfying ALL
    /// configured constraints, scored by the average of the axis scores.
    pub fn query(
        &self,
        query: &UnifiedQuery,
        query_vector: Option<&[f32]>,
    ) -> Vec<(&MemoryNode, f32)> {
        let limit = if query.limit == 0 { 10 } else { query.limit };
        let mut candidates: Option<HashSet<String>> = None;
        let mut scores: HashMap<String, Vec<f32>> = HashMap::new();

        fn intersect(candidates: &mut Option<HashSet<String>>, found: HashSet<String>) {
            *candidates = Some(match candidates.take() {
                Some(existing) => existing.intersection(&found).cloned().collect(),
                None => found,
            });
        }

        // Facets first: the inverted index narrows cheaply
        if let Some(facet_query) = query.facets.as_ref().filter(|q| q.has_constraints()) {
            let results = self.facet_index.query(facet_query);
            let found: HashSet<String> = results.iter().map(|(id, _)| id.clone()).collect();
            for (id, score) in results {
                scores.entry(id).or_default().push(score);
            }
            intersect(&mut candidates, found);
        }

        if let Some(topo) = query.topological.as_ref().filter(|q| q.has_constraints()) {
            let anchor = topo.related_to.as_deref().unwrap_or_default();
            let mut found = HashSet::new();
            if let Some(relation) = topo.relation {
                for edge in self.concept_graph.outgoing(anchor, Some(relation)) {
                    found.insert(edge.target_id.clone());
                    scores.entry(edge.target_id.clone()).or_default().push(1.0);
                }
            } else {
                let depth = topo.max_depth.max(1);
                for (id, dist) in self.concept_graph.neighborhood(anchor, depth) {
                    scores
                        .entry(id.clone())
                        .or_default()
                        .push(1.0 / dist as f32);
                    found.insert(id);
                }
            }
            intersect(&mut candidates, found);
        }

        if let Some(spatial_query) = query.spatial.as_ref().filter(|q| q.has_constraints()) {
            let mut found = HashSet::new();
            for node in self.nodes.values() {
                if let Some(spatial) = &node.spatial {
                    let score = spatial_match(spatial, spatial_query);
                    if score > 0.0 {
                        let id = node.id().0;
                        scores.entry(id.clone()).or_default().push(score);
                        found.insert(id);
                    }
                }
            }
            intersect(&mut candidates, found);
        }

        if let Some(structural_query) = query.structural.as_ref().filter(|q| q.has_constraints()) {
            let mut found = HashSet::new();
            for node in self.nodes.values() {
                if let Some(structural) = &node.structural {
                    let score = structural_match(structural, structural_query);
                    if score > 0.0 {
                        let id = node.id().0;
                        scores.entry(id.clone()).or_default().push(score);
                        found.insert(id);
                    }
                }
            }
            intersect(&mut candidates, found);
        }

        if let Some(text) = query.text.as_ref().filter(|t| !t.is_empty()) {
            let mut found = HashSet::new();
            if let Some(vector) = query_vector.filter(|_| !self.vector_index.is_empty()) {
                for VectorMatch { id, score } in self.vector_index.search(vector, limit * 3) {
                    scores.entry(id.clone()).or_default().push(score);
                    found.insert(id);
                }
            } else {
                // Keyword fallback when no embedding is wired
                let needle = text.to_lowercase();
                for node in self.nodes.values() {
                    if node.content.to_lowercase().contains(&needle) {
                        let id = node.id().0;
                        scores.entry(id.clone()).or_default().push(0.8);
                        found.insert(id);
                    }
                }
            }
            intersect(&mut candidates, found);
        }

        // No constraints at all: recent nodes, unconstrained score
        let Some(candidates) = candidates else {
            return self.recent(limit).into_iter().map(|n| (n, 1.0)).collect();
        };

        let mut results: Vec<(&MemoryNode, f32)> = candidates
            .iter()
            .filter_map(|id| {
                let node = self.nodes.get(id)?;
                let node_scores = scores.get(id).cloned().unwrap_or_else(|| vec![1.0]);
                let avg = node_scores.iter().sum::<f32>() / node_scores.len() as f32;
                Some((node, avg))
            })
            .collect();
        results.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.created_at.cmp(&a.0.created_at))
        });
        results.truncate(limit);
        results
    }

    /// Convenience: spatial-only query
    pub fn query_spatial(&self, spatial: SpatialQuery, limit: usize) -> Vec<(&MemoryNode, f32)> {
        self.query(
            &UnifiedQuery::new().with_spatial(spatial).with_limit(limit),
            None,
        )
    }

    /// Convenience: facet-only query
    pub fn query_facets(&self, facets: FacetQuery, limit: usize) -> Vec<(&MemoryNode, f32)> {
        self.query(
            &UnifiedQuery::new().with_facets(facets).with_limit(limit),
            None,
        )
    }

    /// Raw facet scoring for a single node (diagnostics)
    pub fn score_facets(&self, id: &NodeId, facet_query: &FacetQuery) -> Option<f32> {
        let node = self.nodes.get(&id.0)?;
        node.facets.as_ref().map(|f| facet_match(f, facet_query))
    }

    pub fn stats(&self) -> UnifiedStoreStats {
        UnifiedStoreStats {
            total_nodes: self.nodes.len(),
            total_edges: self.concept_graph.edge_count(),
            faceted_nodes: self.facet_index.len(),
            embedded_nodes: self.vector_index.len(),
            document_trees: self.document_trees.len(),
        }
    }

    /// All nodes, for merging between stores
    pub fn nodes(&self) -> impl Iterator<Item = &MemoryNode> {
        self.nodes.values()
    }

    /// All concept edges, for merging between stores
    pub fn edges(&self) -> impl Iterator<Item = &ConceptEdge> {
        self.concept_graph.edges()
    }

    // === Persistence ===

    /// Persist the store for warm start
    pub fn save(&self) -> IndexResult<()> {
        std::fs::create_dir_all(&self.base_path)?;

        let nodes: Vec<&MemoryNode> = self.nodes.values().collect();
        std::fs::write(
            self.base_path.join(NODES_FILE),
            serde_json::to_string(&nodes)?,
        )?;

        let edges: Vec<&ConceptEdge> = self.concept_graph.edges().collect();
        std::fs::write(
            self.base_path.join(GRAPH_FILE),
            serde_json::to_string(&edges)?,
        )?;

        let trees: Vec<&DocumentTree> = self.document_trees.values().collect();
        std::fs::write(
            self.base_path.join(TREES_FILE),
            serde_json::to_string(&trees)?,
        )?;

        if !self.vector_index.is_empty() {
            self.vector_index.save(&self.base_path.join(VECTORS_FILE))?;
        }
        Ok(())
    }

    /// Load a store persisted with [`save`](Self::save).
    ///
    /// Missing artifacts yield an empty store; a corrupt node entry is
    /// skipped rather than failing the whole load.
    pub fn load(base_path: impl Into<PathBuf>, embedding_dims: usize) -> IndexResult<Self> {
        let base_path = base_path.into();
        let mut store = Self::new(base_path.clone(), embedding_dims);

        let nodes_path = base_path.join(NODES_FILE);
        if nodes_path.exists() {
            let content = std::fs::read_to_string(&nodes_path)?;
            let entries: Vec<serde_json::Value> = serde_json::from_str(&content)?;
            for entry in entries {
                match serde_json::from_value::<MemoryNode>(entry) {
                    Ok(node) => {
                        store.add_node(node);
                    }
                    Err(e) => warn!(error = %e, "Skipping corrupt node entry"),
                }
            }
        }

        let graph_path = base_path.join(GRAPH_FILE);
        if graph_path.exists() {
            let content = std::fs::read_to_string(&graph_path)?;
            let edges: Vec<ConceptEdge> = serde_json::from_str(&content)?;
            for edge in edges {
                store.concept_graph.add_edge(edge);
            }
        }

        let trees_path = base_path.join(TREES_FILE);
        if trees_path.exists() {
            let content = std::fs::read_to_string(&trees_path)?;
            let trees: Vec<DocumentTree> = serde_json::from_str(&content)?;
            for tree in trees {
                store.add_document_tree(tree);
            }
        }

        let vectors_path = base_path.join(VECTORS_FILE);
        if vectors_path.exists() {
            match VectorIndex::load(&vectors_path) {
                Ok(index) if index.dimensions() == embedding_dims => {
                    store.vector_index = index;
                }
                Ok(index) => warn!(
                    found = index.dimensions(),
                    expected = embedding_dims,
                    "Discarding vector index with stale dimensions"
                ),
                Err(e) => warn!(error = %e, "Discarding unreadable vector index"),
            }
        }

        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facets::{ContentFacets, DiataxisType};
    use crate::spatial::SpatialContext;

    fn file_node(content: &str, path: &str) -> MemoryNode {
        MemoryNode::new(content).with_spatial(SpatialContext::File {
            path: path.to_string(),
            line: None,
            section_path: Vec::new(),
        })
    }

    #[test]
    fn test_spatial_hard_reject_through_store() {
        let mut store = UnifiedMemoryStore::new("/tmp/unused", 4);
        store.add_node(file_node("python source", "src/a.py"));

        let results = store.query_spatial(
            SpatialQuery {
                file_pattern: Some("docs/*.md".to_string()),
                ..Default::default()
            },
            10,
        );
        assert!(results.is_empty());
    }

    #[test]
    fn test_absent_facet_does_not_fail_other_axes() {
        let mut store = UnifiedMemoryStore::new("/tmp/unused", 4);
        // Node with facets but no spatial context
        store.add_node(
            MemoryNode::new("reference notes")
                .with_facets(ContentFacets::new().with_diataxis(DiataxisType::Reference)),
        );

        let results = store.query_facets(
            FacetQuery {
                diataxis: Some(DiataxisType::Reference),
                ..Default::default()
            },
            10,
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].1, 1.0);
    }

    #[test]
    fn test_multi_axis_intersection() {
        let mut store = UnifiedMemoryStore::new("/tmp/unused", 4);
        let matching = MemoryNode::new("caching limits")
            .with_spatial(SpatialContext::File {
                path: "docs/cache.md".to_string(),
                line: None,
                section_path: vec!["Limitations".to_string()],
            })
            .with_facets(ContentFacets::new().with_diataxis(DiataxisType::Reference));
        store.add_node(matching);
        store.add_node(file_node("caching intro", "docs/cache.md"));

        let query = UnifiedQuery::new()
            .with_text("caching")
            .with_spatial(SpatialQuery {
                section_contains: Some("Limitations".to_string()),
                ..Default::default()
            })
            .with_facets(FacetQuery {
                diataxis: Some(DiataxisType::Reference),
                ..Default::default()
            });

        let results = store.query(&query, None);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.content, "caching limits");
    }

    #[test]
    fn test_topological_query() {
        let mut store = UnifiedMemoryStore::new("/tmp/unused", 4);
        let base = MemoryNode::new("base claim");
        let base_id = base.id();
        store.add_node(base);

        let contra = MemoryNode::new("opposite claim").with_edge(ConceptEdge::new(
            MemoryNode::new("opposite claim").id().0,
            base_id.0.clone(),
            RelationType::Contradicts,
        ));
        store.add_node(contra);

        let contradictions = store.find_contradictions(&base_id);
        assert_eq!(contradictions.len(), 1);
        assert_eq!(contradictions[0].content, "opposite claim");
    }

    #[test]
    fn test_unconstrained_query_returns_recent() {
        let mut store = UnifiedMemoryStore::new("/tmp/unused", 4);
        store.add_node(MemoryNode::new("one"));
        store.add_node(MemoryNode::new("two"));

        let results = store.query(&UnifiedQuery::new(), None);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, score)| *score == 1.0));
    }

    #[test]
    fn test_keyword_fallback_without_embeddings() {
        let mut store = UnifiedMemoryStore::new("/tmp/unused", 4);
        store.add_node(MemoryNode::new("the user's name is Alex Chen"));
        store.add_node(MemoryNode::new("unrelated note"));

        let results = store.query(&UnifiedQuery::new().with_text("alex chen"), None);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_embedding_search_through_store() {
        let mut store = UnifiedMemoryStore::new("/tmp/unused", 2);
        store.add_node(MemoryNode::new("east doc").with_embedding(vec![1.0, 0.0]));
        store.add_node(MemoryNode::new("north doc").with_embedding(vec![0.0, 1.0]));

        let results = store.query(
            &UnifiedQuery::new().with_text("east").with_limit(1),
            Some(&[0.9, 0.1]),
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.content, "east doc");
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = UnifiedMemoryStore::new(dir.path(), 2);
        store.add_node(
            MemoryNode::new("persisted node")
                .with_facets(ContentFacets::new().with_domain("auth"))
                .with_embedding(vec![0.1, 0.9]),
        );
        store.add_document_tree(DocumentTree::parse("doc.md", "# Title\n\nbody"));
        store.save().unwrap();

        let loaded = UnifiedMemoryStore::load(dir.path(), 2).unwrap();
        assert_eq!(loaded.node_count(), 1);
        assert_eq!(loaded.stats().embedded_nodes, 1);
        assert!(loaded.document_tree("doc.md").is_some());

        let results = loaded.query_facets(
            FacetQuery {
                domain: Some("auth".to_string()),
                ..Default::default()
            },
            10,
        );
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_remove_node_clears_indexes() {
        let mut store = UnifiedMemoryStore::new("/tmp/unused", 2);
        let id = store.add_node(
            MemoryNode::new("gone soon")
                .with_facets(ContentFacets::new().with_domain("temp"))
                .with_embedding(vec![1.0, 0.0]),
        );
        assert!(store.remove_node(&id));
        assert_eq!(store.node_count(), 0);
        assert_eq!(store.stats().embedded_nodes, 0);
        assert_eq!(store.stats().faceted_nodes, 0);
    }
}
