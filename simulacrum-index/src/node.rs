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

//! MemoryNode - a unit of content with optional topology facets

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::concept::ConceptEdge;
use crate::facets::ContentFacets;
use crate::spatial::SpatialContext;
use crate::structural::StructuralPosition;

/// Content-addressed identifier of a [`MemoryNode`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unified memory record combining content with up to four optional
/// facet groups.
///
/// Every facet group is independently optional: absence means "the query
/// dimension does not constrain this node", never "this node fails the
/// query".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryNode {
    /// The content itself
    pub content: String,
    /// When the node was created
    pub created_at: DateTime<Utc>,
    /// Spatial context: where the content came from
    pub spatial: Option<SpatialContext>,
    /// Position in a document hierarchy
    pub structural: Option<StructuralPosition>,
    /// Content-type / persona / verification / confidence tags
    pub facets: Option<ContentFacets>,
    /// Outgoing edges in the concept graph
    pub edges: Vec<ConceptEdge>,
    /// Embedding for semantic search
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl MemoryNode {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            created_at: Utc::now(),
            spatial: None,
            structural: None,
            facets: None,
            edges: Vec::new(),
            embedding: None,
        }
    }

    pub fn with_spatial(mut self, spatial: SpatialContext) -> Self {
        self.spatial = Some(spatial);
        self
    }

    pub fn with_structural(mut self, structural: StructuralPosition) -> Self {
        self.structural = Some(structural);
        self
    }

    pub fn with_facets(mut self, facets: ContentFacets) -> Self {
        self.facets = Some(facets);
        self
    }

    pub fn with_edge(mut self, edge: ConceptEdge) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Content-addressable ID (16-byte blake3 of the content)
    pub fn id(&self) -> NodeId {
        let hash = blake3::hash(self.content.as_bytes());
        NodeId(hex::encode(&hash.as_bytes()[..16]))
    }

    /// Short preview of the content for logs and index metadata
    pub fn preview(&self) -> &str {
        let end = self
            .content
            .char_indices()
            .nth(100)
            .map(|(i, _)| i)
            .unwrap_or(self.content.len());
        &self.content[..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_from_content() {
        let a = MemoryNode::new("same content");
        let b = MemoryNode::new("same content").with_facets(ContentFacets::new());
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), MemoryNode::new("other content").id());
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        let node = MemoryNode::new("é".repeat(200));
        assert_eq!(node.preview().chars().count(), 100);
    }
}
