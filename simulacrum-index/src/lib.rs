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

//! Multi-topology memory index
//!
//! Four orthogonal views over the same content, unified into one queryable
//! store:
//! - **Spatial**: WHERE content came from (file/line/section, module/class/
//!   function, URL)
//! - **Topological**: how concepts relate (contradicts, elaborates, ...)
//! - **Structural**: position in a document hierarchy
//! - **Faceted**: content-type / persona / verification / confidence tags
//!
//! Each axis scores a [`MemoryNode`] in `[0.0, 1.0]` or hard-rejects it.
//! A node's facets are all independently optional: a missing facet means
//! the query dimension does not constrain the node, never that the node
//! fails the query. Unconstrained axes contribute 1.0.

pub mod concept;
pub mod error;
pub mod facets;
pub mod node;
pub mod spatial;
pub mod store;
pub mod structural;
pub mod vector;

pub use concept::{ConceptEdge, ConceptGraph, RelationType, TopologicalQuery};
pub use error::{IndexError, IndexResult};
pub use facets::{
    facet_match, ConfidenceLevel, ContentFacets, DiataxisType, FacetQuery, FacetedIndex, Persona,
    VerificationState,
};
pub use node::{MemoryNode, NodeId};
pub use spatial::{spatial_match, SpatialContext, SpatialQuery};
pub use store::{UnifiedMemoryStore, UnifiedQuery};
pub use structural::{structural_match, DocumentTree, StructuralPosition, StructuralQuery};
pub use vector::{VectorIndex, VectorMatch};
