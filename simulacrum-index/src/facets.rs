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

//! Faceted classification and inverted index
//!
//! Facets tag content along closed axes (Diataxis type, persona,
//! verification state, confidence). Type/persona/verification constraints
//! are hard; the confidence floor is soft.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Diataxis documentation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiataxisType {
    Tutorial,
    HowTo,
    Reference,
    Explanation,
}

/// Audience persona
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    Beginner,
    Practitioner,
    Expert,
}

/// Verification state of a piece of content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationState {
    Unverified,
    Verified,
    Disputed,
}

/// Confidence level, ordered low to very high
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

/// Facet tags attached to a memory node. All optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentFacets {
    pub diataxis: Option<DiataxisType>,
    pub personas: Vec<Persona>,
    pub verification: Option<VerificationState>,
    pub confidence: Option<ConfidenceLevel>,
    /// Free-form domain tags ("auth", "caching", ...)
    pub domains: Vec<String>,
}

impl ContentFacets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_diataxis(mut self, diataxis: DiataxisType) -> Self {
        self.diataxis = Some(diataxis);
        self
    }

    pub fn with_persona(mut self, persona: Persona) -> Self {
        self.personas.push(persona);
        self
    }

    pub fn with_verification(mut self, verification: VerificationState) -> Self {
        self.verification = Some(verification);
        self
    }

    pub fn with_confidence(mut self, confidence: ConfidenceLevel) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domains.push(domain.into());
        self
    }
}

/// Facet constraints for a query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FacetQuery {
    /// Required Diataxis type (hard)
    pub diataxis: Option<DiataxisType>,
    /// Required persona (hard)
    pub persona: Option<Persona>,
    /// Required verification state (hard)
    pub verification: Option<VerificationState>,
    /// Confidence floor (soft: below-floor content is penalized)
    pub min_confidence: Option<ConfidenceLevel>,
    /// Required domain tag (hard)
    pub domain: Option<String>,
}

impl FacetQuery {
    pub fn has_constraints(&self) -> bool {
        self.diataxis.is_some()
            || self.persona.is_some()
            || self.verification.is_some()
            || self.min_confidence.is_some()
            || self.domain.is_some()
    }
}

/// Score facets against a query.
///
/// A node without the queried facet fails the hard constraints; missing
/// confidence is treated as unconstrained for the soft floor.
pub fn facet_match(facets: &ContentFacets, query: &FacetQuery) -> f32 {
    if let Some(diataxis) = query.diataxis {
        if facets.diataxis != Some(diataxis) {
            return 0.0;
        }
    }
    if let Some(persona) = query.persona {
        if !facets.personas.contains(&persona) {
            return 0.0;
        }
    }
    if let Some(verification) = query.verification {
        if facets.verification != Some(verification) {
            return 0.0;
        }
    }
    if let Some(domain) = &query.domain {
        let needle = domain.to_lowercase();
        if !facets.domains.iter().any(|d| d.to_lowercase() == needle) {
            return 0.0;
        }
    }

    let mut score = 1.0f32;
    if let (Some(floor), Some(confidence)) = (query.min_confidence, facets.confidence) {
        if confidence < floor {
            let distance = floor as usize - confidence as usize;
            score *= (1.0 - 0.25 * distance as f32).max(0.1);
        }
    }
    score
}

/// Inverted index over facet values for fast candidate selection
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct FacetedIndex {
    facets: HashMap<String, ContentFacets>,
    by_diataxis: HashMap<DiataxisType, HashSet<String>>,
    by_persona: HashMap<Persona, HashSet<String>>,
    by_domain: HashMap<String, HashSet<String>>,
}

impl FacetedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a node's facets
    pub fn add(&mut self, node_id: impl Into<String>, facets: &ContentFacets) {
        let node_id = node_id.into();
        self.remove(&node_id);
        if let Some(diataxis) = facets.diataxis {
            self.by_diataxis
                .entry(diataxis)
                .or_default()
                .insert(node_id.clone());
        }
        for persona in &facets.personas {
            self.by_persona
                .entry(*persona)
                .or_default()
                .insert(node_id.clone());
        }
        for domain in &facets.domains {
            self.by_domain
                .entry(domain.to_lowercase())
                .or_default()
                .insert(node_id.clone());
        }
        self.facets.insert(node_id, facets.clone());
    }

    /// Drop a node from the index
    pub fn remove(&mut self, node_id: &str) {
        if self.facets.remove(node_id).is_none() {
            return;
        }
        for ids in self.by_diataxis.values_mut() {
            ids.remove(node_id);
        }
        for ids in self.by_persona.values_mut() {
            ids.remove(node_id);
        }
        for ids in self.by_domain.values_mut() {
            ids.remove(node_id);
        }
    }

    /// Query the index, returning scored node IDs, best first
    pub fn query(&self, query: &FacetQuery) -> Vec<(String, f32)> {
        // Narrow candidates with the inverted indexes where possible
        let mut candidates: Option<HashSet<String>> = None;
        let mut intersect = |ids: Option<&HashSet<String>>| {
            let ids = ids.cloned().unwrap_or_default();
            candidates = Some(match candidates.take() {
                Some(existing) => existing.intersection(&ids).cloned().collect(),
                None => ids,
            });
        };

        if let Some(diataxis) = query.diataxis {
            intersect(self.by_diataxis.get(&diataxis));
        }
        if let Some(persona) = query.persona {
            intersect(self.by_persona.get(&persona));
        }
        if let Some(domain) = &query.domain {
            intersect(self.by_domain.get(&domain.to_lowercase()));
        }

        let pool: Vec<&String> = match &candidates {
            Some(ids) => ids.iter().collect(),
            None => self.facets.keys().collect(),
        };

        let mut results: Vec<(String, f32)> = pool
            .into_iter()
            .filter_map(|id| {
                let facets = self.facets.get(id)?;
                let score = facet_match(facets, query);
                (score > 0.0).then(|| (id.clone(), score))
            })
            .collect();
        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results
    }

    /// Number of indexed nodes
    pub fn len(&self) -> usize {
        self.facets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facets.is_empty()
    }
}
