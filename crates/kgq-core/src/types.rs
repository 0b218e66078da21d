//! Domain types rebuilt from the indexer's tabular artifacts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type EntityId = String;
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// A graph entity as seen by the retrieval engines.
///
/// - `id`: stable entity identifier shared with relationships and text units
/// - `short_id`: human readable id, when the indexer assigned one
/// - `title`: display name; also the join key against node rows
/// - `community_ids`: assigned communities at every level up to the
///   requested one, coarsest first
/// - `rank`: node degree, higher means more connected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub short_id: Option<String>,
    pub title: String,
    pub entity_type: Option<String>,
    pub description: Option<String>,
    pub description_embedding: Option<Vec<f32>>,
    pub graph_embedding: Option<Vec<f32>>,
    pub community_ids: Vec<String>,
    pub text_unit_ids: Vec<String>,
    pub document_ids: Vec<String>,
    pub rank: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub short_id: Option<String>,
    pub source: EntityId,
    pub target: EntityId,
    pub description: Option<String>,
    pub description_embedding: Option<Vec<f32>>,
    pub weight: f64,
    pub text_unit_ids: Vec<String>,
    pub attributes: Attributes,
}

/// Summary of one community at one hierarchy level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityReport {
    pub id: String,
    pub community_id: String,
    pub level: i64,
    pub title: String,
    pub summary: String,
    pub full_content: String,
    pub rank: Option<f64>,
    pub entity_ids: Vec<EntityId>,
    pub relationship_ids: Vec<String>,
}

/// A chunk of a source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextUnit {
    pub id: String,
    pub short_id: Option<String>,
    pub text: String,
    pub entity_ids: Vec<EntityId>,
    pub relationship_ids: Vec<String>,
    pub covariate_ids: Vec<String>,
    pub n_tokens: Option<i64>,
    pub document_ids: Vec<String>,
}

/// A structured fact (claim) extracted from text and tied to an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Covariate {
    pub id: String,
    pub short_id: Option<String>,
    pub subject_id: EntityId,
    pub covariate_type: String,
    pub text_unit_ids: Vec<String>,
    pub attributes: Attributes,
}
