//! Indexer adapters: artifact tables → domain objects.
//!
//! Every reader is a pure function of its input tables. Community-scoped
//! readers only see node rows whose `level` is at or below the requested
//! community level; membership is an exact match on title and community id.

use arrow_array::RecordBatch;
use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::table::Columns;
use crate::types::{Attributes, CommunityReport, Covariate, Entity, Relationship, TextUnit};

/// Community id the indexer writes for nodes that were never clustered.
const UNASSIGNED_COMMUNITY: i64 = -1;
const DEFAULT_COVARIATE_TYPE: &str = "claim";

struct NodeRow {
    title: String,
    level: i64,
    community: Option<i64>,
    degree: Option<i64>,
}

fn read_nodes(nodes: &[RecordBatch], community_level: u32) -> Result<Vec<NodeRow>> {
    let max_level = i64::from(community_level);
    let mut rows = Vec::new();
    for batch in nodes {
        let cols = Columns::new("nodes", batch);
        let title = cols.required("title")?;
        let level = cols.required("level")?;
        let community = cols.optional("community");
        let degree = cols.optional("degree");
        for i in 0..batch.num_rows() {
            let row_level = level.required_integer(i)?;
            if row_level > max_level {
                continue;
            }
            let community = match community {
                Some(c) => c.integer(i)?.filter(|&id| id != UNASSIGNED_COMMUNITY),
                None => None,
            };
            let degree = match degree {
                Some(d) => d.integer(i)?,
                None => None,
            };
            rows.push(NodeRow { title: title.required_string(i)?, level: row_level, community, degree });
        }
    }
    Ok(rows)
}

#[derive(Default)]
struct Membership {
    communities: Vec<(i64, i64)>,
    degree: Option<i64>,
}

impl Membership {
    /// Distinct community ids, coarsest level first.
    fn community_ids(&self) -> Vec<String> {
        let mut sorted = self.communities.clone();
        sorted.sort_unstable();
        let mut seen = HashSet::new();
        sorted
            .into_iter()
            .filter(|(_, community)| seen.insert(*community))
            .map(|(_, community)| community.to_string())
            .collect()
    }
}

fn memberships(nodes: &[NodeRow]) -> HashMap<&str, Membership> {
    let mut by_title: HashMap<&str, Membership> = HashMap::new();
    for node in nodes {
        let entry = by_title.entry(node.title.as_str()).or_default();
        if let Some(community) = node.community {
            entry.communities.push((node.level, community));
        }
        entry.degree = entry.degree.max(node.degree);
    }
    by_title
}

/// Entities that appear as a node at or below `community_level`.
pub fn read_entities(
    nodes: &[RecordBatch],
    entities: &[RecordBatch],
    community_level: u32,
) -> Result<Vec<Entity>> {
    let nodes = read_nodes(nodes, community_level)?;
    let by_title = memberships(&nodes);
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for batch in entities {
        let cols = Columns::new("entities", batch);
        let id = cols.required("id")?;
        let name = cols.required("name")?;
        let short_id = cols.optional("human_readable_id");
        let entity_type = cols.optional("type");
        let description = cols.optional("description");
        let description_embedding = cols.optional("description_embedding");
        let graph_embedding = cols.optional("graph_embedding");
        let text_unit_ids = cols.optional("text_unit_ids");
        let document_ids = cols.optional("document_ids");
        for i in 0..batch.num_rows() {
            let title = name.required_string(i)?;
            let Some(membership) = by_title.get(title.as_str()) else { continue };
            let entity_id = id.required_string(i)?;
            if !seen.insert(entity_id.clone()) {
                continue;
            }
            out.push(Entity {
                id: entity_id,
                short_id: short_id.map(|c| c.string(i)).transpose()?.flatten(),
                title,
                entity_type: entity_type.map(|c| c.string(i)).transpose()?.flatten(),
                description: description.map(|c| c.string(i)).transpose()?.flatten(),
                description_embedding: description_embedding.map(|c| c.floats(i)).transpose()?.flatten(),
                graph_embedding: graph_embedding.map(|c| c.floats(i)).transpose()?.flatten(),
                community_ids: membership.community_ids(),
                text_unit_ids: text_unit_ids.map(|c| c.strings(i)).transpose()?.unwrap_or_default(),
                document_ids: document_ids.map(|c| c.strings(i)).transpose()?.unwrap_or_default(),
                rank: membership.degree,
            });
        }
    }
    Ok(out)
}

/// Reports at or below `community_level` whose community holds at least one
/// participating node.
pub fn read_reports(
    reports: &[RecordBatch],
    nodes: &[RecordBatch],
    community_level: u32,
) -> Result<Vec<CommunityReport>> {
    let max_level = i64::from(community_level);
    let nodes = read_nodes(nodes, community_level)?;
    let mut members: HashMap<i64, Vec<String>> = HashMap::new();
    for node in &nodes {
        if let Some(community) = node.community {
            let titles = members.entry(community).or_default();
            if !titles.contains(&node.title) {
                titles.push(node.title.clone());
            }
        }
    }

    let mut out = Vec::new();
    for batch in reports {
        let cols = Columns::new("community_reports", batch);
        let community = cols.required("community")?;
        let level = cols.required("level")?;
        let title = cols.optional("title");
        let summary = cols.optional("summary");
        let full_content = cols.optional("full_content");
        let rank = cols.optional("rank");
        let relationship_ids = cols.optional("relationship_ids");
        for i in 0..batch.num_rows() {
            let report_level = level.required_integer(i)?;
            if report_level > max_level {
                continue;
            }
            let community_id = community.required_integer(i)?;
            let Some(entity_ids) = members.get(&community_id) else { continue };
            out.push(CommunityReport {
                id: community_id.to_string(),
                community_id: community_id.to_string(),
                level: report_level,
                title: title.map(|c| c.string(i)).transpose()?.flatten().unwrap_or_default(),
                summary: summary.map(|c| c.string(i)).transpose()?.flatten().unwrap_or_default(),
                full_content: full_content.map(|c| c.string(i)).transpose()?.flatten().unwrap_or_default(),
                rank: rank.map(|c| c.float(i)).transpose()?.flatten(),
                entity_ids: entity_ids.clone(),
                relationship_ids: relationship_ids.map(|c| c.strings(i)).transpose()?.unwrap_or_default(),
            });
        }
    }
    Ok(out)
}

pub fn read_relationships(relationships: &[RecordBatch]) -> Result<Vec<Relationship>> {
    let mut out = Vec::new();
    for batch in relationships {
        let cols = Columns::new("relationships", batch);
        let id = cols.required("id")?;
        let source = cols.required("source")?;
        let target = cols.required("target")?;
        let short_id = cols.optional("human_readable_id");
        let description = cols.optional("description");
        let description_embedding = cols.optional("description_embedding");
        let weight = cols.optional("weight");
        let rank = cols.optional("rank");
        let text_unit_ids = cols.optional("text_unit_ids");
        for i in 0..batch.num_rows() {
            let mut attributes = Attributes::new();
            if let Some(rank) = rank {
                attributes.insert("rank".to_string(), rank.value(i)?);
            }
            out.push(Relationship {
                id: id.required_string(i)?,
                short_id: short_id.map(|c| c.string(i)).transpose()?.flatten(),
                source: source.required_string(i)?,
                target: target.required_string(i)?,
                description: description.map(|c| c.string(i)).transpose()?.flatten(),
                description_embedding: description_embedding.map(|c| c.floats(i)).transpose()?.flatten(),
                weight: weight.map(|c| c.float(i)).transpose()?.flatten().unwrap_or(1.0),
                text_unit_ids: text_unit_ids.map(|c| c.strings(i)).transpose()?.unwrap_or_default(),
                attributes,
            });
        }
    }
    Ok(out)
}

pub fn read_text_units(text_units: &[RecordBatch]) -> Result<Vec<TextUnit>> {
    let mut out = Vec::new();
    let mut index = 0usize;
    for batch in text_units {
        let cols = Columns::new("text_units", batch);
        let id = cols.required("id")?;
        let text = cols.required("text")?;
        let short_id = cols.optional("human_readable_id");
        let entity_ids = cols.optional("entity_ids");
        let relationship_ids = cols.optional("relationship_ids");
        let covariate_ids = cols.optional("covariate_ids");
        let n_tokens = cols.optional("n_tokens");
        let document_ids = cols.optional("document_ids");
        for i in 0..batch.num_rows() {
            let short = match short_id {
                Some(c) => c.string(i)?,
                None => Some(index.to_string()),
            };
            out.push(TextUnit {
                id: id.required_string(i)?,
                short_id: short,
                text: text.string(i)?.unwrap_or_default(),
                entity_ids: entity_ids.map(|c| c.strings(i)).transpose()?.unwrap_or_default(),
                relationship_ids: relationship_ids.map(|c| c.strings(i)).transpose()?.unwrap_or_default(),
                covariate_ids: covariate_ids.map(|c| c.strings(i)).transpose()?.unwrap_or_default(),
                n_tokens: n_tokens.map(|c| c.integer(i)).transpose()?.flatten(),
                document_ids: document_ids.map(|c| c.strings(i)).transpose()?.unwrap_or_default(),
            });
            index += 1;
        }
    }
    Ok(out)
}

const COVARIATE_KEY_COLUMNS: [&str; 5] = ["id", "human_readable_id", "subject_id", "text_unit_id", "text_unit_ids"];

/// Claims; an absent covariates table yields no claims.
pub fn read_covariates(covariates: Option<&[RecordBatch]>) -> Result<Vec<Covariate>> {
    let Some(covariates) = covariates else { return Ok(Vec::new()) };
    let mut out = Vec::new();
    for batch in covariates {
        let cols = Columns::new("covariates", batch);
        let id = cols.required("id")?;
        let subject_id = cols.required("subject_id")?;
        let short_id = cols.optional("human_readable_id");
        let text_unit_ids = cols.optional("text_unit_ids").or_else(|| cols.optional("text_unit_id"));
        let attribute_cols: Vec<_> = cols
            .all()
            .into_iter()
            .filter(|c| !COVARIATE_KEY_COLUMNS.contains(&c.name()))
            .collect();
        for i in 0..batch.num_rows() {
            let mut attributes = Attributes::new();
            for col in &attribute_cols {
                attributes.insert(col.name().to_string(), col.value(i)?);
            }
            out.push(Covariate {
                id: id.required_string(i)?,
                short_id: short_id.map(|c| c.string(i)).transpose()?.flatten(),
                subject_id: subject_id.required_string(i)?,
                covariate_type: DEFAULT_COVARIATE_TYPE.to_string(),
                text_unit_ids: text_unit_ids.map(|c| c.strings(i)).transpose()?.unwrap_or_default(),
                attributes,
            });
        }
    }
    Ok(out)
}
