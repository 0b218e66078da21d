//! Loading of the indexer's persisted output tables from a LanceDB directory.

use tracing::info;

use kgq_core::error::{Error, Result};
use kgq_core::table::num_rows;
use kgq_core::Table;

use crate::table::{open_db, read_table};

pub const NODES_TABLE: &str = "create_final_nodes";
pub const ENTITIES_TABLE: &str = "create_final_entities";
pub const COMMUNITY_REPORTS_TABLE: &str = "create_final_community_reports";
pub const TEXT_UNITS_TABLE: &str = "create_final_text_units";
pub const RELATIONSHIPS_TABLE: &str = "create_final_relationships";
pub const COVARIATES_TABLE: &str = "create_final_covariates";

pub const ARTIFACT_TABLES: [&str; 6] = [
    NODES_TABLE,
    ENTITIES_TABLE,
    COMMUNITY_REPORTS_TABLE,
    TEXT_UNITS_TABLE,
    RELATIONSHIPS_TABLE,
    COVARIATES_TABLE,
];

/// The full set of artifact tables a query needs; covariates are optional.
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    pub nodes: Table,
    pub entities: Table,
    pub community_reports: Table,
    pub text_units: Table,
    pub relationships: Table,
    pub covariates: Option<Table>,
}

pub async fn load_artifacts(db_uri: &str) -> Result<Artifacts> {
    let conn = open_db(db_uri).await?;
    let required = |name: &'static str, table: Option<Table>| {
        table.ok_or_else(|| Error::validation(format!("artifact table '{name}' not found in {db_uri}")))
    };
    let artifacts = Artifacts {
        nodes: required(NODES_TABLE, read_table(&conn, NODES_TABLE).await?)?,
        entities: required(ENTITIES_TABLE, read_table(&conn, ENTITIES_TABLE).await?)?,
        community_reports: required(COMMUNITY_REPORTS_TABLE, read_table(&conn, COMMUNITY_REPORTS_TABLE).await?)?,
        text_units: required(TEXT_UNITS_TABLE, read_table(&conn, TEXT_UNITS_TABLE).await?)?,
        relationships: required(RELATIONSHIPS_TABLE, read_table(&conn, RELATIONSHIPS_TABLE).await?)?,
        covariates: read_table(&conn, COVARIATES_TABLE).await?,
    };
    info!(
        db_uri,
        nodes = num_rows(&artifacts.nodes),
        entities = num_rows(&artifacts.entities),
        reports = num_rows(&artifacts.community_reports),
        text_units = num_rows(&artifacts.text_units),
        relationships = num_rows(&artifacts.relationships),
        covariates = artifacts.covariates.as_deref().map_or(0, num_rows),
        "loaded artifact tables"
    );
    Ok(artifacts)
}
