//! Caller-facing query operations.
//!
//! Each operation validates its request, adapts the artifact tables, binds
//! the entity description store (local search only), builds an engine and
//! runs it either to completion or as a stream whose first element is the
//! normalized context.

use anyhow::anyhow;
use arrow_array::RecordBatch;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use kgq_core::adapters::{read_covariates, read_entities, read_relationships, read_reports, read_text_units};
use kgq_core::config::{resolve_timestamp_path, resolve_with_base, QueryConfig};
use kgq_core::{normalize, Error, NormalizedContext, Result};
use kgq_vector::{bind_embedding_store, StoreSettings};

use crate::engine::{
    EngineChunk, EngineFactory, GlobalSearchInputs, LocalSearchInputs, Response, SearchEngine, CLAIMS_COVARIATE,
};

/// Directory under the storage base dir holding the persisted embeddings.
pub const LANCEDB_DIR: &str = "lancedb";

#[derive(Debug, Clone, Copy)]
pub struct GlobalSearchRequest<'a> {
    pub nodes: &'a [RecordBatch],
    pub entities: &'a [RecordBatch],
    pub community_reports: &'a [RecordBatch],
    pub community_level: u32,
    pub response_type: &'a str,
    pub query: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct LocalSearchRequest<'a> {
    /// Project root the storage base dir is resolved against; `None` is the
    /// current directory.
    pub root_dir: Option<&'a Path>,
    pub nodes: &'a [RecordBatch],
    pub entities: &'a [RecordBatch],
    pub community_reports: &'a [RecordBatch],
    pub text_units: &'a [RecordBatch],
    pub relationships: &'a [RecordBatch],
    pub covariates: Option<&'a [RecordBatch]>,
    pub community_level: u32,
    pub response_type: &'a str,
    pub query: &'a str,
}

/// Result of a blocking query: both parts or an error, never one alone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub response: Response,
    pub context: NormalizedContext,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryChunk {
    Context(NormalizedContext),
    Fragment(String),
}

/// Owns its engine and bound store; dropping it stops the query.
pub type QueryStream = BoxStream<'static, Result<QueryChunk>>;

fn validate(query: &str, response_type: &str) -> Result<()> {
    if query.trim().is_empty() {
        return Err(Error::validation("query must not be empty"));
    }
    if response_type.trim().is_empty() {
        return Err(Error::validation("response_type must not be empty"));
    }
    Ok(())
}

/// Location of the persisted embedding collection for a project root.
pub fn lancedb_uri(root_dir: Option<&Path>, config: &QueryConfig) -> Result<PathBuf> {
    let root = root_dir.unwrap_or_else(|| Path::new("."));
    let base = resolve_timestamp_path(&resolve_with_base(root, &config.storage.base_dir))?;
    Ok(base.join(LANCEDB_DIR))
}

fn global_engine(
    config: &QueryConfig,
    factory: &dyn EngineFactory,
    request: &GlobalSearchRequest<'_>,
) -> Result<Box<dyn SearchEngine>> {
    validate(request.query, request.response_type)?;
    let reports = read_reports(request.community_reports, request.nodes, request.community_level)?;
    let entities = read_entities(request.nodes, request.entities, request.community_level)?;
    info!(
        community_level = request.community_level,
        reports = reports.len(),
        entities = entities.len(),
        "building global search engine"
    );
    factory.global_engine(
        config,
        GlobalSearchInputs { reports, entities, response_type: request.response_type.to_string() },
    )
}

async fn local_engine(
    config: &QueryConfig,
    factory: &dyn EngineFactory,
    request: &LocalSearchRequest<'_>,
) -> Result<Box<dyn SearchEngine>> {
    validate(request.query, request.response_type)?;
    let entities = read_entities(request.nodes, request.entities, request.community_level)?;
    let reports = read_reports(request.community_reports, request.nodes, request.community_level)?;
    let text_units = read_text_units(request.text_units)?;
    let relationships = read_relationships(request.relationships)?;
    let claims = read_covariates(request.covariates)?;

    let db_uri = lancedb_uri(request.root_dir, config)?;
    let settings = StoreSettings::from_config(&config.vector_store())?.with_db_uri(db_uri.to_string_lossy());
    let description_store = bind_embedding_store(&entities, &settings).await?;

    info!(
        community_level = request.community_level,
        entities = entities.len(),
        reports = reports.len(),
        text_units = text_units.len(),
        relationships = relationships.len(),
        claims = claims.len(),
        "building local search engine"
    );
    let mut covariates = HashMap::new();
    covariates.insert(CLAIMS_COVARIATE.to_string(), claims);
    factory.local_engine(
        config,
        LocalSearchInputs {
            reports,
            text_units,
            entities,
            relationships,
            covariates,
            description_store,
            response_type: request.response_type.to_string(),
        },
    )
}

async fn run_to_completion(engine: &dyn SearchEngine, query: &str) -> Result<QueryResponse> {
    let result = engine.search(query).await.map_err(Error::Retrieval)?;
    let context = normalize(&result.context_data)?;
    Ok(QueryResponse { response: result.response, context })
}

fn run_streaming(engine: Box<dyn SearchEngine>, query: String) -> QueryStream {
    Box::pin(async_stream::stream! {
        let mut chunks = engine.stream_search(&query);
        let mut context_sent = false;
        while let Some(chunk) = chunks.next().await {
            match chunk {
                Err(e) => {
                    yield Err(Error::Retrieval(e));
                    return;
                }
                Ok(EngineChunk::Context(raw)) if !context_sent => {
                    context_sent = true;
                    match normalize(&raw) {
                        Ok(context) => {
                            yield Ok(QueryChunk::Context(context));
                        }
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
                Ok(EngineChunk::Context(_)) => {
                    yield Err(Error::Retrieval(anyhow!("engine emitted context data more than once")));
                    return;
                }
                Ok(EngineChunk::Fragment(text)) if context_sent => {
                    yield Ok(QueryChunk::Fragment(text));
                }
                Ok(EngineChunk::Fragment(_)) => {
                    yield Err(Error::Retrieval(anyhow!("engine emitted a response fragment before its context data")));
                    return;
                }
            }
        }
        if !context_sent {
            debug!("engine stream ended without producing any chunk");
        }
    })
}

/// Answers `query` from community reports at or below the requested level.
pub async fn global_search(
    config: &QueryConfig,
    factory: &dyn EngineFactory,
    request: GlobalSearchRequest<'_>,
) -> Result<QueryResponse> {
    let engine = global_engine(config, factory, &request)?;
    run_to_completion(engine.as_ref(), request.query).await
}

pub async fn global_search_streaming(
    config: &QueryConfig,
    factory: &dyn EngineFactory,
    request: GlobalSearchRequest<'_>,
) -> Result<QueryStream> {
    let engine = global_engine(config, factory, &request)?;
    Ok(run_streaming(engine, request.query.to_string()))
}

/// Answers `query` from the neighbourhood of the entities closest to it.
pub async fn local_search(
    config: &QueryConfig,
    factory: &dyn EngineFactory,
    request: LocalSearchRequest<'_>,
) -> Result<QueryResponse> {
    let engine = local_engine(config, factory, &request).await?;
    run_to_completion(engine.as_ref(), request.query).await
}

pub async fn local_search_streaming(
    config: &QueryConfig,
    factory: &dyn EngineFactory,
    request: LocalSearchRequest<'_>,
) -> Result<QueryStream> {
    let engine = local_engine(config, factory, &request).await?;
    Ok(run_streaming(engine, request.query.to_string()))
}
