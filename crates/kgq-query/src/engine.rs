//! Retrieval engine boundary.
//!
//! Ranking, prompting and answer generation live behind [`SearchEngine`];
//! this crate only constructs engines through an [`EngineFactory`] and
//! drives them.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use kgq_core::config::QueryConfig;
use kgq_core::types::{CommunityReport, Covariate, Entity, Relationship, TextUnit};
use kgq_core::{RawContext, Record, Result};
use kgq_vector::BoundStore;

/// Covariate category handed to the local engine.
pub const CLAIMS_COVARIATE: &str = "claims";

/// Final answer payload: plain text, one object, or a list of objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Text(String),
    Object(Record),
    Objects(Vec<Record>),
}

impl From<String> for Response {
    fn from(text: String) -> Self {
        Response::Text(text)
    }
}

impl From<&str> for Response {
    fn from(text: &str) -> Self {
        Response::Text(text.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub response: Response,
    pub context_data: RawContext,
}

/// Element of an engine's incremental output. Engines emit their context
/// once, before any fragment.
#[derive(Debug, Clone)]
pub enum EngineChunk {
    Context(RawContext),
    Fragment(String),
}

#[async_trait]
pub trait SearchEngine: Send + Sync {
    async fn search(&self, query: &str) -> anyhow::Result<SearchResult>;

    /// Lazy, finite and not restartable. Nothing runs until it is polled.
    fn stream_search<'a>(&'a self, query: &'a str) -> BoxStream<'a, anyhow::Result<EngineChunk>>;
}

/// Adapted inputs for a community-report (global) engine.
#[derive(Debug, Clone)]
pub struct GlobalSearchInputs {
    pub reports: Vec<CommunityReport>,
    pub entities: Vec<Entity>,
    pub response_type: String,
}

/// Adapted inputs for an entity-neighbourhood (local) engine.
pub struct LocalSearchInputs {
    pub reports: Vec<CommunityReport>,
    pub text_units: Vec<TextUnit>,
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub covariates: HashMap<String, Vec<Covariate>>,
    pub description_store: BoundStore,
    pub response_type: String,
}

/// Builds configured engines. Implementations own the prompts, models and
/// ranking; construction failures should use `Error::Configuration`.
pub trait EngineFactory: Send + Sync {
    fn global_engine(&self, config: &QueryConfig, inputs: GlobalSearchInputs) -> Result<Box<dyn SearchEngine>>;

    fn local_engine(&self, config: &QueryConfig, inputs: LocalSearchInputs) -> Result<Box<dyn SearchEngine>>;
}
