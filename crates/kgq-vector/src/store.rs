//! Vector store abstraction consumed by the binder and the local engine.
//!
//! A store is selected by a closed type tag resolved once per call; every
//! implementation offers the same capabilities: connect, bulk write, attach
//! to an existing collection, and similarity lookup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use kgq_core::config::VectorStoreConfig;
use kgq_core::error::{Error, Result};
use kgq_core::types::Attributes;

use crate::lance::LanceDbStore;

/// One embedded record: `id` is the entity id, `text` the embedded description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorStoreDocument {
    pub id: String,
    pub text: Option<String>,
    pub vector: Vec<f32>,
    pub attributes: Attributes,
}

/// A document returned by similarity search; higher `score` is closer.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSearchResult {
    pub document: VectorStoreDocument,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorStoreType {
    LanceDb,
}

impl VectorStoreType {
    pub fn as_str(self) -> &'static str {
        match self {
            VectorStoreType::LanceDb => "lancedb",
        }
    }

    /// A new, unconnected store for `collection_name`.
    pub fn create(self, collection_name: &str) -> Box<dyn VectorStore> {
        match self {
            VectorStoreType::LanceDb => Box::new(LanceDbStore::new(collection_name)),
        }
    }
}

impl fmt::Display for VectorStoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VectorStoreType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lancedb" => Ok(VectorStoreType::LanceDb),
            _ => Err(Error::configuration(format!("unknown vector store type '{s}'"))),
        }
    }
}

/// Immutable per-call store arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSettings {
    pub store_type: VectorStoreType,
    pub collection_name: String,
    pub db_uri: Option<String>,
    pub overwrite: bool,
}

impl StoreSettings {
    pub fn from_config(config: &VectorStoreConfig) -> Result<Self> {
        Ok(Self {
            store_type: config.store_type.parse()?,
            collection_name: config.query_collection().to_string(),
            db_uri: config.db_uri.clone(),
            overwrite: config.overwrite,
        })
    }

    pub fn with_db_uri(mut self, db_uri: impl Into<String>) -> Self {
        self.db_uri = Some(db_uri.into());
        self
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    fn store_type(&self) -> VectorStoreType;
    fn collection_name(&self) -> &str;
    /// Establishes the connection; it stays open until the store is dropped.
    async fn connect(&mut self, settings: &StoreSettings) -> Result<()>;
    /// Bulk-writes documents into the collection, replacing prior rows when
    /// `overwrite` is set. Returns the number of documents written.
    async fn load_documents(&mut self, documents: Vec<VectorStoreDocument>, overwrite: bool) -> Result<usize>;
    /// Attaches to the collection's persisted table without writing.
    async fn open_existing(&mut self) -> Result<()>;
    async fn similarity_search_by_vector(&self, query: &[f32], k: usize) -> Result<Vec<VectorSearchResult>>;
    async fn search_by_id(&self, id: &str) -> Result<Option<VectorStoreDocument>>;
}
