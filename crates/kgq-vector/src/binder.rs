//! Binds entity description embeddings to a vector store.
//!
//! Fresh mode (`overwrite = true`) repopulates the collection from the
//! adapted entities. Attach mode reuses a previously materialized collection
//! and never writes to it.

use tracing::{debug, info};

use kgq_core::error::{Error, Result};
use kgq_core::types::{Attributes, Entity};

use crate::store::{StoreSettings, VectorStore, VectorStoreDocument};

/// A connected store owned by the query that bound it.
pub type BoundStore = Box<dyn VectorStore>;

/// One document per entity carrying a description embedding. Entities
/// without one are skipped: partial coverage is expected after incremental
/// indexing.
pub fn entity_documents(entities: &[Entity]) -> Vec<VectorStoreDocument> {
    let documents: Vec<VectorStoreDocument> = entities
        .iter()
        .filter_map(|entity| {
            let vector = entity.description_embedding.clone()?;
            let mut attributes = Attributes::new();
            attributes.insert("title".to_string(), serde_json::Value::String(entity.title.clone()));
            Some(VectorStoreDocument {
                id: entity.id.clone(),
                text: entity.description.clone(),
                vector,
                attributes,
            })
        })
        .collect();
    let skipped = entities.len() - documents.len();
    if skipped > 0 {
        debug!(skipped, "entities without a description embedding were not indexed");
    }
    documents
}

/// Creates a store of the configured type and binds it.
pub async fn bind_embedding_store(entities: &[Entity], settings: &StoreSettings) -> Result<BoundStore> {
    let store = settings.store_type.create(&settings.collection_name);
    bind_store(store, entities, settings).await
}

/// Binds an already constructed (unconnected) store.
pub async fn bind_store(mut store: BoundStore, entities: &[Entity], settings: &StoreSettings) -> Result<BoundStore> {
    info!(
        store_type = %settings.store_type,
        collection = %settings.collection_name,
        db_uri = ?settings.db_uri,
        overwrite = settings.overwrite,
        "binding entity description store"
    );
    if settings.overwrite {
        store.connect(settings).await?;
        let written = store.load_documents(entity_documents(entities), true).await?;
        info!(written, total = entities.len(), "populated entity description store");
    } else {
        if settings.db_uri.is_none() {
            return Err(Error::configuration(format!(
                "attaching to collection '{}' requires a db_uri",
                settings.collection_name
            )));
        }
        store.connect(settings).await?;
        store.open_existing().await?;
    }
    Ok(store)
}
