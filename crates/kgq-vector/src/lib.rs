//! Vector index binding for entity description embeddings, backed by LanceDB.

pub mod artifacts;
pub mod binder;
pub mod lance;
pub mod schema;
pub mod store;
pub mod table;

pub use binder::{bind_embedding_store, bind_store, entity_documents, BoundStore};
pub use lance::LanceDbStore;
pub use store::{StoreSettings, VectorSearchResult, VectorStore, VectorStoreDocument, VectorStoreType};
