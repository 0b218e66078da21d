//! Query orchestration for knowledge-graph retrieval: global and local
//! search, each in blocking or streaming form.

pub mod api;
pub mod engine;

pub use api::{
    global_search, global_search_streaming, lancedb_uri, local_search, local_search_streaming, GlobalSearchRequest,
    LocalSearchRequest, QueryChunk, QueryResponse, QueryStream,
};
pub use engine::{
    EngineChunk, EngineFactory, GlobalSearchInputs, LocalSearchInputs, Response, SearchEngine, SearchResult,
};
