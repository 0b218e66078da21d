use std::sync::{Arc, Mutex};

use arrow_array::builder::{Float32Builder, ListBuilder};
use arrow_array::{ArrayRef, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tempfile::TempDir;

use kgq_core::config::{EmbeddingsConfig, QueryConfig, VectorStoreConfig};
use kgq_core::{normalize, Error, RawContext, Result};
use kgq_query::{
    global_search, global_search_streaming, local_search, local_search_streaming, EngineChunk, EngineFactory,
    GlobalSearchInputs, GlobalSearchRequest, LocalSearchInputs, LocalSearchRequest, QueryChunk, Response,
    SearchEngine, SearchResult,
};
use kgq_vector::BoundStore;

fn batch(columns: Vec<(&str, ArrayRef)>) -> RecordBatch {
    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, array)| Field::new(*name, array.data_type().clone(), true))
        .collect();
    let arrays = columns.into_iter().map(|(_, a)| a).collect();
    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).expect("batch")
}

fn strings(values: &[&str]) -> ArrayRef {
    Arc::new(StringArray::from(values.to_vec()))
}

fn ints(values: &[i64]) -> ArrayRef {
    Arc::new(Int64Array::from(values.to_vec()))
}

fn embeddings(rows: &[&[f32]]) -> ArrayRef {
    let mut builder = ListBuilder::new(Float32Builder::new());
    for row in rows {
        builder.values().append_slice(row);
        builder.append(true);
    }
    Arc::new(builder.finish())
}

struct Tables {
    nodes: RecordBatch,
    entities: RecordBatch,
    reports: RecordBatch,
    text_units: RecordBatch,
    relationships: RecordBatch,
}

fn tables() -> Tables {
    Tables {
        nodes: batch(vec![
            ("title", strings(&["ALICE", "BOB", "ALICE"])),
            ("level", ints(&[0, 0, 1])),
            ("community", ints(&[0, 0, 3])),
        ]),
        entities: batch(vec![
            ("id", strings(&["e1", "e2"])),
            ("name", strings(&["ALICE", "BOB"])),
            ("description", strings(&["a cartographer", "a sailor"])),
            ("description_embedding", embeddings(&[&[1.0, 0.0], &[0.0, 1.0]])),
        ]),
        reports: batch(vec![
            ("community", ints(&[0, 3])),
            ("level", ints(&[0, 1])),
            ("title", strings(&["harbour", "maps"])),
            ("summary", strings(&["ships and crews", "charts"])),
        ]),
        text_units: batch(vec![("id", strings(&["t1"])), ("text", strings(&["Alice met Bob."]))]),
        relationships: batch(vec![
            ("id", strings(&["r1"])),
            ("source", strings(&["ALICE"])),
            ("target", strings(&["BOB"])),
        ]),
    }
}

fn raw_context() -> RawContext {
    let reports = batch(vec![("id", strings(&["0", "3"])), ("title", strings(&["harbour", "maps"]))]);
    let no_entities = batch(vec![("id", strings(&[]))]);
    let mut raw = RawContext::new();
    raw.insert("reports".to_string(), vec![reports]);
    raw.insert("entities".to_string(), vec![no_entities]);
    raw
}

#[derive(Clone)]
enum Step {
    Chunk(EngineChunk),
    Fail(&'static str),
}

#[derive(Clone)]
struct ScriptedEngine {
    response: Response,
    context: RawContext,
    steps: Vec<Step>,
    fail_search: bool,
}

impl ScriptedEngine {
    fn answering(fragments: &[&str]) -> Self {
        let mut steps = vec![Step::Chunk(EngineChunk::Context(raw_context()))];
        steps.extend(fragments.iter().map(|f| Step::Chunk(EngineChunk::Fragment((*f).to_string()))));
        Self { response: Response::from(fragments.concat()), context: raw_context(), steps, fail_search: false }
    }

    fn with_steps(steps: Vec<Step>) -> Self {
        Self { steps, ..Self::answering(&[]) }
    }
}

#[async_trait]
impl SearchEngine for ScriptedEngine {
    async fn search(&self, _query: &str) -> anyhow::Result<SearchResult> {
        if self.fail_search {
            anyhow::bail!("model endpoint unavailable");
        }
        Ok(SearchResult { response: self.response.clone(), context_data: self.context.clone() })
    }

    fn stream_search<'a>(&'a self, _query: &'a str) -> BoxStream<'a, anyhow::Result<EngineChunk>> {
        stream::iter(self.steps.clone().into_iter().map(|step| match step {
            Step::Chunk(chunk) => Ok(chunk),
            Step::Fail(msg) => Err(anyhow::anyhow!(msg)),
        }))
        .boxed()
    }
}

#[derive(Default)]
struct Received {
    global_calls: usize,
    local_calls: usize,
    entities: usize,
    reports: usize,
    claims: Option<usize>,
    store: Option<BoundStore>,
}

struct ScriptedFactory {
    engine: ScriptedEngine,
    received: Mutex<Received>,
}

impl ScriptedFactory {
    fn new(engine: ScriptedEngine) -> Self {
        Self { engine, received: Mutex::new(Received::default()) }
    }

    fn calls(&self) -> usize {
        let received = self.received.lock().unwrap();
        received.global_calls + received.local_calls
    }
}

impl EngineFactory for ScriptedFactory {
    fn global_engine(&self, _config: &QueryConfig, inputs: GlobalSearchInputs) -> Result<Box<dyn SearchEngine>> {
        let mut received = self.received.lock().unwrap();
        received.global_calls += 1;
        received.entities = inputs.entities.len();
        received.reports = inputs.reports.len();
        Ok(Box::new(self.engine.clone()))
    }

    fn local_engine(&self, _config: &QueryConfig, inputs: LocalSearchInputs) -> Result<Box<dyn SearchEngine>> {
        let mut received = self.received.lock().unwrap();
        received.local_calls += 1;
        received.entities = inputs.entities.len();
        received.reports = inputs.reports.len();
        received.claims = inputs.covariates.get("claims").map(Vec::len);
        received.store = Some(inputs.description_store);
        Ok(Box::new(self.engine.clone()))
    }
}

fn global_request<'a>(t: &'a Tables, query: &'a str) -> GlobalSearchRequest<'a> {
    GlobalSearchRequest {
        nodes: std::slice::from_ref(&t.nodes),
        entities: std::slice::from_ref(&t.entities),
        community_reports: std::slice::from_ref(&t.reports),
        community_level: 0,
        response_type: "multiple paragraphs",
        query,
    }
}

fn local_request<'a>(t: &'a Tables, root: &'a TempDir, query: &'a str) -> LocalSearchRequest<'a> {
    LocalSearchRequest {
        root_dir: Some(root.path()),
        nodes: std::slice::from_ref(&t.nodes),
        entities: std::slice::from_ref(&t.entities),
        community_reports: std::slice::from_ref(&t.reports),
        text_units: std::slice::from_ref(&t.text_units),
        relationships: std::slice::from_ref(&t.relationships),
        covariates: None,
        community_level: 1,
        response_type: "single paragraph",
        query,
    }
}

fn attach_config() -> QueryConfig {
    QueryConfig {
        embeddings: EmbeddingsConfig {
            vector_store: Some(VectorStoreConfig { overwrite: false, ..VectorStoreConfig::default() }),
        },
        ..QueryConfig::default()
    }
}

fn split(chunks: Vec<QueryChunk>) -> (Vec<kgq_core::NormalizedContext>, String) {
    let mut contexts = Vec::new();
    let mut text = String::new();
    for chunk in chunks {
        match chunk {
            QueryChunk::Context(c) => contexts.push(c),
            QueryChunk::Fragment(f) => text.push_str(&f),
        }
    }
    (contexts, text)
}

#[tokio::test]
async fn global_blocking_returns_response_and_normalized_context() {
    let t = tables();
    let factory = ScriptedFactory::new(ScriptedEngine::answering(&["Ships ", "sail."]));
    let out = global_search(&QueryConfig::default(), &factory, global_request(&t, "who sails?"))
        .await
        .expect("search");

    assert_eq!(out.response, Response::Text("Ships sail.".to_string()));
    assert_eq!(out.context.reports.len(), 2);
    assert!(out.context.entities.is_empty());
    assert!(out.context.claims.is_empty() && out.context.sources.is_empty());

    let received = factory.received.lock().unwrap();
    assert_eq!(received.global_calls, 1);
    assert_eq!(received.entities, 2);
    assert_eq!(received.reports, 1, "level-1 report is above the requested level");
}

#[tokio::test]
async fn streaming_starts_with_context_and_matches_blocking() {
    let t = tables();
    let factory = ScriptedFactory::new(ScriptedEngine::answering(&["Ships ", "sail", "."]));
    let config = QueryConfig::default();

    let blocking = global_search(&config, &factory, global_request(&t, "who sails?")).await.expect("blocking");
    let chunks: Vec<QueryChunk> = global_search_streaming(&config, &factory, global_request(&t, "who sails?"))
        .await
        .expect("stream")
        .try_collect()
        .await
        .expect("chunks");

    assert_eq!(chunks.len(), 4);
    assert_eq!(chunks[0], QueryChunk::Context(normalize(&raw_context()).expect("normalize")));
    assert!(chunks[1..].iter().all(|c| matches!(c, QueryChunk::Fragment(_))));

    let (contexts, text) = split(chunks);
    assert_eq!(contexts, vec![blocking.context]);
    assert_eq!(Response::Text(text), blocking.response);
}

#[tokio::test]
async fn empty_engine_stream_yields_no_chunks() {
    let t = tables();
    let factory = ScriptedFactory::new(ScriptedEngine::with_steps(vec![]));
    let chunks: Vec<QueryChunk> = global_search_streaming(&QueryConfig::default(), &factory, global_request(&t, "q"))
        .await
        .expect("stream")
        .try_collect()
        .await
        .expect("chunks");
    assert!(chunks.is_empty());
}

#[tokio::test]
async fn fragment_before_context_is_a_retrieval_error() {
    let t = tables();
    let engine = ScriptedEngine::with_steps(vec![Step::Chunk(EngineChunk::Fragment("early".to_string()))]);
    let factory = ScriptedFactory::new(engine);
    let mut stream =
        global_search_streaming(&QueryConfig::default(), &factory, global_request(&t, "q")).await.expect("stream");
    assert!(matches!(stream.next().await, Some(Err(Error::Retrieval(_)))));
    assert!(stream.next().await.is_none(), "stream ends after the error");
}

#[tokio::test]
async fn second_context_chunk_is_a_retrieval_error() {
    let t = tables();
    let engine = ScriptedEngine::with_steps(vec![
        Step::Chunk(EngineChunk::Context(raw_context())),
        Step::Chunk(EngineChunk::Context(raw_context())),
    ]);
    let factory = ScriptedFactory::new(engine);
    let results: Vec<Result<QueryChunk>> =
        global_search_streaming(&QueryConfig::default(), &factory, global_request(&t, "q"))
            .await
            .expect("stream")
            .collect()
            .await;
    assert_eq!(results.len(), 2);
    assert!(matches!(results[0], Ok(QueryChunk::Context(_))));
    assert!(matches!(results[1], Err(Error::Retrieval(_))));
}

#[tokio::test]
async fn engine_failures_surface_as_retrieval_errors() {
    let t = tables();
    let engine = ScriptedEngine { fail_search: true, ..ScriptedEngine::answering(&["x"]) };
    let factory = ScriptedFactory::new(engine);
    let err = global_search(&QueryConfig::default(), &factory, global_request(&t, "q")).await.unwrap_err();
    assert!(matches!(err, Error::Retrieval(ref e) if e.to_string().contains("model endpoint")));

    let engine = ScriptedEngine::with_steps(vec![
        Step::Chunk(EngineChunk::Context(raw_context())),
        Step::Fail("connection reset"),
        Step::Chunk(EngineChunk::Fragment("never seen".to_string())),
    ]);
    let factory = ScriptedFactory::new(engine);
    let results: Vec<Result<QueryChunk>> =
        global_search_streaming(&QueryConfig::default(), &factory, global_request(&t, "q"))
            .await
            .expect("stream")
            .collect()
            .await;
    assert_eq!(results.len(), 2);
    assert!(matches!(results[1], Err(Error::Retrieval(_))));
}

#[tokio::test]
async fn blank_query_fails_before_any_engine_is_built() {
    let t = tables();
    let factory = ScriptedFactory::new(ScriptedEngine::answering(&["x"]));
    let err = global_search(&QueryConfig::default(), &factory, global_request(&t, "   ")).await.unwrap_err();
    assert!(matches!(err, Error::Validation(ref m) if m.contains("query")));

    let root = TempDir::new().expect("tempdir");
    let request = LocalSearchRequest { response_type: "", ..local_request(&t, &root, "q") };
    assert!(matches!(local_search_streaming(&QueryConfig::default(), &factory, request).await, Err(Error::Validation(_))));
    assert_eq!(factory.calls(), 0);
    assert!(!root.path().join("output").exists(), "no store was created");
}

#[tokio::test]
async fn local_search_populates_then_attaches_to_the_persisted_store() {
    let t = tables();
    let root = TempDir::new().expect("tempdir");

    let fresh = ScriptedFactory::new(ScriptedEngine::answering(&["Alice ", "maps."]));
    let out = local_search(&QueryConfig::default(), &fresh, local_request(&t, &root, "who draws maps?"))
        .await
        .expect("local search");
    assert_eq!(out.response, Response::Text("Alice maps.".to_string()));
    assert!(root.path().join("output").join("lancedb").exists());
    {
        let received = fresh.received.lock().unwrap();
        assert_eq!(received.local_calls, 1);
        assert_eq!(received.entities, 2);
        assert_eq!(received.reports, 2);
        assert_eq!(received.claims, Some(0), "absent covariates become an empty claims set");
    }

    let attached = ScriptedFactory::new(ScriptedEngine::answering(&["Bob ", "sails."]));
    let stream = local_search_streaming(&attach_config(), &attached, local_request(&t, &root, "who sails?"))
        .await
        .expect("attach");
    let (contexts, text) = split(stream.try_collect().await.expect("chunks"));
    assert_eq!(contexts.len(), 1);
    assert_eq!(text, "Bob sails.");

    let store = attached.received.lock().unwrap().store.take().expect("bound store");
    let doc = store.search_by_id("e2").await.expect("lookup").expect("persisted");
    assert_eq!(doc.text.as_deref(), Some("a sailor"));
}

#[tokio::test]
async fn local_streaming_matches_blocking() {
    let t = tables();
    let root = TempDir::new().expect("tempdir");
    let factory = ScriptedFactory::new(ScriptedEngine::answering(&["Alice ", "draws ", "maps."]));
    let config = QueryConfig::default();

    let blocking = local_search(&config, &factory, local_request(&t, &root, "who draws maps?"))
        .await
        .expect("blocking");
    let chunks: Vec<QueryChunk> = local_search_streaming(&config, &factory, local_request(&t, &root, "who draws maps?"))
        .await
        .expect("stream")
        .try_collect()
        .await
        .expect("chunks");

    assert!(matches!(chunks.first(), Some(QueryChunk::Context(_))));
    let (contexts, text) = split(chunks);
    assert_eq!(contexts, vec![blocking.context]);
    assert_eq!(Response::Text(text), blocking.response);
    assert_eq!(factory.received.lock().unwrap().local_calls, 2);
}

#[tokio::test]
async fn local_attach_without_persisted_collection_fails_to_connect() {
    let t = tables();
    let root = TempDir::new().expect("tempdir");
    let factory = ScriptedFactory::new(ScriptedEngine::answering(&["x"]));
    let err = local_search(&attach_config(), &factory, local_request(&t, &root, "q")).await.unwrap_err();
    assert!(matches!(err, Error::StoreConnection(_)), "got {err}");
    assert_eq!(factory.calls(), 0);
}

#[tokio::test]
async fn unknown_store_type_is_rejected_for_local_search() {
    let t = tables();
    let root = TempDir::new().expect("tempdir");
    let config = QueryConfig {
        embeddings: EmbeddingsConfig {
            vector_store: Some(VectorStoreConfig { store_type: "qdrant".to_string(), ..VectorStoreConfig::default() }),
        },
        ..QueryConfig::default()
    };
    let factory = ScriptedFactory::new(ScriptedEngine::answering(&["x"]));
    let err = local_search(&config, &factory, local_request(&t, &root, "q")).await.unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}
