use arrow_array::{FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::database::CreateTableMode;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, Table as LanceTable};
use std::sync::Arc;
use tracing::{debug, info};

use kgq_core::error::{Error, Result};
use kgq_core::table::Columns;
use kgq_core::types::Attributes;

use crate::schema::{build_document_schema, ATTRIBUTES_COLUMN, DISTANCE_COLUMN, ID_COLUMN, TEXT_COLUMN, VECTOR_COLUMN};
use crate::store::{StoreSettings, VectorSearchResult, VectorStore, VectorStoreDocument, VectorStoreType};
use crate::table::{open_db, store_err, table_exists};

/// Used when fresh population runs without a persisted location.
pub const IN_MEMORY_URI: &str = "memory://";

/// LanceDB-backed embedding collection.
pub struct LanceDbStore {
	collection_name: String,
	db: Option<Connection>,
	table: Option<LanceTable>,
}

impl LanceDbStore {
	pub fn new(collection_name: &str) -> Self {
		Self { collection_name: collection_name.to_string(), db: None, table: None }
	}

	fn db(&self) -> Result<&Connection> {
		self.db.as_ref().ok_or_else(|| Error::store_connection(format!("collection '{}' is not connected", self.collection_name)))
	}

	/// `None` when connected but nothing was ever written, which reads as an empty collection.
	fn table(&self) -> Result<Option<&LanceTable>> {
		self.db()?;
		Ok(self.table.as_ref())
	}

	fn docs_to_record_batch(&self, docs: &[VectorStoreDocument]) -> Result<RecordBatch> {
		let dim = docs.first().map_or(0, |d| d.vector.len());
		if dim == 0 {
			return Err(Error::validation(format!("cannot write empty vectors into '{}'", self.collection_name)));
		}
		if let Some(bad) = docs.iter().find(|d| d.vector.len() != dim) {
			return Err(Error::validation(format!("vector for '{}' has dimension {}, expected {}", bad.id, bad.vector.len(), dim)));
		}
		let dim = i32::try_from(dim).map_err(|_| Error::validation(format!("vector dimension {dim} is too large")))?;
		let mut ids = Vec::new(); let mut texts = Vec::new(); let mut attributes = Vec::new(); let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::new();
		for doc in docs {
			ids.push(doc.id.clone());
			texts.push(doc.text.clone());
			attributes.push(serde_json::to_string(&doc.attributes).map_err(|e| Error::validation(e.to_string()))?);
			vectors.push(Some(doc.vector.iter().map(|&x| Some(x)).collect()));
		}
		RecordBatch::try_new(build_document_schema(dim), vec![
			Arc::new(StringArray::from(ids)),
			Arc::new(StringArray::from(texts)),
			Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), dim)),
			Arc::new(StringArray::from(attributes)),
		])
		.map_err(|e| Error::validation(e.to_string()))
	}
}

fn batch_to_documents(collection: &str, batch: &RecordBatch) -> Result<Vec<(VectorStoreDocument, Option<f64>)>> {
	let cols = Columns::new(collection, batch);
	let id = cols.required(ID_COLUMN)?;
	let text = cols.optional(TEXT_COLUMN);
	let vector = cols.optional(VECTOR_COLUMN);
	let attributes = cols.optional(ATTRIBUTES_COLUMN);
	let distance = cols.optional(DISTANCE_COLUMN);
	let mut out = Vec::with_capacity(batch.num_rows());
	for i in 0..batch.num_rows() {
		let attrs: Attributes = match attributes.map(|c| c.string(i)).transpose()?.flatten() {
			Some(raw) => serde_json::from_str(&raw).map_err(|e| Error::validation(format!("bad attributes for row {i} of '{collection}': {e}")))?,
			None => Attributes::new(),
		};
		let doc = VectorStoreDocument {
			id: id.required_string(i)?,
			text: text.map(|c| c.string(i)).transpose()?.flatten(),
			vector: vector.map(|c| c.floats(i)).transpose()?.flatten().unwrap_or_default(),
			attributes: attrs,
		};
		out.push((doc, distance.map(|c| c.float(i)).transpose()?.flatten()));
	}
	Ok(out)
}

/// Scores as `1 - |distance|`, best first. Rows without a distance are dropped.
fn score_rows(collection: &str, rows: Vec<(VectorStoreDocument, Option<f64>)>) -> Vec<VectorSearchResult> {
	let total = rows.len();
	let mut results: Vec<VectorSearchResult> = rows
		.into_iter()
		.filter_map(|(document, distance)| {
			#[allow(clippy::cast_possible_truncation)]
			let score = 1.0 - distance?.abs() as f32;
			Some(VectorSearchResult { document, score })
		})
		.collect();
	if results.len() < total {
		debug!(collection, unscored = total - results.len(), "dropped search rows without a distance");
	}
	results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
	results
}

#[async_trait]
impl VectorStore for LanceDbStore {
	fn store_type(&self) -> VectorStoreType { VectorStoreType::LanceDb }

	fn collection_name(&self) -> &str { &self.collection_name }

	async fn connect(&mut self, settings: &StoreSettings) -> Result<()> {
		let uri = settings.db_uri.as_deref().unwrap_or(IN_MEMORY_URI);
		self.db = Some(open_db(uri).await?);
		info!(uri, collection = %self.collection_name, "connected to LanceDB");
		Ok(())
	}

	async fn load_documents(&mut self, documents: Vec<VectorStoreDocument>, overwrite: bool) -> Result<usize> {
		let db = self.db()?;
		let exists = table_exists(db, &self.collection_name).await?;
		if documents.is_empty() {
			if exists {
				let t = db.open_table(&self.collection_name).execute().await.map_err(store_err)?;
				let t = if overwrite {
					let schema = t.schema().await.map_err(store_err)?;
					let reader = Box::new(RecordBatchIterator::new(vec![].into_iter(), schema));
					db.create_table(&self.collection_name, reader).mode(CreateTableMode::Overwrite).execute().await.map_err(store_err)?
				} else {
					t
				};
				self.table = Some(t);
			}
			debug!(collection = %self.collection_name, "no documents to load");
			return Ok(0);
		}
		let record_batch = self.docs_to_record_batch(&documents)?; let schema = record_batch.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(record_batch)].into_iter(), schema));
		let table = if exists && !overwrite {
			let t = db.open_table(&self.collection_name).execute().await.map_err(store_err)?;
			t.add(reader).execute().await.map_err(store_err)?;
			t
		} else {
			// replaces any previous collection in one step, schema included
			db.create_table(&self.collection_name, reader).mode(CreateTableMode::Overwrite).execute().await.map_err(store_err)?
		};
		self.table = Some(table);
		info!(collection = %self.collection_name, count = documents.len(), "loaded documents into LanceDB");
		Ok(documents.len())
	}

	async fn open_existing(&mut self) -> Result<()> {
		let table = self.db()?
			.open_table(&self.collection_name)
			.execute()
			.await
			.map_err(|e| Error::store_connection(format!("cannot open collection '{}': {}", self.collection_name, e)))?;
		self.table = Some(table);
		Ok(())
	}

	async fn similarity_search_by_vector(&self, query: &[f32], k: usize) -> Result<Vec<VectorSearchResult>> {
		let Some(table) = self.table()? else { return Ok(Vec::new()) };
		let mut stream = table.vector_search(query.to_vec()).map_err(store_err)?.limit(k).execute().await.map_err(store_err)?;
		let mut rows = Vec::new();
		while let Some(batch) = stream.try_next().await.map_err(store_err)? {
			rows.extend(batch_to_documents(&self.collection_name, &batch)?);
		}
		Ok(score_rows(&self.collection_name, rows))
	}

	async fn search_by_id(&self, id: &str) -> Result<Option<VectorStoreDocument>> {
		let Some(table) = self.table()? else { return Ok(None) };
		let mut stream = table.query().only_if(format!("{} = '{}'", ID_COLUMN, id.replace('\'', "''"))).limit(1).execute().await.map_err(store_err)?;
		while let Some(batch) = stream.try_next().await.map_err(store_err)? {
			if let Some((doc, _)) = batch_to_documents(&self.collection_name, &batch)?.into_iter().next() {
				return Ok(Some(doc));
			}
		}
		Ok(None)
	}
}
