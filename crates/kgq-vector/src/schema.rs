use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const ID_COLUMN: &str = "id";
pub const TEXT_COLUMN: &str = "text";
pub const VECTOR_COLUMN: &str = "vector";
pub const ATTRIBUTES_COLUMN: &str = "attributes";
pub const DISTANCE_COLUMN: &str = "_distance";

/// Schema of an embedding collection; `attributes` holds a JSON object.
pub fn build_document_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new(ID_COLUMN, DataType::Utf8, false),
		Field::new(TEXT_COLUMN, DataType::Utf8, true),
		Field::new(VECTOR_COLUMN, DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
		Field::new(ATTRIBUTES_COLUMN, DataType::Utf8, true),
	]))
}
