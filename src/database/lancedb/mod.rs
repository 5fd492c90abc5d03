// LanceDB vector database module
// Arrow schema and record batch conversion for index entries


pub mod vector_store;

use arrow::array::{
    Array, FixedSizeListArray, Float32Array, StringArray, UInt32Array, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{EntryMetadata, IndexEntry, IndexSpec, SearchHit, Similarity};
use crate::document::DocumentMetadata;
use crate::{QaError, Result};

pub use vector_store::LanceVectorStore;

pub const VECTOR_COLUMN: &str = "embedding";
pub const DISTANCE_COLUMN: &str = "_distance";
const SIMILARITY_KEY: &str = "similarity";

/// Table schema for an index with the given parameters.
///
/// The similarity function lives in the schema metadata since LanceDB only
/// records a distance type on ANN indices.
#[inline]
pub fn entry_schema(spec: IndexSpec) -> Arc<Schema> {
    let fields = vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("seq", DataType::UInt64, false),
        Field::new("text", DataType::Utf8, false),
        Field::new(
            VECTOR_COLUMN,
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                spec.dimension as i32,
            ),
            false,
        ),
        Field::new("source", DataType::Utf8, false),
        Field::new("page", DataType::UInt32, false),
        Field::new("chunk_index", DataType::UInt32, false),
    ];

    let metadata = HashMap::from([(
        SIMILARITY_KEY.to_string(),
        spec.similarity.as_str().to_string(),
    )]);

    Arc::new(Schema::new_with_metadata(fields, metadata))
}

/// Recover index parameters from a table schema
#[inline]
pub fn spec_from_schema(schema: &Schema) -> Result<IndexSpec> {
    let field = schema
        .field_with_name(VECTOR_COLUMN)
        .map_err(|_| QaError::Store(format!("Missing {} column", VECTOR_COLUMN)))?;

    let dimension = match field.data_type() {
        DataType::FixedSizeList(_, size) => *size as usize,
        other => {
            return Err(QaError::Store(format!(
                "Unexpected {} column type: {}",
                VECTOR_COLUMN, other
            )));
        }
    };

    let similarity = match schema.metadata().get(SIMILARITY_KEY) {
        Some(value) => Similarity::parse(value)
            .ok_or_else(|| QaError::Store(format!("Unknown similarity function {:?}", value)))?,
        None => {
            tracing::warn!("Index schema has no similarity recorded, assuming cosine");
            Similarity::Cosine
        }
    };

    Ok(IndexSpec {
        dimension,
        similarity,
    })
}

/// Build a record batch from entries, numbering them from `first_seq`
#[inline]
pub fn entries_to_batch(
    entries: &[IndexEntry],
    spec: IndexSpec,
    first_seq: u64,
) -> Result<RecordBatch> {
    let len = entries.len();

    let mut ids = Vec::with_capacity(len);
    let mut seqs = Vec::with_capacity(len);
    let mut texts = Vec::with_capacity(len);
    let mut flat_values = Vec::with_capacity(len * spec.dimension);
    let mut sources = Vec::with_capacity(len);
    let mut pages = Vec::with_capacity(len);
    let mut chunk_indices = Vec::with_capacity(len);

    for (offset, entry) in entries.iter().enumerate() {
        if entry.vector.len() != spec.dimension {
            return Err(QaError::DimensionMismatch {
                expected: spec.dimension,
                actual: entry.vector.len(),
            });
        }

        ids.push(Uuid::new_v4().to_string());
        seqs.push(first_seq + offset as u64);
        texts.push(entry.text.as_str());
        flat_values.extend_from_slice(&entry.vector);
        sources.push(entry.metadata.document.source.as_str());
        pages.push(entry.metadata.document.page);
        chunk_indices.push(entry.metadata.chunk_index);
    }

    let item_field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array = FixedSizeListArray::try_new(
        item_field,
        spec.dimension as i32,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| QaError::Store(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(UInt64Array::from(seqs)),
        Arc::new(StringArray::from(texts)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(sources)),
        Arc::new(UInt32Array::from(pages)),
        Arc::new(UInt32Array::from(chunk_indices)),
    ];

    RecordBatch::try_new(entry_schema(spec), arrays)
        .map_err(|e| QaError::Store(format!("Failed to create record batch: {}", e)))
}

/// Parse a batch of search results into hits
#[inline]
pub fn batch_to_hits(batch: &RecordBatch, similarity: Similarity) -> Result<Vec<SearchHit>> {
    let texts = typed_column::<StringArray>(batch, "text")?;
    let seqs = typed_column::<UInt64Array>(batch, "seq")?;
    let sources = typed_column::<StringArray>(batch, "source")?;
    let pages = typed_column::<UInt32Array>(batch, "page")?;
    let chunk_indices = typed_column::<UInt32Array>(batch, "chunk_index")?;
    let distances = typed_column::<Float32Array>(batch, DISTANCE_COLUMN)?;

    let hits = (0..batch.num_rows())
        .map(|row| SearchHit {
            text: texts.value(row).to_string(),
            metadata: EntryMetadata {
                document: DocumentMetadata {
                    source: sources.value(row).to_string(),
                    page: pages.value(row),
                },
                chunk_index: chunk_indices.value(row),
            },
            score: similarity.score_from_distance(distances.value(row)),
            seq: seqs.value(row),
        })
        .collect();

    Ok(hits)
}

fn typed_column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| QaError::Store(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| QaError::Store(format!("Invalid {} column type", name)))
}
