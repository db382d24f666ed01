
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, DistanceType, Table};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::{IndexedPoint, PointPayload, filter_valid_ids, validate_points};
use crate::config::VectorStoreConfig;
use crate::{RagError, Result};

pub const TABLE_NAME: &str = "chunks";

/// Embedded vector table stored under the configuration directory
pub struct LanceStore {
    connection: Connection,
    table_name: String,
    dimension: usize,
    score_threshold: Option<f32>,
}

impl std::fmt::Debug for LanceStore {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanceStore")
            .field("table_name", &self.table_name)
            .field("dimension", &self.dimension)
            .field("score_threshold", &self.score_threshold)
            .finish_non_exhaustive()
    }
}

impl LanceStore {
    /// Open (creating if needed) the database directory at `db_path`
    #[inline]
    pub async fn open(db_path: &Path, config: &VectorStoreConfig, dimension: usize) -> Result<Self> {
        debug!("Opening LanceDB at {}", db_path.display());

        tokio::fs::create_dir_all(db_path).await.map_err(|e| {
            RagError::vector_store(format!(
                "Failed to create vector database directory {}: {}",
                db_path.display(),
                e
            ))
        })?;

        let uri = db_path.to_string_lossy();
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RagError::vector_store(format!("Failed to connect to LanceDB: {}", e)))?;

        Ok(Self {
            connection,
            table_name: TABLE_NAME.to_string(),
            dimension,
            score_threshold: (config.score_threshold > 0.0).then_some(config.score_threshold),
        })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Create the table if missing. An existing table with another vector
    /// length is an error: its contents cannot be searched with this model.
    #[inline]
    pub async fn ensure_collection(&self) -> Result<bool> {
        if let Some(table) = self.open_table().await? {
            let existing = vector_dimension(&table).await?;
            if existing != self.dimension {
                return Err(RagError::vector_store(format!(
                    "Table '{}' stores {} dimensions but {} are configured; clear it first",
                    self.table_name, existing, self.dimension
                )));
            }
            debug!("LanceDB table '{}' already exists", self.table_name);
            return Ok(false);
        }

        self.connection
            .create_empty_table(&self.table_name, create_schema(self.dimension)?)
            .execute()
            .await
            .map_err(|e| RagError::vector_store(format!("Failed to create table: {}", e)))?;

        info!(
            "Created LanceDB table '{}' with {} dimensions",
            self.table_name, self.dimension
        );
        Ok(true)
    }

    #[inline]
    pub async fn add_documents(&self, points: &[IndexedPoint]) -> Result<()> {
        if points.is_empty() {
            debug!("No points to upsert");
            return Ok(());
        }
        validate_points(points, self.dimension)?;

        let table = self.require_table().await?;
        let batch = create_record_batch(points, self.dimension)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);

        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(reader))
            .await
            .map_err(|e| RagError::vector_store(format!("Failed to upsert points: {}", e)))?;

        debug!("Upserted {} points into '{}'", points.len(), self.table_name);
        Ok(())
    }

    #[inline]
    pub async fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<IndexedPoint>> {
        let Some(table) = self.open_table().await? else {
            debug!("Table '{}' does not exist yet; nothing to search", self.table_name);
            return Ok(Vec::new());
        };

        let results = table
            .vector_search(query_vector)
            .map_err(|e| RagError::vector_store(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(top_k)
            .execute()
            .await
            .map_err(|e| RagError::vector_store(format!("Failed to execute search: {}", e)))?;

        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(|e| RagError::vector_store(format!("Failed to read result stream: {}", e)))?;

        let mut points = Vec::new();
        for batch in &batches {
            points.extend(parse_search_batch(batch)?);
        }

        if let Some(threshold) = self.score_threshold {
            points.retain(|p| p.score.is_some_and(|score| score >= threshold));
        }
        points.sort_by(|a, b| {
            b.score
                .unwrap_or_default()
                .total_cmp(&a.score.unwrap_or_default())
        });
        points.truncate(top_k);

        debug!("Search returned {} points", points.len());
        Ok(points)
    }

    #[inline]
    pub async fn fetch_existing_ids(&self, ids: &[String]) -> Result<HashSet<String>> {
        let ids = filter_valid_ids(ids);
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let Some(table) = self.open_table().await? else {
            return Ok(HashSet::new());
        };

        // Valid UUIDs contain no quotes, so they can be inlined in the predicate
        let predicate = format!("id IN ('{}')", ids.join("', '"));
        let batches: Vec<RecordBatch> = table
            .query()
            .only_if(predicate)
            .select(Select::columns(&["id"]))
            .limit(ids.len())
            .execute()
            .await
            .map_err(|e| RagError::vector_store(format!("Failed to query ids: {}", e)))?
            .try_collect()
            .await
            .map_err(|e| RagError::vector_store(format!("Failed to read id stream: {}", e)))?;

        let mut existing = HashSet::new();
        for batch in &batches {
            let column = string_column(batch, "id")?;
            existing.extend((0..batch.num_rows()).map(|row| column.value(row).to_string()));
        }
        Ok(existing)
    }

    #[inline]
    pub async fn clear(&self) -> Result<()> {
        if let Some(table) = self.open_table().await? {
            table
                .delete("true")
                .await
                .map_err(|e| RagError::vector_store(format!("Failed to delete points: {}", e)))?;
            info!("Cleared all points from '{}'", self.table_name);
        }
        Ok(())
    }

    #[inline]
    pub async fn count(&self) -> Result<u64> {
        let Some(table) = self.open_table().await? else {
            return Ok(0);
        };

        let count = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::vector_store(format!("Failed to count rows: {}", e)))?;
        Ok(count as u64)
    }

    async fn open_table(&self) -> Result<Option<Table>> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::vector_store(format!("Failed to list tables: {}", e)))?;

        if !table_names.contains(&self.table_name) {
            return Ok(None);
        }

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RagError::vector_store(format!("Failed to open table: {}", e)))?;
        Ok(Some(table))
    }

    async fn require_table(&self) -> Result<Table> {
        self.open_table().await?.ok_or_else(|| {
            RagError::vector_store(format!(
                "Table '{}' does not exist; index some documents first",
                self.table_name
            ))
        })
    }
}

fn create_schema(dimension: usize) -> Result<Arc<Schema>> {
    let size = i32::try_from(dimension)
        .map_err(|_| RagError::vector_store(format!("Unsupported dimension {}", dimension)))?;

    Ok(Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), size),
            false,
        ),
        Field::new("text", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("section", DataType::Utf8, true),
        Field::new("lang", DataType::Utf8, false),
        Field::new("tokens", DataType::UInt32, false),
    ])))
}

async fn vector_dimension(table: &Table) -> Result<usize> {
    let schema = table
        .schema()
        .await
        .map_err(|e| RagError::vector_store(format!("Failed to read table schema: {}", e)))?;

    match schema.field_with_name("vector").map(|f| f.data_type()) {
        Ok(DataType::FixedSizeList(_, size)) => usize::try_from(*size)
            .map_err(|_| RagError::vector_store(format!("Invalid vector size {}", size))),
        _ => Err(RagError::vector_store(
            "Table has no fixed-size vector column",
        )),
    }
}

fn create_record_batch(points: &[IndexedPoint], dimension: usize) -> Result<RecordBatch> {
    let schema = create_schema(dimension)?;

    let flat_values: Vec<f32> = points.iter().flat_map(|p| p.vector.iter().copied()).collect();
    let item_field = Arc::new(Field::new("item", DataType::Float32, true));
    let size = i32::try_from(dimension)
        .map_err(|_| RagError::vector_store(format!("Unsupported dimension {}", dimension)))?;
    let vectors = FixedSizeListArray::try_new(
        item_field,
        size,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| RagError::vector_store(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from_iter_values(points.iter().map(|p| p.id.as_str()))),
        Arc::new(vectors),
        Arc::new(StringArray::from_iter_values(
            points.iter().map(|p| p.payload.text.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            points.iter().map(|p| p.payload.source.as_str()),
        )),
        Arc::new(StringArray::from(
            points
                .iter()
                .map(|p| p.payload.section.as_deref())
                .collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from_iter_values(
            points.iter().map(|p| p.payload.lang.as_str()),
        )),
        Arc::new(UInt32Array::from_iter_values(
            points.iter().map(|p| p.payload.tokens),
        )),
    ];

    RecordBatch::try_new(schema, arrays)
        .map_err(|e| RagError::vector_store(format!("Failed to create record batch: {}", e)))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::vector_store(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::vector_store(format!("Invalid {} column type", name)))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<IndexedPoint>> {
    let ids = string_column(batch, "id")?;
    let texts = string_column(batch, "text")?;
    let sources = string_column(batch, "source")?;
    let sections = string_column(batch, "section")?;
    let langs = string_column(batch, "lang")?;
    let tokens = batch
        .column_by_name("tokens")
        .and_then(|col| col.as_any().downcast_ref::<UInt32Array>())
        .ok_or_else(|| RagError::vector_store("Missing or invalid tokens column"))?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    Ok((0..batch.num_rows())
        .map(|row| {
            let distance = distances.and_then(|d| (!d.is_null(row)).then(|| d.value(row)));

            IndexedPoint {
                id: ids.value(row).to_string(),
                vector: Vec::new(),
                payload: PointPayload {
                    text: texts.value(row).to_string(),
                    source: sources.value(row).to_string(),
                    section: (!sections.is_null(row)).then(|| sections.value(row).to_string()),
                    lang: langs.value(row).to_string(),
                    tokens: tokens.value(row),
                },
                // Cosine distance is 1 - similarity
                score: distance.map(|d| 1.0 - d),
            }
        })
        .collect())
}
