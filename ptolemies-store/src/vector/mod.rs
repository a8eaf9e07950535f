//! Persistent fragment + vector store with similarity query (C6).
//!
//! Backed by SQLite plus the `sqlite-vec` extension, registered the same way
//! this codebase's RAG chunk store does it: a one-time
//! `sqlite3_auto_extension` call transmuting `sqlite_vec::sqlite3_vec_init`
//! into the extension-init signature rusqlite expects.

mod error;

pub use error::StoreError;

use chrono::Utc;
use ptolemies_core::ids::{ChunkId, DocumentId, SourceId};
use ptolemies_core::model::{Category, Chunk, ChunkRecord};
use std::os::raw::c_char;
use std::path::Path;
use std::sync::{Mutex, Once};
use tokio_rusqlite::{ffi, Connection};

#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub source_id: Option<SourceId>,
    pub category: Option<Category>,
    pub min_quality: Option<f64>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Stats {
    pub n_chunks: usize,
    pub n_embedded: usize,
    pub per_source: std::collections::BTreeMap<String, usize>,
}

pub struct VectorStore {
    conn: Connection,
    dimension: usize,
}

/// A bound parameter for `similarity_search`'s dynamically-assembled WHERE
/// clause; one variant per column type it filters on, so the query string
/// never carries interpolated filter values.
enum FilterValue {
    Text(String),
    Real(f64),
}

impl rusqlite::ToSql for FilterValue {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        match self {
            FilterValue::Text(s) => rusqlite::ToSql::to_sql(s),
            FilterValue::Real(f) => rusqlite::ToSql::to_sql(f),
        }
    }
}

fn register_sqlite_vec() -> Result<(), StoreError> {
    static INIT: Once = Once::new();
    static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

    INIT.call_once(|| {
        let result = unsafe {
            type SqliteExtensionInit = unsafe extern "C" fn(
                *mut ffi::sqlite3,
                *mut *mut c_char,
                *const ffi::sqlite3_api_routines,
            ) -> i32;

            let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
            let init_fn: SqliteExtensionInit = std::mem::transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
            let rc = ffi::sqlite3_auto_extension(Some(init_fn));
            if rc != 0 {
                Err(format!("failed to register sqlite-vec extension (code {rc})"))
            } else {
                Ok(())
            }
        };
        *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
    });

    INIT_RESULT
        .lock()
        .expect("init result mutex poisoned")
        .clone()
        .expect("init was called but result not set")
        .map_err(StoreError::Extension)
}

impl VectorStore {
    pub async fn open(path: impl AsRef<Path>, dimension: usize) -> Result<Self, StoreError> {
        register_sqlite_vec()?;
        let conn = Connection::open(path).await?;
        conn.call(|conn| {
            conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0))
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
            Ok(())
        })
        .await?;

        let store = Self { conn, dimension };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        let dimension = self.dimension;
        self.conn
            .call(move |conn| {
                conn.execute_batch(&format!(
                    "CREATE TABLE IF NOT EXISTS chunks (
                        chunk_id TEXT PRIMARY KEY,
                        document_id TEXT NOT NULL,
                        source_id TEXT NOT NULL,
                        category TEXT NOT NULL,
                        content TEXT NOT NULL,
                        chunk_index INTEGER NOT NULL,
                        total_chunks INTEGER NOT NULL,
                        quality_score REAL NOT NULL,
                        topics TEXT NOT NULL,
                        extraction_version INTEGER NOT NULL,
                        active INTEGER NOT NULL DEFAULT 1,
                        created_at TEXT NOT NULL,
                        tombstoned_at TEXT
                    );
                    CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);
                    CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source_id, category, quality_score);

                    CREATE TABLE IF NOT EXISTS embeddings_meta (
                        chunk_id TEXT PRIMARY KEY,
                        model TEXT NOT NULL,
                        dimension INTEGER NOT NULL,
                        created_at TEXT NOT NULL
                    );

                    CREATE VIRTUAL TABLE IF NOT EXISTS embeddings_vec USING vec0(
                        chunk_id TEXT PRIMARY KEY,
                        embedding FLOAT[{dimension}]
                    );

                    CREATE TABLE IF NOT EXISTS intent_log (
                        document_id TEXT PRIMARY KEY,
                        extraction_version INTEGER NOT NULL,
                        phase TEXT NOT NULL
                    );"
                ))
                .map_err(tokio_rusqlite::Error::Rusqlite)
            })
            .await?;
        Ok(())
    }

    /// Atomic per-document upsert: inserts the new `(document_id,
    /// extraction_version)` chunk set and tombstones any pre-existing chunks
    /// for that document with a lower `extraction_version`, all within one
    /// transaction (§4.6).
    pub async fn upsert_chunks(&self, records: Vec<ChunkRecord>) -> Result<Vec<ChunkId>, StoreError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let document_id = records[0].document_id.clone();
        let extraction_version = records[0].extraction_version;
        let now = Utc::now().to_rfc3339();

        let mut seen = std::collections::HashSet::new();
        for r in &records {
            if !seen.insert(r.chunk_index) {
                return Err(StoreError::DuplicateChunk {
                    document_id: document_id.to_string(),
                    chunk_index: r.chunk_index,
                });
            }
        }

        let ids: Vec<ChunkId> = records.iter().map(|r| r.chunk_id()).collect();

        self.conn
            .call(move |conn| {
                let tx = conn.transaction().map_err(tokio_rusqlite::Error::Rusqlite)?;
                tx.execute(
                    "UPDATE chunks SET active = 0, tombstoned_at = ?1
                     WHERE document_id = ?2 AND extraction_version < ?3 AND active = 1",
                    rusqlite::params![now, document_id.as_str(), extraction_version],
                )
                .map_err(tokio_rusqlite::Error::Rusqlite)?;

                for record in &records {
                    let chunk_id = record.chunk_id();
                    tx.execute(
                        "INSERT INTO chunks (chunk_id, document_id, source_id, category, content,
                            chunk_index, total_chunks, quality_score, topics, extraction_version, active, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1, ?11)
                         ON CONFLICT(chunk_id) DO UPDATE SET
                            content = excluded.content,
                            total_chunks = excluded.total_chunks,
                            quality_score = excluded.quality_score,
                            topics = excluded.topics,
                            extraction_version = excluded.extraction_version,
                            active = 1",
                        rusqlite::params![
                            chunk_id.as_str(),
                            record.document_id.as_str(),
                            record.source_id.as_str(),
                            record.category.as_str(),
                            record.content,
                            record.chunk_index as i64,
                            record.total_chunks as i64,
                            record.quality_score,
                            serde_json::to_string(&record.topics).unwrap_or_default(),
                            record.extraction_version,
                            now,
                        ],
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                }

                tx.execute(
                    "INSERT INTO intent_log (document_id, extraction_version, phase)
                     VALUES (?1, ?2, 'vector_staged')
                     ON CONFLICT(document_id) DO UPDATE SET extraction_version = excluded.extraction_version, phase = 'vector_staged'",
                    rusqlite::params![document_id.as_str(), extraction_version],
                )
                .map_err(tokio_rusqlite::Error::Rusqlite)?;

                tx.commit().map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(())
            })
            .await?;

        Ok(ids)
    }

    /// Marks the intent log entry for `document_id` complete once the graph
    /// store commit succeeds — the second half of the two-phase protocol.
    pub async fn complete_intent(&self, document_id: DocumentId) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE intent_log SET phase = 'done' WHERE document_id = ?1",
                    rusqlite::params![document_id.as_str()],
                )
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Dangling intents (`phase = 'vector_staged'`) left by a crash, for the
    /// startup reconciliation sweep (§5).
    pub async fn pending_intents(&self) -> Result<Vec<(DocumentId, u32)>, StoreError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn
                    .prepare("SELECT document_id, extraction_version FROM intent_log WHERE phase = 'vector_staged'")
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(rows)
            })
            .await?;
        Ok(rows
            .into_iter()
            .map(|(doc, ver)| (DocumentId::from(doc), ver as u32))
            .collect())
    }

    /// Rolls back a dangling intent by tombstoning the staged chunks for
    /// that document.
    pub async fn rollback_intent(&self, document_id: DocumentId) -> Result<(), StoreError> {
        self.tombstone_document(document_id).await
    }

    pub async fn upsert_embedding(
        &self,
        chunk_id: ChunkId,
        vector: Vec<f32>,
        model_name: String,
    ) -> Result<(), StoreError> {
        if vector.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        let now = Utc::now().to_rfc3339();
        let embedding_json = serde_json::to_string(&vector)?;

        self.conn
            .call(move |conn| {
                let tx = conn.transaction().map_err(tokio_rusqlite::Error::Rusqlite)?;
                tx.execute(
                    "DELETE FROM embeddings_vec WHERE chunk_id = ?1",
                    rusqlite::params![chunk_id.as_str()],
                )
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
                tx.execute(
                    "INSERT INTO embeddings_vec (chunk_id, embedding) VALUES (?1, vec_f32(?2))",
                    rusqlite::params![chunk_id.as_str(), embedding_json],
                )
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
                tx.execute(
                    "INSERT INTO embeddings_meta (chunk_id, model, dimension, created_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(chunk_id) DO UPDATE SET model = excluded.model, dimension = excluded.dimension, created_at = excluded.created_at",
                    rusqlite::params![chunk_id.as_str(), model_name, vector.len() as i64, now],
                )
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
                tx.commit().map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Cosine similarity search with pre-ANN metadata pruning where a filter
    /// is present, 4x over-fetch otherwise, tie-broken by `quality_score`
    /// then lexicographic `chunk_id` (§4.6).
    pub async fn similarity_search(
        &self,
        query_vector: Vec<f32>,
        k: usize,
        filters: SearchFilters,
    ) -> Result<Vec<(ChunkId, f32)>, StoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let embedding_json = serde_json::to_string(&query_vector)?;
        let fetch_k = k * 4;

        let mut where_clauses = vec!["c.active = 1".to_string()];
        let mut bind_values: Vec<FilterValue> = vec![FilterValue::Text(embedding_json)];
        if let Some(source_id) = &filters.source_id {
            where_clauses.push("c.source_id = ?".to_string());
            bind_values.push(FilterValue::Text(source_id.as_str().to_string()));
        }
        if let Some(category) = &filters.category {
            where_clauses.push("c.category = ?".to_string());
            bind_values.push(FilterValue::Text(category.as_str().to_string()));
        }
        if let Some(min_quality) = filters.min_quality {
            where_clauses.push("c.quality_score >= ?".to_string());
            bind_values.push(FilterValue::Real(min_quality));
        }
        let where_sql = where_clauses.join(" AND ");

        let sql = format!(
            "SELECT c.chunk_id, c.quality_score, vec_distance_cosine(e.embedding, vec_f32(?)) as distance
             FROM embeddings_vec e
             JOIN chunks c ON c.chunk_id = e.chunk_id
             WHERE {where_sql}
             ORDER BY distance ASC
             LIMIT {fetch_k}"
        );

        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql).map_err(tokio_rusqlite::Error::Rusqlite)?;
                let params = rusqlite::params_from_iter(bind_values.iter());
                let rows = stmt
                    .query_map(params, |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, f64>(1)?,
                            row.get::<_, f64>(2)?,
                        ))
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(rows)
            })
            .await?;

        let mut scored: Vec<(ChunkId, f64, f64)> = rows
            .into_iter()
            .map(|(chunk_id, quality_score, distance)| (ChunkId::from(chunk_id), 1.0 - distance, quality_score))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a.0.as_str().cmp(b.0.as_str()))
        });

        Ok(scored.into_iter().take(k).map(|(id, sim, _)| (id, sim as f32)).collect())
    }

    pub async fn get_chunks(&self, chunk_ids: Vec<ChunkId>) -> Result<Vec<Chunk>, StoreError> {
        if chunk_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = chunk_ids.iter().map(|c| c.as_str().to_string()).collect();
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT chunk_id, document_id, source_id, content, chunk_index, total_chunks,
                    quality_score, topics, extraction_version, active, created_at
             FROM chunks WHERE chunk_id IN ({placeholders})"
        );

        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql).map_err(tokio_rusqlite::Error::Rusqlite)?;
                let params = rusqlite::params_from_iter(ids.iter());
                let rows = stmt
                    .query_map(params, |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, i64>(4)?,
                            row.get::<_, i64>(5)?,
                            row.get::<_, f64>(6)?,
                            row.get::<_, String>(7)?,
                            row.get::<_, i64>(8)?,
                            row.get::<_, i64>(9)?,
                            row.get::<_, String>(10)?,
                        ))
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(rows)
            })
            .await?;

        Ok(rows
            .into_iter()
            .map(
                |(chunk_id, document_id, source_id, content, chunk_index, total_chunks, quality_score, topics_json, extraction_version, active, created_at)| {
                    Chunk {
                        chunk_id: ChunkId::from(chunk_id),
                        document_id: DocumentId::from(document_id),
                        source_id: SourceId::from(source_id),
                        char_length: content.chars().count(),
                        content,
                        chunk_index: chunk_index as usize,
                        total_chunks: total_chunks as usize,
                        quality_score,
                        topics: serde_json::from_str(&topics_json).unwrap_or_default(),
                        embedding_id: None,
                        extraction_version: extraction_version as u32,
                        active: active != 0,
                        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                            .map(|dt| dt.with_timezone(&Utc))
                            .unwrap_or_else(|_| Utc::now()),
                    }
                },
            )
            .collect())
    }

    pub async fn tombstone_document(&self, document_id: DocumentId) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE chunks SET active = 0, tombstoned_at = ?1 WHERE document_id = ?2 AND active = 1",
                    rusqlite::params![now, document_id.as_str()],
                )
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Deletes tombstoned rows older than `retention` (invariant 5: visible
    /// to GC until the retention window elapses).
    pub async fn gc(&self, retention: chrono::Duration) -> Result<usize, StoreError> {
        let cutoff = (Utc::now() - retention).to_rfc3339();
        let deleted = self
            .conn
            .call(move |conn| {
                let ids: Vec<String> = {
                    let mut stmt = conn
                        .prepare("SELECT chunk_id FROM chunks WHERE active = 0 AND tombstoned_at < ?1")
                        .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    stmt.query_map(rusqlite::params![cutoff], |row| row.get::<_, String>(0))
                        .map_err(tokio_rusqlite::Error::Rusqlite)?
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(tokio_rusqlite::Error::Rusqlite)?
                };
                for id in &ids {
                    conn.execute("DELETE FROM embeddings_vec WHERE chunk_id = ?1", rusqlite::params![id])
                        .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    conn.execute("DELETE FROM embeddings_meta WHERE chunk_id = ?1", rusqlite::params![id])
                        .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    conn.execute("DELETE FROM chunks WHERE chunk_id = ?1", rusqlite::params![id])
                        .map_err(tokio_rusqlite::Error::Rusqlite)?;
                }
                Ok(ids.len())
            })
            .await?;
        Ok(deleted)
    }

    pub async fn stats(&self) -> Result<Stats, StoreError> {
        let (n_chunks, per_source, n_embedded) = self
            .conn
            .call(|conn| {
                let n_chunks: i64 = conn
                    .query_row("SELECT COUNT(*) FROM chunks WHERE active = 1", [], |r| r.get(0))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let n_embedded: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM chunks c JOIN embeddings_meta m ON c.chunk_id = m.chunk_id WHERE c.active = 1",
                        [],
                        |r| r.get(0),
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let mut stmt = conn
                    .prepare("SELECT source_id, COUNT(*) FROM chunks WHERE active = 1 GROUP BY source_id")
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let per_source = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize)))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?
                    .collect::<Result<std::collections::BTreeMap<_, _>, _>>()
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok((n_chunks, per_source, n_embedded))
            })
            .await?;

        Ok(Stats {
            n_chunks: n_chunks as usize,
            n_embedded: n_embedded as usize,
            per_source,
        })
    }

    /// Every active chunk row, for invariant checking (`verify`): chunk-index
    /// contiguity, duplicate `(document_id, chunk_index)`, and cross-store
    /// `chunk_id` parity all need the full active set, not a by-id lookup.
    pub async fn all_active_chunks(&self) -> Result<Vec<Chunk>, StoreError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT chunk_id, document_id, source_id, content, chunk_index, total_chunks,
                                quality_score, topics, extraction_version, active, created_at
                         FROM chunks WHERE active = 1",
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, i64>(4)?,
                            row.get::<_, i64>(5)?,
                            row.get::<_, f64>(6)?,
                            row.get::<_, String>(7)?,
                            row.get::<_, i64>(8)?,
                            row.get::<_, i64>(9)?,
                            row.get::<_, String>(10)?,
                        ))
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(rows)
            })
            .await?;

        Ok(rows
            .into_iter()
            .map(
                |(chunk_id, document_id, source_id, content, chunk_index, total_chunks, quality_score, topics_json, extraction_version, active, created_at)| {
                    Chunk {
                        chunk_id: ChunkId::from(chunk_id),
                        document_id: DocumentId::from(document_id),
                        source_id: SourceId::from(source_id),
                        char_length: content.chars().count(),
                        content,
                        chunk_index: chunk_index as usize,
                        total_chunks: total_chunks as usize,
                        quality_score,
                        topics: serde_json::from_str(&topics_json).unwrap_or_default(),
                        embedding_id: None,
                        extraction_version: extraction_version as u32,
                        active: active != 0,
                        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                            .map(|dt| dt.with_timezone(&Utc))
                            .unwrap_or_else(|_| Utc::now()),
                    }
                },
            )
            .collect())
    }

    /// Every stored embedding vector, for `verify`'s normalization and
    /// dimension checks (invariant 2). Reads back through `vec_to_json`,
    /// the sqlite-vec inverse of the `vec_f32` used to write it.
    pub async fn all_embeddings(&self) -> Result<Vec<(ChunkId, Vec<f32>)>, StoreError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn
                    .prepare("SELECT chunk_id, vec_to_json(embedding) FROM embeddings_vec")
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(rows)
            })
            .await?;

        Ok(rows
            .into_iter()
            .map(|(chunk_id, vector_json)| {
                let vector: Vec<f32> = serde_json::from_str(&vector_json).unwrap_or_default();
                (ChunkId::from(chunk_id), vector)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ptolemies_core::model::Category;

    async fn open_store() -> VectorStore {
        VectorStore::open(":memory:", 4).await.unwrap()
    }

    fn record(document: &str, index: usize, total: usize, version: u32) -> ChunkRecord {
        ChunkRecord {
            document_id: DocumentId::from(document),
            source_id: SourceId::from("fastapi"),
            category: Category::Backend,
            content: format!("chunk {index}"),
            chunk_index: index,
            total_chunks: total,
            quality_score: 0.8,
            topics: vec!["async".to_string()],
            extraction_version: version,
        }
    }

    #[tokio::test]
    async fn upsert_then_fetch_roundtrip() {
        let store = open_store().await;
        let records = vec![record("doc1", 0, 2, 1), record("doc1", 1, 2, 1)];
        let ids = store.upsert_chunks(records).await.unwrap();
        assert_eq!(ids.len(), 2);
        let fetched = store.get_chunks(ids).await.unwrap();
        assert_eq!(fetched.len(), 2);
    }

    #[tokio::test]
    async fn re_extraction_tombstones_old_chunks() {
        let store = open_store().await;
        store
            .upsert_chunks(vec![record("doc1", 0, 2, 1), record("doc1", 1, 2, 1)])
            .await
            .unwrap();
        store.upsert_chunks(vec![record("doc1", 0, 1, 2)]).await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.n_chunks, 1);
    }

    #[tokio::test]
    async fn embedding_dimension_mismatch_rejected() {
        let store = open_store().await;
        let ids = store.upsert_chunks(vec![record("doc1", 0, 1, 1)]).await.unwrap();
        let err = store
            .upsert_embedding(ids[0].clone(), vec![1.0, 0.0], "mock".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn similarity_search_respects_k_zero() {
        let store = open_store().await;
        let results = store
            .similarity_search(vec![0.0; 4], 0, SearchFilters::default())
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
