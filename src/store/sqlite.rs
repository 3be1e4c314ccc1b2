//! SQLite-backed vector store using the sqlite-vec extension.
use std::path::Path;
use std::sync::Once;

use rusqlite::{Connection, OptionalExtension, params};
use sqlite_vec::sqlite3_vec_init;
use tracing::{debug, info};

use super::{
    ChunkEntry, ChunkMetadata, MetadataFilter, QueryMatch, StoreError, VectorStore,
    is_zero_vector, serialize_vector,
};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    collection TEXT NOT NULL,
    chunk_id TEXT NOT NULL,
    document TEXT NOT NULL,
    source TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    total_chunks INTEGER NOT NULL,
    file_path TEXT NOT NULL,
    indexed_at TEXT NOT NULL,
    UNIQUE(collection, chunk_id)
);

CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(collection, source);
CREATE INDEX IF NOT EXISTS idx_chunks_file_path ON chunks(collection, file_path);
"#;

static INIT_VEC: Once = Once::new();

/// Initialize the sqlite-vec extension. Safe to call multiple times.
fn init_sqlite_vec() {
    INIT_VEC.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// A collection of embedded chunks stored in SQLite.
pub struct SqliteStore {
    conn: Connection,
    collection: String,
    dimensions: usize,
}

impl SqliteStore {
    /// Open (or create) the store at `path`.
    pub fn open<P: AsRef<Path>>(
        path: P,
        collection: &str,
        dimensions: usize,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref();
        info!("Opening vector store: {}", path.display());
        init_sqlite_vec();
        let conn = Connection::open(path)?;
        Self::init(conn, collection, dimensions)
    }

    /// Open an in-memory store (useful for testing).
    pub fn open_in_memory(collection: &str, dimensions: usize) -> Result<Self, StoreError> {
        init_sqlite_vec();
        let conn = Connection::open_in_memory()?;
        Self::init(conn, collection, dimensions)
    }

    fn init(conn: Connection, collection: &str, dimensions: usize) -> Result<Self, StoreError> {
        let vec_version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
        debug!("sqlite-vec version: {}", vec_version);

        conn.execute_batch(SCHEMA_SQL)?;
        // Every collection in the file shares one vec0 table of fixed width
        if let Some(existing) = vec_table_dimensions(&conn)? {
            if existing != dimensions {
                return Err(StoreError::DimensionMismatch {
                    expected: existing,
                    actual: dimensions,
                });
            }
        }
        conn.execute_batch(&format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS vec_chunks USING vec0(embedding FLOAT[{dimensions}]);"
        ))?;

        info!("Vector store ready (collection: {collection}, dimensions: {dimensions})");

        Ok(Self {
            conn,
            collection: collection.to_string(),
            dimensions,
        })
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn check_dimensions(&self, embedding: &[f32]) -> Result<(), StoreError> {
        if embedding.len() != self.dimensions {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimensions,
                actual: embedding.len(),
            });
        }
        Ok(())
    }
}

/// Width of the existing `vec_chunks` table, read back from its DDL.
fn vec_table_dimensions(conn: &Connection) -> Result<Option<usize>, StoreError> {
    let sql: Option<String> = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = 'vec_chunks'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    Ok(sql.and_then(|sql| {
        let upper = sql.to_ascii_uppercase();
        let start = upper.find("FLOAT[")? + "FLOAT[".len();
        let end = start + upper[start..].find(']')?;
        upper[start..end].trim().parse().ok()
    }))
}

fn map_match_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueryMatch> {
    Ok(QueryMatch {
        id: row.get(0)?,
        document: row.get(1)?,
        metadata: ChunkMetadata {
            source: row.get(2)?,
            chunk_index: row.get::<_, i64>(3)? as usize,
            total_chunks: row.get::<_, i64>(4)? as usize,
            file_path: row.get(5)?,
            indexed_at: row.get(6)?,
        },
        distance: row.get(7)?,
    })
}

impl VectorStore for SqliteStore {
    fn add(&mut self, entries: &[ChunkEntry]) -> Result<(), StoreError> {
        for entry in entries {
            self.check_dimensions(&entry.embedding)?;
            if is_zero_vector(&entry.embedding) {
                return Err(StoreError::ZeroVector {
                    id: entry.id.clone(),
                });
            }
        }

        let tx = self.conn.transaction()?;

        for entry in entries {
            // Replace any previous entry with the same id
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM chunks WHERE collection = ? AND chunk_id = ?",
                    params![self.collection, entry.id],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(rowid) = existing {
                tx.execute("DELETE FROM vec_chunks WHERE rowid = ?", params![rowid])?;
                tx.execute("DELETE FROM chunks WHERE id = ?", params![rowid])?;
            }

            let meta = &entry.metadata;
            tx.execute(
                r#"
                INSERT INTO chunks
                    (collection, chunk_id, document, source, chunk_index, total_chunks, file_path, indexed_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
                params![
                    self.collection,
                    entry.id,
                    entry.document,
                    meta.source,
                    meta.chunk_index as i64,
                    meta.total_chunks as i64,
                    meta.file_path,
                    meta.indexed_at,
                ],
            )?;
            let rowid = tx.last_insert_rowid();

            tx.execute(
                "INSERT INTO vec_chunks (rowid, embedding) VALUES (?, ?)",
                params![rowid, serialize_vector(&entry.embedding)],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<QueryMatch>, StoreError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        self.check_dimensions(embedding)?;
        if is_zero_vector(embedding) {
            debug!("Zero query vector, nothing can match");
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(
            r#"
            SELECT
                c.chunk_id,
                c.document,
                c.source,
                c.chunk_index,
                c.total_chunks,
                c.file_path,
                c.indexed_at,
                vec_distance_cosine(v.embedding, ?1) AS distance
            FROM vec_chunks v
            JOIN chunks c ON v.rowid = c.id
            WHERE c.collection = ?2
              AND vec_distance_cosine(v.embedding, ?1) IS NOT NULL
            ORDER BY distance ASC
            LIMIT ?3
            "#,
        )?;
        let rows = stmt.query_map(
            params![serialize_vector(embedding), self.collection, top_k as i64],
            map_match_row,
        )?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    fn get_ids(&self, filter: MetadataFilter<'_>) -> Result<Vec<String>, StoreError> {
        let (sql, value) = match filter {
            MetadataFilter::Source(v) => (
                "SELECT chunk_id FROM chunks WHERE collection = ? AND source = ? ORDER BY id",
                v,
            ),
            MetadataFilter::FilePath(v) => (
                "SELECT chunk_id FROM chunks WHERE collection = ? AND file_path = ? ORDER BY id",
                v,
            ),
        };

        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![self.collection, value], |row| row.get(0))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    fn delete(&mut self, ids: &[String]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        let mut removed = 0;
        for id in ids {
            // vec0 tables do not take part in foreign-key cascades
            tx.execute(
                "DELETE FROM vec_chunks WHERE rowid IN (SELECT id FROM chunks WHERE collection = ? AND chunk_id = ?)",
                params![self.collection, id],
            )?;
            removed += tx.execute(
                "DELETE FROM chunks WHERE collection = ? AND chunk_id = ?",
                params![self.collection, id],
            )?;
        }
        tx.commit()?;
        Ok(removed)
    }

    fn count(&self) -> Result<usize, StoreError> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE collection = ?",
            params![self.collection],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}
