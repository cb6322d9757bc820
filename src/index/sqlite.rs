//! SQLite + `sqlite-vec` backing store for the embedding index.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::{Path, PathBuf};
use std::sync::Once;

use tokio_rusqlite::{Connection, Transaction, ffi};

use super::{IndexError, ScoredChunk};
use crate::chunk::Chunk;
use crate::embedding::EmbeddingProvider;

const META_DIMENSION: &str = "dimension";

/// Persisted vector index over knowledge-base chunks.
///
/// Cheap to clone: the connection is a handle onto one background SQLite
/// thread, so clones share the same store.
#[derive(Clone)]
pub struct SqliteChunkIndex {
    conn: Connection,
    path: PathBuf,
    dimension: usize,
}

impl std::fmt::Debug for SqliteChunkIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteChunkIndex")
            .field("path", &self.path)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl SqliteChunkIndex {
    /// Build a fresh index at `path` from the full chunk batch.
    ///
    /// Every chunk is embedded before the store is touched, and all rows are
    /// written inside one transaction; a failure at any point leaves no
    /// partial index behind. A pre-existing store at `path` is replaced only
    /// once embedding has succeeded.
    pub async fn build(
        path: impl AsRef<Path>,
        provider: &dyn EmbeddingProvider,
        chunks: Vec<Chunk>,
    ) -> Result<Self, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::EmptyBuild);
        }
        register_sqlite_vec()?;

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = provider.embed_batch(&texts).await?;
        let dimension = check_dimensions(&vectors, chunks.len())?;

        let path = path.as_ref().to_path_buf();
        if path.exists() {
            std::fs::remove_file(&path).map_err(|err| IndexError::Storage(err.to_string()))?;
        }

        let conn = Connection::open(&path)
            .await
            .map_err(|err| IndexError::Storage(err.to_string()))?;
        let rows: Vec<(Chunk, String)> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| (chunk, vector_literal(&vector)))
            .collect();
        let count = rows.len();

        let written = conn
            .call(move |conn| -> tokio_rusqlite::Result<_> {
                let tx = conn.transaction()?;
                tx.execute_batch(SCHEMA)?;
                tx.execute(
                    "INSERT INTO index_meta (key, value) VALUES (?1, ?2)",
                    (META_DIMENSION, dimension.to_string()),
                )?;
                for (chunk, vector) in &rows {
                    insert_row(&tx, chunk, vector)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await;
        if let Err(err) = written {
            // All-or-nothing: a half-written store must not be mistaken for
            // a persisted index by a later load.
            let _ = std::fs::remove_file(&path);
            return Err(IndexError::Storage(err.to_string()));
        }

        tracing::info!(path = %path.display(), chunks = count, dimension, "built chunk index");
        Ok(Self {
            conn,
            path,
            dimension,
        })
    }

    /// Load a previously persisted index from `path`.
    ///
    /// Returns `Ok(None)` when nothing is persisted there; that is the
    /// build-or-load signal, not an error. A file that exists but does not
    /// hold an index surfaces as [`IndexError::Storage`].
    pub async fn load(path: impl AsRef<Path>) -> Result<Option<Self>, IndexError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Ok(None);
        }
        register_sqlite_vec()?;

        let conn = Connection::open(&path)
            .await
            .map_err(|err| IndexError::Storage(err.to_string()))?;
        let dimension: String = conn
            .call(|conn| -> tokio_rusqlite::Result<_> {
                let value = conn.query_row(
                    "SELECT value FROM index_meta WHERE key = ?1",
                    [META_DIMENSION],
                    |row| row.get(0),
                )?;
                Ok(value)
            })
            .await
            .map_err(|err| IndexError::Storage(format!("not a chunk index: {err}")))?;
        let dimension: usize = dimension
            .parse()
            .map_err(|_| IndexError::Storage(format!("corrupt dimension entry '{dimension}'")))?;

        let index = Self {
            conn,
            path,
            dimension,
        };
        let entries = index.len().await?;
        tracing::info!(path = %index.path.display(), entries, dimension, "loaded chunk index");
        Ok(Some(index))
    }

    /// Nearest-neighbour search: the `k` most similar entries, best first.
    pub async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::Dimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if self.len().await? == 0 {
            return Err(IndexError::Empty);
        }

        let literal = vector_literal(vector);
        let results = self
            .conn
            .call(move |conn| -> tokio_rusqlite::Result<_> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT c.id, c.source_id, c.seq, c.content, \
                     vec_distance_cosine(e.embedding, vec_f32(?1)) AS distance \
                     FROM chunks c \
                     JOIN chunk_embeddings e ON c.id = e.id \
                     ORDER BY distance ASC \
                     LIMIT {k}"
                ))?;
                let rows = stmt.query_map([&literal], |row| {
                    let chunk = Chunk {
                        id: row.get(0)?,
                        source_id: row.get(1)?,
                        seq: row.get::<_, i64>(2)? as usize,
                        text: row.get(3)?,
                    };
                    let distance: f32 = row.get(4)?;
                    Ok(ScoredChunk {
                        chunk,
                        score: 1.0 - distance,
                    })
                })?;
                let mut results = Vec::new();
                for row in rows {
                    results.push(row?);
                }
                Ok(results)
            })
            .await
            .map_err(|err| IndexError::Storage(err.to_string()))?;
        Ok(results)
    }

    /// Embed and insert additional chunks, re-persisting the index.
    ///
    /// Incremental ingestion only; never called on the request hot path.
    pub async fn add(
        &self,
        provider: &dyn EmbeddingProvider,
        chunks: Vec<Chunk>,
    ) -> Result<(), IndexError> {
        if chunks.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = provider.embed_batch(&texts).await?;
        let dimension = check_dimensions(&vectors, chunks.len())?;
        if dimension != self.dimension {
            return Err(IndexError::Dimension {
                expected: self.dimension,
                actual: dimension,
            });
        }

        let rows: Vec<(Chunk, String)> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| (chunk, vector_literal(&vector)))
            .collect();
        let count = rows.len();
        self.conn
            .call(move |conn| -> tokio_rusqlite::Result<_> {
                let tx = conn.transaction()?;
                for (chunk, vector) in &rows {
                    insert_row(&tx, chunk, vector)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|err| IndexError::Storage(err.to_string()))?;
        tracing::debug!(path = %self.path.display(), added = count, "extended chunk index");
        Ok(())
    }

    /// Number of entries in the index.
    pub async fn len(&self) -> Result<usize, IndexError> {
        let count: i64 = self
            .conn
            .call(|conn| -> tokio_rusqlite::Result<_> {
                let count = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
                Ok(count)
            })
            .await
            .map_err(|err| IndexError::Storage(err.to_string()))?;
        Ok(count as usize)
    }

    /// `true` when the index holds no entries.
    pub async fn is_empty(&self) -> Result<bool, IndexError> {
        Ok(self.len().await? == 0)
    }

    /// Vector dimension recorded at build time.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Location of the backing store.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS index_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS chunks (
    id        TEXT PRIMARY KEY,
    source_id TEXT NOT NULL,
    seq       INTEGER NOT NULL,
    content   TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS chunk_embeddings (
    id        TEXT PRIMARY KEY,
    embedding BLOB NOT NULL
);
";

fn insert_row(
    tx: &Transaction<'_>,
    chunk: &Chunk,
    vector_json: &str,
) -> Result<(), tokio_rusqlite::Error> {
    tx.execute(
        "INSERT OR REPLACE INTO chunks (id, source_id, seq, content) VALUES (?1, ?2, ?3, ?4)",
        (&chunk.id, &chunk.source_id, chunk.seq as i64, &chunk.text),
    )?;
    tx.execute(
        "INSERT OR REPLACE INTO chunk_embeddings (id, embedding) VALUES (?1, vec_f32(?2))",
        (&chunk.id, vector_json),
    )?;
    Ok(())
}

/// JSON array literal understood by `vec_f32`.
fn vector_literal(vector: &[f32]) -> String {
    serde_json::to_string(vector).expect("a float slice always serialises")
}

fn check_dimensions(vectors: &[Vec<f32>], expected_rows: usize) -> Result<usize, IndexError> {
    if vectors.len() != expected_rows {
        return Err(IndexError::Storage(format!(
            "embedding backend returned {} vectors for {} chunks",
            vectors.len(),
            expected_rows
        )));
    }
    let dimension = vectors.first().map_or(0, Vec::len);
    if dimension == 0 {
        return Err(IndexError::Storage("embedding backend returned empty vectors".into()));
    }
    for vector in vectors {
        if vector.len() != dimension {
            return Err(IndexError::Dimension {
                expected: dimension,
                actual: vector.len(),
            });
        }
    }
    Ok(dimension)
}

/// Register the `sqlite-vec` extension for every connection in the process.
///
/// `sqlite3_auto_extension` is process-global, so this must run exactly once
/// before the first connection opens; subsequent calls only report the
/// recorded outcome.
fn register_sqlite_vec() -> Result<(), IndexError> {
    use std::sync::Mutex;

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
            let init_fn: SqliteExtensionInit =
                transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
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
        .map_err(IndexError::Storage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingProvider;

    #[tokio::test]
    async fn zero_entry_index_refuses_queries() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockEmbeddingProvider::new();
        let index = SqliteChunkIndex::build(
            dir.path().join("index.db"),
            &provider,
            vec![Chunk::with_id("c0", "kb", 0, "only entry")],
        )
        .await
        .unwrap();

        // A store that lost its rows must fail loudly, not return nothing.
        index
            .conn
            .call(|conn| -> tokio_rusqlite::Result<_> {
                conn.execute("DELETE FROM chunks", [])?;
                conn.execute("DELETE FROM chunk_embeddings", [])?;
                Ok(())
            })
            .await
            .unwrap();

        let vector = vec![0.0f32; index.dimension()];
        let err = index.query(&vector, 3).await.unwrap_err();
        assert!(matches!(err, IndexError::Empty));
    }

    #[tokio::test]
    async fn load_rejects_a_file_that_is_not_an_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.db");
        std::fs::write(&path, b"not a database").unwrap();
        let err = SqliteChunkIndex::load(&path).await.unwrap_err();
        assert!(matches!(err, IndexError::Storage(_)));
    }
}
