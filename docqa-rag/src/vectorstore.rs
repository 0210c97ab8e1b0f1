//! Persistent vector store.
//!
//! A [`VectorStore`] is one named collection living in a directory:
//!
//! - `collection.json`: the [`CollectionManifest`]
//! - `records.jsonl`: one serialized [`VectorRecord`] per line, append-only
//!
//! All records are held in memory behind a `tokio::sync::RwLock` and
//! searched by brute-force cosine similarity. Writes go to disk before the
//! in-memory copy is updated.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::document::{Chunk, SearchResult, VectorRecord};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result, ValidationError};

const MANIFEST_FILE: &str = "collection.json";
const RECORDS_FILE: &str = "records.jsonl";
const FORMAT_VERSION: u32 = 1;

/// Describes the collection stored in a persistence directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionManifest {
    pub name: String,
    /// Model that produced the stored embeddings.
    pub embedding_model: String,
    /// Embedding dimensionality. `None` until the first record is stored.
    pub dimensions: Option<usize>,
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
}

struct Collection {
    manifest: CollectionManifest,
    records: Vec<VectorRecord>,
}

/// A handle to a persisted collection of embedded chunks.
///
/// Obtain one with [`VectorStore::open`] or [`VectorStore::create`]. After
/// [`invalidate`](VectorStore::invalidate) every operation on the handle
/// fails with [`RagError::StoreNotInitialized`].
pub struct VectorStore {
    path: PathBuf,
    collection: RwLock<Option<Collection>>,
}

impl VectorStore {
    /// Open the collection persisted at `path`.
    ///
    /// Returns `Ok(None)` when no collection exists there.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Storage`] if a manifest exists but the collection
    /// cannot be read back.
    pub async fn open(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        let manifest_path = path.join(MANIFEST_FILE);
        let exists = tokio::fs::try_exists(&manifest_path)
            .await
            .map_err(|e| RagError::storage(path, e))?;
        if !exists {
            debug!(path = %path.display(), "no persisted collection");
            return Ok(None);
        }

        let raw = tokio::fs::read_to_string(&manifest_path)
            .await
            .map_err(|e| RagError::storage(&manifest_path, e))?;
        let manifest: CollectionManifest = serde_json::from_str(&raw)
            .map_err(|e| RagError::storage(&manifest_path, format!("invalid manifest: {e}")))?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(RagError::storage(
                &manifest_path,
                format!("unsupported format version {}", manifest.format_version),
            ));
        }

        let records = read_records(&path.join(RECORDS_FILE)).await?;
        info!(
            path = %path.display(),
            collection = %manifest.name,
            record_count = records.len(),
            "opened persisted collection"
        );

        Ok(Some(Self {
            path: path.to_path_buf(),
            collection: RwLock::new(Some(Collection { manifest, records })),
        }))
    }

    /// Embed `chunks` and persist them as a new collection at `path`.
    ///
    /// Any previous collection files at `path` are overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Embedding`] if embedding fails and
    /// [`RagError::Storage`] if `path` is not writable.
    pub async fn create(
        name: &str,
        chunks: Vec<Chunk>,
        embedder: &dyn EmbeddingProvider,
        path: impl AsRef<Path>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let records = embed_chunks(chunks, embedder, None).await?;

        let manifest = CollectionManifest {
            name: name.to_string(),
            embedding_model: embedder.model_id().to_string(),
            dimensions: records.first().map(|r| r.embedding.len()),
            format_version: FORMAT_VERSION,
            created_at: Utc::now(),
        };

        tokio::fs::create_dir_all(path).await.map_err(|e| RagError::storage(path, e))?;
        let records_path = path.join(RECORDS_FILE);
        tokio::fs::write(&records_path, encode_records(&records)?)
            .await
            .map_err(|e| RagError::storage(&records_path, e))?;
        write_manifest(path, &manifest).await?;

        info!(
            path = %path.display(),
            collection = name,
            record_count = records.len(),
            "created collection"
        );

        Ok(Self {
            path: path.to_path_buf(),
            collection: RwLock::new(Some(Collection { manifest, records })),
        })
    }

    /// Embed `chunks` and append them to this collection.
    ///
    /// Returns the number of records added.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::StoreNotInitialized`] if the handle was
    /// invalidated or its files were removed, [`RagError::Embedding`] on
    /// embedding failure or dimension mismatch, and [`RagError::Storage`] if
    /// the append fails.
    pub async fn add(&self, chunks: Vec<Chunk>, embedder: &dyn EmbeddingProvider) -> Result<usize> {
        let mut guard = self.collection.write().await;
        let collection = guard.as_mut().ok_or(RagError::StoreNotInitialized)?;

        let manifest_path = self.path.join(MANIFEST_FILE);
        let exists = tokio::fs::try_exists(&manifest_path)
            .await
            .map_err(|e| RagError::storage(&self.path, e))?;
        if !exists {
            warn!(path = %self.path.display(), "collection files vanished; handle is stale");
            return Err(RagError::StoreNotInitialized);
        }

        if chunks.is_empty() {
            return Ok(0);
        }

        let records = embed_chunks(chunks, embedder, collection.manifest.dimensions).await?;

        let records_path = self.path.join(RECORDS_FILE);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&records_path)
            .await
            .map_err(|e| RagError::storage(&records_path, e))?;
        file.write_all(encode_records(&records)?.as_bytes())
            .await
            .map_err(|e| RagError::storage(&records_path, e))?;
        file.sync_data().await.map_err(|e| RagError::storage(&records_path, e))?;

        if collection.manifest.dimensions.is_none() {
            collection.manifest.dimensions = records.first().map(|r| r.embedding.len());
            write_manifest(&self.path, &collection.manifest).await?;
        }

        let added = records.len();
        collection.records.extend(records);
        info!(
            path = %self.path.display(),
            added,
            record_count = collection.records.len(),
            "appended records"
        );
        Ok(added)
    }

    /// Return the `k` records most similar to `query`, best match first.
    ///
    /// Returns every record when the collection holds fewer than `k`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTopK`] when `k == 0`,
    /// [`RagError::StoreNotInitialized`] on an invalidated handle, and
    /// [`RagError::Embedding`] when the query embedding's dimensionality
    /// differs from the stored records'.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Err(ValidationError::InvalidTopK(k).into());
        }

        let guard = self.collection.read().await;
        let collection = guard.as_ref().ok_or(RagError::StoreNotInitialized)?;
        if collection.records.is_empty() {
            return Ok(Vec::new());
        }

        if collection.manifest.embedding_model != embedder.model_id() {
            warn!(
                stored = %collection.manifest.embedding_model,
                query = embedder.model_id(),
                "query embedder differs from the one that built the collection"
            );
        }
        let query_embedding = embedder.embed(query).await?;
        let stored_dimensions = collection.manifest.dimensions;
        if let Some(dimensions) = stored_dimensions.filter(|d| *d != query_embedding.len()) {
            return Err(RagError::Embedding {
                provider: embedder.model_id().to_string(),
                message: format!(
                    "expected {dimensions}-dimensional embeddings, got {}",
                    query_embedding.len()
                ),
            });
        }

        let mut scored: Vec<SearchResult> = collection
            .records
            .iter()
            .map(|record| SearchResult {
                chunk: record.chunk.clone(),
                score: cosine_similarity(&record.embedding, &query_embedding),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        debug!(k, result_count = scored.len(), "similarity search");
        Ok(scored)
    }

    /// Remove every persisted file at `path`. Succeeds when nothing is there.
    pub async fn reset(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => {
                info!(path = %path.display(), "removed persisted collection");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RagError::storage(path, e)),
        }
    }

    /// Drop the in-memory records; later calls on this handle fail.
    pub async fn invalidate(&self) {
        self.collection.write().await.take();
    }

    /// Number of stored records, or zero for an invalidated handle.
    pub async fn len(&self) -> usize {
        self.collection.read().await.as_ref().map_or(0, |c| c.records.len())
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn manifest(&self) -> Option<CollectionManifest> {
        self.collection.read().await.as_ref().map(|c| c.manifest.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore").field("path", &self.path).finish_non_exhaustive()
    }
}

/// Embed chunk contents in one batch and pair them with their chunks.
async fn embed_chunks(
    chunks: Vec<Chunk>,
    embedder: &dyn EmbeddingProvider,
    expected_dimensions: Option<usize>,
) -> Result<Vec<VectorRecord>> {
    if chunks.is_empty() {
        return Ok(Vec::new());
    }

    let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
    let embeddings = embedder.embed_batch(&texts).await?;
    if embeddings.len() != chunks.len() {
        return Err(RagError::Embedding {
            provider: embedder.model_id().to_string(),
            message: format!("expected {} embeddings, got {}", chunks.len(), embeddings.len()),
        });
    }

    let dimensions = expected_dimensions.unwrap_or(embeddings[0].len());
    if let Some(bad) = embeddings.iter().find(|e| e.len() != dimensions) {
        return Err(RagError::Embedding {
            provider: embedder.model_id().to_string(),
            message: format!("expected {dimensions}-dimensional embeddings, got {}", bad.len()),
        });
    }

    Ok(chunks
        .into_iter()
        .zip(embeddings)
        .map(|(chunk, embedding)| VectorRecord { chunk, embedding })
        .collect())
}

fn encode_records(records: &[VectorRecord]) -> Result<String> {
    let mut out = String::new();
    for record in records {
        let line = serde_json::to_string(record).map_err(|e| RagError::Storage {
            path: RECORDS_FILE.to_string(),
            message: format!("failed to encode record '{}': {e}", record.chunk.id),
        })?;
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

async fn read_records(path: &Path) -> Result<Vec<VectorRecord>> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(RagError::storage(path, e)),
    };

    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .map_err(|e| RagError::storage(path, format!("line {}: {e}", i + 1)))
        })
        .collect()
}

/// Write the manifest through a temporary file so readers never see a partial one.
async fn write_manifest(dir: &Path, manifest: &CollectionManifest) -> Result<()> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let tmp_path = dir.join(format!("{MANIFEST_FILE}.tmp"));
    let body = serde_json::to_vec_pretty(manifest)
        .map_err(|e| RagError::storage(&manifest_path, e))?;
    tokio::fs::write(&tmp_path, body).await.map_err(|e| RagError::storage(&tmp_path, e))?;
    tokio::fs::rename(&tmp_path, &manifest_path)
        .await
        .map_err(|e| RagError::storage(&manifest_path, e))
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
