//! Retrieval engine orchestrator.
//!
//! The [`RetrievalEngine`] owns the single mutable piece of service state,
//! the persisted [`VectorStore`] handle, and coordinates ingestion
//! (extract → chunk → embed → store) and question answering
//! (validate → retrieve → build prompt → generate).
//!
//! Mutations (`ingest`, `reset`) hold the state lock exclusively for their
//! whole duration. `retrieve` holds it shared while validating and
//! searching, then releases it before calling the generator.
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::{RagConfig, RetrievalEngine, UploadedFile};
//!
//! let engine = RetrievalEngine::builder()
//!     .config(RagConfig::default())
//!     .persist_directory("vector_db")
//!     .embedding_provider(Arc::new(my_embedder))
//!     .generator(Arc::new(my_generator))
//!     .build()?;
//!
//! engine.ingest(vec![UploadedFile::new("guide.pdf", bytes)], false).await?;
//! let result = engine.retrieve("What color is the sky?", None).await?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::RagConfig;
use crate::document::{Document, IngestReport, QueryResult, Source};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result, ValidationError};
use crate::generator::Generator;
use crate::loader::{DocumentLoader, LoaderRegistry, UploadedFile};
use crate::prompt::PromptBuilder;
use crate::vectorstore::VectorStore;

/// Message returned by [`RetrievalEngine::reset`].
pub const RESET_MESSAGE: &str = "Engine reset successfully.";

enum StoreState {
    /// Disk has not been checked yet.
    Unloaded,
    Absent,
    Present(Arc<VectorStore>),
}

/// Ingests documents and answers questions grounded in them.
///
/// Construct one via [`RetrievalEngine::builder()`] and share it behind an
/// `Arc`; all methods take `&self`.
pub struct RetrievalEngine {
    config: RagConfig,
    persist_directory: PathBuf,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn Generator>,
    chunker: Arc<dyn Chunker>,
    loaders: LoaderRegistry,
    prompt_builder: PromptBuilder,
    state: RwLock<StoreState>,
}

impl RetrievalEngine {
    /// Create a new [`RetrievalEngineBuilder`].
    pub fn builder() -> RetrievalEngineBuilder {
        RetrievalEngineBuilder::default()
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn persist_directory(&self) -> &Path {
        &self.persist_directory
    }

    pub fn loaders(&self) -> &LoaderRegistry {
        &self.loaders
    }

    /// Number of stored records, or `None` when no store exists.
    pub async fn store_len(&self) -> Result<Option<usize>> {
        let state = self.read_state().await?;
        match &*state {
            StoreState::Present(store) => Ok(Some(store.len().await)),
            _ => Ok(None),
        }
    }

    /// Ingest uploaded files.
    ///
    /// With `replace`, all stored records are discarded first. Files whose
    /// type is not allowed or not supported are skipped and listed in the
    /// report. The store is created on the first ingestion that yields at
    /// least one chunk.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Extraction`] if a supported file cannot be read,
    /// [`RagError::Embedding`] if embedding fails, and
    /// [`RagError::Storage`] if the store cannot be written.
    pub async fn ingest(&self, files: Vec<UploadedFile>, replace: bool) -> Result<IngestReport> {
        let span = info_span!(
            "engine.ingest",
            request.id = %Uuid::new_v4(),
            file_count = files.len(),
            replace
        );
        self.ingest_inner(files, replace).instrument(span).await
    }

    async fn ingest_inner(&self, files: Vec<UploadedFile>, replace: bool) -> Result<IngestReport> {
        let mut state = self.state.write().await;

        if replace {
            self.discard(&mut state).await?;
            info!("replace requested; existing records discarded");
        } else {
            self.load_if_unloaded(&mut state).await?;
        }

        let mut report = IngestReport::default();
        let mut chunks = Vec::new();

        for file in files {
            let Some(loader) = self.loaders.loader_for(&file) else {
                warn!(file = %file.name, "skipping unsupported file type");
                report.skipped_files.push(file.name);
                continue;
            };

            let document = load_document(loader, file).await.inspect_err(|e| {
                error!(error = %e, "text extraction failed");
            })?;
            let document_chunks = self.chunker.chunk(&document);
            info!(
                document.name = %document.name,
                document.id = %document.id,
                chunk_count = document_chunks.len(),
                "chunked document"
            );
            report.files_ingested += 1;
            chunks.extend(document_chunks);
        }

        report.chunks_ingested = chunks.len();
        if chunks.is_empty() {
            info!(skipped = report.skipped_files.len(), "nothing to ingest");
            return Ok(report);
        }

        let embedder = self.embedding_provider.as_ref();
        match &*state {
            StoreState::Present(store) => {
                store.add(chunks, embedder).await.inspect_err(|e| {
                    error!(error = %e, "failed to append to vector store");
                })?;
            }
            StoreState::Absent | StoreState::Unloaded => {
                let store = VectorStore::create(
                    &self.config.collection_name,
                    chunks,
                    embedder,
                    &self.persist_directory,
                )
                .await
                .inspect_err(|e| error!(error = %e, "failed to create vector store"))?;
                *state = StoreState::Present(Arc::new(store));
            }
        }

        info!(
            chunk_count = report.chunks_ingested,
            files_ingested = report.files_ingested,
            skipped = report.skipped_files.len(),
            "ingestion completed"
        );
        Ok(report)
    }

    /// Answer `question` from the `k` most similar stored chunks.
    ///
    /// `k` defaults to the configured `default_top_k`. Checks run in this
    /// order and the first failure wins:
    ///
    /// 1. a store exists ([`RagError::StoreNotInitialized`])
    /// 2. the question is not blank ([`ValidationError::EmptyQuestion`])
    /// 3. the question is at most `max_question_words` words
    ///    ([`ValidationError::QuestionTooLong`])
    /// 4. `k` is positive ([`ValidationError::InvalidTopK`])
    ///
    /// Sources are every retrieved chunk, best match first, even when the
    /// prompt had to drop some of them to fit the token budget.
    ///
    /// # Errors
    ///
    /// Besides the checks above, returns [`RagError::Embedding`] or
    /// [`RagError::Generation`] on backend failure and
    /// [`RagError::GenerationTimeout`] when generation exceeds the
    /// configured timeout.
    pub async fn retrieve(&self, question: &str, k: Option<usize>) -> Result<QueryResult> {
        let span = info_span!("engine.retrieve", request.id = %Uuid::new_v4(), k = ?k);
        self.retrieve_inner(question, k).instrument(span).await
    }

    async fn retrieve_inner(&self, question: &str, k: Option<usize>) -> Result<QueryResult> {
        let state = self.read_state().await?;
        let StoreState::Present(store) = &*state else {
            info!("query rejected: no store");
            return Err(RagError::StoreNotInitialized);
        };

        let question = self.validate_question(question)?;
        let k = k.unwrap_or(self.config.default_top_k);
        if k == 0 {
            return Err(ValidationError::InvalidTopK(k).into());
        }

        info!(question, k, "retrieving answer");
        let results =
            store.search(question, k, self.embedding_provider.as_ref()).await.inspect_err(|e| {
                error!(error = %e, "similarity search failed");
            })?;
        drop(state);

        let context: Vec<&str> = results.iter().map(|r| r.chunk.content.as_str()).collect();
        let prompt = self.prompt_builder.build(question, &context);
        if prompt.truncated {
            debug!(
                retrieved = results.len(),
                used = prompt.chunks_used,
                "context truncated to fit token budget"
            );
        }

        let timeout = self.config.generation_timeout;
        let answer = tokio::time::timeout(
            timeout,
            self.generator.generate(&prompt.text, self.config.max_new_tokens),
        )
        .await
        .map_err(|_| {
            error!(timeout_secs = timeout.as_secs(), "generation timed out");
            RagError::GenerationTimeout { after: timeout }
        })?
        .inspect_err(|e| error!(error = %e, "generation failed"))?;

        info!(source_count = results.len(), "query completed");
        Ok(QueryResult { answer, sources: results.into_iter().map(Source::from).collect() })
    }

    /// Discard the store, in memory and on disk. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Storage`] if the persisted files cannot be removed.
    pub async fn reset(&self) -> Result<String> {
        let span = info_span!("engine.reset", request.id = %Uuid::new_v4());
        self.reset_inner().instrument(span).await
    }

    async fn reset_inner(&self) -> Result<String> {
        let mut state = self.state.write().await;
        self.discard(&mut state).await?;
        info!("engine reset");
        Ok(RESET_MESSAGE.to_string())
    }

    fn validate_question<'q>(&self, question: &'q str) -> Result<&'q str> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ValidationError::EmptyQuestion.into());
        }
        let words = question.split_whitespace().count();
        let max = self.config.max_question_words;
        if words > max {
            return Err(ValidationError::QuestionTooLong { words, max }.into());
        }
        Ok(question)
    }

    /// Shared access to the state, loading from disk on first use.
    async fn read_state(&self) -> Result<RwLockReadGuard<'_, StoreState>> {
        let state = self.state.read().await;
        if !matches!(*state, StoreState::Unloaded) {
            return Ok(state);
        }
        drop(state);

        let mut state = self.state.write().await;
        self.load_if_unloaded(&mut state).await?;
        Ok(RwLockWriteGuard::downgrade(state))
    }

    async fn load_if_unloaded(&self, state: &mut StoreState) -> Result<()> {
        if matches!(state, StoreState::Unloaded) {
            *state = match VectorStore::open(&self.persist_directory).await? {
                Some(store) => StoreState::Present(Arc::new(store)),
                None => StoreState::Absent,
            };
        }
        Ok(())
    }

    async fn discard(&self, state: &mut StoreState) -> Result<()> {
        if let StoreState::Present(store) = &*state {
            store.invalidate().await;
        }
        *state = StoreState::Absent;
        VectorStore::reset(&self.persist_directory).await
    }
}

/// Extract text on the blocking pool; PDF parsing is CPU-bound and may panic.
async fn load_document(loader: Arc<dyn DocumentLoader>, file: UploadedFile) -> Result<Document> {
    let name = file.name.clone();
    tokio::task::spawn_blocking(move || loader.load(&file)).await.map_err(|e| {
        RagError::Extraction { file: name, message: format!("extractor aborted: {e}") }
    })?
}

/// Builder for constructing a [`RetrievalEngine`].
///
/// The embedding provider, generator and persistence directory are
/// required. The chunker defaults to a [`RecursiveChunker`] sized from the
/// config and the loaders to PDF and plain text.
#[derive(Default)]
pub struct RetrievalEngineBuilder {
    config: Option<RagConfig>,
    persist_directory: Option<PathBuf>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    generator: Option<Arc<dyn Generator>>,
    chunker: Option<Arc<dyn Chunker>>,
    loaders: Option<LoaderRegistry>,
    prompt_template: Option<String>,
}

impl RetrievalEngineBuilder {
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn persist_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.persist_directory = Some(path.into());
        self
    }

    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    pub fn loaders(mut self, loaders: LoaderRegistry) -> Self {
        self.loaders = Some(loaders);
        self
    }

    /// Override the prompt template. It must contain `{context}` and `{question}`.
    pub fn prompt_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = Some(template.into());
        self
    }

    /// Build the [`RetrievalEngine`]. Does not touch the disk.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a required field is missing or a
    /// custom template lacks a placeholder.
    pub fn build(self) -> Result<RetrievalEngine> {
        let config = self.config.unwrap_or_default();
        let persist_directory = self
            .persist_directory
            .ok_or_else(|| RagError::Config("persist_directory is required".to_string()))?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::Config("embedding_provider is required".to_string()))?;
        let generator =
            self.generator.ok_or_else(|| RagError::Config("generator is required".to_string()))?;
        let chunker = self.chunker.unwrap_or_else(|| {
            Arc::new(RecursiveChunker::new(config.chunk_size, config.chunk_overlap))
        });

        let mut prompt_builder = PromptBuilder::new(config.context_window);
        if let Some(template) = self.prompt_template {
            if !template.contains("{context}") || !template.contains("{question}") {
                return Err(RagError::Config(
                    "prompt template must contain {context} and {question}".to_string(),
                ));
            }
            prompt_builder = prompt_builder.with_template(template);
        }

        Ok(RetrievalEngine {
            config,
            persist_directory,
            embedding_provider,
            generator,
            chunker,
            loaders: self.loaders.unwrap_or_default(),
            prompt_builder,
            state: RwLock::new(StoreState::Unloaded),
        })
    }
}
