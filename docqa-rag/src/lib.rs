//! # docqa-rag
//!
//! Retrieval-augmented question answering over uploaded documents.
//!
//! Documents are split by a [`Chunker`], embedded by an
//! [`EmbeddingProvider`] and persisted in a [`VectorStore`]. Questions are
//! answered by the [`RetrievalEngine`], which retrieves the most similar
//! chunks, packs them into a grounded prompt and hands it to a
//! [`Generator`].
//!
//! ## Features
//!
//! - `huggingface`: [`huggingface::HuggingFaceEmbeddingProvider`] and
//!   [`huggingface::HuggingFaceGenerator`] backed by the Inference API

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod generator;
pub mod loader;
pub mod prompt;
pub mod vectorstore;

#[cfg(feature = "huggingface")]
pub mod huggingface;

pub use chunking::{Chunker, RecursiveChunker, TextSpan, split_text};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{
    Chunk, Document, IngestReport, QueryResult, SearchResult, Source, VectorRecord,
};
pub use embedding::EmbeddingProvider;
pub use engine::{RESET_MESSAGE, RetrievalEngine, RetrievalEngineBuilder};
pub use error::{RagError, Result, ValidationError};
pub use generator::Generator;
pub use loader::{DocumentLoader, LoaderRegistry, PdfLoader, TextLoader, UploadedFile};
pub use prompt::{DEFAULT_TEMPLATE, Prompt, PromptBuilder, estimate_tokens};
pub use vectorstore::{CollectionManifest, VectorStore};
