//! Data types for documents, chunks, stored records and query results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Text extracted from one uploaded file. Exists only during ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Content-derived identifier for the document.
    pub id: String,
    /// The uploaded file name.
    pub name: String,
    /// The extracted text.
    pub text: String,
    /// Key-value metadata inherited by every chunk of this document.
    pub metadata: HashMap<String, String>,
}

/// A contiguous span of a [`Document`]'s text used as a retrieval unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier for the chunk, `{document_id}_{chunk_index}`.
    pub id: String,
    /// The text content of the chunk.
    pub content: String,
    /// Parent document metadata plus `chunk_index` and `start_index`.
    pub metadata: HashMap<String, String>,
    /// The ID of the parent [`Document`].
    pub document_id: String,
}

/// The persisted unit: a chunk together with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorRecord {
    /// The embedded chunk.
    pub chunk: Chunk,
    /// The embedding of `chunk.content`.
    pub embedding: Vec<f32>,
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk: Chunk,
    /// Cosine similarity to the query (higher is more relevant).
    pub score: f32,
}

/// Attribution for one chunk used to answer a question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    pub content: String,
    pub metadata: HashMap<String, String>,
}

impl From<SearchResult> for Source {
    fn from(result: SearchResult) -> Self {
        Source { content: result.chunk.content, metadata: result.chunk.metadata }
    }
}

/// A generated answer and the chunks it was grounded on, best match first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    pub answer: String,
    pub sources: Vec<Source>,
}

/// Outcome of an ingestion call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IngestReport {
    /// Number of chunks embedded and stored.
    pub chunks_ingested: usize,
    /// Number of files whose text was extracted and chunked.
    pub files_ingested: usize,
    /// Names of files skipped because their type is not supported.
    pub skipped_files: Vec<String>,
}

impl IngestReport {
    /// Human-readable summary returned to API callers.
    pub fn message(&self) -> String {
        let mut message =
            format!("Ingested {} chunks and saved to the vector store.", self.chunks_ingested);
        if !self.skipped_files.is_empty() {
            message.push_str(&format!(
                " Skipped {} unsupported file(s): {}.",
                self.skipped_files.len(),
                self.skipped_files.join(", ")
            ));
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_message_mentions_skipped_files() {
        let report = IngestReport {
            chunks_ingested: 3,
            files_ingested: 1,
            skipped_files: vec!["notes.docx".to_string()],
        };
        let message = report.message();
        assert!(message.starts_with("Ingested 3 chunks"));
        assert!(message.contains("notes.docx"));

        let clean = IngestReport { chunks_ingested: 0, ..Default::default() };
        assert_eq!(clean.message(), "Ingested 0 chunks and saved to the vector store.");
    }
}
