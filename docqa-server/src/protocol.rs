//! Request and response bodies.

use docqa_rag::{IngestReport, QueryResult, Source};
use serde::{Deserialize, Serialize};

/// Answer used when no store exists yet.
pub const NO_ANSWER: &str = "No answer found.";

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    /// Signed so that non-positive values reach validation instead of
    /// failing deserialization.
    #[serde(default)]
    pub k: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<Source>,
    /// Set when the question could not be answered because nothing has
    /// been ingested yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResponse {
    pub fn no_store(message: String) -> Self {
        Self { answer: NO_ANSWER.to_string(), sources: Vec::new(), error: Some(message) }
    }
}

impl From<QueryResult> for QueryResponse {
    fn from(result: QueryResult) -> Self {
        Self { answer: result.answer, sources: result.sources, error: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub message: String,
    pub chunks_ingested: usize,
    pub files_ingested: usize,
    pub skipped_files: Vec<String>,
}

impl From<IngestReport> for IngestResponse {
    fn from(report: IngestReport) -> Self {
        Self {
            message: report.message(),
            chunks_ingested: report.chunks_ingested,
            files_ingested: report.files_ingested,
            skipped_files: report.skipped_files,
        }
    }
}
