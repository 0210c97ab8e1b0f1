//! Configuration for ingestion and retrieval.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Tunable parameters for the [`RetrievalEngine`](crate::RetrievalEngine).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of characters shared by consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of chunks retrieved when the caller does not ask for a specific `k`.
    pub default_top_k: usize,
    /// Questions with more whitespace-separated words than this are rejected.
    pub max_question_words: usize,
    /// Upper bound on generated tokens.
    pub max_new_tokens: usize,
    /// Estimated token budget for the whole prompt (instruction, context and question).
    pub context_window: usize,
    /// How long a single generation call may take.
    #[serde(with = "duration_secs")]
    pub generation_timeout: Duration,
    /// Name recorded in the persisted collection manifest.
    pub collection_name: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 400,
            chunk_overlap: 50,
            default_top_k: 5,
            max_question_words: 50,
            max_new_tokens: 450,
            context_window: 512,
            generation_timeout: Duration::from_secs(60),
            collection_name: "my_docs".to_string(),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    pub fn default_top_k(mut self, k: usize) -> Self {
        self.config.default_top_k = k;
        self
    }

    pub fn max_question_words(mut self, words: usize) -> Self {
        self.config.max_question_words = words;
        self
    }

    pub fn max_new_tokens(mut self, tokens: usize) -> Self {
        self.config.max_new_tokens = tokens;
        self
    }

    pub fn context_window(mut self, tokens: usize) -> Self {
        self.config.context_window = tokens;
        self
    }

    pub fn generation_timeout(mut self, timeout: Duration) -> Self {
        self.config.generation_timeout = timeout;
        self
    }

    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        self.config.collection_name = name.into();
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `chunk_size == 0`
    /// - `chunk_overlap >= chunk_size`
    /// - `default_top_k == 0`
    /// - `max_question_words == 0`
    /// - `context_window == 0`
    pub fn build(self) -> Result<RagConfig> {
        let config = self.config;
        if config.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be greater than zero".to_string()));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }
        if config.default_top_k == 0 {
            return Err(RagError::Config("default_top_k must be greater than zero".to_string()));
        }
        if config.max_question_words == 0 {
            return Err(RagError::Config(
                "max_question_words must be greater than zero".to_string(),
            ));
        }
        if config.context_window == 0 {
            return Err(RagError::Config("context_window must be greater than zero".to_string()));
        }
        Ok(config)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
