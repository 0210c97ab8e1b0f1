use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use docqa_rag::huggingface::{DEFAULT_API_BASE, DEFAULT_EMBEDDING_MODEL, DEFAULT_GENERATION_MODEL};
use docqa_rag::{LoaderRegistry, RagConfig};
use docqa_telemetry::LogFormat;

/// Server settings, read from flags or the environment (a `.env` file is
/// loaded first).
#[derive(Debug, Clone, Parser)]
#[command(name = "docqa-server", version, about = "Ask questions about uploaded PDF documents")]
pub struct ServerConfig {
    /// Directory holding the persisted vector store.
    #[arg(long, env = "PERSIST_DIRECTORY", default_value = "vector_db")]
    pub persist_directory: PathBuf,

    /// Sentence embedding model on the Hugging Face hub.
    #[arg(long, env = "EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    pub embedding_model: String,

    /// Text generation model on the Hugging Face hub.
    #[arg(long, env = "LLM_MODEL", default_value = DEFAULT_GENERATION_MODEL)]
    pub llm_model: String,

    /// Hub access token, sent as a bearer token.
    #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
    pub hf_token: Option<String>,

    #[arg(long, env = "HF_API_BASE", default_value = DEFAULT_API_BASE)]
    pub hf_api_base: String,

    /// Comma-separated extensions accepted for ingestion.
    #[arg(long, env = "ALLOWED_FILE_TYPES", value_delimiter = ',', default_value = ".pdf,.txt")]
    pub allowed_file_types: Vec<String>,

    #[arg(long, env = "COLLECTION_NAME", default_value = "my_docs")]
    pub collection_name: String,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// `pretty` or `json`.
    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,

    #[arg(long, env = "GENERATION_TIMEOUT_SECS", default_value_t = 60)]
    pub generation_timeout_secs: u64,

    /// Largest accepted request body, in bytes.
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = 50 * 1024 * 1024)]
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Engine settings derived from the server options.
    pub fn rag_config(&self) -> docqa_rag::Result<RagConfig> {
        RagConfig::builder()
            .collection_name(self.collection_name.clone())
            .generation_timeout(Duration::from_secs(self.generation_timeout_secs))
            .build()
    }

    pub fn loader_registry(&self) -> LoaderRegistry {
        LoaderRegistry::new(&self.allowed_file_types).with_builtin_loaders()
    }
}
