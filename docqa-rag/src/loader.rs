//! Text extraction for uploaded files.
//!
//! A [`LoaderRegistry`] decides which uploads are ingested: the file
//! extension must be on the allow-list and a [`DocumentLoader`] must exist
//! for it. Everything else is skipped, not rejected.

use std::collections::HashMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::document::Document;
use crate::error::{RagError, Result};

/// An uploaded file as received from the transport layer.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self { name: name.into(), bytes: bytes.into() }
    }

    /// Lowercased extension without the leading dot.
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

/// Extracts text from the raw bytes of one file type.
pub trait DocumentLoader: Send + Sync {
    /// Extensions this loader handles, lowercase and without a dot.
    fn extensions(&self) -> &[&'static str];

    /// Extract the text of `bytes`.
    fn extract(&self, file_name: &str, bytes: &[u8]) -> Result<String>;

    /// Build a [`Document`] from an upload.
    fn load(&self, file: &UploadedFile) -> Result<Document> {
        let text = self.extract(&file.name, &file.bytes)?;
        let id = document_id(&file.name, &file.bytes);

        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), file.name.clone());
        metadata.insert("document_id".to_string(), id.clone());
        if let Some(ext) = file.extension() {
            metadata.insert("file_type".to_string(), ext);
        }

        Ok(Document { id, name: file.name.clone(), text, metadata })
    }
}

/// Extracts the text layer of a PDF held in memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfLoader;

impl DocumentLoader for PdfLoader {
    fn extensions(&self) -> &[&'static str] {
        &["pdf"]
    }

    fn extract(&self, file_name: &str, bytes: &[u8]) -> Result<String> {
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| RagError::Extraction {
            file: file_name.to_string(),
            message: e.to_string(),
        })
    }
}

/// Decodes plain text files as UTF-8, replacing invalid sequences.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextLoader;

impl DocumentLoader for TextLoader {
    fn extensions(&self) -> &[&'static str] {
        &["txt"]
    }

    fn extract(&self, _file_name: &str, bytes: &[u8]) -> Result<String> {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Maps allowed file extensions to loaders.
#[derive(Clone)]
pub struct LoaderRegistry {
    allowed: Vec<String>,
    loaders: Vec<Arc<dyn DocumentLoader>>,
}

impl LoaderRegistry {
    /// Create a registry with the given allow-list and no loaders.
    ///
    /// Extensions are matched case-insensitively; a leading dot is optional.
    pub fn new<I, S>(allowed_extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = allowed_extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { allowed, loaders: Vec::new() }
    }

    /// Register a loader.
    pub fn with_loader(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        self.loaders.push(loader);
        self
    }

    /// Register the built-in [`PdfLoader`] and [`TextLoader`].
    pub fn with_builtin_loaders(self) -> Self {
        self.with_loader(Arc::new(PdfLoader)).with_loader(Arc::new(TextLoader))
    }

    /// The loader for `file`, if its type is allowed and supported.
    pub fn loader_for(&self, file: &UploadedFile) -> Option<Arc<dyn DocumentLoader>> {
        let ext = file.extension()?;
        if !self.allowed.iter().any(|allowed| *allowed == ext) {
            return None;
        }
        self.loaders.iter().find(|loader| loader.extensions().contains(&ext.as_str())).cloned()
    }

    pub fn allowed_extensions(&self) -> &[String] {
        &self.allowed
    }
}

impl Default for LoaderRegistry {
    /// PDF and plain text, both allowed.
    fn default() -> Self {
        Self::new([".pdf", ".txt"]).with_builtin_loaders()
    }
}

impl std::fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderRegistry")
            .field("allowed", &self.allowed)
            .field("loaders", &self.loaders.len())
            .finish()
    }
}

/// Short content hash identifying an upload.
fn document_id(name: &str, bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(bytes);
    let hash = format!("{:x}", hasher.finalize());
    hash.chars().take(12).collect()
}
