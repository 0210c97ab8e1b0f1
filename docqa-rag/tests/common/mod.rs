//! Deterministic test doubles for the embedding and generation backends.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use docqa_rag::{
    EmbeddingProvider, Generator, RagConfig, RagError, RetrievalEngine, UploadedFile,
};

pub const DIM: usize = 64;

/// Hashes lowercase words into buckets and L2-normalises the counts, so
/// texts sharing words point in similar directions.
#[derive(Default)]
pub struct BagOfWordsEmbedder {
    calls: AtomicUsize,
}

impl BagOfWordsEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `embed`/`embed_batch` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut embedding = vec![0.0f32; DIM];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
    {
        let hash = word.bytes().fold(0xcbf29ce484222325u64, |acc, b| {
            (acc ^ b as u64).wrapping_mul(0x100000001b3)
        });
        embedding[(hash % DIM as u64) as usize] += 1.0;
    }
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        embedding.iter_mut().for_each(|x| *x /= norm);
    }
    embedding
}

#[async_trait]
impl EmbeddingProvider for BagOfWordsEmbedder {
    async fn embed(&self, text: &str) -> docqa_rag::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(bag_of_words(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> docqa_rag::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| bag_of_words(t)).collect())
    }

    fn model_id(&self) -> &str {
        "test/bag-of-words"
    }
}

/// Bag-of-words embeddings that take `delay` per batch.
pub struct SlowEmbedder {
    pub delay: Duration,
    inner: BagOfWordsEmbedder,
}

impl SlowEmbedder {
    pub fn new(delay: Duration) -> Self {
        Self { delay, inner: BagOfWordsEmbedder::new() }
    }
}

#[async_trait]
impl EmbeddingProvider for SlowEmbedder {
    async fn embed(&self, text: &str) -> docqa_rag::Result<Vec<f32>> {
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> docqa_rag::Result<Vec<Vec<f32>>> {
        tokio::time::sleep(self.delay).await;
        self.inner.embed_batch(texts).await
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

/// Returns preset vectors by exact text, zero vectors otherwise.
pub struct LookupEmbedder {
    pub vectors: HashMap<String, Vec<f32>>,
    pub dimensions: usize,
}

#[async_trait]
impl EmbeddingProvider for LookupEmbedder {
    async fn embed(&self, text: &str) -> docqa_rag::Result<Vec<f32>> {
        Ok(self.vectors.get(text).cloned().unwrap_or_else(|| vec![0.0; self.dimensions]))
    }

    fn model_id(&self) -> &str {
        "test/lookup"
    }
}

/// Always fails, as an unreachable backend would.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> docqa_rag::Result<Vec<f32>> {
        Err(RagError::Embedding {
            provider: "test/failing".to_string(),
            message: "backend unavailable".to_string(),
        })
    }

    fn model_id(&self) -> &str {
        "test/failing"
    }
}

/// Answers with a fixed string and records every prompt it receives.
pub struct CannedGenerator {
    answer: String,
    prompts: Mutex<Vec<String>>,
}

impl CannedGenerator {
    pub fn new(answer: impl Into<String>) -> Self {
        Self { answer: answer.into(), prompts: Mutex::new(Vec::new()) }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for CannedGenerator {
    async fn generate(&self, prompt: &str, _max_new_tokens: usize) -> docqa_rag::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.answer.clone())
    }
}

/// Sleeps before answering.
pub struct SlowGenerator(pub Duration);

#[async_trait]
impl Generator for SlowGenerator {
    async fn generate(&self, _prompt: &str, _max_new_tokens: usize) -> docqa_rag::Result<String> {
        tokio::time::sleep(self.0).await;
        Ok("too late".to_string())
    }
}

pub struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    async fn generate(&self, _prompt: &str, _max_new_tokens: usize) -> docqa_rag::Result<String> {
        Err(RagError::Generation {
            backend: "test/failing".to_string(),
            message: "model not loaded".to_string(),
        })
    }
}

pub fn engine_with(
    dir: &Path,
    config: RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn Generator>,
) -> RetrievalEngine {
    RetrievalEngine::builder()
        .config(config)
        .persist_directory(dir.join("vector_db"))
        .embedding_provider(embedder)
        .generator(generator)
        .build()
        .unwrap()
}

pub fn text_file(name: &str, text: &str) -> UploadedFile {
    UploadedFile::new(name, text.as_bytes().to_vec())
}

/// A one-page PDF showing `text` in Helvetica, with a valid xref table.
pub fn minimal_pdf(text: &str) -> Vec<u8> {
    let content = format!("BT /F1 24 Tf 72 720 Td ({text}) Tj ET");
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
         /Resources << /Font << /F1 5 0 R >> >> >>"
            .to_string(),
        format!("<< /Length {} >>\nstream\n{content}\nendstream", content.len()),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];

    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }

    let xref_offset = pdf.len();
    let mut tail = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        tail.push_str(&format!("{offset:010} 00000 n \n"));
    }
    tail.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%EOF\n",
        objects.len() + 1
    ));
    pdf.extend_from_slice(tail.as_bytes());
    pdf
}
