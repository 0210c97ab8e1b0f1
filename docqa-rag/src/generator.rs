//! Text generation trait.

use async_trait::async_trait;

use crate::error::Result;

/// A model that turns a prompt into generated text.
///
/// The engine wraps every call in a timeout; implementations do not need
/// their own.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate at most `max_new_tokens` tokens continuing `prompt`.
    async fn generate(&self, prompt: &str, max_new_tokens: usize) -> Result<String>;
}
