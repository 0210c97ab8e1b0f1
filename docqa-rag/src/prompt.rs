//! Grounded prompt assembly under a token budget.
//!
//! Context chunks are packed in retrieval order until the estimated prompt
//! size reaches the budget. Lower-ranked chunks are dropped first; when even
//! the best chunk does not fit, it is cut to the remaining space.

/// Instructs the model to answer from the supplied context only.
pub const DEFAULT_TEMPLATE: &str = concat!(
    "Answer the question using ONLY the provided context. ",
    "If the answer is not in the context, say 'I don't know.'\n\n",
    "Context:\n{context}\n\n",
    "Question: {question}\n",
    "Answer:"
);

const CHARS_PER_TOKEN: usize = 4;
const CONTEXT_SEPARATOR: &str = "\n\n";

/// Estimate the number of tokens in text.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// A prompt ready for the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub text: String,
    /// How many context chunks made it into the prompt, fully or cut.
    pub chunks_used: usize,
    /// Whether any context was dropped or cut to respect the budget.
    pub truncated: bool,
}

/// Fills a `{context}` / `{question}` template within a token budget.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    template: String,
    token_budget: usize,
}

impl PromptBuilder {
    /// Create a builder with [`DEFAULT_TEMPLATE`] and the given budget.
    pub fn new(token_budget: usize) -> Self {
        Self { template: DEFAULT_TEMPLATE.to_string(), token_budget }
    }

    /// Replace the template. It must contain `{context}` and `{question}`.
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// Build the prompt from `context` chunks ordered best match first.
    pub fn build(&self, question: &str, context: &[&str]) -> Prompt {
        let skeleton = self.render("", question);
        let available = self.token_budget.saturating_sub(estimate_tokens(&skeleton));

        let mut packed = String::new();
        let mut chunks_used = 0;
        let mut truncated = false;

        for chunk in context {
            let candidate = if packed.is_empty() {
                chunk.to_string()
            } else {
                format!("{packed}{CONTEXT_SEPARATOR}{chunk}")
            };

            if estimate_tokens(&candidate) <= available {
                packed = candidate;
                chunks_used += 1;
                continue;
            }

            truncated = true;
            if chunks_used == 0 {
                let cut: String = chunk.chars().take(available * CHARS_PER_TOKEN).collect();
                if !cut.is_empty() {
                    packed = cut;
                    chunks_used = 1;
                }
            }
            break;
        }

        Prompt { text: self.render(&packed, question), chunks_used, truncated }
    }

    /// Substitute placeholders in one pass over the template, so braces in
    /// the inserted text are never expanded.
    fn render(&self, context: &str, question: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();
        while let Some(pos) = rest.find('{') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if let Some(after) = tail.strip_prefix("{context}") {
                out.push_str(context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix("{question}") {
                out.push_str(question);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}
