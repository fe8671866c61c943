//! LLM backend: embedding provider seam, Gemini REST client, prompts and
//! the agent collaborators built on top of them.

mod client;
mod collaborators;
mod error;
pub mod prompt;

pub use client::{GeminiClient, NOT_CONFIGURED_MESSAGE};
pub use collaborators::{LlmPlanner, LlmReporter, LlmStepExecutor};
pub use error::{ProviderError, ProviderErrorKind};

use std::future::Future;

/// Embedding task type. Providers may encode documents and queries with
/// different (asymmetric) encoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedMode {
    Document,
    Query,
}

impl EmbedMode {
    /// Gemini `taskType` value.
    pub fn task_type(&self) -> &'static str {
        match self {
            EmbedMode::Document => "RETRIEVAL_DOCUMENT",
            EmbedMode::Query => "RETRIEVAL_QUERY",
        }
    }
}

/// Converts text to a fixed-length vector.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(
        &self,
        text: &str,
        mode: EmbedMode,
    ) -> impl Future<Output = Result<Vec<f32>, ProviderError>> + Send;
}
