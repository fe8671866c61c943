//! Plan → execute → report agent loop.
//!
//! The loop is generic over its collaborators so it can run against the
//! Gemini-backed adapters in `crate::llm` or against scripted stubs.

mod events;
mod materialize;
mod plan;
mod runner;

pub use events::AgentEvent;
pub use materialize::{FileMaterializer, MaterializeOutcome};
pub use plan::{Plan, PlanError};
pub use runner::{AgentConfig, AgentRun};

use std::future::Future;

use crate::llm::ProviderError;

/// Turns a request into an ordered plan.
pub trait PlanGenerator: Send + Sync {
    fn plan(&self, request: &str) -> impl Future<Output = Result<Plan, PlanError>> + Send;
}

/// Produces generation text (with file blocks) for one step.
pub trait StepExecutor: Send + Sync {
    fn execute(
        &self,
        step: &str,
        request: &str,
        context: &[String],
    ) -> impl Future<Output = Result<String, ProviderError>> + Send;
}

/// Summarizes a finished run.
pub trait ReportGenerator: Send + Sync {
    fn report(
        &self,
        request: &str,
        steps: &[String],
        modified_files: &[String],
    ) -> impl Future<Output = Result<String, ProviderError>> + Send;
}

/// Best-effort context lookup; never fails, may return nothing.
pub trait Retriever: Send + Sync {
    fn retrieve(&self, query: &str, top_k: usize) -> impl Future<Output = Vec<String>> + Send;
}
