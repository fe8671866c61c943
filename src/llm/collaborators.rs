//! Agent collaborators backed by [`GeminiClient`].

use std::sync::Arc;

use tracing::{debug, warn};

use super::client::GeminiClient;
use super::error::ProviderError;
use super::prompt;
use crate::agent::{Plan, PlanError, PlanGenerator, ReportGenerator, StepExecutor};

/// Asks the chat model for a JSON plan.
pub struct LlmPlanner {
    client: Arc<GeminiClient>,
    fallback_single_step: bool,
}

impl LlmPlanner {
    pub fn new(client: Arc<GeminiClient>) -> Self {
        Self {
            client,
            fallback_single_step: true,
        }
    }

    /// Whether an unparseable reply degrades to a one-step plan made of
    /// the request itself. On by default.
    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback_single_step = enabled;
        self
    }
}

impl PlanGenerator for LlmPlanner {
    async fn plan(&self, request: &str) -> Result<Plan, PlanError> {
        let reply = self.client.generate(&prompt::plan_prompt(request)).await?;
        debug!(reply_chars = reply.len(), "plan reply");
        plan_from_reply(&reply, request, self.fallback_single_step)
    }
}

fn plan_from_reply(reply: &str, request: &str, fallback: bool) -> Result<Plan, PlanError> {
    match Plan::parse(reply) {
        Err(PlanError::Malformed(reason)) if fallback => {
            warn!(%reason, "plan reply not parseable, using single-step plan");
            Ok(Plan::single_step(request))
        }
        other => other,
    }
}

/// Generates file blocks for one step.
pub struct LlmStepExecutor {
    client: Arc<GeminiClient>,
}

impl LlmStepExecutor {
    pub fn new(client: Arc<GeminiClient>) -> Self {
        Self { client }
    }
}

impl StepExecutor for LlmStepExecutor {
    async fn execute(
        &self,
        step: &str,
        request: &str,
        context: &[String],
    ) -> Result<String, ProviderError> {
        self.client
            .generate(&prompt::step_prompt(step, request, context))
            .await
    }
}

/// Writes the closing markdown report.
pub struct LlmReporter {
    client: Arc<GeminiClient>,
}

impl LlmReporter {
    pub fn new(client: Arc<GeminiClient>) -> Self {
        Self { client }
    }
}

impl ReportGenerator for LlmReporter {
    async fn report(
        &self,
        request: &str,
        steps: &[String],
        modified_files: &[String],
    ) -> Result<String, ProviderError> {
        self.client
            .generate(&prompt::report_prompt(request, steps, modified_files))
            .await
    }
}
