//! Agent command - plan, execute and report on a development request.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tokio::sync::mpsc;

use super::{build_index, load_backend, project_root, require_key};
use crate::agent::{AgentConfig, AgentEvent, AgentRun};
use crate::index::{IndexSettings, ProjectIndex};
use crate::llm::{LlmPlanner, LlmReporter, LlmStepExecutor};

#[derive(Args)]
pub struct AgentCmd {
    /// Project directory
    pub path: PathBuf,

    /// What to build or change
    pub request: String,

    /// Pause between steps in milliseconds (default: from config)
    #[arg(long)]
    pub pause_ms: Option<u64>,

    /// Fail instead of running a single-step plan when the plan reply is
    /// not valid JSON
    #[arg(long)]
    pub strict_plan: bool,
}

impl AgentCmd {
    pub async fn run(&self) -> Result<()> {
        let root = project_root(&self.path)?;
        let (config, client) = load_backend()?;
        require_key(&client)?;

        let index = ProjectIndex::new(Arc::clone(&client), IndexSettings::from(&config));
        let status = build_index(&index, &root).await;
        println!("{}", status);

        let mut agent_config = AgentConfig::from(&config);
        if let Some(ms) = self.pause_ms {
            agent_config.step_pause = Duration::from_millis(ms);
        }

        let planner = LlmPlanner::new(Arc::clone(&client)).with_fallback(!self.strict_plan);
        let executor = LlmStepExecutor::new(Arc::clone(&client));
        let reporter = LlmReporter::new(client);

        let (tx, mut rx) = mpsc::unbounded_channel::<AgentEvent>();
        let printer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    AgentEvent::Report(text) => println!("\n{}", text.trim_end()),
                    AgentEvent::PlanFailed { .. }
                    | AgentEvent::StepFailed { .. }
                    | AgentEvent::FileWriteFailed { .. } => eprintln!("{}", event),
                    other => println!("{}", other),
                }
            }
        });

        let outcome = AgentRun::new(&index, &planner, &executor, &reporter, &root, agent_config)
            .with_events(tx)
            .run(&self.request)
            .await;
        let _ = printer.await;
        tracing::info!(
            run_id = %outcome.run_id,
            files = outcome.files.len(),
            "agent run finished"
        );

        if !outcome.succeeded() {
            anyhow::bail!("Agent run failed during planning");
        }

        if !outcome.step_failures.is_empty() {
            eprintln!(
                "\n{} of {} steps had problems.",
                outcome.step_failures.len(),
                outcome.plan.as_ref().map(|p| p.len()).unwrap_or(0)
            );
        }

        Ok(())
    }
}
