use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use super::events::{AgentEvent, AgentState};
use super::materialize::{FileMaterializer, FileWriteRecord};
use super::plan::{Plan, PlanError};
use super::{PlanGenerator, ReportGenerator, Retriever, StepExecutor};
use crate::config::PilotConfig;

#[derive(Debug, Clone, Copy)]
pub struct AgentConfig {
    /// Context chunks retrieved per step.
    pub top_k: usize,
    /// Pause between consecutive steps.
    pub step_pause: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            step_pause: Duration::from_secs(1),
        }
    }
}

impl From<&PilotConfig> for AgentConfig {
    fn from(config: &PilotConfig) -> Self {
        Self {
            top_k: config.top_k,
            step_pause: Duration::from_millis(config.step_pause_ms),
        }
    }
}

/// A step that did not complete cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    /// 1-based step number.
    pub step: usize,
    pub reason: String,
}

/// Result of one agent run.
#[derive(Debug)]
pub struct AgentOutcome {
    pub run_id: Uuid,
    pub state: AgentState,
    pub plan: Option<Plan>,
    /// Every write, in order; a path written twice appears twice.
    pub files: Vec<FileWriteRecord>,
    pub step_failures: Vec<StepFailure>,
    pub report: Option<String>,
}

impl AgentOutcome {
    /// Distinct modified paths, in first-write order.
    pub fn modified_files(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for record in &self.files {
            if !seen.contains(&record.relative_path) {
                seen.push(record.relative_path.clone());
            }
        }
        seen
    }

    pub fn succeeded(&self) -> bool {
        self.state == AgentState::Done
    }
}

/// One execution of the agent loop.
///
/// Consumed by [`AgentRun::run`]; a finished run cannot be restarted.
pub struct AgentRun<'a, I, P, X, R> {
    retriever: &'a I,
    planner: &'a P,
    executor: &'a X,
    reporter: &'a R,
    materializer: FileMaterializer,
    config: AgentConfig,
    events: Option<UnboundedSender<AgentEvent>>,
    run_id: Uuid,
    state: AgentState,
}

impl<'a, I, P, X, R> AgentRun<'a, I, P, X, R>
where
    I: Retriever,
    P: PlanGenerator,
    X: StepExecutor,
    R: ReportGenerator,
{
    pub fn new(
        retriever: &'a I,
        planner: &'a P,
        executor: &'a X,
        reporter: &'a R,
        root: impl Into<PathBuf>,
        config: AgentConfig,
    ) -> Self {
        Self {
            retriever,
            planner,
            executor,
            reporter,
            materializer: FileMaterializer::new(root),
            config,
            events: None,
            run_id: Uuid::new_v4(),
            state: AgentState::Planning,
        }
    }

    /// Stream events to `tx` while running.
    pub fn with_events(mut self, tx: UnboundedSender<AgentEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub async fn run(self, request: &str) -> AgentOutcome {
        let span = info_span!("agent", run_id = %self.run_id);
        self.run_inner(request).instrument(span).await
    }

    async fn run_inner(mut self, request: &str) -> AgentOutcome {
        let mut outcome = AgentOutcome {
            run_id: self.run_id,
            state: AgentState::Planning,
            plan: None,
            files: Vec::new(),
            step_failures: Vec::new(),
            report: None,
        };

        info!(request_chars = request.len(), "planning");
        let plan = match self.planner.plan(request).await {
            Ok(plan) if !plan.is_empty() => plan,
            Ok(_) => return self.fail_planning(outcome, PlanError::NoSteps),
            Err(e) => return self.fail_planning(outcome, e),
        };

        self.emit(AgentEvent::Planned {
            project_name: plan.project_name.clone(),
            steps: plan.steps.clone(),
        });

        let total = plan.len();
        for (i, step) in plan.steps.iter().enumerate() {
            let number = i + 1;
            self.transition(AgentState::Executing {
                step: number,
                total,
            });
            self.emit(AgentEvent::StepStarted {
                step: number,
                total,
                description: step.clone(),
            });

            self.execute_step(number, step, request, &mut outcome).await;

            if number < total && !self.config.step_pause.is_zero() {
                tokio::time::sleep(self.config.step_pause).await;
            }
        }

        self.transition(AgentState::Reporting);
        outcome.plan = Some(plan);
        let modified = outcome.modified_files();
        let steps = outcome
            .plan
            .as_ref()
            .map(|p| p.steps.as_slice())
            .unwrap_or_default();

        let report = match self.reporter.report(request, steps, &modified).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "report generation failed, using local summary");
                render_summary(request, &outcome)
            }
        };

        self.emit(AgentEvent::Report(report.clone()));
        outcome.report = Some(report);
        self.transition(AgentState::Done);
        outcome.state = self.state;

        info!(
            files = modified.len(),
            failed_steps = outcome.step_failures.len(),
            "agent run finished"
        );
        outcome
    }

    async fn execute_step(
        &self,
        number: usize,
        step: &str,
        request: &str,
        outcome: &mut AgentOutcome,
    ) {
        let context = self.retriever.retrieve(step, self.config.top_k).await;
        debug!(step = number, chunks = context.len(), "retrieved context");
        self.emit(AgentEvent::ContextRetrieved {
            step: number,
            chunks: context.len(),
        });

        let text = match self.executor.execute(step, request, &context).await {
            Ok(text) => text,
            Err(e) => {
                warn!(step = number, error = %e, "step failed");
                let reason = e.to_string();
                self.emit(AgentEvent::StepFailed {
                    step: number,
                    reason: reason.clone(),
                });
                outcome.step_failures.push(StepFailure {
                    step: number,
                    reason,
                });
                return;
            }
        };

        let written = self.materializer.apply(&text).await;

        for failure in written.failures {
            let reason = failure.error.to_string();
            self.emit(AgentEvent::FileWriteFailed {
                path: failure.relative_path.clone(),
                reason: reason.clone(),
            });
            outcome.step_failures.push(StepFailure {
                step: number,
                reason: format!("{}: {}", failure.relative_path, reason),
            });
        }

        if written.written.is_empty() {
            self.emit(AgentEvent::NoFileChanges { step: number });
        }

        for record in written.written {
            info!(step = number, path = %record.relative_path, status = %record.status, "file written");
            self.emit(AgentEvent::FileWritten {
                path: record.relative_path.clone(),
                status: record.status,
            });
            outcome.files.push(record);
        }
    }

    fn fail_planning(mut self, mut outcome: AgentOutcome, error: PlanError) -> AgentOutcome {
        warn!(error = %error, "planning failed");
        self.emit(AgentEvent::PlanFailed {
            reason: error.to_string(),
        });
        self.transition(AgentState::Failed);
        outcome.state = self.state;
        outcome
    }

    fn transition(&mut self, next: AgentState) {
        debug!(from = ?self.state, to = ?next, "agent state");
        self.state = next;
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.events {
            // The receiver may have gone away; the run continues regardless.
            let _ = tx.send(event);
        }
    }
}

/// Plain summary used when the report generator is unavailable.
pub(crate) fn render_summary(request: &str, outcome: &AgentOutcome) -> String {
    let mut out = String::new();
    out.push_str("## Summary\n\n");
    out.push_str(&format!("Request: {}\n\n", request.trim()));

    if let Some(plan) = &outcome.plan {
        out.push_str("### Steps\n");
        for (i, step) in plan.steps.iter().enumerate() {
            let failed = outcome.step_failures.iter().any(|f| f.step == i + 1);
            let mark = if failed { "failed" } else { "done" };
            out.push_str(&format!("{}. {} ({})\n", i + 1, step, mark));
        }
        out.push('\n');
    }

    let modified = outcome.modified_files();
    if modified.is_empty() {
        out.push_str("No files were modified.\n");
    } else {
        out.push_str("### Modified files\n");
        for path in modified {
            out.push_str(&format!("- {}\n", path));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::materialize::WriteStatus;
    use crate::llm::ProviderError;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    struct ScriptedPlanner(Result<Plan, &'static str>);

    impl PlanGenerator for ScriptedPlanner {
        async fn plan(&self, _request: &str) -> Result<Plan, PlanError> {
            match &self.0 {
                Ok(plan) => Ok(plan.clone()),
                Err(msg) => Err(PlanError::Malformed(msg.to_string())),
            }
        }
    }

    /// Writes `step_N.txt` for step N, failing the steps listed in `fail`.
    struct ScriptedExecutor {
        fail: Vec<String>,
        calls: Mutex<Vec<(String, usize)>>,
    }

    impl ScriptedExecutor {
        fn new(fail: &[&str]) -> Self {
            Self {
                fail: fail.iter().map(|s| s.to_string()).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
        }
    }

    impl StepExecutor for ScriptedExecutor {
        async fn execute(
            &self,
            step: &str,
            _request: &str,
            context: &[String],
        ) -> Result<String, ProviderError> {
            self.calls
                .lock()
                .unwrap()
                .push((step.to_string(), context.len()));
            if self.fail.iter().any(|f| f == step) {
                return Err(ProviderError::from_status(500, "overloaded", None));
            }
            if step == "explain" {
                return Ok("Nothing to write for this one.".to_string());
            }
            Ok(format!("### FILE: {step}.txt\ncontent of {step}\n### END_FILE"))
        }
    }

    struct ScriptedReporter {
        fail: bool,
    }

    impl ReportGenerator for ScriptedReporter {
        async fn report(
            &self,
            _request: &str,
            steps: &[String],
            modified_files: &[String],
        ) -> Result<String, ProviderError> {
            if self.fail {
                return Err(ProviderError::IoFailure("offline".to_string()));
            }
            Ok(format!(
                "{} steps, files: {}",
                steps.len(),
                modified_files.join(",")
            ))
        }
    }

    struct FixedRetriever(usize);

    impl Retriever for FixedRetriever {
        async fn retrieve(&self, _query: &str, top_k: usize) -> Vec<String> {
            vec!["File: x\nCode:\n".to_string(); self.0.min(top_k)]
        }
    }

    fn plan(steps: &[&str]) -> Plan {
        Plan {
            project_name: "demo".to_string(),
            steps: steps.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn config() -> AgentConfig {
        AgentConfig {
            top_k: 4,
            step_pause: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_zero_step_plan_fails_without_executing() {
        let tmp = TempDir::new().unwrap();
        let planner = ScriptedPlanner(Ok(plan(&[])));
        let executor = ScriptedExecutor::new(&[]);
        let reporter = ScriptedReporter { fail: false };
        let retriever = FixedRetriever(2);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = AgentRun::new(&retriever, &planner, &executor, &reporter, tmp.path(), config())
            .with_events(tx)
            .run("build it")
            .await;

        assert_eq!(outcome.state, AgentState::Failed);
        assert!(outcome.report.is_none());
        assert!(executor.calls().is_empty());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
        assert!(matches!(rx.recv().await, Some(AgentEvent::PlanFailed { .. })));
    }

    #[tokio::test]
    async fn test_planner_error_fails() {
        let tmp = TempDir::new().unwrap();
        let planner = ScriptedPlanner(Err("garbage"));
        let executor = ScriptedExecutor::new(&[]);
        let reporter = ScriptedReporter { fail: false };
        let retriever = FixedRetriever(0);

        let outcome = AgentRun::new(&retriever, &planner, &executor, &reporter, tmp.path(), config())
            .run("build it")
            .await;

        assert!(!outcome.succeeded());
        assert!(outcome.plan.is_none());
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_step_does_not_stop_later_steps() {
        let tmp = TempDir::new().unwrap();
        let planner = ScriptedPlanner(Ok(plan(&["one", "two", "three", "four"])));
        let executor = ScriptedExecutor::new(&["two"]);
        let reporter = ScriptedReporter { fail: false };
        let retriever = FixedRetriever(3);

        let outcome = AgentRun::new(&retriever, &planner, &executor, &reporter, tmp.path(), config())
            .run("build it")
            .await;

        assert_eq!(outcome.state, AgentState::Done);
        assert_eq!(executor.calls(), vec!["one", "two", "three", "four"]);
        assert_eq!(
            outcome.step_failures,
            vec![StepFailure {
                step: 2,
                reason: "server error (HTTP 500): overloaded".to_string(),
            }]
        );
        assert_eq!(
            outcome.modified_files(),
            vec!["one.txt", "three.txt", "four.txt"]
        );
        assert_eq!(
            outcome.report.as_deref(),
            Some("4 steps, files: one.txt,three.txt,four.txt")
        );
        assert!(tmp.path().join("four.txt").exists());
        assert!(!tmp.path().join("two.txt").exists());
    }

    #[tokio::test]
    async fn test_context_is_passed_to_executor() {
        let tmp = TempDir::new().unwrap();
        let planner = ScriptedPlanner(Ok(plan(&["one"])));
        let executor = ScriptedExecutor::new(&[]);
        let reporter = ScriptedReporter { fail: false };
        let retriever = FixedRetriever(10);

        AgentRun::new(&retriever, &planner, &executor, &reporter, tmp.path(), config())
            .run("req")
            .await;

        assert_eq!(executor.calls.lock().unwrap()[0].1, 4);
    }

    #[tokio::test]
    async fn test_report_falls_back_to_local_summary() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("one.txt"), "old").unwrap();
        let planner = ScriptedPlanner(Ok(plan(&["one", "explain"])));
        let executor = ScriptedExecutor::new(&[]);
        let reporter = ScriptedReporter { fail: true };
        let retriever = FixedRetriever(0);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = AgentRun::new(&retriever, &planner, &executor, &reporter, tmp.path(), config())
            .with_events(tx)
            .run("tidy up")
            .await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.files[0].status, WriteStatus::Updated);
        let report = outcome.report.unwrap();
        assert!(report.contains("Request: tidy up"));
        assert!(report.contains("- one.txt"));

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(events.contains(&AgentEvent::NoFileChanges { step: 2 }));
        assert!(matches!(events.last(), Some(AgentEvent::Report(_))));
    }

    #[tokio::test]
    async fn test_event_order_for_one_step() {
        let tmp = TempDir::new().unwrap();
        let planner = ScriptedPlanner(Ok(plan(&["one"])));
        let executor = ScriptedExecutor::new(&[]);
        let reporter = ScriptedReporter { fail: false };
        let retriever = FixedRetriever(1);
        let (tx, mut rx) = mpsc::unbounded_channel();

        AgentRun::new(&retriever, &planner, &executor, &reporter, tmp.path(), config())
            .with_events(tx)
            .run("req")
            .await;

        let mut kinds = Vec::new();
        while let Some(event) = rx.recv().await {
            kinds.push(match event {
                AgentEvent::Planned { .. } => "planned",
                AgentEvent::StepStarted { .. } => "step",
                AgentEvent::ContextRetrieved { .. } => "context",
                AgentEvent::FileWritten { .. } => "file",
                AgentEvent::Report(_) => "report",
                _ => "other",
            });
        }
        assert_eq!(kinds, vec!["planned", "step", "context", "file", "report"]);
    }
}
