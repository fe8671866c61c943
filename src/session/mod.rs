//! Interactive session state.
//!
//! A session owns one project root, its index, and the background tasks
//! working on it. Index builds and agent runs are spawned so the prompt
//! stays responsive; their progress comes back over channels.

mod chat;
mod tasks;

pub use chat::{ChatRequest, ChatTurn, chat_turn};
pub use tasks::{BackgroundTasks, ShutdownReport};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{info, warn};

use crate::agent::{AgentConfig, AgentEvent, AgentRun};
use crate::config::PilotConfig;
use crate::index::{BuildStatus, IndexSettings, ProjectIndex};
use crate::llm::{GeminiClient, LlmPlanner, LlmReporter, LlmStepExecutor};

/// Background progress delivered to the prompt loop.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionMessage {
    Progress(String),
    IndexFinished(BuildStatus),
    AgentFinished { succeeded: bool, files: Vec<String> },
}

/// Clears the agent-running flag when dropped, including when the agent
/// task panics or is aborted.
struct RunningFlag(Arc<AtomicBool>);

impl Drop for RunningFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Receiving ends of a session's channels.
pub struct SessionChannels {
    pub messages: UnboundedReceiver<SessionMessage>,
    pub agent_events: UnboundedReceiver<AgentEvent>,
}

#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub root: PathBuf,
    pub indexed_chunks: Option<usize>,
    pub indexed_files: Option<usize>,
    pub built_at: Option<DateTime<Utc>>,
    pub building: bool,
    pub agent_running: bool,
    pub background_tasks: usize,
    pub active_file: Option<String>,
    pub llm_ready: bool,
}

pub struct Session {
    root: PathBuf,
    config: PilotConfig,
    client: Arc<GeminiClient>,
    index: Arc<ProjectIndex<GeminiClient>>,
    tasks: BackgroundTasks,
    messages: UnboundedSender<SessionMessage>,
    agent_events: UnboundedSender<AgentEvent>,
    agent_running: Arc<AtomicBool>,
    active_file: Option<(String, String)>,
}

impl Session {
    pub fn new(
        root: impl Into<PathBuf>,
        config: PilotConfig,
        client: Arc<GeminiClient>,
    ) -> (Self, SessionChannels) {
        let (messages, messages_rx) = mpsc::unbounded_channel();
        let (agent_events, agent_events_rx) = mpsc::unbounded_channel();
        let index = Arc::new(ProjectIndex::new(
            Arc::clone(&client),
            IndexSettings::from(&config),
        ));

        let session = Self {
            root: root.into(),
            config,
            client,
            index,
            tasks: BackgroundTasks::new(),
            messages,
            agent_events,
            agent_running: Arc::new(AtomicBool::new(false)),
            active_file: None,
        };
        let channels = SessionChannels {
            messages: messages_rx,
            agent_events: agent_events_rx,
        };
        (session, channels)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn client(&self) -> &GeminiClient {
        &self.client
    }

    pub fn index(&self) -> &ProjectIndex<GeminiClient> {
        &self.index
    }

    /// Chunks retrieved per query.
    pub fn top_k(&self) -> usize {
        self.config.top_k
    }

    /// Start a full rebuild in the background. A rebuild requested while
    /// another is running supersedes it.
    pub fn start_indexing(&mut self) {
        self.tasks.reap();

        let index = Arc::clone(&self.index);
        let root = self.root.clone();
        let tx = self.messages.clone();

        self.tasks.spawn("index", async move {
            let progress_tx = tx.clone();
            let status = index
                .index_project(&root, move |msg| {
                    let _ = progress_tx.send(SessionMessage::Progress(msg.to_string()));
                })
                .await;
            let _ = tx.send(SessionMessage::IndexFinished(status));
        });
    }

    /// Chat about the project. File blocks in the reply are written and a
    /// rebuild is scheduled when anything changed.
    pub async fn ask(&mut self, question: &str) -> ChatTurn {
        let active = self
            .active_file
            .as_ref()
            .map(|(name, content)| (name.as_str(), content.as_str()));

        let turn = chat_turn(
            &self.client,
            self.index.as_ref(),
            &self.root,
            ChatRequest {
                question,
                active_file: active,
                attached: &[],
                top_k: self.config.top_k,
                write_files: true,
            },
        )
        .await;

        if turn.files_changed() {
            self.start_indexing();
        }
        turn
    }

    /// Start an agent run in the background. Returns `false` if one is
    /// already running.
    pub fn start_agent(&mut self, request: &str) -> bool {
        if self
            .agent_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.tasks.reap();

        let client = Arc::clone(&self.client);
        let index = Arc::clone(&self.index);
        let root = self.root.clone();
        let request = request.to_string();
        let events = self.agent_events.clone();
        let messages = self.messages.clone();
        let running = RunningFlag(Arc::clone(&self.agent_running));
        let agent_config = AgentConfig::from(&self.config);

        self.tasks.spawn("agent", async move {
            let planner = LlmPlanner::new(Arc::clone(&client));
            let executor = LlmStepExecutor::new(Arc::clone(&client));
            let reporter = LlmReporter::new(client);

            let outcome = AgentRun::new(
                index.as_ref(),
                &planner,
                &executor,
                &reporter,
                root,
                agent_config,
            )
            .with_events(events)
            .run(&request)
            .await;

            let files = outcome.modified_files();
            drop(running);
            let _ = messages.send(SessionMessage::AgentFinished {
                succeeded: outcome.succeeded(),
                files,
            });
        });
        true
    }

    /// Schedule a rebuild after an agent run that modified files. Returns
    /// whether one was started.
    pub fn agent_finished(&mut self, files: &[String]) -> bool {
        if files.is_empty() {
            return false;
        }
        self.start_indexing();
        true
    }

    pub fn agent_running(&self) -> bool {
        self.agent_running.load(Ordering::SeqCst)
    }

    /// Make `path` (relative to the root, or absolute) the active file
    /// sent along with chat questions.
    pub async fn open(&mut self, path: &str) -> Result<String> {
        let full = self.root.join(path);
        let content = tokio::fs::read_to_string(&full)
            .await
            .with_context(|| format!("Failed to read {}", full.display()))?;

        let name = full
            .strip_prefix(&self.root)
            .ok()
            .or_else(|| full.file_name().map(Path::new))
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_else(|| path.to_string());

        info!(file = %name, chars = content.len(), "active file set");
        self.active_file = Some((name.clone(), content));
        Ok(name)
    }

    pub fn close_active(&mut self) {
        self.active_file = None;
    }

    pub async fn status(&mut self) -> SessionStatus {
        self.tasks.reap();
        let snapshot = self.index.snapshot().await;

        SessionStatus {
            root: self.root.clone(),
            indexed_chunks: snapshot.as_ref().map(|s| s.len()),
            indexed_files: snapshot.as_ref().map(|s| s.files()),
            built_at: snapshot.as_ref().map(|s| s.built_at()),
            building: self.index.is_building(),
            agent_running: self.agent_running(),
            background_tasks: self.tasks.live(),
            active_file: self.active_file.as_ref().map(|(name, _)| name.clone()),
            llm_ready: self.client.is_ready(),
        }
    }

    /// Wait briefly for background work, then abort what is left.
    pub async fn shutdown(self, grace: Duration) -> ShutdownReport {
        let report = self.tasks.shutdown(grace).await;
        if report.aborted > 0 {
            warn!(aborted = report.aborted, "aborted background tasks on exit");
        }
        report
    }
}
