//! Session command - interactive prompt over one project.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{load_backend, print_writes, project_root, snippet};
use crate::indexer::{has_source_extension, is_ignored_path};
use crate::llm::NOT_CONFIGURED_MESSAGE;
use crate::llm::prompt::review_prompt;
use crate::session::{Session, SessionMessage};

const HELP: &str = "\
Commands:
  /index           rebuild the index in the background
  /search <query>  show the best matching chunks
  /agent <request> plan and carry out a request in the background
  /review <file>   review a file
  /open <file>     set the active file sent with chat questions
  /close           clear the active file
  /status          show index and task status
  /help            show this help
  /quit            exit
Anything else is sent as a chat question.";

#[derive(Args)]
pub struct SessionCmd {
    /// Project directory
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Re-index when project files change
    #[arg(long, short = 'w')]
    pub watch: bool,

    /// Quiet period after the last change before re-indexing, in seconds
    #[arg(long, default_value = "2")]
    pub debounce: u64,

    /// How long to wait for background work on exit, in seconds
    #[arg(long, default_value = "3")]
    pub grace: u64,
}

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Index,
    Search(String),
    Agent(String),
    Review(String),
    Open(String),
    Close,
    Status,
    Help,
    Quit,
    Chat(String),
    Empty,
    Unknown(String),
    MissingArgument(&'static str),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Chat(line.to_string());
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };

    let with_arg = |usage: &'static str, make: fn(String) -> Input| {
        if arg.is_empty() {
            Input::MissingArgument(usage)
        } else {
            make(arg.to_string())
        }
    };

    match name {
        "index" => Input::Index,
        "search" => with_arg("/search <query>", Input::Search),
        "agent" => with_arg("/agent <request>", Input::Agent),
        "review" => with_arg("/review <file>", Input::Review),
        "open" => with_arg("/open <file>", Input::Open),
        "close" => Input::Close,
        "status" => Input::Status,
        "help" | "?" => Input::Help,
        "quit" | "exit" | "q" => Input::Quit,
        other => Input::Unknown(other.to_string()),
    }
}

impl SessionCmd {
    pub async fn run(&self) -> Result<()> {
        let root = project_root(&self.path)?;
        let (config, client) = load_backend()?;
        let llm_ready = client.is_ready();

        let (mut session, mut channels) = Session::new(root.clone(), config, client);

        println!("Project: {}", root.display());
        if llm_ready {
            println!("Indexing in the background...");
            session.start_indexing();
        } else {
            println!("{}", NOT_CONFIGURED_MESSAGE);
        }
        println!("Type /help for commands.\n");

        let (watch_tx, mut watch_rx) = mpsc::channel::<PathBuf>(100);
        let _watcher = if self.watch {
            let watcher = start_watcher(&root, watch_tx)?;
            println!("Watching {} for changes.", root.display());
            Some(watcher)
        } else {
            None
        };
        let debounce = Duration::from_secs(self.debounce);
        let mut reindex_at: Option<Instant> = None;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        prompt();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if !self.handle(&mut session, parse_input(&line)).await {
                                break;
                            }
                            prompt();
                        }
                        Ok(None) => break,
                        Err(e) => {
                            eprintln!("Failed to read input: {}", e);
                            break;
                        }
                    }
                }
                Some(message) = channels.messages.recv() => {
                    match message {
                        SessionMessage::Progress(msg) if msg.starts_with("Embedding: ") => {}
                        SessionMessage::Progress(msg) => println!("\n[index] {}", msg),
                        SessionMessage::IndexFinished(status) => {
                            println!("\n[index] {}", status);
                            prompt();
                        }
                        SessionMessage::AgentFinished { succeeded, files } => {
                            let verdict = if succeeded { "finished" } else { "failed" };
                            println!("\n[agent] {} ({} files modified)", verdict, files.len());
                            if session.agent_finished(&files) {
                                println!("Re-indexing in the background...");
                            }
                            prompt();
                        }
                    }
                }
                Some(event) = channels.agent_events.recv() => {
                    println!("[agent] {}", event);
                }
                Some(path) = watch_rx.recv() => {
                    tracing::debug!(path = %path.display(), "project file changed");
                    reindex_at = Some(Instant::now() + debounce);
                }
                _ = tokio::time::sleep_until(reindex_at.unwrap_or_else(Instant::now)), if reindex_at.is_some() => {
                    reindex_at = None;
                    if llm_ready {
                        println!("\nFiles changed, re-indexing...");
                        session.start_indexing();
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    break;
                }
            }
        }

        let report = session.shutdown(Duration::from_secs(self.grace)).await;
        if report.aborted > 0 {
            println!("Stopped {} unfinished background task(s).", report.aborted);
        }
        println!("Bye.");
        Ok(())
    }

    /// Handle one input line. Returns `false` to end the session.
    async fn handle(&self, session: &mut Session, input: Input) -> bool {
        match input {
            Input::Empty => {}
            Input::Quit => return false,
            Input::Help => println!("{}", HELP),
            Input::MissingArgument(usage) => println!("Usage: {}", usage),
            Input::Unknown(name) => println!("Unknown command /{}. Type /help.", name),
            Input::Index => {
                if session.client().is_ready() {
                    session.start_indexing();
                    println!("Indexing in the background...");
                } else {
                    println!("{}", NOT_CONFIGURED_MESSAGE);
                }
            }
            Input::Search(query) => {
                if !session.index().is_indexed().await {
                    println!("Nothing indexed yet.");
                    return true;
                }
                let hits = session.index().search_scored(&query, session.top_k()).await;
                if hits.is_empty() {
                    println!("No results.");
                }
                for (i, hit) in hits.iter().enumerate() {
                    println!(
                        "{}. {} #{} (score: {:.3})",
                        i + 1,
                        hit.chunk.source_path,
                        hit.chunk.sequence_index,
                        hit.score
                    );
                    println!("   {}", snippet(&hit.chunk.body, 3));
                }
            }
            Input::Agent(request) => {
                if !session.client().is_ready() {
                    println!("{}", NOT_CONFIGURED_MESSAGE);
                } else if session.start_agent(&request) {
                    println!("Agent started.");
                } else {
                    println!("An agent run is already in progress.");
                }
            }
            Input::Review(file) => match review_file(session, &file).await {
                Ok(review) => println!("{}", review.trim_end()),
                Err(e) => println!("{:#}", e),
            },
            Input::Open(file) => match session.open(&file).await {
                Ok(name) => println!("Active file: {}", name),
                Err(e) => println!("{:#}", e),
            },
            Input::Close => {
                session.close_active();
                println!("Active file cleared.");
            }
            Input::Status => {
                let status = session.status().await;
                println!("Project:     {}", status.root.display());
                match (status.indexed_chunks, status.indexed_files, status.built_at) {
                    (Some(chunks), Some(files), Some(at)) => println!(
                        "Index:       {} chunks from {} files (built {})",
                        chunks,
                        files,
                        at.format("%H:%M:%S")
                    ),
                    _ => println!("Index:       not built"),
                }
                println!("Building:    {}", if status.building { "yes" } else { "no" });
                println!(
                    "Agent:       {}",
                    if status.agent_running { "running" } else { "idle" }
                );
                println!("Tasks:       {}", status.background_tasks);
                println!(
                    "Active file: {}",
                    status.active_file.as_deref().unwrap_or("(none)")
                );
                println!("LLM:         {}", if status.llm_ready { "ready" } else { "no API key" });
            }
            Input::Chat(question) => {
                println!("Thinking...");
                let turn = session.ask(&question).await;
                println!("\n{}", turn.reply.trim_end());
                if turn.files_changed() || !turn.written.failures.is_empty() {
                    println!();
                    print_writes(&turn.written);
                }
                if turn.files_changed() {
                    println!("Re-indexing in the background...");
                }
            }
        }
        true
    }
}

async fn review_file(session: &Session, file: &str) -> Result<String> {
    let path = session.root().join(file);
    let code = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(session.client().chat(&review_prompt(file, &code)).await)
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

/// Watch the project tree, forwarding changed source paths.
fn start_watcher(root: &Path, tx: mpsc::Sender<PathBuf>) -> Result<RecommendedWatcher> {
    let watch_root = root.to_path_buf();
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            let Ok(event) = res else { return };
            if matches!(event.kind, EventKind::Access(_)) {
                return;
            }
            for path in event.paths {
                if is_relevant_change(&watch_root, &path) {
                    let _ = tx.blocking_send(path);
                }
            }
        },
        Config::default().with_poll_interval(Duration::from_secs(2)),
    )
    .context("Failed to create file watcher")?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {}", root.display()))?;
    Ok(watcher)
}

/// Whether a changed path could affect the index.
fn is_relevant_change(root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    !is_ignored_path(relative) && has_source_extension(relative)
}
