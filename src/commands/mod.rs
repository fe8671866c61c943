//! CLI command implementations.

mod agent;
mod ask;
mod config;
mod index;
mod review;
mod search;
mod session;

pub use agent::AgentCmd;
pub use ask::AskCmd;
pub use config::ConfigCmd;
pub use index::IndexCmd;
pub use review::ReviewCmd;
pub use search::SearchCmd;
pub use session::SessionCmd;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};

use crate::agent::MaterializeOutcome;
use crate::config::PilotConfig;
use crate::index::{BuildStatus, ProjectIndex};
use crate::llm::{EmbeddingProvider, GeminiClient};

const NO_KEY_HINT: &str =
    "No API key configured. Run `pilot config set-key <key>` or export GEMINI_API_KEY.";

/// Canonical project root; must be an existing directory.
fn project_root(path: &Path) -> Result<PathBuf> {
    let root = path
        .canonicalize()
        .with_context(|| format!("Project path not found: {}", path.display()))?;
    if !root.is_dir() {
        bail!("Not a directory: {}", root.display());
    }
    Ok(root)
}

fn load_backend() -> Result<(PilotConfig, Arc<GeminiClient>)> {
    let config = PilotConfig::load()?;
    let client = GeminiClient::new(&config)?;
    Ok((config, Arc::new(client)))
}

fn require_key(client: &GeminiClient) -> Result<()> {
    if !client.is_ready() {
        bail!(NO_KEY_HINT);
    }
    Ok(())
}

/// Build the index, redrawing progress on one stderr line.
async fn build_index<E: EmbeddingProvider>(index: &ProjectIndex<E>, root: &Path) -> BuildStatus {
    let status = index
        .index_project(root, |msg| {
            eprint!("\r\x1b[2K{}", msg);
            let _ = std::io::stderr().flush();
        })
        .await;
    eprint!("\r\x1b[2K");
    status
}

/// Print what a reply wrote to disk.
fn print_writes(outcome: &MaterializeOutcome) {
    for record in &outcome.written {
        println!("  {}: {}", record.status, record.relative_path);
    }
    for failure in &outcome.failures {
        eprintln!("  Failed: {} ({})", failure.relative_path, failure.error);
    }
}

/// First `n` lines of a chunk body, indented.
fn snippet(body: &str, n: usize) -> String {
    body.lines()
        .filter(|l| !l.trim().is_empty())
        .take(n)
        .collect::<Vec<_>>()
        .join("\n   ")
}
