//! Ask command - one RAG chat turn against a project.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use super::{build_index, load_backend, print_writes, project_root};
use crate::index::{IndexSettings, ProjectIndex};
use crate::session::{ChatRequest, chat_turn};

#[derive(Args)]
pub struct AskCmd {
    /// Project directory
    pub path: PathBuf,

    /// Question or instruction
    pub question: String,

    /// File the question is about (sent in full, edits target it)
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Extra files to attach to the prompt
    #[arg(short, long = "attach")]
    pub attach: Vec<PathBuf>,

    /// Print file blocks instead of writing them
    #[arg(long)]
    pub no_write: bool,
}

impl AskCmd {
    pub async fn run(&self) -> Result<()> {
        let root = project_root(&self.path)?;
        let (config, client) = load_backend()?;

        let index = ProjectIndex::new(client.clone(), IndexSettings::from(&config));
        if client.is_ready() {
            let status = build_index(&index, &root).await;
            tracing::info!(%status, "index ready for question");
        }

        let active = match &self.file {
            Some(path) => Some(read_named(&root, path).await?),
            None => None,
        };
        let mut attached = Vec::with_capacity(self.attach.len());
        for path in &self.attach {
            attached.push(read_named(&root, path).await?);
        }

        let turn = chat_turn(
            &client,
            &index,
            &root,
            ChatRequest {
                question: &self.question,
                active_file: active.as_ref().map(|(n, c)| (n.as_str(), c.as_str())),
                attached: &attached,
                top_k: config.top_k,
                write_files: !self.no_write,
            },
        )
        .await;

        println!("{}", turn.reply.trim_end());

        if turn.files_changed() || !turn.written.failures.is_empty() {
            println!();
            print_writes(&turn.written);
        }

        if turn.files_changed() {
            println!("\nRe-indexing...");
            let status = build_index(&index, &root).await;
            println!("{}", status);
        }

        Ok(())
    }
}

/// Read a file given relative to the project root (or absolute), and name
/// it relative to the root when possible.
async fn read_named(root: &Path, path: &Path) -> Result<(String, String)> {
    let full = root.join(path);
    let content = tokio::fs::read_to_string(&full)
        .await
        .with_context(|| format!("Failed to read {}", full.display()))?;
    let name = full
        .strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/");
    Ok((name, content))
}
