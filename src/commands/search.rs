//! Search command - semantic search over a freshly indexed project.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Args;

use super::{build_index, load_backend, project_root, require_key, snippet};
use crate::index::{IndexSettings, ProjectIndex};

#[derive(Args)]
pub struct SearchCmd {
    /// Project directory
    pub path: PathBuf,

    /// Natural language query
    pub query: String,

    /// Max results (default: from config)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Print whole chunks (not just snippets)
    #[arg(short = 'c', long)]
    pub code: bool,
}

impl SearchCmd {
    pub async fn run(&self) -> Result<()> {
        let root = project_root(&self.path)?;
        let (config, client) = load_backend()?;
        require_key(&client)?;

        let index = ProjectIndex::new(client, IndexSettings::from(&config));
        let status = build_index(&index, &root).await;
        if !status.is_ready() {
            bail!("{}", status);
        }

        let start = std::time::Instant::now();
        let top_k = self.top_k.unwrap_or(config.top_k);
        let hits = index.search_scored(&self.query, top_k).await;
        let elapsed = start.elapsed().as_millis();

        println!("Found {} results in {}ms\n", hits.len(), elapsed);

        for (i, hit) in hits.iter().enumerate() {
            println!(
                "{}. {} #{} (score: {:.3})",
                i + 1,
                hit.chunk.source_path,
                hit.chunk.sequence_index,
                hit.score
            );

            if self.code {
                println!("   ---");
                for line in hit.chunk.body.lines() {
                    println!("   {}", line);
                }
                println!("   ---");
            } else {
                println!("   {}", snippet(&hit.chunk.body, 3));
            }
            println!();
        }

        Ok(())
    }
}
