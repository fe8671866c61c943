//! Index command - build the project index and report what it holds.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Args;

use super::{build_index, load_backend, project_root, require_key};
use crate::index::{BuildStatus, IndexSettings, ProjectIndex};

#[derive(Args)]
pub struct IndexCmd {
    /// Project directory
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Characters per chunk (default: from config)
    #[arg(long)]
    pub chunk_size: Option<usize>,
}

impl IndexCmd {
    pub async fn run(&self) -> Result<()> {
        let root = project_root(&self.path)?;
        let (config, client) = load_backend()?;
        require_key(&client)?;

        let mut settings = IndexSettings::from(&config);
        if let Some(size) = self.chunk_size {
            settings.chunk_size = size.max(1);
        }

        println!("Indexing {}...", root.display());
        let start = Instant::now();
        let index = ProjectIndex::new(client, settings);
        let status = build_index(&index, &root).await;

        println!("{}", status);

        if let BuildStatus::Indexed { files, total, .. } = status {
            if let Some(snapshot) = index.snapshot().await {
                println!();
                println!("Files:       {}", files);
                println!("Chunks:      {} of {}", snapshot.len(), total);
                println!("Chunk size:  {} chars", settings.chunk_size);
                println!("Took:        {:.1}s", start.elapsed().as_secs_f64());
            }
        }

        Ok(())
    }
}
