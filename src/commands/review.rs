//! Review command - ask the chat model to review one file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::{load_backend, require_key};
use crate::llm::prompt::review_prompt;

#[derive(Args)]
pub struct ReviewCmd {
    /// File to review
    pub file: PathBuf,
}

impl ReviewCmd {
    pub async fn run(&self) -> Result<()> {
        let code = tokio::fs::read_to_string(&self.file)
            .await
            .with_context(|| format!("Failed to read {}", self.file.display()))?;

        let (_, client) = load_backend()?;
        require_key(&client)?;

        let name = self
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file.display().to_string());

        println!("Reviewing {} with {}...\n", name, client.chat_model());
        let review = client.chat(&review_prompt(&name, &code)).await;
        println!("{}", review.trim_end());

        Ok(())
    }
}
