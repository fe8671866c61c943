//! Config command - manage local configuration.

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::config::{API_KEY_ENV, PilotConfig};

#[derive(Args)]
pub struct ConfigCmd {
    #[command(subcommand)]
    pub command: ConfigSubCmd,
}

#[derive(Subcommand)]
pub enum ConfigSubCmd {
    /// Set the Gemini API key
    SetKey(SetKeyCmd),

    /// Set the API base URL (default: https://generativelanguage.googleapis.com)
    SetUrl(SetUrlCmd),

    /// Set the chat model (default: gemini-2.5-pro)
    SetModel(SetModelCmd),

    /// Show current configuration
    Show,
}

#[derive(Args)]
pub struct SetKeyCmd {
    /// Gemini API key
    pub key: String,
}

#[derive(Args)]
pub struct SetUrlCmd {
    /// API base URL (e.g., http://localhost:8080 for a proxy)
    pub url: String,
}

#[derive(Args)]
pub struct SetModelCmd {
    /// Model name (e.g., gemini-2.5-flash, models/text-embedding-004)
    pub model: String,

    /// Set the embedding model instead of the chat model
    #[arg(long)]
    pub embedding: bool,
}

impl ConfigCmd {
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            ConfigSubCmd::SetKey(cmd) => {
                let mut config = PilotConfig::load()?;
                config.set_api_key(cmd.key.clone());
                config.save()?;
                println!("API key saved.");
            }
            ConfigSubCmd::SetUrl(cmd) => {
                let mut config = PilotConfig::load()?;
                config.base_url = cmd.url.trim().to_string();
                config.save()?;
                println!("Base URL set to: {}", config.base_url);
            }
            ConfigSubCmd::SetModel(cmd) => {
                let mut config = PilotConfig::load()?;
                let model = cmd.model.trim().to_string();
                if cmd.embedding {
                    config.embedding_model = model;
                    config.save()?;
                    println!("Embedding model set to: {}", config.embedding_model);
                } else {
                    config.chat_model = model;
                    config.save()?;
                    println!("Chat model set to: {}", config.chat_model);
                }
            }
            ConfigSubCmd::Show => {
                let config = PilotConfig::load()?;
                println!("Config: {}", PilotConfig::config_path()?.display());
                println!();
                println!("api_key:          {}", key_source(&config));
                println!("base_url:         {}", config.base_url);
                println!("chat_model:       {}", config.chat_model);
                println!("embedding_model:  {}", config.embedding_model);
                println!("chunk_size:       {}", config.chunk_size);
                println!("top_k:            {}", config.top_k);
                println!("step_pause_ms:    {}", config.step_pause_ms);
                println!(
                    "retry:            {} attempts, {}ms then {}ms",
                    config.retry.max_attempts,
                    config.retry.initial_delay_ms,
                    config.retry.retry_delay_ms
                );
            }
        }
        Ok(())
    }
}

fn key_source(config: &PilotConfig) -> String {
    let in_file = config
        .api_key
        .as_deref()
        .is_some_and(|k| !k.trim().is_empty());
    if in_file {
        "(set)".to_string()
    } else if config.has_api_key() {
        format!("(from {})", API_KEY_ENV)
    } else {
        "(not set)".to_string()
    }
}
