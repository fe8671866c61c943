//! CLI argument definitions.

use clap::{Parser, Subcommand};

use crate::commands::{
    AgentCmd, AskCmd, ConfigCmd, IndexCmd, ReviewCmd, SearchCmd, SessionCmd,
};

#[derive(Parser)]
#[command(name = "pilot")]
#[command(about = "Pilot - local RAG coding assistant with a plan/execute agent")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Index a project and show what was indexed
    Index(IndexCmd),

    /// Semantic search over a project
    Search(SearchCmd),

    /// Ask a question about a project (may write files)
    Ask(AskCmd),

    /// Plan and carry out a development request
    Agent(AgentCmd),

    /// Review a single file
    Review(ReviewCmd),

    /// Interactive session with background indexing
    Session(SessionCmd),

    /// Manage configuration (API key, models, etc.)
    Config(ConfigCmd),
}

impl Command {
    pub async fn execute(&self) -> anyhow::Result<()> {
        match self {
            Command::Index(cmd) => cmd.run().await,
            Command::Search(cmd) => cmd.run().await,
            Command::Ask(cmd) => cmd.run().await,
            Command::Agent(cmd) => cmd.run().await,
            Command::Review(cmd) => cmd.run().await,
            Command::Session(cmd) => cmd.run().await,
            Command::Config(cmd) => cmd.run().await,
        }
    }
}
