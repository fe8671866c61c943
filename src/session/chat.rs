use std::path::Path;

use tracing::{debug, info};

use crate::agent::{FileMaterializer, MaterializeOutcome, Retriever};
use crate::llm::GeminiClient;
use crate::llm::prompt::build_context_prompt;

/// One chat question and what to send along with it.
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub question: &'a str,
    /// `(name, content)` of the file the user has open.
    pub active_file: Option<(&'a str, &'a str)>,
    /// Files attached explicitly, `(name, content)`.
    pub attached: &'a [(String, String)],
    pub top_k: usize,
    /// Write file blocks found in the reply.
    pub write_files: bool,
}

#[derive(Debug)]
pub struct ChatTurn {
    pub reply: String,
    pub written: MaterializeOutcome,
}

impl ChatTurn {
    pub fn files_changed(&self) -> bool {
        self.written.files_changed()
    }
}

/// Retrieve context, ask the chat model, and materialize file blocks in
/// the reply under `root`.
///
/// Never fails: provider problems come back as the reply text.
pub async fn chat_turn<I: Retriever>(
    client: &GeminiClient,
    retriever: &I,
    root: &Path,
    request: ChatRequest<'_>,
) -> ChatTurn {
    let context = if client.is_ready() {
        retriever.retrieve(request.question, request.top_k).await
    } else {
        Vec::new()
    };
    debug!(chunks = context.len(), "chat context");

    let prompt = build_context_prompt(
        request.question,
        request.attached,
        request.active_file,
        &context,
    );
    let reply = client.chat(&prompt).await;

    let written = if request.write_files {
        FileMaterializer::new(root).apply(&reply).await
    } else {
        MaterializeOutcome::default()
    };

    if written.files_changed() {
        info!(files = written.written.len(), "chat reply wrote files");
    }

    ChatTurn { reply, written }
}
