use std::fmt;

use super::materialize::WriteStatus;

/// Where an agent run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Planning,
    Executing { step: usize, total: usize },
    Reporting,
    Done,
    Failed,
}

/// Progress of a run, streamed to whoever drives the agent.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Planned {
        project_name: String,
        steps: Vec<String>,
    },
    PlanFailed {
        reason: String,
    },
    StepStarted {
        step: usize,
        total: usize,
        description: String,
    },
    ContextRetrieved {
        step: usize,
        chunks: usize,
    },
    FileWritten {
        path: String,
        status: WriteStatus,
    },
    FileWriteFailed {
        path: String,
        reason: String,
    },
    StepFailed {
        step: usize,
        reason: String,
    },
    NoFileChanges {
        step: usize,
    },
    Report(String),
}

impl fmt::Display for AgentEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentEvent::Planned {
                project_name,
                steps,
            } => {
                writeln!(f, "Plan for {} ({} steps):", project_name, steps.len())?;
                for (i, step) in steps.iter().enumerate() {
                    if i + 1 == steps.len() {
                        write!(f, "  {}. {}", i + 1, step)?;
                    } else {
                        writeln!(f, "  {}. {}", i + 1, step)?;
                    }
                }
                Ok(())
            }
            AgentEvent::PlanFailed { reason } => write!(f, "Planning failed: {}", reason),
            AgentEvent::StepStarted {
                step,
                total,
                description,
            } => write!(f, "[{}/{}] {}", step, total, description),
            AgentEvent::ContextRetrieved { chunks, .. } => {
                write!(f, "  retrieved {} context chunks", chunks)
            }
            AgentEvent::FileWritten { path, status } => write!(f, "  {}: {}", status, path),
            AgentEvent::FileWriteFailed { path, reason } => {
                write!(f, "  failed to write {}: {}", path, reason)
            }
            AgentEvent::StepFailed { step, reason } => {
                write!(f, "  step {} failed: {}", step, reason)
            }
            AgentEvent::NoFileChanges { .. } => write!(f, "  no file changes"),
            AgentEvent::Report(text) => write!(f, "{}", text),
        }
    }
}
