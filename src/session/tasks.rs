use std::future::Future;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{Instrument, debug, info_span, warn};

/// Tracks live background work (index builds, agent runs) so shutdown can
/// wait for it or abort it.
#[derive(Default)]
pub struct BackgroundTasks {
    set: JoinSet<()>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub completed: usize,
    pub aborted: usize,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        debug!(task = name, "spawning background task");
        self.set.spawn(task.instrument(info_span!("task", name)));
    }

    /// Collect tasks that already finished. Returns how many were reaped.
    pub fn reap(&mut self) -> usize {
        let mut reaped = 0;
        while let Some(result) = self.set.try_join_next() {
            if let Err(e) = result {
                warn!(error = %e, "background task did not complete");
            }
            reaped += 1;
        }
        reaped
    }

    pub fn live(&self) -> usize {
        self.set.len()
    }

    /// Wait up to `grace` for live tasks, then abort the rest.
    pub async fn shutdown(mut self, grace: Duration) -> ShutdownReport {
        let deadline = Instant::now() + grace;
        let mut report = ShutdownReport::default();

        loop {
            match tokio::time::timeout_at(deadline, self.set.join_next()).await {
                Ok(Some(result)) => {
                    if let Err(e) = result {
                        warn!(error = %e, "background task did not complete");
                    }
                    report.completed += 1;
                }
                Ok(None) => break,
                Err(_) => {
                    report.aborted = self.set.len();
                    self.set.shutdown().await;
                    break;
                }
            }
        }

        debug!(
            completed = report.completed,
            aborted = report.aborted,
            "background tasks stopped"
        );
        report
    }
}
