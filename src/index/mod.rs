//! In-memory project index.
//!
//! Builds are full replaces: collect → chunk → embed every chunk (with
//! retries) → swap in a new snapshot. The chunk list and its embeddings
//! live together in one immutable [`IndexSnapshot`] behind an `Arc`, so a
//! search sees either the old pair or the new pair, never a mix.

mod retry;

pub use retry::RetryPolicy;

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::agent::Retriever;
use crate::config::PilotConfig;
use crate::indexer::{Chunk, chunk_files, collect_source_files};
use crate::llm::{EmbedMode, EmbeddingProvider};

/// Index build knobs.
#[derive(Debug, Clone, Copy)]
pub struct IndexSettings {
    pub chunk_size: usize,
    pub retry: RetryPolicy,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            chunk_size: 2000,
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&PilotConfig> for IndexSettings {
    fn from(config: &PilotConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            retry: RetryPolicy::from(&config.retry),
        }
    }
}

/// One completed build: chunks and their embeddings, position for position.
#[derive(Debug)]
pub struct IndexSnapshot {
    chunks: Vec<Chunk>,
    embeddings: Vec<Vec<f32>>,
    files: usize,
    built_at: DateTime<Utc>,
}

impl IndexSnapshot {
    /// Build from (chunk, embedding) pairs; the parallel lists can only be
    /// the same length.
    fn from_pairs(pairs: Vec<(Chunk, Vec<f32>)>) -> Self {
        let files = {
            let mut paths: Vec<_> = pairs.iter().map(|(c, _)| c.source_path.as_str()).collect();
            paths.dedup();
            paths.len()
        };
        let (chunks, embeddings) = pairs.into_iter().unzip();
        Self {
            chunks,
            embeddings,
            files,
            built_at: Utc::now(),
        }
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn embeddings(&self) -> &[Vec<f32>] {
        &self.embeddings
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn files(&self) -> usize {
        self.files
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }
}

/// Outcome of [`ProjectIndex::index_project`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    /// Nothing indexable under the root. Not an error.
    NoFiles,
    /// At least one chunk embedded; the index is ready.
    Indexed {
        chunks: usize,
        total: usize,
        files: usize,
    },
    /// Every chunk failed to embed.
    Failed { total: usize },
    /// A newer build was requested; this result was not adopted.
    Superseded,
}

impl BuildStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, BuildStatus::Indexed { .. })
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStatus::NoFiles => write!(f, "No code files found."),
            BuildStatus::Indexed { chunks, total, .. } if chunks < total => write!(
                f,
                "Success! Indexed {} chunks ({} dropped after retries).",
                chunks,
                total - chunks
            ),
            BuildStatus::Indexed { chunks, .. } => write!(f, "Success! Indexed {} chunks.", chunks),
            BuildStatus::Failed { .. } => write!(f, "Indexing failed."),
            BuildStatus::Superseded => write!(f, "Build superseded by a newer request."),
        }
    }
}

/// A ranked search result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
}

/// Memory-resident semantic index of one project.
pub struct ProjectIndex<E> {
    provider: Arc<E>,
    settings: IndexSettings,
    snapshot: RwLock<Option<Arc<IndexSnapshot>>>,
    build_lock: Mutex<()>,
    latest_ticket: AtomicU64,
}

impl<E: EmbeddingProvider> ProjectIndex<E> {
    pub fn new(provider: Arc<E>, settings: IndexSettings) -> Self {
        Self {
            provider,
            settings,
            snapshot: RwLock::new(None),
            build_lock: Mutex::new(()),
            latest_ticket: AtomicU64::new(0),
        }
    }

    /// Rebuild the index from scratch.
    ///
    /// Builds are serialized: a second call waits for the first. Each call
    /// takes a ticket on entry and only a build still holding the newest
    /// ticket when it finishes replaces the current state.
    pub async fn index_project<F>(&self, root: &Path, progress: F) -> BuildStatus
    where
        F: Fn(&str) + Send + Sync,
    {
        let ticket = self.latest_ticket.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = self.build_lock.lock().await;

        if !self.is_latest(ticket) {
            debug!(ticket, "skipping build, a newer one is queued");
            return BuildStatus::Superseded;
        }

        info!(root = %root.display(), ticket, "indexing project");
        progress("Scanning files...");

        let chunk_size = self.settings.chunk_size;
        let walk_root = root.to_path_buf();
        let collected = tokio::task::spawn_blocking(move || {
            let files = collect_source_files(&walk_root);
            let chunks = chunk_files(&files, chunk_size);
            (files.len(), chunks)
        })
        .await;

        let (file_count, chunks) = match collected {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "file collection task failed");
                (0, Vec::new())
            }
        };

        if file_count == 0 {
            info!("no code files found");
            return self.finish(ticket, None, BuildStatus::NoFiles).await;
        }

        let total = chunks.len();
        info!(files = file_count, chunks = total, "embedding chunks");
        progress(&format!("Chunking {} files...", file_count));
        progress(&format!("Embedding {} chunks...", total));

        let mut pairs = Vec::with_capacity(total);
        for (i, chunk) in chunks.into_iter().enumerate() {
            let text = chunk.text();
            progress(&format!("Embedding: {}/{}...", i + 1, total));

            let result = self
                .settings
                .retry
                .run(
                    |_| self.provider.embed(&text, EmbedMode::Document),
                    |attempt, e| {
                        warn!(chunk = i + 1, attempt, error = %e, "embedding failed, retrying");
                        progress(&format!("Retrying {}/{} ({})...", i + 1, total, e));
                    },
                )
                .await;

            match result {
                Ok(embedding) => pairs.push((chunk, embedding)),
                Err(e) => warn!(
                    chunk = i + 1,
                    file = %chunk.source_path,
                    error = %e,
                    "dropping chunk"
                ),
            }
        }

        info!(embedded = pairs.len(), total, "embedding finished");

        if pairs.is_empty() {
            return self.finish(ticket, None, BuildStatus::Failed { total }).await;
        }

        let snapshot = IndexSnapshot::from_pairs(pairs);
        let status = BuildStatus::Indexed {
            chunks: snapshot.len(),
            total,
            files: snapshot.files(),
        };
        self.finish(ticket, Some(Arc::new(snapshot)), status).await
    }

    /// Swap in the build result if this build is still the newest request.
    async fn finish(
        &self,
        ticket: u64,
        snapshot: Option<Arc<IndexSnapshot>>,
        status: BuildStatus,
    ) -> BuildStatus {
        let mut current = self.snapshot.write().await;
        if !self.is_latest(ticket) {
            info!(ticket, "build superseded, discarding result");
            return BuildStatus::Superseded;
        }
        *current = snapshot;
        status
    }

    fn is_latest(&self, ticket: u64) -> bool {
        self.latest_ticket.load(Ordering::SeqCst) == ticket
    }

    /// Texts of the `top_k` chunks most similar to `query`, best first.
    ///
    /// Returns an empty list when nothing is indexed or the query cannot be
    /// embedded; retrieval is best effort.
    pub async fn search(&self, query: &str, top_k: usize) -> Vec<String> {
        self.search_scored(query, top_k)
            .await
            .into_iter()
            .map(|hit| hit.chunk.text())
            .collect()
    }

    pub async fn search_scored(&self, query: &str, top_k: usize) -> Vec<SearchHit> {
        let Some(snapshot) = self.snapshot().await else {
            return vec![];
        };
        if snapshot.is_empty() || top_k == 0 {
            return vec![];
        }

        let query_vector = match self.provider.embed(query, EmbedMode::Query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "query embedding failed");
                return vec![];
            }
        };

        rank(snapshot.embeddings(), &query_vector, top_k)
            .into_iter()
            .map(|(i, score)| SearchHit {
                chunk: snapshot.chunks()[i].clone(),
                score,
            })
            .collect()
    }

    /// Current snapshot, if a build has succeeded.
    pub async fn snapshot(&self) -> Option<Arc<IndexSnapshot>> {
        self.snapshot.read().await.clone()
    }

    pub async fn is_indexed(&self) -> bool {
        self.snapshot.read().await.is_some()
    }

    /// Whether a build currently holds the build lock.
    pub fn is_building(&self) -> bool {
        self.build_lock.try_lock().is_err()
    }
}

impl<E: EmbeddingProvider> Retriever for ProjectIndex<E> {
    async fn retrieve(&self, query: &str, top_k: usize) -> Vec<String> {
        self.search(query, top_k).await
    }
}

/// Rank embeddings against a query by raw dot product.
///
/// Vectors are not normalized: providers are expected to return vectors of
/// comparable magnitude. The sort is stable, so on equal scores the chunk
/// inserted first ranks first. NaN scores rank last.
pub fn rank(embeddings: &[Vec<f32>], query: &[f32], top_k: usize) -> Vec<(usize, f32)> {
    let mut scored: Vec<(usize, f32)> = embeddings
        .iter()
        .map(|e| {
            let score = dot(e, query);
            if score.is_nan() {
                f32::NEG_INFINITY
            } else {
                // -0.0 would sort below +0.0 under total_cmp.
                score + 0.0
            }
        })
        .enumerate()
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(top_k);
    scored
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
