//! Project file collection and chunking.
//!
//! This module provides:
//! - A deny-list/allow-list walk of the project tree
//! - Fixed-size character chunking with path headers

mod chunk;
mod collect;

pub use chunk::{Chunk, FileChunks};
pub use collect::{SourceFile, collect_source_files, has_source_extension, is_ignored_path};

use rayon::prelude::*;

/// Chunk every file into one flat sequence, in file order then split order.
pub fn chunk_files(files: &[SourceFile], chunk_size: usize) -> Vec<Chunk> {
    files
        .par_iter()
        .flat_map_iter(|f| FileChunks::new(&f.relative_path, &f.text, chunk_size).iter())
        .collect()
}
