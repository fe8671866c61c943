/// A slice of a project file, the unit of retrieval.
///
/// `body` is the raw slice of the file. [`Chunk::text`] renders it with a
/// header naming the source path so a retrieved chunk stays
/// self-describing once detached from its file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Path relative to the project root, `/`-separated.
    pub source_path: String,

    /// Position of this chunk within its file (0-based).
    pub sequence_index: usize,

    /// The raw text slice.
    pub body: String,
}

impl Chunk {
    /// Text used for embedding and returned from search.
    pub fn text(&self) -> String {
        format!("File: {}\nCode:\n{}", self.source_path, self.body)
    }
}

/// Fixed-size character chunking of one file.
///
/// Lazy and restartable: every call to [`FileChunks::iter`] walks the text
/// again from the start. A text shorter than `chunk_size` yields exactly
/// one chunk; otherwise `ceil(len / chunk_size)` chunks of `chunk_size`
/// characters, the last one possibly shorter. Lengths are counted in
/// `char`s so a multi-byte code point is never split.
#[derive(Debug, Clone, Copy)]
pub struct FileChunks<'a> {
    path: &'a str,
    text: &'a str,
    chunk_size: usize,
}

impl<'a> FileChunks<'a> {
    pub fn new(path: &'a str, text: &'a str, chunk_size: usize) -> Self {
        Self {
            path,
            text,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn iter(&self) -> ChunkIter<'a> {
        ChunkIter {
            path: self.path,
            rest: self.text,
            chunk_size: self.chunk_size,
            next_index: 0,
        }
    }
}

impl<'a> IntoIterator for &FileChunks<'a> {
    type Item = Chunk;
    type IntoIter = ChunkIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct ChunkIter<'a> {
    path: &'a str,
    rest: &'a str,
    chunk_size: usize,
    next_index: usize,
}

impl Iterator for ChunkIter<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        // An empty text still yields its single (empty) chunk.
        if self.rest.is_empty() && self.next_index > 0 {
            return None;
        }

        let split = self
            .rest
            .char_indices()
            .nth(self.chunk_size)
            .map(|(i, _)| i)
            .unwrap_or(self.rest.len());
        let (body, rest) = self.rest.split_at(split);
        self.rest = rest;

        let chunk = Chunk {
            source_path: self.path.to_string(),
            sequence_index: self.next_index,
            body: body.to_string(),
        };
        self.next_index += 1;
        Some(chunk)
    }
}
