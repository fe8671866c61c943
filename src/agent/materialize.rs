//! File block extraction and writing.
//!
//! Generator output names files with a simple line-delimited format:
//!
//! ```text
//! ### FILE: src/app.py
//! print("hello")
//! ### END_FILE
//! ```
//!
//! Each well-formed block replaces the named file under the project root.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

const FILE_MARKER: &str = "### FILE:";
const END_MARKER: &str = "### END_FILE";

/// One parsed file block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlock {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    Created,
    Updated,
}

impl std::fmt::Display for WriteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteStatus::Created => write!(f, "Created"),
            WriteStatus::Updated => write!(f, "Updated"),
        }
    }
}

/// A file written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWriteRecord {
    pub relative_path: String,
    pub content: String,
    pub status: WriteStatus,
}

#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("invalid path {0:?}: must be relative and stay inside the project")]
    InvalidPath(String),

    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A block that could not be written.
#[derive(Debug)]
pub struct WriteFailure {
    pub relative_path: String,
    pub error: MaterializeError,
}

#[derive(Debug, Default)]
pub struct MaterializeOutcome {
    pub written: Vec<FileWriteRecord>,
    pub failures: Vec<WriteFailure>,
}

impl MaterializeOutcome {
    pub fn files_changed(&self) -> bool {
        !self.written.is_empty()
    }
}

/// Extract every well-formed block from `text`, in order.
pub fn parse_file_blocks(text: &str) -> Vec<FileBlock> {
    let mut blocks = Vec::new();
    let mut open: Option<(String, Vec<&str>)> = None;

    for line in text.lines() {
        let trimmed = line.trim();

        if let Some(rest) = trimmed.strip_prefix(FILE_MARKER) {
            if let Some((path, _)) = open.take() {
                debug!(path = %path, "abandoning unterminated file block");
            }
            open = Some((clean_path(rest), Vec::new()));
            continue;
        }

        if trimmed == END_MARKER {
            match open.take() {
                Some((path, _)) if path.is_empty() => debug!("dropping file block without a path"),
                Some((path, lines)) => blocks.push(FileBlock {
                    path,
                    content: render_body(&lines),
                }),
                None => debug!("stray end marker"),
            }
            continue;
        }

        if let Some((_, lines)) = open.as_mut() {
            if !is_fence_line(trimmed) {
                lines.push(line);
            }
        }
    }

    if let Some((path, _)) = open {
        debug!(path = %path, "dropping file block without end marker");
    }

    blocks
}

/// Path as written after the marker, minus markdown decoration.
fn clean_path(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '`' || c == '"' || c == '\'' || c == '*')
        .trim()
        .to_string()
}

/// Whether a (trimmed) line is a code fence delimiter, with or without a
/// language tag.
pub fn is_fence_line(trimmed: &str) -> bool {
    let tag = trimmed
        .strip_prefix("```")
        .or_else(|| trimmed.strip_prefix("~~~"));

    match tag {
        Some(tag) => tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '.' | '#' | '-')),
        None => false,
    }
}

fn render_body(lines: &[&str]) -> String {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());

    match (start, end) {
        (Some(start), Some(end)) => {
            let mut body = lines[start..=end].join("\n");
            body.push('\n');
            body
        }
        _ => String::new(),
    }
}

/// Resolve a block path under `root`, rejecting anything that could
/// escape it.
fn resolve_under(root: &Path, relative: &str) -> Result<PathBuf, MaterializeError> {
    let path = Path::new(relative);
    let mut resolved = root.to_path_buf();
    let mut depth = 0usize;

    for component in path.components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(MaterializeError::InvalidPath(relative.to_string()));
            }
        }
    }

    if depth == 0 {
        return Err(MaterializeError::InvalidPath(relative.to_string()));
    }
    Ok(resolved)
}

/// Follow symlinks on the existing part of `target` and reject it unless it
/// still lands under `root`.
async fn confine(root: &Path, target: &Path, relative: &str) -> Result<(), MaterializeError> {
    let io_err = |source| MaterializeError::Io {
        path: relative.to_string(),
        source,
    };
    let invalid = || MaterializeError::InvalidPath(relative.to_string());

    let root = tokio::fs::canonicalize(root).await.map_err(io_err)?;

    for ancestor in target.ancestors() {
        match tokio::fs::symlink_metadata(ancestor).await {
            Ok(_) => {
                // A dangling link fails to canonicalize; writing through it
                // would land wherever it points.
                let real = tokio::fs::canonicalize(ancestor)
                    .await
                    .map_err(|_| invalid())?;
                return if real.starts_with(&root) {
                    Ok(())
                } else {
                    Err(invalid())
                };
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(io_err(e)),
        }
    }

    Err(invalid())
}

/// Writes file blocks under a project root.
#[derive(Debug, Clone)]
pub struct FileMaterializer {
    root: PathBuf,
}

impl FileMaterializer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Parse `text` and write every block. Failures are collected per file;
    /// one bad block never stops the others.
    pub async fn apply(&self, text: &str) -> MaterializeOutcome {
        let mut outcome = MaterializeOutcome::default();

        for block in parse_file_blocks(text) {
            match self.write_block(&block).await {
                Ok(status) => {
                    debug!(path = %block.path, %status, "wrote file");
                    outcome.written.push(FileWriteRecord {
                        relative_path: block.path,
                        content: block.content,
                        status,
                    });
                }
                Err(error) => {
                    warn!(path = %block.path, error = %error, "file write failed");
                    outcome.failures.push(WriteFailure {
                        relative_path: block.path,
                        error,
                    });
                }
            }
        }

        outcome
    }

    async fn write_block(&self, block: &FileBlock) -> Result<WriteStatus, MaterializeError> {
        let target = resolve_under(&self.root, &block.path)?;
        confine(&self.root, &target, &block.path).await?;
        let io_err = |source| MaterializeError::Io {
            path: block.path.clone(),
            source,
        };

        let status = if tokio::fs::try_exists(&target).await.map_err(io_err)? {
            WriteStatus::Updated
        } else {
            WriteStatus::Created
        };

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&target, &block.content)
            .await
            .map_err(io_err)?;

        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_single_block() {
        let text = "Sure!\n### FILE: app.py\nprint('hi')\n### END_FILE\nDone.";
        let blocks = parse_file_blocks(text);
        assert_eq!(
            blocks,
            vec![FileBlock {
                path: "app.py".to_string(),
                content: "print('hi')\n".to_string(),
            }]
        );
    }

    #[test]
    fn test_parse_adjacent_blocks_with_fences() {
        let text = "\
### FILE: a.py
```python
x = 1
```
### END_FILE
### FILE: `web/index.html`
~~~html
<p>hi</p>
~~~
### END_FILE
";
        let blocks = parse_file_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].content, "x = 1\n");
        assert_eq!(blocks[1].path, "web/index.html");
        assert_eq!(blocks[1].content, "<p>hi</p>\n");
    }

    #[test]
    fn test_nested_fences_are_stripped_inline_backticks_kept() {
        let text = "\
### FILE: README.md
```markdown
# Title
Run `make` first.
```bash
make
```
```
### END_FILE";
        let blocks = parse_file_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].content, "# Title\nRun `make` first.\nmake\n");
    }

    #[test]
    fn test_fence_line_detection() {
        assert!(is_fence_line("```"));
        assert!(is_fence_line("```c++"));
        assert!(is_fence_line("~~~rust"));
        assert!(is_fence_line("```objective-c"));
        assert!(!is_fence_line("```rust fn main()"));
        assert!(!is_fence_line("let s = ```;"));
        assert!(!is_fence_line("``"));
    }

    #[test]
    fn test_malformed_blocks_are_skipped() {
        let text = "\
### FILE: lost.py
no end marker here
### FILE: kept.py
kept
### END_FILE
### FILE:
orphan
### END_FILE
### FILE: tail.py
never closed";
        let blocks = parse_file_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].path, "kept.py");
    }

    #[test]
    fn test_blank_lines_trimmed_inner_kept() {
        let text = "### FILE: a.txt\n\n\nline 1\n\nline 2\n\n### END_FILE";
        let blocks = parse_file_blocks(text);
        assert_eq!(blocks[0].content, "line 1\n\nline 2\n");
    }

    #[test]
    fn test_resolve_rejects_escaping_paths() {
        let root = Path::new("/project");
        assert!(resolve_under(root, "../etc/passwd").is_err());
        assert!(resolve_under(root, "src/../../x").is_err());
        assert!(resolve_under(root, "/etc/passwd").is_err());
        assert!(resolve_under(root, ".").is_err());
        assert_eq!(
            resolve_under(root, "./src/main.rs").unwrap(),
            PathBuf::from("/project/src/main.rs")
        );
    }

    #[tokio::test]
    async fn test_apply_zero_blocks() {
        let tmp = TempDir::new().unwrap();
        let outcome = FileMaterializer::new(tmp.path())
            .apply("Just an explanation, no files.")
            .await;

        assert!(!outcome.files_changed());
        assert!(outcome.failures.is_empty());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_apply_created_then_updated() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("existing.py"), "old").unwrap();
        let materializer = FileMaterializer::new(tmp.path());

        let text = "\
### FILE: existing.py
new
### END_FILE
### FILE: pkg/sub/new.py
fresh
### END_FILE";
        let outcome = materializer.apply(text).await;

        assert!(outcome.files_changed());
        let statuses: Vec<_> = outcome
            .written
            .iter()
            .map(|r| (r.relative_path.as_str(), r.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("existing.py", WriteStatus::Updated),
                ("pkg/sub/new.py", WriteStatus::Created),
            ]
        );
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("existing.py")).unwrap(),
            "new\n"
        );
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("pkg/sub/new.py")).unwrap(),
            "fresh\n"
        );
    }

    #[tokio::test]
    async fn test_apply_reports_invalid_path_and_continues() {
        let tmp = TempDir::new().unwrap();
        let text = "\
### FILE: ../escape.py
bad
### END_FILE
### FILE: ok.py
good
### END_FILE";
        let outcome = FileMaterializer::new(tmp.path()).apply(text).await;

        assert_eq!(outcome.written.len(), 1);
        assert_eq!(outcome.failures.len(), 1);
        assert!(matches!(
            outcome.failures[0].error,
            MaterializeError::InvalidPath(_)
        ));
        assert!(!tmp.path().parent().unwrap().join("escape.py").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_apply_rejects_symlinked_dir_leaving_root() {
        let project = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), project.path().join("shared")).unwrap();

        let text = "### FILE: shared/evil.py\nx\n### END_FILE";
        let outcome = FileMaterializer::new(project.path()).apply(text).await;

        assert!(outcome.written.is_empty());
        assert!(matches!(
            outcome.failures[0].error,
            MaterializeError::InvalidPath(_)
        ));
        assert!(!outside.path().join("evil.py").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_apply_rejects_dangling_symlink_target() {
        let project = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let missing = outside.path().join("planted.py");
        std::os::unix::fs::symlink(&missing, project.path().join("app.py")).unwrap();

        let text = "### FILE: app.py\nx\n### END_FILE";
        let outcome = FileMaterializer::new(project.path()).apply(text).await;

        assert!(outcome.written.is_empty());
        assert!(!missing.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_apply_allows_symlink_within_root() {
        let project = TempDir::new().unwrap();
        std::fs::create_dir(project.path().join("real")).unwrap();
        std::os::unix::fs::symlink(project.path().join("real"), project.path().join("alias"))
            .unwrap();

        let text = "### FILE: alias/ok.py\nok\n### END_FILE";
        let outcome = FileMaterializer::new(project.path()).apply(text).await;

        assert_eq!(outcome.written.len(), 1);
        assert!(project.path().join("real/ok.py").exists());
    }
}
