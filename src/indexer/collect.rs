//! Source file collection.
//!
//! Walks the project tree, skipping VCS/cache/IDE directories, and reads
//! every file with an allow-listed extension.

use std::path::{Component, Path};

use tracing::{debug, warn};

/// Directories never descended into.
pub const SKIP_DIRS: &[&str] = &[
    // VCS
    ".git",
    ".svn",
    ".hg",
    // Dependencies
    "node_modules",
    "vendor",
    // Caches / build output
    "__pycache__",
    ".pytest_cache",
    ".mypy_cache",
    ".ruff_cache",
    ".tox",
    "target",
    // Virtual envs
    "venv",
    ".venv",
    // IDE
    ".idea",
    ".vscode",
];

/// Extensions treated as indexable text.
pub const SOURCE_EXTENSIONS: &[&str] = &[
    "py", "js", "jsx", "ts", "tsx", "html", "css", "java", "c", "h", "cpp", "hpp", "cs", "rs",
    "go", "json", "toml", "yaml", "yml", "md", "txt", "sh",
];

/// A collected source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path relative to the project root, `/`-separated.
    pub relative_path: String,
    pub text: String,
}

/// Collect indexable files under `root`, in sorted walk order.
///
/// Unreadable directories and files are logged and skipped. Empty and
/// whitespace-only files are dropped.
pub fn collect_source_files(root: &Path) -> Vec<SourceFile> {
    let mut files = Vec::new();
    collect_recursive(root, root, &mut files);
    debug!(root = %root.display(), files = files.len(), "collected source files");
    files
}

fn collect_recursive(root: &Path, dir: &Path, out: &mut Vec<SourceFile>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "skipping unreadable directory");
            return;
        }
    };

    let mut entries: Vec<_> = entries.flatten().collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        // file_type() does not follow symlinks, so link cycles are never walked.
        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_dir() {
            let name = entry.file_name();
            if should_skip_dir(&name.to_string_lossy()) {
                continue;
            }
            collect_recursive(root, &path, out);
        } else if file_type.is_file() && has_source_extension(&path) {
            let bytes = match std::fs::read(&path) {
                Ok(b) => b,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "failed to read file");
                    continue;
                }
            };

            let text = decode_lossy(&bytes);
            if text.trim().is_empty() {
                continue;
            }

            out.push(SourceFile {
                relative_path: relative_path(root, &path),
                text,
            });
        }
    }
}

/// Whether a directory name is on the deny-list.
pub fn should_skip_dir(name: &str) -> bool {
    SKIP_DIRS.contains(&name)
}

/// Whether any component of a path is on the deny-list.
pub fn is_ignored_path(path: &Path) -> bool {
    path.components().any(|c| match c {
        Component::Normal(name) => should_skip_dir(&name.to_string_lossy()),
        _ => false,
    })
}

pub fn has_source_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SOURCE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Decode UTF-8, dropping invalid byte sequences instead of failing.
pub fn decode_lossy(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
    }
    text
}

fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
