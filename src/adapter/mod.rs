//! Storage adapter abstraction.
//!
//! The store never touches the filesystem directly. Every read, write and
//! directory listing goes through a [`FileSystem`] implementation, so the same
//! store logic runs against local disk, an in-memory map, or a caller-provided
//! remote backend.
//!
//! Paths are plain `/`-separated strings. Backends that need native paths
//! convert at the boundary.

use async_trait::async_trait;

use crate::error::Result;

pub mod local;
pub mod memory;

pub use local::LocalFileSystem;
pub use memory::MemoryFileSystem;

/// Capability interface consumed by the store.
///
/// All I/O methods may fail; the store decides per call site whether a
/// failure propagates (required writes) or is treated as absence (optional
/// directories, best-effort cleanup).
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Whether a file or directory exists at `path`.
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Read a whole file as UTF-8 text.
    async fn read_file(&self, path: &str) -> Result<String>;

    /// Create or replace a file.
    async fn write_file(&self, path: &str, contents: &str) -> Result<()>;

    /// Create a directory, including parents when `recursive` is set.
    async fn create_dir(&self, path: &str, recursive: bool) -> Result<()>;

    /// Remove a file.
    async fn delete_file(&self, path: &str) -> Result<()>;

    /// Entry names (not full paths) directly inside `path`.
    async fn read_dir(&self, path: &str) -> Result<Vec<String>>;

    /// Whether `path` is a directory.
    async fn is_directory(&self, path: &str) -> Result<bool>;

    fn join(&self, base: &str, segment: &str) -> String {
        join_path(base, segment)
    }

    fn dirname(&self, path: &str) -> String {
        dirname(path)
    }

    fn basename(&self, path: &str) -> String {
        basename(path)
    }
}

/// Join two `/`-separated path fragments.
pub fn join_path(base: &str, segment: &str) -> String {
    if base.is_empty() {
        return segment.to_string();
    }
    if segment.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        segment.trim_start_matches('/')
    )
}

/// Parent directory of a `/`-separated path (`"."` when there is none).
pub fn dirname(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => trimmed[..idx].to_string(),
        None => ".".to_string(),
    }
}

/// Last component of a `/`- or `\`-separated path.
pub fn basename(path: &str) -> String {
    let trimmed = path.trim_end_matches(['/', '\\']);
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_handles_separators() {
        assert_eq!(join_path("root", "backlog"), "root/backlog");
        assert_eq!(join_path("root/", "/backlog"), "root/backlog");
        assert_eq!(join_path("", "backlog"), "backlog");
        assert_eq!(join_path("/abs", ""), "/abs");
    }

    #[test]
    fn dirname_and_basename() {
        assert_eq!(dirname("a/b/c.md"), "a/b");
        assert_eq!(dirname("/c.md"), "/");
        assert_eq!(dirname("c.md"), ".");
        assert_eq!(basename("a/b/c.md"), "c.md");
        assert_eq!(basename("a\\b\\c.md"), "c.md");
        assert_eq!(basename("a/b/"), "b");
    }
}
