//! Local disk backend built on `tokio::fs`.

use std::path::Path;

use async_trait::async_trait;

use super::FileSystem;
use crate::error::Result;

/// [`FileSystem`] backed by the local disk.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(path).await?)
    }

    async fn read_file(&self, path: &str) -> Result<String> {
        Ok(tokio::fs::read_to_string(path).await?)
    }

    async fn write_file(&self, path: &str, contents: &str) -> Result<()> {
        tokio::fs::write(path, contents).await?;
        Ok(())
    }

    async fn create_dir(&self, path: &str, recursive: bool) -> Result<()> {
        if recursive {
            tokio::fs::create_dir_all(path).await?;
        } else {
            tokio::fs::create_dir(path).await?;
        }
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        tokio::fs::remove_file(path).await?;
        Ok(())
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(path).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        // Directory iteration order is platform dependent; keep it stable.
        names.sort();
        Ok(names)
    }

    async fn is_directory(&self, path: &str) -> Result<bool> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn join(&self, base: &str, segment: &str) -> String {
        to_slash(&Path::new(base).join(segment))
    }

    fn dirname(&self, path: &str) -> String {
        Path::new(path)
            .parent()
            .map(to_slash)
            .filter(|parent| !parent.is_empty())
            .unwrap_or_else(|| ".".to_string())
    }

    fn basename(&self, path: &str) -> String {
        Path::new(path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_dir_lists_names_sorted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().to_string_lossy().into_owned();
        let fs = LocalFileSystem::new();

        fs.write_file(&fs.join(&root, "b.md"), "b").await.expect("write b");
        fs.write_file(&fs.join(&root, "a.md"), "a").await.expect("write a");
        fs.create_dir(&fs.join(&root, "nested/deeper"), true)
            .await
            .expect("mkdir");

        let names = fs.read_dir(&root).await.expect("read_dir");
        assert_eq!(names, vec!["a.md", "b.md", "nested"]);
        assert!(fs.is_directory(&fs.join(&root, "nested")).await.expect("is_dir"));
        assert!(!fs.is_directory(&fs.join(&root, "a.md")).await.expect("is_dir"));
        assert!(!fs.is_directory(&fs.join(&root, "missing")).await.expect("is_dir"));
    }

    #[tokio::test]
    async fn delete_missing_file_reports_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fs = LocalFileSystem::new();
        let path = fs.join(&dir.path().to_string_lossy(), "gone.md");

        let err = fs.delete_file(&path).await.expect_err("missing file");
        assert!(err.is_not_found());
        assert!(!fs.exists(&path).await.expect("exists"));
    }
}
