#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use backlog::adapter::MemoryFileSystem;
use backlog::diagnostics::CollectingSink;
use backlog::{Store, StoreOptions};
use tempfile::TempDir;

pub const DEFAULT_CONFIG: &str =
    "project_name: \"Test\"\nstatuses: [\"To Do\", \"In Progress\", \"Done\"]\n";

/// A backlog project in a temporary directory.
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let project = Self { dir };
        project.write_file("backlog/config.yml", DEFAULT_CONFIG)?;
        fs::create_dir_all(project.path().join("backlog/tasks"))?;
        Ok(project)
    }

    pub fn empty() -> std::io::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_file(&self, rel_path: &str, contents: &str) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn read_file(&self, rel_path: &str) -> std::io::Result<String> {
        fs::read_to_string(self.dir.path().join(rel_path))
    }

    pub fn exists(&self, rel_path: &str) -> bool {
        self.dir.path().join(rel_path).exists()
    }

    /// Names of the `.md` files in a backlog subdirectory, sorted.
    pub fn list(&self, rel_dir: &str) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.dir.path().join(rel_dir))
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn store(&self) -> (Store, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::new());
        let store = Store::local(
            self.path(),
            StoreOptions {
                diagnostics: sink.clone(),
            },
        );
        (store, sink)
    }
}

pub const MEMORY_ROOT: &str = "/work";

/// In-memory project seeded with the default config.
pub fn memory_project() -> (Arc<MemoryFileSystem>, Store, Arc<CollectingSink>) {
    let fs = Arc::new(MemoryFileSystem::new());
    fs.insert("/work/backlog/config.yml", DEFAULT_CONFIG);
    let sink = Arc::new(CollectingSink::new());
    let store = Store::with_options(
        fs.clone(),
        MEMORY_ROOT,
        StoreOptions {
            diagnostics: sink.clone(),
        },
    );
    (fs, store, sink)
}

pub fn task_file(status: &str, title: &str) -> String {
    format!("---\nstatus: {status}\ncreated_date: 2025-01-01\n---\n\n# {title}\n")
}

pub fn ids(tasks: &[backlog::task::Task]) -> Vec<String> {
    tasks.iter().map(|task| task.id.clone()).collect()
}
