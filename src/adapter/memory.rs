//! In-memory backend.
//!
//! Files live in a sorted map keyed by normalized path; directories are
//! tracked explicitly so empty directories exist too. Directory listings come
//! back in insertion order, which lets tests control processing order.

use std::collections::{BTreeSet, HashMap};
use std::io;
use std::sync::RwLock;

use async_trait::async_trait;

use super::FileSystem;
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct MemoryInner {
    files: HashMap<String, String>,
    /// File paths in creation order (rewrites keep their slot).
    order: Vec<String>,
    dirs: BTreeSet<String>,
}

/// [`FileSystem`] kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    inner: RwLock<MemoryInner>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file synchronously, creating parent directories.
    pub fn insert(&self, path: &str, contents: &str) {
        let mut inner = self.write_lock();
        insert_file(&mut inner, &normalize(path), contents);
    }

    /// All file paths in creation order.
    pub fn paths(&self) -> Vec<String> {
        self.read_lock().order.clone()
    }

    /// Current contents of a file, if present.
    pub fn contents(&self, path: &str) -> Option<String> {
        self.read_lock().files.get(&normalize(path)).cloned()
    }

    fn read_lock(&self) -> std::sync::RwLockReadGuard<'_, MemoryInner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_lock(&self) -> std::sync::RwLockWriteGuard<'_, MemoryInner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl FileSystem for MemoryFileSystem {
    async fn exists(&self, path: &str) -> Result<bool> {
        let path = normalize(path);
        let inner = self.read_lock();
        Ok(inner.files.contains_key(&path) || inner.dirs.contains(&path))
    }

    async fn read_file(&self, path: &str) -> Result<String> {
        let path = normalize(path);
        self.read_lock()
            .files
            .get(&path)
            .cloned()
            .ok_or_else(|| not_found(&path))
    }

    async fn write_file(&self, path: &str, contents: &str) -> Result<()> {
        let path = normalize(path);
        let mut inner = self.write_lock();
        if inner.dirs.contains(&path) {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("{path} is a directory"),
            )));
        }
        insert_file(&mut inner, &path, contents);
        Ok(())
    }

    async fn create_dir(&self, path: &str, recursive: bool) -> Result<()> {
        let path = normalize(path);
        let mut inner = self.write_lock();
        if !recursive {
            let parent = parent_of(&path);
            if let Some(parent) = parent {
                if !inner.dirs.contains(&parent) {
                    return Err(not_found(&parent));
                }
            }
        }
        add_dirs(&mut inner, &path);
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        let path = normalize(path);
        let mut inner = self.write_lock();
        if inner.files.remove(&path).is_none() {
            return Err(not_found(&path));
        }
        inner.order.retain(|existing| existing != &path);
        Ok(())
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<String>> {
        let path = normalize(path);
        let inner = self.read_lock();
        if !inner.dirs.contains(&path) {
            return Err(not_found(&path));
        }

        let mut names: Vec<String> = inner
            .order
            .iter()
            .filter(|file| parent_of(file).as_deref() == Some(path.as_str()))
            .map(|file| super::basename(file))
            .collect();
        for dir in &inner.dirs {
            if parent_of(dir).as_deref() == Some(path.as_str()) {
                names.push(super::basename(dir));
            }
        }
        Ok(names)
    }

    async fn is_directory(&self, path: &str) -> Result<bool> {
        Ok(self.read_lock().dirs.contains(&normalize(path)))
    }
}

fn insert_file(inner: &mut MemoryInner, path: &str, contents: &str) {
    if let Some(parent) = parent_of(path) {
        add_dirs(inner, &parent);
    }
    if inner
        .files
        .insert(path.to_string(), contents.to_string())
        .is_none()
    {
        inner.order.push(path.to_string());
    }
}

fn add_dirs(inner: &mut MemoryInner, path: &str) {
    let mut current = Some(path.to_string());
    while let Some(dir) = current {
        if dir.is_empty() || !inner.dirs.insert(dir.clone()) {
            break;
        }
        current = parent_of(&dir);
    }
}

fn normalize(path: &str) -> String {
    let replaced = path.replace('\\', "/");
    let trimmed = replaced.trim_end_matches('/');
    let mut out = String::with_capacity(trimmed.len());
    let mut last_slash = false;
    for ch in trimmed.chars() {
        if ch == '/' {
            if last_slash {
                continue;
            }
            last_slash = true;
        } else {
            last_slash = false;
        }
        out.push(ch);
    }
    out.strip_prefix("./").map(str::to_string).unwrap_or(out)
}

fn parent_of(path: &str) -> Option<String> {
    path.rfind('/').map(|idx| path[..idx].to_string())
}

fn not_found(path: &str) -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::NotFound,
        format!("{path}: no such file or directory"),
    ))
}
