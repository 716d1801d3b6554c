//! Filename conventions for task and milestone files.
//!
//! # Directory Structure
//!
//! ```text
//! {root}/backlog/
//!   config.yml                  # Project configuration
//!   tasks/                      # Active tasks
//!     42 - Fix login.md
//!     42.1 - Add test.md
//!   completed/                  # Archived tasks
//!   milestones/                 # Milestones
//!     m-0 - first-release.md
//! ```
//!
//! Everything here is pure string work: identity is recovered from a path
//! without opening the file.

use std::cmp::Ordering;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::adapter::basename;
use crate::task::{TaskIndexEntry, TaskSource};

/// Name of the backlog directory under the project root
pub const BACKLOG_DIR: &str = "backlog";
pub const CONFIG_FILE: &str = "config.yml";
pub const TASKS_DIR: &str = "tasks";
pub const COMPLETED_DIR: &str = "completed";
pub const MILESTONES_DIR: &str = "milestones";

const MAX_TITLE_LEN: usize = 50;
const UNSAFE_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

static TASK_FILENAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:task-)?(\d+(?:\.\d+)?) - (.+)\.md$").expect("valid task filename regex")
});

static MILESTONE_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(m-\d+)").expect("valid milestone id regex"));

/// Derive `{id, title, source}` from a task path. Never fails: names that do
/// not follow the convention fall back to their stem for both id and title.
pub fn extract_index_from_path(path: &str) -> TaskIndexEntry {
    let name = basename(path);
    let (id, title) = match TASK_FILENAME_RE.captures(&name) {
        Some(caps) => (caps[1].to_string(), caps[2].to_string()),
        None => {
            let stem = file_stem(&name);
            (stem.clone(), stem)
        }
    };

    TaskIndexEntry {
        id,
        file_path: path.to_string(),
        title,
        source: source_from_path(path),
    }
}

/// `Completed` when any path segment is `completed`, otherwise `Local`.
pub fn source_from_path(path: &str) -> TaskSource {
    if path_segments(path).any(|segment| segment == COMPLETED_DIR) {
        TaskSource::Completed
    } else {
        TaskSource::Local
    }
}

/// Whether a caller-supplied path names a task file (a `.md` file below a
/// `tasks/` or `completed/` segment).
pub fn is_task_path(path: &str) -> bool {
    let name = basename(path);
    if name.eq_ignore_ascii_case(CONFIG_FILE) || !has_md_extension(&name) {
        return false;
    }
    let segments: Vec<&str> = path_segments(path).collect();
    segments
        .iter()
        .take(segments.len().saturating_sub(1))
        .any(|segment| *segment == TASKS_DIR || *segment == COMPLETED_DIR)
}

/// `{id} - {safe title}.md`
pub fn task_filename(id: &str, title: &str) -> String {
    format!("{id} - {}.md", sanitize_title(title))
}

/// Strip filesystem-unsafe characters, collapse whitespace, cap the length.
pub fn sanitize_title(title: &str) -> String {
    let stripped: String = title
        .chars()
        .filter(|ch| !UNSAFE_FILENAME_CHARS.contains(ch) && !ch.is_control())
        .collect();
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed.chars().take(MAX_TITLE_LEN).collect();
    let truncated = truncated.trim().to_string();
    if truncated.is_empty() {
        "untitled".to_string()
    } else {
        truncated
    }
}

/// `{id} - {lower-hyphenated title}.md`
pub fn milestone_filename(id: &str, title: &str) -> String {
    format!("{} - {}.md", id.to_lowercase(), slugify(title))
}

/// Lower-case, hyphen-separated form of a title.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    let truncated: String = slug.chars().take(MAX_TITLE_LEN).collect();
    let truncated = truncated.trim_matches('-').to_string();
    if truncated.is_empty() {
        "milestone".to_string()
    } else {
        truncated
    }
}

/// Milestone id (`m-N`) embedded at the start of a filename.
pub fn milestone_id_from_filename(name: &str) -> Option<String> {
    MILESTONE_ID_RE
        .captures(&basename(name))
        .map(|caps| caps[1].to_lowercase())
}

/// Numeric part of a milestone id.
pub fn milestone_number(id: &str) -> Option<u64> {
    let trimmed = id.trim();
    let digits = trimmed
        .strip_prefix("m-")
        .or_else(|| trimmed.strip_prefix("M-"))?;
    digits.parse().ok()
}

/// Markdown file in the milestones directory that is not the readme.
pub fn is_milestone_file(name: &str) -> bool {
    has_md_extension(name) && !name.eq_ignore_ascii_case("readme.md")
}

/// Markdown file by extension.
pub fn has_md_extension(name: &str) -> bool {
    name.len() > 3
        && name
            .get(name.len() - 3..)
            .is_some_and(|ext| ext.eq_ignore_ascii_case(".md"))
}

/// `(major, minor)` for ids like `"42"` or `"42.1"`.
pub fn parse_task_id(id: &str) -> Option<(u64, Option<u64>)> {
    let trimmed = id.trim();
    let trimmed = trimmed
        .strip_prefix("task-")
        .unwrap_or(trimmed);
    match trimmed.split_once('.') {
        Some((major, minor)) => Some((major.parse().ok()?, Some(minor.parse().ok()?))),
        None => Some((trimmed.parse().ok()?, None)),
    }
}

/// Numeric-aware id ordering; non-numeric ids sort after numeric ones.
pub fn compare_task_ids(a: &str, b: &str) -> Ordering {
    match (parse_task_id(a), parse_task_id(b)) {
        (Some(left), Some(right)) => left.cmp(&right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(['/', '\\']).filter(|segment| !segment.is_empty())
}

fn file_stem(name: &str) -> String {
    if has_md_extension(name) {
        name[..name.len() - 3].to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_id_and_title_from_conventional_names() {
        let entry = extract_index_from_path("root/backlog/tasks/42 - Fix login.md");
        assert_eq!(entry.id, "42");
        assert_eq!(entry.title, "Fix login");
        assert_eq!(entry.source, TaskSource::Local);

        let entry = extract_index_from_path("backlog/completed/task-7.2 - A - B.md");
        assert_eq!(entry.id, "7.2");
        assert_eq!(entry.title, "A - B");
        assert_eq!(entry.source, TaskSource::Completed);
    }

    #[test]
    fn unconventional_names_fall_back_to_stem() {
        let entry = extract_index_from_path("backlog/tasks/notes.md");
        assert_eq!(entry.id, "notes");
        assert_eq!(entry.title, "notes");

        let entry = extract_index_from_path("");
        assert_eq!(entry.id, "");
    }

    #[test]
    fn completed_must_be_a_whole_segment() {
        assert_eq!(
            source_from_path("backlog/not-completed/1 - A.md"),
            TaskSource::Local
        );
    }

    #[test]
    fn task_paths_require_bucket_segment() {
        assert!(is_task_path("p/backlog/tasks/1 - A.md"));
        assert!(is_task_path("p/backlog/completed/1 - A.MD"));
        assert!(!is_task_path("p/backlog/milestones/m-0 - a.md"));
        assert!(!is_task_path("p/backlog/tasks/notes.txt"));
        assert!(!is_task_path("p/backlog/config.yml"));
        assert!(!is_task_path("tasks.md"));
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(task_filename("3", "Fix: a/b  <c>?"), "3 - Fix ab c.md");
        let long = "x".repeat(80);
        assert_eq!(sanitize_title(&long).len(), 50);
        assert_eq!(sanitize_title("???"), "untitled");
    }

    #[test]
    fn milestone_filenames_are_hyphenated() {
        assert_eq!(
            milestone_filename("m-2", "Release 1.0: Beta!"),
            "m-2 - release-1-0-beta.md"
        );
        assert_eq!(
            milestone_id_from_filename("M-12 - thing.md").as_deref(),
            Some("m-12")
        );
        assert_eq!(milestone_id_from_filename("readme.md"), None);
        assert_eq!(milestone_number("m-12"), Some(12));
        assert!(!is_milestone_file("README.md"));
    }

    #[test]
    fn ids_compare_numerically() {
        assert_eq!(compare_task_ids("2", "10"), Ordering::Less);
        assert_eq!(compare_task_ids("10.2", "10.10"), Ordering::Less);
        assert_eq!(compare_task_ids("10", "10.1"), Ordering::Less);
        assert_eq!(compare_task_ids("abc", "1"), Ordering::Greater);
        assert_eq!(parse_task_id("task-4"), Some((4, None)));
    }
}
