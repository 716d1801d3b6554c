//! Task model for backlog.
//!
//! A task lives in one markdown file under `backlog/tasks/` (active) or
//! `backlog/completed/`. Identity comes from the filename; everything else is
//! parsed from the file content by [`crate::markdown`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Status used when a task file carries none.
pub const FALLBACK_STATUS: &str = "To Do";

/// Task priority. Ordering is high < medium < low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    /// Sort rank; unset priorities rank after every set one.
    pub fn rank(priority: Option<Priority>) -> u8 {
        match priority {
            Some(Priority::High) => 0,
            Some(Priority::Medium) => 1,
            Some(Priority::Low) => 2,
            None => 3,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(format!("unknown priority '{other}' (expected high|medium|low)")),
        }
    }
}

/// Where a task file lives. Only `Local` and `Completed` are mutable here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TaskSource {
    /// Active backlog (`tasks/`).
    #[default]
    Local,
    /// Archived (`completed/`).
    Completed,
    Remote,
    LocalBranch,
}

impl TaskSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskSource::Local => "local",
            TaskSource::Completed => "completed",
            TaskSource::Remote => "remote",
            TaskSource::LocalBranch => "local-branch",
        }
    }

    pub fn is_mutable(&self) -> bool {
        matches!(self, TaskSource::Local | TaskSource::Completed)
    }
}

impl fmt::Display for TaskSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceCriterion {
    /// 1-based position in document order.
    pub index: usize,
    pub text: String,
    pub checked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub status: String,
    pub created_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assignee: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implementation_plan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implementation_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acceptance_criteria: Vec<AcceptanceCriterion>,
    pub file_path: String,
    pub source: TaskSource,
    /// Body text after the metadata block, as last read from disk.
    #[serde(default, skip_serializing)]
    pub raw_content: String,
}

impl Task {
    /// A task with only the required fields set.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        status: impl Into<String>,
        created_date: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status: status.into(),
            created_date: created_date.into(),
            updated_date: None,
            priority: None,
            assignee: Vec::new(),
            labels: Vec::new(),
            milestone: None,
            dependencies: Vec::new(),
            parent_task_id: None,
            ordinal: None,
            description: None,
            implementation_plan: None,
            implementation_notes: None,
            acceptance_criteria: Vec::new(),
            file_path: String::new(),
            source: TaskSource::Local,
            raw_content: String::new(),
        }
    }

    /// Normalized milestone key, if the task references one.
    pub fn milestone_key(&self) -> Option<String> {
        self.milestone.as_deref().and_then(normalize_key)
    }

    /// Compare every field that is persisted in the task file.
    pub fn same_structured_fields(&self, other: &Task) -> bool {
        self.id == other.id
            && self.title == other.title
            && self.status == other.status
            && self.created_date == other.created_date
            && self.updated_date == other.updated_date
            && self.priority == other.priority
            && self.assignee == other.assignee
            && self.labels == other.labels
            && self.milestone == other.milestone
            && self.dependencies == other.dependencies
            && self.parent_task_id == other.parent_task_id
            && self.ordinal == other.ordinal
            && self.description == other.description
            && self.implementation_plan == other.implementation_plan
            && self.implementation_notes == other.implementation_notes
            && self.acceptance_criteria == other.acceptance_criteria
    }
}

/// Lightweight index entry built from a path string without reading the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskIndexEntry {
    pub id: String,
    pub file_path: String,
    pub title: String,
    pub source: TaskSource,
}

/// Trimmed, lower-cased lookup key; `None` for blank input.
pub fn normalize_key(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Three-way change for optional scalar fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Patch<T> {
    #[default]
    Unchanged,
    Set(T),
    Clear,
}

impl<T> Patch<T> {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Patch::Unchanged)
    }

    /// Apply to an existing optional value.
    pub fn apply(self, current: &mut Option<T>) {
        match self {
            Patch::Unchanged => {}
            Patch::Set(value) => *current = Some(value),
            Patch::Clear => *current = None,
        }
    }
}

impl<T> From<Option<T>> for Patch<T> {
    /// `Some` sets, `None` clears.
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Patch::Set(value),
            None => Patch::Clear,
        }
    }
}

/// Replace, add and remove edits for a list field. `replace` wins when set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListUpdate {
    pub replace: Option<Vec<String>>,
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

impl ListUpdate {
    pub fn replace(values: Vec<String>) -> Self {
        Self {
            replace: Some(values),
            ..Self::default()
        }
    }

    pub fn add(values: Vec<String>) -> Self {
        Self {
            add: values,
            ..Self::default()
        }
    }

    pub fn remove(values: Vec<String>) -> Self {
        Self {
            remove: values,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.replace.is_none() && self.add.is_empty() && self.remove.is_empty()
    }

    /// Apply as set union/difference, keeping first-seen order.
    pub fn apply(self, current: &mut Vec<String>) {
        if let Some(values) = self.replace {
            *current = dedupe(values);
            return;
        }
        for value in self.add {
            let value = value.trim().to_string();
            if !value.is_empty() && !current.contains(&value) {
                current.push(value);
            }
        }
        if !self.remove.is_empty() {
            current.retain(|value| !self.remove.iter().any(|r| r.trim() == value));
        }
    }
}

fn dedupe(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let value = value.trim().to_string();
        if !value.is_empty() && !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

/// Acceptance-criteria edits, applied in the order: replace, remove, check,
/// uncheck, add. Indices are 1-based and refer to the list before the edit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CriteriaUpdate {
    pub replace: Option<Vec<String>>,
    pub add: Vec<String>,
    pub remove: Vec<usize>,
    pub check: Vec<usize>,
    pub uncheck: Vec<usize>,
}

impl CriteriaUpdate {
    pub fn is_empty(&self) -> bool {
        self.replace.is_none()
            && self.add.is_empty()
            && self.remove.is_empty()
            && self.check.is_empty()
            && self.uncheck.is_empty()
    }

    pub fn apply(self, current: &mut Vec<AcceptanceCriterion>) {
        if let Some(texts) = self.replace {
            *current = unchecked(texts).collect();
        } else {
            for item in current.iter_mut() {
                if self.check.contains(&item.index) {
                    item.checked = true;
                }
                if self.uncheck.contains(&item.index) {
                    item.checked = false;
                }
            }
            current.retain(|item| !self.remove.contains(&item.index));
        }

        current.extend(unchecked(self.add));
        renumber(current);
    }
}

/// Trimmed, non-blank texts as fresh unchecked criteria.
fn unchecked(texts: Vec<String>) -> impl Iterator<Item = AcceptanceCriterion> {
    texts.into_iter().filter_map(|text| {
        let text = text.trim();
        (!text.is_empty()).then(|| AcceptanceCriterion {
            index: 0,
            text: text.to_string(),
            checked: false,
        })
    })
}

/// Reassign 1-based indices in list order.
pub fn renumber(criteria: &mut [AcceptanceCriterion]) {
    for (pos, item) in criteria.iter_mut().enumerate() {
        item.index = pos + 1;
    }
}

/// Input for creating a task.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub status: Option<String>,
    pub priority: Option<Priority>,
    pub assignee: Vec<String>,
    pub labels: Vec<String>,
    pub milestone: Option<String>,
    pub dependencies: Vec<String>,
    pub parent_task_id: Option<String>,
    pub ordinal: Option<i64>,
    pub description: Option<String>,
    pub implementation_plan: Option<String>,
    pub implementation_notes: Option<String>,
    pub acceptance_criteria: Vec<String>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Partial update for an existing task. Unset fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub status: Option<String>,
    pub priority: Patch<Priority>,
    pub milestone: Patch<String>,
    pub parent_task_id: Patch<String>,
    pub ordinal: Patch<i64>,
    pub description: Patch<String>,
    pub implementation_plan: Patch<String>,
    pub implementation_notes: Patch<String>,
    pub assignee: ListUpdate,
    pub labels: ListUpdate,
    pub dependencies: ListUpdate,
    pub acceptance_criteria: CriteriaUpdate,
}

impl TaskUpdate {
    /// True when applying the update would change nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.status.is_none()
            && self.priority.is_unchanged()
            && self.milestone.is_unchanged()
            && self.parent_task_id.is_unchanged()
            && self.ordinal.is_unchanged()
            && self.description.is_unchanged()
            && self.implementation_plan.is_unchanged()
            && self.implementation_notes.is_unchanged()
            && self.assignee.is_empty()
            && self.labels.is_empty()
            && self.dependencies.is_empty()
            && self.acceptance_criteria.is_empty()
    }
}

/// Conjunctive task filter; `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<String>,
    pub assignee: Option<String>,
    pub priority: Option<Priority>,
    pub milestone: Option<String>,
    /// Matches tasks carrying at least one of these labels.
    pub labels: Vec<String>,
    pub parent_task_id: Option<String>,
    /// Active or archived tasks only.
    pub source: Option<TaskSource>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(status) = &self.status {
            if task.status != *status {
                return false;
            }
        }
        if let Some(assignee) = &self.assignee {
            if !task.assignee.iter().any(|a| a == assignee) {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if task.priority != Some(priority) {
                return false;
            }
        }
        if let Some(milestone) = &self.milestone {
            if task.milestone_key() != normalize_key(milestone) {
                return false;
            }
        }
        if !self.labels.is_empty()
            && !task.labels.iter().any(|label| self.labels.contains(label))
        {
            return false;
        }
        if let Some(parent) = &self.parent_task_id {
            if task.parent_task_id.as_deref() != Some(parent.as_str()) {
                return false;
            }
        }
        if let Some(source) = self.source {
            if task.source != source {
                return false;
            }
        }
        true
    }
}
