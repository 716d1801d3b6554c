//! Milestone entities and progress summaries.
//!
//! A milestone file carries the authoritative list of member task ids. Each
//! task also names its milestone in its own file; the store keeps the two in
//! sync. Summaries group tasks by the task-side reference.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::paths::milestone_number;
use crate::task::{normalize_key, Task};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tasks: Vec<String>,
    pub file_path: String,
}

impl Milestone {
    pub fn contains_task(&self, task_id: &str) -> bool {
        self.tasks.iter().any(|id| id == task_id)
    }

    /// Whether `reference` names this milestone by id or title.
    pub fn matches_reference(&self, reference: &str) -> bool {
        let Some(key) = normalize_key(reference) else {
            return false;
        };
        normalize_key(&self.id).as_deref() == Some(key.as_str())
            || normalize_key(&self.title).as_deref() == Some(key.as_str())
    }
}

/// Partial update for a milestone.
#[derive(Debug, Clone, Default)]
pub struct MilestoneUpdate {
    pub title: Option<String>,
    pub description: crate::task::Patch<String>,
}

/// Order milestones by their numeric id, unknown shapes last.
pub fn sort_milestones(milestones: &mut [Milestone]) {
    milestones.sort_by(|a, b| {
        let left = milestone_number(&a.id).unwrap_or(u64::MAX);
        let right = milestone_number(&b.id).unwrap_or(u64::MAX);
        left.cmp(&right).then_with(|| a.id.cmp(&b.id))
    });
}

/// Resolve a task-side reference to a milestone: id match first, then title.
pub fn resolve_reference<'a>(milestones: &'a [Milestone], reference: &str) -> Option<&'a Milestone> {
    let key = normalize_key(reference)?;
    milestones
        .iter()
        .find(|m| normalize_key(&m.id).as_deref() == Some(key.as_str()))
        .or_else(|| {
            milestones
                .iter()
                .find(|m| normalize_key(&m.title).as_deref() == Some(key.as_str()))
        })
}

/// Status text counts as done when it mentions "done" or "complete".
pub fn is_done_status(status: &str) -> bool {
    let lower = status.to_lowercase();
    lower.contains("done") || lower.contains("complete")
}

/// Tasks sharing a milestone reference with per-status counts.
#[derive(Debug, Clone, Serialize)]
pub struct MilestoneBucket {
    /// Milestone id, or `None` for the "no milestone" bucket.
    pub milestone: Option<String>,
    pub label: String,
    pub tasks: Vec<Task>,
    /// One entry per configured status in configured order, then any
    /// unconfigured statuses in first-seen order.
    pub status_counts: Vec<(String, usize)>,
    pub total: usize,
    pub done_count: usize,
    /// Rounded percentage of done tasks; 0 for an empty bucket.
    pub progress: u8,
}

impl MilestoneBucket {
    fn new(milestone: Option<String>, label: String, statuses: &[String]) -> Self {
        Self {
            milestone,
            label,
            tasks: Vec::new(),
            status_counts: statuses.iter().map(|s| (s.clone(), 0)).collect(),
            total: 0,
            done_count: 0,
            progress: 0,
        }
    }

    fn push(&mut self, task: Task) {
        match self.status_counts.iter_mut().find(|(s, _)| *s == task.status) {
            Some((_, count)) => *count += 1,
            None => self.status_counts.push((task.status.clone(), 1)),
        }
        if is_done_status(&task.status) {
            self.done_count += 1;
        }
        self.total += 1;
        self.tasks.push(task);
    }

    fn finish(&mut self) {
        crate::sort::sort_tasks(&mut self.tasks);
        self.progress = if self.total == 0 {
            0
        } else {
            ((self.done_count as f64 / self.total as f64) * 100.0).round() as u8
        };
    }

    pub fn count_for(&self, status: &str) -> usize {
        self.status_counts
            .iter()
            .find(|(s, _)| s == status)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }
}

/// Label for the bucket of tasks without a resolvable milestone.
pub const NO_MILESTONE_LABEL: &str = "No milestone";

/// Partition tasks into milestone buckets.
///
/// The "no milestone" bucket is always first and also collects tasks whose
/// reference does not resolve to a known milestone. Every known milestone
/// gets a bucket, including empty ones.
pub fn milestone_buckets(
    tasks: Vec<Task>,
    milestones: &[Milestone],
    statuses: &[String],
) -> Vec<MilestoneBucket> {
    let mut buckets = vec![MilestoneBucket::new(
        None,
        NO_MILESTONE_LABEL.to_string(),
        statuses,
    )];
    let mut by_id: HashMap<String, usize> = HashMap::new();
    for milestone in milestones {
        by_id.insert(milestone.id.clone(), buckets.len());
        buckets.push(MilestoneBucket::new(
            Some(milestone.id.clone()),
            milestone.title.clone(),
            statuses,
        ));
    }

    for task in tasks {
        let slot = task
            .milestone
            .as_deref()
            .and_then(|reference| resolve_reference(milestones, reference))
            .and_then(|milestone| by_id.get(&milestone.id).copied())
            .unwrap_or(0);
        buckets[slot].push(task);
    }

    for bucket in &mut buckets {
        bucket.finish();
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn milestone(id: &str, title: &str) -> Milestone {
        Milestone {
            id: id.to_string(),
            title: title.to_string(),
            description: None,
            tasks: Vec::new(),
            file_path: String::new(),
        }
    }

    fn task(id: &str, status: &str, milestone: Option<&str>) -> Task {
        let mut task = Task::new(id, format!("Task {id}"), status, "2025-01-01");
        task.milestone = milestone.map(str::to_string);
        task
    }

    fn statuses() -> Vec<String> {
        vec!["To Do".into(), "In Progress".into(), "Done".into()]
    }

    #[test]
    fn done_heuristic_is_substring_based() {
        assert!(is_done_status("Done"));
        assert!(is_done_status("completed"));
        assert!(is_done_status("Not Done Yet"));
        assert!(!is_done_status("In Progress"));
    }

    #[test]
    fn buckets_group_by_normalized_reference() {
        let milestones = vec![milestone("m-0", "Alpha"), milestone("m-1", "Beta")];
        let tasks = vec![
            task("1", "Done", Some(" M-0 ")),
            task("2", "To Do", Some("m-0")),
            task("3", "Done", Some("alpha")),
            task("4", "Blocked", None),
            task("5", "Done", Some("m-9")),
        ];

        let buckets = milestone_buckets(tasks, &milestones, &statuses());
        assert_eq!(buckets.len(), 3);

        let none = &buckets[0];
        assert_eq!(none.milestone, None);
        assert_eq!(none.total, 2);
        assert_eq!(none.count_for("Blocked"), 1);
        assert_eq!(none.count_for("To Do"), 0);
        assert_eq!(none.status_counts.len(), 4);
        assert_eq!(none.progress, 50);

        let alpha = &buckets[1];
        assert_eq!(alpha.milestone.as_deref(), Some("m-0"));
        assert_eq!(alpha.total, 3);
        assert_eq!(alpha.done_count, 2);
        assert_eq!(alpha.progress, 67);

        let beta = &buckets[2];
        assert_eq!(beta.total, 0);
        assert_eq!(beta.progress, 0);
        assert_eq!(beta.status_counts.len(), 3);
    }

    #[test]
    fn milestones_sort_numerically() {
        let mut list = vec![milestone("m-10", "x"), milestone("m-2", "y"), milestone("odd", "z")];
        sort_milestones(&mut list);
        let ids: Vec<&str> = list.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m-2", "m-10", "odd"]);
    }
}
