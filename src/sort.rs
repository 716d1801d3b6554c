//! Ordering, grouping and pagination over in-memory task collections.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::paths::compare_task_ids;
use crate::task::{Priority, Task};

/// Default page size for paginated queries.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Canonical task order:
/// 1. `ordinal` ascending; tasks with an ordinal come before tasks without
/// 2. priority high, medium, low, unset
/// 3. `created_date` descending (newest first)
pub fn compare_tasks(a: &Task, b: &Task) -> Ordering {
    let by_ordinal = match (a.ordinal, b.ordinal) {
        (Some(left), Some(right)) => left.cmp(&right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_ordinal
        .then_with(|| Priority::rank(a.priority).cmp(&Priority::rank(b.priority)))
        .then_with(|| b.created_date.cmp(&a.created_date))
}

/// Sort in canonical order (stable).
pub fn sort_tasks(tasks: &mut [Task]) {
    tasks.sort_by(compare_tasks);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Title,
    CreatedDate,
    #[default]
    Priority,
    Ordinal,
    Id,
}

impl std::str::FromStr for SortField {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "title" => Ok(SortField::Title),
            "created_date" | "createddate" | "created" => Ok(SortField::CreatedDate),
            "priority" => Ok(SortField::Priority),
            "ordinal" => Ok(SortField::Ordinal),
            "id" => Ok(SortField::Id),
            other => Err(format!(
                "unknown sort field '{other}' (expected title|created_date|priority|ordinal|id)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl std::str::FromStr for SortDirection {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(format!("unknown sort direction '{other}' (expected asc|desc)")),
        }
    }
}

/// Sort by a single field. Title, created date and id bypass the canonical
/// comparator; priority and ordinal use it (reversed for `Desc`).
pub fn sort_tasks_by(tasks: &mut [Task], field: SortField, direction: SortDirection) {
    let compare: fn(&Task, &Task) -> Ordering = match field {
        SortField::Title => |a, b| a.title.cmp(&b.title),
        SortField::CreatedDate => |a, b| a.created_date.cmp(&b.created_date),
        SortField::Id => |a, b| compare_task_ids(&a.id, &b.id),
        SortField::Priority | SortField::Ordinal => compare_tasks,
    };
    match direction {
        SortDirection::Asc => tasks.sort_by(compare),
        SortDirection::Desc => tasks.sort_by(|a, b| compare(b, a)),
    }
}

/// Tasks grouped by status, in column order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusGroups {
    groups: Vec<(String, Vec<Task>)>,
}

impl StatusGroups {
    pub fn get(&self, status: &str) -> Option<&[Task]> {
        self.groups
            .iter()
            .find(|(key, _)| key == status)
            .map(|(_, tasks)| tasks.as_slice())
    }

    pub fn statuses(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Task])> {
        self.groups
            .iter()
            .map(|(key, tasks)| (key.as_str(), tasks.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn into_inner(self) -> Vec<(String, Vec<Task>)> {
        self.groups
    }
}

/// Group tasks by status. Every configured status gets a (possibly empty)
/// group in configured order; unconfigured statuses are appended in
/// first-seen order. Each group is in canonical order.
pub fn group_tasks_by_status(tasks: Vec<Task>, statuses: &[String]) -> StatusGroups {
    let mut groups: Vec<(String, Vec<Task>)> =
        statuses.iter().map(|s| (s.clone(), Vec::new())).collect();

    for task in tasks {
        match groups.iter_mut().find(|(key, _)| *key == task.status) {
            Some((_, bucket)) => bucket.push(task),
            None => groups.push((task.status.clone(), vec![task])),
        }
    }

    for (_, bucket) in &mut groups {
        sort_tasks(bucket);
    }
    StatusGroups { groups }
}

/// Paging and ordering options for paginated queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageOptions {
    pub limit: Option<usize>,
    pub offset: usize,
    pub sort_by: Option<SortField>,
    pub direction: SortDirection,
}

impl PageOptions {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    /// Order a collection the way these options ask for.
    pub fn order(&self, tasks: &mut [Task]) {
        match self.sort_by {
            Some(field) => sort_tasks_by(tasks, field, self.direction),
            None => sort_tasks(tasks),
        }
    }
}

/// One page of a larger ordered collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub has_more: bool,
    pub offset: usize,
    pub limit: usize,
}

/// Slice `items` starting at `offset`.
pub fn paginate<T>(items: Vec<T>, offset: usize, limit: usize) -> Page<T> {
    let total = items.len();
    let page: Vec<T> = items.into_iter().skip(offset).take(limit).collect();
    Page {
        has_more: offset.saturating_add(page.len()) < total,
        items: page,
        total,
        offset,
        limit,
    }
}
