//! backlog task command implementations.

use serde::Serialize;

use super::{Context, TaskCommands};
use crate::error::{Error, Result};
use crate::output::{emit_success, HumanOutput};
use crate::sort::{PageOptions, SortDirection, SortField};
use crate::task::{
    CriteriaUpdate, ListUpdate, NewTask, Patch, Priority, Task, TaskFilter, TaskSource, TaskUpdate,
};

#[derive(Serialize)]
struct TaskListOutput {
    total: usize,
    offset: usize,
    has_more: bool,
    tasks: Vec<Task>,
}

#[derive(Serialize)]
struct TaskRemovedOutput {
    id: String,
    removed: bool,
}

pub(super) async fn run(ctx: &Context, command: TaskCommands) -> Result<()> {
    ctx.load().await?;

    match command {
        TaskCommands::New {
            title,
            status,
            priority,
            assignees,
            labels,
            milestone,
            dependencies,
            parent,
            ordinal,
            description,
            plan,
            notes,
            criteria,
        } => {
            let input = NewTask {
                title,
                status,
                priority: parse_priority(priority.as_deref())?,
                assignee: assignees,
                labels,
                milestone,
                dependencies,
                parent_task_id: parent,
                ordinal,
                description,
                implementation_plan: plan,
                implementation_notes: notes,
                acceptance_criteria: criteria,
            };
            let task = ctx.store.create_task(input).await?;

            let mut human = HumanOutput::new("Task created");
            human.push_summary("ID", task.id.clone());
            human.push_summary("Status", task.status.clone());
            human.push_summary("File", task.file_path.clone());
            ctx.attach_warnings(&mut human);
            emit_success(ctx.output, "task new", &task, Some(&human))
        }
        TaskCommands::List {
            status,
            assignee,
            priority,
            milestone,
            labels,
            parent,
            source,
            limit,
            offset,
            sort,
            direction,
        } => {
            let filter = TaskFilter {
                status,
                assignee,
                priority: parse_priority(priority.as_deref())?,
                milestone,
                labels,
                parent_task_id: parent,
                source: parse_source(source.as_deref())?,
            };
            let options = PageOptions {
                limit: Some(limit.unwrap_or(usize::MAX)),
                offset,
                sort_by: sort
                    .as_deref()
                    .map(str::parse::<SortField>)
                    .transpose()
                    .map_err(Error::InvalidArgument)?,
                direction: direction
                    .parse::<SortDirection>()
                    .map_err(Error::InvalidArgument)?,
            };

            let page = ctx.store.list_tasks_paginated(&filter, &options).await?;

            let mut human = HumanOutput::new("Tasks");
            human.push_summary("Total", page.total.to_string());
            for task in &page.items {
                human.push_detail(task_line(task));
            }
            ctx.attach_warnings(&mut human);

            let output = TaskListOutput {
                total: page.total,
                offset: page.offset,
                has_more: page.has_more,
                tasks: page.items,
            };
            emit_success(ctx.output, "task list", &output, Some(&human))
        }
        TaskCommands::Show { id } => {
            let task = ctx
                .store
                .load_task(&id)
                .await?
                .ok_or_else(|| Error::TaskNotFound(id.clone()))?;

            let mut human = HumanOutput::new(format!("Task {}: {}", task.id, task.title));
            push_task_summary(&mut human, &task);
            emit_success(ctx.output, "task show", &task, Some(&human))
        }
        TaskCommands::Edit {
            id,
            title,
            status,
            priority,
            clear_priority,
            milestone,
            clear_milestone,
            parent,
            clear_parent,
            ordinal,
            clear_ordinal,
            description,
            clear_description,
            plan,
            clear_plan,
            notes,
            clear_notes,
            labels,
            add_labels,
            remove_labels,
            assignees,
            add_assignees,
            remove_assignees,
            deps,
            add_deps,
            remove_deps,
            add_criteria,
            remove_criteria,
            check_criteria,
            uncheck_criteria,
        } => {
            let update = TaskUpdate {
                title,
                status,
                priority: patch(parse_priority(priority.as_deref())?, clear_priority),
                milestone: patch(milestone, clear_milestone),
                parent_task_id: patch(parent, clear_parent),
                ordinal: patch(ordinal, clear_ordinal),
                description: patch(description, clear_description),
                implementation_plan: patch(plan, clear_plan),
                implementation_notes: patch(notes, clear_notes),
                assignee: ListUpdate {
                    replace: assignees,
                    add: add_assignees,
                    remove: remove_assignees,
                },
                labels: ListUpdate {
                    replace: labels,
                    add: add_labels,
                    remove: remove_labels,
                },
                dependencies: ListUpdate {
                    replace: deps,
                    add: add_deps,
                    remove: remove_deps,
                },
                acceptance_criteria: CriteriaUpdate {
                    replace: None,
                    add: add_criteria,
                    remove: remove_criteria,
                    check: check_criteria,
                    uncheck: uncheck_criteria,
                },
            };
            let task = ctx
                .store
                .update_task(&id, update)
                .await?
                .ok_or_else(|| Error::TaskNotFound(id.clone()))?;

            let mut human = HumanOutput::new("Task updated");
            push_task_summary(&mut human, &task);
            ctx.attach_warnings(&mut human);
            emit_success(ctx.output, "task edit", &task, Some(&human))
        }
        TaskCommands::Archive { id } => {
            let task = ctx
                .store
                .archive_task(&id)
                .await?
                .ok_or_else(|| Error::TaskNotFound(format!("{id} (no active task)")))?;

            let mut human = HumanOutput::new("Task archived");
            human.push_summary("ID", task.id.clone());
            human.push_summary("File", task.file_path.clone());
            emit_success(ctx.output, "task archive", &task, Some(&human))
        }
        TaskCommands::Restore { id } => {
            let task = ctx
                .store
                .restore_task(&id)
                .await?
                .ok_or_else(|| Error::TaskNotFound(format!("{id} (no archived task)")))?;

            let mut human = HumanOutput::new("Task restored");
            human.push_summary("ID", task.id.clone());
            human.push_summary("File", task.file_path.clone());
            emit_success(ctx.output, "task restore", &task, Some(&human))
        }
        TaskCommands::Rm { id } => {
            if !ctx.store.delete_task(&id).await? {
                return Err(Error::TaskNotFound(id));
            }

            let mut human = HumanOutput::new("Task deleted");
            human.push_summary("ID", id.clone());
            ctx.attach_warnings(&mut human);
            emit_success(
                ctx.output,
                "task rm",
                &TaskRemovedOutput { id, removed: true },
                Some(&human),
            )
        }
    }
}

fn parse_priority(raw: Option<&str>) -> Result<Option<Priority>> {
    raw.map(str::parse::<Priority>)
        .transpose()
        .map_err(Error::InvalidArgument)
}

fn parse_source(raw: Option<&str>) -> Result<Option<TaskSource>> {
    match raw.map(|value| value.trim().to_ascii_lowercase()) {
        None => Ok(None),
        Some(value) => match value.as_str() {
            "local" | "active" | "tasks" => Ok(Some(TaskSource::Local)),
            "completed" | "archived" => Ok(Some(TaskSource::Completed)),
            other => Err(Error::InvalidArgument(format!(
                "unknown source '{other}' (expected local|completed)"
            ))),
        },
    }
}

fn patch<T>(value: Option<T>, clear: bool) -> Patch<T> {
    match (value, clear) {
        (Some(value), _) => Patch::Set(value),
        (None, true) => Patch::Clear,
        (None, false) => Patch::Unchanged,
    }
}

fn task_line(task: &Task) -> String {
    let mut line = format!("[{}] {} {}", task.status, task.id, task.title);
    if let Some(priority) = task.priority {
        line.push_str(&format!(" ({priority})"));
    }
    if let Some(milestone) = &task.milestone {
        line.push_str(&format!(" (milestone: {milestone})"));
    }
    line
}

fn push_task_summary(human: &mut HumanOutput, task: &Task) {
    human.push_summary("ID", task.id.clone());
    human.push_summary("Status", task.status.clone());
    if let Some(priority) = task.priority {
        human.push_summary("Priority", priority.to_string());
    }
    if !task.assignee.is_empty() {
        human.push_summary("Assignee", task.assignee.join(", "));
    }
    if !task.labels.is_empty() {
        human.push_summary("Labels", task.labels.join(", "));
    }
    if let Some(milestone) = &task.milestone {
        human.push_summary("Milestone", milestone.clone());
    }
    if let Some(parent) = &task.parent_task_id {
        human.push_summary("Parent", parent.clone());
    }
    human.push_summary("Created", task.created_date.clone());
    if let Some(updated) = &task.updated_date {
        human.push_summary("Updated", updated.clone());
    }
    human.push_summary("File", task.file_path.clone());
    if let Some(description) = &task.description {
        human.push_detail(description.clone());
    }
    for item in &task.acceptance_criteria {
        let mark = if item.checked { "x" } else { " " };
        human.push_detail(format!("[{mark}] #{} {}", item.index, item.text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_prefers_value_over_clear() {
        assert_eq!(patch(Some(1), true), Patch::Set(1));
        assert_eq!(patch::<i32>(None, true), Patch::Clear);
        assert_eq!(patch::<i32>(None, false), Patch::Unchanged);
    }

    #[test]
    fn source_names() {
        assert_eq!(parse_source(Some("Archived")).unwrap(), Some(TaskSource::Completed));
        assert_eq!(parse_source(None).unwrap(), None);
        assert!(parse_source(Some("remote")).is_err());
    }
}
