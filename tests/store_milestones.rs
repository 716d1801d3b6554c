mod support;

use backlog::diagnostics::DiagnosticKind;
use backlog::milestone::MilestoneUpdate;
use backlog::task::{NewTask, Patch, TaskUpdate};
use support::{memory_project, TestProject};

fn in_milestone(title: &str, milestone: &str) -> NewTask {
    NewTask {
        milestone: Some(milestone.to_string()),
        ..NewTask::new(title)
    }
}

#[tokio::test]
async fn milestone_ids_start_at_zero() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::new()?;
    let (store, _sink) = project.store();
    store.initialize().await?;

    let first = store.create_milestone("Release 1.0", None).await?;
    let second = store
        .create_milestone("Beta", Some("Early access".into()))
        .await?;
    assert_eq!(first.id, "m-0");
    assert_eq!(second.id, "m-1");
    assert_eq!(
        project.list("backlog/milestones"),
        vec!["m-0 - release-1-0.md", "m-1 - beta.md"]
    );
    assert_eq!(store.get_config().await?.milestones, vec!["m-0", "m-1"]);

    let listed = store.list_milestones().await?;
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[1].description.as_deref(), Some("Early access"));
    Ok(())
}

#[tokio::test]
async fn membership_follows_task_milestone() -> Result<(), Box<dyn std::error::Error>> {
    let (_fs, store, _sink) = memory_project();
    store.initialize().await?;
    store.create_milestone("Release", None).await?;
    store.create_milestone("Later", None).await?;

    store.create_task(in_milestone("Feature", "m-0")).await?;
    let release = store.load_milestone("m-0").await?.ok_or("m-0 missing")?;
    assert_eq!(release.tasks, vec!["1"]);

    store
        .update_task(
            "1",
            TaskUpdate {
                milestone: Patch::Set("M-1".into()),
                ..TaskUpdate::default()
            },
        )
        .await?;
    let release = store.load_milestone("m-0").await?.ok_or("m-0 missing")?;
    let later = store.load_milestone("m-1").await?.ok_or("m-1 missing")?;
    assert!(release.tasks.is_empty());
    assert_eq!(later.tasks, vec!["1"]);

    store
        .update_task(
            "1",
            TaskUpdate {
                milestone: Patch::Clear,
                ..TaskUpdate::default()
            },
        )
        .await?;
    let later = store.load_milestone("m-1").await?.ok_or("m-1 missing")?;
    assert!(!later.contains_task("1"));
    Ok(())
}

#[tokio::test]
async fn title_references_resolve() -> Result<(), Box<dyn std::error::Error>> {
    let (_fs, store, _sink) = memory_project();
    store.initialize().await?;
    store.create_milestone("Release", None).await?;

    store.create_task(in_milestone("By title", "release")).await?;
    let release = store.load_milestone("M-0").await?.ok_or("m-0 missing")?;
    assert_eq!(release.tasks, vec!["1"]);
    Ok(())
}

#[tokio::test]
async fn unrelated_update_leaves_membership_alone() -> Result<(), Box<dyn std::error::Error>> {
    let (fs, store, _sink) = memory_project();
    store.initialize().await?;
    let milestone = store.create_milestone("Release", None).await?;
    store.create_task(in_milestone("Feature", "m-0")).await?;
    let before = fs.contents(&milestone.file_path);

    store
        .update_task(
            "1",
            TaskUpdate {
                status: Some("Done".into()),
                milestone: Patch::Set(" M-0 ".into()),
                ..TaskUpdate::default()
            },
        )
        .await?;
    assert_eq!(fs.contents(&milestone.file_path), before);
    Ok(())
}

#[tokio::test]
async fn unknown_milestone_is_reported_not_fatal() -> Result<(), Box<dyn std::error::Error>> {
    let (_fs, store, sink) = memory_project();
    store.initialize().await?;

    let task = store.create_task(in_milestone("Orphan", "m-9")).await?;
    assert_eq!(task.milestone.as_deref(), Some("m-9"));
    assert_eq!(sink.kinds(), vec![DiagnosticKind::MilestoneNotFound]);

    let buckets = store.get_tasks_by_milestone().await?;
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0].milestone, None);
    assert_eq!(buckets[0].total, 1);
    Ok(())
}

#[tokio::test]
async fn deleting_task_drops_membership() -> Result<(), Box<dyn std::error::Error>> {
    let (_fs, store, _sink) = memory_project();
    store.initialize().await?;
    store.create_milestone("Release", None).await?;
    store.create_task(in_milestone("One", "m-0")).await?;
    store.create_task(in_milestone("Two", "m-0")).await?;

    assert!(store.delete_task("1").await?);
    let release = store.load_milestone("m-0").await?.ok_or("m-0 missing")?;
    assert_eq!(release.tasks, vec!["2"]);
    Ok(())
}

#[tokio::test]
async fn rename_moves_milestone_file() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::new()?;
    let (store, _sink) = project.store();
    store.initialize().await?;
    store.create_milestone("Draft", None).await?;
    store.create_task(in_milestone("Member", "m-0")).await?;

    let renamed = store
        .update_milestone(
            "m-0",
            MilestoneUpdate {
                title: Some("Final Cut".into()),
                description: Patch::Set("Ready".into()),
            },
        )
        .await?
        .ok_or("m-0 missing")?;
    assert_eq!(renamed.tasks, vec!["1"]);
    assert_eq!(project.list("backlog/milestones"), vec!["m-0 - final-cut.md"]);

    assert!(store
        .update_milestone("m-7", MilestoneUpdate::default())
        .await?
        .is_none());
    Ok(())
}

#[tokio::test]
async fn delete_milestone_updates_config() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::new()?;
    let (store, _sink) = project.store();
    store.initialize().await?;
    store.create_milestone("Keep", None).await?;
    store.create_milestone("Drop", None).await?;
    store.create_task(in_milestone("Member", "m-1")).await?;

    assert!(store.delete_milestone("m-1").await?);
    assert!(!store.delete_milestone("m-1").await?);
    assert_eq!(project.list("backlog/milestones"), vec!["m-0 - keep.md"]);
    assert_eq!(store.get_config().await?.milestones, vec!["m-0"]);

    let task = store.get_task("1").await?.ok_or("task 1 missing")?;
    assert_eq!(task.milestone.as_deref(), Some("m-1"));

    let next = store.create_milestone("Again", None).await?;
    assert_eq!(next.id, "m-1");
    Ok(())
}

#[tokio::test]
async fn buckets_report_progress() -> Result<(), Box<dyn std::error::Error>> {
    let (_fs, store, _sink) = memory_project();
    store.initialize().await?;
    store.create_milestone("Release", None).await?;
    store.create_task(in_milestone("A", "m-0")).await?;
    store
        .create_task(NewTask {
            status: Some("Done".into()),
            ..in_milestone("B", "m-0")
        })
        .await?;
    store.create_task(NewTask::new("Loose")).await?;
    store.archive_task("2").await?;

    let buckets = store.get_tasks_by_milestone().await?;
    let summary: Vec<(Option<&str>, usize, usize, u8)> = buckets
        .iter()
        .map(|b| (b.milestone.as_deref(), b.total, b.done_count, b.progress))
        .collect();
    assert_eq!(summary, vec![(None, 1, 0, 0), (Some("m-0"), 2, 1, 50)]);
    assert_eq!(buckets[1].count_for("To Do"), 1);
    Ok(())
}
