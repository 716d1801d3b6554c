mod support;

use backlog::diagnostics::DiagnosticKind;
use backlog::sort::{PageOptions, SortField};
use backlog::task::{NewTask, Priority, TaskFilter, TaskSource};
use backlog::Error;
use support::{ids, memory_project, task_file, TestProject};

/// Every `.md` path under `tasks/` and `completed/`, as a caller would list them.
fn listed_paths(project: &TestProject) -> Vec<String> {
    let root = project.path().to_string_lossy().replace('\\', "/");
    let mut paths = Vec::new();
    for dir in ["backlog/tasks", "backlog/completed"] {
        for name in project.list(dir) {
            paths.push(format!("{root}/{dir}/{name}"));
        }
    }
    paths
}

async fn seeded_project() -> Result<TestProject, Box<dyn std::error::Error>> {
    let project = TestProject::new()?;
    let (store, _sink) = project.store();
    store.initialize().await?;
    store.create_milestone("Release", None).await?;
    store
        .create_task(NewTask {
            priority: Some(Priority::High),
            labels: vec!["api".into()],
            assignee: vec!["@ana".into()],
            milestone: Some("m-0".into()),
            description: Some("First task".into()),
            acceptance_criteria: vec!["Done right".into()],
            ..NewTask::new("Alpha")
        })
        .await?;
    store
        .create_task(NewTask {
            status: Some("In Progress".into()),
            ordinal: Some(1),
            dependencies: vec!["1".into()],
            implementation_notes: Some("Halfway".into()),
            ..NewTask::new("Beta")
        })
        .await?;
    store
        .create_task(NewTask {
            parent_task_id: Some("1".into()),
            ..NewTask::new("Alpha child")
        })
        .await?;
    store.create_task(NewTask::new("Gamma")).await?;
    store.archive_task("4").await?;
    Ok(project)
}

#[tokio::test]
async fn lazy_and_eager_agree() -> Result<(), Box<dyn std::error::Error>> {
    let project = seeded_project().await?;

    let (eager, _sink) = project.store();
    eager.initialize().await?;
    let expected = eager.list_tasks(&TaskFilter::default()).await?;
    assert_eq!(expected.len(), 4);

    let (lazy, _sink) = project.store();
    let report = lazy.initialize_lazy(&listed_paths(&project)).await?;
    assert_eq!(report.loaded, 4);

    let wanted = ids(&expected);
    let loaded = lazy.load_tasks(&wanted).await?;
    assert_eq!(ids(&loaded), wanted);
    for (lazy_task, eager_task) in loaded.iter().zip(&expected) {
        assert!(
            lazy_task.same_structured_fields(eager_task),
            "{lazy_task:#?} != {eager_task:#?}"
        );
        assert_eq!(lazy_task.source, eager_task.source);
    }

    let eager_groups = eager.get_tasks_by_status().await?;
    let lazy_groups = lazy.get_tasks_by_status().await?;
    for (status, tasks) in eager_groups.iter() {
        assert_eq!(lazy_groups.get(status).map(ids), Some(ids(tasks)), "{status}");
    }
    Ok(())
}

#[tokio::test]
async fn lazy_index_reads_nothing_up_front() -> Result<(), Box<dyn std::error::Error>> {
    let project = seeded_project().await?;
    let (lazy, _sink) = project.store();
    lazy.initialize_lazy(&listed_paths(&project)).await?;

    assert!(lazy.get_task("1").await?.is_none());
    let task = lazy.load_task("1").await?.ok_or("task 1 missing")?;
    assert_eq!(task.title, "Alpha");
    assert!(lazy.get_task("1").await?.is_some());
    assert!(lazy.load_task("99").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn load_tasks_keeps_request_order() -> Result<(), Box<dyn std::error::Error>> {
    let project = seeded_project().await?;
    let (lazy, _sink) = project.store();
    lazy.initialize_lazy(&listed_paths(&project)).await?;

    let loaded = lazy.load_tasks(&["4", "missing", "2", "1.1"]).await?;
    assert_eq!(ids(&loaded), vec!["4", "2", "1.1"]);
    assert_eq!(loaded[0].source, TaskSource::Completed);
    Ok(())
}

#[tokio::test]
async fn id_paging_reads_only_the_page() -> Result<(), Box<dyn std::error::Error>> {
    let (fs, store, _sink) = memory_project();
    let mut paths = Vec::new();
    for (n, title) in ["One", "Two", "Three"].iter().enumerate() {
        let path = format!("/work/backlog/tasks/{} - {title}.md", n + 1);
        fs.insert(&path, &task_file("To Do", title));
        paths.push(path);
    }
    fs.insert("/work/backlog/completed/9 - Old.md", &task_file("Done", "Old"));
    paths.push("/work/backlog/completed/9 - Old.md".to_string());

    store.initialize_lazy(&paths).await?;
    let options = PageOptions {
        sort_by: Some(SortField::Id),
        ..PageOptions::with_limit(2)
    };
    let page = store
        .load_more_for_source(TaskSource::Local, 0, &options)
        .await?;
    assert_eq!(ids(&page.items), vec!["1", "2"]);
    assert_eq!(page.total, 3);
    assert!(page.has_more);
    assert!(store.get_task("3").await?.is_none());
    assert!(store.get_task("9").await?.is_none());

    let rest = store
        .load_more_for_source(TaskSource::Local, 2, &options)
        .await?;
    assert_eq!(ids(&rest.items), vec!["3"]);
    assert!(!rest.has_more);
    Ok(())
}

#[tokio::test]
async fn lazy_index_ignores_foreign_paths() -> Result<(), Box<dyn std::error::Error>> {
    let (fs, store, sink) = memory_project();
    fs.insert("/work/backlog/tasks/1 - A.md", &task_file("To Do", "A"));
    fs.insert("/work/backlog/tasks/1 - B.md", &task_file("To Do", "B"));

    let report = store
        .initialize_lazy(&[
            "/work/backlog/tasks/1 - A.md",
            "/work/backlog/tasks/1 - B.md",
            "/work/backlog/config.yml",
            "/work/README.md",
        ])
        .await?;
    assert_eq!(report.loaded, 1);
    assert_eq!(report.duplicates.len(), 1);
    assert_eq!(sink.kinds(), vec![DiagnosticKind::DuplicateId]);

    let task = store.load_task("1").await?.ok_or("task 1 missing")?;
    assert_eq!(task.title, "B");
    Ok(())
}

#[tokio::test]
async fn lazy_create_continues_numbering() -> Result<(), Box<dyn std::error::Error>> {
    let (fs, store, _sink) = memory_project();
    fs.insert("/work/backlog/tasks/7 - Seven.md", &task_file("To Do", "Seven"));
    store
        .initialize_lazy(&["/work/backlog/tasks/7 - Seven.md"])
        .await?;

    let task = store.create_task(NewTask::new("Eight")).await?;
    assert_eq!(task.id, "8");
    Ok(())
}

#[tokio::test]
async fn lazy_missing_file_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    let (_fs, store, sink) = memory_project();
    store
        .initialize_lazy(&["/work/backlog/tasks/3 - Gone.md"])
        .await?;

    assert!(store.load_task("3").await?.is_none());
    assert_eq!(sink.kinds(), vec![DiagnosticKind::ReadFailure]);
    Ok(())
}

#[tokio::test]
async fn io_failure_is_not_reported_as_missing() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::new()?;
    std::fs::create_dir_all(project.path().join("backlog/tasks/1 - Folder.md"))?;
    let (lazy, _sink) = project.store();
    lazy.initialize_lazy(&listed_paths(&project)).await?;

    assert!(matches!(lazy.load_task("1").await, Err(Error::Io(_))));
    assert!(matches!(lazy.archive_task("1").await, Err(Error::Io(_))));
    assert!(matches!(lazy.delete_task("1").await, Err(Error::Io(_))));

    let batch = lazy.load_tasks(&["1"]).await?;
    assert!(batch.is_empty());
    Ok(())
}

#[tokio::test]
async fn lazy_init_requires_project() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::empty()?;
    let (store, _sink) = project.store();
    let err = store
        .initialize_lazy(&Vec::<String>::new())
        .await
        .err()
        .ok_or("expected error")?;
    assert!(matches!(err, Error::NotAProject(_)));
    Ok(())
}
