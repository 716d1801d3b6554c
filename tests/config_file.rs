mod support;

use backlog::config::{parse_config, BacklogConfig};
use backlog::task::NewTask;
use support::TestProject;

const HAND_WRITTEN: &str = r#"# edited by hand
projectName: 'Rocket'
default_status: "in review"
statuses: ["Backlog", "In Review", "Shipped"]
labels: [frontend, backend]
date_format: yyyy-mm-dd hh:mm
auto_commit: false
"#;

#[tokio::test]
async fn hand_written_config_drives_new_tasks() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::new()?;
    project.write_file("backlog/config.yml", HAND_WRITTEN)?;

    let (store, _sink) = project.store();
    store.initialize().await?;
    let config = store.get_config().await?;
    assert_eq!(config.project_name, "Rocket");
    assert_eq!(config.labels, vec!["frontend", "backend"]);
    assert_eq!(config.auto_commit, Some(false));

    let task = store.create_task(NewTask::new("Review me")).await?;
    assert_eq!(task.status, "In Review");
    // "yyyy-mm-dd hh:mm" carries a time component.
    assert_eq!(task.created_date.len(), "2025-01-01 10:00".len());
    Ok(())
}

#[tokio::test]
async fn saved_config_reads_back() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::empty()?;
    let (store, _sink) = project.store();
    store.init_project("Round Trip").await?;
    store.initialize().await?;

    let mut config = store.get_config().await?;
    config.default_status = Some("Done".into());
    config.labels = vec!["ops".into()];
    config.default_port = Some(6420);
    store.save_config(&config).await?;

    let text = project.read_file("backlog/config.yml")?;
    assert_eq!(parse_config(&text), config);

    let (fresh, _sink) = project.store();
    fresh.initialize().await?;
    assert_eq!(fresh.get_config().await?, config);
    Ok(())
}

#[tokio::test]
async fn garbage_config_still_opens() -> Result<(), Box<dyn std::error::Error>> {
    let project = TestProject::new()?;
    project.write_file("backlog/config.yml", "::::\nnot yaml at all\nstatuses: []\n")?;

    let (store, _sink) = project.store();
    store.initialize().await?;
    let config = store.get_config().await?;
    assert_eq!(config.statuses, BacklogConfig::default().statuses);
    Ok(())
}
