//! backlog init command implementation
//!
//! Creates `backlog/config.yml` and the task, completed and milestone
//! directories under the project root.

use serde::Serialize;

use super::Context;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput};

#[derive(Serialize)]
struct InitOutput {
    root: String,
    project_name: String,
    statuses: Vec<String>,
    created: bool,
}

pub(super) async fn run(ctx: &Context, name: Option<String>) -> Result<()> {
    let existed = ctx.store.is_project().await?;
    let name = name.unwrap_or_else(|| {
        ctx.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    let config = ctx.store.init_project(&name).await?;

    let output = InitOutput {
        root: ctx.store.root().to_string(),
        project_name: config.project_name.clone(),
        statuses: config.statuses.clone(),
        created: !existed,
    };

    let header = if existed {
        "Backlog already initialized"
    } else {
        "Backlog initialized"
    };
    let mut human = HumanOutput::new(header);
    human.push_summary("Project", config.project_name);
    human.push_summary("Statuses", config.statuses.join(", "));
    human.push_next_step("backlog task new \"<title>\"");

    emit_success(ctx.output, "init", &output, Some(&human))
}
