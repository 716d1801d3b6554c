//! backlog board command: tasks grouped by status column.

use serde::Serialize;

use super::Context;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput};
use crate::sort::PageOptions;
use crate::store::StatusPage;

#[derive(Serialize)]
struct BoardOutput {
    columns: Vec<StatusPage>,
}

pub(super) async fn run(ctx: &Context, limit: Option<usize>) -> Result<()> {
    ctx.load().await?;

    let options = PageOptions {
        limit: Some(limit.unwrap_or(usize::MAX)),
        ..PageOptions::default()
    };
    let columns = ctx.store.get_tasks_by_status_paginated(&options).await?;

    let mut human = HumanOutput::new("Board");
    for column in &columns {
        human.push_summary(column.status.clone(), column.page.total.to_string());
        for task in &column.page.items {
            human.push_detail(format!("[{}] {} {}", column.status, task.id, task.title));
        }
        if column.page.has_more {
            human.push_detail(format!(
                "[{}] ... {} more",
                column.status,
                column.page.total - column.page.offset - column.page.items.len()
            ));
        }
    }
    ctx.attach_warnings(&mut human);

    emit_success(ctx.output, "board", &BoardOutput { columns }, Some(&human))
}
