//! backlog milestone command implementations.

use serde::Serialize;

use super::{Context, MilestoneCommands};
use crate::error::{Error, Result};
use crate::milestone::{Milestone, MilestoneBucket, MilestoneUpdate};
use crate::output::{emit_success, HumanOutput};
use crate::task::Patch;

#[derive(Serialize)]
struct MilestoneListOutput {
    milestones: Vec<Milestone>,
    buckets: Vec<MilestoneBucket>,
}

#[derive(Serialize)]
struct MilestoneShowOutput {
    milestone: Milestone,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<MilestoneBucket>,
}

#[derive(Serialize)]
struct MilestoneRemovedOutput {
    id: String,
    removed: bool,
}

pub(super) async fn run(ctx: &Context, command: MilestoneCommands) -> Result<()> {
    ctx.load().await?;

    match command {
        MilestoneCommands::New { title, description } => {
            let milestone = ctx.store.create_milestone(&title, description).await?;

            let mut human = HumanOutput::new("Milestone created");
            human.push_summary("ID", milestone.id.clone());
            human.push_summary("Title", milestone.title.clone());
            human.push_summary("File", milestone.file_path.clone());
            human.push_next_step(format!(
                "backlog task new \"<title>\" --milestone {}",
                milestone.id
            ));
            emit_success(ctx.output, "milestone new", &milestone, Some(&human))
        }
        MilestoneCommands::List => {
            let milestones = ctx.store.list_milestones().await?;
            let buckets = ctx.store.get_tasks_by_milestone().await?;

            let mut human = HumanOutput::new("Milestones");
            human.push_summary("Total", milestones.len().to_string());
            for bucket in &buckets {
                let name = match &bucket.milestone {
                    Some(id) => format!("{id} {}", bucket.label),
                    None => bucket.label.clone(),
                };
                human.push_detail(format!(
                    "{name}: {}/{} done ({}%)",
                    bucket.done_count, bucket.total, bucket.progress
                ));
            }
            ctx.attach_warnings(&mut human);

            let output = MilestoneListOutput {
                milestones,
                buckets,
            };
            emit_success(ctx.output, "milestone list", &output, Some(&human))
        }
        MilestoneCommands::Show { id } => {
            let milestone = ctx
                .store
                .load_milestone(&id)
                .await?
                .ok_or_else(|| Error::MilestoneNotFound(id.clone()))?;
            let progress = ctx
                .store
                .get_tasks_by_milestone()
                .await?
                .into_iter()
                .find(|bucket| bucket.milestone.as_deref() == Some(milestone.id.as_str()));

            let mut human = HumanOutput::new(format!("Milestone {}: {}", milestone.id, milestone.title));
            human.push_summary("Tasks", milestone.tasks.join(", "));
            if let Some(bucket) = &progress {
                human.push_summary("Progress", format!("{}%", bucket.progress));
                for (status, count) in &bucket.status_counts {
                    human.push_detail(format!("{status}: {count}"));
                }
            }
            if let Some(description) = &milestone.description {
                human.push_detail(description.clone());
            }

            let output = MilestoneShowOutput {
                milestone,
                progress,
            };
            emit_success(ctx.output, "milestone show", &output, Some(&human))
        }
        MilestoneCommands::Edit {
            id,
            title,
            description,
            clear_description,
        } => {
            let description = match (description, clear_description) {
                (Some(text), _) => Patch::Set(text),
                (None, true) => Patch::Clear,
                (None, false) => Patch::Unchanged,
            };
            let milestone = ctx
                .store
                .update_milestone(&id, MilestoneUpdate { title, description })
                .await?
                .ok_or_else(|| Error::MilestoneNotFound(id.clone()))?;

            let mut human = HumanOutput::new("Milestone updated");
            human.push_summary("ID", milestone.id.clone());
            human.push_summary("Title", milestone.title.clone());
            human.push_summary("File", milestone.file_path.clone());
            emit_success(ctx.output, "milestone edit", &milestone, Some(&human))
        }
        MilestoneCommands::Rm { id } => {
            if !ctx.store.delete_milestone(&id).await? {
                return Err(Error::MilestoneNotFound(id));
            }

            let mut human = HumanOutput::new("Milestone deleted");
            human.push_summary("ID", id.clone());
            emit_success(
                ctx.output,
                "milestone rm",
                &MilestoneRemovedOutput { id, removed: true },
                Some(&human),
            )
        }
    }
}
