//! Command-line interface for backlog
//!
//! This module defines the CLI structure using clap derive macros.
//! Each command group is implemented in its own submodule.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::diagnostics::{CollectingSink, DiagnosticDestination, DiagnosticSink};
use crate::error::Result;
use crate::output::{HumanOutput, OutputOptions};
use crate::store::{Store, StoreOptions};

mod board;
mod init;
mod milestone;
mod task;

/// backlog - markdown task tracking
///
/// Tasks, milestones and project settings live as plain files under
/// `backlog/` in the project directory.
#[derive(Parser, Debug)]
#[command(name = "backlog")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(long, global = true, env = "BACKLOG_ROOT")]
    pub root: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Write diagnostics as JSON lines to a file ("-" for stderr)
    #[arg(long, global = true, env = "BACKLOG_DIAGNOSTICS")]
    pub diagnostics: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the backlog directory layout and config
    Init {
        /// Project name (defaults to the directory name)
        name: Option<String>,
    },

    /// Task management
    #[command(subcommand)]
    Task(TaskCommands),

    /// Show tasks grouped by status
    Board {
        /// Tasks per column
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Milestone management
    #[command(subcommand)]
    Milestone(MilestoneCommands),
}

/// Task subcommands
#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Create a task
    New {
        /// Task title
        title: String,

        /// Initial status (must be a configured status)
        #[arg(long)]
        status: Option<String>,

        /// Priority: high, medium, low
        #[arg(long)]
        priority: Option<String>,

        /// Assignee (repeatable)
        #[arg(long = "assignee")]
        assignees: Vec<String>,

        /// Label (repeatable)
        #[arg(long = "label")]
        labels: Vec<String>,

        /// Milestone id or title
        #[arg(long)]
        milestone: Option<String>,

        /// Task this one depends on (repeatable)
        #[arg(long = "dep")]
        dependencies: Vec<String>,

        /// Parent task id; the new task gets a dotted id under it
        #[arg(long)]
        parent: Option<String>,

        /// Manual ordering value
        #[arg(long, allow_hyphen_values = true)]
        ordinal: Option<i64>,

        /// Description text
        #[arg(long)]
        description: Option<String>,

        /// Implementation plan text
        #[arg(long)]
        plan: Option<String>,

        /// Implementation notes text
        #[arg(long)]
        notes: Option<String>,

        /// Acceptance criterion (repeatable)
        #[arg(long = "ac")]
        criteria: Vec<String>,
    },

    /// List tasks
    List {
        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        assignee: Option<String>,

        #[arg(long)]
        priority: Option<String>,

        #[arg(long)]
        milestone: Option<String>,

        /// Match tasks carrying any of these labels (repeatable)
        #[arg(long = "label")]
        labels: Vec<String>,

        #[arg(long)]
        parent: Option<String>,

        /// Only active (local) or archived (completed) tasks
        #[arg(long)]
        source: Option<String>,

        /// Page size
        #[arg(long)]
        limit: Option<usize>,

        /// Page start
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Sort field: title, created_date, priority, ordinal, id
        #[arg(long)]
        sort: Option<String>,

        /// Sort direction: asc, desc
        #[arg(long, default_value = "asc")]
        direction: String,
    },

    /// Show one task
    Show {
        id: String,
    },

    /// Edit a task
    Edit {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        status: Option<String>,

        #[arg(long, conflicts_with = "clear_priority")]
        priority: Option<String>,

        #[arg(long)]
        clear_priority: bool,

        #[arg(long, conflicts_with = "clear_milestone")]
        milestone: Option<String>,

        #[arg(long)]
        clear_milestone: bool,

        #[arg(long, conflicts_with = "clear_parent")]
        parent: Option<String>,

        #[arg(long)]
        clear_parent: bool,

        #[arg(long, allow_hyphen_values = true, conflicts_with = "clear_ordinal")]
        ordinal: Option<i64>,

        #[arg(long)]
        clear_ordinal: bool,

        #[arg(long, conflicts_with = "clear_description")]
        description: Option<String>,

        #[arg(long)]
        clear_description: bool,

        #[arg(long, conflicts_with = "clear_plan")]
        plan: Option<String>,

        #[arg(long)]
        clear_plan: bool,

        #[arg(long, conflicts_with = "clear_notes")]
        notes: Option<String>,

        #[arg(long)]
        clear_notes: bool,

        /// Replace all labels (comma separated)
        #[arg(long, value_delimiter = ',')]
        labels: Option<Vec<String>>,

        #[arg(long = "add-label")]
        add_labels: Vec<String>,

        #[arg(long = "remove-label")]
        remove_labels: Vec<String>,

        /// Replace all assignees (comma separated)
        #[arg(long, value_delimiter = ',')]
        assignees: Option<Vec<String>>,

        #[arg(long = "add-assignee")]
        add_assignees: Vec<String>,

        #[arg(long = "remove-assignee")]
        remove_assignees: Vec<String>,

        /// Replace all dependencies (comma separated)
        #[arg(long, value_delimiter = ',')]
        deps: Option<Vec<String>>,

        #[arg(long = "add-dep")]
        add_deps: Vec<String>,

        #[arg(long = "remove-dep")]
        remove_deps: Vec<String>,

        /// Append an acceptance criterion (repeatable)
        #[arg(long = "ac")]
        add_criteria: Vec<String>,

        /// Remove criterion by 1-based index (repeatable)
        #[arg(long = "remove-ac")]
        remove_criteria: Vec<usize>,

        /// Check criterion by 1-based index (repeatable)
        #[arg(long = "check-ac")]
        check_criteria: Vec<usize>,

        /// Uncheck criterion by 1-based index (repeatable)
        #[arg(long = "uncheck-ac")]
        uncheck_criteria: Vec<usize>,
    },

    /// Move a task to completed/
    Archive {
        id: String,
    },

    /// Move an archived task back to tasks/
    Restore {
        id: String,
    },

    /// Delete a task file
    Rm {
        id: String,
    },
}

/// Milestone subcommands
#[derive(Subcommand, Debug)]
pub enum MilestoneCommands {
    /// Create a milestone
    New {
        title: String,

        #[arg(long)]
        description: Option<String>,
    },

    /// List milestones with progress
    List,

    /// Show one milestone and its tasks
    Show {
        id: String,
    },

    /// Edit a milestone
    Edit {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long, conflicts_with = "clear_description")]
        description: Option<String>,

        #[arg(long)]
        clear_description: bool,
    },

    /// Delete a milestone (task references are kept)
    Rm {
        id: String,
    },
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.execute())
    }

    async fn execute(self) -> Result<()> {
        let output = OutputOptions {
            json: self.json,
            quiet: self.quiet,
        };
        let root = match self.root {
            Some(path) => path,
            None => std::env::current_dir()?,
        };
        let ctx = Context::open(root, self.diagnostics.as_deref(), output)?;

        match self.command {
            Commands::Init { name } => init::run(&ctx, name).await,
            Commands::Board { limit } => board::run(&ctx, limit).await,
            Commands::Task(cmd) => task::run(&ctx, cmd).await,
            Commands::Milestone(cmd) => milestone::run(&ctx, cmd).await,
        }
    }
}

/// Store plus output settings shared by every command.
pub(crate) struct Context {
    pub root: PathBuf,
    pub store: Store,
    pub output: OutputOptions,
    collector: Option<Arc<CollectingSink>>,
}

impl Context {
    fn open(root: PathBuf, diagnostics: Option<&str>, output: OutputOptions) -> Result<Self> {
        let mut collector = None;
        let sink: Arc<dyn DiagnosticSink> = match DiagnosticDestination::parse(diagnostics) {
            Some(destination) => Arc::new(destination.open()?),
            None => {
                let collecting = Arc::new(CollectingSink::new());
                collector = Some(collecting.clone());
                collecting
            }
        };
        let store = Store::local(&root, StoreOptions { diagnostics: sink });
        Ok(Self {
            root,
            store,
            output,
            collector,
        })
    }

    /// Open the project and load every task.
    pub async fn load(&self) -> Result<()> {
        self.store.initialize().await?;
        Ok(())
    }

    /// Collected diagnostics as warning lines.
    pub fn attach_warnings(&self, human: &mut HumanOutput) {
        if let Some(collector) = &self.collector {
            for diagnostic in collector.entries() {
                match diagnostic.path {
                    Some(path) => human.push_warning(format!("{} ({path})", diagnostic.message)),
                    None => human.push_warning(diagnostic.message),
                }
            }
        }
    }
}
