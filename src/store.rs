//! File-backed entity store.
//!
//! [`Store`] maps task and milestone identity to files under
//! `{root}/backlog/`, keeps an in-memory index of them and keeps milestone
//! membership in sync with the tasks that reference a milestone.
//!
//! # Modes
//!
//! - **Eager** ([`Store::initialize`]): every task file in `tasks/` and
//!   `completed/` is read and parsed up front.
//! - **Lazy** ([`Store::initialize_lazy`]): the caller supplies file paths;
//!   only an `id -> path` index is built and content is read on demand by
//!   [`Store::load_task`]. Loaded tasks stay cached, so a lazy store fills in
//!   as it is used.
//!
//! Every query and mutation fails with [`Error::NotInitialized`] until one of
//! the two has run. Operations on one instance are serialized by an internal
//! lock; separate processes writing the same directory are not coordinated.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::adapter::{FileSystem, LocalFileSystem};
use crate::config::{parse_config, serialize_config, BacklogConfig};
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, TracingSink};
use crate::error::{Error, Result};
use crate::markdown::{
    parse_milestone, parse_task, serialize_milestone, serialize_task, split_document,
};
use crate::milestone::{
    milestone_buckets, resolve_reference, sort_milestones, Milestone, MilestoneBucket,
    MilestoneUpdate,
};
use crate::paths::{
    compare_task_ids, extract_index_from_path, has_md_extension, is_milestone_file,
    is_task_path, milestone_filename, milestone_id_from_filename, milestone_number,
    parse_task_id, task_filename, BACKLOG_DIR, COMPLETED_DIR, CONFIG_FILE, MILESTONES_DIR,
    TASKS_DIR,
};
use crate::sort::{
    group_tasks_by_status, paginate, sort_tasks, Page, PageOptions, SortDirection, SortField,
    StatusGroups,
};
use crate::task::{
    normalize_key, renumber, AcceptanceCriterion, NewTask, Task, TaskFilter, TaskIndexEntry,
    TaskSource, TaskUpdate,
};

/// Construction-time settings.
#[derive(Clone)]
pub struct StoreOptions {
    /// Receiver for non-fatal problems (bad files, corrected statuses, ...).
    pub diagnostics: Arc<dyn DiagnosticSink>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            diagnostics: Arc::new(TracingSink),
        }
    }
}

/// Outcome of [`Store::initialize`] / [`Store::initialize_lazy`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InitReport {
    /// Tasks loaded (eager) or indexed (lazy).
    pub loaded: usize,
    /// Files that could not be read or parsed.
    pub skipped: Vec<String>,
    pub duplicates: Vec<DuplicateId>,
}

/// Two files claiming one id. The later-processed file wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateId {
    pub id: String,
    pub kept: String,
    pub replaced: String,
}

/// One status column of a paged board.
#[derive(Debug, Clone, Serialize)]
pub struct StatusPage {
    pub status: String,
    #[serde(flatten)]
    pub page: Page<Task>,
}

/// One source bucket (`tasks/` or `completed/`) of a paged listing.
#[derive(Debug, Clone, Serialize)]
pub struct SourcePage {
    pub source: TaskSource,
    #[serde(flatten)]
    pub page: Page<Task>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Uninitialized,
    Eager,
    Lazy,
}

struct State {
    mode: Mode,
    config: BacklogConfig,
    tasks: BTreeMap<String, Task>,
    index: BTreeMap<String, TaskIndexEntry>,
}

impl State {
    fn new() -> Self {
        Self {
            mode: Mode::Uninitialized,
            config: BacklogConfig::default(),
            tasks: BTreeMap::new(),
            index: BTreeMap::new(),
        }
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.mode == Mode::Uninitialized {
            return Err(Error::NotInitialized);
        }
        Ok(())
    }

    fn path_of(&self, id: &str) -> Option<String> {
        self.tasks
            .get(id)
            .map(|task| task.file_path.clone())
            .or_else(|| self.index.get(id).map(|entry| entry.file_path.clone()))
    }

    fn remember(&mut self, task: Task) {
        self.index.insert(
            task.id.clone(),
            TaskIndexEntry {
                id: task.id.clone(),
                file_path: task.file_path.clone(),
                title: task.title.clone(),
                source: task.source,
            },
        );
        self.tasks.insert(task.id.clone(), task);
    }

    fn forget(&mut self, id: &str) {
        self.tasks.remove(id);
        self.index.remove(id);
    }

    /// Every known task id, loaded or only indexed.
    fn known_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.index.keys().cloned().collect();
        for id in self.tasks.keys() {
            if !self.index.contains_key(id) {
                ids.push(id.clone());
            }
        }
        ids
    }

    /// Loaded tasks in numeric id order.
    fn loaded_tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| compare_task_ids(&a.id, &b.id));
        tasks
    }
}

/// File-backed task and milestone store.
pub struct Store {
    fs: Arc<dyn FileSystem>,
    root: String,
    diagnostics: Arc<dyn DiagnosticSink>,
    state: Mutex<State>,
}

impl Store {
    pub fn new(fs: Arc<dyn FileSystem>, root: impl Into<String>) -> Self {
        Self::with_options(fs, root, StoreOptions::default())
    }

    pub fn with_options(
        fs: Arc<dyn FileSystem>,
        root: impl Into<String>,
        options: StoreOptions,
    ) -> Self {
        Self {
            fs,
            root: root.into(),
            diagnostics: options.diagnostics,
            state: Mutex::new(State::new()),
        }
    }

    /// Store over the local disk.
    pub fn local(root: &std::path::Path, options: StoreOptions) -> Self {
        Self::with_options(
            Arc::new(LocalFileSystem::new()),
            root.to_string_lossy().replace('\\', "/"),
            options,
        )
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn backlog_dir(&self) -> String {
        self.fs.join(&self.root, BACKLOG_DIR)
    }

    pub fn config_path(&self) -> String {
        self.fs.join(&self.backlog_dir(), CONFIG_FILE)
    }

    pub fn tasks_dir(&self) -> String {
        self.fs.join(&self.backlog_dir(), TASKS_DIR)
    }

    pub fn completed_dir(&self) -> String {
        self.fs.join(&self.backlog_dir(), COMPLETED_DIR)
    }

    pub fn milestones_dir(&self) -> String {
        self.fs.join(&self.backlog_dir(), MILESTONES_DIR)
    }

    fn source_dir(&self, source: TaskSource) -> String {
        match source {
            TaskSource::Completed => self.completed_dir(),
            _ => self.tasks_dir(),
        }
    }

    // =====================================================================
    // Project & configuration
    // =====================================================================

    /// Whether `backlog/config.yml` exists under the root.
    pub async fn is_project(&self) -> Result<bool> {
        self.fs.exists(&self.config_path()).await
    }

    /// Create the directory layout and a default config named `name`.
    /// An existing config is left untouched and returned.
    pub async fn init_project(&self, name: &str) -> Result<BacklogConfig> {
        for dir in [self.tasks_dir(), self.completed_dir(), self.milestones_dir()] {
            self.ensure_dir(&dir).await?;
        }
        if self.is_project().await? {
            tracing::debug!(root = %self.root, "backlog project already exists");
            return self.read_config().await;
        }

        let config = BacklogConfig::new(name);
        self.write_config(&config).await?;
        tracing::debug!(root = %self.root, project = %config.project_name, "initialized backlog project");
        Ok(config)
    }

    /// The configuration loaded by the last initialization.
    pub async fn get_config(&self) -> Result<BacklogConfig> {
        let state = self.state.lock().await;
        state.ensure_initialized()?;
        Ok(state.config.clone())
    }

    /// Persist `config` and make it the active configuration.
    pub async fn save_config(&self, config: &BacklogConfig) -> Result<()> {
        let mut state = self.state.lock().await;
        state.ensure_initialized()?;
        self.write_config(config).await?;
        state.config = config.clone();
        Ok(())
    }

    async fn read_config(&self) -> Result<BacklogConfig> {
        let path = self.config_path();
        if !self.fs.exists(&path).await? {
            return Err(Error::NotAProject(path.into()));
        }
        let content = self.fs.read_file(&path).await?;
        Ok(parse_config(&content))
    }

    async fn write_config(&self, config: &BacklogConfig) -> Result<()> {
        self.ensure_dir(&self.backlog_dir()).await?;
        self.fs
            .write_file(&self.config_path(), &serialize_config(config))
            .await
    }

    // =====================================================================
    // Initialization
    // =====================================================================

    /// Read and parse every task file. Replaces any previous state.
    pub async fn initialize(&self) -> Result<InitReport> {
        let mut state = self.state.lock().await;
        let config = self.read_config().await?;

        let mut report = InitReport::default();
        let mut tasks: BTreeMap<String, Task> = BTreeMap::new();

        let tasks_dir = self.tasks_dir();
        let active = if self.fs.exists(&tasks_dir).await? {
            self.fs.read_dir(&tasks_dir).await?
        } else {
            Vec::new()
        };
        let completed_dir = self.completed_dir();
        let completed = self.read_optional_dir(&completed_dir).await;

        for (dir, names) in [(tasks_dir, active), (completed_dir, completed)] {
            for name in names {
                if !has_md_extension(&name) {
                    continue;
                }
                let path = self.fs.join(&dir, &name);
                if self.fs.is_directory(&path).await.unwrap_or(false) {
                    continue;
                }
                let Some(task) = self.read_task_file_or_skip(&path).await else {
                    report.skipped.push(path);
                    continue;
                };
                if let Some(previous) = tasks.get(&task.id) {
                    self.report_duplicate(&mut report, &task.id, &task.file_path, &previous.file_path);
                }
                tasks.insert(task.id.clone(), task);
            }
        }

        report.loaded = tasks.len();
        state.mode = Mode::Eager;
        state.config = config;
        state.tasks.clear();
        state.index.clear();
        for task in tasks.into_values() {
            state.remember(task);
        }

        tracing::debug!(
            root = %self.root,
            loaded = report.loaded,
            skipped = report.skipped.len(),
            "store initialized"
        );
        Ok(report)
    }

    /// Build the id index from caller-supplied paths without reading any
    /// task content. Paths that are not task files are ignored.
    pub async fn initialize_lazy<S: AsRef<str>>(&self, paths: &[S]) -> Result<InitReport> {
        let mut state = self.state.lock().await;
        let config = self.read_config().await?;

        let mut report = InitReport::default();
        let mut index: BTreeMap<String, TaskIndexEntry> = BTreeMap::new();
        for path in paths {
            let path = path.as_ref();
            if !is_task_path(path) {
                continue;
            }
            let entry = extract_index_from_path(path);
            if let Some(previous) = index.get(&entry.id) {
                self.report_duplicate(&mut report, &entry.id, &entry.file_path, &previous.file_path);
            }
            index.insert(entry.id.clone(), entry);
        }

        report.loaded = index.len();
        state.mode = Mode::Lazy;
        state.config = config;
        state.tasks.clear();
        state.index = index;

        tracing::debug!(root = %self.root, indexed = report.loaded, "store initialized lazily");
        Ok(report)
    }

    fn report_duplicate(&self, report: &mut InitReport, id: &str, kept: &str, replaced: &str) {
        self.report(
            Diagnostic::new(
                DiagnosticKind::DuplicateId,
                format!("task id {id} is used by more than one file; keeping {kept}"),
            )
            .with_path(replaced),
        );
        report.duplicates.push(DuplicateId {
            id: id.to_string(),
            kept: kept.to_string(),
            replaced: replaced.to_string(),
        });
    }

    // =====================================================================
    // Loading
    // =====================================================================

    /// Cached task by id. Never reads from disk.
    pub async fn get_task(&self, id: &str) -> Result<Option<Task>> {
        let state = self.state.lock().await;
        state.ensure_initialized()?;
        Ok(state.tasks.get(id).cloned())
    }

    /// Cached task, or read it through the index on a cache miss.
    pub async fn load_task(&self, id: &str) -> Result<Option<Task>> {
        let mut state = self.state.lock().await;
        state.ensure_initialized()?;
        self.load_locked(&mut state, id).await
    }

    /// Load several tasks; misses are read concurrently. The result follows
    /// the order of `ids`, with unknown or unreadable ids left out.
    pub async fn load_tasks<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<Task>> {
        let mut state = self.state.lock().await;
        state.ensure_initialized()?;

        let misses: Vec<TaskIndexEntry> = ids
            .iter()
            .map(AsRef::as_ref)
            .filter(|id| !state.tasks.contains_key(*id))
            .filter_map(|id| state.index.get(id).cloned())
            .collect();
        self.read_entries(&mut state, misses).await;

        Ok(ids
            .iter()
            .filter_map(|id| state.tasks.get(id.as_ref()).cloned())
            .collect())
    }

    async fn load_locked(&self, state: &mut State, id: &str) -> Result<Option<Task>> {
        if let Some(task) = state.tasks.get(id) {
            return Ok(Some(task.clone()));
        }
        let Some(entry) = state.index.get(id).cloned() else {
            return Ok(None);
        };
        let Some(mut task) = self.read_task_file(&entry.file_path).await? else {
            return Ok(None);
        };
        task.id = entry.id;
        state.tasks.insert(task.id.clone(), task.clone());
        Ok(Some(task))
    }

    /// Read index entries concurrently into the cache.
    async fn read_entries(&self, state: &mut State, entries: Vec<TaskIndexEntry>) {
        if entries.is_empty() {
            return;
        }
        let reads = entries.into_iter().map(|entry| async move {
            let task = self.read_task_file_or_skip(&entry.file_path).await;
            (entry.id, task)
        });
        for (id, task) in join_all(reads).await {
            if let Some(mut task) = task {
                task.id = id.clone();
                state.tasks.insert(id, task);
            }
        }
    }

    /// In lazy mode, pull every indexed task into the cache.
    async fn load_all(&self, state: &mut State) {
        if state.mode != Mode::Lazy {
            return;
        }
        let misses: Vec<TaskIndexEntry> = state
            .index
            .values()
            .filter(|entry| !state.tasks.contains_key(&entry.id))
            .cloned()
            .collect();
        self.read_entries(state, misses).await;
    }

    async fn all_tasks(&self, state: &mut State) -> Result<Vec<Task>> {
        state.ensure_initialized()?;
        self.load_all(state).await;
        Ok(state.loaded_tasks())
    }

    /// Read and parse one task file. A missing file or one that does not
    /// parse is reported and yields `None`; other I/O failures are errors.
    async fn read_task_file(&self, path: &str) -> Result<Option<Task>> {
        let content = match self.fs.read_file(path).await {
            Ok(content) => content,
            Err(err) if err.is_not_found() => {
                self.report(
                    Diagnostic::new(DiagnosticKind::ReadFailure, err.to_string()).with_path(path),
                );
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        match parse_task(&content, path) {
            Ok(task) => Ok(Some(task)),
            Err(err) => {
                self.report(
                    Diagnostic::new(DiagnosticKind::ParseFailure, err.to_string()).with_path(path),
                );
                Ok(None)
            }
        }
    }

    /// Bulk-load variant of [`Self::read_task_file`]: read failures are
    /// reported and the file is skipped.
    async fn read_task_file_or_skip(&self, path: &str) -> Option<Task> {
        match self.read_task_file(path).await {
            Ok(task) => task,
            Err(err) => {
                self.report(
                    Diagnostic::new(DiagnosticKind::ReadFailure, err.to_string()).with_path(path),
                );
                None
            }
        }
    }

    // =====================================================================
    // Queries
    // =====================================================================

    /// Tasks matching `filter`, in canonical order.
    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut state = self.state.lock().await;
        let mut tasks = self.all_tasks(&mut state).await?;
        tasks.retain(|task| filter.matches(task));
        sort_tasks(&mut tasks);
        Ok(tasks)
    }

    pub async fn list_tasks_paginated(
        &self,
        filter: &TaskFilter,
        options: &PageOptions,
    ) -> Result<Page<Task>> {
        let mut state = self.state.lock().await;
        let mut tasks = self.all_tasks(&mut state).await?;
        tasks.retain(|task| filter.matches(task));
        options.order(&mut tasks);
        Ok(paginate(tasks, options.offset, options.effective_limit()))
    }

    /// Every task grouped by status; configured statuses are always present.
    pub async fn get_tasks_by_status(&self) -> Result<StatusGroups> {
        let mut state = self.state.lock().await;
        let tasks = self.all_tasks(&mut state).await?;
        Ok(group_tasks_by_status(tasks, &state.config.statuses))
    }

    /// First page of every status column. Each column pages on its own.
    pub async fn get_tasks_by_status_paginated(
        &self,
        options: &PageOptions,
    ) -> Result<Vec<StatusPage>> {
        let mut state = self.state.lock().await;
        let tasks = self.all_tasks(&mut state).await?;
        let groups = group_tasks_by_status(tasks, &state.config.statuses);

        Ok(groups
            .into_inner()
            .into_iter()
            .map(|(status, mut bucket)| {
                options.order(&mut bucket);
                StatusPage {
                    status,
                    page: paginate(bucket, options.offset, options.effective_limit()),
                }
            })
            .collect())
    }

    /// Next page of one status column.
    pub async fn load_more_for_status(
        &self,
        status: &str,
        offset: usize,
        options: &PageOptions,
    ) -> Result<Page<Task>> {
        let mut state = self.state.lock().await;
        let mut tasks = self.all_tasks(&mut state).await?;
        tasks.retain(|task| task.status == status);
        options.order(&mut tasks);
        Ok(paginate(tasks, offset, options.effective_limit()))
    }

    /// First page of active and of completed tasks.
    pub async fn get_tasks_by_source_paginated(
        &self,
        options: &PageOptions,
    ) -> Result<Vec<SourcePage>> {
        let mut state = self.state.lock().await;
        state.ensure_initialized()?;
        let mut pages = Vec::with_capacity(2);
        for source in [TaskSource::Local, TaskSource::Completed] {
            let page = self
                .page_source(&mut state, source, options.offset, options)
                .await;
            pages.push(SourcePage { source, page });
        }
        Ok(pages)
    }

    /// Next page of one source bucket.
    pub async fn load_more_for_source(
        &self,
        source: TaskSource,
        offset: usize,
        options: &PageOptions,
    ) -> Result<Page<Task>> {
        let mut state = self.state.lock().await;
        state.ensure_initialized()?;
        Ok(self.page_source(&mut state, source, offset, options).await)
    }

    async fn page_source(
        &self,
        state: &mut State,
        source: TaskSource,
        offset: usize,
        options: &PageOptions,
    ) -> Page<Task> {
        let limit = options.effective_limit();

        // Id order is known from the index alone: read only the page.
        if state.mode == Mode::Lazy && options.sort_by == Some(SortField::Id) {
            let mut entries: Vec<TaskIndexEntry> = state
                .index
                .values()
                .filter(|entry| entry.source == source)
                .cloned()
                .collect();
            entries.sort_by(|a, b| compare_task_ids(&a.id, &b.id));
            if options.direction == SortDirection::Desc {
                entries.reverse();
            }
            let page = paginate(entries, offset, limit);
            let misses: Vec<TaskIndexEntry> = page
                .items
                .iter()
                .filter(|entry| !state.tasks.contains_key(&entry.id))
                .cloned()
                .collect();
            self.read_entries(state, misses).await;
            return Page {
                items: page
                    .items
                    .iter()
                    .filter_map(|entry| state.tasks.get(&entry.id).cloned())
                    .collect(),
                total: page.total,
                has_more: page.has_more,
                offset: page.offset,
                limit: page.limit,
            };
        }

        self.load_all(state).await;
        let mut tasks = state.loaded_tasks();
        tasks.retain(|task| task.source == source);
        options.order(&mut tasks);
        paginate(tasks, offset, limit)
    }

    /// Milestone progress buckets over every task, "no milestone" first.
    pub async fn get_tasks_by_milestone(&self) -> Result<Vec<MilestoneBucket>> {
        let mut state = self.state.lock().await;
        let tasks = self.all_tasks(&mut state).await?;
        let milestones = self.read_milestones().await?;
        Ok(milestone_buckets(tasks, &milestones, &state.config.statuses))
    }

    // =====================================================================
    // Task mutations
    // =====================================================================

    /// Create a task in `tasks/`. An unknown status is replaced by the
    /// configured default.
    pub async fn create_task(&self, input: NewTask) -> Result<Task> {
        let mut state = self.state.lock().await;
        state.ensure_initialized()?;

        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(Error::InvalidArgument("task title must not be empty".to_string()));
        }

        let known = state.known_ids();
        let (id, parent_task_id) = match input.parent_task_id.as_deref() {
            Some(parent) => {
                let (id, parent) = next_subtask_id(&known, parent)?;
                (id, Some(parent))
            }
            None => (next_task_id(&known), None),
        };

        let status = match input.status.as_deref() {
            None => state.config.default_status(),
            Some(requested) => match state.config.resolve_status(requested) {
                Some(status) => status,
                None => {
                    let fallback = state.config.default_status();
                    self.report(Diagnostic::new(
                        DiagnosticKind::InvalidStatus,
                        format!("status '{requested}' is not configured; using '{fallback}'"),
                    ));
                    fallback
                }
            },
        };

        let mut task = Task::new(id, title, status, state.config.today());
        task.priority = input.priority;
        task.assignee = clean_list(input.assignee);
        task.labels = clean_list(input.labels);
        task.milestone = input.milestone.and_then(|m| non_blank(&m));
        task.dependencies = clean_list(input.dependencies);
        task.parent_task_id = parent_task_id;
        task.ordinal = input.ordinal;
        task.description = input.description.and_then(|v| non_blank(&v));
        task.implementation_plan = input.implementation_plan.and_then(|v| non_blank(&v));
        task.implementation_notes = input.implementation_notes.and_then(|v| non_blank(&v));
        task.acceptance_criteria = input
            .acceptance_criteria
            .into_iter()
            .filter(|text| !text.trim().is_empty())
            .map(|text| AcceptanceCriterion {
                index: 0,
                text: text.trim().to_string(),
                checked: false,
            })
            .collect();
        renumber(&mut task.acceptance_criteria);

        let dir = self.tasks_dir();
        self.ensure_dir(&dir).await?;
        task.file_path = self.fs.join(&dir, &task_filename(&task.id, &task.title));
        self.write_task(&mut task).await?;
        state.remember(task.clone());

        if let Some(reference) = task.milestone.clone() {
            self.add_to_milestone(&reference, &task.id).await?;
        }

        tracing::debug!(id = %task.id, path = %task.file_path, "created task");
        Ok(task)
    }

    /// Apply `update` to a loaded task and rewrite its file. Returns `None`
    /// when the task is not loaded.
    pub async fn update_task(&self, id: &str, update: TaskUpdate) -> Result<Option<Task>> {
        let mut state = self.state.lock().await;
        state.ensure_initialized()?;
        let Some(mut task) = state.tasks.get(id).cloned() else {
            return Ok(None);
        };
        if !task.source.is_mutable() {
            return Err(read_only(&task));
        }
        if update.is_empty() {
            return Ok(Some(task));
        }
        let old_path = task.file_path.clone();
        let old_milestone = task.milestone.clone();

        if let Some(title) = update.title {
            let title = title.trim().to_string();
            if title.is_empty() {
                return Err(Error::InvalidArgument("task title must not be empty".to_string()));
            }
            task.title = title;
        }
        if let Some(status) = update.status {
            task.status = state
                .config
                .resolve_status(&status)
                .unwrap_or_else(|| status.trim().to_string());
        }
        update.priority.apply(&mut task.priority);
        update.milestone.apply(&mut task.milestone);
        task.milestone = task.milestone.and_then(|m| non_blank(&m));
        update.parent_task_id.apply(&mut task.parent_task_id);
        update.ordinal.apply(&mut task.ordinal);
        update.description.apply(&mut task.description);
        update.implementation_plan.apply(&mut task.implementation_plan);
        update.implementation_notes.apply(&mut task.implementation_notes);
        update.assignee.apply(&mut task.assignee);
        update.labels.apply(&mut task.labels);
        update.dependencies.apply(&mut task.dependencies);
        update.acceptance_criteria.apply(&mut task.acceptance_criteria);
        task.updated_date = Some(state.config.today());

        let dir = self.source_dir(task.source);
        task.file_path = self.fs.join(&dir, &task_filename(&task.id, &task.title));
        self.remove_file_best_effort(&old_path).await;
        self.write_task(&mut task).await?;
        state.remember(task.clone());

        let old_key = old_milestone.as_deref().and_then(normalize_key);
        if old_key != task.milestone_key() {
            if let Some(reference) = old_milestone {
                self.remove_from_milestone(&reference, &task.id).await?;
            }
            if let Some(reference) = task.milestone.clone() {
                self.add_to_milestone(&reference, &task.id).await?;
            }
        }

        tracing::debug!(id = %task.id, path = %task.file_path, "updated task");
        Ok(Some(task))
    }

    /// Remove a task file and every trace of it. Returns whether it existed.
    pub async fn delete_task(&self, id: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.ensure_initialized()?;
        let Some(path) = state.path_of(id) else {
            return Ok(false);
        };
        let task = self.load_locked(&mut state, id).await?;
        if let Some(task) = task.as_ref().filter(|task| !task.source.is_mutable()) {
            return Err(read_only(task));
        }
        let milestone = task.and_then(|task| task.milestone);

        match self.fs.delete_file(&path).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
        state.forget(id);

        if let Some(reference) = milestone {
            self.remove_from_milestone(&reference, id).await?;
        }

        tracing::debug!(id, path = %path, "deleted task");
        Ok(true)
    }

    /// Move an active task to `completed/`. `None` if unknown or already
    /// archived.
    pub async fn archive_task(&self, id: &str) -> Result<Option<Task>> {
        self.move_task(id, TaskSource::Local, TaskSource::Completed)
            .await
    }

    /// Move an archived task back to `tasks/`. `None` if unknown or not
    /// archived.
    pub async fn restore_task(&self, id: &str) -> Result<Option<Task>> {
        self.move_task(id, TaskSource::Completed, TaskSource::Local)
            .await
    }

    async fn move_task(&self, id: &str, from: TaskSource, to: TaskSource) -> Result<Option<Task>> {
        let mut state = self.state.lock().await;
        state.ensure_initialized()?;
        let Some(mut task) = self.load_locked(&mut state, id).await? else {
            return Ok(None);
        };
        if task.source != from {
            return Ok(None);
        }

        let old_path = task.file_path.clone();
        let content = self.fs.read_file(&old_path).await?;
        let dir = self.source_dir(to);
        self.ensure_dir(&dir).await?;
        let name = self.fs.basename(&old_path);
        task.file_path = self.fs.join(&dir, &name);
        task.source = to;

        self.fs.write_file(&task.file_path, &content).await?;
        self.remove_file_best_effort(&old_path).await;
        state.remember(task.clone());

        tracing::debug!(id, from = %old_path, to = %task.file_path, "moved task");
        Ok(Some(task))
    }

    async fn write_task(&self, task: &mut Task) -> Result<()> {
        let content = serialize_task(task);
        self.fs.write_file(&task.file_path, &content).await?;
        task.raw_content = split_document(&content, &task.file_path)
            .map(|document| document.body)
            .unwrap_or_default();
        Ok(())
    }

    // =====================================================================
    // Milestones
    // =====================================================================

    /// All milestones ordered by number.
    pub async fn list_milestones(&self) -> Result<Vec<Milestone>> {
        let state = self.state.lock().await;
        state.ensure_initialized()?;
        self.read_milestones().await
    }

    /// Milestone by id (case-insensitive).
    pub async fn load_milestone(&self, id: &str) -> Result<Option<Milestone>> {
        let state = self.state.lock().await;
        state.ensure_initialized()?;
        self.find_milestone(id).await
    }

    /// Create `m-N` with the next free N and record it in the config.
    pub async fn create_milestone(
        &self,
        title: &str,
        description: Option<String>,
    ) -> Result<Milestone> {
        let mut state = self.state.lock().await;
        state.ensure_initialized()?;

        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(Error::InvalidArgument(
                "milestone title must not be empty".to_string(),
            ));
        }

        let dir = self.milestones_dir();
        let next = self
            .read_optional_dir(&dir)
            .await
            .iter()
            .filter(|name| is_milestone_file(name))
            .filter_map(|name| milestone_id_from_filename(name))
            .filter_map(|id| milestone_number(&id))
            .max()
            .map_or(0, |max| max + 1);

        let mut milestone = Milestone {
            id: format!("m-{next}"),
            title,
            description: description.and_then(|d| non_blank(&d)),
            tasks: Vec::new(),
            file_path: String::new(),
        };
        self.write_milestone(&mut milestone).await?;

        if !state.config.milestones.contains(&milestone.id) {
            let mut config = state.config.clone();
            config.milestones.push(milestone.id.clone());
            self.write_config(&config).await?;
            state.config = config;
        }

        tracing::debug!(id = %milestone.id, path = %milestone.file_path, "created milestone");
        Ok(milestone)
    }

    /// Change title/description and rewrite the file. `None` if unknown.
    pub async fn update_milestone(
        &self,
        id: &str,
        update: MilestoneUpdate,
    ) -> Result<Option<Milestone>> {
        let state = self.state.lock().await;
        state.ensure_initialized()?;
        let Some(mut milestone) = self.find_milestone(id).await? else {
            return Ok(None);
        };

        if let Some(title) = update.title {
            let title = title.trim().to_string();
            if title.is_empty() {
                return Err(Error::InvalidArgument(
                    "milestone title must not be empty".to_string(),
                ));
            }
            milestone.title = title;
        }
        update.description.apply(&mut milestone.description);

        self.rewrite_milestone(&mut milestone).await?;
        Ok(Some(milestone))
    }

    /// Remove a milestone file. Tasks keep their (now dangling) reference.
    pub async fn delete_milestone(&self, id: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.ensure_initialized()?;
        let Some(milestone) = self.find_milestone(id).await? else {
            return Ok(false);
        };

        match self.fs.delete_file(&milestone.file_path).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }

        if state.config.milestones.contains(&milestone.id) {
            let mut config = state.config.clone();
            config.milestones.retain(|existing| existing != &milestone.id);
            self.write_config(&config).await?;
            state.config = config;
        }

        tracing::debug!(id = %milestone.id, "deleted milestone");
        Ok(true)
    }

    async fn read_milestones(&self) -> Result<Vec<Milestone>> {
        let dir = self.milestones_dir();
        let mut milestones = Vec::new();
        for name in self.read_optional_dir(&dir).await {
            if !is_milestone_file(&name) {
                continue;
            }
            let path = self.fs.join(&dir, &name);
            let content = match self.fs.read_file(&path).await {
                Ok(content) => content,
                Err(err) => {
                    self.report(
                        Diagnostic::new(DiagnosticKind::ReadFailure, err.to_string())
                            .with_path(path),
                    );
                    continue;
                }
            };
            match parse_milestone(&content, &path) {
                Ok(milestone) => milestones.push(milestone),
                Err(err) => self.report(
                    Diagnostic::new(DiagnosticKind::ParseFailure, err.to_string()).with_path(path),
                ),
            }
        }
        sort_milestones(&mut milestones);
        Ok(milestones)
    }

    async fn find_milestone(&self, id: &str) -> Result<Option<Milestone>> {
        let Some(key) = normalize_key(id) else {
            return Ok(None);
        };
        Ok(self
            .read_milestones()
            .await?
            .into_iter()
            .find(|milestone| milestone.id.to_lowercase() == key))
    }

    async fn add_to_milestone(&self, reference: &str, task_id: &str) -> Result<()> {
        let milestones = self.read_milestones().await?;
        let Some(milestone) = resolve_reference(&milestones, reference) else {
            self.report(Diagnostic::new(
                DiagnosticKind::MilestoneNotFound,
                format!("task {task_id} references unknown milestone '{reference}'"),
            ));
            return Ok(());
        };
        if milestone.contains_task(task_id) {
            return Ok(());
        }
        let mut milestone = milestone.clone();
        milestone.tasks.push(task_id.to_string());
        self.rewrite_milestone(&mut milestone).await
    }

    async fn remove_from_milestone(&self, reference: &str, task_id: &str) -> Result<()> {
        let milestones = self.read_milestones().await?;
        let Some(milestone) = resolve_reference(&milestones, reference) else {
            return Ok(());
        };
        if !milestone.contains_task(task_id) {
            return Ok(());
        }
        let mut milestone = milestone.clone();
        milestone.tasks.retain(|id| id != task_id);
        self.rewrite_milestone(&mut milestone).await
    }

    /// Delete the file currently holding this milestone's id, then write it
    /// under a name derived from the current title.
    async fn rewrite_milestone(&self, milestone: &mut Milestone) -> Result<()> {
        let dir = self.milestones_dir();
        let key = milestone.id.to_lowercase();
        for name in self.read_optional_dir(&dir).await {
            if is_milestone_file(&name)
                && milestone_id_from_filename(&name).as_deref() == Some(key.as_str())
            {
                self.remove_file_best_effort(&self.fs.join(&dir, &name)).await;
            }
        }
        self.write_milestone(milestone).await
    }

    async fn write_milestone(&self, milestone: &mut Milestone) -> Result<()> {
        let dir = self.milestones_dir();
        self.ensure_dir(&dir).await?;
        milestone.file_path = self
            .fs
            .join(&dir, &milestone_filename(&milestone.id, &milestone.title));
        self.fs
            .write_file(&milestone.file_path, &serialize_milestone(milestone))
            .await
    }

    // =====================================================================
    // Helpers
    // =====================================================================

    async fn ensure_dir(&self, path: &str) -> Result<()> {
        if !self.fs.exists(path).await? {
            self.fs.create_dir(path, true).await?;
        }
        Ok(())
    }

    /// Listing of a directory that may be absent; failures read as empty.
    async fn read_optional_dir(&self, path: &str) -> Vec<String> {
        match self.fs.exists(path).await {
            Ok(true) => {}
            Ok(false) => return Vec::new(),
            Err(err) => {
                tracing::debug!(path, error = %err, "treating unreadable directory as absent");
                return Vec::new();
            }
        }
        match self.fs.read_dir(path).await {
            Ok(names) => names,
            Err(err) => {
                tracing::debug!(path, error = %err, "treating unreadable directory as absent");
                Vec::new()
            }
        }
    }

    async fn remove_file_best_effort(&self, path: &str) {
        match self.fs.delete_file(path).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => self.report(
                Diagnostic::new(
                    DiagnosticKind::CleanupFailed,
                    format!("could not remove old file: {err}"),
                )
                .with_path(path),
            ),
        }
    }

    fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics.report(diagnostic);
    }
}

/// Next top-level id: one past the largest integer part in use, at least 1.
pub fn next_task_id<S: AsRef<str>>(existing: &[S]) -> String {
    let max = existing
        .iter()
        .filter_map(|id| parse_task_id(id.as_ref()))
        .map(|(major, _)| major)
        .max()
        .unwrap_or(0);
    (max + 1).to_string()
}

/// Next dotted id under `parent`, plus the parent id in canonical form.
pub fn next_subtask_id<S: AsRef<str>>(existing: &[S], parent: &str) -> Result<(String, String)> {
    let major = match parse_task_id(parent) {
        Some((major, None)) => major,
        _ => {
            return Err(Error::InvalidArgument(format!(
                "parent task id '{parent}' must be a top-level task id"
            )))
        }
    };
    let ids: Vec<(u64, Option<u64>)> = existing
        .iter()
        .filter_map(|id| parse_task_id(id.as_ref()))
        .collect();
    if !ids.contains(&(major, None)) {
        return Err(Error::InvalidArgument(format!(
            "parent task {parent} does not exist"
        )));
    }
    let next = ids
        .iter()
        .filter(|(m, minor)| *m == major && minor.is_some())
        .filter_map(|(_, minor)| *minor)
        .max()
        .map_or(1, |max| max + 1);
    Ok((format!("{major}.{next}"), major.to_string()))
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn clean_list(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        if let Some(value) = non_blank(&value) {
            if !out.contains(&value) {
                out.push(value);
            }
        }
    }
    out
}

fn read_only(task: &Task) -> Error {
    Error::InvalidArgument(format!(
        "task {} comes from {} and cannot be changed",
        task.id, task.source
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MemoryFileSystem;
    use crate::diagnostics::CollectingSink;

    const ROOT: &str = "/project";

    fn config_text() -> &'static str {
        "project_name: \"Demo\"\nstatuses: [\"To Do\", \"In Progress\", \"Done\"]\n"
    }

    fn project() -> (Arc<MemoryFileSystem>, Arc<CollectingSink>, Store) {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.insert("/project/backlog/config.yml", config_text());
        let sink = Arc::new(CollectingSink::new());
        let store = Store::with_options(
            fs.clone(),
            ROOT,
            StoreOptions {
                diagnostics: sink.clone(),
            },
        );
        (fs, sink, store)
    }

    #[test]
    fn next_id_uses_integer_part() {
        assert_eq!(next_task_id::<&str>(&[]), "1");
        assert_eq!(next_task_id(&["1", "7.3", "notes", "4"]), "8");
    }

    #[test]
    fn subtask_ids_count_per_parent() {
        let ids = ["1", "2", "2.1", "2.4", "3.9"];
        assert_eq!(
            next_subtask_id(&ids, "2").unwrap(),
            ("2.5".to_string(), "2".to_string())
        );
        assert_eq!(next_subtask_id(&ids, "task-1").unwrap().0, "1.1");
        assert!(next_subtask_id(&ids, "2.1").is_err());
        assert!(next_subtask_id(&ids, "9").is_err());
    }

    #[tokio::test]
    async fn queries_require_initialization() {
        let (_fs, _sink, store) = project();
        assert!(matches!(
            store.list_tasks(&TaskFilter::default()).await,
            Err(Error::NotInitialized)
        ));
        assert!(matches!(store.get_task("1").await, Err(Error::NotInitialized)));
        assert!(matches!(
            store.create_task(NewTask::new("x")).await,
            Err(Error::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn initialize_requires_config() {
        let store = Store::new(Arc::new(MemoryFileSystem::new()), ROOT);
        assert!(matches!(store.initialize().await, Err(Error::NotAProject(_))));
        assert!(matches!(
            store.initialize_lazy::<&str>(&[]).await,
            Err(Error::NotAProject(_))
        ));
    }

    #[tokio::test]
    async fn update_rewrites_file_under_new_name() {
        let (fs, _sink, store) = project();
        store.initialize().await.unwrap();
        let task = store.create_task(NewTask::new("First")).await.unwrap();
        assert_eq!(task.file_path, "/project/backlog/tasks/1 - First.md");

        let updated = store
            .update_task(
                "1",
                TaskUpdate {
                    title: Some("Renamed".into()),
                    ..TaskUpdate::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.file_path, "/project/backlog/tasks/1 - Renamed.md");
        assert!(updated.updated_date.is_some());
        assert!(fs.contents("/project/backlog/tasks/1 - First.md").is_none());
        assert!(fs
            .contents(&updated.file_path)
            .unwrap()
            .contains("# Renamed"));
    }

    #[tokio::test]
    async fn update_requires_loaded_task() {
        let (fs, _sink, store) = project();
        fs.insert("/project/backlog/tasks/1 - A.md", "---\nstatus: To Do\n---\n# A\n");
        store
            .initialize_lazy(&["/project/backlog/tasks/1 - A.md"])
            .await
            .unwrap();

        assert!(store
            .update_task("1", TaskUpdate::default())
            .await
            .unwrap()
            .is_none());
        store.load_task("1").await.unwrap();
        assert!(store
            .update_task("1", TaskUpdate::default())
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn empty_update_leaves_file_alone() {
        let (fs, _sink, store) = project();
        store.initialize().await.unwrap();
        let task = store.create_task(NewTask::new("Steady")).await.unwrap();
        let before = fs.contents(&task.file_path);

        let same = store
            .update_task("1", TaskUpdate::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(same.updated_date, task.updated_date);
        assert_eq!(fs.contents(&task.file_path), before);
    }

    #[tokio::test]
    async fn foreign_sources_are_read_only() {
        let (_fs, _sink, store) = project();
        store.initialize().await.unwrap();
        let mut task = store.create_task(NewTask::new("Mirror")).await.unwrap();
        task.source = TaskSource::Remote;
        store.state.lock().await.remember(task);

        let rename = TaskUpdate {
            title: Some("Renamed".into()),
            ..TaskUpdate::default()
        };
        assert!(matches!(
            store.update_task("1", rename).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            store.delete_task("1").await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(store.archive_task("1").await.unwrap().is_none());
        assert!(!TaskSource::LocalBranch.is_mutable());
    }

    #[tokio::test]
    async fn empty_title_is_rejected() {
        let (_fs, _sink, store) = project();
        store.initialize().await.unwrap();
        assert!(matches!(
            store.create_task(NewTask::new("   ")).await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn unknown_milestone_reference_is_reported() {
        let (_fs, sink, store) = project();
        store.initialize().await.unwrap();
        let task = store
            .create_task(NewTask {
                milestone: Some("m-5".into()),
                ..NewTask::new("Orphan")
            })
            .await
            .unwrap();
        assert_eq!(task.milestone.as_deref(), Some("m-5"));
        assert_eq!(sink.kinds(), vec![DiagnosticKind::MilestoneNotFound]);
    }
}
