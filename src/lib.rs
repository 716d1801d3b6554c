//! backlog - file-backed task tracking library
//!
//! A project's backlog is a directory of human-editable markdown files. This
//! library reads and writes that directory and keeps an in-memory index over
//! it; the `backlog` binary is a thin CLI on top.
//!
//! # Core Concepts
//!
//! - **Tasks**: one markdown file each, identified by the id in the filename
//! - **Milestones**: files listing member task ids, kept in sync with the
//!   `milestone` field of each task
//! - **Eager and lazy loading**: parse everything up front, or index paths
//!   and read content on demand
//! - **Storage adapters**: all I/O goes through the [`adapter::FileSystem`]
//!   trait (local disk or in-memory)
//!
//! # Module Organization
//!
//! - `adapter`: Storage adapter trait and backends
//! - `cli`: Command-line interface using clap
//! - `config`: `config.yml` codec
//! - `diagnostics`: Injectable sink for non-fatal problems
//! - `error`: Error types and result aliases
//! - `markdown`: Task and milestone file codec
//! - `milestone`: Milestone model and progress buckets
//! - `output`: JSON envelope and human output for the CLI
//! - `paths`: Filename and directory conventions
//! - `sort`: Ordering, grouping and pagination
//! - `store`: The entity store
//! - `task`: Task model, updates and filters

pub mod adapter;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod markdown;
pub mod milestone;
pub mod output;
pub mod paths;
pub mod sort;
pub mod store;
pub mod task;

pub use error::{Error, Result};
pub use store::{InitReport, Store, StoreOptions};
