//! Text codec for task and milestone files.
//!
//! A file is a metadata block followed by a markdown body:
//!
//! ```text
//! ---
//! status: In Progress
//! priority: high
//! labels: [backend, auth]
//! milestone: m-0
//! created_date: 2025-06-01
//! ---
//!
//! # Fix login
//!
//! Users cannot log in with SSO.
//!
//! ## Acceptance Criteria
//!
//! - [x] #1 SSO login works
//! - [ ] #2 Regression test added
//!
//! ## Implementation Plan
//!
//! ...
//! ```
//!
//! Metadata lines are `key: value`; list values use `[a, b]` (a YAML-style
//! block list of `- item` lines is accepted too). Unknown keys are ignored.
//! Serialization regenerates the body from structured fields, so body text
//! outside recognized sections is not preserved across a rewrite.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::milestone::Milestone;
use crate::paths::{extract_index_from_path, milestone_id_from_filename, source_from_path};
use crate::task::{AcceptanceCriterion, Priority, Task, FALLBACK_STATUS};

const DELIMITER: &str = "---";
const SECTION_DESCRIPTION: &str = "Description";
const SECTION_ACCEPTANCE: &str = "Acceptance Criteria";
const SECTION_PLAN: &str = "Implementation Plan";
const SECTION_NOTES: &str = "Implementation Notes";

static CHECKBOX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[-*]\s+\[([ xX])\]\s*(?:#\d+\s+)?(.*)$").expect("valid checkbox regex")
});

/// Per-file parse failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("{path}: metadata block opened with '---' but never closed")]
    UnterminatedMetadata { path: String },

    #[error("{path}: invalid value '{value}' for '{key}': {reason}")]
    InvalidValue {
        path: String,
        key: String,
        value: String,
        reason: String,
    },
}

/// A metadata value as written in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaValue {
    Scalar(String),
    List(Vec<String>),
}

impl MetaValue {
    fn into_scalar(self) -> Option<String> {
        match self {
            MetaValue::Scalar(value) if !value.is_empty() => Some(value),
            MetaValue::Scalar(_) => None,
            MetaValue::List(values) => values.into_iter().next(),
        }
    }

    fn into_list(self) -> Vec<String> {
        match self {
            MetaValue::Scalar(value) if value.is_empty() => Vec::new(),
            MetaValue::Scalar(value) => vec![value],
            MetaValue::List(values) => values,
        }
    }
}

/// Metadata entries in file order plus the trimmed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub metadata: Vec<(String, MetaValue)>,
    pub body: String,
}

/// Split a leading `---` delimited metadata block from the body.
pub fn split_document(content: &str, path: &str) -> Result<Document, ParseError> {
    let normalized = content.replace("\r\n", "\n");
    let text = normalized.trim_start_matches('\u{feff}');
    let lines: Vec<&str> = text.lines().collect();

    let start = match lines.iter().position(|line| !line.trim().is_empty()) {
        Some(idx) if lines[idx].trim_end() == DELIMITER => idx,
        _ => {
            return Ok(Document {
                metadata: Vec::new(),
                body: text.trim().to_string(),
            })
        }
    };

    let end = lines[start + 1..]
        .iter()
        .position(|line| line.trim_end() == DELIMITER)
        .map(|offset| start + 1 + offset)
        .ok_or_else(|| ParseError::UnterminatedMetadata {
            path: path.to_string(),
        })?;

    Ok(Document {
        metadata: parse_metadata(&lines[start + 1..end]),
        body: lines[end + 1..].join("\n").trim().to_string(),
    })
}

fn parse_metadata(lines: &[&str]) -> Vec<(String, MetaValue)> {
    let mut entries: Vec<(String, MetaValue)> = Vec::new();
    let mut idx = 0;
    while idx < lines.len() {
        let line = lines[idx];
        idx += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = trimmed.split_once(':') else {
            continue;
        };
        let key = key.trim().to_string();
        let value = value.trim();

        if value.is_empty() {
            // Block list: following `- item` lines belong to this key.
            let mut items = Vec::new();
            while idx < lines.len() {
                let next = lines[idx].trim();
                match next.strip_prefix('-') {
                    Some(item) if !next.starts_with(DELIMITER) => {
                        let item = unquote(item.trim());
                        if !item.is_empty() {
                            items.push(item);
                        }
                        idx += 1;
                    }
                    _ => break,
                }
            }
            if items.is_empty() {
                entries.push((key, MetaValue::Scalar(String::new())));
            } else {
                entries.push((key, MetaValue::List(items)));
            }
        } else if value.starts_with('[') && value.ends_with(']') {
            entries.push((key, MetaValue::List(split_list(&value[1..value.len() - 1]))));
        } else {
            entries.push((key, MetaValue::Scalar(unquote(value))));
        }
    }
    entries
}

/// Split a comma list, honouring quotes, and unquote each element.
pub fn split_list(inner: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = inner.chars().peekable();

    while let Some(ch) = chars.next() {
        match quote {
            Some(q) if ch == q => {
                current.push(ch);
                quote = None;
            }
            Some('"') if ch == '\\' => {
                current.push(ch);
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            Some(_) => current.push(ch),
            None if ch == '"' || ch == '\'' => {
                current.push(ch);
                quote = Some(ch);
            }
            None if ch == ',' => {
                push_item(&mut items, &current);
                current.clear();
            }
            None => current.push(ch),
        }
    }
    push_item(&mut items, &current);
    items
}

fn push_item(items: &mut Vec<String>, raw: &str) {
    let value = unquote(raw.trim());
    if !value.is_empty() {
        items.push(value);
    }
}

/// Remove one level of matching quotes.
pub fn unquote(value: &str) -> String {
    let value = value.trim();
    if value.len() >= 2 {
        if value.starts_with('"') && value.ends_with('"') {
            let inner = &value[1..value.len() - 1];
            let mut out = String::with_capacity(inner.len());
            let mut chars = inner.chars();
            while let Some(ch) = chars.next() {
                if ch == '\\' {
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                } else {
                    out.push(ch);
                }
            }
            return out;
        }
        if value.starts_with('\'') && value.ends_with('\'') {
            return value[1..value.len() - 1].replace("''", "'");
        }
    }
    value.to_string()
}

/// Quote a scalar when writing it bare would not read back identically.
pub fn quote_scalar(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value.trim() != value
        || value.starts_with(['"', '\'', '[', '{', '#', '&', '*', '!', '|', '>', '%', '@', '`'])
        || value.contains(": ")
        || value.contains(" #")
        || value.contains('\n');
    if needs_quotes {
        double_quote(value)
    } else {
        value.to_string()
    }
}

fn quote_list_item(value: &str) -> String {
    let needs_quotes = value.trim() != value
        || value.contains([',', '[', ']', '"', '\''])
        || value.contains('\n');
    if needs_quotes {
        double_quote(value)
    } else {
        value.to_string()
    }
}

fn double_quote(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', " ");
    format!("\"{escaped}\"")
}

fn format_list(values: &[String]) -> String {
    let items: Vec<String> = values.iter().map(|v| quote_list_item(v)).collect();
    format!("[{}]", items.join(", "))
}

/// Lower-case key with `_`/`-` removed, so `created_date` and `createdDate`
/// read the same.
pub(crate) fn canonical_key(key: &str) -> String {
    key.chars()
        .filter(|ch| *ch != '_' && *ch != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

// =========================================================================
// Task codec
// =========================================================================

/// Parse a task file. The id comes from the filename.
pub fn parse_task(content: &str, file_path: &str) -> Result<Task, ParseError> {
    let document = split_document(content, file_path)?;
    let index = extract_index_from_path(file_path);

    let mut task = Task::new(index.id.clone(), String::new(), FALLBACK_STATUS, "");
    task.file_path = file_path.to_string();
    task.source = source_from_path(file_path);
    let mut created_date = None;

    for (key, value) in document.metadata {
        match canonical_key(&key).as_str() {
            "status" => {
                if let Some(status) = value.into_scalar() {
                    task.status = status;
                }
            }
            "priority" => {
                if let Some(raw) = value.into_scalar() {
                    let priority = raw.parse::<Priority>().map_err(|reason| {
                        ParseError::InvalidValue {
                            path: file_path.to_string(),
                            key: key.clone(),
                            value: raw.clone(),
                            reason,
                        }
                    })?;
                    task.priority = Some(priority);
                }
            }
            "assignee" | "assignees" => task.assignee = value.into_list(),
            "labels" => task.labels = value.into_list(),
            "milestone" => task.milestone = value.into_scalar(),
            "dependencies" => task.dependencies = value.into_list(),
            "parenttaskid" | "parent" => task.parent_task_id = value.into_scalar(),
            "ordinal" => {
                if let Some(raw) = value.into_scalar() {
                    let ordinal = raw.trim().parse::<i64>().map_err(|err| {
                        ParseError::InvalidValue {
                            path: file_path.to_string(),
                            key: key.clone(),
                            value: raw.clone(),
                            reason: err.to_string(),
                        }
                    })?;
                    task.ordinal = Some(ordinal);
                }
            }
            "createddate" => created_date = value.into_scalar(),
            "updateddate" => task.updated_date = value.into_scalar(),
            _ => {}
        }
    }

    task.created_date =
        created_date.unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());

    let body = parse_body(&document.body);
    task.title = body.title.unwrap_or_else(|| format!("Task {}", task.id));
    task.description = body.description;
    task.implementation_plan = body.plan;
    task.implementation_notes = body.notes;
    task.acceptance_criteria = body.criteria;
    task.raw_content = document.body;

    Ok(task)
}

/// Render a task file. Only fields with values are written.
pub fn serialize_task(task: &Task) -> String {
    let mut out = String::new();
    out.push_str(DELIMITER);
    out.push('\n');

    push_scalar(&mut out, "status", Some(&task.status));
    push_scalar(&mut out, "priority", task.priority.map(|p| p.as_str()));
    push_list(&mut out, "assignee", &task.assignee);
    push_list(&mut out, "labels", &task.labels);
    push_scalar(&mut out, "milestone", task.milestone.as_deref());
    push_list(&mut out, "dependencies", &task.dependencies);
    push_scalar(&mut out, "parent_task_id", task.parent_task_id.as_deref());
    if let Some(ordinal) = task.ordinal {
        out.push_str(&format!("ordinal: {ordinal}\n"));
    }
    push_scalar(&mut out, "created_date", Some(&task.created_date));
    push_scalar(&mut out, "updated_date", task.updated_date.as_deref());

    out.push_str(DELIMITER);
    out.push_str("\n\n");
    out.push_str(&format!("# {}\n", task.title.trim()));

    if let Some(description) = non_empty(task.description.as_deref()) {
        out.push('\n');
        out.push_str(description);
        out.push('\n');
    }

    if !task.acceptance_criteria.is_empty() {
        out.push_str(&format!("\n## {SECTION_ACCEPTANCE}\n\n"));
        for (pos, item) in task.acceptance_criteria.iter().enumerate() {
            let mark = if item.checked { 'x' } else { ' ' };
            out.push_str(&format!("- [{mark}] #{} {}\n", pos + 1, item.text.trim()));
        }
    }

    push_section(&mut out, SECTION_PLAN, task.implementation_plan.as_deref());
    push_section(&mut out, SECTION_NOTES, task.implementation_notes.as_deref());

    out
}

fn push_scalar(out: &mut String, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        out.push_str(&format!("{key}: {}\n", quote_scalar(value)));
    }
}

fn push_list(out: &mut String, key: &str, values: &[String]) {
    if !values.is_empty() {
        out.push_str(&format!("{key}: {}\n", format_list(values)));
    }
}

fn push_section(out: &mut String, heading: &str, text: Option<&str>) {
    if let Some(text) = non_empty(text) {
        out.push_str(&format!("\n## {heading}\n\n{text}\n"));
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Default)]
struct ParsedBody {
    title: Option<String>,
    description: Option<String>,
    plan: Option<String>,
    notes: Option<String>,
    criteria: Vec<AcceptanceCriterion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Description,
    Acceptance,
    Plan,
    Notes,
}

fn section_for(heading: &str) -> Option<Section> {
    let heading = heading.trim().trim_end_matches(':');
    if heading.eq_ignore_ascii_case(SECTION_DESCRIPTION) {
        Some(Section::Description)
    } else if heading.eq_ignore_ascii_case(SECTION_ACCEPTANCE) {
        Some(Section::Acceptance)
    } else if heading.eq_ignore_ascii_case(SECTION_PLAN) {
        Some(Section::Plan)
    } else if heading.eq_ignore_ascii_case(SECTION_NOTES) {
        Some(Section::Notes)
    } else {
        None
    }
}

fn parse_body(body: &str) -> ParsedBody {
    let mut parsed = ParsedBody::default();
    let mut section = Section::Preamble;
    let mut preamble = Vec::new();
    let mut description = Vec::new();
    let mut plan = Vec::new();
    let mut notes = Vec::new();

    for line in body.lines() {
        if parsed.title.is_none() {
            if let Some(title) = line.strip_prefix("# ") {
                parsed.title = Some(title.trim().to_string());
                continue;
            }
        }

        if let Some(caps) = CHECKBOX_RE.captures(line) {
            parsed.criteria.push(AcceptanceCriterion {
                index: parsed.criteria.len() + 1,
                text: caps[2].trim().to_string(),
                checked: !caps[1].trim().is_empty(),
            });
            continue;
        }

        if let Some(heading) = line.strip_prefix("## ") {
            if let Some(next) = section_for(heading) {
                section = next;
                continue;
            }
        }

        match section {
            Section::Preamble => preamble.push(line),
            Section::Description => description.push(line),
            Section::Plan => plan.push(line),
            Section::Notes => notes.push(line),
            // Only checkbox items are kept from this section.
            Section::Acceptance => {}
        }
    }

    parsed.description = join_block(&description).or_else(|| join_block(&preamble));
    parsed.plan = join_block(&plan);
    parsed.notes = join_block(&notes);
    parsed
}

fn join_block(lines: &[&str]) -> Option<String> {
    let text = lines
        .iter()
        .filter(|line| !is_marker_comment(line))
        .copied()
        .collect::<Vec<_>>()
        .join("\n");
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// `<!-- SECTION:... -->` / `<!-- AC:... -->` markers written by other tools.
fn is_marker_comment(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with("<!--")
        && trimmed.ends_with("-->")
        && (trimmed.contains("SECTION:") || trimmed.contains("AC:"))
}

// =========================================================================
// Milestone codec
// =========================================================================

/// Parse a milestone file. The id falls back to the filename, the title to
/// the first heading and then to the id.
pub fn parse_milestone(content: &str, file_path: &str) -> Result<Milestone, ParseError> {
    let document = split_document(content, file_path)?;
    let mut id = None;
    let mut title = None;
    let mut tasks = Vec::new();

    for (key, value) in document.metadata {
        match canonical_key(&key).as_str() {
            "id" => id = value.into_scalar(),
            "title" => title = value.into_scalar(),
            "tasks" => tasks = value.into_list(),
            _ => {}
        }
    }

    let id = id
        .map(|id| id.trim().to_lowercase())
        .or_else(|| milestone_id_from_filename(file_path))
        .unwrap_or_else(|| extract_index_from_path(file_path).id);

    let body = parse_body(&document.body);
    let title = title
        .or(body.title)
        .unwrap_or_else(|| id.clone());

    Ok(Milestone {
        id,
        title,
        description: body.description,
        tasks,
        file_path: file_path.to_string(),
    })
}

/// Render a milestone file.
pub fn serialize_milestone(milestone: &Milestone) -> String {
    let mut out = String::new();
    out.push_str(DELIMITER);
    out.push('\n');
    push_scalar(&mut out, "id", Some(&milestone.id));
    push_scalar(&mut out, "title", Some(&milestone.title));
    out.push_str(&format!("tasks: {}\n", format_list(&milestone.tasks)));
    out.push_str(DELIMITER);
    out.push('\n');
    push_section(&mut out, SECTION_DESCRIPTION, milestone.description.as_deref());
    out
}
