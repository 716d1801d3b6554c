//! Project configuration codec
//!
//! Handles `backlog/config.yml`. The format is line-oriented `key: value`
//! with `[a, b]` arrays. It is not general YAML: only the keys listed in
//! [`BacklogConfig`] are recognized. Unknown keys, blank lines and `#`
//! comments are skipped, and malformed values fall back to defaults, so
//! parsing never fails.

use serde::{Deserialize, Serialize};

use crate::markdown::{canonical_key, split_list, unquote};
use crate::task::FALLBACK_STATUS;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklogConfig {
    /// Display name of the project
    pub project_name: String,

    /// Status given to new tasks; falls back to the first status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_status: Option<String>,

    /// Valid statuses in kanban column order
    pub statuses: Vec<String>,

    /// Known labels
    pub labels: Vec<String>,

    /// Milestone ids (legacy mirror of the milestones directory)
    pub milestones: Vec<String>,

    /// Date format for created/updated dates
    pub date_format: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_assignee: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_reporter: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_column_width: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_editor: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_open_browser: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_port: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_operations: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_commit: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub zero_padded_ids: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bypass_git_hooks: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_active_branches: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_branch_days: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_prefix: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_datetime_in_dates: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_status_change: Option<String>,
}

fn default_project_name() -> String {
    "Backlog".to_string()
}

fn default_statuses() -> Vec<String> {
    vec![
        "To Do".to_string(),
        "In Progress".to_string(),
        "Done".to_string(),
    ]
}

fn default_date_format() -> String {
    "yyyy-mm-dd".to_string()
}

impl Default for BacklogConfig {
    fn default() -> Self {
        Self {
            project_name: default_project_name(),
            default_status: None,
            statuses: default_statuses(),
            labels: Vec::new(),
            milestones: Vec::new(),
            date_format: default_date_format(),
            default_assignee: None,
            default_reporter: None,
            max_column_width: None,
            default_editor: None,
            auto_open_browser: None,
            default_port: None,
            remote_operations: None,
            auto_commit: None,
            zero_padded_ids: None,
            bypass_git_hooks: None,
            check_active_branches: None,
            active_branch_days: None,
            task_prefix: None,
            include_datetime_in_dates: None,
            on_status_change: None,
        }
    }
}

impl BacklogConfig {
    /// Defaults with a project name.
    pub fn new(project_name: impl Into<String>) -> Self {
        let mut config = Self::default();
        let name = project_name.into();
        if !name.trim().is_empty() {
            config.project_name = name.trim().to_string();
        }
        config
    }

    /// Status for new tasks: the configured default when it is one of the
    /// statuses, else the first status.
    pub fn default_status(&self) -> String {
        self.default_status
            .as_deref()
            .and_then(|status| self.resolve_status(status))
            .or_else(|| self.statuses.first().cloned())
            .unwrap_or_else(|| FALLBACK_STATUS.to_string())
    }

    /// Configured spelling of `requested` (case-insensitive), if valid.
    pub fn resolve_status(&self, requested: &str) -> Option<String> {
        let trimmed = requested.trim();
        self.statuses
            .iter()
            .find(|status| status.trim().eq_ignore_ascii_case(trimmed))
            .cloned()
    }

    /// Today's date in the configured format.
    pub fn today(&self) -> String {
        let with_time = self.include_datetime_in_dates.unwrap_or(false)
            || self.date_format.to_ascii_lowercase().contains("hh");
        let format = if with_time { "%Y-%m-%d %H:%M" } else { "%Y-%m-%d" };
        chrono::Local::now().format(format).to_string()
    }
}

/// Parse `config.yml` content. Never fails.
pub fn parse_config(content: &str) -> BacklogConfig {
    let mut config = BacklogConfig::default();

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, raw)) = trimmed.split_once(':') else {
            continue;
        };
        let raw = raw.trim();

        match canonical_key(key).as_str() {
            "projectname" => {
                if let Some(name) = scalar(raw) {
                    config.project_name = name;
                }
            }
            "defaultstatus" => config.default_status = scalar(raw),
            "statuses" => config.statuses = list(raw),
            "labels" => config.labels = list(raw),
            "milestones" => config.milestones = list(raw),
            "dateformat" => {
                if let Some(format) = scalar(raw) {
                    config.date_format = format;
                }
            }
            "defaultassignee" => config.default_assignee = scalar(raw),
            "defaultreporter" => config.default_reporter = scalar(raw),
            "maxcolumnwidth" => config.max_column_width = number(raw),
            "defaulteditor" => config.default_editor = scalar(raw),
            "autoopenbrowser" => config.auto_open_browser = boolean(raw),
            "defaultport" => config.default_port = number(raw),
            "remoteoperations" => config.remote_operations = boolean(raw),
            "autocommit" => config.auto_commit = boolean(raw),
            "zeropaddedids" => config.zero_padded_ids = number(raw),
            "bypassgithooks" => config.bypass_git_hooks = boolean(raw),
            "checkactivebranches" => config.check_active_branches = boolean(raw),
            "activebranchdays" => config.active_branch_days = number(raw),
            "taskprefix" => config.task_prefix = scalar(raw),
            "includedatetimeindates" => config.include_datetime_in_dates = boolean(raw),
            "onstatuschange" => config.on_status_change = scalar(raw),
            _ => {}
        }
    }

    if config.statuses.is_empty() {
        config.statuses = default_statuses();
    }
    if config.project_name.trim().is_empty() {
        config.project_name = default_project_name();
    }
    config
}

/// Render `config.yml`. Only keys with values are written, in a fixed order.
pub fn serialize_config(config: &BacklogConfig) -> String {
    let mut out = String::new();
    push_string(&mut out, "project_name", Some(&config.project_name));
    push_string(&mut out, "default_status", config.default_status.as_deref());
    push_string(&mut out, "default_assignee", config.default_assignee.as_deref());
    push_string(&mut out, "default_reporter", config.default_reporter.as_deref());
    push_array(&mut out, "statuses", &config.statuses);
    push_array(&mut out, "labels", &config.labels);
    push_array(&mut out, "milestones", &config.milestones);
    push_string(&mut out, "date_format", Some(&config.date_format));
    push_value(&mut out, "max_column_width", config.max_column_width);
    push_string(&mut out, "default_editor", config.default_editor.as_deref());
    push_value(&mut out, "auto_open_browser", config.auto_open_browser);
    push_value(&mut out, "default_port", config.default_port);
    push_value(&mut out, "remote_operations", config.remote_operations);
    push_value(&mut out, "auto_commit", config.auto_commit);
    push_value(&mut out, "zero_padded_ids", config.zero_padded_ids);
    push_value(&mut out, "bypass_git_hooks", config.bypass_git_hooks);
    push_value(&mut out, "check_active_branches", config.check_active_branches);
    push_value(&mut out, "active_branch_days", config.active_branch_days);
    push_string(&mut out, "task_prefix", config.task_prefix.as_deref());
    push_value(
        &mut out,
        "include_datetime_in_dates",
        config.include_datetime_in_dates,
    );
    push_string(&mut out, "on_status_change", config.on_status_change.as_deref());
    out
}

fn scalar(raw: &str) -> Option<String> {
    let value = unquote(raw);
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn list(raw: &str) -> Vec<String> {
    if raw.starts_with('[') && raw.ends_with(']') {
        split_list(&raw[1..raw.len() - 1])
    } else {
        scalar(raw).into_iter().collect()
    }
}

fn boolean(raw: &str) -> Option<bool> {
    match unquote(raw).to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => Some(true),
        "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn number<T: std::str::FromStr>(raw: &str) -> Option<T> {
    unquote(raw).parse().ok()
}

fn quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn push_string(out: &mut String, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        out.push_str(&format!("{key}: {}\n", quoted(value)));
    }
}

fn push_array(out: &mut String, key: &str, values: &[String]) {
    let items: Vec<String> = values.iter().map(|v| quoted(v)).collect();
    out.push_str(&format!("{key}: [{}]\n", items.join(", ")));
}

fn push_value<T: std::fmt::Display>(out: &mut String, key: &str, value: Option<T>) {
    if let Some(value) = value {
        out.push_str(&format!("{key}: {value}\n"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_expected() {
        let cfg = BacklogConfig::default();
        assert_eq!(cfg.project_name, "Backlog");
        assert_eq!(cfg.statuses, vec!["To Do", "In Progress", "Done"]);
        assert_eq!(cfg.default_status(), "To Do");
        assert_eq!(cfg.date_format, "yyyy-mm-dd");
        assert!(cfg.labels.is_empty());
    }

    #[test]
    fn parse_reads_known_keys() {
        let content = r#"
# project settings
project_name: "Rocket"
default_status: "review"
statuses: ["Backlog", 'Review', "Shipped, finally"]
labels: [ui, api]
milestones: []
date_format: yyyy-mm-dd hh:mm
auto_commit: true
default_port: 6420
max_column_width: wide
mystery_key: whatever
not a key value line
"#;
        let cfg = parse_config(content);
        assert_eq!(cfg.project_name, "Rocket");
        assert_eq!(cfg.statuses, vec!["Backlog", "Review", "Shipped, finally"]);
        assert_eq!(cfg.default_status(), "Review");
        assert_eq!(cfg.labels, vec!["ui", "api"]);
        assert!(cfg.milestones.is_empty());
        assert_eq!(cfg.date_format, "yyyy-mm-dd hh:mm");
        assert_eq!(cfg.auto_commit, Some(true));
        assert_eq!(cfg.default_port, Some(6420));
        assert_eq!(cfg.max_column_width, None);
        assert_eq!(cfg.today().len(), 16);
    }

    #[test]
    fn missing_required_fields_fall_back() {
        let cfg = parse_config("statuses: []\nproject_name: \"\"\n");
        assert_eq!(cfg.project_name, "Backlog");
        assert_eq!(cfg.statuses, vec!["To Do", "In Progress", "Done"]);
    }

    #[test]
    fn unknown_default_status_uses_first_status() {
        let cfg = parse_config("statuses: [Open, Closed]\ndefault_status: Missing\n");
        assert_eq!(cfg.default_status(), "Open");
        assert_eq!(cfg.resolve_status(" closed "), Some("Closed".to_string()));
        assert_eq!(cfg.resolve_status("Pending"), None);
    }

    #[test]
    fn serialize_round_trips() {
        let mut cfg = BacklogConfig::new("My \"quoted\" project");
        cfg.labels = vec!["a".into(), "b, c".into()];
        cfg.milestones = vec!["m-0".into()];
        cfg.auto_commit = Some(false);
        cfg.default_port = Some(8080);
        cfg.task_prefix = Some("task".into());

        let text = serialize_config(&cfg);
        assert!(text.starts_with("project_name: \"My \\\"quoted\\\" project\"\n"));
        assert!(text.contains("statuses: [\"To Do\", \"In Progress\", \"Done\"]\n"));
        assert!(!text.contains("default_editor"));
        assert_eq!(parse_config(&text), cfg);
    }
}
