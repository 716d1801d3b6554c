//! Rendering of command results: a JSON envelope for scripts and a short
//! aligned report for people.

use serde::Serialize;

use crate::error::{Error, Result};

pub const SCHEMA_VERSION: &str = "backlog.v1";

#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub json: bool,
    pub quiet: bool,
}

/// Trailing blocks of a report, in print order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Detail,
    Warning,
    NextStep,
}

impl Block {
    const ORDER: [Block; 3] = [Block::Detail, Block::Warning, Block::NextStep];

    fn heading(self) -> Option<&'static str> {
        match self {
            Block::Detail => None,
            Block::Warning => Some("Warnings:"),
            Block::NextStep => Some("Next:"),
        }
    }
}

/// What a command shows a person. Warnings and next steps also travel in
/// the JSON envelope.
#[derive(Debug, Clone)]
pub struct HumanOutput {
    header: String,
    fields: Vec<(String, String)>,
    lines: Vec<(Block, String)>,
}

impl HumanOutput {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            fields: Vec::new(),
            lines: Vec::new(),
        }
    }

    pub fn push_summary(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.push((key.into(), value.into()));
    }

    pub fn push_detail(&mut self, value: impl Into<String>) {
        self.lines.push((Block::Detail, value.into()));
    }

    pub fn push_warning(&mut self, value: impl Into<String>) {
        self.lines.push((Block::Warning, value.into()));
    }

    pub fn push_next_step(&mut self, value: impl Into<String>) {
        self.lines.push((Block::NextStep, value.into()));
    }

    fn block(&self, block: Block) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .filter(move |(kind, _)| *kind == block)
            .map(|(_, line)| line.as_str())
    }

    fn render(&self) -> String {
        let mut out = vec![self.header.clone()];

        let width = self.fields.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
        for (key, value) in &self.fields {
            if value.is_empty() {
                out.push(format!("  {key}"));
            } else {
                out.push(format!("  {:<width$}  {value}", format!("{key}:"), width = width + 1));
            }
        }

        for block in Block::ORDER {
            let mut items = self.block(block).peekable();
            if items.peek().is_none() {
                continue;
            }
            out.push(String::new());
            out.extend(block.heading().map(str::to_string));
            out.extend(items.map(|item| format!("  {item}")));
        }

        out.join("\n")
    }
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum Status {
    Success,
    Error,
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    code: i32,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl ErrorBody {
    fn new(err: &Error) -> Self {
        let kind = if err.exit_code() == 2 {
            "user_error"
        } else {
            "operation_failed"
        };
        Self {
            message: err.to_string(),
            code: err.exit_code(),
            kind,
            details: err.details(),
        }
    }
}

/// One envelope shape for every outcome; exactly one of `data` and `error`
/// is present.
#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    schema_version: &'static str,
    command: &'a str,
    status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    next_steps: Vec<&'a str>,
}

fn print_json<T: Serialize>(envelope: &Envelope<'_, T>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(envelope)?);
    Ok(())
}

pub fn emit_success<T: Serialize>(
    options: OutputOptions,
    command: &str,
    data: &T,
    human: Option<&HumanOutput>,
) -> Result<()> {
    if options.json {
        let collect = |block: Block| -> Vec<&str> {
            human
                .map(|h| h.block(block).collect())
                .unwrap_or_default()
        };
        return print_json(&Envelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: Status::Success,
            data: Some(data),
            error: None,
            warnings: collect(Block::Warning),
            next_steps: collect(Block::NextStep),
        });
    }

    if let Some(human) = human.filter(|_| !options.quiet) {
        println!("{}", human.render());
    }
    Ok(())
}

pub fn emit_error(command: &str, err: &Error, json: bool) -> Result<()> {
    let hint = recovery_hint(err);
    if json {
        return print_json(&Envelope::<()> {
            schema_version: SCHEMA_VERSION,
            command,
            status: Status::Error,
            data: None,
            error: Some(ErrorBody::new(err)),
            warnings: Vec::new(),
            next_steps: hint.into_iter().collect(),
        });
    }

    eprintln!("error: {err}");
    if let Some(hint) = hint {
        eprintln!("hint: {hint}");
    }
    Ok(())
}

fn recovery_hint(err: &Error) -> Option<&'static str> {
    match err {
        Error::NotAProject(_) => Some("backlog init <name>"),
        Error::TaskNotFound(_) => Some("backlog task list"),
        Error::MilestoneNotFound(_) => Some("backlog milestone list"),
        _ => None,
    }
}

/// Command name for error envelopes, e.g. `"task new"`.
pub fn infer_command_name_from_args() -> String {
    command_name(std::env::args().skip(1))
}

fn command_name(args: impl IntoIterator<Item = String>) -> String {
    let mut words = Vec::new();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--root" | "--diagnostics" => {
                args.next();
            }
            flag if flag.starts_with('-') => {}
            _ => words.push(arg),
        }
    }
    match words.as_slice() {
        [] => "backlog".to_string(),
        [group, sub, ..] if group == "task" || group == "milestone" => format!("{group} {sub}"),
        [first, ..] => first.clone(),
    }
}
