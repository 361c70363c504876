//! Markdown transcript assembled from classified agent items.
//!
//! Tool calls are rendered as trace regions opened by [`TRACE_OPEN`] and closed
//! by [`TRACE_CLOSE`]. Every chunk appended to the transcript is also returned
//! as a `delta` notification so a live client can mirror the text exactly; a
//! `resync` carries the whole text when assistant output rewrites it.

use std::collections::HashSet;

use bridge_protocol::Notification;
use exec_events::{Item, ToolResult, ToolStart};

pub const TRACE_OPEN: &str = ":::trace";
pub const TRACE_CLOSE: &str = ":::";

const RESULT_PREVIEW_CHARS: usize = 500;
const TRUNCATION_MARKER: &str = "\n[truncated]";
const ERROR_PREFIX: &str = "Error: ";
const EMPTY_OUTPUT: &str = "(no output)";

#[derive(Debug, Clone, PartialEq, Eq)]
struct OpenTrace {
    id: Option<String>,
    command: Option<String>,
}

#[derive(Debug, Default)]
pub struct TranscriptBuilder {
    text: String,
    open_traces: Vec<OpenTrace>,
    started_ids: HashSet<String>,
    finished_ids: HashSet<String>,
    traces_opened: usize,
    traces_closed: usize,
}

impl TranscriptBuilder {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// True once any non-whitespace text was produced.
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }

    pub fn open_trace_count(&self) -> usize {
        self.open_traces.len()
    }

    pub fn is_open(&self, id: &str) -> bool {
        self.open_traces
            .iter()
            .any(|trace| trace.id.as_deref() == Some(id))
    }

    /// `(opened, closed)` trace markers written so far.
    pub fn trace_markers(&self) -> (usize, usize) {
        (self.traces_opened, self.traces_closed)
    }

    pub fn apply(&mut self, item: &Item) -> Vec<Notification> {
        match item {
            Item::Reasoning { text, .. } if !text.trim().is_empty() => {
                vec![Notification::Thinking { text: text.clone() }]
            }
            Item::AgentMessage { text, .. } => self.agent_message(text),
            Item::ToolStart(start) => self.tool_start(start),
            Item::ToolResult(result) => self.tool_result(result),
            Item::Reasoning { .. } | Item::Other { .. } => Vec::new(),
        }
    }

    pub fn tool_start(&mut self, start: &ToolStart) -> Vec<Notification> {
        if let Some(id) = &start.id {
            // Replays of an announced call (item.completed, turn batches) are ignored.
            if !self.started_ids.insert(id.clone()) {
                return Vec::new();
            }
        }

        self.open_traces.push(OpenTrace {
            id: start.id.clone(),
            command: start.command.clone(),
        });
        self.traces_opened += 1;

        let mut block = format!("{TRACE_OPEN}\n**{}**\n", start.name);
        if let Some(command) = &start.command {
            block.push_str(&fenced(command));
        }

        let mut notifications = vec![Notification::ToolStart {
            name: start.name.clone(),
            id: start.id.clone(),
        }];
        notifications.push(self.append_block(&block));
        notifications
    }

    pub fn tool_result(&mut self, result: &ToolResult) -> Vec<Notification> {
        if let Some(id) = &result.id {
            if !self.finished_ids.insert(id.clone()) {
                return Vec::new();
            }
        }

        let matched = self.take_open_trace(result.id.as_deref());
        let command = result
            .command
            .clone()
            .or_else(|| matched.as_ref().and_then(|trace| trace.command.clone()));

        let mut block = String::new();
        if let Some(command) = &command {
            block.push_str(&fenced(command));
        }
        block.push_str(&fenced(&result_preview(&result.output, result.is_error)));
        if matched.is_some() {
            block.push_str(TRACE_CLOSE);
            block.push('\n');
            self.traces_closed += 1;
        }

        let mut notifications = vec![Notification::ToolResult {
            id: result.id.clone(),
            is_error: result.is_error,
        }];
        notifications.push(self.append_block(&block));
        notifications
    }

    /// Merges assistant text after closing any open traces.
    pub fn agent_message(&mut self, incoming: &str) -> Vec<Notification> {
        if incoming.trim().is_empty() {
            return Vec::new();
        }

        let mut notifications: Vec<Notification> = self.close_open_traces().into_iter().collect();

        match plan_merge(&self.text, incoming) {
            Merge::Keep => {}
            Merge::Replace => {
                let notification = match incoming.strip_prefix(self.text.as_str()) {
                    Some(rest) => Notification::Delta {
                        text: rest.to_string(),
                    },
                    None => Notification::Resync {
                        text: incoming.to_string(),
                    },
                };
                self.text = incoming.to_string();
                notifications.push(notification);
            }
            Merge::Append { overlap } => {
                let chunk = &incoming[overlap..];
                if !chunk.is_empty() {
                    self.text.push_str(chunk);
                    notifications.push(Notification::Delta {
                        text: chunk.to_string(),
                    });
                }
            }
        }
        notifications
    }

    /// Writes a close marker for every open trace.
    pub fn close_open_traces(&mut self) -> Option<Notification> {
        if self.open_traces.is_empty() {
            return None;
        }

        let count = self.open_traces.len();
        self.open_traces.clear();
        self.traces_closed += count;

        let block = format!("{TRACE_CLOSE}\n").repeat(count);
        Some(self.append_block(&block))
    }

    /// Resolves the trace a result belongs to: by id, or the oldest open trace
    /// when the result carries no id.
    fn take_open_trace(&mut self, id: Option<&str>) -> Option<OpenTrace> {
        let index = match id {
            Some(id) => self
                .open_traces
                .iter()
                .position(|trace| trace.id.as_deref() == Some(id))?,
            None if !self.open_traces.is_empty() => 0,
            None => return None,
        };
        Some(self.open_traces.remove(index))
    }

    /// Appends a block on its own line and returns the matching delta.
    fn append_block(&mut self, block: &str) -> Notification {
        let mut chunk = String::new();
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            chunk.push_str("\n\n");
        }
        chunk.push_str(block);
        self.text.push_str(&chunk);
        Notification::Delta { text: chunk }
    }
}

enum Merge {
    Keep,
    Replace,
    Append { overlap: usize },
}

fn plan_merge(existing: &str, incoming: &str) -> Merge {
    if existing.contains(incoming) {
        return Merge::Keep;
    }
    if !existing.is_empty() && incoming.contains(existing) {
        return Merge::Replace;
    }

    let longest = existing.len().min(incoming.len());
    let overlap = (1..=longest)
        .rev()
        .filter(|len| incoming.is_char_boundary(*len))
        .find(|len| existing.ends_with(&incoming[..*len]))
        .unwrap_or(0);
    Merge::Append { overlap }
}

/// Joins two texts, dropping the longest suffix of `existing` that prefixes `incoming`.
pub fn merge_overlapping(existing: &str, incoming: &str) -> String {
    match plan_merge(existing, incoming) {
        Merge::Keep => existing.to_string(),
        Merge::Replace => incoming.to_string(),
        Merge::Append { overlap } => format!("{existing}{}", &incoming[overlap..]),
    }
}

fn result_preview(output: &str, is_error: bool) -> String {
    let output = output.trim_end();
    let mut preview = if output.is_empty() {
        EMPTY_OUTPUT.to_string()
    } else {
        truncate_chars(output, RESULT_PREVIEW_CHARS)
    };

    if is_error {
        preview.insert_str(0, ERROR_PREFIX);
    }
    preview
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cutoff, _)) => format!("{}{TRUNCATION_MARKER}", &text[..cutoff]),
        None => text.to_string(),
    }
}

/// Fenced code block, using a fence longer than any backtick run in `content`.
fn fenced(content: &str) -> String {
    let longest_run = content
        .split(|ch: char| ch != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    let fence = "`".repeat(longest_run.max(2) + 1);
    format!("{fence}\n{}\n{fence}\n", content.trim_end_matches('\n'))
}
