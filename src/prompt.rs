//! Prompt assembly: inline history digest, attachments and memories.

use std::path::{Path, PathBuf};

use bridge_protocol::{Attachment, MemoryEntry, MemoryScope, Message, Role};

pub const HISTORY_OPEN: &str = "[Conversation history]";
pub const HISTORY_CLOSE: &str = "[/Conversation history]";
pub const NEW_MESSAGE_MARKER: &str = "[New message]";
pub const MEMORIES_HEADER: &str = "[Memories]";

const ENTRY_SEPARATOR: &str = "\n\n";

const SUMMARY_INSTRUCTIONS: &str = "Summarize the conversation below so it can replace the \
full history in a later session. Keep decisions, file paths, open tasks and any facts the \
user asked to remember. Reply with the summary only.";

/// How much prior conversation is inlined when no session is resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryMode {
    Full,
    /// Bounded to roughly this many characters.
    Compact { budget_chars: usize },
}

impl HistoryMode {
    pub fn budget(self) -> Option<usize> {
        match self {
            Self::Full => None,
            Self::Compact { budget_chars } => Some(budget_chars),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PromptInput<'a> {
    pub user_text: &'a str,
    pub messages: &'a [Message],
    pub attachments: &'a [Attachment],
    pub upload_dir: &'a Path,
    pub memories: &'a [MemoryEntry],
    /// A session id will be passed to the agent, so history is not inlined.
    pub resuming: bool,
    pub history_mode: HistoryMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPrompt {
    pub prompt: String,
    pub image_paths: Vec<PathBuf>,
    /// An inline history block was included.
    pub history_sent: bool,
}

pub fn assemble(input: &PromptInput<'_>) -> AssembledPrompt {
    let (image_paths, file_paths): (Vec<PathBuf>, Vec<PathBuf>) = {
        let (images, files): (Vec<&Attachment>, Vec<&Attachment>) =
            input.attachments.iter().partition(|attachment| attachment.is_image());
        (
            images.iter().map(|attachment| attachment.path_in(input.upload_dir)).collect(),
            files.iter().map(|attachment| attachment.path_in(input.upload_dir)).collect(),
        )
    };

    let history = if input.resuming {
        None
    } else {
        history_digest(input.messages, input.user_text, input.history_mode.budget())
    };

    let mut sections = Vec::new();
    match &history {
        Some(history) => {
            sections.push(history.clone());
            sections.push(format!("{NEW_MESSAGE_MARKER}\n{}", input.user_text));
        }
        None => sections.push(input.user_text.to_string()),
    }
    sections.extend(attachment_block(&file_paths));
    sections.extend(memory_block(input.memories));

    AssembledPrompt {
        prompt: sections.join(ENTRY_SEPARATOR),
        image_paths,
        history_sent: history.is_some(),
    }
}

/// Wrapped digest of prior messages, oldest first, or `None` when nothing qualifies.
///
/// Messages are taken newest first until the next one would exceed `budget`.
pub fn history_digest(messages: &[Message], new_text: &str, budget: Option<usize>) -> Option<String> {
    let mut entries = Vec::new();
    let mut used = 0;
    let mut skipped_echo = false;

    for message in messages.iter().rev() {
        if message.summarized || message.text.trim().is_empty() {
            continue;
        }

        // The host may already have appended the message being sent.
        if !skipped_echo && message.role == Role::User {
            skipped_echo = true;
            if message.text.trim() == new_text.trim() {
                continue;
            }
        }

        let entry = format!("[{}]\n{}", message.role.label(), message.text.trim());
        let cost = entry.chars().count() + ENTRY_SEPARATOR.len();
        if budget.is_some_and(|budget| used + cost > budget) {
            break;
        }
        used += cost;
        entries.push(entry);
    }

    if entries.is_empty() {
        return None;
    }

    entries.reverse();
    Some(format!(
        "{HISTORY_OPEN}\n{}\n{HISTORY_CLOSE}",
        entries.join(ENTRY_SEPARATOR)
    ))
}

pub fn attachment_block(paths: &[PathBuf]) -> Option<String> {
    match paths {
        [] => None,
        [path] => Some(format!("Attached file: {}", path.display())),
        paths => {
            let listed = paths
                .iter()
                .map(|path| format!("- {}", path.display()))
                .collect::<Vec<_>>()
                .join("\n");
            Some(format!("Attached files:\n{listed}"))
        }
    }
}

pub fn memory_block(memories: &[MemoryEntry]) -> Option<String> {
    let enabled = |scope: MemoryScope| {
        memories
            .iter()
            .filter(move |memory| memory.enabled && memory.scope == scope)
            .filter(|memory| !memory.text.trim().is_empty())
            .map(|memory| format!("- {}", memory.text.trim()))
            .collect::<Vec<_>>()
    };

    let global = enabled(MemoryScope::Global);
    let project = enabled(MemoryScope::Project);
    if global.is_empty() && project.is_empty() {
        return None;
    }

    let mut block = vec![MEMORIES_HEADER.to_string()];
    if !global.is_empty() {
        block.push("Global:".to_string());
        block.extend(global);
    }
    if !project.is_empty() {
        block.push("Project:".to_string());
        block.extend(project);
    }
    Some(block.join("\n"))
}

/// One-shot prompt asking the agent to condense `messages`.
pub fn summary_prompt(messages: &[Message]) -> String {
    let history = history_digest(messages, "", None).unwrap_or_default();
    format!("{SUMMARY_INSTRUCTIONS}{ENTRY_SEPARATOR}{history}")
}
