//! Contract types shared between the agent bridge and its host.
//!
//! This crate defines the conversation record the bridge mutates, the
//! notifications it streams to observers, and the callback seams the host
//! implements. It excludes process handling and wire decoding.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Identifier of one conversation.
pub type ConversationId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Label used when rendering history into a prompt.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
            Self::System => "System",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    #[default]
    Idle,
    Thinking,
}

/// Token accounting attached to a finalized assistant message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub cached_input_tokens: u64,
    pub net_input_tokens: u64,
    pub display_input_tokens: u64,
    pub typed_input_tokens: Option<u64>,
    pub output_tokens: u64,
    pub reasoning_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    /// The agent exited before reporting turn completion.
    #[serde(default)]
    pub incomplete: bool,
    /// Folded into an earlier summary; excluded from inline history.
    #[serde(default)]
    pub summarized: bool,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: timestamp_now(),
            cost: None,
            duration_ms: None,
            session_id: None,
            usage: None,
            incomplete: false,
            summarized: false,
        }
    }

    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }
}

/// Sandbox and write permissions used to pick agent CLI flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionMode {
    pub sandboxed: bool,
    pub writes_allowed: bool,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        Self {
            sandboxed: true,
            writes_allowed: true,
        }
    }
}

/// Conversation record owned by the host and lent to the bridge for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub status: ConversationStatus,
    pub model: String,
    pub cwd: PathBuf,
    /// Agent-side session that can be resumed instead of replaying history.
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub execution: ExecutionMode,
}

impl Conversation {
    #[must_use]
    pub fn new(id: impl Into<ConversationId>, model: impl Into<String>, cwd: impl AsRef<Path>) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
            status: ConversationStatus::Idle,
            model: model.into(),
            cwd: cwd.as_ref().to_path_buf(),
            session_id: None,
            execution: ExecutionMode::default(),
        }
    }

    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    #[must_use]
    pub fn with_execution(mut self, execution: ExecutionMode) -> Self {
        self.execution = execution;
        self
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryScope {
    Global,
    Project,
}

/// A remembered fact the host wants injected into prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub text: String,
    pub scope: MemoryScope,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

impl MemoryEntry {
    #[must_use]
    pub fn global(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            scope: MemoryScope::Global,
            enabled: true,
        }
    }

    #[must_use]
    pub fn project(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            scope: MemoryScope::Project,
            enabled: true,
        }
    }
}

fn enabled_by_default() -> bool {
    true
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp"];

/// File uploaded alongside a user message, stored under the host's upload dir.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

impl Attachment {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mime_type: None,
        }
    }

    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Images are detected by MIME type first, then by file extension.
    #[must_use]
    pub fn is_image(&self) -> bool {
        if let Some(mime_type) = self.mime_type.as_deref() {
            return mime_type.trim().to_ascii_lowercase().starts_with("image/");
        }

        Path::new(&self.name)
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| {
                IMAGE_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str())
            })
    }

    #[must_use]
    pub fn path_in(&self, upload_dir: &Path) -> PathBuf {
        upload_dir.join(&self.name)
    }
}

/// Message streamed to observers of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Thinking {
        text: String,
    },
    Delta {
        text: String,
    },
    /// Replaces the whole streamed text when it cannot be expressed as an append.
    Resync {
        text: String,
    },
    ToolStart {
        name: String,
        id: Option<String>,
    },
    ToolResult {
        id: Option<String>,
        is_error: bool,
    },
    Result {
        text: String,
        usage: TokenUsage,
        cost: f64,
        duration_ms: u64,
        session_id: Option<String>,
        incomplete: bool,
    },
    Stderr {
        text: String,
    },
    Error {
        message: String,
    },
}

impl Notification {
    /// Returns true for the notifications that end a user turn.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Result { .. } | Self::Error { .. })
    }
}

/// Receiver of turn notifications, tagged by conversation.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, conversation_id: &str, notification: Notification);
}

impl<F> NotificationSink for F
where
    F: Fn(&str, Notification) + Send + Sync,
{
    fn notify(&self, conversation_id: &str, notification: Notification) {
        self(conversation_id, notification)
    }
}

/// Host callbacks invoked when a turn finalizes.
pub trait TurnHooks: Send + Sync {
    /// Persist the conversation record; called once per finalized turn.
    fn on_save(&self, _conversation_id: &str) {}

    /// Publish a status change to connected clients.
    fn broadcast_status(&self, _conversation_id: &str, _status: ConversationStatus) {}
}

/// Hooks that ignore every callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl TurnHooks for NoopHooks {}

/// Current UTC time as RFC 3339.
#[must_use]
pub fn timestamp_now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}
