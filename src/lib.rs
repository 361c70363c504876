//! Bridge between a chat UI and the `codex` CLI.
//!
//! [`Bridge::run_turn`] launches `codex exec --json` for one user message,
//! decodes its JSONL output as it streams, narrates tool calls into a
//! markdown transcript and finalizes an assistant [`Message`] with token and
//! cost accounting. Empty or oversized turns are retried at most once.
//!
//! # Public API Overview
//! - [`Bridge`]: `run_turn`, `cancel`, `is_active`, `summarize`.
//! - [`BridgeConfig`]: binary, timeouts and extra CLI arguments from the environment.
//! - [`ModelRegistry`]: context sizes and prices with a default fallback.
//! - [`TranscriptBuilder`] and [`TurnSession`]: the streaming interpreter, usable
//!   without a process for replaying recorded output.

pub mod accounting;
pub mod args;
pub mod bridge;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod pricing;
pub mod prompt;
pub mod retry;
pub mod transcript;
pub mod turn;

pub use crate::bridge::{Bridge, TurnOptions, TurnRequest};
pub use crate::config::BridgeConfig;
pub use crate::error::BridgeError;
pub use crate::pricing::{ModelInfo, ModelRegistry, DEFAULT_MODEL_ID};
pub use crate::prompt::HistoryMode;
pub use crate::retry::{RetryContext, RetryMode};
pub use crate::transcript::{merge_overlapping, TranscriptBuilder, TRACE_CLOSE, TRACE_OPEN};
pub use crate::turn::{TurnSession, TurnSetup, TurnVerdict};

/// Contract types re-exported for hosts.
pub use bridge_protocol::{
    Attachment, Conversation, ConversationStatus, ExecutionMode, MemoryEntry, MemoryScope,
    Message, NoopHooks, Notification, NotificationSink, Role, TokenUsage, TurnHooks,
};
