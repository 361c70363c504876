//! Wire-level primitives for the `codex exec --json` event stream.
//!
//! This crate owns line framing, event decoding and item classification only.
//! It has no process or conversation coupling: callers feed raw stdout bytes
//! into [`JsonLineDecoder`] and interpret the resulting [`ExecEvent`]s.
//!
//! Item payloads are duck-typed across agent versions, so [`Item::classify`]
//! normalizes them into a sealed set of variants before any transcript logic
//! sees them.

pub mod events;
pub mod item;
pub mod jsonl;
pub mod overflow;
pub mod text;

pub use events::{ExecEvent, TurnUsage};
pub use item::{Item, ToolResult, ToolStart};
pub use jsonl::JsonLineDecoder;
pub use overflow::is_context_overflow;
