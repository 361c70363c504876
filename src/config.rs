//! Environment configuration.

use std::env;
use std::time::Duration;

pub const DEFAULT_PROGRAM: &str = "codex";
pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_SUMMARY_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_COMPACT_HISTORY_CHARS: usize = 12_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Agent executable, resolved through `PATH` when not absolute.
    pub program: String,
    pub turn_timeout: Duration,
    pub summary_timeout: Duration,
    /// Character budget for the inline history of a compacted retry.
    pub compact_history_chars: usize,
    /// Inserted before the prompt on every `exec` invocation.
    pub extra_args: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            turn_timeout: DEFAULT_TURN_TIMEOUT,
            summary_timeout: DEFAULT_SUMMARY_TIMEOUT,
            compact_history_chars: DEFAULT_COMPACT_HISTORY_CHARS,
            extra_args: Vec::new(),
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            program: env_string_opt("CODEX_BRIDGE_BIN").unwrap_or(defaults.program),
            turn_timeout: env_secs("CODEX_BRIDGE_TURN_TIMEOUT_SEC").unwrap_or(defaults.turn_timeout),
            summary_timeout: env_secs("CODEX_BRIDGE_SUMMARY_TIMEOUT_SEC")
                .unwrap_or(defaults.summary_timeout),
            compact_history_chars: env_u64("CODEX_BRIDGE_COMPACT_HISTORY_CHARS")
                .and_then(|chars| usize::try_from(chars).ok())
                .unwrap_or(defaults.compact_history_chars),
            extra_args: env_string_opt("CODEX_BRIDGE_EXTRA_ARGS")
                .map(|value| value.split_whitespace().map(ToString::to_string).collect())
                .unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    #[must_use]
    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_summary_timeout(mut self, timeout: Duration) -> Self {
        self.summary_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_compact_history_chars(mut self, chars: usize) -> Self {
        self.compact_history_chars = chars;
        self
    }

    #[must_use]
    pub fn with_extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_string_opt(key).and_then(|value| value.trim().parse().ok())
}

fn env_secs(key: &str) -> Option<Duration> {
    env_u64(key).filter(|secs| *secs > 0).map(Duration::from_secs)
}
