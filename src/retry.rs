//! Single-retry policy for empty or overflowing turns.

use crate::prompt::HistoryMode;

/// How a retried attempt differs from the first one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryMode {
    /// Drop the resumed session and replay the full history inline.
    FreshSession,
    /// Drop the session and inline a size-bounded history digest.
    CompactHistory,
}

impl RetryMode {
    pub fn history_mode(self, compact_budget_chars: usize) -> HistoryMode {
        match self {
            Self::FreshSession => HistoryMode::Full,
            Self::CompactHistory => HistoryMode::Compact {
                budget_chars: compact_budget_chars,
            },
        }
    }
}

/// Retry permissions for one attempt of a user turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryContext {
    /// This attempt is already the retry.
    pub attempted: bool,
    pub fresh_session_allowed: bool,
    pub compact_history_allowed: bool,
}

impl Default for RetryContext {
    fn default() -> Self {
        Self {
            attempted: false,
            fresh_session_allowed: true,
            compact_history_allowed: true,
        }
    }
}

impl RetryContext {
    #[must_use]
    pub fn new(fresh_session_allowed: bool, compact_history_allowed: bool) -> Self {
        Self {
            attempted: false,
            fresh_session_allowed,
            compact_history_allowed,
        }
    }

    /// Context for the follow-up attempt; it may not retry again.
    #[must_use]
    pub fn into_retry(self) -> Self {
        Self {
            attempted: true,
            ..self
        }
    }

    /// Strategy for a turn that completed with no text and no token usage.
    pub fn empty_turn_strategy(&self, resumed_session: bool, history_sent: bool) -> Option<RetryMode> {
        if self.attempted {
            return None;
        }

        if resumed_session && self.fresh_session_allowed {
            Some(RetryMode::FreshSession)
        } else if history_sent && self.compact_history_allowed {
            Some(RetryMode::CompactHistory)
        } else {
            None
        }
    }

    /// Strategy for a prompt the agent or the OS rejected as too large.
    pub fn overflow_strategy(&self) -> Option<RetryMode> {
        (!self.attempted).then_some(RetryMode::CompactHistory)
    }
}
