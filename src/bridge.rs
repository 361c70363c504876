//! Public entry point: runs turns and summaries against the agent CLI.

use std::path::{Path, PathBuf};
use std::time::Instant;

use agent_process::{spawn, ProcessError, ProcessEvent, ProcessRegistry, ProcessSpec};
use bridge_protocol::{
    Attachment, Conversation, ConversationStatus, MemoryEntry, Message, NotificationSink,
    TurnHooks,
};
use exec_events::{ExecEvent, Item, JsonLineDecoder};
use tracing::{debug, info, warn};

use crate::accounting::estimate_typed_tokens;
use crate::args::{ExecArgs, SandboxPolicy};
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::pricing::ModelRegistry;
use crate::prompt::{self, HistoryMode, PromptInput};
use crate::retry::RetryContext;
use crate::turn::{TurnSession, TurnSetup, TurnVerdict};

const SUMMARY_STDERR_CHARS: usize = 1200;

/// Per-turn switches supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnOptions {
    /// Overrides the conversation's write permission when set.
    pub writes_allowed: Option<bool>,
    pub can_retry_fresh_session: bool,
    pub can_retry_compact_history: bool,
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self {
            writes_allowed: None,
            can_retry_fresh_session: true,
            can_retry_compact_history: true,
        }
    }
}

/// One user message to send to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    pub user_text: String,
    pub attachments: Vec<Attachment>,
    pub upload_dir: PathBuf,
    pub memories: Vec<MemoryEntry>,
    pub options: TurnOptions,
}

impl TurnRequest {
    #[must_use]
    pub fn new(user_text: impl Into<String>) -> Self {
        Self {
            user_text: user_text.into(),
            attachments: Vec::new(),
            upload_dir: PathBuf::new(),
            memories: Vec::new(),
            options: TurnOptions::default(),
        }
    }

    #[must_use]
    pub fn with_attachments(mut self, upload_dir: impl Into<PathBuf>, attachments: Vec<Attachment>) -> Self {
        self.upload_dir = upload_dir.into();
        self.attachments = attachments;
        self
    }

    #[must_use]
    pub fn with_memories(mut self, memories: Vec<MemoryEntry>) -> Self {
        self.memories = memories;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: TurnOptions) -> Self {
        self.options = options;
        self
    }
}

/// Drives `codex exec` for conversations and tracks their running processes.
#[derive(Debug, Clone)]
pub struct Bridge {
    config: BridgeConfig,
    models: ModelRegistry,
    registry: ProcessRegistry,
}

impl Bridge {
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            models: ModelRegistry::builtin(),
            registry: ProcessRegistry::new(),
        }
    }

    #[must_use]
    pub fn with_models(mut self, models: ModelRegistry) -> Self {
        self.models = models;
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    /// Runs one user turn to completion, retrying at most once.
    ///
    /// Exactly one `result` or `error` notification is delivered and the
    /// conversation ends idle. The user message itself is not appended; the
    /// host records it before calling. Returns an error only when the
    /// conversation already has a running turn, in which case nothing is
    /// notified.
    pub async fn run_turn(
        &self,
        conversation: &mut Conversation,
        request: TurnRequest,
        hooks: &dyn TurnHooks,
        sink: &dyn NotificationSink,
    ) -> Result<(), BridgeError> {
        if self.registry.is_active(&conversation.id) {
            return Err(BridgeError::TurnActive {
                conversation_id: conversation.id.clone(),
            });
        }

        let started_at = Instant::now();
        conversation.status = ConversationStatus::Thinking;
        hooks.broadcast_status(&conversation.id, ConversationStatus::Thinking);
        info!(conversation_id = %conversation.id, model = %conversation.model, "turn started");

        let retry = RetryContext::new(
            request.options.can_retry_fresh_session,
            request.options.can_retry_compact_history,
        );
        let attempt = Attempt {
            request: &request,
            hooks,
            sink,
            started_at,
            typed_input_tokens: estimate_typed_tokens(&request.user_text),
        };

        let verdict = self
            .run_attempt(conversation, &attempt, retry, HistoryMode::Full)
            .await;
        if let TurnVerdict::Retry(mode) = verdict {
            info!(conversation_id = %conversation.id, ?mode, "retrying turn");
            let history_mode = mode.history_mode(self.config.compact_history_chars);
            let verdict = self
                .run_attempt(conversation, &attempt, retry.into_retry(), history_mode)
                .await;
            debug_assert_eq!(verdict, TurnVerdict::Done);
        }

        Ok(())
    }

    /// Sends `TERM` to the conversation's running agent. Returns whether one was signalled.
    pub fn cancel(&self, conversation_id: &str) -> bool {
        self.registry.cancel(conversation_id)
    }

    pub fn is_active(&self, conversation_id: &str) -> bool {
        self.registry.is_active(conversation_id)
    }

    /// Asks the agent for a one-shot summary of `messages`, read-only and without streaming.
    pub async fn summarize(
        &self,
        messages: &[Message],
        model: &str,
        cwd: &Path,
    ) -> Result<String, BridgeError> {
        let prompt = prompt::summary_prompt(messages);
        let args = ExecArgs {
            model,
            sandbox: SandboxPolicy::ReadOnly,
            image_paths: &[],
            resume_session: None,
            extra_args: &self.config.extra_args,
            prompt: &prompt,
        }
        .to_args();
        let spec = ProcessSpec::new(&self.config.program)
            .with_args(args)
            .with_cwd(cwd)
            .with_timeout(self.config.summary_timeout);

        let output = spawn(spec)?.wait_with_output().await?;
        if output.exit.timed_out {
            return Err(BridgeError::SummaryTimedOut {
                seconds: self.config.summary_timeout.as_secs(),
            });
        }
        if !output.exit.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let skip = stderr.chars().count().saturating_sub(SUMMARY_STDERR_CHARS);
            return Err(BridgeError::SummaryFailed {
                code: output.exit.code,
                stderr: stderr.chars().skip(skip).collect(),
            });
        }

        let mut decoder = JsonLineDecoder::default();
        let mut events = decoder.feed(&output.stdout);
        events.extend(decoder.finish());

        let summary = events
            .into_iter()
            .filter_map(|event| match event {
                ExecEvent::ItemCompleted { item } => match Item::classify(&item) {
                    Item::AgentMessage { text, .. } if !text.trim().is_empty() => Some(text),
                    _ => None,
                },
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let summary = summary.trim();
        if summary.is_empty() {
            return Err(BridgeError::EmptySummary);
        }
        debug!(chars = summary.len(), "summary produced");
        Ok(summary.to_string())
    }

    async fn run_attempt(
        &self,
        conversation: &mut Conversation,
        attempt: &Attempt<'_>,
        retry: RetryContext,
        history_mode: HistoryMode,
    ) -> TurnVerdict {
        let request = attempt.request;
        let conversation_id = conversation.id.clone();
        let resume_session = conversation.session_id.clone();

        let assembled = prompt::assemble(&PromptInput {
            user_text: &request.user_text,
            messages: &conversation.messages,
            attachments: &request.attachments,
            upload_dir: &request.upload_dir,
            memories: &request.memories,
            resuming: resume_session.is_some(),
            history_mode,
        });
        let writes_allowed = request
            .options
            .writes_allowed
            .unwrap_or(conversation.execution.writes_allowed);
        let args = ExecArgs {
            model: &conversation.model,
            sandbox: SandboxPolicy::resolve(writes_allowed, conversation.execution.sandboxed),
            image_paths: &assembled.image_paths,
            resume_session: resume_session.as_deref(),
            extra_args: &self.config.extra_args,
            prompt: &assembled.prompt,
        }
        .to_args();
        let spec = ProcessSpec::new(&self.config.program)
            .with_args(args)
            .with_cwd(&conversation.cwd)
            .with_timeout(self.config.turn_timeout);

        debug!(
            %conversation_id,
            resumed = resume_session.is_some(),
            history_sent = assembled.history_sent,
            retry = retry.attempted,
            prompt_chars = assembled.prompt.len(),
            "launching agent"
        );

        let mut session = TurnSession::new(
            conversation,
            attempt.hooks,
            attempt.sink,
            &self.models,
            TurnSetup {
                user_text: request.user_text.clone(),
                retry,
                resumed_session: resume_session.is_some(),
                history_sent: assembled.history_sent,
                typed_input_tokens: attempt.typed_input_tokens,
                started_at: attempt.started_at,
                timeout: self.config.turn_timeout,
            },
        );

        let mut process = match spawn(spec) {
            Ok(process) => process,
            Err(error) => return session.spawn_failed(&error),
        };
        let registration = self.registry.track(&conversation_id, process.kill_handle());
        debug!(%conversation_id, pid = ?process.pid(), "agent running");

        loop {
            match process.next_event().await {
                Some(ProcessEvent::Stdout(chunk)) => session.feed_stdout(&chunk),
                Some(ProcessEvent::Stderr(chunk)) => session.feed_stderr(&chunk),
                Some(ProcessEvent::Exited(exit)) => {
                    drop(registration);
                    break session.finish(exit);
                }
                None => {
                    warn!(%conversation_id, "process events ended without exit");
                    drop(registration);
                    break session.finish(Err(ProcessError::SupervisorGone));
                }
            }
        }
    }
}

/// Inputs shared by both attempts of a user turn.
struct Attempt<'a> {
    request: &'a TurnRequest,
    hooks: &'a dyn TurnHooks,
    sink: &'a dyn NotificationSink,
    started_at: Instant,
    typed_input_tokens: Option<u64>,
}
