//! Per-attempt turn state machine.
//!
//! A [`TurnSession`] owns the scratch state of one agent invocation: the
//! decoder, the transcript, captured stderr and the retry decision. It is fed
//! process output in arrival order and produces a [`TurnVerdict`] at exit.
//! The conversation is only touched through the borrowed `&mut` record.

use std::time::{Duration, Instant};

use agent_process::{ExitStatusInfo, ProcessError};
use bridge_protocol::{
    Conversation, ConversationStatus, Message, Notification, NotificationSink, TurnHooks,
};
use exec_events::{is_context_overflow, ExecEvent, Item, JsonLineDecoder, TurnUsage};
use tracing::{debug, info, trace, warn};

use crate::accounting::{compute_cost, token_usage};
use crate::commands::slash_command_hint;
use crate::pricing::ModelRegistry;
use crate::retry::{RetryContext, RetryMode};
use crate::transcript::TranscriptBuilder;

pub const EMPTY_RESPONSE_MESSAGE: &str = "Model returned an empty response. Please retry.";
pub const CANCELLED_MESSAGE: &str = "Request cancelled.";

/// Only the tail of stderr is reported to users.
const STDERR_EXCERPT_CHARS: usize = 1200;
/// Upper bound on stderr retained for the overflow heuristic and excerpts.
const STDERR_CAPTURE_CHARS: usize = 64 * 1024;

/// What the caller should do once an attempt ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnVerdict {
    /// A result or an error was delivered and the conversation is idle.
    Done,
    /// Nothing was delivered; run the turn again in this mode.
    Retry(RetryMode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Streaming,
    RetryScheduled(RetryMode),
    Finished,
}

/// Fixed inputs of one attempt.
#[derive(Debug, Clone)]
pub struct TurnSetup {
    pub user_text: String,
    pub retry: RetryContext,
    /// The agent was asked to resume `Conversation::session_id`.
    pub resumed_session: bool,
    pub history_sent: bool,
    pub typed_input_tokens: Option<u64>,
    /// When the user turn began; spans retries.
    pub started_at: Instant,
    pub timeout: Duration,
}

pub struct TurnSession<'a> {
    conversation: &'a mut Conversation,
    hooks: &'a dyn TurnHooks,
    sink: &'a dyn NotificationSink,
    models: &'a ModelRegistry,
    setup: TurnSetup,
    decoder: JsonLineDecoder,
    transcript: TranscriptBuilder,
    stderr: String,
    failure_message: Option<String>,
    phase: Phase,
}

impl<'a> TurnSession<'a> {
    pub fn new(
        conversation: &'a mut Conversation,
        hooks: &'a dyn TurnHooks,
        sink: &'a dyn NotificationSink,
        models: &'a ModelRegistry,
        setup: TurnSetup,
    ) -> Self {
        Self {
            conversation,
            hooks,
            sink,
            models,
            setup,
            decoder: JsonLineDecoder::default(),
            transcript: TranscriptBuilder::default(),
            stderr: String::new(),
            failure_message: None,
            phase: Phase::Streaming,
        }
    }

    pub fn transcript(&self) -> &TranscriptBuilder {
        &self.transcript
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    pub fn feed_stdout(&mut self, bytes: &[u8]) {
        for event in self.decoder.feed(bytes) {
            self.handle_event(event);
        }
    }

    pub fn feed_stderr(&mut self, bytes: &[u8]) {
        let text = String::from_utf8_lossy(bytes);
        self.stderr.push_str(&text);
        if self.stderr.len() > STDERR_CAPTURE_CHARS {
            self.stderr = tail_chars(&self.stderr, STDERR_CAPTURE_CHARS / 2).to_string();
        }

        if !text.trim().is_empty() {
            self.notify(Notification::Stderr {
                text: text.into_owned(),
            });
        }
    }

    pub fn handle_event(&mut self, event: ExecEvent) {
        if self.phase != Phase::Streaming {
            trace!(event = event.event_type(), "ignoring event after turn outcome");
            return;
        }

        match event {
            ExecEvent::ThreadStarted { thread_id } => {
                if let Some(thread_id) = thread_id {
                    debug!(conversation_id = %self.conversation.id, %thread_id, "agent session started");
                    self.conversation.session_id = Some(thread_id);
                }
            }
            ExecEvent::TurnStarted => {}
            ExecEvent::ItemStarted { item } | ExecEvent::ItemCompleted { item } => {
                self.apply_item(&Item::classify(&item));
            }
            ExecEvent::TurnCompleted { usage, items } => {
                for item in &items {
                    self.apply_item(&Item::classify(item));
                }
                self.complete(usage);
            }
            ExecEvent::TurnFailed { message } => {
                warn!(conversation_id = %self.conversation.id, ?message, "agent reported turn failure");
                if message.is_some() {
                    self.failure_message = message;
                }
            }
            ExecEvent::Unknown { event_type } => {
                trace!(%event_type, "ignoring unknown event");
            }
        }
    }

    /// Concludes the attempt once the process has exited.
    pub fn finish(mut self, exit: Result<ExitStatusInfo, ProcessError>) -> TurnVerdict {
        if let Some(event) = self.decoder.finish() {
            self.handle_event(event);
        }

        match self.phase {
            Phase::Finished => return TurnVerdict::Done,
            Phase::RetryScheduled(mode) => return TurnVerdict::Retry(mode),
            Phase::Streaming => {}
        }

        let exit = match exit {
            Ok(exit) => exit,
            Err(error) => {
                warn!(conversation_id = %self.conversation.id, %error, "lost track of agent process");
                if self.transcript.has_text() {
                    self.finalize(TurnUsage::default(), true);
                } else {
                    self.fail(format!("Codex process failed: {error}"));
                }
                return TurnVerdict::Done;
            }
        };

        if !self.transcript.has_text() && !exit.interrupted() && is_context_overflow(&self.stderr) {
            if let Some(mode) = self.setup.retry.overflow_strategy() {
                info!(conversation_id = %self.conversation.id, "prompt rejected as too large; retrying with compact history");
                self.conversation.session_id = None;
                return TurnVerdict::Retry(mode);
            }
        }

        if self.transcript.has_text() {
            debug!(conversation_id = %self.conversation.id, exit_code = ?exit.code, "agent exited before turn completion");
            self.finalize(TurnUsage::default(), true);
            return TurnVerdict::Done;
        }

        let message = self.exit_error_message(&exit);
        self.fail(message);
        TurnVerdict::Done
    }

    /// Concludes an attempt whose process never started.
    pub fn spawn_failed(mut self, error: &ProcessError) -> TurnVerdict {
        let overflow = error.is_argument_overflow() || is_context_overflow(&error.to_string());
        if overflow {
            if let Some(mode) = self.setup.retry.overflow_strategy() {
                info!(conversation_id = %self.conversation.id, %error, "argument list too long; retrying with compact history");
                self.conversation.session_id = None;
                return TurnVerdict::Retry(mode);
            }
        }

        warn!(conversation_id = %self.conversation.id, %error, "failed to start agent");
        self.fail(format!("Failed to start codex: {error}"));
        TurnVerdict::Done
    }

    fn apply_item(&mut self, item: &Item) {
        for notification in self.transcript.apply(item) {
            self.notify(notification);
        }
    }

    fn complete(&mut self, usage: TurnUsage) {
        if self.transcript.has_text() || !usage.is_empty() {
            self.finalize(usage, false);
            return;
        }

        match self
            .setup
            .retry
            .empty_turn_strategy(self.setup.resumed_session, self.setup.history_sent)
        {
            Some(mode) => {
                info!(conversation_id = %self.conversation.id, ?mode, "empty turn; retry scheduled");
                self.conversation.session_id = None;
                self.phase = Phase::RetryScheduled(mode);
            }
            None => self.fail(EMPTY_RESPONSE_MESSAGE.to_string()),
        }
    }

    fn finalize(&mut self, usage: TurnUsage, incomplete: bool) {
        if let Some(notification) = self.transcript.close_open_traces() {
            self.notify(notification);
        }

        let model = self.models.resolve(&self.conversation.model);
        let tokens = token_usage(&usage, self.setup.typed_input_tokens);
        let cost = compute_cost(model, tokens.net_input_tokens, tokens.output_tokens);
        let duration_ms = u64::try_from(self.setup.started_at.elapsed().as_millis()).unwrap_or(u64::MAX);
        let text = self.transcript.text().trim_end().to_string();
        let session_id = self.conversation.session_id.clone();

        let mut message = Message::assistant(text.clone());
        message.cost = Some(cost);
        message.duration_ms = Some(duration_ms);
        message.session_id = session_id.clone();
        message.usage = Some(tokens);
        message.incomplete = incomplete;
        self.conversation.messages.push(message);

        info!(
            conversation_id = %self.conversation.id,
            net_input_tokens = tokens.net_input_tokens,
            output_tokens = tokens.output_tokens,
            cost,
            incomplete,
            "turn finalized"
        );

        self.notify(Notification::Result {
            text,
            usage: tokens,
            cost,
            duration_ms,
            session_id,
            incomplete,
        });
        self.settle();
    }

    fn fail(&mut self, message: String) {
        if let Some(notification) = self.transcript.close_open_traces() {
            self.notify(notification);
        }

        warn!(conversation_id = %self.conversation.id, %message, "turn failed");
        self.notify(Notification::Error { message });
        self.settle();
    }

    fn settle(&mut self) {
        self.phase = Phase::Finished;
        self.conversation.status = ConversationStatus::Idle;
        self.hooks.on_save(&self.conversation.id);
        self.hooks
            .broadcast_status(&self.conversation.id, ConversationStatus::Idle);
    }

    fn exit_error_message(&self, exit: &ExitStatusInfo) -> String {
        if exit.timed_out {
            return format!(
                "Request timed out after {} seconds.",
                self.setup.timeout.as_secs()
            );
        }
        if exit.killed {
            return CANCELLED_MESSAGE.to_string();
        }

        let headline = match (exit.code, exit.signal) {
            (Some(0), _) => "Codex exited without a response".to_string(),
            (Some(code), _) => format!("Codex exited with code {code}"),
            (None, Some(signal)) => format!("Codex was terminated by signal {signal}"),
            (None, None) => "Codex exited unexpectedly".to_string(),
        };

        let stderr = tail_chars(self.stderr.trim(), STDERR_EXCERPT_CHARS);
        let detail = self
            .failure_message
            .as_deref()
            .or((!stderr.is_empty()).then_some(stderr));

        let mut message = match detail {
            Some(detail) => format!("{headline}: {detail}"),
            None => format!("{headline}."),
        };
        if let Some(hint) = slash_command_hint(&self.setup.user_text) {
            message.push_str("\n\n");
            message.push_str(&hint);
        }
        message
    }

    fn notify(&self, notification: Notification) {
        self.sink.notify(&self.conversation.id, notification);
    }
}

fn tail_chars(text: &str, max_chars: usize) -> &str {
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }

    match text.char_indices().nth(total - max_chars) {
        Some((start, _)) => &text[start..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use agent_process::ExitStatusInfo;
    use bridge_protocol::{
        Conversation, ConversationStatus, Notification, NotificationSink, TurnHooks,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::transcript::{TRACE_CLOSE, TRACE_OPEN};

    #[derive(Default)]
    struct Recorder {
        notifications: Mutex<Vec<Notification>>,
        saves: Mutex<usize>,
        statuses: Mutex<Vec<ConversationStatus>>,
    }

    impl Recorder {
        fn notifications(&self) -> Vec<Notification> {
            self.notifications.lock().expect("recorder lock").clone()
        }

        fn errors(&self) -> Vec<String> {
            self.notifications()
                .into_iter()
                .filter_map(|notification| match notification {
                    Notification::Error { message } => Some(message),
                    _ => None,
                })
                .collect()
        }

        fn results(&self) -> usize {
            self.notifications()
                .iter()
                .filter(|notification| matches!(notification, Notification::Result { .. }))
                .count()
        }
    }

    impl NotificationSink for Recorder {
        fn notify(&self, conversation_id: &str, notification: Notification) {
            assert_eq!(conversation_id, "c1");
            self.notifications
                .lock()
                .expect("recorder lock")
                .push(notification);
        }
    }

    impl TurnHooks for Recorder {
        fn on_save(&self, _conversation_id: &str) {
            *self.saves.lock().expect("recorder lock") += 1;
        }

        fn broadcast_status(&self, _conversation_id: &str, status: ConversationStatus) {
            self.statuses.lock().expect("recorder lock").push(status);
        }
    }

    fn conversation() -> Conversation {
        let mut conversation = Conversation::new("c1", "gpt-5.3-codex", "/work");
        conversation.status = ConversationStatus::Thinking;
        conversation
    }

    fn setup(user_text: &str, retry: RetryContext, resumed_session: bool, history_sent: bool) -> TurnSetup {
        TurnSetup {
            user_text: user_text.to_string(),
            retry,
            resumed_session,
            history_sent,
            typed_input_tokens: None,
            started_at: Instant::now(),
            timeout: Duration::from_secs(300),
        }
    }

    fn exited(code: i32) -> Result<ExitStatusInfo, ProcessError> {
        Ok(ExitStatusInfo {
            code: Some(code),
            ..ExitStatusInfo::default()
        })
    }

    fn line(value: serde_json::Value) -> Vec<u8> {
        let mut bytes = serde_json::to_vec(&value).expect("serialize event");
        bytes.push(b'\n');
        bytes
    }

    #[test]
    fn list_files_scenario_finalizes_with_trace_and_cost() {
        let recorder = Recorder::default();
        let models = ModelRegistry::builtin();
        let mut conversation = conversation();

        let mut session = TurnSession::new(
            &mut conversation,
            &recorder,
            &recorder,
            &models,
            setup("list files", RetryContext::default(), false, false),
        );
        let stream = [
            line(json!({"type": "thread.started", "thread_id": "s1"})),
            line(json!({"type": "item.started", "item": {"type": "tool_use", "id": "t1", "name": "Bash", "input": {"command": "ls"}}})),
            line(json!({"type": "item.completed", "item": {"type": "tool_result", "tool_use_id": "t1", "output": "a.txt\nb.txt"}})),
            line(json!({"type": "turn.completed", "usage": {"input_tokens": 50, "output_tokens": 10}})),
        ]
        .concat();
        for chunk in stream.chunks(7) {
            session.feed_stdout(chunk);
        }
        assert_eq!(session.finish(exited(0)), TurnVerdict::Done);

        assert_eq!(conversation.status, ConversationStatus::Idle);
        assert_eq!(conversation.session_id.as_deref(), Some("s1"));
        let message = conversation.messages.last().expect("assistant message");
        assert!(message.text.contains(TRACE_OPEN));
        assert!(message.text.contains("ls"));
        assert!(message.text.contains("a.txt\nb.txt"));
        assert!(message.text.trim_end().ends_with(TRACE_CLOSE));
        let expected_cost = (50.0 / 1e6) * 10.0 + (10.0 / 1e6) * 30.0;
        assert!((message.cost.expect("cost") - expected_cost).abs() < 1e-12);
        assert!(!message.incomplete);

        assert_eq!(recorder.results(), 1);
        assert!(recorder.errors().is_empty());
        assert_eq!(*recorder.saves.lock().expect("recorder lock"), 1);
        assert_eq!(
            *recorder.statuses.lock().expect("recorder lock"),
            vec![ConversationStatus::Idle]
        );
    }

    #[test]
    fn empty_resumed_turn_defers_to_fresh_session_silently() {
        let recorder = Recorder::default();
        let models = ModelRegistry::builtin();
        let mut conversation = conversation().with_session_id("s0");

        let mut session = TurnSession::new(
            &mut conversation,
            &recorder,
            &recorder,
            &models,
            setup("hi", RetryContext::default(), true, false),
        );
        session.feed_stdout(&line(json!({
            "type": "turn.completed",
            "usage": {"input_tokens": 0, "output_tokens": 0}
        })));
        let verdict = session.finish(exited(0));

        assert_eq!(verdict, TurnVerdict::Retry(RetryMode::FreshSession));
        assert_eq!(conversation.session_id, None);
        assert!(conversation.messages.is_empty());
        assert_eq!(conversation.status, ConversationStatus::Thinking);
        assert!(recorder.notifications().is_empty());
        assert_eq!(*recorder.saves.lock().expect("recorder lock"), 0);
    }

    #[test]
    fn empty_turn_without_permissions_reports_one_error() {
        let recorder = Recorder::default();
        let models = ModelRegistry::builtin();
        let mut conversation = conversation().with_session_id("s0");

        let mut session = TurnSession::new(
            &mut conversation,
            &recorder,
            &recorder,
            &models,
            setup("hi", RetryContext::new(false, false), true, true),
        );
        session.feed_stdout(&line(json!({
            "type": "turn.completed",
            "usage": {"input_tokens": 0, "output_tokens": 0}
        })));
        assert_eq!(session.finish(exited(0)), TurnVerdict::Done);

        assert!(conversation.messages.is_empty());
        assert_eq!(conversation.status, ConversationStatus::Idle);
        assert_eq!(recorder.errors(), vec![EMPTY_RESPONSE_MESSAGE.to_string()]);
        assert_eq!(recorder.notifications().len(), 1);
    }

    #[test]
    fn empty_turn_with_inline_history_schedules_compact_retry() {
        let recorder = Recorder::default();
        let models = ModelRegistry::builtin();
        let mut conversation = conversation();

        let mut session = TurnSession::new(
            &mut conversation,
            &recorder,
            &recorder,
            &models,
            setup("hi", RetryContext::default(), false, true),
        );
        session.feed_stdout(&line(json!({"type": "turn.completed", "usage": {}})));

        assert_eq!(session.finish(exited(0)), TurnVerdict::Retry(RetryMode::CompactHistory));
        assert!(recorder.notifications().is_empty());
        assert_eq!(conversation.status, ConversationStatus::Thinking);
    }

    #[test]
    fn empty_compact_retry_is_not_retried_again() {
        let recorder = Recorder::default();
        let models = ModelRegistry::builtin();
        let mut conversation = conversation();

        let mut session = TurnSession::new(
            &mut conversation,
            &recorder,
            &recorder,
            &models,
            setup("hi", RetryContext::default().into_retry(), false, true),
        );
        session.feed_stdout(&line(json!({"type": "turn.completed", "usage": {}})));

        assert_eq!(session.finish(exited(0)), TurnVerdict::Done);
        assert_eq!(recorder.errors(), vec![EMPTY_RESPONSE_MESSAGE.to_string()]);
        assert_eq!(conversation.status, ConversationStatus::Idle);
    }

    #[cfg(unix)]
    fn argument_list_too_long() -> ProcessError {
        ProcessError::Spawn {
            program: "codex".to_string(),
            source: std::io::Error::from_raw_os_error(libc::E2BIG),
        }
    }

    #[cfg(unix)]
    #[test]
    fn argument_overflow_at_spawn_retries_with_compact_history() {
        let recorder = Recorder::default();
        let models = ModelRegistry::builtin();
        let mut conversation = conversation().with_session_id("s0");

        let session = TurnSession::new(
            &mut conversation,
            &recorder,
            &recorder,
            &models,
            setup("hi", RetryContext::new(false, false), false, true),
        );

        assert_eq!(
            session.spawn_failed(&argument_list_too_long()),
            TurnVerdict::Retry(RetryMode::CompactHistory)
        );
        assert_eq!(conversation.session_id, None);
        assert!(recorder.notifications().is_empty());
        assert_eq!(*recorder.saves.lock().expect("recorder lock"), 0);
    }

    #[cfg(unix)]
    #[test]
    fn argument_overflow_on_retry_reports_spawn_failure() {
        let recorder = Recorder::default();
        let models = ModelRegistry::builtin();
        let mut conversation = conversation();

        let session = TurnSession::new(
            &mut conversation,
            &recorder,
            &recorder,
            &models,
            setup("hi", RetryContext::default().into_retry(), false, true),
        );

        assert_eq!(session.spawn_failed(&argument_list_too_long()), TurnVerdict::Done);
        let errors = recorder.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Failed to start codex: "));
        assert_eq!(conversation.status, ConversationStatus::Idle);
    }

    #[test]
    fn exit_with_text_but_no_completion_is_incomplete() {
        let recorder = Recorder::default();
        let models = ModelRegistry::builtin();
        let mut conversation = conversation();

        let mut session = TurnSession::new(
            &mut conversation,
            &recorder,
            &recorder,
            &models,
            setup("hi", RetryContext::default(), false, false),
        );
        session.feed_stdout(&line(json!({
            "type": "item.started",
            "item": {"type": "tool_use", "id": "t1", "name": "Bash", "input": {"command": "sleep 100"}}
        })));
        session.feed_stdout(b"{\"type\":\"item.completed\",\"item\":{\"type\":\"agent_message\",\"text\":\"Partial\"}}");
        let verdict = session.finish(Ok(ExitStatusInfo {
            code: None,
            signal: Some(15),
            timed_out: false,
            killed: true,
        }));

        assert_eq!(verdict, TurnVerdict::Done);
        let message = conversation.messages.last().expect("incomplete message");
        assert!(message.incomplete);
        assert!(message.text.ends_with("Partial"));
        assert_eq!(message.cost, Some(0.0));
        let notifications = recorder.notifications();
        assert!(matches!(
            notifications.last(),
            Some(Notification::Result { incomplete: true, .. })
        ));
        assert!(recorder.errors().is_empty());
    }

    #[test]
    fn nonzero_exit_surfaces_stderr_tail_and_slash_hint() {
        let recorder = Recorder::default();
        let models = ModelRegistry::builtin();
        let mut conversation = conversation();

        let mut session = TurnSession::new(
            &mut conversation,
            &recorder,
            &recorder,
            &models,
            setup("/compact", RetryContext::default(), false, false),
        );
        let noise = "x".repeat(2000);
        session.feed_stderr(format!("{noise}unknown command").as_bytes());
        assert_eq!(session.finish(exited(2)), TurnVerdict::Done);

        let errors = recorder.errors();
        assert_eq!(errors.len(), 1);
        let error = &errors[0];
        assert!(error.starts_with("Codex exited with code 2: "));
        assert!(error.contains("unknown command"));
        assert!(error.contains("`/compact`"));
        let excerpt = error
            .strip_prefix("Codex exited with code 2: ")
            .and_then(|rest| rest.split("\n\n").next())
            .expect("excerpt");
        assert_eq!(excerpt.chars().count(), 1200);
    }

    #[test]
    fn turn_failed_message_is_preferred_over_stderr() {
        let recorder = Recorder::default();
        let models = ModelRegistry::builtin();
        let mut conversation = conversation();

        let mut session = TurnSession::new(
            &mut conversation,
            &recorder,
            &recorder,
            &models,
            setup("hi", RetryContext::default(), false, false),
        );
        session.feed_stderr(b"backtrace noise\n");
        session.feed_stdout(&line(json!({"type": "turn.failed", "error": {"message": "model not found"}})));
        session.finish(exited(1));

        assert_eq!(
            recorder.errors(),
            vec!["Codex exited with code 1: model not found".to_string()]
        );
    }

    #[test]
    fn overflow_on_stderr_schedules_compact_retry_once() {
        let models = ModelRegistry::builtin();

        let recorder = Recorder::default();
        let mut conversation = conversation();
        let mut session = TurnSession::new(
            &mut conversation,
            &recorder,
            &recorder,
            &models,
            setup("hi", RetryContext::default(), false, true),
        );
        session.feed_stderr(b"Error: prompt is too long for context window limit\n");
        assert_eq!(
            session.finish(exited(1)),
            TurnVerdict::Retry(RetryMode::CompactHistory)
        );
        assert!(recorder.errors().is_empty());

        let recorder = Recorder::default();
        let mut session = TurnSession::new(
            &mut conversation,
            &recorder,
            &recorder,
            &models,
            setup("hi", RetryContext::default().into_retry(), false, true),
        );
        session.feed_stderr(b"Error: prompt is too long for context window limit\n");
        assert_eq!(session.finish(exited(1)), TurnVerdict::Done);
        assert_eq!(recorder.errors().len(), 1);
    }

    #[test]
    fn timeout_without_text_reports_timeout() {
        let recorder = Recorder::default();
        let models = ModelRegistry::builtin();
        let mut conversation = conversation();

        let session = TurnSession::new(
            &mut conversation,
            &recorder,
            &recorder,
            &models,
            setup("hi", RetryContext::default(), false, false),
        );
        session.finish(Ok(ExitStatusInfo {
            code: None,
            signal: Some(15),
            timed_out: true,
            killed: false,
        }));

        assert_eq!(
            recorder.errors(),
            vec!["Request timed out after 300 seconds.".to_string()]
        );
    }

    #[test]
    fn events_after_completion_are_ignored() {
        let recorder = Recorder::default();
        let models = ModelRegistry::builtin();
        let mut conversation = conversation();

        let mut session = TurnSession::new(
            &mut conversation,
            &recorder,
            &recorder,
            &models,
            setup("hi", RetryContext::default(), false, false),
        );
        session.feed_stdout(&line(json!({"type": "item.completed", "item": {"type": "agent_message", "text": "Done."}})));
        session.feed_stdout(&line(json!({"type": "turn.completed", "usage": {"input_tokens": 5, "output_tokens": 1}})));
        session.feed_stdout(&line(json!({"type": "item.completed", "item": {"type": "agent_message", "text": "Late."}})));
        assert!(session.is_finished());
        session.finish(exited(0));

        assert_eq!(recorder.results(), 1);
        assert_eq!(conversation.messages.len(), 1);
        assert_eq!(conversation.messages[0].text, "Done.");
    }

    #[test]
    fn batch_replay_does_not_duplicate_streamed_items() {
        let recorder = Recorder::default();
        let models = ModelRegistry::builtin();
        let mut conversation = conversation();

        let mut session = TurnSession::new(
            &mut conversation,
            &recorder,
            &recorder,
            &models,
            setup("hi", RetryContext::default(), false, false),
        );
        let tool = json!({"type": "tool_use", "id": "t1", "name": "Bash", "input": {"command": "ls"}});
        let result = json!({"type": "tool_result", "tool_use_id": "t1", "output": "a.txt"});
        let reply = json!({"type": "agent_message", "text": "Found a.txt."});
        session.feed_stdout(&line(json!({"type": "item.started", "item": tool})));
        session.feed_stdout(&line(json!({"type": "item.completed", "item": tool})));
        session.feed_stdout(&line(json!({"type": "item.completed", "item": result})));
        session.feed_stdout(&line(json!({"type": "item.completed", "item": reply})));
        session.feed_stdout(&line(json!({
            "type": "turn.completed",
            "usage": {"input_tokens": 10, "output_tokens": 2},
            "items": [tool, result, reply]
        })));
        session.finish(exited(0));

        let notifications = recorder.notifications();
        let starts = notifications
            .iter()
            .filter(|notification| matches!(notification, Notification::ToolStart { .. }))
            .count();
        assert_eq!(starts, 1);
        let text = &conversation.messages[0].text;
        assert_eq!(text.matches(TRACE_OPEN).count(), 1);
        assert_eq!(text.matches("Found a.txt.").count(), 1);
    }
}
