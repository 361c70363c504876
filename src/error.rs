use agent_process::ProcessError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("conversation {conversation_id} already has a running turn")]
    TurnActive { conversation_id: String },
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("summary timed out after {seconds} seconds")]
    SummaryTimedOut { seconds: u64 },
    #[error("summary process failed{}: {stderr}", exit_code_suffix(.code))]
    SummaryFailed { code: Option<i32>, stderr: String },
    #[error("summary process produced no text")]
    EmptySummary,
}

fn exit_code_suffix(code: &Option<i32>) -> String {
    code.map(|code| format!(" with exit code {code}"))
        .unwrap_or_default()
}
