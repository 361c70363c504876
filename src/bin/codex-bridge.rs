use std::io::{self, Write};
use std::path::PathBuf;

use codex_bridge::{
    logging, Bridge, BridgeConfig, Conversation, Message, NoopHooks, Notification, Role, TurnRequest,
    DEFAULT_MODEL_ID,
};

const USAGE: &str = "usage: codex-bridge <cwd> <prompt...>";

#[tokio::main(flavor = "current_thread")]
async fn main() -> io::Result<()> {
    logging::init();

    let mut args = std::env::args().skip(1);
    let cwd = args.next().map(PathBuf::from);
    let prompt = args.collect::<Vec<_>>().join(" ");
    let Some(cwd) = cwd.filter(|_| !prompt.trim().is_empty()) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    let model = std::env::var("CODEX_BRIDGE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL_ID.to_string());
    let bridge = Bridge::new(BridgeConfig::from_env());
    let mut conversation = Conversation::new("cli", model, &cwd);
    conversation.messages.push(Message::user(prompt.clone()));

    let print = |_conversation_id: &str, notification: Notification| {
        if let Ok(line) = serde_json::to_string(&notification) {
            let mut stdout = io::stdout().lock();
            let _ = writeln!(stdout, "{line}");
            let _ = stdout.flush();
        }
    };

    bridge
        .run_turn(&mut conversation, TurnRequest::new(prompt), &NoopHooks, &print)
        .await
        .map_err(io::Error::other)?;

    let failed = conversation
        .messages
        .last()
        .map_or(true, |message| message.role != Role::Assistant);
    if failed {
        std::process::exit(1);
    }
    Ok(())
}
