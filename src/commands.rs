/// A leading `/name` token in user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlashCommand {
    pub name: String,
    pub args: String,
}

impl SlashCommand {
    /// A command with nothing after it; the agent CLI has no task to work on.
    pub fn is_bare(&self) -> bool {
        self.args.is_empty()
    }
}

pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') || trimmed.starts_with("//") {
        return None;
    }

    let (name, args) = match trimmed.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (trimmed, ""),
    };
    if name.len() < 2 || name[1..].contains('/') {
        return None;
    }

    Some(SlashCommand {
        name: name.to_string(),
        args: args.to_string(),
    })
}

/// Extra guidance appended to failures caused by sending a bare slash command.
pub fn slash_command_hint(input: &str) -> Option<String> {
    let command = parse_slash_command(input)?;
    if !command.is_bare() {
        return None;
    }

    Some(format!(
        "`{}` is an interactive command and is not available here. Describe the task in plain words instead.",
        command.name
    ))
}
