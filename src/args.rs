//! Argument vectors for `codex exec`.

use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxPolicy {
    WorkspaceWrite,
    ReadOnly,
    /// No sandbox and no approval prompts.
    Bypass,
}

impl SandboxPolicy {
    pub fn resolve(writes_allowed: bool, sandboxed: bool) -> Self {
        match (writes_allowed, sandboxed) {
            (false, _) => Self::ReadOnly,
            (true, true) => Self::WorkspaceWrite,
            (true, false) => Self::Bypass,
        }
    }

    pub fn flags(self) -> &'static [&'static str] {
        match self {
            Self::WorkspaceWrite => &["--sandbox", "workspace-write"],
            Self::ReadOnly => &["--sandbox", "read-only"],
            Self::Bypass => &["--dangerously-bypass-approvals-and-sandbox"],
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecArgs<'a> {
    pub model: &'a str,
    pub sandbox: SandboxPolicy,
    pub image_paths: &'a [PathBuf],
    pub resume_session: Option<&'a str>,
    pub extra_args: &'a [String],
    pub prompt: &'a str,
}

impl ExecArgs<'_> {
    pub fn to_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["exec", "--json", "--skip-git-repo-check", "--model"]
            .iter()
            .map(ToString::to_string)
            .collect();
        args.push(self.model.to_string());
        args.extend(self.sandbox.flags().iter().map(ToString::to_string));

        for image in self.image_paths {
            args.push("-i".to_string());
            args.push(image.display().to_string());
        }

        if let Some(session_id) = self.resume_session {
            args.push("resume".to_string());
            args.push(session_id.to_string());
        }

        args.extend(self.extra_args.iter().cloned());
        args.push(self.prompt.to_string());
        args
    }
}
