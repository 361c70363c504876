use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed waiting for process: {0}")]
    Wait(#[source] io::Error),
    #[error("process supervisor stopped before reporting an exit status")]
    SupervisorGone,
}

impl ProcessError {
    /// True when the OS rejected the spawn because the argument list was too long.
    pub fn is_argument_overflow(&self) -> bool {
        match self {
            Self::Spawn { source, .. } => is_e2big(source),
            _ => false,
        }
    }
}

#[cfg(unix)]
fn is_e2big(error: &io::Error) -> bool {
    error.raw_os_error() == Some(libc::E2BIG)
}

#[cfg(not(unix))]
fn is_e2big(_error: &io::Error) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::ProcessError;

    #[cfg(unix)]
    #[test]
    fn e2big_spawn_errors_are_argument_overflow() {
        let error = ProcessError::Spawn {
            program: "codex".to_string(),
            source: io::Error::from_raw_os_error(libc::E2BIG),
        };

        assert!(error.is_argument_overflow());
    }

    #[test]
    fn missing_binary_is_not_argument_overflow() {
        let error = ProcessError::Spawn {
            program: "codex".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "not found"),
        };

        assert!(!error.is_argument_overflow());
        assert_eq!(error.to_string(), "failed to launch codex: not found");
    }
}
