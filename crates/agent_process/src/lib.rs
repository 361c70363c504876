//! Supervision of one external agent process per conversation turn.
//!
//! [`spawn`] starts a program with piped output and hands back a
//! [`RunningProcess`] that yields raw output chunks followed by exactly one
//! exit event. [`ProcessRegistry`] tracks which conversations currently own a
//! live process so they can be cancelled from elsewhere.

mod error;
mod registry;
mod supervisor;

pub use error::ProcessError;
pub use registry::{ProcessRegistry, Registration};
pub use supervisor::{
    spawn, ExitStatusInfo, KillHandle, ProcessEvent, ProcessOutput, ProcessSpec, RunningProcess,
    Signal,
};
