use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, warn};

use crate::error::ProcessError;

const READ_CHUNK_BYTES: usize = 8 * 1024;
/// How long pipes may stay open after the child exits (grandchildren can hold them).
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);
/// Delay between the timeout `TERM` and a forced kill.
const KILL_ESCALATION_GRACE: Duration = Duration::from_secs(5);

/// Program, arguments and limits for one supervised run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

impl ProcessSpec {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Term,
    Kill,
}

/// How a supervised process ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitStatusInfo {
    pub code: Option<i32>,
    /// Terminating signal number on Unix.
    pub signal: Option<i32>,
    /// The wall-clock timeout fired before the process exited.
    pub timed_out: bool,
    /// A signal was requested through a [`KillHandle`].
    pub killed: bool,
}

impl ExitStatusInfo {
    pub fn success(&self) -> bool {
        self.code == Some(0) && !self.timed_out
    }

    /// True when the process ended because someone asked it to stop.
    pub fn interrupted(&self) -> bool {
        self.timed_out || self.killed
    }

    fn from_status(status: ExitStatus, timed_out: bool, killed: bool) -> Self {
        Self {
            code: status.code(),
            signal: exit_signal(&status),
            timed_out,
            killed,
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

/// Output and lifecycle events in arrival order. `Exited` is always last.
#[derive(Debug)]
pub enum ProcessEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    Exited(Result<ExitStatusInfo, ProcessError>),
}

/// Collected output of a process run to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit: ExitStatusInfo,
}

#[derive(Debug)]
struct KillState {
    signals: UnboundedSender<Signal>,
    exited: AtomicBool,
}

/// Cloneable handle that can signal a supervised process from any task.
#[derive(Debug, Clone)]
pub struct KillHandle {
    state: Arc<KillState>,
}

impl KillHandle {
    /// Requests delivery of `signal`. Returns false once the process has exited.
    pub fn kill(&self, signal: Signal) -> bool {
        if !self.is_running() {
            return false;
        }

        self.state.signals.send(signal).is_ok()
    }

    pub fn is_running(&self) -> bool {
        !self.state.exited.load(Ordering::SeqCst)
    }

    pub fn same_process(&self, other: &KillHandle) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

/// A spawned process whose output is consumed through [`RunningProcess::next_event`].
#[derive(Debug)]
pub struct RunningProcess {
    pid: Option<u32>,
    events: UnboundedReceiver<ProcessEvent>,
    kill_handle: KillHandle,
    finished: bool,
}

impl RunningProcess {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn kill_handle(&self) -> KillHandle {
        self.kill_handle.clone()
    }

    /// Next output chunk or the exit event; `None` after the exit event was returned.
    pub async fn next_event(&mut self) -> Option<ProcessEvent> {
        if self.finished {
            return None;
        }

        match self.events.recv().await {
            Some(event) => {
                if matches!(event, ProcessEvent::Exited(_)) {
                    self.finished = true;
                }
                Some(event)
            }
            None => {
                self.finished = true;
                Some(ProcessEvent::Exited(Err(ProcessError::SupervisorGone)))
            }
        }
    }

    /// Drains the process to completion, buffering both streams.
    pub async fn wait_with_output(mut self) -> Result<ProcessOutput, ProcessError> {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        while let Some(event) = self.next_event().await {
            match event {
                ProcessEvent::Stdout(chunk) => stdout.extend_from_slice(&chunk),
                ProcessEvent::Stderr(chunk) => stderr.extend_from_slice(&chunk),
                ProcessEvent::Exited(exit) => {
                    return Ok(ProcessOutput {
                        stdout,
                        stderr,
                        exit: exit?,
                    });
                }
            }
        }

        Err(ProcessError::SupervisorGone)
    }
}

/// Spawns `spec` on the current tokio runtime.
///
/// Stdin is closed, both output streams are piped, and the optional timeout is
/// armed immediately. The child is killed once the [`RunningProcess`] is
/// dropped, even while [`KillHandle`] clones are still alive.
pub fn spawn(spec: ProcessSpec) -> Result<RunningProcess, ProcessError> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }

    let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
        program: spec.program.clone(),
        source,
    })?;

    let pid = child.id();
    debug!(program = %spec.program, ?pid, args = spec.args.len(), "spawned process");

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (signal_tx, signal_rx) = mpsc::unbounded_channel();
    let state = Arc::new(KillState {
        signals: signal_tx,
        exited: AtomicBool::new(false),
    });

    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(pump(stdout, event_tx.clone(), ProcessEvent::Stdout)));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(pump(stderr, event_tx.clone(), ProcessEvent::Stderr)));
    }

    tokio::spawn(supervise(
        child,
        spec.timeout,
        signal_rx,
        readers,
        event_tx,
        Arc::clone(&state),
    ));

    Ok(RunningProcess {
        pid,
        events: event_rx,
        kill_handle: KillHandle { state },
        finished: false,
    })
}

async fn pump<R>(
    mut reader: R,
    events: UnboundedSender<ProcessEvent>,
    wrap: fn(Vec<u8>) -> ProcessEvent,
) where
    R: AsyncRead + Unpin,
{
    let mut buffer = vec![0_u8; READ_CHUNK_BYTES];
    loop {
        match reader.read(&mut buffer).await {
            Ok(0) => break,
            Ok(read) => {
                if events.send(wrap(buffer[..read].to_vec())).is_err() {
                    break;
                }
            }
            Err(error) => {
                debug!(%error, "process pipe read failed");
                break;
            }
        }
    }
}

async fn supervise(
    mut child: Child,
    run_timeout: Option<Duration>,
    mut signals: UnboundedReceiver<Signal>,
    mut readers: Vec<JoinHandle<()>>,
    events: UnboundedSender<ProcessEvent>,
    state: Arc<KillState>,
) {
    let mut deadline = run_timeout.map(|limit| Instant::now() + limit);
    let mut timed_out = false;
    let mut killed = false;
    let mut abandoned = false;

    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            _ = events.closed(), if !abandoned => {
                debug!(pid = ?child.id(), "process events dropped; killing");
                abandoned = true;
                killed = true;
                deliver(&mut child, Signal::Kill);
            }
            Some(signal) = signals.recv() => {
                killed = true;
                deliver(&mut child, signal);
            }
            _ = wait_for(deadline), if deadline.is_some() => {
                if timed_out {
                    warn!(pid = ?child.id(), "process ignored TERM after timeout; killing");
                    deliver(&mut child, Signal::Kill);
                    deadline = None;
                } else {
                    warn!(pid = ?child.id(), "process timed out; sending TERM");
                    timed_out = true;
                    deliver(&mut child, Signal::Term);
                    deadline = Some(Instant::now() + KILL_ESCALATION_GRACE);
                }
            }
        }
    };

    let drain = async {
        for reader in &mut readers {
            let _ = reader.await;
        }
    };
    if timeout(OUTPUT_DRAIN_GRACE, drain).await.is_err() {
        debug!("output pipes still open after exit; abandoning readers");
        for reader in &readers {
            reader.abort();
        }
    }

    state.exited.store(true, Ordering::SeqCst);

    let outcome = status
        .map(|status| ExitStatusInfo::from_status(status, timed_out, killed))
        .map_err(ProcessError::Wait);
    if let Ok(exit) = &outcome {
        debug!(exit_code = ?exit.code, signal = ?exit.signal, timed_out, killed, "process exited");
    }
    let _ = events.send(ProcessEvent::Exited(outcome));
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(unix)]
fn deliver(child: &mut Child, signal: Signal) {
    let Some(pid) = child.id() else {
        return;
    };
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return;
    };

    let signo = match signal {
        Signal::Term => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };

    // SAFETY: `pid` belongs to a child this task has not yet reaped.
    let result = unsafe { libc::kill(pid, signo) };
    if result != 0 {
        debug!(pid, ?signal, error = %std::io::Error::last_os_error(), "signal delivery failed");
    }
}

#[cfg(not(unix))]
fn deliver(child: &mut Child, _signal: Signal) {
    if let Err(error) = child.start_kill() {
        debug!(%error, "kill failed");
    }
}
