//! Process Sandbox - hardened subprocess execution
//!
//! Every external toolchain call goes through [`ProcessSandbox`]:
//! - executable names are validated before anything is spawned
//! - arguments are a discrete list, never a shell command line
//! - stdout and stderr are drained on their own threads while we wait
//! - output is capped per stream with a visible truncation marker
//! - a timeout (and optional caller cancellation) kills the whole tree

mod cancel;
mod capture;
mod kill;
mod validate;

pub use cancel::CancelToken;
pub use capture::{BoundedReader, Captured, TRUNCATION_MARKER};
pub use kill::kill_process_tree;
pub use validate::{validate_executable, validate_root_path};

use crate::{Error, Result};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default per-invocation timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
/// Hard ceiling for any configured timeout
pub const MAX_TIMEOUT: Duration = Duration::from_secs(3600);
/// Environment override for the timeout, in whole seconds
pub const TIMEOUT_ENV: &str = "APIGRAPH_PROCESS_TIMEOUT_SECS";
/// Default per-stream output cap, in characters
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 10_000_000;

const POLL_INTERVAL: Duration = Duration::from_millis(25);
const KILL_GRACE: Duration = Duration::from_secs(2);
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Parse a timeout override. Absent, unparsable or zero values fall back to
/// [`DEFAULT_TIMEOUT`]; anything above [`MAX_TIMEOUT`] is clamped.
pub fn parse_timeout(raw: Option<&str>) -> Duration {
    let Some(raw) = raw else {
        return DEFAULT_TIMEOUT;
    };
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => {
            tracing::warn!("Ignoring invalid {}={:?}, using default", TIMEOUT_ENV, raw);
            DEFAULT_TIMEOUT
        }
        Ok(secs) => Duration::from_secs(secs).min(MAX_TIMEOUT),
    }
}

/// A single external program invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<OsString>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub stdin: Option<Vec<u8>>,
    pub env: Vec<(String, String)>,
    pub cancel: Option<CancelToken>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout: None,
            stdin: None,
            env: Vec::new(),
            cancel: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn cancel_on(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Human-readable command line, for logs and error messages only
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().map(|a| a.to_string_lossy().into_owned()));
        parts.join(" ")
    }
}

/// Outcome of a buffered invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    /// Exit code; -1 when the process was killed by a signal
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub duration: Duration,
    /// Force-killed because the timeout elapsed
    pub timed_out: bool,
    /// Force-killed because the caller cancelled
    pub cancelled: bool,
}

impl ProcessResult {
    /// Exited on its own with status zero
    pub fn success(&self) -> bool {
        !self.timed_out && !self.cancelled && self.exit_code == 0
    }

    pub fn is_truncated(&self) -> bool {
        self.stdout_truncated || self.stderr_truncated
    }
}

/// Outcome of a streaming invocation once the stream has been consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingProcessResult {
    pub exit_code: i32,
    pub stderr: String,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub duration: Duration,
    pub timed_out: bool,
    pub cancelled: bool,
}

impl StreamingProcessResult {
    pub fn success(&self) -> bool {
        !self.timed_out && !self.cancelled && self.exit_code == 0
    }
}

/// Hardened subprocess runner.
#[derive(Debug, Clone)]
pub struct ProcessSandbox {
    default_timeout: Duration,
    max_output_chars: usize,
}

impl Default for ProcessSandbox {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_MAX_OUTPUT_CHARS)
    }
}

impl ProcessSandbox {
    pub fn new(default_timeout: Duration, max_output_chars: usize) -> Self {
        Self {
            default_timeout: default_timeout.min(MAX_TIMEOUT),
            max_output_chars: max_output_chars.max(1),
        }
    }

    pub fn from_config(config: &crate::config::EngineConfig) -> Self {
        Self::new(config.process_timeout(), config.max_output_chars)
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    fn effective_timeout(&self, invocation: &Invocation) -> Duration {
        invocation
            .timeout
            .unwrap_or(self.default_timeout)
            .min(MAX_TIMEOUT)
    }

    /// Validate the invocation and build the `Command`. Nothing is spawned.
    fn prepare(&self, invocation: &Invocation) -> Result<Command> {
        validate_executable(&invocation.program)?;

        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);

        if let Some(dir) = &invocation.working_dir {
            command.current_dir(validate_root_path(dir)?);
        }
        for (key, value) in &invocation.env {
            command.env(key, value);
        }

        command
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        kill::isolate_process_group(&mut command);

        Ok(command)
    }

    fn spawn(&self, invocation: &Invocation) -> Result<Child> {
        let mut command = self.prepare(invocation)?;
        tracing::debug!("Spawning: {}", invocation.display());

        let mut child = command.spawn().map_err(|source| Error::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        if let (Some(mut pipe), Some(bytes)) = (child.stdin.take(), invocation.stdin.clone()) {
            thread::spawn(move || {
                if let Err(e) = pipe.write_all(&bytes) {
                    tracing::debug!("stdin write ended early: {}", e);
                }
            });
        }

        Ok(child)
    }

    /// Run to completion, buffering both streams.
    pub fn execute(&self, invocation: &Invocation) -> Result<ProcessResult> {
        let timeout = self.effective_timeout(invocation);
        let started = Instant::now();
        let mut child = self.spawn(invocation)?;
        let pid = child.id();

        let stdout_rx = drain(child.stdout.take(), self.max_output_chars);
        let stderr_rx = drain(child.stderr.take(), self.max_output_chars);

        let (exit_tx, exit_rx) = channel::bounded::<io::Result<ExitStatus>>(1);
        thread::spawn(move || {
            let _ = exit_tx.send(child.wait());
        });

        let deadline = started + timeout;
        let mut timed_out = false;
        let mut cancelled = false;

        let status = loop {
            if invocation.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                cancelled = true;
                kill_process_tree(pid);
                break exit_rx.recv_timeout(KILL_GRACE).ok();
            }

            let now = Instant::now();
            if now >= deadline {
                timed_out = true;
                tracing::warn!(
                    "{} exceeded {}s timeout, killing process tree",
                    invocation.program,
                    timeout.as_secs_f32()
                );
                kill_process_tree(pid);
                break exit_rx.recv_timeout(KILL_GRACE).ok();
            }

            match exit_rx.recv_timeout((deadline - now).min(POLL_INTERVAL)) {
                Ok(status) => break Some(status),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break None,
            }
        };

        let killed = timed_out || cancelled;
        let stdout = collect(&stdout_rx, pid, killed);
        let stderr = collect(&stderr_rx, pid, killed);

        Ok(ProcessResult {
            exit_code: exit_code(status),
            stdout: stdout.text,
            stderr: stderr.text,
            stdout_truncated: stdout.truncated,
            stderr_truncated: stderr.truncated,
            duration: started.elapsed(),
            timed_out,
            cancelled,
        })
    }

    /// Spawn and expose stdout as a live stream instead of buffering it.
    ///
    /// stderr is still drained and capped in the background, and a watchdog
    /// enforces the timeout. Call [`StreamingProcess::finish`] when done.
    pub fn spawn_streaming(&self, invocation: &Invocation) -> Result<StreamingProcess> {
        let timeout = self.effective_timeout(invocation);
        let started = Instant::now();
        let mut child = self.spawn(invocation)?;
        let pid = child.id();

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Io(io::Error::other("child stdout was not piped")))?;
        let stdout_truncated = Arc::new(AtomicBool::new(false));
        let stdout = BoundedReader::new(stdout, self.max_output_chars, stdout_truncated.clone());

        let stderr_rx = drain(child.stderr.take(), self.max_output_chars);

        let timed_out = Arc::new(AtomicBool::new(false));
        let cancelled = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = channel::bounded::<()>(1);

        let watchdog = {
            let timed_out = timed_out.clone();
            let cancelled = cancelled.clone();
            let cancel = invocation.cancel.clone();
            let deadline = started + timeout;
            thread::spawn(move || watchdog(pid, deadline, cancel, done_rx, timed_out, cancelled))
        };

        Ok(StreamingProcess {
            program: invocation.program.clone(),
            pid,
            child,
            stdout,
            stdout_truncated,
            stderr_rx,
            started,
            done_tx,
            watchdog: Some(watchdog),
            timed_out,
            cancelled,
            finished: false,
        })
    }
}

/// A running process whose stdout is consumed as a stream.
pub struct StreamingProcess {
    program: String,
    pid: u32,
    child: Child,
    stdout: BoundedReader<ChildStdout>,
    stdout_truncated: Arc<AtomicBool>,
    stderr_rx: Receiver<Captured>,
    started: Instant,
    done_tx: Sender<()>,
    watchdog: Option<JoinHandle<()>>,
    timed_out: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
    finished: bool,
}

impl StreamingProcess {
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Wait for exit and collect stderr. Unread stdout is drained first so the
    /// child cannot block on a full pipe.
    pub fn finish(mut self) -> StreamingProcessResult {
        self.complete()
    }

    fn complete(&mut self) -> StreamingProcessResult {
        self.finished = true;

        if let Err(e) = io::copy(&mut self.stdout, &mut io::sink()) {
            tracing::debug!("Draining stdout of {} failed: {}", self.program, e);
        }
        let status = self.child.wait();
        let _ = self.done_tx.send(());
        if let Some(handle) = self.watchdog.take() {
            let _ = handle.join();
        }

        let timed_out = self.timed_out.load(Ordering::SeqCst);
        let cancelled = self.cancelled.load(Ordering::SeqCst);
        let stderr = collect(&self.stderr_rx, self.pid, timed_out || cancelled);

        StreamingProcessResult {
            exit_code: exit_code(Some(status)),
            stderr: stderr.text,
            stdout_truncated: self.stdout_truncated.load(Ordering::SeqCst),
            stderr_truncated: stderr.truncated,
            duration: self.started.elapsed(),
            timed_out,
            cancelled,
        }
    }
}

impl Read for StreamingProcess {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stdout.read(buf)
    }
}

impl Drop for StreamingProcess {
    fn drop(&mut self) {
        if !self.finished {
            kill_process_tree(self.pid);
            let _ = self.child.wait();
            let _ = self.done_tx.send(());
        }
    }
}

fn watchdog(
    pid: u32,
    deadline: Instant,
    cancel: Option<CancelToken>,
    done_rx: Receiver<()>,
    timed_out: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
) {
    loop {
        if cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            cancelled.store(true, Ordering::SeqCst);
            kill_process_tree(pid);
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            timed_out.store(true, Ordering::SeqCst);
            kill_process_tree(pid);
            return;
        }
        match done_rx.recv_timeout((deadline - now).min(POLL_INTERVAL)) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => continue,
        }
    }
}

/// Drain a pipe on its own thread; the capture arrives on the channel.
fn drain<R: Read + Send + 'static>(pipe: Option<R>, max_chars: usize) -> Receiver<Captured> {
    let (tx, rx) = channel::bounded(1);
    thread::spawn(move || {
        let captured = pipe.map(|p| capture::capture(p, max_chars)).unwrap_or_default();
        let _ = tx.send(captured);
    });
    rx
}

/// Receive a drained stream. A grandchild that inherited the pipe can keep it
/// open after the child exits; in that case the tree is killed and whatever
/// arrives within the grace period is used.
fn collect(rx: &Receiver<Captured>, pid: u32, killed: bool) -> Captured {
    let grace = if killed { KILL_GRACE } else { DRAIN_GRACE };
    match rx.recv_timeout(grace) {
        Ok(captured) => captured,
        Err(_) => {
            kill_process_tree(pid);
            rx.recv_timeout(KILL_GRACE).unwrap_or_default()
        }
    }
}

fn exit_code(status: Option<io::Result<ExitStatus>>) -> i32 {
    status
        .and_then(|s| s.ok())
        .and_then(|s| s.code())
        .unwrap_or(-1)
}
