//! Subprocess guardian.
//!
//! Every external command the toolkit runs goes through here: no other
//! module is permitted to spawn processes. The guardian enforces hard
//! bounds (wall-clock timeout, output size, best-effort memory limit),
//! distinguishes failure modes as typed errors, retries transient execution
//! failures, and guarantees that neither the child nor its process group
//! outlives a timeout or cancellation.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

#[cfg(unix)]
use std::os::unix::process::CommandExt;

/// Poll interval for the interruptible wait loop.
const WAIT_TICK: Duration = Duration::from_millis(25);
/// Grace period between the polite and the forceful kill.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Result of a completed command.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub success: bool,
    /// 1-based attempt number that produced this output.
    pub attempt: u32,
    pub output_truncated: bool,
    pub duration: Duration,
}

/// Failure taxonomy. The kinds are never collapsed into each other; retry
/// policy and propagation differ per kind.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("command not found: {command}")]
    NotFound { command: String },
    #[error("command failed with exit code {exit_code} after {attempts} attempt(s)")]
    Execution {
        exit_code: i32,
        stdout: String,
        stderr: String,
        attempts: u32,
    },
    #[error("command timed out after {timeout:?}")]
    Timeout { timeout: Duration },
    #[error("command interrupted")]
    Interrupted,
    #[error("subprocess error: {0}")]
    Other(#[source] io::Error),
}

/// How the command is given to the OS.
#[derive(Debug, Clone)]
enum CommandLine {
    Argv(Vec<String>),
    /// Explicitly requested shell execution. Never inferred.
    Shell(String),
}

/// A fully specified command invocation.
#[derive(Debug, Clone)]
pub struct RunRequest {
    command: CommandLine,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
    timeout: Option<Duration>,
    memory_limit_mb: Option<u64>,
    retry_count: u32,
    retry_delay: Duration,
    max_output_size: Option<usize>,
    sensitive_args: Vec<String>,
    input: Option<Vec<u8>>,
    new_process_group: bool,
    merge_stderr: bool,
}

impl RunRequest {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_command(CommandLine::Argv(
            argv.into_iter().map(Into::into).collect(),
        ))
    }

    /// Builds a shell invocation. Shell execution is a deliberate choice
    /// the caller makes; it is logged with a warning on every run.
    pub fn shell(command: impl Into<String>) -> Self {
        Self::with_command(CommandLine::Shell(command.into()))
    }

    fn with_command(command: CommandLine) -> Self {
        Self {
            command,
            cwd: None,
            env: Vec::new(),
            timeout: None,
            memory_limit_mb: None,
            retry_count: 0,
            retry_delay: Duration::from_secs(1),
            max_output_size: None,
            sensitive_args: Vec::new(),
            input: None,
            new_process_group: false,
            merge_stderr: false,
        }
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Best-effort address-space cap on POSIX; a documented no-op on
    /// Windows.
    pub fn memory_limit_mb(mut self, limit: u64) -> Self {
        self.memory_limit_mb = Some(limit);
        self
    }

    pub fn retries(mut self, count: u32, delay: Duration) -> Self {
        self.retry_count = count;
        self.retry_delay = delay;
        self
    }

    pub fn max_output_size(mut self, bytes: usize) -> Self {
        self.max_output_size = Some(bytes);
        self
    }

    /// Arguments masked with `***` in log lines. The executed argv is
    /// never altered.
    pub fn sensitive_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sensitive_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn input(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.input = Some(data.into());
        self
    }

    /// Put the child into its own process group so that a timeout or
    /// cancellation terminates descendants too.
    pub fn new_process_group(mut self) -> Self {
        self.new_process_group = true;
        self
    }

    pub fn merge_stderr(mut self) -> Self {
        self.merge_stderr = true;
        self
    }

    fn program(&self) -> String {
        match &self.command {
            CommandLine::Argv(argv) => argv.first().cloned().unwrap_or_default(),
            CommandLine::Shell(command) => {
                command.split_whitespace().next().unwrap_or("").to_string()
            }
        }
    }

    fn masked_display(&self) -> String {
        let mask = |piece: &str| -> String {
            if self.sensitive_args.iter().any(|secret| secret == piece) {
                return "***".to_string();
            }
            let mut masked = piece.to_string();
            for secret in &self.sensitive_args {
                if !secret.is_empty() && masked.contains(secret.as_str()) {
                    masked = masked.replace(secret.as_str(), "***");
                }
            }
            masked
        };
        match &self.command {
            CommandLine::Argv(argv) => argv
                .iter()
                .map(|arg| mask(arg))
                .collect::<Vec<_>>()
                .join(" "),
            CommandLine::Shell(command) => mask(command),
        }
    }
}

#[derive(Default)]
struct ContextInner {
    cancelled: AtomicBool,
    /// Live children: pid to whether it leads a process group.
    live: Mutex<HashMap<u32, bool>>,
}

/// Scopes a batch of commands. Registers each live child and guarantees
/// that everything still running is terminated when the context is
/// cancelled or dropped.
#[derive(Clone, Default)]
pub struct ProcessContext {
    inner: Arc<ContextInner>,
}

impl ProcessContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals every in-flight command to stop. Outstanding `run` calls
    /// resolve with [`ProcessError::Interrupted`].
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let live = self.inner.live.lock().expect("context lock");
        for (&pid, &group) in live.iter() {
            signal_tree(pid, group, Signal::Term);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    fn register(&self, pid: u32, group: bool) {
        self.inner
            .live
            .lock()
            .expect("context lock")
            .insert(pid, group);
    }

    fn unregister(&self, pid: u32) {
        self.inner.live.lock().expect("context lock").remove(&pid);
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        // Last line of defense on abnormal exit paths; normally every child
        // has already been unregistered by its owning run loop.
        let live = self.live.get_mut().expect("context lock");
        for (&pid, &group) in live.iter() {
            signal_tree(pid, group, Signal::Kill);
        }
        live.clear();
    }
}

#[derive(Clone, Copy)]
enum Signal {
    Term,
    Kill,
}

#[cfg(unix)]
fn signal_tree(pid: u32, group: bool, signal: Signal) {
    let signal = match signal {
        Signal::Term => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    #[allow(clippy::cast_possible_wrap)]
    let pid = pid as libc::pid_t;
    let target = if group { -pid } else { pid };
    unsafe {
        libc::kill(target, signal);
    }
}

#[cfg(not(unix))]
fn signal_tree(_pid: u32, _group: bool, _signal: Signal) {
    // Killing by pid is handled by the owning wait loop on Windows; the
    // CREATE_NEW_PROCESS_GROUP flag scopes console signals.
}

/// Runs a command to completion under the guardian's policies.
///
/// # Errors
///
/// [`ProcessError::NotFound`] when the executable is absent,
/// [`ProcessError::Execution`] after retries for non-zero exits,
/// [`ProcessError::Timeout`] when the wall clock bound is exceeded,
/// [`ProcessError::Interrupted`] when the context was cancelled, and
/// [`ProcessError::Other`] for unexpected I/O failures.
pub fn run(request: &RunRequest, context: &ProcessContext) -> Result<RunOutput, ProcessError> {
    if matches!(request.command, CommandLine::Shell(_)) {
        warn!(command = %request.masked_display(), "shell execution requested");
    }
    let mut attempt = 0;
    loop {
        attempt += 1;
        match run_once(request, context, attempt) {
            Ok(output) => return Ok(output),
            Err(ProcessError::Execution { .. }) if attempt <= request.retry_count => {
                debug!(
                    command = %request.masked_display(),
                    attempt,
                    "command failed, retrying"
                );
                thread::sleep(request.retry_delay);
            }
            Err(error) => return Err(error),
        }
    }
}

fn build_command(request: &RunRequest) -> Command {
    let mut command = match &request.command {
        CommandLine::Argv(argv) => {
            let mut command = Command::new(argv.first().map_or("", String::as_str));
            command.args(&argv[1.min(argv.len())..]);
            command
        }
        CommandLine::Shell(line) => {
            if cfg!(windows) {
                let mut command = Command::new("cmd");
                command.arg("/C").arg(line);
                command
            } else {
                let mut command = Command::new("sh");
                command.arg("-c").arg(line);
                command
            }
        }
    };
    for (key, value) in &request.env {
        command.env(key, value);
    }
    if let Some(cwd) = &request.cwd {
        command.current_dir(cwd);
    }
    command
}

#[cfg(unix)]
fn apply_limits(command: &mut Command, request: &RunRequest) {
    let group = request.new_process_group;
    let limit = request.memory_limit_mb;
    if !group && limit.is_none() {
        return;
    }
    unsafe {
        command.pre_exec(move || {
            if group && libc::setpgid(0, 0) != 0 {
                return Err(io::Error::last_os_error());
            }
            if let Some(mb) = limit {
                let bytes = mb.saturating_mul(1024 * 1024) as libc::rlim_t;
                let rlimit = libc::rlimit {
                    rlim_cur: bytes,
                    rlim_max: bytes,
                };
                // Best effort: a refused limit must not break the spawn.
                let _ = libc::setrlimit(libc::RLIMIT_AS, &rlimit);
            }
            Ok(())
        });
    }
}

#[cfg(windows)]
fn apply_limits(command: &mut Command, request: &RunRequest) {
    use std::os::windows::process::CommandExt;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    if request.new_process_group {
        command.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }
    // Memory limits are a documented no-op on Windows.
}

#[cfg(not(any(unix, windows)))]
fn apply_limits(_command: &mut Command, _request: &RunRequest) {}

struct Captured {
    data: Vec<u8>,
    truncated: bool,
}

/// Reads a stream to EOF, keeping at most `cap` bytes. Reading past the cap
/// continues so that a full pipe never deadlocks the child.
fn drain_stream(mut reader: impl Read, cap: Option<usize>) -> io::Result<Captured> {
    let mut captured = Captured {
        data: Vec::new(),
        truncated: false,
    };
    let mut chunk = [0u8; 8192];
    loop {
        let read = reader.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        match cap {
            Some(cap) if captured.data.len() + read > cap => {
                let keep = cap.saturating_sub(captured.data.len());
                captured.data.extend_from_slice(&chunk[..keep]);
                captured.truncated = true;
            }
            _ => captured.data.extend_from_slice(&chunk[..read]),
        }
    }
    Ok(captured)
}

fn run_once(
    request: &RunRequest,
    context: &ProcessContext,
    attempt: u32,
) -> Result<RunOutput, ProcessError> {
    if context.is_cancelled() {
        return Err(ProcessError::Interrupted);
    }
    let started = Instant::now();
    debug!(command = %request.masked_display(), attempt, "running command");

    let mut command = build_command(request);
    apply_limits(&mut command, request);
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());
    command.stdin(if request.input.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });

    let mut child = command.spawn().map_err(|error| {
        if error.kind() == io::ErrorKind::NotFound {
            ProcessError::NotFound {
                command: request.program(),
            }
        } else {
            ProcessError::Other(error)
        }
    })?;
    let pid = child.id();
    context.register(pid, request.new_process_group);

    let result = supervise(request, context, &mut child, started);
    context.unregister(pid);

    let (stdout, stderr, truncated, exit_code) = result?;
    let success = exit_code == 0;
    let duration = started.elapsed();
    if !success {
        return Err(ProcessError::Execution {
            exit_code,
            stdout,
            stderr,
            attempts: attempt,
        });
    }
    Ok(RunOutput {
        stdout,
        stderr,
        exit_code,
        success,
        attempt,
        output_truncated: truncated,
        duration,
    })
}

type StreamResult = (String, String, bool, i32);

fn supervise(
    request: &RunRequest,
    context: &ProcessContext,
    child: &mut Child,
    started: Instant,
) -> Result<StreamResult, ProcessError> {
    let pid = child.id();
    let group = request.new_process_group;

    if let Some(input) = request.input.clone() {
        if let Some(mut stdin) = child.stdin.take() {
            // Feed stdin off-thread so a child that never reads cannot
            // block us; the write error on early exit is irrelevant.
            thread::spawn(move || {
                let _ = stdin.write_all(&input);
            });
        }
    }

    let cap = request.max_output_size;
    let stdout_pipe = child.stdout.take().ok_or_else(|| {
        ProcessError::Other(io::Error::other("child stdout was not captured"))
    })?;
    let stderr_pipe = child.stderr.take().ok_or_else(|| {
        ProcessError::Other(io::Error::other("child stderr was not captured"))
    })?;
    let stdout_reader = thread::spawn(move || drain_stream(stdout_pipe, cap));
    let stderr_reader = thread::spawn(move || drain_stream(stderr_pipe, None));

    let deadline = request.timeout.map(|timeout| started + timeout);
    let status = loop {
        // Cancellation wins over a child that the cancel signal already
        // reaped; checking first keeps the error kind deterministic.
        if context.is_cancelled() {
            terminate(child, pid, group);
            return Err(ProcessError::Interrupted);
        }
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(error) => {
                terminate(child, pid, group);
                return Err(ProcessError::Other(error));
            }
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                terminate(child, pid, group);
                return Err(ProcessError::Timeout {
                    timeout: request.timeout.expect("deadline implies timeout"),
                });
            }
        }
        thread::sleep(WAIT_TICK);
    };
    if context.is_cancelled() {
        return Err(ProcessError::Interrupted);
    }

    let stdout = join_reader(stdout_reader)?;
    let stderr = join_reader(stderr_reader)?;
    let truncated = stdout.truncated;
    let mut stdout_text = String::from_utf8_lossy(&stdout.data).into_owned();
    let stderr_text = if request.merge_stderr {
        stdout_text.push_str(&String::from_utf8_lossy(&stderr.data));
        String::new()
    } else {
        String::from_utf8_lossy(&stderr.data).into_owned()
    };
    let exit_code = status.code().unwrap_or(-1);
    Ok((stdout_text, stderr_text, truncated, exit_code))
}

fn join_reader(handle: thread::JoinHandle<io::Result<Captured>>) -> Result<Captured, ProcessError> {
    handle
        .join()
        .map_err(|_| ProcessError::Other(io::Error::other("output reader panicked")))?
        .map_err(ProcessError::Other)
}

/// Graceful, then forceful termination of the child (and its whole group
/// when one was created), followed by a reap so nothing is left as a
/// zombie. A child that exits within the grace window gets no further
/// signal: once it is reaped its pid may already belong to someone else.
fn terminate(child: &mut Child, pid: u32, group: bool) {
    signal_tree(pid, group, Signal::Term);
    let grace_deadline = Instant::now() + KILL_GRACE;
    while Instant::now() < grace_deadline {
        if matches!(child.try_wait(), Ok(Some(_))) {
            return;
        }
        thread::sleep(WAIT_TICK);
    }
    signal_tree(pid, group, Signal::Kill);
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> RunRequest {
        RunRequest::new(parts.iter().copied())
    }

    #[cfg(unix)]
    #[test]
    fn captures_output_and_exit_code() {
        let context = ProcessContext::new();
        let request = RunRequest::shell("printf out && printf err >&2");
        let output = run(&request, &context).unwrap();
        assert_eq!(output.stdout, "out");
        assert_eq!(output.stderr, "err");
        assert_eq!(output.exit_code, 0);
        assert!(output.success);
        assert_eq!(output.attempt, 1);
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_an_execution_error_with_output() {
        let context = ProcessContext::new();
        let request = RunRequest::shell("printf partial; exit 7");
        match run(&request, &context) {
            Err(ProcessError::Execution {
                exit_code,
                stdout,
                attempts,
                ..
            }) => {
                assert_eq!(exit_code, 7);
                assert_eq!(stdout, "partial");
                assert_eq!(attempts, 1);
            }
            other => panic!("expected execution error, got {other:?}"),
        }
    }

    #[test]
    fn missing_executable_is_not_found() {
        let context = ProcessContext::new();
        let request = argv(&["denv-test-no-such-binary-12345"]);
        match run(&request, &context) {
            Err(ProcessError::NotFound { command }) => {
                assert_eq!(command, "denv-test-no-such-binary-12345");
            }
            other => panic!("expected not-found, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_the_child_well_inside_the_grace_bound() {
        let context = ProcessContext::new();
        let request = argv(&["sleep", "30"]).timeout(Duration::from_secs(2));
        let started = Instant::now();
        match run(&request, &context) {
            Err(ProcessError::Timeout { timeout }) => {
                assert_eq!(timeout, Duration::from_secs(2));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn process_group_timeout_reaps_descendants() {
        let context = ProcessContext::new();
        let request = RunRequest::shell("sleep 30 & sleep 30")
            .timeout(Duration::from_secs(1))
            .new_process_group();
        let started = Instant::now();
        assert!(matches!(
            run(&request, &context),
            Err(ProcessError::Timeout { .. })
        ));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn retries_apply_only_to_execution_errors() {
        let context = ProcessContext::new();
        // Fails deterministically on every attempt; three attempts total.
        let request = RunRequest::shell("exit 3").retries(2, Duration::from_millis(10));
        match run(&request, &context) {
            Err(ProcessError::Execution { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected execution error, got {other:?}"),
        }

        // NotFound is never retried.
        let started = Instant::now();
        let request =
            argv(&["denv-test-no-such-binary-12345"]).retries(5, Duration::from_secs(1));
        assert!(matches!(
            run(&request, &context),
            Err(ProcessError::NotFound { .. })
        ));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[cfg(unix)]
    #[test]
    fn output_is_truncated_at_the_cap_but_drained() {
        let context = ProcessContext::new();
        let request = RunRequest::shell("yes denv | head -c 100000").max_output_size(1024);
        let output = run(&request, &context).unwrap();
        assert!(output.output_truncated);
        assert_eq!(output.stdout.len(), 1024);
    }

    #[cfg(unix)]
    #[test]
    fn stdin_is_fed_from_the_request() {
        let context = ProcessContext::new();
        let request = argv(&["cat"]).input("hello guardian");
        let output = run(&request, &context).unwrap();
        assert_eq!(output.stdout, "hello guardian");
    }

    #[cfg(unix)]
    #[test]
    fn merged_stderr_lands_in_stdout() {
        let context = ProcessContext::new();
        let request = RunRequest::shell("printf out; printf err >&2").merge_stderr();
        let output = run(&request, &context).unwrap();
        assert!(output.stdout.contains("out"));
        assert!(output.stdout.contains("err"));
        assert!(output.stderr.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn cancelled_context_interrupts_promptly() {
        let context = ProcessContext::new();
        let worker_context = context.clone();
        let handle = thread::spawn(move || {
            let request = argv(&["sleep", "30"]);
            run(&request, &worker_context)
        });
        thread::sleep(Duration::from_millis(200));
        let started = Instant::now();
        context.cancel();
        let result = handle.join().unwrap();
        assert!(matches!(result, Err(ProcessError::Interrupted)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn sensitive_arguments_are_masked_in_the_log_line_only() {
        let request = argv(&["tool", "--token", "s3cret", "--url", "https://x/s3cret/y"])
            .sensitive_args(["s3cret"]);
        let display = request.masked_display();
        assert!(!display.contains("s3cret"));
        assert_eq!(display, "tool --token *** --url https://x/***/y");
        // The argv itself is untouched.
        match &request.command {
            CommandLine::Argv(argv) => assert!(argv.contains(&"s3cret".to_string())),
            CommandLine::Shell(_) => unreachable!(),
        }
    }
}
