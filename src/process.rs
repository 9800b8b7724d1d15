//! External tool runner
//!
//! Every component that shells out (git, cmake, MSBuild, mysqld, mysql,
//! taskkill...) goes through `ToolCommand`, which gives one implementation of
//! timeouts, cooperative cancellation, graceful-then-forced termination and
//! line-by-line output streaming.

use std::collections::VecDeque;
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use wait_timeout::ChildExt;

use crate::logging::log_warning;
use crate::task::{TaskContext, TaskError};

/// Time a child gets to exit after a graceful terminate before it is killed.
pub const GRACE_PERIOD: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const OUTPUT_TAIL_LINES: usize = 200;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ToolError {
    /// The program could not be started at all
    Spawn { program: String, not_found: bool, reason: String },
    TimedOut { label: String, secs: u64 },
    Cancelled,
    Io { label: String, reason: String },
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolError::Spawn { program, reason, .. } => {
                write!(f, "Failed to start {}: {}", program, reason)
            }
            ToolError::TimedOut { label, secs } => {
                write!(f, "{} timed out after {} seconds", label, secs)
            }
            ToolError::Cancelled => write!(f, "Cancelled by user"),
            ToolError::Io { label, reason } => write!(f, "{}: {}", label, reason),
        }
    }
}

impl std::error::Error for ToolError {}

impl From<ToolError> for TaskError {
    fn from(e: ToolError) -> Self {
        match e {
            ToolError::Cancelled => TaskError::Cancelled,
            ToolError::TimedOut { label, secs } => TaskError::TimedOut { label, secs },
            ToolError::Spawn { program, not_found: true, .. } => {
                TaskError::MissingTool { name: program }
            }
            ToolError::Spawn { program, reason, .. } => TaskError::ToolFailed {
                label: program,
                code: None,
                detail: reason,
            },
            ToolError::Io { label, reason } => TaskError::Io { context: label, reason },
        }
    }
}

// ============================================================================
// Output
// ============================================================================

#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    /// Most recent output lines (stdout and stderr interleaved)
    pub lines: Vec<String>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    pub fn tail(&self, n: usize) -> String {
        let start = self.lines.len().saturating_sub(n);
        self.lines[start..].join("\n")
    }

    /// Turn a non-zero exit into `TaskError::ToolFailed` carrying the output tail.
    pub fn into_result(self, label: &str) -> Result<Self, TaskError> {
        if self.success() {
            Ok(self)
        } else {
            Err(TaskError::ToolFailed {
                label: label.to_string(),
                code: self.code(),
                detail: self.tail(15),
            })
        }
    }
}

// ============================================================================
// Tool Command
// ============================================================================

pub type LineObserver = Arc<dyn Fn(&str) + Send + Sync>;

pub struct ToolCommand {
    program: OsString,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    cwd: Option<PathBuf>,
    timeout: Option<Duration>,
    stdin_file: Option<PathBuf>,
    label: String,
    echo: bool,
    observer: Option<LineObserver>,
}

impl ToolCommand {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        let program = program.as_ref().to_os_string();
        let label = Path::new(&program)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| program.to_string_lossy().to_string());
        Self {
            program,
            args: Vec::new(),
            envs: Vec::new(),
            cwd: None,
            timeout: None,
            stdin_file: None,
            label,
            echo: true,
            observer: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        for (k, v) in vars {
            self = self.env(k, v);
        }
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Pipe the contents of `path` into the child's stdin.
    pub fn stdin_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin_file = Some(path.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Don't forward output lines to the task log.
    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    /// Called for every output line, in addition to the task log.
    pub fn on_line(mut self, observer: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn arg_list(&self) -> &[OsString] {
        &self.args
    }

    pub fn env_list(&self) -> &[(OsString, OsString)] {
        &self.envs
    }

    /// Human readable command line (for logs).
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.to_string_lossy().to_string()];
        parts.extend(self.args.iter().map(|a| a.to_string_lossy().to_string()));
        parts.join(" ")
    }

    fn build(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (k, v) in &self.envs {
            cmd.env(k, v);
        }
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        cmd.stdin(if self.stdin_file.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd
    }

    fn spawn(&self) -> Result<Child, ToolError> {
        self.build().spawn().map_err(|e| ToolError::Spawn {
            program: self.label.clone(),
            not_found: e.kind() == io::ErrorKind::NotFound,
            reason: e.to_string(),
        })
    }

    /// Run to completion, streaming output into `ctx`, honouring the timeout
    /// and the cancel flag.
    pub fn run(&self, ctx: &TaskContext) -> Result<ToolOutput, ToolError> {
        if ctx.is_cancelled() {
            return Err(ToolError::Cancelled);
        }

        let mut child = self.spawn()?;
        ctx.set_active_pid(Some(child.id()));

        let feeder = self.stdin_file.clone().map(|path| {
            let stdin = child.stdin.take();
            thread::spawn(move || -> io::Result<()> {
                let mut source = File::open(path)?;
                if let Some(mut sink) = stdin {
                    io::copy(&mut source, &mut sink)?;
                }
                Ok(())
            })
        });

        let (tx, rx) = mpsc::channel::<String>();
        if let Some(out) = child.stdout.take() {
            spawn_line_reader(out, tx.clone());
        }
        if let Some(err) = child.stderr.take() {
            spawn_line_reader(err, tx.clone());
        }
        drop(tx);

        let mut tail: VecDeque<String> = VecDeque::new();
        let started = Instant::now();
        let mut readers_done = false;

        let outcome = loop {
            while let Ok(line) = rx.try_recv() {
                self.handle_line(ctx, line, &mut tail);
            }

            match child.try_wait() {
                Ok(Some(status)) => break Ok(status),
                Ok(None) => {}
                Err(e) => {
                    break Err(ToolError::Io {
                        label: self.label.clone(),
                        reason: e.to_string(),
                    })
                }
            }

            if ctx.is_cancelled() {
                ctx.log(format!("Stopping {}...", self.label));
                terminate_child(&mut child);
                break Err(ToolError::Cancelled);
            }

            if let Some(limit) = self.timeout {
                if started.elapsed() >= limit {
                    ctx.log(format!(
                        "{} exceeded {} seconds, terminating",
                        self.label,
                        limit.as_secs()
                    ));
                    terminate_child(&mut child);
                    break Err(ToolError::TimedOut {
                        label: self.label.clone(),
                        secs: limit.as_secs(),
                    });
                }
            }

            if readers_done {
                thread::sleep(POLL_INTERVAL);
            } else {
                match rx.recv_timeout(POLL_INTERVAL) {
                    Ok(line) => self.handle_line(ctx, line, &mut tail),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => readers_done = true,
                }
            }
        };

        ctx.set_active_pid(None);

        // Grandchildren can keep the pipes open; don't wait on them forever
        while let Ok(line) = rx.recv_timeout(Duration::from_millis(500)) {
            self.handle_line(ctx, line, &mut tail);
        }

        if let Some(handle) = feeder {
            match handle.join() {
                Ok(Err(e)) if outcome.is_ok() => {
                    return Err(ToolError::Io {
                        label: format!("{} (stdin)", self.label),
                        reason: e.to_string(),
                    });
                }
                _ => {}
            }
        }

        outcome.map(|status| ToolOutput {
            status,
            lines: tail.into_iter().collect(),
        })
    }

    fn handle_line(&self, ctx: &TaskContext, line: String, tail: &mut VecDeque<String>) {
        if self.echo {
            ctx.log(line.clone());
        }
        if let Some(observer) = &self.observer {
            observer(&line);
        }
        if tail.len() == OUTPUT_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    /// Start a long-lived child whose output is forwarded to `ctx` by a
    /// background reader until the process exits. The caller owns the child.
    pub fn spawn_streaming(&self, ctx: &TaskContext) -> Result<Child, ToolError> {
        let mut child = self.spawn()?;

        let (tx, rx) = mpsc::channel::<String>();
        if let Some(out) = child.stdout.take() {
            spawn_line_reader(out, tx.clone());
        }
        if let Some(err) = child.stderr.take() {
            spawn_line_reader(err, tx);
        }

        let ctx = ctx.clone();
        let label = self.label.clone();
        let observer = self.observer.clone();
        thread::spawn(move || {
            for line in rx {
                if let Some(observer) = &observer {
                    observer(&line);
                }
                ctx.log(line);
            }
            ctx.log(format!("{} output closed", label));
        });

        Ok(child)
    }
}

fn spawn_line_reader<R: Read + Send + 'static>(reader: R, tx: Sender<String>) {
    thread::spawn(move || {
        let _ = split_lines(BufReader::new(reader), |line| {
            let _ = tx.send(line);
        });
    });
}

/// Split a byte stream on `\n` and `\r` (git and MSBuild redraw progress with
/// bare carriage returns), emitting non-empty lines.
pub fn split_lines<R: Read>(mut reader: R, mut emit: impl FnMut(String)) -> io::Result<()> {
    let mut buf = [0u8; 8192];
    let mut pending: Vec<u8> = Vec::new();

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        for &byte in &buf[..n] {
            if byte == b'\n' || byte == b'\r' {
                flush_pending(&mut pending, &mut emit);
            } else {
                pending.push(byte);
            }
        }
    }
    flush_pending(&mut pending, &mut emit);
    Ok(())
}

fn flush_pending(pending: &mut Vec<u8>, emit: &mut impl FnMut(String)) {
    if pending.is_empty() {
        return;
    }
    let line = String::from_utf8_lossy(pending).trim_end().to_string();
    pending.clear();
    if !line.is_empty() {
        emit(line);
    }
}

// ============================================================================
// Termination helpers
// ============================================================================

/// Ask the process tree rooted at `pid` to exit.
fn request_graceful_stop(pid: u32) {
    let result = if cfg!(windows) {
        Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T"])
            .output()
    } else {
        Command::new("kill").args(["-TERM", &pid.to_string()]).output()
    };
    if let Err(e) = result {
        log_warning(&format!("Graceful stop of PID {} failed: {}", pid, e));
    }
}

/// Graceful terminate, then a forced kill once `GRACE_PERIOD` has passed.
pub fn terminate_child(child: &mut Child) {
    request_graceful_stop(child.id());
    if let Ok(Some(_)) = child.wait_timeout(GRACE_PERIOD) {
        return;
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// Force-kill every process with the given image name (e.g. `MSBuild.exe`).
pub fn kill_processes_by_name(image: &str, force: bool) -> bool {
    let output = if cfg!(windows) {
        let mut cmd = Command::new("taskkill");
        if force {
            cmd.arg("/F");
        }
        cmd.args(["/IM", image, "/T"]).output()
    } else {
        let name = image.trim_end_matches(".exe");
        let signal = if force { "-KILL" } else { "-TERM" };
        Command::new("pkill").args([signal, "-x", name]).output()
    };
    output.map(|o| o.status.success()).unwrap_or(false)
}

/// Whether any process with the given image name is running.
pub fn is_process_running(image: &str) -> bool {
    if cfg!(windows) {
        Command::new("tasklist")
            .args(["/FI", &format!("IMAGENAME eq {}", image), "/NH"])
            .output()
            .map(|o| {
                String::from_utf8_lossy(&o.stdout)
                    .to_lowercase()
                    .contains(&image.to_lowercase())
            })
            .unwrap_or(false)
    } else {
        Command::new("pgrep")
            .args(["-x", image.trim_end_matches(".exe")])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

// ============================================================================
// Shell helpers
// ============================================================================

/// A command that runs `command_line` through the platform shell.
pub fn shell_command(command_line: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command_line]);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command_line]);
        cmd
    }
}

/// Run a shell command and return its trimmed stdout, or `None` on any
/// failure or if it does not finish within `timeout`.
pub fn run_shell_capture(command_line: &str, timeout: Duration) -> Option<String> {
    let mut child = shell_command(command_line)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .ok()?;

    let mut stdout = child.stdout.take()?;
    let reader = thread::spawn(move || {
        let mut out = String::new();
        let _ = stdout.read_to_string(&mut out);
        out
    });

    match child.wait_timeout(timeout) {
        Ok(Some(status)) if status.success() => {
            let out = reader.join().ok()?;
            let trimmed = out.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Ok(Some(_)) => None,
        _ => {
            let _ = child.kill();
            let _ = child.wait();
            None
        }
    }
}
