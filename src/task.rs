//! Job context shared by every long-running operation
//!
//! A `TaskContext` is created per operation and handed down the call chain.
//! It carries the callbacks a front end uses to receive status, log and
//! progress updates (they are the only way an operation talks to a UI), the
//! cooperative cancel flag, and the PID of whatever child process the
//! operation is currently waiting on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::logging::{log_action, log_info};

// ============================================================================
// Errors
// ============================================================================

/// Error type for every orchestration operation
#[derive(Debug)]
pub enum TaskError {
    /// User cancelled the operation
    Cancelled,
    /// User answered "no" to a confirmation prompt
    Declined { action: String },
    /// A required input (source clone, build output, Repack folder...) is missing
    Precondition { what: String },
    /// A required external tool could not be located
    MissingTool { name: String },
    /// An external tool ran but reported failure
    ToolFailed { label: String, code: Option<i32>, detail: String },
    /// An external tool did not finish in time and was terminated
    TimedOut { label: String, secs: u64 },
    /// Every download URL failed
    Download { attempted: Vec<String>, reason: String },
    /// Filesystem error with context
    Io { context: String, reason: String },
    /// Generic error with context
    Other { context: String, reason: String },
}

impl TaskError {
    pub fn precondition(what: impl Into<String>) -> Self {
        TaskError::Precondition { what: what.into() }
    }

    pub fn io(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        TaskError::Io {
            context: context.into(),
            reason: err.to_string(),
        }
    }

    pub fn other(context: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        TaskError::Other {
            context: context.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskError::Cancelled => write!(f, "Operation cancelled by user"),
            TaskError::Declined { action } => write!(f, "Not confirmed: {}", action),
            TaskError::Precondition { what } => write!(f, "Missing prerequisite: {}", what),
            TaskError::MissingTool { name } => {
                write!(f, "{} was not found. Scan or install dependencies first.", name)
            }
            TaskError::ToolFailed { label, code, detail } => {
                write!(f, "{} failed (exit code {:?})", label, code)?;
                if !detail.is_empty() {
                    write!(f, ":\n{}", detail)?;
                }
                Ok(())
            }
            TaskError::TimedOut { label, secs } => {
                write!(f, "{} timed out after {} seconds", label, secs)
            }
            TaskError::Download { attempted, reason } => {
                write!(f, "Download failed: {}. URLs tried:", reason)?;
                for url in attempted {
                    write!(f, "\n  - {}", url)?;
                }
                Ok(())
            }
            TaskError::Io { context, reason } => write!(f, "{}: {}", context, reason),
            TaskError::Other { context, reason } => write!(f, "{}: {}", context, reason),
        }
    }
}

impl std::error::Error for TaskError {}

impl From<std::io::Error> for TaskError {
    fn from(e: std::io::Error) -> Self {
        TaskError::io("I/O error", e)
    }
}

pub type TaskResult<T> = Result<T, TaskError>;

// ============================================================================
// Task Context
// ============================================================================

/// Context for background tasks
#[derive(Clone)]
pub struct TaskContext {
    pub status_callback: Arc<dyn Fn(String) + Send + Sync>,
    pub log_callback: Arc<dyn Fn(String) + Send + Sync>,
    /// `None` means "busy, amount unknown"
    pub progress_callback: Arc<dyn Fn(Option<f32>) + Send + Sync>,
    pub confirm_callback: Arc<dyn Fn(&str) -> bool + Send + Sync>,
    pub cancel_flag: Arc<AtomicBool>,
    active_pid: Arc<Mutex<Option<u32>>>,
}

impl TaskContext {
    pub fn new(
        status: impl Fn(String) + Send + Sync + 'static,
        log: impl Fn(String) + Send + Sync + 'static,
        progress: impl Fn(Option<f32>) + Send + Sync + 'static,
        confirm: impl Fn(&str) -> bool + Send + Sync + 'static,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            status_callback: Arc::new(status),
            log_callback: Arc::new(log),
            progress_callback: Arc::new(progress),
            confirm_callback: Arc::new(confirm),
            cancel_flag: cancel,
            active_pid: Arc::new(Mutex::new(None)),
        }
    }

    /// Context that only writes to the global logger and auto-answers
    /// confirmations with `assume_yes`.
    pub fn headless(assume_yes: bool) -> Self {
        Self::new(
            |msg| log_info(&msg),
            |_| {},
            |_| {},
            move |question| {
                log_action(&format!("{} -> {}", question, if assume_yes { "yes" } else { "no" }));
                assume_yes
            },
            Arc::new(AtomicBool::new(false)),
        )
    }

    pub fn set_status(&self, msg: impl Into<String>) {
        (self.status_callback)(msg.into());
    }

    pub fn log(&self, msg: impl Into<String>) {
        (self.log_callback)(msg.into());
    }

    pub fn set_progress(&self, p: f32) {
        (self.progress_callback)(Some(p.clamp(0.0, 1.0)));
    }

    pub fn set_indeterminate(&self) {
        (self.progress_callback)(None);
    }

    pub fn confirm(&self, question: &str) -> bool {
        (self.confirm_callback)(question)
    }

    /// Ask for confirmation, mapping "no" to `TaskError::Declined`.
    pub fn require_confirmation(&self, question: &str) -> TaskResult<()> {
        if self.confirm(question) {
            Ok(())
        } else {
            Err(TaskError::Declined {
                action: question.to_string(),
            })
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
    }

    pub fn set_active_pid(&self, pid: Option<u32>) {
        *self.active_pid.lock() = pid;
    }

    /// PID of the child process the operation is currently waiting on.
    pub fn active_pid(&self) -> Option<u32> {
        *self.active_pid.lock()
    }
}

/// Check if the task has been cancelled and return an error if so.
#[inline]
pub fn check_cancelled(ctx: &TaskContext) -> TaskResult<()> {
    if ctx.is_cancelled() {
        Err(TaskError::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let ctx = TaskContext::headless(true);
        let clone = ctx.clone();
        assert!(check_cancelled(&clone).is_ok());
        ctx.cancel();
        assert!(matches!(check_cancelled(&clone), Err(TaskError::Cancelled)));
    }

    #[test]
    fn declined_confirmation_is_an_error() {
        let ctx = TaskContext::headless(false);
        let err = ctx.require_confirmation("Delete Repack/mysql?").unwrap_err();
        assert!(matches!(err, TaskError::Declined { .. }));
    }

    #[test]
    fn download_error_lists_every_url() {
        let err = TaskError::Download {
            attempted: vec!["https://a/x.zip".into(), "https://b/x.zip".into()],
            reason: "HTTP 404".into(),
        };
        let text = err.to_string();
        assert!(text.contains("https://a/x.zip"));
        assert!(text.contains("https://b/x.zip"));
    }
}
