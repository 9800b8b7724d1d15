//! The bundled `mysqld`: initialize, start, stop

use std::fs;
use std::process::Child;
use std::thread;
use std::time::{Duration, Instant};

use super::MySqlPaths;
use crate::logging::{log_database, log_warning};
use crate::process::{is_process_running, kill_processes_by_name, ToolCommand};
use crate::source::clean_path;
use crate::task::{check_cancelled, TaskContext, TaskError, TaskResult};

pub const INITIALIZE_TIMEOUT: Duration = Duration::from_secs(300);
pub const STOP_WAIT: Duration = Duration::from_secs(10);
pub const MYSQLD_IMAGE: &str = "mysqld.exe";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    NotRunning,
    Graceful,
    Forced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerStatus {
    /// The server this session started is alive
    pub tracked: bool,
    /// Some `mysqld.exe` is running on the machine
    pub any: bool,
}

/// Owns the `mysqld` child started by this session.
pub struct MySqlServer {
    paths: MySqlPaths,
    child: Option<Child>,
}

impl MySqlServer {
    pub fn new(paths: MySqlPaths) -> Self {
        Self { paths, child: None }
    }

    pub fn paths(&self) -> &MySqlPaths {
        &self.paths
    }

    fn require_mysqld(&self) -> TaskResult<()> {
        if self.paths.mysqld().is_file() {
            Ok(())
        } else {
            Err(TaskError::precondition(format!(
                "{} (run Create MySQL first)",
                self.paths.mysqld().display()
            )))
        }
    }

    /// Whether the tracked child is still alive; reaps it if it exited.
    fn tracked_alive(&mut self) -> bool {
        match self.child.as_mut().map(|c| c.try_wait()) {
            Some(Ok(None)) => true,
            Some(_) => {
                self.child = None;
                false
            }
            None => false,
        }
    }

    /// Create an empty data directory with `mysqld --initialize-insecure`.
    pub fn initialize(&mut self, ctx: &TaskContext) -> TaskResult<()> {
        self.require_mysqld()?;
        if self.tracked_alive() {
            return Err(TaskError::other("Initialize MySQL", "stop the running server first"));
        }

        let data = self.paths.data_dir();
        let has_content = fs::read_dir(&data)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false);
        if has_content {
            ctx.require_confirmation(&format!(
                "{} already contains databases. Wipe it and initialize again?",
                data.display()
            ))?;
            clean_path(&data, ctx)?;
        }

        for dir in [data.clone(), self.paths.tmp_dir(), self.paths.logs_dir()] {
            fs::create_dir_all(&dir)
                .map_err(|e| TaskError::io(format!("Creating {}", dir.display()), e))?;
        }

        check_cancelled(ctx)?;
        ctx.set_status("Initializing MySQL data directory...");
        ctx.set_indeterminate();
        ToolCommand::new(self.paths.mysqld())
            .arg("--initialize-insecure")
            .arg(format!("--basedir={}", self.paths.root().display()))
            .arg(format!("--datadir={}", data.display()))
            .arg("--console")
            .envs(self.paths.environment())
            .label("mysqld --initialize-insecure")
            .timeout(INITIALIZE_TIMEOUT)
            .run(ctx)?
            .into_result("mysqld --initialize-insecure")?;

        ctx.set_progress(1.0);
        log_database(&format!("Initialized {}", data.display()));
        Ok(())
    }

    /// Start `mysqld --console --standalone`, streaming its output to the log.
    pub fn start(&mut self, ctx: &TaskContext) -> TaskResult<u32> {
        if self.tracked_alive() {
            return Err(TaskError::other("Start MySQL", "server is already running"));
        }
        self.require_mysqld()?;
        if !self.paths.data_dir().join("mysql").exists() {
            return Err(TaskError::precondition(format!(
                "an initialized data directory in {} (run Initialize MySQL first)",
                self.paths.data_dir().display()
            )));
        }

        let child = ToolCommand::new(self.paths.mysqld())
            .arg(format!("--basedir={}", self.paths.root().display()))
            .arg(format!("--datadir={}", self.paths.data_dir().display()))
            .args(["--console", "--standalone"])
            .envs(self.paths.environment())
            .label("mysqld")
            .spawn_streaming(ctx)?;
        let pid = child.id();
        self.child = Some(child);
        ctx.set_status(format!("MySQL started (PID {})", pid));
        log_database(&format!("mysqld started, PID {}", pid));
        Ok(pid)
    }

    /// Stop every `mysqld.exe` on the machine, not only ours.
    pub fn stop(&mut self, ctx: &TaskContext) -> TaskResult<StopOutcome> {
        let tracked = self.tracked_alive();
        if !tracked && !is_process_running(MYSQLD_IMAGE) {
            ctx.set_status("MySQL is not running");
            return Ok(StopOutcome::NotRunning);
        }

        ctx.set_status("Stopping MySQL...");
        kill_processes_by_name(MYSQLD_IMAGE, false);

        let deadline = Instant::now() + STOP_WAIT;
        while Instant::now() < deadline && is_process_running(MYSQLD_IMAGE) {
            thread::sleep(Duration::from_millis(500));
        }

        let outcome = if is_process_running(MYSQLD_IMAGE) {
            log_warning("mysqld did not exit in time, forcing");
            kill_processes_by_name(MYSQLD_IMAGE, true);
            StopOutcome::Forced
        } else {
            StopOutcome::Graceful
        };

        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        ctx.set_status("MySQL stopped");
        log_database(&format!("mysqld stopped ({:?})", outcome));
        Ok(outcome)
    }

    pub fn status(&mut self) -> ServerStatus {
        let tracked = self.tracked_alive();
        ServerStatus {
            tracked,
            any: tracked || is_process_running(MYSQLD_IMAGE),
        }
    }
}
