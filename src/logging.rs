//! ACB Logging System
//!
//! Process-wide console/log sink. Every line is written to the session log
//! file, echoed to stdout, and handed to any registered sink (an on-screen
//! console, for example).

use chrono::Local;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, OnceLock};

static LOGGER: OnceLock<Arc<Mutex<AcbLogger>>> = OnceLock::new();

/// Number of session logs kept in the logs folder.
pub const MAX_LOG_FILES: usize = 50;

pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

// ============================================================================
// System Information Detection
// ============================================================================

#[derive(Debug, Clone)]
pub struct SystemInfo {
    pub app_version: String,
    pub os: String,
    pub computer_name: String,
    pub cpu: String,
    pub cpu_cores: String,
    pub memory_gb: String,
}

impl SystemInfo {
    pub fn detect() -> Self {
        Self {
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            os: detect_os(),
            computer_name: env_or_unknown("COMPUTERNAME"),
            cpu: env_or_unknown("PROCESSOR_IDENTIFIER"),
            cpu_cores: env_or_unknown("NUMBER_OF_PROCESSORS"),
            memory_gb: detect_memory(),
        }
    }

    pub fn to_log_header(&self) -> String {
        format!(
r#"================================================================================
AzerothCore Builder Log - {}
================================================================================
Application:   ACB v{}
System Info:
  OS:          {}
  Computer:    {}
  CPU:         {}
  Cores:       {}
  Memory:      {}
================================================================================
"#,
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            self.app_version,
            self.os,
            self.computer_name,
            self.cpu,
            self.cpu_cores,
            self.memory_gb,
        )
    }
}

fn env_or_unknown(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| "Unknown".to_string())
}

fn detect_os() -> String {
    if let Ok(output) = Command::new("cmd").args(["/C", "ver"]).output() {
        if output.status.success() {
            let out = String::from_utf8_lossy(&output.stdout);
            let line = out.trim();
            if !line.is_empty() {
                return line.to_string();
            }
        }
    }
    std::env::consts::OS.to_string()
}

fn detect_memory() -> String {
    // "TotalPhysicalMemory\r\n17041592320\r\n"
    if let Ok(output) = Command::new("wmic")
        .args(["ComputerSystem", "get", "TotalPhysicalMemory"])
        .output()
    {
        if output.status.success() {
            let out = String::from_utf8_lossy(&output.stdout);
            for line in out.lines().skip(1) {
                if let Ok(bytes) = line.trim().parse::<u64>() {
                    return format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0));
                }
            }
        }
    }
    "Unknown".to_string()
}

// ============================================================================
// Log Levels
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogLevel {
    Info,
    Action, // User actions (commands, confirmations)
    Download,
    Install,
    Build,
    Database,
    Warning,
    Error,
}

impl LogLevel {
    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Info => "[INFO]",
            LogLevel::Action => "[ACTION]",
            LogLevel::Download => "[DOWNLOAD]",
            LogLevel::Install => "[INSTALL]",
            LogLevel::Build => "[BUILD]",
            LogLevel::Database => "[DATABASE]",
            LogLevel::Warning => "[WARNING]",
            LogLevel::Error => "[ERROR]",
        }
    }
}

// ============================================================================
// ACB Logger
// ============================================================================

pub struct AcbLogger {
    log_file: Option<File>,
    log_path: Option<PathBuf>,
    sinks: Vec<LogSink>,
}

impl AcbLogger {
    pub fn new() -> Self {
        Self::in_dir(&acb_path!("logs"))
    }

    /// Open a fresh session log in `log_dir`, pruning old sessions first.
    pub fn in_dir(log_dir: &Path) -> Self {
        let _ = fs::create_dir_all(log_dir);
        prune_old_logs(log_dir, MAX_LOG_FILES.saturating_sub(1));

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let log_path = log_dir.join(format!("acb_{}.log", timestamp));

        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .ok();

        let mut logger = Self {
            log_path: log_file.as_ref().map(|_| log_path),
            log_file,
            sinks: Vec::new(),
        };

        let header = SystemInfo::detect().to_log_header();
        logger.write_raw(&header);

        logger
    }

    fn write_raw(&mut self, msg: &str) {
        if let Some(ref mut file) = self.log_file {
            let _ = writeln!(file, "{}", msg);
            let _ = file.flush();
        }

        println!("{}", msg);

        for sink in &self.sinks {
            sink(msg);
        }
    }

    pub fn log(&mut self, level: LogLevel, message: &str) {
        let timestamp = Local::now().format("%H:%M:%S");
        let formatted = format!("[{}] {} {}", timestamp, level.prefix(), message);
        self.write_raw(&formatted);
    }

    pub fn add_sink(&mut self, sink: LogSink) {
        self.sinks.push(sink);
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }
}

impl Default for AcbLogger {
    fn default() -> Self {
        Self::new()
    }
}

/// Delete the oldest `acb_*.log` files so at most `keep` remain.
pub fn prune_old_logs(log_dir: &Path, keep: usize) -> usize {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return 0;
    };

    let mut logs: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("acb_") && n.ends_with(".log"))
        })
        .collect();

    if logs.len() <= keep {
        return 0;
    }

    // Timestamped names sort chronologically
    logs.sort();
    let excess = logs.len() - keep;
    logs.iter()
        .take(excess)
        .filter(|p| fs::remove_file(p).is_ok())
        .count()
}

// ============================================================================
// Global Logger Access
// ============================================================================

/// Initialize the global logger (call once at startup)
pub fn init_logger() {
    LOGGER.get_or_init(|| Arc::new(Mutex::new(AcbLogger::new())));
}

fn logger() -> Arc<Mutex<AcbLogger>> {
    LOGGER
        .get_or_init(|| Arc::new(Mutex::new(AcbLogger::new())))
        .clone()
}

/// Mirror every future log line into `sink` (the on-screen console).
pub fn add_log_sink(sink: LogSink) {
    logger().lock().add_sink(sink);
}

pub fn current_log_path() -> Option<PathBuf> {
    logger().lock().log_path().map(Path::to_path_buf)
}

// ============================================================================
// Convenience Logging Functions
// ============================================================================

pub fn log_info(message: &str) {
    logger().lock().log(LogLevel::Info, message);
}

pub fn log_action(message: &str) {
    logger().lock().log(LogLevel::Action, message);
}

pub fn log_download(message: &str) {
    logger().lock().log(LogLevel::Download, message);
}

pub fn log_install(message: &str) {
    logger().lock().log(LogLevel::Install, message);
}

pub fn log_build(message: &str) {
    logger().lock().log(LogLevel::Build, message);
}

pub fn log_database(message: &str) {
    logger().lock().log(LogLevel::Database, message);
}

pub fn log_warning(message: &str) {
    logger().lock().log(LogLevel::Warning, message);
}

pub fn log_error(message: &str) {
    logger().lock().log(LogLevel::Error, message);
}
