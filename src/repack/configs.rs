//! Server config files inside the Repack

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use walkdir::WalkDir;

use super::require_repack;
use crate::logging::{log_action, log_info, log_warning};
use crate::paths::Workspace;
use crate::task::{TaskError, TaskResult};

pub const SERVER_CONFIGS: &[&str] = &["worldserver.conf", "authserver.conf"];

static ENABLE_DATABASES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(Updates\.EnableDatabases\s*=\s*)\d+").expect("autoupdater pattern is a valid regex")
});

fn configs_dir(workspace: &Workspace) -> TaskResult<PathBuf> {
    let dir = require_repack(workspace)?.join("configs");
    if dir.is_dir() {
        Ok(dir)
    } else {
        Err(TaskError::precondition(format!(
            "{} (the build output had no configs folder)",
            dir.display()
        )))
    }
}

// ============================================================================
// .conf.dist -> .conf
// ============================================================================

#[derive(Debug, Default, Clone)]
pub struct ConfigReport {
    pub created: Vec<PathBuf>,
    /// `.conf` files that already existed and were left alone
    pub kept: usize,
}

/// Copy every `*.conf.dist` to its `*.conf` name unless that file exists.
pub fn create_configs(workspace: &Workspace) -> TaskResult<ConfigReport> {
    let dir = configs_dir(workspace)?;
    let mut report = ConfigReport::default();

    for entry in WalkDir::new(&dir).into_iter().flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };
        let Some(stem) = name.strip_suffix(".dist") else {
            continue;
        };
        if !stem.ends_with(".conf") || !entry.file_type().is_file() {
            continue;
        }

        let target = path.with_file_name(stem);
        if target.exists() {
            report.kept += 1;
            continue;
        }
        fs::copy(path, &target)
            .map_err(|e| TaskError::io(format!("Creating {}", target.display()), e))?;
        log_info(&format!("Created {}", target.display()));
        report.created.push(target);
    }

    log_action(&format!(
        "Config files: {} created, {} already present",
        report.created.len(),
        report.kept
    ));
    Ok(report)
}

// ============================================================================
// Path substitution
// ============================================================================

/// Values written over the stock defaults. `None` leaves a line untouched.
#[derive(Debug, Clone, Default)]
pub struct ConfigPathValues {
    pub data_dir: Option<String>,
    pub logs_dir: Option<String>,
    pub mysql_executable: Option<String>,
}

impl ConfigPathValues {
    fn substitutions(&self) -> Vec<(&'static str, String)> {
        let mut subs = Vec::new();
        if let Some(v) = &self.data_dir {
            subs.push((r#"DataDir = ".""#, format!(r#"DataDir = "{}""#, v)));
        }
        if let Some(v) = &self.logs_dir {
            subs.push((r#"LogsDir = """#, format!(r#"LogsDir = "{}""#, v)));
        }
        if let Some(v) = &self.mysql_executable {
            subs.push((r#"MySQLExecutable = """#, format!(r#"MySQLExecutable = "{}""#, v)));
        }
        subs
    }
}

/// Replace the stock default lines; returns the new text and how many
/// occurrences were replaced.
pub fn apply_path_substitutions(text: &str, values: &ConfigPathValues) -> (String, usize) {
    let mut out = text.to_string();
    let mut count = 0;
    for (default, replacement) in values.substitutions() {
        let hits = out.matches(default).count();
        if hits > 0 {
            out = out.replace(default, &replacement);
            count += hits;
        }
    }
    (out, count)
}

#[derive(Debug, Default, Clone)]
pub struct ConfigPathReport {
    /// (file name, substitutions applied); files not present are omitted
    pub files: Vec<(String, usize)>,
}

impl ConfigPathReport {
    pub fn total(&self) -> usize {
        self.files.iter().map(|(_, n)| n).sum()
    }

    pub fn count_for(&self, file: &str) -> Option<usize> {
        self.files.iter().find(|(f, _)| f == file).map(|(_, n)| *n)
    }
}

fn rewrite(path: &Path, edit: impl Fn(&str) -> (String, usize)) -> TaskResult<usize> {
    let text = fs::read_to_string(path)
        .map_err(|e| TaskError::io(format!("Reading {}", path.display()), e))?;
    let (updated, count) = edit(&text);
    if count > 0 {
        fs::write(path, updated)
            .map_err(|e| TaskError::io(format!("Writing {}", path.display()), e))?;
    }
    Ok(count)
}

/// Point `DataDir`, `LogsDir` and `MySQLExecutable` in both server configs
/// at user-supplied values.
pub fn config_paths(workspace: &Workspace, values: &ConfigPathValues) -> TaskResult<ConfigPathReport> {
    let dir = configs_dir(workspace)?;
    let mut report = ConfigPathReport::default();

    for file in SERVER_CONFIGS {
        let path = dir.join(file);
        if !path.exists() {
            log_warning(&format!("{} not found; run Create Configs first", path.display()));
            continue;
        }
        let count = rewrite(&path, |text| apply_path_substitutions(text, values))?;
        log_info(&format!("{}: {} path(s) updated", file, count));
        report.files.push((file.to_string(), count));
    }

    if report.total() == 0 {
        log_warning("No default path lines found; configs were already customised");
    }
    Ok(report)
}

// ============================================================================
// Autoupdater
// ============================================================================

/// Value of `Updates.EnableDatabases` for each toggle state.
pub fn autoupdater_value(enabled: bool) -> u8 {
    if enabled {
        7
    } else {
        0
    }
}

pub fn toggle_autoupdater(text: &str, enabled: bool) -> (String, usize) {
    let re = &*ENABLE_DATABASES;
    let count = re.find_iter(text).count();
    let replacement = format!("${{1}}{}", autoupdater_value(enabled));
    (re.replace_all(text, replacement.as_str()).into_owned(), count)
}

/// Toggle the database autoupdater in `worldserver.conf`.
pub fn set_autoupdater(workspace: &Workspace, enabled: bool) -> TaskResult<usize> {
    let path = configs_dir(workspace)?.join("worldserver.conf");
    if !path.exists() {
        return Err(TaskError::precondition(format!(
            "{} (run Create Configs first)",
            path.display()
        )));
    }
    let count = rewrite(&path, |text| toggle_autoupdater(text, enabled))?;
    log_action(&format!(
        "Autoupdater {} ({} line(s))",
        if enabled { "enabled" } else { "disabled" },
        count
    ));
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitution_counts_each_default_line() {
        let text = "DataDir = \".\"\nLogsDir = \"\"\nMySQLExecutable = \"\"\nOther = 1\n";
        let values = ConfigPathValues {
            data_dir: Some("data".into()),
            logs_dir: Some("logs".into()),
            mysql_executable: Some("mysql/bin/mysql.exe".into()),
        };
        let (out, n) = apply_path_substitutions(text, &values);
        assert_eq!(n, 3);
        assert!(out.contains("DataDir = \"data\""));
        assert!(!out.contains("LogsDir = \"\""));

        let (_, again) = apply_path_substitutions(&out, &values);
        assert_eq!(again, 0);
    }

    #[test]
    fn unset_values_are_left_alone() {
        let text = "DataDir = \".\"\nLogsDir = \"\"\n";
        let values = ConfigPathValues {
            logs_dir: Some("logs".into()),
            ..Default::default()
        };
        let (out, n) = apply_path_substitutions(text, &values);
        assert_eq!(n, 1);
        assert!(out.contains("DataDir = \".\""));
    }

    #[test]
    fn autoupdater_toggle_rewrites_any_digits() {
        let text = "Updates.EnableDatabases = 7\nUpdates.AutoSetup = 1\n";
        let (off, n) = toggle_autoupdater(text, false);
        assert_eq!(n, 1);
        assert!(off.contains("Updates.EnableDatabases = 0"));
        assert!(off.contains("Updates.AutoSetup = 1"));

        let (on, _) = toggle_autoupdater(&off, true);
        assert!(on.contains("Updates.EnableDatabases = 7"));
    }
}
