//! Persistent environment variables
//!
//! Values are written through .NET's `Environment.SetEnvironmentVariable`,
//! which also broadcasts `WM_SETTINGCHANGE` so new shells see them. The
//! machine hive is tried first; without admin rights the user hive is used.

use std::time::Duration;

use crate::logging::{log_install, log_warning};
use crate::process::ToolCommand;
use crate::task::{TaskContext, TaskError, TaskResult};

const POWERSHELL_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvScope {
    Machine,
    User,
}

impl EnvScope {
    fn as_str(self) -> &'static str {
        match self {
            EnvScope::Machine => "Machine",
            EnvScope::User => "User",
        }
    }
}

/// Quote for a single-quoted PowerShell string literal.
fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn powershell(script: String, label: &str) -> ToolCommand {
    ToolCommand::new("powershell")
        .args(["-NoProfile", "-NonInteractive", "-Command"])
        .arg(script)
        .label(label)
        .timeout(POWERSHELL_TIMEOUT)
        .quiet()
}

fn set_in_scope(ctx: &TaskContext, name: &str, value: &str, scope: EnvScope) -> TaskResult<()> {
    let script = format!(
        "[Environment]::SetEnvironmentVariable({}, {}, {})",
        ps_quote(name),
        ps_quote(value),
        ps_quote(scope.as_str())
    );
    powershell(script, "SetEnvironmentVariable")
        .run(ctx)?
        .into_result(&format!("Setting {} ({})", name, scope.as_str()))?;
    Ok(())
}

fn get_in_scope(ctx: &TaskContext, name: &str, scope: EnvScope) -> Option<String> {
    let script = format!(
        "[Environment]::GetEnvironmentVariable({}, {})",
        ps_quote(name),
        ps_quote(scope.as_str())
    );
    let output = powershell(script, "GetEnvironmentVariable").run(ctx).ok()?;
    if !output.success() {
        return None;
    }
    Some(output.lines.join(""))
}

/// Persist `name=value` (machine hive, falling back to the user hive) and
/// mirror it into the current process.
pub fn set_persistent_var(ctx: &TaskContext, name: &str, value: &str) -> TaskResult<EnvScope> {
    let scope = match set_in_scope(ctx, name, value, EnvScope::Machine) {
        Ok(()) => EnvScope::Machine,
        Err(TaskError::Cancelled) => return Err(TaskError::Cancelled),
        Err(e) => {
            log_warning(&format!("System-wide {} not writable ({}), using user scope", name, e));
            set_in_scope(ctx, name, value, EnvScope::User)?;
            EnvScope::User
        }
    };

    std::env::set_var(name, value);
    log_install(&format!("Set {}={} ({})", name, value, scope.as_str()));
    Ok(scope)
}

/// Append `dir` to the persistent PATH unless it is already listed.
pub fn append_to_path(ctx: &TaskContext, dir: &str) -> TaskResult<bool> {
    let mut changed = false;
    let mut last_err = None;

    for scope in [EnvScope::Machine, EnvScope::User] {
        let current = get_in_scope(ctx, "Path", scope).unwrap_or_default();
        let Some(updated) = path_with_entry(&current, dir, ';') else {
            log_install(&format!("{} already on PATH ({})", dir, scope.as_str()));
            break;
        };
        match set_in_scope(ctx, "Path", &updated, scope) {
            Ok(()) => {
                log_install(&format!("Added {} to PATH ({})", dir, scope.as_str()));
                changed = true;
                break;
            }
            Err(TaskError::Cancelled) => return Err(TaskError::Cancelled),
            Err(e) => last_err = Some(e),
        }
    }

    if !changed {
        if let Some(e) = last_err {
            return Err(e);
        }
    }

    // Keep this process in step so later scans see the new entry
    let process_path = std::env::var("PATH").unwrap_or_default();
    let separator = if cfg!(windows) { ';' } else { ':' };
    if let Some(updated) = path_with_entry(&process_path, dir, separator) {
        std::env::set_var("PATH", updated);
    }
    Ok(changed)
}

/// `current` with `entry` appended, or `None` if it is already present.
/// Comparison ignores case and trailing separators.
pub fn path_with_entry(current: &str, entry: &str, separator: char) -> Option<String> {
    let normalize = |s: &str| s.trim().trim_end_matches(['\\', '/']).to_lowercase();
    let wanted = normalize(entry);
    if wanted.is_empty() {
        return None;
    }
    if current.split(separator).any(|p| normalize(p) == wanted) {
        return None;
    }

    let trimmed = current.trim_end_matches(separator);
    if trimmed.is_empty() {
        Some(entry.to_string())
    } else {
        Some(format!("{}{}{}", trimmed, separator, entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_entry_is_appended_once() {
        let current = "C:\\Windows;C:\\MySQL\\bin\\";

        assert_eq!(path_with_entry(current, "c:\\mysql\\bin", ';'), None);
        assert_eq!(
            path_with_entry(current, "C:\\Tools\\HeidiSQL", ';').as_deref(),
            Some("C:\\Windows;C:\\MySQL\\bin\\;C:\\Tools\\HeidiSQL")
        );
        assert_eq!(path_with_entry("", "C:\\x", ';').as_deref(), Some("C:\\x"));
        assert_eq!(path_with_entry("/usr/bin:/bin", "/opt/acb", ':').as_deref(), Some("/usr/bin:/bin:/opt/acb"));
    }

    #[test]
    fn powershell_literals_escape_quotes() {
        assert_eq!(ps_quote("O'Brien"), "'O''Brien'");
    }
}
