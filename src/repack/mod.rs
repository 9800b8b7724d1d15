//! Repack Assembler
//!
//! Builds the self-contained `Repack/` folder: server binaries and configs
//! from the build output, a portable MySQL copy, runtime DLLs, client data
//! and helper scripts.

pub mod configs;
pub mod launch;
pub mod runtime;

use std::fs;
use std::path::Path;

use crate::logging::{log_action, log_warning};
use crate::paths::Workspace;
use crate::task::{check_cancelled, TaskContext, TaskError, TaskResult};
use crate::utils::copy_dir_all;

pub use configs::{
    config_paths, create_configs, set_autoupdater, ConfigPathReport, ConfigPathValues,
    ConfigReport,
};
pub use launch::{launch_server, ServerKind};
pub use runtime::{
    create_dlls, create_mysql, download_client_data, write_launch_scripts, write_my_ini,
    DllReport,
};

/// What `create_repack` copies out of `Build/bin/RelWithDebInfo`.
pub const REPACK_ITEMS: &[&str] = &["authserver.exe", "worldserver.exe", "configs", "lua_scripts"];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RepackReport {
    pub copied: Vec<String>,
    pub missing: Vec<String>,
}

impl RepackReport {
    pub fn summary(&self) -> String {
        let mut text = format!("Copied: {}", self.copied.join(", "));
        if !self.missing.is_empty() {
            text.push_str(&format!("\nMissing from build output: {}", self.missing.join(", ")));
        }
        text
    }
}

/// The Repack folder, or a precondition error if it has not been created.
pub fn require_repack(workspace: &Workspace) -> TaskResult<std::path::PathBuf> {
    let repack = workspace.repack_dir();
    if repack.is_dir() {
        Ok(repack)
    } else {
        Err(TaskError::precondition(format!(
            "{} (run Create Repack first)",
            repack.display()
        )))
    }
}

fn copy_item(src: &Path, dst: &Path) -> std::io::Result<()> {
    if src.is_dir() {
        copy_dir_all(src, dst).map(|_| ())
    } else {
        fs::copy(src, dst).map(|_| ())
    }
}

/// Copy the server binaries, configs and Lua scripts into `Repack/`.
///
/// Missing items are reported, not fatal, as long as one item was copied.
pub fn create_repack(workspace: &Workspace, ctx: &TaskContext) -> TaskResult<RepackReport> {
    let output = workspace.build_output_dir();
    if !output.is_dir() {
        return Err(TaskError::precondition(format!(
            "build output {} (build the server first)",
            output.display()
        )));
    }

    let repack = workspace.repack_dir();
    fs::create_dir_all(&repack)
        .map_err(|e| TaskError::io(format!("Creating {}", repack.display()), e))?;
    ctx.set_status("Assembling Repack...");

    let mut report = RepackReport::default();
    for (i, item) in REPACK_ITEMS.iter().enumerate() {
        check_cancelled(ctx)?;
        let src = output.join(item);
        if !src.exists() {
            log_warning(&format!("{} not found in build output", item));
            report.missing.push(item.to_string());
            continue;
        }
        copy_item(&src, &repack.join(item))
            .map_err(|e| TaskError::io(format!("Copying {}", item), e))?;
        report.copied.push(item.to_string());
        ctx.set_progress((i + 1) as f32 / REPACK_ITEMS.len() as f32);
    }

    if report.copied.is_empty() {
        return Err(TaskError::precondition(format!(
            "any of {} in {}",
            REPACK_ITEMS.join(", "),
            output.display()
        )));
    }

    log_action(&format!("Repack assembled in {}", repack.display()));
    ctx.set_status(report.summary());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_build_output_is_a_precondition() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        let err = create_repack(&ws, &TaskContext::headless(true)).unwrap_err();
        assert!(matches!(err, TaskError::Precondition { .. }));
        assert!(!ws.repack_dir().exists());
    }

    #[test]
    fn empty_build_output_copies_nothing_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        fs::create_dir_all(ws.build_output_dir()).unwrap();
        assert!(create_repack(&ws, &TaskContext::headless(true)).is_err());
    }

    #[test]
    fn require_repack_checks_folder() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        assert!(require_repack(&ws).is_err());
        fs::create_dir_all(ws.repack_dir()).unwrap();
        assert_eq!(require_repack(&ws).unwrap(), ws.repack_dir());
    }
}
