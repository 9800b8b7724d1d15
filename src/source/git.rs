//! Clone, update and clean operations on the workspace checkout

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::progress::CloneProgress;
use super::{is_git_checkout, SourceRepoSpec, SourceVariant};
use crate::config::AppConfig;
use crate::logging::{log_action, log_info, log_warning};
use crate::paths::Workspace;
use crate::process::ToolCommand;
use crate::task::{check_cancelled, TaskContext, TaskError, TaskResult};
use crate::utils::{clear_readonly, force_remove_dir};

pub const GIT_TIMEOUT: Duration = Duration::from_secs(300);

// ============================================================================
// Clone
// ============================================================================

/// Arguments for `git clone`, progress forced on so it can be parsed.
pub fn clone_args(url: &str, branch: Option<&str>, target: &Path) -> Vec<String> {
    let mut args = vec!["clone".to_string(), "--progress".to_string()];
    if let Some(branch) = branch {
        args.push(format!("--branch={}", branch));
    }
    args.push(url.to_string());
    args.push(target.to_string_lossy().to_string());
    args
}

/// Run `git clone` with real progress reporting.
pub(crate) fn git_clone(
    url: &str,
    branch: Option<&str>,
    target: &Path,
    ctx: &TaskContext,
) -> TaskResult<()> {
    let progress = Arc::new(Mutex::new(CloneProgress::new()));
    ctx.set_indeterminate();

    let observer_ctx = ctx.clone();
    let observer_progress = Arc::clone(&progress);
    ToolCommand::new("git")
        .args(clone_args(url, branch, target))
        .label("git clone")
        .timeout(GIT_TIMEOUT)
        .on_line(move |line| {
            if let Some(fraction) = observer_progress.lock().observe(line) {
                observer_ctx.set_progress(fraction);
            }
        })
        .run(ctx)?
        .into_result("git clone")?;

    ctx.set_progress(1.0);
    Ok(())
}

/// Clone `variant` into the workspace, replacing whatever is there after
/// confirmation. Persists the variant as the last cloned source.
pub fn clone_source(
    variant: SourceVariant,
    workspace: &Workspace,
    config: &mut AppConfig,
    ctx: &TaskContext,
) -> TaskResult<PathBuf> {
    let spec = SourceRepoSpec::for_variant(variant, config)?;
    let target = workspace.source_dir();

    if target.exists() {
        ctx.require_confirmation(&format!(
            "{} already exists. Delete it and clone {} again?",
            target.display(),
            variant
        ))?;
        clean_path(&target, ctx)?;
        config.last_cloned_source = None;
        config.save_for(workspace);
    }

    check_cancelled(ctx)?;
    fs::create_dir_all(workspace.git_source_dir())
        .map_err(|e| TaskError::io(format!("Creating {}", workspace.git_source_dir().display()), e))?;

    ctx.set_status(format!("Cloning {}...", variant));
    log_action(&format!(
        "Cloning {} ({}{})",
        variant,
        spec.url,
        spec.branch
            .as_deref()
            .map(|b| format!(" @ {}", b))
            .unwrap_or_default()
    ));

    git_clone(&spec.url, spec.branch.as_deref(), &target, ctx)?;

    config.last_cloned_source = Some(variant.key().to_string());
    config.save_for(workspace);
    ctx.set_status(format!("{} cloned", variant));
    log_info(&format!("{} cloned into {}", variant, target.display()));
    Ok(target)
}

// ============================================================================
// Update
// ============================================================================

/// `git fetch origin` then `git pull origin`; the pull is skipped if the
/// fetch fails.
pub fn update_source(workspace: &Workspace, ctx: &TaskContext) -> TaskResult<()> {
    let source = workspace.source_dir();
    if !is_git_checkout(&source) {
        return Err(TaskError::precondition(format!(
            "a cloned source in {}",
            source.display()
        )));
    }

    ctx.set_indeterminate();
    for (step, status) in [("fetch", "Fetching updates..."), ("pull", "Pulling changes...")] {
        check_cancelled(ctx)?;
        ctx.set_status(status);
        let label = format!("git {}", step);
        ToolCommand::new("git")
            .args([step, "origin"])
            .current_dir(&source)
            .label(&label)
            .timeout(GIT_TIMEOUT)
            .run(ctx)?
            .into_result(&label)?;
    }

    ctx.set_progress(1.0);
    ctx.set_status("Source updated");
    Ok(())
}

// ============================================================================
// Clean
// ============================================================================

/// Which deletion strategy finally removed a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanStrategy {
    AlreadyAbsent,
    ClearedGitReadOnly,
    PlainDelete,
    GitClean,
    ForcedDelete,
}

fn removed(path: &Path) -> bool {
    !path.exists()
}

/// Delete `path`, escalating through the strategies Windows file locking
/// tends to need. Errors only when every strategy leaves the folder behind.
pub fn clean_path(path: &Path, ctx: &TaskContext) -> TaskResult<CleanStrategy> {
    if !path.exists() {
        return Ok(CleanStrategy::AlreadyAbsent);
    }
    ctx.set_status(format!("Removing {}...", path.display()));

    // Git marks pack files read-only
    let git_dir = path.join(".git");
    if git_dir.exists() {
        let cleared = clear_readonly(&git_dir);
        if cleared > 0 {
            log_info(&format!("Cleared read-only flag on {} git files", cleared));
        }
        if fs::remove_dir_all(path).is_ok() && removed(path) {
            return Ok(CleanStrategy::ClearedGitReadOnly);
        }
    }

    match fs::remove_dir_all(path) {
        Ok(()) if removed(path) => return Ok(CleanStrategy::PlainDelete),
        Ok(()) => {}
        Err(e) => log_warning(&format!("Plain delete of {} failed: {}", path.display(), e)),
    }

    if is_git_checkout(path) {
        let cleaned = ToolCommand::new("git")
            .args(["clean", "-fdx"])
            .current_dir(path)
            .label("git clean")
            .timeout(GIT_TIMEOUT)
            .quiet()
            .run(ctx);
        match cleaned {
            Ok(out) if out.success() => {
                if fs::remove_dir_all(path).is_ok() && removed(path) {
                    return Ok(CleanStrategy::GitClean);
                }
            }
            Ok(out) => log_warning(&format!("git clean exited with {:?}", out.code())),
            Err(e) => log_warning(&format!("git clean unavailable: {}", e)),
        }
    }

    match force_remove_dir(path) {
        Ok(()) if removed(path) => Ok(CleanStrategy::ForcedDelete),
        Ok(()) => Err(TaskError::other(
            format!("Removing {}", path.display()),
            "folder still present after every delete strategy",
        )),
        Err(e) => Err(TaskError::io(format!("Removing {}", path.display()), e)),
    }
}

/// Delete the workspace checkout and forget which variant it was.
pub fn clean_source(
    workspace: &Workspace,
    config: &mut AppConfig,
    ctx: &TaskContext,
) -> TaskResult<CleanStrategy> {
    let strategy = clean_path(&workspace.source_dir(), ctx)?;
    if config.last_cloned_source.take().is_some() {
        config.save_for(workspace);
    }
    ctx.set_status("Source folder removed");
    log_action(&format!(
        "Cleaned {} ({:?})",
        workspace.source_dir().display(),
        strategy
    ));
    Ok(strategy)
}
