//! Dependency download and installation
//!
//! Downloads walk a fallback chain (configured URL, discovered latest, then
//! the hardcoded alternatives) and the first artifact that arrives is
//! installed according to its extension.

use std::fs;
use std::iter;
use std::path::{Path, PathBuf};
use std::time::Duration;

use walkdir::WalkDir;

use super::env::{append_to_path, set_persistent_var};
use super::latest::discover_latest_url;
use super::registry::{DepKind, VS_INSTALL_ARGS};
use super::scanner::{ScanResult, Scanner};
use super::DependencySpec;
use crate::logging::{log_download, log_error, log_install, log_warning};
use crate::paths::Workspace;
use crate::process::ToolCommand;
use crate::task::{check_cancelled, TaskContext, TaskError, TaskResult};
use crate::utils::{download_file, extract_zip, format_bytes, url_to_filename};

/// Installers that wait on the user (or the VS bootstrapper) get a long leash.
const INSTALLER_TIMEOUT: Duration = Duration::from_secs(3 * 60 * 60);

/// Exit codes an installer may return on success (3010/1641: reboot required)
const INSTALLER_SUCCESS_CODES: &[i32] = &[0, 1641, 3010];

// ============================================================================
// Fallback chain
// ============================================================================

/// URLs to try, in order: default, latest, alternatives.
///
/// `latest` is only invoked once the default URL has been consumed, so the
/// discovery request is skipped when the default download succeeds.
pub fn candidate_urls<'a>(
    spec: &'a DependencySpec,
    latest: impl FnOnce() -> Option<String> + 'a,
) -> impl Iterator<Item = String> + 'a {
    iter::once(spec.download_url.clone())
        .chain(iter::once_with(latest).flatten())
        .chain(spec.alternative_urls.iter().cloned())
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
}

/// Try `fetch` on each URL until one succeeds, skipping repeats.
///
/// Cancellation stops the chain immediately. Exhausting it yields
/// `TaskError::Download` listing every URL that was attempted.
pub fn first_successful_download<T>(
    urls: impl IntoIterator<Item = String>,
    mut fetch: impl FnMut(&str) -> TaskResult<T>,
) -> TaskResult<(String, T)> {
    let mut attempted: Vec<String> = Vec::new();
    let mut last_reason = String::from("no download URL configured");

    for url in urls {
        if attempted.contains(&url) {
            continue;
        }
        attempted.push(url.clone());
        match fetch(&url) {
            Ok(value) => return Ok((url, value)),
            Err(TaskError::Cancelled) => return Err(TaskError::Cancelled),
            Err(e) => {
                log_warning(&format!("Download from {} failed: {}", url, e));
                last_reason = e.to_string();
            }
        }
    }

    Err(TaskError::Download {
        attempted,
        reason: last_reason,
    })
}

// ============================================================================
// Installer dispatch
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallAction {
    /// Unattended IDE install with the C++ workload
    SilentExe(Vec<String>),
    /// Interactive installer the user completes
    InteractiveExe,
    Msi,
    Zip,
}

pub fn install_action(kind: DepKind, artifact: &Path) -> Option<InstallAction> {
    let ext = artifact
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())?;
    match ext.as_str() {
        "exe" if kind == DepKind::VisualStudio => Some(InstallAction::SilentExe(
            VS_INSTALL_ARGS.iter().map(|a| a.to_string()).collect(),
        )),
        "exe" => Some(InstallAction::InteractiveExe),
        "msi" => Some(InstallAction::Msi),
        "zip" => Some(InstallAction::Zip),
        _ => None,
    }
}

fn run_installer(cmd: ToolCommand, label: &str, ctx: &TaskContext) -> TaskResult<()> {
    let output = cmd.label(label).timeout(INSTALLER_TIMEOUT).run(ctx)?;
    match output.code() {
        Some(code) if INSTALLER_SUCCESS_CODES.contains(&code) => {
            if code != 0 {
                log_install(&format!("{} finished (exit {}, reboot may be required)", label, code));
            }
            Ok(())
        }
        _ => Err(TaskError::ToolFailed {
            label: label.to_string(),
            code: output.code(),
            detail: output.tail(10),
        }),
    }
}

/// Find the directory below `root` (at most two levels deep) that contains
/// `marker`, e.g. the `mysql-8.4.3-winx64` folder a MySQL zip unpacks into.
pub fn find_extracted_root(root: &Path, marker: &str) -> Option<PathBuf> {
    WalkDir::new(root)
        .max_depth(2)
        .into_iter()
        .flatten()
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
        .find(|dir| dir.join(marker).exists())
}

/// Environment wiring for dependencies that ship as plain archives.
fn configure_zip_environment(spec: &DependencySpec, ctx: &TaskContext) -> TaskResult<()> {
    let install = &spec.install_path;
    match spec.kind {
        DepKind::MySql => {
            let home = find_extracted_root(install, "bin/mysql.exe")
                .unwrap_or_else(|| install.clone());
            let home_str = home.to_string_lossy().to_string();
            set_persistent_var(ctx, "MYSQL_HOME", &home_str)?;
            set_persistent_var(ctx, "MYSQL_LIB", &home.join("lib").to_string_lossy())?;
            set_persistent_var(ctx, "MYSQL_INCLUDE", &home.join("include").to_string_lossy())?;
            append_to_path(ctx, &home.join("bin").to_string_lossy())?;
        }
        DepKind::Boost => {
            let root = find_extracted_root(install, "boost/version.hpp")
                .unwrap_or_else(|| install.clone());
            set_persistent_var(ctx, "BOOST_ROOT", &root.to_string_lossy())?;
        }
        DepKind::HeidiSql => {
            let dir = find_extracted_root(install, "heidisql.exe")
                .unwrap_or_else(|| install.clone());
            append_to_path(ctx, &dir.to_string_lossy())?;
        }
        _ => {}
    }
    Ok(())
}

fn install_artifact(spec: &DependencySpec, artifact: &Path, ctx: &TaskContext) -> TaskResult<()> {
    let action = install_action(spec.kind, artifact).ok_or_else(|| {
        TaskError::other(
            format!("Installing {}", spec.name),
            format!("unsupported installer type: {}", artifact.display()),
        )
    })?;

    match action {
        InstallAction::SilentExe(args) => {
            ctx.set_status(format!("Installing {} (this can take a long time)...", spec.name));
            ctx.set_indeterminate();
            run_installer(ToolCommand::new(artifact).args(args), &spec.name, ctx)
        }
        InstallAction::InteractiveExe => {
            ctx.set_status(format!("Complete the {} installer window to continue", spec.name));
            ctx.set_indeterminate();
            run_installer(ToolCommand::new(artifact), &spec.name, ctx)
        }
        InstallAction::Msi => {
            ctx.set_status(format!("Installing {}...", spec.name));
            ctx.set_indeterminate();
            run_installer(
                ToolCommand::new("msiexec").arg("/i").arg(artifact).arg("/passive"),
                &spec.name,
                ctx,
            )
        }
        InstallAction::Zip => {
            ctx.set_status(format!("Extracting {}...", spec.name));
            let files = extract_zip(artifact, &spec.install_path, ctx)?;
            log_install(&format!(
                "Extracted {} files to {}",
                files,
                spec.install_path.display()
            ));
            configure_zip_environment(spec, ctx)
        }
    }
}

/// Download and install `spec`, then rescan it.
///
/// On install failure the downloaded artifact stays in `Downloads/`.
pub fn install(
    spec: &mut DependencySpec,
    workspace: &Workspace,
    scanner: &Scanner,
    ctx: &TaskContext,
) -> TaskResult<ScanResult> {
    check_cancelled(ctx)?;
    ctx.set_status(format!("Preparing {} download...", spec.name));

    let latest_source = spec.latest.clone();
    let urls = candidate_urls(spec, move || discover_latest_url(&latest_source));
    let downloads = workspace.downloads_dir();

    let (url, artifact) = first_successful_download(urls, |url| {
        let target = downloads.join(url_to_filename(url));
        ctx.set_status(format!("Downloading {}...", spec.name));
        log_download(&format!("Downloading {} from {}", spec.name, url));
        download_file(url, &target, ctx, |done, total| match total {
            Some(total) if total > 0 => {
                ctx.set_progress(done as f32 / total as f32);
                if done == total {
                    ctx.log(format!("{} / {}", format_bytes(done), format_bytes(total)));
                }
            }
            _ => ctx.set_indeterminate(),
        })?;
        Ok(target)
    })?;
    log_download(&format!("{} downloaded from {}", spec.name, url));

    if let Err(e) = install_artifact(spec, &artifact, ctx) {
        log_error(&format!(
            "{} install failed, installer kept at {}: {}",
            spec.name,
            artifact.display(),
            e
        ));
        return Err(e);
    }

    if let Err(e) = fs::remove_file(&artifact) {
        log_warning(&format!("Could not remove {}: {}", artifact.display(), e));
    }

    let result = scanner.scan(spec);
    spec.apply_scan(&result);
    if result.detected {
        log_install(&format!("{} installed at {}", spec.name, result.path));
    } else {
        log_warning(&format!(
            "{} installer finished but it was not detected; a new shell or reboot may be needed",
            spec.name
        ));
    }
    ctx.set_progress(1.0);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mysql_spec() -> DependencySpec {
        let mut spec = DependencySpec::new("MySQL", DepKind::MySql);
        spec.download_url = "https://cdn/a.zip".into();
        spec.alternative_urls = vec!["https://cdn/b.zip".into(), "https://cdn/a.zip".into()];
        spec
    }

    fn latest() -> Option<String> {
        Some("https://cdn/latest.zip".into())
    }

    #[test]
    fn chain_order_is_default_latest_alternatives() {
        let spec = mysql_spec();
        let mut tried = Vec::new();
        let _ = first_successful_download::<()>(candidate_urls(&spec, latest), |url| {
            tried.push(url.to_string());
            Err(TaskError::other("GET", "HTTP 404"))
        });
        assert_eq!(
            tried,
            vec!["https://cdn/a.zip", "https://cdn/latest.zip", "https://cdn/b.zip"]
        );
    }

    #[test]
    fn latest_is_not_discovered_when_default_succeeds() {
        let spec = mysql_spec();
        let discovered = std::cell::Cell::new(false);
        let (url, _) = first_successful_download(
            candidate_urls(&spec, || {
                discovered.set(true);
                latest()
            }),
            |_| Ok(()),
        )
        .unwrap();
        assert_eq!(url, "https://cdn/a.zip");
        assert!(!discovered.get());
    }

    #[test]
    fn chain_stops_at_first_success() {
        let spec = mysql_spec();
        let mut tried = Vec::new();
        let (url, value) = first_successful_download(candidate_urls(&spec, latest), |url| {
            tried.push(url.to_string());
            if url.ends_with("latest.zip") {
                Ok(42)
            } else {
                Err(TaskError::other("GET", "HTTP 404"))
            }
        })
        .unwrap();
        assert_eq!(url, "https://cdn/latest.zip");
        assert_eq!(value, 42);
        assert_eq!(tried.len(), 2);
    }

    #[test]
    fn exhausted_chain_lists_every_url() {
        let spec = mysql_spec();
        let err = first_successful_download::<()>(candidate_urls(&spec, || None), |_| Err(TaskError::other("GET", "HTTP 500")))
            .unwrap_err();
        match err {
            TaskError::Download { attempted, reason } => {
                assert_eq!(attempted, vec!["https://cdn/a.zip", "https://cdn/b.zip"]);
                assert!(reason.contains("HTTP 500"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn cancellation_short_circuits_the_chain() {
        let spec = mysql_spec();
        let mut calls = 0;
        let err = first_successful_download::<()>(candidate_urls(&spec, || None), |_| {
            calls += 1;
            Err(TaskError::Cancelled)
        })
        .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(calls, 1);
    }

    #[test]
    fn dispatch_by_extension() {
        assert!(matches!(
            install_action(DepKind::VisualStudio, Path::new("vs_community.exe")),
            Some(InstallAction::SilentExe(args)) if args.contains(&"--passive".to_string())
        ));
        assert_eq!(
            install_action(DepKind::Git, Path::new("Git-2.47.1-64-bit.EXE")),
            Some(InstallAction::InteractiveExe)
        );
        assert_eq!(
            install_action(DepKind::CMake, Path::new("cmake.msi")),
            Some(InstallAction::Msi)
        );
        assert_eq!(
            install_action(DepKind::Boost, Path::new("boost_1_86_0.zip")),
            Some(InstallAction::Zip)
        );
        assert_eq!(install_action(DepKind::Boost, Path::new("boost.7z")), None);
    }

    #[test]
    fn extracted_root_is_found_below_install_path() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("mysql-8.4.3-winx64");
        fs::create_dir_all(inner.join("bin")).unwrap();
        fs::write(inner.join("bin/mysql.exe"), "").unwrap();

        assert_eq!(find_extracted_root(dir.path(), "bin/mysql.exe"), Some(inner));
        assert_eq!(find_extracted_root(dir.path(), "boost/version.hpp"), None);
    }
}
