//! Runtime pieces of the Repack: portable MySQL, DLLs, client data, scripts

use std::fs;
use std::path::{Path, PathBuf};

use super::require_repack;
use crate::config::{AppConfig, DataUrlConfig};
use crate::deps::installer::find_extracted_root;
use crate::logging::{log_action, log_info, log_warning};
use crate::paths::Workspace;
use crate::source::clean_path;
use crate::task::{check_cancelled, TaskContext, TaskError, TaskResult};
use crate::utils::{copy_dir_all, download_file, extract_zip, format_bytes, url_to_filename};

const MYSQL_INSTALL_DIRS: &[&str] = &[
    r"C:\Program Files\MySQL\MySQL Server 8.4",
    r"C:\Program Files\MySQL\MySQL Server 8.0",
];

const MYSQL_ZIP_ROOT: &str = r"C:\MySQL";

const OPENSSL_INSTALL_DIRS: &[&str] = &[
    r"C:\Program Files\OpenSSL-Win64",
    r"C:\Program Files\OpenSSL",
    r"C:\OpenSSL-Win64",
];

// ============================================================================
// Portable MySQL
// ============================================================================

/// `...\bin\mysql.exe` -> the installation root.
pub fn install_root_from_exe(exe: &Path) -> Option<PathBuf> {
    let bin = exe.parent()?;
    if bin.file_name()?.to_string_lossy().eq_ignore_ascii_case("bin") {
        bin.parent().map(Path::to_path_buf)
    } else {
        Some(bin.to_path_buf())
    }
}

fn has_mysqld(root: &Path) -> bool {
    root.join("bin").join("mysqld.exe").exists()
}

/// The MySQL installation to bundle: the detected one, else well-known
/// install folders, else `MYSQL_HOME`.
pub fn locate_mysql_root(config: &AppConfig) -> Option<PathBuf> {
    let detected = config
        .dependency_path("MySQL")
        .and_then(|exe| install_root_from_exe(&exe));
    let installed = MYSQL_INSTALL_DIRS.iter().map(PathBuf::from);
    let zip_root = find_extracted_root(Path::new(MYSQL_ZIP_ROOT), "bin/mysqld.exe");
    let home = std::env::var_os("MYSQL_HOME").map(PathBuf::from);

    detected
        .into_iter()
        .chain(installed)
        .chain(zip_root)
        .chain(home)
        .find(|root| has_mysqld(root))
}

/// Copy the MySQL installation into `Repack/mysql`.
pub fn create_mysql(
    workspace: &Workspace,
    config: &AppConfig,
    ctx: &TaskContext,
) -> TaskResult<PathBuf> {
    let repack = require_repack(workspace)?;
    let source = locate_mysql_root(config).ok_or_else(|| TaskError::MissingTool {
        name: "MySQL".into(),
    })?;
    copy_mysql_tree(&source, &repack.join("mysql"), ctx)
}

pub fn copy_mysql_tree(source: &Path, target: &Path, ctx: &TaskContext) -> TaskResult<PathBuf> {
    if target.exists() {
        ctx.require_confirmation(&format!(
            "{} already exists. Replace it (including any databases in it)?",
            target.display()
        ))?;
        clean_path(target, ctx)?;
    }

    check_cancelled(ctx)?;
    ctx.set_status(format!("Copying MySQL from {}...", source.display()));
    ctx.set_indeterminate();
    let files = copy_dir_all(source, target)
        .map_err(|e| TaskError::io(format!("Copying {}", source.display()), e))?;
    ctx.set_progress(1.0);
    log_action(&format!("Copied {} MySQL files to {}", files, target.display()));
    Ok(target.to_path_buf())
}

// ============================================================================
// Runtime DLLs
// ============================================================================

/// A DLL the servers load at start-up and where it may be found.
#[derive(Debug, Clone)]
pub struct RuntimeDll {
    pub name: &'static str,
    pub candidates: Vec<PathBuf>,
}

/// Candidate locations for every DLL the servers need.
pub fn plan_dlls(openssl_roots: &[PathBuf], mysql_root: Option<&Path>) -> Vec<RuntimeDll> {
    let in_openssl = |rel: &[&str]| -> Vec<PathBuf> {
        openssl_roots
            .iter()
            .flat_map(|root| rel.iter().map(move |r| root.join(r)))
            .collect()
    };

    let mut mysql = Vec::new();
    if let Some(root) = mysql_root {
        mysql.push(root.join("lib").join("libmysql.dll"));
        mysql.push(root.join("bin").join("libmysql.dll"));
    }

    vec![
        RuntimeDll {
            name: "libcrypto-3-x64.dll",
            candidates: in_openssl(&["bin/libcrypto-3-x64.dll", "libcrypto-3-x64.dll"]),
        },
        RuntimeDll {
            name: "libssl-3-x64.dll",
            candidates: in_openssl(&["bin/libssl-3-x64.dll", "libssl-3-x64.dll"]),
        },
        RuntimeDll {
            name: "legacy.dll",
            candidates: in_openssl(&["lib/ossl-modules/legacy.dll", "bin/legacy.dll"]),
        },
        RuntimeDll {
            name: "libmysql.dll",
            candidates: mysql,
        },
    ]
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DllReport {
    pub copied: Vec<String>,
    pub missing: Vec<String>,
}

impl DllReport {
    pub fn summary(&self) -> String {
        let mut text = format!("{} of {} DLLs copied", self.copied.len(), self.copied.len() + self.missing.len());
        if !self.missing.is_empty() {
            text.push_str(&format!(" (missing: {})", self.missing.join(", ")));
        }
        text
    }
}

/// Copy each planned DLL into `dest`; missing ones are reported, not fatal.
pub fn copy_dlls(plan: &[RuntimeDll], dest: &Path) -> TaskResult<DllReport> {
    let mut report = DllReport::default();
    for dll in plan {
        match dll.candidates.iter().find(|p| p.is_file()) {
            Some(src) => {
                fs::copy(src, dest.join(dll.name))
                    .map_err(|e| TaskError::io(format!("Copying {}", dll.name), e))?;
                log_info(&format!("Copied {} from {}", dll.name, src.display()));
                report.copied.push(dll.name.to_string());
            }
            None => {
                log_warning(&format!("{} not found", dll.name));
                report.missing.push(dll.name.to_string());
            }
        }
    }
    Ok(report)
}

pub fn create_dlls(workspace: &Workspace, config: &AppConfig) -> TaskResult<DllReport> {
    let repack = require_repack(workspace)?;

    let mut openssl_roots: Vec<PathBuf> = config
        .dependency_path("OpenSSL")
        .and_then(|exe| install_root_from_exe(&exe))
        .into_iter()
        .collect();
    openssl_roots.extend(OPENSSL_INSTALL_DIRS.iter().map(PathBuf::from));

    // Prefer the bundled copy so the DLL matches the server it ships with
    let bundled = repack.join("mysql");
    let mysql_root = if has_mysqld(&bundled) {
        Some(bundled)
    } else {
        locate_mysql_root(config)
    };

    let report = copy_dlls(&plan_dlls(&openssl_roots, mysql_root.as_deref()), &repack)?;
    log_action(&report.summary());
    Ok(report)
}

// ============================================================================
// my.ini and launch scripts
// ============================================================================

pub fn my_ini_contents(port: u16) -> String {
    format!(
        "[mysqld]\r\n\
         basedir=./mysql\r\n\
         datadir=./mysql/data\r\n\
         tmpdir=./mysql/tmp\r\n\
         log-error=./mysql/logs/mysql_error.log\r\n\
         port={port}\r\n\
         bind-address=127.0.0.1\r\n\
         max_allowed_packet=64M\r\n\
         character-set-server=utf8mb4\r\n\
         \r\n\
         [client]\r\n\
         port={port}\r\n"
    )
}

/// Write a portable `my.ini` with paths relative to the Repack folder.
pub fn write_my_ini(workspace: &Workspace, port: u16) -> TaskResult<PathBuf> {
    let path = require_repack(workspace)?.join("my.ini");
    fs::write(&path, my_ini_contents(port))
        .map_err(|e| TaskError::io(format!("Writing {}", path.display()), e))?;
    log_action(&format!("Wrote {}", path.display()));
    Ok(path)
}

/// (file name, batch contents) for each helper script.
pub fn launch_scripts() -> Vec<(&'static str, String)> {
    let script = |body: &str| format!("@echo off\r\ncd /d \"%~dp0\"\r\n{}\r\n", body);
    vec![
        (
            "MySQL.bat",
            script("mysql\\bin\\mysqld.exe --defaults-file=my.ini --console --standalone"),
        ),
        ("HeidiSQL.bat", script("start \"\" \"Tools\\HeidiSQL\\heidisql.exe\"")),
        ("AuthServer.bat", script("start \"AuthServer\" authserver.exe")),
        ("WorldServer.bat", script("start \"WorldServer\" worldserver.exe")),
    ]
}

pub fn write_launch_scripts(workspace: &Workspace) -> TaskResult<Vec<PathBuf>> {
    let repack = require_repack(workspace)?;
    let mut written = Vec::new();
    for (name, body) in launch_scripts() {
        let path = repack.join(name);
        fs::write(&path, body)
            .map_err(|e| TaskError::io(format!("Writing {}", path.display()), e))?;
        written.push(path);
    }
    log_action(&format!("Wrote {} launch scripts", written.len()));
    Ok(written)
}

// ============================================================================
// Client data
// ============================================================================

/// Download the client data archive and extract it into `Repack/data`.
pub fn download_client_data(
    workspace: &Workspace,
    data_url: &DataUrlConfig,
    ctx: &TaskContext,
) -> TaskResult<usize> {
    let repack = require_repack(workspace)?;
    let url = data_url.url.trim();
    if url.is_empty() {
        return Err(TaskError::precondition("a client data URL"));
    }

    let archive = workspace.downloads_dir().join(url_to_filename(url));
    ctx.set_status("Downloading client data...");
    download_file(url, &archive, ctx, |done, total| match total {
        Some(total) if total > 0 => ctx.set_progress(done as f32 / total as f32),
        _ => ctx.set_indeterminate(),
    })
    .map_err(|e| match e {
        TaskError::Cancelled => TaskError::Cancelled,
        other => TaskError::Download {
            attempted: vec![url.to_string()],
            reason: other.to_string(),
        },
    })?;

    let size = fs::metadata(&archive).map(|m| m.len()).unwrap_or(0);
    ctx.set_status(format!("Extracting client data ({})...", format_bytes(size)));
    let files = extract_zip(&archive, &repack.join("data"), ctx)?;
    if let Err(e) = fs::remove_file(&archive) {
        log_warning(&format!("Could not remove {}: {}", archive.display(), e));
    }
    log_action(&format!("Extracted {} client data files", files));
    Ok(files)
}
