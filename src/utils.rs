//! Shared utility functions used across the application

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::logging::log_download;
use crate::task::{TaskContext, TaskError, TaskResult};

const USER_AGENT: &str = "ACB-Rust";
const CHUNK_SIZE: usize = 64 * 1024;

/// Download a file from URL to the specified path, reporting byte progress.
///
/// `on_progress` receives `(downloaded, total)`; `total` is `None` when the
/// server sends no Content-Length. The partial file is removed on failure.
pub fn download_file(
    url: &str,
    path: &Path,
    ctx: &TaskContext,
    on_progress: impl Fn(u64, Option<u64>),
) -> TaskResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| TaskError::io(format!("Creating {}", parent.display()), e))?;
    }

    let resp = ureq::get(url)
        .set("User-Agent", USER_AGENT)
        .call()
        .map_err(|e| TaskError::other(format!("GET {}", url), e))?;

    let total = resp
        .header("Content-Length")
        .and_then(|v| v.parse::<u64>().ok());

    let result = (|| -> TaskResult<()> {
        let mut reader = resp.into_reader();
        let mut file = fs::File::create(path)
            .map_err(|e| TaskError::io(format!("Creating {}", path.display()), e))?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut downloaded = 0u64;

        on_progress(0, total);
        loop {
            if ctx.is_cancelled() {
                return Err(TaskError::Cancelled);
            }
            let n = reader
                .read(&mut buf)
                .map_err(|e| TaskError::other(format!("Reading {}", url), e))?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])
                .map_err(|e| TaskError::io(format!("Writing {}", path.display()), e))?;
            downloaded += n as u64;
            on_progress(downloaded, total);
        }
        file.flush()?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(path);
    } else {
        log_download(&format!("Downloaded {} -> {}", url, path.display()));
    }
    result
}

/// HEAD request that succeeds only on HTTP 200.
pub fn url_responds(url: &str) -> bool {
    match ureq::head(url).set("User-Agent", USER_AGENT).call() {
        Ok(resp) => resp.status() == 200,
        Err(_) => false,
    }
}

pub fn url_to_filename(url: &str) -> String {
    url.split(['?', '#'])
        .next()
        .and_then(|u| u.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .unwrap_or("download.bin")
        .to_string()
}

/// Recursively copy `src` into `dst`, returning the number of files copied.
pub fn copy_dir_all(src: &Path, dst: &Path) -> std::io::Result<u64> {
    let mut copied = 0;
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(std::io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(std::io::Error::other)?;
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Clear the read-only attribute on everything below `path`.
pub fn clear_readonly(path: &Path) -> usize {
    let mut changed = 0;
    for entry in WalkDir::new(path).into_iter().flatten() {
        if let Ok(meta) = entry.metadata() {
            let mut perms = meta.permissions();
            if perms.readonly() {
                #[allow(clippy::permissions_set_readonly_false)]
                perms.set_readonly(false);
                if fs::set_permissions(entry.path(), perms).is_ok() {
                    changed += 1;
                }
            }
        }
    }
    changed
}

/// Delete a directory tree, clearing read-only attributes on anything that
/// refuses to go the first time.
pub fn force_remove_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        return Ok(());
    }
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(_) => {
            clear_readonly(path);
            // Deepest entries first so directories are empty when reached
            let mut entries: Vec<PathBuf> = WalkDir::new(path)
                .contents_first(true)
                .into_iter()
                .flatten()
                .map(|e| e.into_path())
                .collect();
            entries.dedup();
            for entry in &entries {
                if entry.is_dir() {
                    let _ = fs::remove_dir(entry);
                } else {
                    let _ = fs::remove_file(entry);
                }
            }
            if path.exists() {
                fs::remove_dir_all(path)
            } else {
                Ok(())
            }
        }
    }
}

/// Extract a zip archive into `dest`, returning the number of files written.
pub fn extract_zip(archive: &Path, dest: &Path, ctx: &TaskContext) -> TaskResult<usize> {
    let file = fs::File::open(archive)
        .map_err(|e| TaskError::io(format!("Opening {}", archive.display()), e))?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| TaskError::other(format!("Reading {}", archive.display()), e))?;
    fs::create_dir_all(dest)?;

    let total = zip.len().max(1);
    let mut written = 0;
    for i in 0..zip.len() {
        if ctx.is_cancelled() {
            return Err(TaskError::Cancelled);
        }
        let mut entry = zip
            .by_index(i)
            .map_err(|e| TaskError::other(format!("Reading {}", archive.display()), e))?;
        // Skip entries that would escape the destination
        let Some(rel) = entry.enclosed_name() else {
            continue;
        };
        let out = dest.join(rel);
        if entry.is_dir() {
            fs::create_dir_all(&out)?;
        } else {
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut target = fs::File::create(&out)
                .map_err(|e| TaskError::io(format!("Creating {}", out.display()), e))?;
            std::io::copy(&mut entry, &mut target)
                .map_err(|e| TaskError::io(format!("Extracting {}", out.display()), e))?;
            written += 1;
        }
        if i % 200 == 0 {
            ctx.set_progress(i as f32 / total as f32);
        }
    }
    ctx.set_progress(1.0);
    Ok(written)
}

/// Format a byte count for progress messages.
pub fn format_bytes(bytes: u64) -> String {
    const MB: f64 = 1024.0 * 1024.0;
    if bytes as f64 >= MB * 1024.0 {
        format!("{:.2} GB", bytes as f64 / (MB * 1024.0))
    } else {
        format!("{:.1} MB", bytes as f64 / MB)
    }
}
