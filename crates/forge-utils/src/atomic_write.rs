//! Atomic file writes: temp file + fsync + rename, with a Windows retry
//! loop and a cross-filesystem fallback.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use std::io::Write;

#[cfg(target_os = "windows")]
use std::{thread, time::Duration};

use tempfile::NamedTempFile;

/// Diagnostics produced by an atomic write, surfaced to callers as warnings
/// rather than failures.
#[derive(Debug, Clone, Default)]
pub struct AtomicWriteResult {
    pub rename_retry_count: u32,
    pub used_cross_filesystem_fallback: bool,
    pub warnings: Vec<String>,
}

/// Atomically write `content` to `path`.
///
/// Writes to a temp file in the same directory, fsyncs it, then renames it
/// into place. Partial files are never observable by a concurrent reader.
pub fn write_file_atomic(path: &Utf8Path, content: &str) -> Result<AtomicWriteResult> {
    let mut result = AtomicWriteResult::default();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create parent directory: {parent}"))?;
    }

    let temp_dir = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let mut temp_file = NamedTempFile::new_in(temp_dir)
        .with_context(|| format!("failed to create temp file in: {temp_dir}"))?;

    temp_file
        .write_all(content.as_bytes())
        .context("failed to write content to temp file")?;
    temp_file
        .as_file()
        .sync_all()
        .context("failed to fsync temp file")?;

    let temp_path = temp_file.path().to_path_buf();
    match atomic_rename(temp_file, path.as_std_path()) {
        Ok(retry_count) => {
            result.rename_retry_count = retry_count;
            if retry_count > 0 {
                result
                    .warnings
                    .push(format!("rename required {retry_count} retries"));
            }
        }
        Err(e) if is_cross_filesystem_error(&e) => {
            result.used_cross_filesystem_fallback = true;
            result
                .warnings
                .push("used cross-filesystem fallback (copy -> fsync -> replace)".to_string());
            cross_filesystem_copy(&temp_path, path)?;
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to atomically write: {path}"));
        }
    }

    Ok(result)
}

#[cfg(target_os = "windows")]
fn atomic_rename(mut temp_file: NamedTempFile, target: &std::path::Path) -> Result<u32> {
    use std::io::ErrorKind;

    const MAX_RETRIES: u32 = 5;
    const INITIAL_DELAY_MS: u64 = 10;
    const MAX_TOTAL_DELAY_MS: u64 = 250;

    let mut retry_count = 0;
    let mut total_delay_ms = 0;

    loop {
        match temp_file.persist(target) {
            Ok(_) => return Ok(retry_count),
            Err(persist_error) => {
                if retry_count >= MAX_RETRIES {
                    return Err(anyhow::anyhow!(persist_error.error));
                }
                let retryable = matches!(
                    persist_error.error.kind(),
                    ErrorKind::PermissionDenied | ErrorKind::Other
                );
                if !retryable {
                    return Err(anyhow::anyhow!(persist_error.error));
                }
                let delay_ms = INITIAL_DELAY_MS * 2_u64.pow(retry_count);
                let remaining = MAX_TOTAL_DELAY_MS.saturating_sub(total_delay_ms);
                let sleep_ms = delay_ms.min(remaining);
                if sleep_ms > 0 {
                    thread::sleep(Duration::from_millis(sleep_ms));
                }
                total_delay_ms += sleep_ms;
                retry_count += 1;
                temp_file = persist_error.file;
            }
        }
    }
}

#[cfg(not(target_os = "windows"))]
fn atomic_rename(temp_file: NamedTempFile, target: &std::path::Path) -> Result<u32> {
    temp_file.persist(target).map_err(|e| anyhow::anyhow!(e.error))?;
    Ok(0)
}

fn is_cross_filesystem_error(err: &anyhow::Error) -> bool {
    #[cfg(unix)]
    {
        err.to_string().contains("os error 18") // EXDEV
    }
    #[cfg(not(unix))]
    {
        let _ = err;
        false
    }
}

fn cross_filesystem_copy(temp_path: &std::path::Path, target: &Utf8Path) -> Result<()> {
    fs::copy(temp_path, target.as_std_path()).context("cross-filesystem copy failed")?;
    let f = fs::File::open(target.as_std_path())?;
    f.sync_all().context("fsync after cross-filesystem copy failed")?;
    let _ = fs::remove_file(temp_path);
    Ok(())
}
