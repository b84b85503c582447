//! Log-file helpers.
//!
//! The `tracing-subscriber` setup lives in the binary; this module decides
//! where the log goes, keeps it bounded, and builds the filter directive.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::{Config, LogLevel};
use crate::paths::PlatformPaths;

/// Environment variable that overrides the configured level filter.
pub const LOG_ENV_VAR: &str = "JSDEBUG_LOG";

/// Size at which the current log file is rotated (10 MB).
pub const DEFAULT_MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Rotated files kept next to the current one.
pub const DEFAULT_MAX_LOG_FILES: u32 = 5;

/// Default log file: `<log_dir>/jsdebug.log`.
pub fn default_log_file_path(paths: &dyn PlatformPaths) -> PathBuf {
    paths.log_dir().join("jsdebug.log")
}

/// The configured log file, or the platform default.
pub fn resolve_log_file(config: &Config, paths: &dyn PlatformPaths) -> PathBuf {
    config
        .log
        .file
        .clone()
        .unwrap_or_else(|| default_log_file_path(paths))
}

/// Filter directive for the subscriber. A non-empty `env_override` wins
/// over the configured level.
pub fn filter_directive(level: &LogLevel, env_override: Option<&str>) -> String {
    match env_override.map(str::trim) {
        Some(directive) if !directive.is_empty() => directive.to_string(),
        _ => level.as_str().to_string(),
    }
}

/// Create the parent directory of `log_path` if needed.
pub fn ensure_log_dir(log_path: &Path) -> io::Result<()> {
    match log_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Rotate `log_path` once it reaches `max_size` bytes.
///
/// `jsdebug.log` becomes `jsdebug.log.1`, every `.N` shifts to `.N+1`, and
/// `.max_files` is dropped. A missing or small file is left alone.
pub fn rotate_log_files(log_path: &Path, max_size: u64, max_files: u32) -> io::Result<()> {
    let size = match fs::metadata(log_path) {
        Ok(metadata) => metadata.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if size < max_size || max_files == 0 {
        return Ok(());
    }

    let oldest = rotated_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for index in (1..max_files).rev() {
        let from = rotated_path(log_path, index);
        if from.exists() {
            fs::rename(&from, rotated_path(log_path, index + 1))?;
        }
    }
    fs::rename(log_path, rotated_path(log_path, 1))
}

fn rotated_path(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}
