use fs_err as fs;
use std::env;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_NAME: &str = "media-presence.log";
const DEBUG_ENV: &str = "MEDIA_PRESENCE_DEBUG_LOG";
const KEEP_DAYS: u64 = 7;

/// Installs console and daily-rolling file logging.
///
/// The returned guard flushes the file writer on drop and must live as long
/// as the process. Without a usable log directory only the console layer is
/// installed.
pub fn init() -> Option<WorkerGuard> {
    let console_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    let Some(log_dir) = log_directory() else {
        tracing_subscriber::registry()
            .with(env_filter())
            .with(console_layer)
            .init();
        tracing::warn!("No log directory available; logging to console only");
        return None;
    };

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_NAME);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::debug!(dir = %log_dir.display(), "Logging initialized");
    cleanup_old_logs(&log_dir, KEEP_DAYS);
    Some(guard)
}

fn env_filter() -> EnvFilter {
    let debug_enabled = env::var(DEBUG_ENV)
        .map(|value| is_truthy(&value))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES")
}

fn log_directory() -> Option<PathBuf> {
    let dir = dirs::data_local_dir()?.join("media-presence").join("logs");
    match fs::create_dir_all(&dir) {
        Ok(()) => Some(dir),
        Err(err) => {
            eprintln!("Warning: {}", err);
            None
        }
    }
}

fn cleanup_old_logs(log_dir: &Path, keep_days: u64) {
    let Some(cutoff) =
        SystemTime::now().checked_sub(Duration::from_secs(keep_days * 24 * 60 * 60))
    else {
        return;
    };

    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(error = %err, "Failed to read log directory for cleanup");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let is_rolled = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(LOG_FILE_NAME) && name != LOG_FILE_NAME);
        if !is_rolled {
            continue;
        }

        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => continue,
        };
        if modified >= cutoff {
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed old log file"),
            Err(err) => tracing::warn!(error = %err, "Failed to remove old log file"),
        }
    }
}
