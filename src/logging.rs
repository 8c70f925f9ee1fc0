//! Process-wide logger and access to the log file it writes.
//!
//! Everything logged through `tracing` goes to stdout and is appended, as
//! plain text, to a single log file. The HTTP layer reads and truncates that
//! same file through [`LogFile`].

use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber. `RUST_LOG` takes precedence over `level`.
pub fn init(log_path: &Path, level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    subscriber(log_path, env_filter)?
        .try_init()
        .context("a global logger is already installed")?;

    Ok(())
}

/// Console plus log-file subscriber, filtered by `env_filter`.
pub fn subscriber(
    log_path: &Path,
    env_filter: EnvFilter,
) -> Result<impl tracing::Subscriber + Send + Sync + 'static> {
    let (dir, file_name) = split_log_path(log_path)?;
    // Rotation::NEVER keeps the file name exact and opens it in append mode.
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(dir)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_target(false)
        .with_ansi(false);

    let console_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_ansi(true);

    Ok(tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer))
}

fn split_log_path(log_path: &Path) -> Result<(PathBuf, String)> {
    let file_name = log_path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("log path {} has no file name", log_path.display()))?
        .to_string();
    let dir = match log_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, file_name))
}

/// Handle on the log file for the `/logs` and `/delete_logs` endpoints.
#[derive(Debug, Clone)]
pub struct LogFile {
    path: PathBuf,
}

impl LogFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entire contents; a log that was never written reads as empty.
    pub async fn read(&self) -> std::io::Result<String> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e),
        }
    }

    /// Empties the file in place. The appender writes in append mode, so it
    /// carries on at the new end of file.
    pub async fn truncate(&self) -> std::io::Result<()> {
        tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .await?;
        Ok(())
    }
}
