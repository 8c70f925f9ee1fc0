//! Scratch storage for uploaded images.
//!
//! An upload lives on disk only for as long as its [`ScratchFile`] handle:
//! dropping the handle deletes the file, whichever way the caption request
//! ends. Anything that still slips through (a crash mid-request) is reaped
//! by [`UploadDir::sweep`] at the next start.

use anyhow::Result;
use chrono::{DateTime, Local};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::engine::CaptionEngine;

#[derive(Debug, Clone)]
pub struct UploadDir {
    root: PathBuf,
}

/// An upload on disk, removed when this handle is dropped.
#[derive(Debug)]
pub struct ScratchFile {
    name: String,
    path: PathBuf,
}

impl ScratchFile {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    // Blocking unlink on whichever thread drops the handle: one syscall per upload.
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => info!("Temporary file {} deleted.", self.name),
            // Swept or cleared while we were using it.
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Temporary file {} already gone", self.name)
            }
            Err(e) => warn!("Failed to delete temporary file {}: {}", self.name, e),
        }
    }
}

impl UploadDir {
    pub async fn create(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `bytes` under `<timestamp>_<original_name>`.
    ///
    /// Two uploads with the same original name in the same second share a
    /// scratch name; the later write replaces the earlier one.
    pub async fn store(&self, bytes: &[u8], original_name: &str) -> std::io::Result<ScratchFile> {
        let name = scratch_name(original_name, Local::now());
        let path = self.root.join(&name);

        // Take ownership before writing so a failed write leaves nothing behind.
        let scratch = ScratchFile { name, path };
        let mut file = tokio::fs::File::create(&scratch.path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;

        info!("Image successfully saved to {}", scratch.path.display());
        Ok(scratch)
    }

    /// Deletes every file whose modification time is more than `max_age` ago.
    pub async fn sweep(&self, max_age: Duration) -> std::io::Result<usize> {
        info!("Cleaning up files older than {}s", max_age.as_secs());
        let now = SystemTime::now();
        let mut removed = 0;

        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Skipping {:?} during cleanup: {}", entry.file_name(), e);
                    continue;
                }
            };

            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());
            match age {
                Some(age) if age > max_age => {}
                _ => continue,
            }

            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {
                    removed += 1;
                    info!("Deleted old file: {:?}", entry.file_name());
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to delete old file {:?}: {}", entry.file_name(), e),
            }
        }

        Ok(removed)
    }

    /// Names of the files currently in the directory, sorted.
    pub async fn list(&self) -> std::io::Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Path of the named file, if it is a plain file name that exists here.
    pub async fn resolve(&self, filename: &str) -> Option<PathBuf> {
        if !is_plain_file_name(filename) {
            return None;
        }
        let path = self.root.join(filename);
        match tokio::fs::metadata(&path).await {
            Ok(m) if m.is_file() => Some(path),
            _ => None,
        }
    }

    /// Deletes every file in the directory.
    pub async fn clear(&self) -> std::io::Result<usize> {
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {
                    removed += 1;
                    info!("Deleted file: {:?}", entry.file_name());
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(removed)
    }
}

/// Runs the engine on `file`, then deletes it.
pub async fn caption_and_cleanup(file: ScratchFile, engine: &dyn CaptionEngine) -> Result<String> {
    let result = engine.caption(file.path()).await;
    drop(file);
    result
}

/// Longest single path component most filesystems accept, in bytes.
const MAX_NAME_BYTES: usize = 255;

fn scratch_name(original_name: &str, now: DateTime<Local>) -> String {
    let prefix = now.format("%Y%m%d_%H%M%S_").to_string();
    // Sanitizing only removes characters, so shortening first keeps the extension.
    let mut safe = sanitize_filename::sanitize(shorten(original_name, MAX_NAME_BYTES - prefix.len()));
    if safe.is_empty() {
        safe = "upload".to_string();
    }
    format!("{}{}", prefix, safe)
}

/// Cuts `name` to at most `max` bytes on a char boundary, keeping a short
/// extension intact.
fn shorten(name: &str, max: usize) -> String {
    if name.len() <= max {
        return name.to_string();
    }
    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 && name.len() - dot <= 16 => name.split_at(dot),
        _ => (name, ""),
    };

    let mut stem_end = max.saturating_sub(ext.len()).min(stem.len());
    while !stem.is_char_boundary(stem_end) {
        stem_end -= 1;
    }
    format!("{}{}", &stem[..stem_end], ext)
}

fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(first)), None) if first == name
    )
}
