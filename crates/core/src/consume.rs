//! Drop-box consumption: upload every file that lands in a directory
//!
//! ```text
//! initial scan ─┐
//!               ├─→ DedupQueue ─→ upload ─→ delete local file
//! watcher ──────┘
//! ```
//!
//! A failed upload leaves the file in place; it is picked up again by the
//! next notification for it or the next run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use color_eyre::Result;
use color_eyre::eyre::WrapErr as _;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::queue::DedupQueue;
use crate::remote::{UploadParams, Uploader};
use crate::watch::watch_dir;

/// What happened to one consumed file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Uploaded and removed locally
    Uploaded,
    /// Uploaded, but the local file could not be removed
    DeleteFailed,
    /// Upload failed, file kept for a later attempt
    UploadFailed,
    /// Not a regular file (anymore)
    Skipped,
}

/// Upload `path` and remove it on success
pub async fn upload_and_remove<U>(uploader: &U, path: &Path, params: &UploadParams) -> UploadOutcome
where
    U: Uploader + ?Sized,
{
    if !path.is_file() {
        debug!(file = %path.display(), "Skipping, not a regular file");
        return UploadOutcome::Skipped;
    }

    debug!(file = %path.display(), "Uploading file...");
    if let Err(e) = uploader.upload(path, params).await {
        let reason = format!("{e:#}");
        error!(file = %path.display(), error = %reason, "Could not upload file");
        return UploadOutcome::UploadFailed;
    }

    if let Err(e) = std::fs::remove_file(path) {
        warn!(
            file = %path.display(),
            error = %e,
            "Could not delete file, this might be re-uploaded later again"
        );
        return UploadOutcome::DeleteFailed;
    }

    info!(file = %path.display(), "File uploaded");
    UploadOutcome::Uploaded
}

/// Regular files directly inside `dir`, sorted by name
///
/// # Errors
/// Returns an error if the directory cannot be listed.
pub fn scan_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Cannot read directory entry");
                continue;
            }
        };
        if entry.file_type().is_ok_and(|t| t.is_file()) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Upload files from `dir` until `cancel` fires.
///
/// Files already present are uploaded first, then every file that appears
/// and stays quiet for `quiet`. An upload in progress when `cancel` fires is
/// finished before this returns.
///
/// # Errors
/// Fails if the directory cannot be watched or listed.
pub async fn consume_dir(
    uploader: Arc<dyn Uploader>,
    dir: &Path,
    quiet: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    info!(dir = %dir.display(), "Start consuming directory");

    let queue = DedupQueue::<PathBuf>::new();
    let consumer = queue.subscribe(cancel.clone(), move |path: PathBuf| {
        let uploader = Arc::clone(&uploader);
        async move {
            upload_and_remove(uploader.as_ref(), &path, &UploadParams::default()).await;
        }
    })?;

    // Watch before scanning so nothing slips in between; the queue folds the overlap
    let producer = queue.clone();
    let watcher = watch_dir(dir, quiet, cancel.clone(), move |path| {
        producer.put(path);
    })
    .wrap_err("cannot watch consumption dir")?;

    let existing = scan_dir(dir).wrap_err("cannot walk consumption dir")?;
    debug!(count = existing.len(), "Queueing existing files");
    for path in existing {
        queue.put(path);
    }
    drop(queue);

    cancel.cancelled().await;
    info!("Stopping consumption");
    watcher.join().await;
    consumer.await.wrap_err("upload task failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        uploaded: Mutex<Vec<PathBuf>>,
        reject: bool,
    }

    #[async_trait]
    impl Uploader for Recorder {
        async fn upload(&self, path: &Path, _params: &UploadParams) -> Result<()> {
            if self.reject {
                color_eyre::eyre::bail!("request failed with status code 500");
            }
            self.uploaded.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_upload_removes_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("scan.pdf");
        std::fs::write(&file, "x").unwrap();

        let recorder = Recorder::default();
        let outcome = upload_and_remove(&recorder, &file, &UploadParams::default()).await;

        assert_eq!(outcome, UploadOutcome::Uploaded);
        assert!(!file.exists());
        assert_eq!(*recorder.uploaded.lock().unwrap(), vec![file]);
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("scan.pdf");
        std::fs::write(&file, "x").unwrap();

        let recorder = Recorder {
            reject: true,
            ..Recorder::default()
        };
        let outcome = upload_and_remove(&recorder, &file, &UploadParams::default()).await;

        assert_eq!(outcome, UploadOutcome::UploadFailed);
        assert!(file.exists());
    }

    #[tokio::test]
    async fn test_vanished_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        let recorder = Recorder::default();

        let outcome =
            upload_and_remove(&recorder, &dir.path().join("gone.pdf"), &UploadParams::default())
                .await;

        assert_eq!(outcome, UploadOutcome::Skipped);
        assert!(recorder.uploaded.lock().unwrap().is_empty());
    }

    /// Uploads fine, then leaves a directory where the file was
    struct ReplaceWithDir;

    #[async_trait]
    impl Uploader for ReplaceWithDir {
        async fn upload(&self, path: &Path, _params: &UploadParams) -> Result<()> {
            std::fs::remove_file(path)?;
            std::fs::create_dir(path)?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_delete_failure_after_upload() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("scan.pdf");
        std::fs::write(&file, "x").unwrap();

        let outcome = upload_and_remove(&ReplaceWithDir, &file, &UploadParams::default()).await;

        assert_eq!(outcome, UploadOutcome::DeleteFailed);
        assert!(file.is_dir());
    }

    #[test]
    fn test_scan_dir_top_level_files_only() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.pdf"), "x").unwrap();
        std::fs::write(dir.path().join("a.pdf"), "x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/nested.pdf"), "x").unwrap();

        let files = scan_dir(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("a.pdf"), dir.path().join("b.pdf")]);
    }
}
