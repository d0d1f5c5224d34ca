//! Bulk download, plain or incremental
//!
//! In incremental mode the inventory in the target directory decides what to
//! fetch: only documents the inventory does not know are requested, and local
//! files of documents that vanished from the server are removed.

use std::path::{Path, PathBuf};

use color_eyre::Result;
use color_eyre::eyre::WrapErr as _;
use tracing::{debug, info};

use crate::archive;
use crate::document::{Content, DocumentId, document_ids};
use crate::error::Error;
use crate::inventory::Inventory;
use crate::reconcile::{CleanupReport, reconcile, remove_deleted_files};
use crate::remote::{DocumentQuery, DocumentSource};

/// Default target when unzipping
pub const DEFAULT_TARGET_DIR: &str = "documents";

/// Default target when keeping the archive
pub const DEFAULT_TARGET_ARCHIVE: &str = "documents.zip";

/// How and where to download
#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    /// Target file or directory; a default name in the working directory when absent
    pub target: Option<PathBuf>,
    /// Document variant to fetch
    pub content: Content,
    /// Unpack the archive into the target directory
    pub unzip: bool,
    /// Replace an existing target
    pub overwrite: bool,
    /// Only fetch what the inventory lacks. Implies `unzip` and `overwrite`.
    pub incremental: bool,
}

impl DownloadOptions {
    /// Apply the flags implied by `incremental`
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.incremental {
            self.unzip = true;
            self.overwrite = true;
        }
        self
    }

    /// Resolved target path
    #[must_use]
    pub fn target_path(&self) -> PathBuf {
        match &self.target {
            Some(target) => target.clone(),
            None if self.unzip => PathBuf::from(DEFAULT_TARGET_DIR),
            None => PathBuf::from(DEFAULT_TARGET_ARCHIVE),
        }
    }

    /// Directory the archive is unpacked into
    #[must_use]
    pub fn extract_dir(&self) -> PathBuf {
        let target = self.target_path();
        match self.content {
            Content::Archive | Content::Originals => target.join(self.content.as_str()),
            Content::Both => target,
        }
    }
}

/// What a download run did
#[derive(Debug, Default)]
pub struct DownloadSummary {
    /// Documents listed by the server
    pub listed: usize,
    /// Ids requested in the bulk download
    pub downloaded: Vec<DocumentId>,
    /// Ids dropped from the inventory
    pub deleted: Vec<DocumentId>,
    /// Local files removed for dropped documents
    pub cleanup: CleanupReport,
    /// Where the documents ended up, if anything was downloaded
    pub destination: Option<PathBuf>,
}

/// Make sure the target can be written.
///
/// With `overwrite` an existing target is removed, except in incremental mode
/// where it is reused. Without `overwrite` an existing target is an error.
///
/// # Errors
/// Returns [`Error::Target`] if the target exists or cannot be removed.
pub fn prepare_target(opts: &DownloadOptions) -> Result<(), Error> {
    let target = opts.target_path();
    let target_err = |reason: String| Error::Target {
        path: target.clone(),
        reason,
    };

    let metadata = match std::fs::symlink_metadata(&target) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(target_err(e.to_string())),
    };

    if !opts.overwrite {
        return Err(target_err("target exists, abort".to_string()));
    }
    if opts.incremental {
        return Ok(());
    }

    debug!(target = %target.display(), "Removing existing target");
    let removed = if metadata.is_dir() {
        std::fs::remove_dir_all(&target)
    } else {
        std::fs::remove_file(&target)
    };
    removed.map_err(|e| target_err(e.to_string()))
}

/// Download documents from `source` according to `opts`.
///
/// # Errors
/// Fails if the target cannot be prepared, the listing or the download fails,
/// the archive cannot be stored, or the inventory cannot be read or saved.
/// On failure the inventory on disk is left as it was.
pub async fn bulk_download<S>(source: &S, opts: &DownloadOptions) -> Result<DownloadSummary>
where
    S: DocumentSource + ?Sized,
{
    let opts = opts.clone().normalized();
    let target = opts.target_path();
    prepare_target(&opts)?;

    info!("Getting list of documents");
    let documents = source
        .list_documents(&DocumentQuery::default())
        .await
        .wrap_err("cannot list documents")?;

    let mut summary = DownloadSummary {
        listed: documents.len(),
        ..DownloadSummary::default()
    };

    if !opts.incremental {
        let ids = document_ids(&documents);
        if ids.is_empty() {
            info!("Nothing to download");
            return Ok(summary);
        }
        summary.destination = Some(fetch(source, &opts, &ids).await?);
        summary.downloaded = ids;
        return Ok(summary);
    }

    debug!(dir = %target.display(), "Opening inventory");
    let mut inventory = Inventory::open(&target)?;
    let plan = reconcile(&documents, &inventory);
    info!(
        missing = plan.missing.len(),
        deleted = plan.deleted.len(),
        "Compared with local inventory"
    );

    plan.forget_deleted(&mut inventory);
    summary.cleanup = remove_deleted_files(&target, &plan.deleted)
        .wrap_err("cannot delete local documents")?;
    summary.deleted = plan.deleted_ids();
    info!(count = plan.deleted.len(), "Cleaned up deleted documents");

    if plan.missing.is_empty() {
        info!("Nothing to download");
    } else {
        let ids = plan.missing_ids();
        summary.destination = Some(fetch(source, &opts, &ids).await?);
        plan.record_downloaded(&mut inventory);
        summary.downloaded = ids;
    }

    debug!("Saving inventory");
    inventory.close()?;
    Ok(summary)
}

/// Download `ids` into a temporary file next to the target, then unpack or move it
async fn fetch<S>(source: &S, opts: &DownloadOptions, ids: &[DocumentId]) -> Result<PathBuf>
where
    S: DocumentSource + ?Sized,
{
    let target = opts.target_path();
    let staging = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(staging)
        .wrap_err_with(|| format!("cannot create directory {}", staging.display()))?;

    // Removed on drop unless persisted
    let tmp = tempfile::Builder::new()
        .prefix(".papersync-bulk-download-")
        .tempfile_in(staging)
        .wrap_err("cannot open temporary file")?;

    info!(count = ids.len(), "Downloading documents");
    source
        .bulk_download(ids, opts.content, tmp.path())
        .await
        .wrap_err("could not download documents")?;

    if opts.unzip {
        let dest = opts.extract_dir();
        let files = archive::extract(tmp.path(), &dest)?;
        info!(dir = %dest.display(), files, "Unzipped archive to dir");
        return Ok(dest);
    }

    tmp.persist(&target)
        .map_err(|e| e.error)
        .wrap_err("cannot move temp file")?;
    info!(file = %target.display(), "Downloaded zip archive");
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn opts(target: &Path) -> DownloadOptions {
        DownloadOptions {
            target: Some(target.to_path_buf()),
            ..DownloadOptions::default()
        }
    }

    #[test]
    fn test_incremental_implies_unzip_and_overwrite() {
        let opts = DownloadOptions {
            incremental: true,
            ..DownloadOptions::default()
        }
        .normalized();
        assert!(opts.unzip);
        assert!(opts.overwrite);
    }

    #[test]
    fn test_default_target_names() {
        let mut opts = DownloadOptions::default();
        assert_eq!(opts.target_path(), PathBuf::from("documents.zip"));
        opts.unzip = true;
        assert_eq!(opts.target_path(), PathBuf::from("documents"));
    }

    #[test]
    fn test_extract_dir_per_content() {
        let mut opts = opts(Path::new("mirror"));
        assert_eq!(opts.extract_dir(), PathBuf::from("mirror/archive"));
        opts.content = Content::Originals;
        assert_eq!(opts.extract_dir(), PathBuf::from("mirror/originals"));
        opts.content = Content::Both;
        assert_eq!(opts.extract_dir(), PathBuf::from("mirror"));
    }

    #[test]
    fn test_prepare_target_missing_is_ok() {
        let dir = TempDir::new().unwrap();
        prepare_target(&opts(&dir.path().join("documents.zip"))).unwrap();
    }

    #[test]
    fn test_prepare_target_existing_aborts() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("documents.zip");
        std::fs::write(&target, "zip").unwrap();

        let err = prepare_target(&opts(&target)).unwrap_err();
        assert!(matches!(err, Error::Target { .. }), "{err:?}");
        assert!(target.exists());
    }

    #[test]
    fn test_prepare_target_overwrite_removes_dir() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("documents");
        std::fs::create_dir_all(target.join("archive")).unwrap();
        std::fs::write(target.join("archive/a.pdf"), "x").unwrap();

        let opts = DownloadOptions {
            overwrite: true,
            ..opts(&target)
        };
        prepare_target(&opts).unwrap();
        assert!(!target.exists());
    }

    #[test]
    fn test_prepare_target_incremental_keeps_dir() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("documents");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("a.pdf"), "x").unwrap();

        let opts = DownloadOptions {
            incremental: true,
            ..opts(&target)
        }
        .normalized();
        prepare_target(&opts).unwrap();
        assert!(target.join("a.pdf").exists());
    }
}
