//! Incremental reconciliation between the server and the local inventory
//!
//! The server is authoritative. Documents it lists that the inventory does not
//! know are *missing* and get downloaded; documents the inventory knows that the
//! server no longer lists are *deleted* and their local files get removed.
//!
//! Identity is the document id alone. A document whose content changes on the
//! server under the same id is not fetched again.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use tracing::{debug, warn};

use crate::document::{Document, DocumentId};
use crate::error::{Error, Result};
use crate::inventory::{INVENTORY_FILE, Inventory};

/// Outcome of comparing the server listing with the inventory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// On the server but not in the inventory, ascending by id
    pub missing: Vec<Document>,
    /// In the inventory but gone from the server, ascending by id
    pub deleted: Vec<Document>,
}

/// Diff the server listing against the inventory.
///
/// The listing order does not matter and duplicate ids collapse to one.
#[must_use]
pub fn reconcile(remote: &[Document], inventory: &Inventory) -> Reconciliation {
    let remote: BTreeMap<DocumentId, &Document> = remote.iter().map(|d| (d.id, d)).collect();

    let missing = remote
        .values()
        .filter(|doc| !inventory.contains(doc.id))
        .map(|doc| (*doc).clone())
        .collect();

    let deleted = inventory
        .get_all()
        .into_iter()
        .filter(|doc| !remote.contains_key(&doc.id))
        .collect();

    Reconciliation { missing, deleted }
}

impl Reconciliation {
    /// Check if there is nothing to do
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.deleted.is_empty()
    }

    /// Ids to request from the server
    #[must_use]
    pub fn missing_ids(&self) -> Vec<DocumentId> {
        self.missing.iter().map(|d| d.id).collect()
    }

    /// Ids whose local files should go
    #[must_use]
    pub fn deleted_ids(&self) -> Vec<DocumentId> {
        self.deleted.iter().map(|d| d.id).collect()
    }

    /// Drop deleted documents from the inventory
    pub fn forget_deleted(&self, inventory: &mut Inventory) {
        for doc in &self.deleted {
            inventory.remove(doc);
        }
    }

    /// Record missing documents as present. Call once they are on disk.
    pub fn record_downloaded(&self, inventory: &mut Inventory) {
        for doc in &self.missing {
            inventory.put(doc.clone());
        }
    }
}

/// Files touched by [`remove_deleted_files`]
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Files that were removed
    pub removed: Vec<PathBuf>,
    /// Files that matched but could not be removed
    pub failed: Vec<PathBuf>,
}

/// Remove every file under `dir` whose name belongs to a deleted document.
///
/// Matching is by bare file name against the document's original and archived
/// names, at any depth. A file that cannot be removed is logged and reported,
/// and the walk continues.
///
/// # Errors
/// Returns [`Error::CleanupWalk`] if the directory cannot be enumerated.
pub fn remove_deleted_files(dir: &Path, deleted: &[Document]) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();
    if deleted.is_empty() {
        return Ok(report);
    }

    let by_name: HashMap<&str, DocumentId> = deleted
        .iter()
        .flat_map(|doc| doc.file_names().map(move |name| (name, doc.id)))
        .collect();

    let walk_err = |source| Error::CleanupWalk {
        path: dir.to_path_buf(),
        source,
    };

    for result in WalkBuilder::new(dir).standard_filters(false).build() {
        let entry = result.map_err(walk_err)?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }

        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if name == INVENTORY_FILE {
            continue;
        }
        let Some(&id) = by_name.get(name) else {
            continue;
        };

        let path = entry.path();
        debug!(id, path = %path.display(), "Removing deleted document");
        match std::fs::remove_file(path) {
            Ok(()) => report.removed.push(path.to_path_buf()),
            Err(e) => {
                warn!(id, path = %path.display(), error = %e, "Could not remove deleted document");
                report.failed.push(path.to_path_buf());
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn docs(ids: &[DocumentId]) -> Vec<Document> {
        ids.iter().map(|&id| Document::new(id)).collect()
    }

    fn inventory_with(dir: &TempDir, ids: &[DocumentId]) -> Inventory {
        let mut inventory = Inventory::open(dir.path()).unwrap();
        for doc in docs(ids) {
            inventory.put(doc);
        }
        inventory
    }

    #[test]
    fn test_missing_and_deleted() {
        let dir = TempDir::new().unwrap();
        let inventory = inventory_with(&dir, &[2, 3, 4]);

        let result = reconcile(&docs(&[1, 2, 3]), &inventory);
        assert_eq!(result.missing_ids(), vec![1]);
        assert_eq!(result.deleted_ids(), vec![4]);
    }

    #[test]
    fn test_equal_sets_are_empty() {
        let dir = TempDir::new().unwrap();
        let inventory = inventory_with(&dir, &[1, 2, 3]);

        let result = reconcile(&docs(&[3, 1, 2]), &inventory);
        assert!(result.is_empty());
    }

    #[test]
    fn test_empty_inventory_misses_everything() {
        let dir = TempDir::new().unwrap();
        let mut inventory = inventory_with(&dir, &[]);

        let result = reconcile(&docs(&[20, 10]), &inventory);
        assert_eq!(result.missing_ids(), vec![10, 20]);
        assert!(result.deleted.is_empty());

        result.record_downloaded(&mut inventory);
        let ids: Vec<_> = inventory.get_all().iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![10, 20]);
    }

    #[test]
    fn test_order_independent_and_deduplicated() {
        let dir = TempDir::new().unwrap();
        let inventory = inventory_with(&dir, &[9, 5]);

        let a = reconcile(&docs(&[7, 1, 7, 3]), &inventory);
        let b = reconcile(&docs(&[3, 7, 1]), &inventory);
        assert_eq!(a, b);
        assert_eq!(a.missing_ids(), vec![1, 3, 7]);
        assert_eq!(a.deleted_ids(), vec![5, 9]);
    }

    #[test]
    fn test_second_pass_is_empty() {
        let dir = TempDir::new().unwrap();
        let mut inventory = inventory_with(&dir, &[2, 3, 4]);
        let remote = docs(&[1, 2, 3]);

        let first = reconcile(&remote, &inventory);
        first.forget_deleted(&mut inventory);
        first.record_downloaded(&mut inventory);
        assert!(reconcile(&remote, &inventory).is_empty());
    }

    #[test]
    fn test_remove_deleted_files_by_name() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("archive/2023")).unwrap();
        fs::write(dir.path().join("archive/2023/gone.pdf"), "x").unwrap();
        fs::write(dir.path().join("gone-original.png"), "x").unwrap();
        fs::write(dir.path().join("keep.pdf"), "x").unwrap();
        fs::write(dir.path().join(INVENTORY_FILE), "{}").unwrap();

        let deleted = vec![
            Document::new(4)
                .with_archived("gone.pdf")
                .with_original("gone-original.png"),
        ];
        let report = remove_deleted_files(dir.path(), &deleted).unwrap();

        assert_eq!(report.removed.len(), 2);
        assert!(report.failed.is_empty());
        assert!(!dir.path().join("archive/2023/gone.pdf").exists());
        assert!(!dir.path().join("gone-original.png").exists());
        assert!(dir.path().join("keep.pdf").exists());
        assert!(dir.path().join(INVENTORY_FILE).exists());
    }

    #[test]
    fn test_remove_deleted_files_without_names() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("keep.pdf"), "x").unwrap();

        let report = remove_deleted_files(dir.path(), &docs(&[1])).unwrap();
        assert!(report.removed.is_empty());
        assert!(dir.path().join("keep.pdf").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_remove_failure_is_reported_and_walk_continues() {
        use std::os::unix::fs::PermissionsExt as _;

        let dir = TempDir::new().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("gone.pdf"), "x").unwrap();
        fs::write(dir.path().join("gone-original.png"), "x").unwrap();

        let deleted = vec![
            Document::new(4)
                .with_archived("gone.pdf")
                .with_original("gone-original.png"),
        ];

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o500)).unwrap();
        // Root ignores directory permissions, nothing to assert there
        let writable = tempfile::NamedTempFile::new_in(&locked).is_ok();
        let result = remove_deleted_files(dir.path(), &deleted);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o700)).unwrap();

        if writable {
            return;
        }
        let report = result.unwrap();
        assert_eq!(report.failed, vec![locked.join("gone.pdf")]);
        assert_eq!(report.removed, vec![dir.path().join("gone-original.png")]);
        assert!(locked.join("gone.pdf").exists());
        assert!(!dir.path().join("gone-original.png").exists());
    }

    #[test]
    fn test_remove_deleted_files_missing_dir() {
        let dir = TempDir::new().unwrap();
        let deleted = vec![Document::new(1).with_archived("a.pdf")];

        let err = remove_deleted_files(&dir.path().join("nope"), &deleted).unwrap_err();
        assert!(matches!(err, Error::CleanupWalk { .. }), "{err:?}");
    }
}
