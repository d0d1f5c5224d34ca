//! Local inventory of downloaded documents
//!
//! Records which server documents have already been materialized in a
//! download directory, so that repeated incremental runs only fetch what is
//! new and only delete what disappeared.
//!
//! The whole inventory lives in memory between [`Inventory::open`] and
//! [`Inventory::close`]. Closing writes the complete set in one go through a
//! temporary file that is renamed over the old one, so an interrupted run
//! leaves the previous inventory intact.
//!
//! The store is not synchronized. It is meant for the single-threaded
//! reconciliation flow; share it across tasks only behind a lock.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::{Document, DocumentId};
use crate::error::{Error, Result};

/// Inventory file name inside the download directory
pub const INVENTORY_FILE: &str = ".metadata.json";

/// On-disk layout
#[derive(Debug, Default, Serialize, Deserialize)]
struct InventoryFile {
    #[serde(default)]
    documents: Vec<Document>,
}

/// Persisted map of document id to document metadata
#[derive(Debug)]
pub struct Inventory {
    documents: BTreeMap<DocumentId, Document>,
    path: PathBuf,
}

impl Inventory {
    /// Load the inventory stored in `dir`.
    ///
    /// A missing file yields an empty inventory.
    ///
    /// # Errors
    /// [`Error::InventoryRead`] if the file exists but cannot be read,
    /// [`Error::CorruptInventory`] if it cannot be parsed.
    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(INVENTORY_FILE);

        let file = match std::fs::read(&path) {
            Ok(raw) => serde_json::from_slice::<InventoryFile>(&raw).map_err(|source| {
                Error::CorruptInventory {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => InventoryFile::default(),
            Err(source) => return Err(Error::InventoryRead { path, source }),
        };

        let documents = file.documents.into_iter().map(|d| (d.id, d)).collect();
        debug!(path = %path.display(), "Opened inventory");
        Ok(Self { documents, path })
    }

    /// Path of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up a document by id
    #[must_use]
    pub fn find_by_id(&self, id: DocumentId) -> Option<&Document> {
        self.documents.get(&id)
    }

    /// Check whether a document id is recorded
    #[must_use]
    pub fn contains(&self, id: DocumentId) -> bool {
        self.documents.contains_key(&id)
    }

    /// All documents, ascending by id
    #[must_use]
    pub fn get_all(&self) -> Vec<Document> {
        self.documents.values().cloned().collect()
    }

    /// Number of recorded documents
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Insert or replace by id
    pub fn put(&mut self, doc: Document) {
        self.documents.insert(doc.id, doc);
    }

    /// Remove by id. Unknown ids are ignored.
    pub fn remove(&mut self, doc: &Document) {
        self.documents.remove(&doc.id);
    }

    /// Write the full inventory back to disk.
    ///
    /// # Errors
    /// Returns [`Error::Persistence`] if the file cannot be written. The
    /// previous file is left untouched in that case.
    pub fn close(self) -> Result<()> {
        let persist_err = |source: std::io::Error| Error::Persistence {
            path: self.path.clone(),
            source,
        };

        let file = InventoryFile {
            documents: self.get_all(),
        };
        let bytes = serde_json::to_vec(&file).map_err(|e| persist_err(e.into()))?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(persist_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(persist_err)?;
        tmp.write_all(&bytes).map_err(persist_err)?;
        tmp.as_file().sync_all().map_err(persist_err)?;
        tmp.persist(&self.path).map_err(|e| persist_err(e.error))?;

        debug!(path = %self.path.display(), count = file.documents.len(), "Saved inventory");
        Ok(())
    }
}
