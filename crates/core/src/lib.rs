//! papersync-core: Directory consumption and incremental sync engine
//!
//! Provides the debounced directory watcher, the deduplicating upload queue,
//! the local document inventory and the reconciliation against a server
//! listing, plus the drivers that wire them to a document server.

pub mod archive;
pub mod config;
pub mod consume;
pub mod document;
pub mod download;
pub mod error;
pub mod inventory;
pub mod queue;
pub mod reconcile;
pub mod remote;
pub mod watch;

pub use config::Config;
pub use consume::{UploadOutcome, consume_dir, upload_and_remove};
pub use document::{Content, Document, DocumentId};
pub use download::{DownloadOptions, DownloadSummary, bulk_download};
pub use error::{Error, Result};
pub use inventory::Inventory;
pub use queue::DedupQueue;
pub use reconcile::{CleanupReport, Reconciliation, reconcile, remove_deleted_files};
pub use remote::{DocumentQuery, DocumentSource, UploadParams, Uploader};
pub use watch::{DirWatcher, watch_dir};
