//! Errors raised by the synchronization engine

use std::path::PathBuf;

/// Failures of the core components.
///
/// Everything here is fatal for the run it occurs in. Per-item problems
/// (one upload, one file removal) are logged where they happen instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The notification backend could not be attached to the directory
    #[error("cannot watch directory {}", path.display())]
    WatchSetup {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// The inventory file exists but could not be read
    #[error("cannot read inventory {}", path.display())]
    InventoryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The inventory file is not valid JSON of the expected shape
    #[error("inventory {} is corrupt", path.display())]
    CorruptInventory {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The inventory could not be written back
    #[error("cannot save inventory {}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The download target could not be enumerated during cleanup
    #[error("cannot walk directory {}", path.display())]
    CleanupWalk {
        path: PathBuf,
        #[source]
        source: ignore::Error,
    },

    /// The download target is unusable
    #[error("cannot prepare target {}: {reason}", path.display())]
    Target { path: PathBuf, reason: String },

    /// A downloaded archive could not be unpacked
    #[error("cannot extract {} to {}", archive.display(), dest.display())]
    Extraction {
        archive: PathBuf,
        dest: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// An archive entry would be written outside the destination
    #[error("archive entry {name:?} escapes the destination directory")]
    UnsafeArchiveEntry { name: String },

    /// I/O while unpacking an archive
    #[error("cannot write {}", path.display())]
    ExtractionIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A queue accepts exactly one consumer
    #[error("queue already has a subscriber")]
    AlreadySubscribed,
}

/// Result alias for core operations
pub type Result<T, E = Error> = std::result::Result<T, E>;
