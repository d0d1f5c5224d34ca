//! Remote documents as seen by the client

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Numeric identifier assigned by the server
pub type DocumentId = u64;

/// A document on the server.
///
/// Only the fields needed for synchronization are kept. The client never
/// edits them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Stable primary key
    pub id: DocumentId,
    /// File name of the uploaded original
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_file_name: Option<String>,
    /// File name of the archived (OCR'd) version, if the server produced one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_file_name: Option<String>,
}

impl Document {
    /// Create a document with no file names
    #[must_use]
    pub fn new(id: DocumentId) -> Self {
        Self {
            id,
            original_file_name: None,
            archived_file_name: None,
        }
    }

    /// Set the original file name
    #[must_use]
    pub fn with_original(mut self, name: impl Into<String>) -> Self {
        self.original_file_name = Some(name.into());
        self
    }

    /// Set the archived file name
    #[must_use]
    pub fn with_archived(mut self, name: impl Into<String>) -> Self {
        self.archived_file_name = Some(name.into());
        self
    }

    /// All file names this document may occupy on disk
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.original_file_name
            .as_deref()
            .into_iter()
            .chain(self.archived_file_name.as_deref())
            .filter(|name| !name.is_empty())
    }
}

/// Collect the ids of the given documents, preserving order
#[must_use]
pub fn document_ids(docs: &[Document]) -> Vec<DocumentId> {
    docs.iter().map(|d| d.id).collect()
}

/// Which variant of the documents a bulk download contains
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Content {
    /// Archived (OCR'd PDF/A) versions
    #[default]
    Archive,
    /// Originally uploaded files
    Originals,
    /// Both variants, in separate folders
    Both,
}

impl Content {
    /// All variants, in the order shown to users
    pub const ALL: [Self; 3] = [Self::Archive, Self::Originals, Self::Both];

    /// Wire name used by the API
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Archive => "archive",
            Self::Originals => "originals",
            Self::Both => "both",
        }
    }
}

impl fmt::Display for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Content {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<_> = Self::ALL.iter().map(Content::as_str).collect();
                format!("must be one of [{}]", names.join(", "))
            })
    }
}
