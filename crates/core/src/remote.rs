//! Seams to the document server
//!
//! The engine only needs three operations from the server. They are traits so
//! the drivers can run against an in-memory server in tests.

use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use color_eyre::Result;

use crate::document::{Content, Document, DocumentId};

/// Options for listing documents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentQuery {
    /// Ask the server to shorten the content field
    pub truncate_content: bool,
    /// Sort key
    pub ordering: String,
    /// Documents per page
    pub page_size: u32,
}

impl Default for DocumentQuery {
    fn default() -> Self {
        Self {
            truncate_content: true,
            ordering: "id".to_string(),
            page_size: 100,
        }
    }
}

/// Metadata attached to an uploaded file. Empty fields are not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadParams {
    pub title: Option<String>,
    pub created: Option<NaiveDate>,
    pub correspondent: Option<String>,
    pub document_type: Option<String>,
    pub tags: Vec<String>,
}

/// Read access to the server's documents
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// List every document, following pagination to the end
    async fn list_documents(&self, query: &DocumentQuery) -> Result<Vec<Document>>;

    /// Download the given documents as one zip archive written to `sink`
    async fn bulk_download(&self, ids: &[DocumentId], content: Content, sink: &Path)
    -> Result<()>;
}

/// Write access to the server
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Upload a local file as a new document
    async fn upload(&self, path: &Path, params: &UploadParams) -> Result<()>;
}
