//! Document upload through `post_document`

use std::path::Path;

use reqwest::multipart::{Form, Part};
use tracing::debug;

use papersync_core::UploadParams;

use crate::{ClientError, PaperlessClient, Result, expect_ok};

/// Metadata fields in form order; empty values are left out
fn form_fields(params: &UploadParams) -> Vec<(&'static str, String)> {
    let mut fields = Vec::new();
    if let Some(created) = params.created {
        fields.push(("created", created.format("%Y-%m-%d").to_string()));
    }
    let optional = [
        ("correspondent", &params.correspondent),
        ("title", &params.title),
        ("document_type", &params.document_type),
    ];
    for (name, value) in optional {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            fields.push((name, value.to_string()));
        }
    }
    // Repeated once per tag
    for tag in &params.tags {
        fields.push(("tags", tag.clone()));
    }
    fields
}

impl PaperlessClient {
    /// Upload the file at `path` as a new document
    ///
    /// # Errors
    /// Returns [`ClientError::Unauthorized`] on 401, [`ClientError::Status`] on
    /// any other non-200 answer, or an I/O error if the file cannot be read.
    pub async fn upload_document(&self, path: &Path, params: &UploadParams) -> Result<()> {
        debug!(file = %path.display(), "Reading file");
        let bytes = tokio::fs::read(path)
            .await
            .map_err(ClientError::io(format!("cannot read source file {}", path.display())))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut form = Form::new().part("document", Part::bytes(bytes).file_name(file_name));
        for (name, value) in form_fields(params) {
            form = form.text(name, value);
        }

        debug!(file = %path.display(), "Sending upload request");
        let request = self
            .http
            .post(self.endpoint("/api/documents/post_document/"))
            .multipart(form);
        expect_ok(self.authorized(request).send().await?).await?;
        Ok(())
    }
}
