//! Bulk download of documents as a zip archive

use std::path::Path;

use serde::Serialize;
use tokio::io::AsyncWriteExt as _;
use tracing::debug;

use papersync_core::{Content, DocumentId};

use crate::{ClientError, PaperlessClient, Result, expect_ok};

#[derive(Serialize)]
struct BulkDownloadRequest<'a> {
    content: Content,
    follow_formatting: bool,
    documents: &'a [DocumentId],
}

impl PaperlessClient {
    /// Download `ids` as one archive and stream it into `sink`
    ///
    /// # Errors
    /// Fails if the request is rejected or the archive cannot be written.
    pub async fn download_documents(
        &self,
        ids: &[DocumentId],
        content: Content,
        sink: &Path,
    ) -> Result<()> {
        let body = BulkDownloadRequest {
            content,
            follow_formatting: true,
            documents: ids,
        };
        debug!(count = ids.len(), %content, "Requesting bulk download");
        let request = self
            .http
            .post(self.endpoint("/api/documents/bulk_download/"))
            .json(&body);
        let mut resp = expect_ok(self.authorized(request).send().await?).await?;

        let mut out = tokio::fs::File::create(sink)
            .await
            .map_err(ClientError::io(format!("cannot create {}", sink.display())))?;
        let mut written = 0u64;
        while let Some(chunk) = resp.chunk().await? {
            out.write_all(&chunk)
                .await
                .map_err(ClientError::io("cannot write download"))?;
            written += chunk.len() as u64;
        }
        out.flush()
            .await
            .map_err(ClientError::io("cannot write download"))?;
        debug!(file = %sink.display(), bytes = written, "Wrote download content to file");
        Ok(())
    }
}
