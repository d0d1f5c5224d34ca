//! Paged document listing

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use papersync_core::{Document, DocumentQuery};

use crate::{ClientError, PaperlessClient, Result, expect_ok};

/// One page of `/api/documents/`
#[derive(Debug, Default, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub results: Vec<Document>,
    /// Absolute link to the next page, absent on the last one
    #[serde(default)]
    pub next: Option<String>,
}

impl QueryResult {
    /// Page number carried by the `next` link, `None` on the last page
    ///
    /// # Errors
    /// Returns [`ClientError::NextLink`] if the link has no usable `page` parameter.
    pub fn next_page(&self) -> Result<Option<u64>> {
        let Some(link) = self.next.as_deref().filter(|l| !l.is_empty()) else {
            return Ok(None);
        };
        let invalid = || ClientError::NextLink {
            link: link.to_string(),
        };

        let url = url::Url::parse(link).map_err(|_| invalid())?;
        let page = url
            .query_pairs()
            .find(|(key, _)| key == "page")
            .and_then(|(_, value)| value.parse().ok())
            .ok_or_else(invalid)?;
        Ok(Some(page))
    }
}

#[derive(Serialize)]
struct PageParams<'a> {
    truncate_content: bool,
    ordering: &'a str,
    page_size: u32,
    page: u64,
}

impl PaperlessClient {
    /// List all documents matching `query`, one request per page
    ///
    /// # Errors
    /// Fails on the first page that cannot be fetched or parsed.
    pub async fn query_documents(&self, query: &DocumentQuery) -> Result<Vec<Document>> {
        let mut documents = Vec::new();
        let mut page = 1;
        loop {
            let result = self.query_page(query, page).await?;
            let next = result.next_page()?;
            documents.extend(result.results);
            match next {
                // A link that does not advance would loop forever
                Some(next) if next > page => page = next,
                Some(_) => {
                    return Err(ClientError::NextLink {
                        link: result.next.unwrap_or_default(),
                    });
                }
                None => break,
            }
        }
        debug!(count = documents.len(), "Listed documents");
        Ok(documents)
    }

    async fn query_page(&self, query: &DocumentQuery, page: u64) -> Result<QueryResult> {
        let params = PageParams {
            truncate_content: query.truncate_content,
            ordering: &query.ordering,
            page_size: query.page_size,
            page,
        };
        debug!(page, "Requesting document page");
        let request = self.http.get(self.endpoint("/api/documents/")).query(&params);
        let resp = expect_ok(self.authorized(request).send().await?).await?;
        let result: QueryResult = resp.json().await?;
        trace!(page, results = result.results.len(), next = ?result.next, "Parsed page");
        Ok(result)
    }
}
