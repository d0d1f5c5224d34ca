//! papersync-client: Paperless REST client
//!
//! Implements the core's [`DocumentSource`] and [`Uploader`] seams on top of
//! `reqwest`.

pub mod download;
pub mod error;
pub mod query;
pub mod upload;

use std::path::Path;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{RequestBuilder, Response, StatusCode};

use papersync_core::{Content, Document, DocumentId, DocumentQuery, DocumentSource, UploadParams, Uploader};

pub use error::{ClientError, Result};
pub use query::QueryResult;

/// Credentials sent with every request
#[derive(Clone)]
enum Auth {
    Token(String),
    Basic { username: String, password: String },
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token(_) => f.write_str("Token(***)"),
            Self::Basic { username, .. } => write!(f, "Basic({username}:***)"),
        }
    }
}

/// Client for one Paperless instance
#[derive(Debug, Clone)]
pub struct PaperlessClient {
    http: reqwest::Client,
    url: String,
    auth: Auth,
}

impl PaperlessClient {
    /// Create a client for the server at `url`.
    ///
    /// Without a username `password_or_token` is sent as an API token,
    /// otherwise as the password for HTTP basic auth.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: &str, username: Option<&str>, password_or_token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("papersync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let auth = match username.filter(|u| !u.is_empty()) {
            None => Auth::Token(password_or_token.to_string()),
            Some(username) => Auth::Basic {
                username: username.to_string(),
                password: password_or_token.to_string(),
            },
        };

        Ok(Self {
            http,
            url: url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    /// Base URL without trailing slash
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Auth::Token(token) => builder.header(AUTHORIZATION, format!("Token {token}")),
            Auth::Basic { username, password } => builder.basic_auth(username, Some(password)),
        }
    }
}

/// Pass through a 200 response, turn anything else into an error
async fn expect_ok(resp: Response) -> Result<Response> {
    match resp.status() {
        StatusCode::OK => Ok(resp),
        StatusCode::UNAUTHORIZED => Err(ClientError::Unauthorized),
        status => {
            let body = resp.text().await.unwrap_or_default();
            Err(ClientError::Status { status, body })
        }
    }
}

#[async_trait]
impl DocumentSource for PaperlessClient {
    async fn list_documents(&self, query: &DocumentQuery) -> color_eyre::Result<Vec<Document>> {
        Ok(self.query_documents(query).await?)
    }

    async fn bulk_download(
        &self,
        ids: &[DocumentId],
        content: Content,
        sink: &Path,
    ) -> color_eyre::Result<()> {
        Ok(self.download_documents(ids, content, sink).await?)
    }
}

#[async_trait]
impl Uploader for PaperlessClient {
    async fn upload(&self, path: &Path, params: &UploadParams) -> color_eyre::Result<()> {
        Ok(self.upload_document(path, params).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let client = PaperlessClient::new("http://paperless:8000/", None, "t").unwrap();
        assert_eq!(client.url(), "http://paperless:8000");
        assert_eq!(
            client.endpoint("/api/documents/"),
            "http://paperless:8000/api/documents/"
        );
    }

    #[test]
    fn test_empty_username_means_token_auth() {
        let client = PaperlessClient::new("http://localhost", Some(""), "secret").unwrap();
        assert!(matches!(client.auth, Auth::Token(ref t) if t == "secret"));

        let client = PaperlessClient::new("http://localhost", Some("me"), "pw").unwrap();
        assert!(matches!(client.auth, Auth::Basic { ref username, .. } if username == "me"));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let client = PaperlessClient::new("http://localhost", Some("me"), "hunter2").unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("hunter2"), "{debug}");
        assert!(debug.contains("me"), "{debug}");
    }
}
