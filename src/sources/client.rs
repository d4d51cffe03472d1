// src/sources/client.rs
use crate::utils::error::SourceError;
use reqwest::header;
use std::time::Duration;

const USER_AGENT: &str = concat!("fin-metrics/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Raw body of a downloaded document with its declared content type.
#[derive(Debug)]
pub struct Downloaded {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Creates a reqwest client configured for document downloads.
fn build_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
}

/// Returns true for inputs that should be fetched over HTTP.
pub fn is_url(input: &str) -> bool {
    let lower = input.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Downloads a document from its URL.
pub async fn download_document(url: &str) -> Result<Downloaded, SourceError> {
    let client = build_client()?;

    tracing::info!("Downloading document from: {}", url);

    let response = client
        .get(url)
        .header(header::ACCEPT, "application/pdf,text/html,text/plain,*/*")
        .send()
        .await?; // Propagates reqwest::Error as SourceError::Network

    let status = response.status();
    if !status.is_success() {
        tracing::error!("HTTP error status: {} for URL: {}", status, url);
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(SourceError::Forbidden(url.to_string()));
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(url.to_string()));
        }
        return Err(SourceError::Http(status));
    }

    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let bytes = response.bytes().await?.to_vec();
    tracing::debug!("Downloaded {} bytes from {} ({:?})", bytes.len(), url, content_type);

    Ok(Downloaded { bytes, content_type })
}
