// src/fetch/client.rs
use super::{FetchedPage, PageFetcher};
use crate::utils::error::FetchError;
use reqwest::{header, Url};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = concat!("field-resolver/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, PartialEq)]
enum Source {
    Remote(Url),
    Local(PathBuf),
}

/// http(s) URLs go over the network; `file://` URLs and bare paths are read
/// from disk. Any other scheme is rejected.
fn classify(address: &str) -> Result<Source, FetchError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(FetchError::InvalidUrl("empty address".to_string()));
    }
    if let Some(path) = address.strip_prefix("file://") {
        return Ok(Source::Local(PathBuf::from(path)));
    }
    match Url::parse(address) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(Source::Remote(url)),
        // Single-letter schemes are Windows drive letters.
        Ok(url) if url.scheme().len() > 1 => Err(FetchError::InvalidUrl(address.to_string())),
        _ => Ok(Source::Local(PathBuf::from(address))),
    }
}

/// Fetches static HTML with a configured User-Agent. No rendering, so pages
/// carry geometry only if it is stamped into the markup.
#[derive(Debug, Clone)]
pub struct WebClient {
    client: reqwest::Client,
}

impl WebClient {
    pub fn new(user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        tracing::debug!("Using User-Agent: {}", user_agent);
        Ok(Self { client })
    }

    async fn download(&self, url: Url) -> Result<String, FetchError> {
        tracing::info!("Downloading page from: {}", url);
        let response = self
            .client
            .get(url.clone())
            .header(header::ACCEPT, "text/html,application/xhtml+xml,*/*;q=0.8")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!("HTTP error status: {} for URL: {}", status, url);
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(FetchError::NotFound(url.to_string()));
            }
            return Err(FetchError::Http(status));
        }

        let body = response.text().await?;
        tracing::debug!("Downloaded {} bytes from {}", body.len(), url);
        Ok(body)
    }

    async fn read_local(path: PathBuf) -> Result<String, FetchError> {
        match tokio::fs::read_to_string(&path).await {
            Ok(body) => {
                tracing::debug!("Read {} bytes from {}", body.len(), path.display());
                Ok(body)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FetchError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(FetchError::Io(e)),
        }
    }
}

impl PageFetcher for WebClient {
    async fn fetch(&self, address: &str) -> Result<FetchedPage, FetchError> {
        let html = match classify(address)? {
            Source::Remote(url) => self.download(url).await?,
            Source::Local(path) => Self::read_local(path).await?,
        };
        Ok(FetchedPage::new(address, html))
    }
}
