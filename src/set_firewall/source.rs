//! Acquisition of raw source lists over HTTP or from local files.

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;

use super::{Error, Result, option::SourceOption};

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY_MS: u64 = 1000;

/// Largest list body accepted (16 MB)
const MAX_LIST_SIZE: usize = 16 * 1024 * 1024;

/// Provides the raw lines of a remote source list
#[async_trait]
pub trait ListProvider: Send + Sync {
    async fn fetch(&self, source: &str) -> Result<Vec<String>>;
}

/// Fetches lists from the configured geo / Tor URLs
pub struct HttpProvider {
    client: Client,
    option: SourceOption,
}

impl HttpProvider {
    pub fn new(option: &SourceOption) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(option.timeout))
            .user_agent(format!("ipsetfw/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(HttpProvider {
            client,
            option: option.clone(),
        })
    }

    async fn fetch_with_retry(&self, source: &str, url: &str) -> Result<String> {
        let mut last_error = String::new();
        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = RETRY_DELAY_MS * (1 << (attempt - 1));
                debug!("FETCH [{}] RETRY {} AFTER {}ms", source, attempt, delay);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                // a missing list will not appear on retry
                Err(FetchError::Fatal(reason)) => return Err(acquisition(source, reason)),
                Err(FetchError::Retry(reason)) => last_error = reason,
            }
        }
        Err(acquisition(source, last_error))
    }

    async fn fetch_once(&self, url: &str) -> std::result::Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Retry(e.to_string()))?;
        let status = response.status();
        if status.is_client_error() {
            return Err(FetchError::Fatal(format!("HTTP {} from {}", status, url)));
        }
        if !status.is_success() {
            return Err(FetchError::Retry(format!("HTTP {} from {}", status, url)));
        }
        if response.content_length().unwrap_or(0) as usize > MAX_LIST_SIZE {
            return Err(FetchError::Fatal(format!(
                "list larger than {} bytes",
                MAX_LIST_SIZE
            )));
        }
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Retry(e.to_string()))?;
        if body.len() > MAX_LIST_SIZE {
            return Err(FetchError::Fatal(format!(
                "list larger than {} bytes",
                MAX_LIST_SIZE
            )));
        }
        Ok(body)
    }
}

enum FetchError {
    Retry(String),
    Fatal(String),
}

#[async_trait]
impl ListProvider for HttpProvider {
    async fn fetch(&self, source: &str) -> Result<Vec<String>> {
        let url = self.option.url_for(source);
        info!("FETCH [{}] FROM [{}]", source, url);
        let body = self.fetch_with_retry(source, &url).await?;
        let lines = split_lines(&body);
        info!("FETCH [{}] GOT [{}] LINES", source, lines.len());
        Ok(lines)
    }
}

fn acquisition(source: &str, reason: impl Into<String>) -> Error {
    Error::Acquisition {
        source_id: source.to_string(),
        reason: reason.into(),
    }
}

fn split_lines(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Read and concatenate local list files in order
pub fn read_list_files<P: AsRef<Path>>(source: &str, paths: &[P]) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let body = std::fs::read_to_string(path)
            .map_err(|e| acquisition(source, format!("{}: {}", path.display(), e)))?;
        let before = lines.len();
        lines.extend(split_lines(&body));
        debug!(
            "READ [{}] [{}] LINES FROM [{}]",
            source,
            lines.len() - before,
            path.display()
        );
    }
    Ok(lines)
}
