//! Snapshot loading: one fetch, one parse, lenient extraction.

use std::env;
use std::future::Future;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use crate::market::{extract_markets, MarketCollection};

pub const DEFAULT_DATA_SOURCE: &str = "http://127.0.0.1:8080/data.json";
pub const DEFAULT_LOAD_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("HTTP error! status: {0}")]
    HttpStatus(u16),
    #[error("response body is not valid JSON")]
    Malformed,
    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("{0}")]
    Unknown(String),
}

impl LoadError {
    pub fn kind(&self) -> &'static str {
        match self {
            LoadError::HttpStatus(_) => "http_status",
            LoadError::Malformed => "malformed",
            LoadError::Timeout { .. } => "timeout",
            LoadError::Unknown(_) => "unknown",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid PMT_LOAD_TIMEOUT_MS: {0}")]
    InvalidTimeout(String),
    #[error("http client build failed: {0}")]
    HttpClientBuild(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    Http(String),
    File(PathBuf),
}

impl DocumentSource {
    /// URLs with an http(s) scheme are fetched over the network; anything
    /// else is treated as a local snapshot path.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            DocumentSource::Http(trimmed.to_string())
        } else {
            DocumentSource::File(PathBuf::from(trimmed))
        }
    }

    pub fn label(&self) -> String {
        match self {
            DocumentSource::Http(url) => url.clone(),
            DocumentSource::File(path) => path.display().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    pub source: DocumentSource,
    pub timeout_ms: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            source: DocumentSource::parse(DEFAULT_DATA_SOURCE),
            timeout_ms: DEFAULT_LOAD_TIMEOUT_MS,
        }
    }
}

pub fn loader_config_from_env() -> Result<LoaderConfig, ConfigError> {
    let mut config = LoaderConfig::default();

    if let Ok(source) = env::var("PMT_DATA_SOURCE") {
        if !source.trim().is_empty() {
            config.source = DocumentSource::parse(&source);
        }
    }

    if let Ok(raw) = env::var("PMT_LOAD_TIMEOUT_MS") {
        config.timeout_ms = raw
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|ms| *ms > 0)
            .ok_or(ConfigError::InvalidTimeout(raw))?;
    }

    Ok(config)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchedDocument {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub trait DocumentFetcher: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = Result<FetchedDocument, LoadError>> + Send;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    url: String,
    timeout_ms: u64,
}

impl HttpFetcher {
    pub fn new(url: impl Into<String>, timeout_ms: u64) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()
            .map_err(|err| ConfigError::HttpClientBuild(err.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            timeout_ms,
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> LoadError {
        if err.is_timeout() {
            LoadError::Timeout {
                timeout_ms: self.timeout_ms,
            }
        } else {
            LoadError::Unknown(err.to_string())
        }
    }
}

impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self) -> Result<FetchedDocument, LoadError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|err| self.transport_error(err))?;

        Ok(FetchedDocument {
            status,
            body: body.to_vec(),
        })
    }
}

pub struct FileFetcher {
    path: PathBuf,
}

impl FileFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DocumentFetcher for FileFetcher {
    async fn fetch(&self) -> Result<FetchedDocument, LoadError> {
        tokio::fs::read(&self.path)
            .await
            .map(FetchedDocument::ok)
            .map_err(|err| {
                LoadError::Unknown(format!("failed to read {}: {err}", self.path.display()))
            })
    }
}

pub enum SourceFetcher {
    Http(HttpFetcher),
    File(FileFetcher),
}

impl SourceFetcher {
    pub fn from_config(cfg: &LoaderConfig) -> Result<Self, ConfigError> {
        Ok(match &cfg.source {
            DocumentSource::Http(url) => SourceFetcher::Http(HttpFetcher::new(url, cfg.timeout_ms)?),
            DocumentSource::File(path) => SourceFetcher::File(FileFetcher::new(path)),
        })
    }
}

impl DocumentFetcher for SourceFetcher {
    async fn fetch(&self) -> Result<FetchedDocument, LoadError> {
        match self {
            SourceFetcher::Http(fetcher) => fetcher.fetch().await,
            SourceFetcher::File(fetcher) => fetcher.fetch().await,
        }
    }
}

pub struct DataLoader<F> {
    fetcher: F,
    timeout_ms: u64,
    source_label: String,
}

impl<F: DocumentFetcher> DataLoader<F> {
    pub fn new(fetcher: F, cfg: &LoaderConfig) -> Self {
        Self {
            fetcher,
            timeout_ms: cfg.timeout_ms,
            source_label: cfg.source.label(),
        }
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub async fn load(&self) -> Result<MarketCollection, LoadError> {
        info!(
            component = "loader",
            event = "loader.fetch.start",
            source = %self.source_label,
            timeout_ms = self.timeout_ms
        );

        match self.load_inner().await {
            Ok(markets) => {
                info!(
                    component = "loader",
                    event = "loader.fetch.ok",
                    market_count = markets.len()
                );
                Ok(markets)
            }
            Err(err) => {
                warn!(
                    component = "loader",
                    event = "loader.fetch.error",
                    error_kind = err.kind(),
                    error = %err
                );
                Err(err)
            }
        }
    }

    async fn load_inner(&self) -> Result<MarketCollection, LoadError> {
        let fetched = tokio::time::timeout(
            std::time::Duration::from_millis(self.timeout_ms),
            self.fetcher.fetch(),
        )
        .await
        .map_err(|_| LoadError::Timeout {
            timeout_ms: self.timeout_ms,
        })?
        .map_err(|err| match err {
            LoadError::Timeout { .. } => LoadError::Timeout {
                timeout_ms: self.timeout_ms,
            },
            other => other,
        })?;

        if !fetched.is_success() {
            return Err(LoadError::HttpStatus(fetched.status));
        }

        let document: serde_json::Value =
            serde_json::from_slice(&fetched.body).map_err(|_| LoadError::Malformed)?;

        Ok(extract_markets(&document))
    }
}
