use std::fs::File;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::error::ProteoError;

/// DOI of the archive record that holds every data file of the package.
pub const STATIC_DOI: &str = "10.5281/zenodo.7897498";
pub const DEFAULT_API_BASE: &str = "https://zenodo.org/api";

/// The archive record addressed by a DOI such as `10.5281/zenodo.7897498`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRecord {
    doi: String,
}

impl ArchiveRecord {
    pub fn new(doi: impl Into<String>) -> Self {
        Self { doi: doi.into() }
    }

    pub fn doi(&self) -> &str {
        &self.doi
    }

    /// Numeric record id taken from the last dot-separated segment of the DOI.
    pub fn record_id(&self) -> Result<&str, ProteoError> {
        self.doi
            .rsplit('.')
            .next()
            .filter(|id| !id.is_empty() && id.chars().all(|ch| ch.is_ascii_digit()))
            .ok_or_else(|| ProteoError::RecordNotFound {
                doi: self.doi.clone(),
            })
    }
}

impl Default for ArchiveRecord {
    fn default() -> Self {
        Self::new(STATIC_DOI)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub password: Option<String>,
}

/// One file of an archive record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFile {
    pub url: String,
    /// Checksum as published by the archive, e.g. `md5:0cc175b9...`.
    pub checksum: Option<String>,
}

impl RecordFile {
    pub fn name(&self) -> &str {
        url_file_name(&self.url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Complete,
    /// The archive refused the current credentials.
    WrongPassword,
}

pub trait ArchiveClient: Send + Sync {
    /// Every file in the record, or `None` when the record does not exist.
    fn list_record_files(
        &self,
        record: &ArchiveRecord,
    ) -> Result<Option<Vec<RecordFile>>, ProteoError>;

    fn download(
        &self,
        url: &str,
        destination: &Path,
        credentials: &Credentials,
    ) -> Result<DownloadStatus, ProteoError>;

    /// Fetches a small text document; any transport failure is a
    /// [`ProteoError::NoInternet`].
    fn fetch_text(&self, url: &str) -> Result<String, ProteoError>;
}

#[derive(Clone)]
pub struct ArchiveHttpClient {
    client: Client,
    api_base: String,
}

impl ArchiveHttpClient {
    pub fn new() -> Result<Self, ProteoError> {
        Self::with_options(DEFAULT_API_BASE, Duration::from_secs(60))
    }

    pub fn with_options(api_base: &str, timeout: Duration) -> Result<Self, ProteoError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("proteo-archive/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ProteoError::ArchiveHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| ProteoError::ArchiveHttp(err.to_string()))?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    fn record_url(&self, record: &ArchiveRecord) -> Result<String, ProteoError> {
        Ok(format!("{}/records/{}", self.api_base, record.record_id()?))
    }

    fn handle_status(response: Response) -> Result<Response, ProteoError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "archive request failed".to_string());
        Err(ProteoError::ArchiveStatus { status, message })
    }

    /// Sends a request exactly once. Connection and timeout failures are
    /// reported as [`ProteoError::NoInternet`].
    fn send(request: RequestBuilder) -> Result<Response, ProteoError> {
        request.send().map_err(|err| {
            if err.is_connect() || err.is_timeout() {
                ProteoError::NoInternet(err.to_string())
            } else {
                ProteoError::ArchiveHttp(err.to_string())
            }
        })
    }
}

impl ArchiveClient for ArchiveHttpClient {
    fn list_record_files(
        &self,
        record: &ArchiveRecord,
    ) -> Result<Option<Vec<RecordFile>>, ProteoError> {
        let url = self.record_url(record)?;
        let response = Self::send(self.client.get(&url))?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        let response = Self::handle_status(response)?;
        let raw: Value = response
            .json()
            .map_err(|err| ProteoError::ArchiveHttp(err.to_string()))?;
        Ok(Some(record_files(&raw)))
    }

    fn download(
        &self,
        url: &str,
        destination: &Path,
        credentials: &Credentials,
    ) -> Result<DownloadStatus, ProteoError> {
        let request = match &credentials.password {
            Some(password) => self
                .client
                .get(url)
                .header(AUTHORIZATION, format!("Bearer {password}")),
            None => self.client.get(url),
        };
        let response = Self::send(request)?;
        if matches!(response.status().as_u16(), 401 | 403) {
            return Ok(DownloadStatus::WrongPassword);
        }
        let mut response = Self::handle_status(response)?;
        let mut file =
            File::create(destination).map_err(|err| ProteoError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| ProteoError::Filesystem(err.to_string()))?;
        Ok(DownloadStatus::Complete)
    }

    fn fetch_text(&self, url: &str) -> Result<String, ProteoError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| ProteoError::NoInternet(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ProteoError::NoInternet(format!(
                "{url} returned status {}",
                response.status().as_u16()
            )));
        }
        let text = response
            .text()
            .map_err(|err| ProteoError::NoInternet(err.to_string()))?;
        Ok(text.trim().to_string())
    }
}

/// Extracts the files of a record document. Each URL ends with the file's
/// literal name; a trailing `/content` segment is dropped.
pub fn record_files(raw: &Value) -> Vec<RecordFile> {
    let Some(files) = raw.get("files").and_then(|value| value.as_array()) else {
        return Vec::new();
    };
    files
        .iter()
        .filter_map(|file| {
            let link = file
                .get("links")
                .and_then(|links| links.get("self"))
                .and_then(|value| value.as_str())?;
            let link = link.strip_suffix("/content").unwrap_or(link);
            let checksum = file
                .get("checksum")
                .and_then(|value| value.as_str())
                .map(str::to_string);
            Some(RecordFile {
                url: link.to_string(),
                checksum,
            })
        })
        .collect()
}

/// Last path segment of a URL.
pub fn url_file_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}
