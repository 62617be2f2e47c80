use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::app::DownloadRequest;
use crate::archive::{DEFAULT_API_BASE, STATIC_DOI};
use crate::domain::{DatatypeSelection, VersionRequest};
use crate::error::ProteoError;
use crate::store::Store;

pub const PLAN_FILE: &str = "proteo.json";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// A download plan: which datasets to fetch, at which versions.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub datasets: Vec<DatasetEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DatasetEntry {
    Shorthand(String),
    Detailed(DatasetEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DatasetEntryObject {
    pub dataset: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub datatypes: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub requests: Vec<DownloadRequest>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, ProteoError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(PLAN_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(ProteoError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| ProteoError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| ProteoError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, ProteoError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let requests = config
            .datasets
            .into_iter()
            .map(|entry| match entry {
                DatasetEntry::Shorthand(value) => Ok(DownloadRequest::new(value.parse()?)),
                DatasetEntry::Detailed(obj) => Ok(DownloadRequest {
                    dataset: obj.dataset.parse()?,
                    version: match obj.version {
                        Some(version) => version.parse()?,
                        None => VersionRequest::Latest,
                    },
                    datatypes: obj
                        .datatypes
                        .map(DatatypeSelection::from_list)
                        .unwrap_or_default(),
                }),
            })
            .collect::<Result<Vec<_>, ProteoError>>()?;

        Ok(ResolvedConfig {
            schema_version,
            requests,
        })
    }
}

/// Process-wide settings: where data lives and which archive record holds
/// it. Every field may be omitted from the settings file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub data_root: Option<String>,
    #[serde(default)]
    pub archive_doi: Option<String>,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub data_root: Option<Utf8PathBuf>,
    pub archive_doi: String,
    pub api_base: String,
    pub timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_file(SettingsFile::default())
    }
}

impl Settings {
    /// Reads an explicit settings file, or falls back to defaults. The
    /// `PROTEO_HOME` variable still overrides an unset `data_root` through
    /// [`Store::new`].
    pub fn load(path: Option<&str>) -> Result<Self, ProteoError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let path = PathBuf::from(path);
        let content =
            fs::read_to_string(&path).map_err(|_| ProteoError::ConfigRead(path.clone()))?;
        let file: SettingsFile = serde_json::from_str(&content)
            .map_err(|err| ProteoError::ConfigParse(err.to_string()))?;
        Ok(Self::from_file(file))
    }

    pub fn from_file(file: SettingsFile) -> Self {
        Self {
            data_root: file
                .data_root
                .filter(|root| !root.trim().is_empty())
                .map(Utf8PathBuf::from),
            archive_doi: file.archive_doi.unwrap_or_else(|| STATIC_DOI.to_string()),
            api_base: file
                .api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            timeout: Duration::from_secs(file.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        }
    }

    pub fn store(&self) -> Result<Store, ProteoError> {
        match &self.data_root {
            Some(root) => Ok(Store::new_with_root(root.clone())),
            None => Store::new(),
        }
    }
}
