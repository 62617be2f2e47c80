use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ProteoError;

/// Sources whose data is not split per cancer type.
pub const SHARED_SOURCES: &[&str] = &["harmonized", "mssm"];

static DATASET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z][a-z0-9]*)(?:_([a-z][a-z0-9]*))?$").expect("dataset pattern compiles")
});

/// A source/cancer pair, or a bare shared source such as `harmonized`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetId {
    source: String,
    cancer: Option<String>,
}

impl DatasetId {
    pub fn from_parts(source: &str, cancer: &str) -> Result<Self, ProteoError> {
        let source = source.trim().to_lowercase();
        if SHARED_SOURCES.contains(&source.as_str()) {
            return source.parse();
        }
        format!("{source}_{}", cancer.trim().to_lowercase()).parse()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn cancer(&self) -> Option<&str> {
        self.cancer.as_deref()
    }

    pub fn is_shared(&self) -> bool {
        self.cancer.is_none()
    }

    pub fn name(&self) -> String {
        match &self.cancer {
            Some(cancer) => format!("{}_{}", self.source, cancer),
            None => self.source.clone(),
        }
    }

    /// Directory name of an installed version, e.g. `bcm_brca_v1.0`.
    pub fn version_dir_name(&self, version: &str) -> String {
        format!("{}_v{version}", self.name())
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for DatasetId {
    type Err = ProteoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        let captures = DATASET_RE.captures(&normalized).ok_or_else(|| {
            ProteoError::InvalidParameter(format!(
                "'{value}' is not a valid dataset name (expected source_cancer or a shared source)"
            ))
        })?;
        let source = captures[1].to_string();
        let cancer = captures.get(2).map(|m| m.as_str().to_string());
        if cancer.is_some() && SHARED_SOURCES.contains(&source.as_str()) {
            return Err(ProteoError::InvalidParameter(format!(
                "{source} is a shared source and takes no cancer type"
            )));
        }
        Ok(Self { source, cancer })
    }
}

/// Dotted numeric version, compared component-wise. Trailing zero
/// components are dropped at parse time so `1.0 == 1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataVersion {
    components: Vec<u64>,
}

impl DataVersion {
    pub fn components(&self) -> &[u64] {
        &self.components
    }
}

impl FromStr for DataVersion {
    type Err = ProteoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ProteoError::InvalidParameter("empty version".to_string()));
        }
        let mut components = trimmed
            .split('.')
            .map(|part| part.parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ProteoError::InvalidParameter(format!("invalid version: {value}")))?;
        while components.len() > 1 && components.last() == Some(&0) {
            components.pop();
        }
        Ok(Self { components })
    }
}

/// Total order over raw version tokens. Unparseable tokens rank below
/// every parseable one; ties fall back to the raw text.
pub fn compare_tokens(a: &str, b: &str) -> Ordering {
    let left = a.parse::<DataVersion>().ok();
    let right = b.parse::<DataVersion>().ok();
    left.cmp(&right).then_with(|| a.cmp(b))
}

pub fn max_version<'a, I>(tokens: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    tokens.into_iter().max_by(|a, b| compare_tokens(a, b))
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum VersionRequest {
    #[default]
    Latest,
    Exact(String),
}

impl fmt::Display for VersionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionRequest::Latest => write!(f, "latest"),
            VersionRequest::Exact(version) => write!(f, "{version}"),
        }
    }
}

impl FromStr for VersionRequest {
    type Err = ProteoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ProteoError::InvalidParameter("empty version".to_string()));
        }
        if trimmed.eq_ignore_ascii_case("latest") {
            return Ok(VersionRequest::Latest);
        }
        Ok(VersionRequest::Exact(trimmed.to_string()))
    }
}

/// Whether a version is being resolved for a download or for loading
/// already-installed data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseContext {
    Download,
    Init,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DatatypeSelection {
    #[default]
    All,
    Only(Vec<String>),
}

impl DatatypeSelection {
    pub fn from_list(values: Vec<String>) -> Self {
        let values = values
            .into_iter()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .collect::<Vec<_>>();
        if values.is_empty() || values.iter().any(|value| value.eq_ignore_ascii_case("all")) {
            DatatypeSelection::All
        } else {
            DatatypeSelection::Only(values)
        }
    }
}
