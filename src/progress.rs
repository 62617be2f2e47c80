use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::domain::DatasetId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressSinkKind {
    Download,
    Versions,
    List,
    Check,
    Register,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    /// `(file_number, total_files)` while a batch download runs.
    pub batch: Option<(usize, usize)>,
}

impl ProgressEvent {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            batch: None,
        }
    }
}

/// Non-fatal conditions. The operation that raised one has already
/// settled on its fallback and carries on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Advisory {
    StaleVersion {
        dataset: DatasetId,
        requested: String,
        latest: String,
    },
    DownloadingNewLatest {
        dataset: DatasetId,
        latest: String,
    },
    DatatypeNotInSource {
        dataset: DatasetId,
        version: String,
        missing: BTreeSet<String>,
    },
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::StaleVersion {
                dataset,
                requested,
                latest,
            } => write!(
                f,
                "old {dataset} data version. Latest is {latest}. This is {requested}."
            ),
            Advisory::DownloadingNewLatest { dataset, latest } => write!(
                f,
                "downloading new version of {dataset} dataset: {latest}. This will now be the default version when the dataset is loaded. To load an older version, pass it with --version."
            ),
            Advisory::DatatypeNotInSource {
                dataset,
                version,
                missing,
            } => {
                let missing = missing.iter().cloned().collect::<Vec<_>>().join(", ");
                match dataset.cancer() {
                    None => write!(
                        f,
                        "these {dataset} datatypes were not found in version v{version}: {missing}. See `proteo list` for more info."
                    ),
                    Some(cancer) => write!(
                        f,
                        "these {cancer} datatypes were not found for the {} source in version v{version}: {missing}. See `proteo list` for more info.",
                        dataset.source()
                    ),
                }
            }
        }
    }
}

/// Caller-supplied reporting policy: progress events and advisories flow
/// through this instead of any process-wide hook.
pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);

    fn advisory(&self, advisory: Advisory) {
        tracing::warn!("{advisory}");
    }
}
