use crate::domain::{DatasetId, UseContext, VersionRequest};
use crate::error::ProteoError;
use crate::index::VersionIndex;
use crate::progress::{Advisory, ProgressSink};

/// Turns a requested version token into a concrete version from the index.
///
/// `latest_installed` is the highest `{dataset}_v{version}` directory on
/// disk. `valid_versions`, when given, lists the data versions this build
/// knows how to load.
pub fn validate_version(
    dataset: &DatasetId,
    index: &VersionIndex,
    latest_installed: Option<&str>,
    request: &VersionRequest,
    context: UseContext,
    valid_versions: Option<&[String]>,
    sink: &dyn ProgressSink,
) -> Result<String, ProteoError> {
    let index_latest = index.latest();

    let resolved = match request {
        VersionRequest::Exact(version) if index.contains(version) => {
            if let Some(latest) = index_latest {
                if latest != version {
                    sink.advisory(Advisory::StaleVersion {
                        dataset: dataset.clone(),
                        requested: version.clone(),
                        latest: latest.to_string(),
                    });
                }
            }
            version.clone()
        }
        VersionRequest::Exact(version) => {
            return Err(ProteoError::InvalidParameter(format!(
                "{version} is an invalid version for the {dataset} dataset. Valid versions: {}",
                index.versions().join(", ")
            )));
        }
        VersionRequest::Latest => {
            let Some(index_latest) = index_latest else {
                return Err(ProteoError::InvalidParameter(format!(
                    "the {dataset} index lists no versions. Run `proteo download {dataset} --redownload` to refresh it."
                )));
            };
            match latest_installed {
                None => index_latest.to_string(),
                Some(installed) if installed == index_latest => index_latest.to_string(),
                Some(installed) => match context {
                    UseContext::Download => {
                        sink.advisory(Advisory::DownloadingNewLatest {
                            dataset: dataset.clone(),
                            latest: index_latest.to_string(),
                        });
                        index_latest.to_string()
                    }
                    UseContext::Init => {
                        return Err(ProteoError::AmbiguousLatest {
                            dataset: dataset.name(),
                            index_latest: index_latest.to_string(),
                            latest_installed: installed.to_string(),
                        });
                    }
                },
            }
        }
    };

    if let Some(valid) = valid_versions {
        if !valid.iter().any(|version| version == &resolved) {
            return Err(ProteoError::PackageCannotHandleDataVersion {
                version: resolved,
                supported: valid.join(", "),
            });
        }
    }

    tracing::debug!(%dataset, version = %resolved, ?context, "resolved data version");
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use assert_matches::assert_matches;

    use super::*;
    use crate::progress::ProgressEvent;

    #[derive(Default)]
    struct Recorder {
        advisories: RefCell<Vec<Advisory>>,
    }

    impl ProgressSink for Recorder {
        fn event(&self, _event: ProgressEvent) {}

        fn advisory(&self, advisory: Advisory) {
            self.advisories.borrow_mut().push(advisory);
        }
    }

    fn index() -> VersionIndex {
        VersionIndex::parse_str("#1.0\na\t\tu\tcnv\n#1.2\na\t\tu\tcnv\n#1.10\na\t\tu\tcnv\n")
    }

    fn dataset() -> DatasetId {
        "bcm_brca".parse().unwrap()
    }

    #[test]
    fn latest_uses_semantic_order() {
        let sink = Recorder::default();
        let version = validate_version(
            &dataset(),
            &index(),
            None,
            &VersionRequest::Latest,
            UseContext::Init,
            None,
            &sink,
        )
        .unwrap();
        assert_eq!(version, "1.10");
        assert!(sink.advisories.borrow().is_empty());
    }

    #[test]
    fn unknown_version_lists_valid_ones() {
        let sink = Recorder::default();
        let err = validate_version(
            &dataset(),
            &index(),
            None,
            &VersionRequest::Exact("2.0".to_string()),
            UseContext::Download,
            None,
            &sink,
        )
        .unwrap_err();
        assert_matches!(err, ProteoError::InvalidParameter(ref message) if message.contains("1.0, 1.2, 1.10"));
    }

    #[test]
    fn allow_list_rejects_newer_data() {
        let sink = Recorder::default();
        let err = validate_version(
            &dataset(),
            &index(),
            None,
            &VersionRequest::Latest,
            UseContext::Init,
            Some(&["1.0".to_string(), "1.2".to_string()][..]),
            &sink,
        )
        .unwrap_err();
        assert_matches!(err, ProteoError::PackageCannotHandleDataVersion { ref version, .. } if version == "1.10");
    }
}
