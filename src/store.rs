use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;

use crate::domain::{DatasetId, compare_tokens, max_version};
use crate::error::ProteoError;
use crate::index::{FileManifest, INDEX_FILE};
use crate::manifest::URL_MANIFEST_FILE;

const DATASET_DIR_PREFIX: &str = "data_";

/// Local install tree: `{root}/data/data_{dataset}/{dataset}_v{version}/`.
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, ProteoError> {
        Ok(Self {
            root: default_root()?,
        })
    }

    pub fn new_with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn data_dir(&self) -> Utf8PathBuf {
        self.root.join("data")
    }

    pub fn dataset_dir(&self, dataset: &DatasetId) -> Utf8PathBuf {
        self.data_dir()
            .join(format!("{DATASET_DIR_PREFIX}{}", dataset.name()))
    }

    /// Resolves the base directory of a dataset. A missing directory means
    /// the source/cancer combination is not a known dataset.
    pub fn dataset_path(&self, dataset: &DatasetId) -> Result<Utf8PathBuf, ProteoError> {
        let path = self.dataset_dir(dataset);
        if path.as_std_path().is_dir() {
            return Ok(path);
        }
        let message = match dataset.cancer() {
            Some(cancer) => format!(
                "{} is not a valid source for {cancer}. Path: {path}",
                dataset.source()
            ),
            None => format!("{dataset} is not a valid dataset. Path: {path}"),
        };
        Err(ProteoError::InvalidParameter(message))
    }

    pub fn index_path(&self, dataset: &DatasetId) -> Utf8PathBuf {
        self.dataset_dir(dataset).join(INDEX_FILE)
    }

    pub fn url_manifest_path(&self, dataset: &DatasetId) -> Utf8PathBuf {
        self.dataset_dir(dataset).join(URL_MANIFEST_FILE)
    }

    pub fn version_dir(&self, dataset: &DatasetId, version: &str) -> Utf8PathBuf {
        self.dataset_dir(dataset)
            .join(dataset.version_dir_name(version))
    }

    pub fn installed_versions(&self, dataset: &DatasetId) -> Result<Vec<String>, ProteoError> {
        let dataset_dir = self.dataset_path(dataset)?;
        installed_versions(&dataset_dir, dataset)
    }

    pub fn latest_installed(&self, dataset: &DatasetId) -> Result<Option<String>, ProteoError> {
        let versions = self.installed_versions(dataset)?;
        Ok(max_version(versions.iter().map(String::as_str)).map(str::to_string))
    }

    /// Paths of the given data files inside an installed version directory.
    pub fn version_files_paths(
        &self,
        dataset: &DatasetId,
        version: &str,
        files: &[String],
    ) -> Result<Vec<Utf8PathBuf>, ProteoError> {
        let version_dir = self.version_dir(dataset, version);
        if !version_dir.as_std_path().is_dir() {
            return Err(ProteoError::DataVersionNotInstalled {
                dataset: dataset.name(),
                version: version.to_string(),
            });
        }
        files
            .iter()
            .map(|file| {
                let path = version_dir.join(file);
                if path.as_std_path().is_file() {
                    Ok(path)
                } else {
                    Err(ProteoError::MissingFile {
                        file: file.clone(),
                        remedy: format!(
                            "Run `proteo download {dataset} --version {version}` to download it. Dataset loading aborted."
                        ),
                    })
                }
            })
            .collect()
    }

    /// Files of `manifest` that still need fetching into the version directory.
    pub fn files_to_fetch(
        &self,
        dataset: &DatasetId,
        version: &str,
        manifest: &FileManifest,
        redownload: bool,
    ) -> Vec<String> {
        let version_dir = self.version_dir(dataset, version);
        manifest
            .iter()
            .filter(|entry| redownload || !version_dir.join(&entry.file_name).as_std_path().is_file())
            .map(|entry| entry.file_name.clone())
            .collect()
    }

    pub fn list_datasets(&self) -> Result<Vec<DatasetId>, ProteoError> {
        let data_dir = self.data_dir();
        if !data_dir.as_std_path().is_dir() {
            return Ok(Vec::new());
        }
        let mut datasets = Vec::new();
        for name in subdirectory_names(&data_dir)? {
            let Some(dataset) = name.strip_prefix(DATASET_DIR_PREFIX) else {
                continue;
            };
            match dataset.parse::<DatasetId>() {
                Ok(id) => datasets.push(id),
                Err(_) => tracing::debug!(directory = %name, "ignoring unrecognized dataset directory"),
            }
        }
        datasets.sort();
        Ok(datasets)
    }

    /// Writes through a temp file in the destination directory, creating
    /// parents as needed. The destination is never left partially written.
    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), ProteoError> {
        let parent = path
            .parent()
            .ok_or_else(|| ProteoError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| ProteoError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".proteo-write")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| ProteoError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .map_err(|err| ProteoError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| ProteoError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

/// Versions installed under `dataset_dir`, detected purely by directories
/// named exactly `{dataset}_v{version}`.
pub fn installed_versions(
    dataset_dir: &Utf8Path,
    dataset: &DatasetId,
) -> Result<Vec<String>, ProteoError> {
    if !dataset_dir.as_std_path().is_dir() {
        return Ok(Vec::new());
    }
    let prefix = dataset.version_dir_name("");
    let mut versions = subdirectory_names(dataset_dir)?
        .into_iter()
        .filter_map(|name| name.strip_prefix(&prefix).map(str::to_string))
        .filter(|version| !version.is_empty())
        .collect::<Vec<_>>();
    versions.sort_by(|a, b| compare_tokens(a, b));
    Ok(versions)
}

fn subdirectory_names(dir: &Utf8Path) -> Result<Vec<String>, ProteoError> {
    let entries =
        fs::read_dir(dir.as_std_path()).map_err(|err| ProteoError::Filesystem(err.to_string()))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| ProteoError::Filesystem(err.to_string()))?;
        if !entry.path().is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.trim().to_string());
        }
    }
    Ok(names)
}

fn default_root() -> Result<Utf8PathBuf, ProteoError> {
    if let Ok(home) = std::env::var("PROTEO_HOME") {
        if !home.trim().is_empty() {
            return Ok(Utf8PathBuf::from(home.trim()));
        }
    }
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("proteo-archive")).ok()
        })
        .ok_or_else(|| ProteoError::Filesystem("unable to resolve data directory".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        (temp, Store::new_with_root(root))
    }

    #[test]
    fn layout_paths() {
        let (_temp, store) = temp_store();
        let id: DatasetId = "bcm_brca".parse().unwrap();
        assert!(store.dataset_dir(&id).ends_with("data/data_bcm_brca"));
        assert!(store.version_dir(&id, "1.0").ends_with("data_bcm_brca/bcm_brca_v1.0"));
        assert!(store.index_path(&id).ends_with("data_bcm_brca/index.txt"));
    }

    #[test]
    fn detects_exactly_named_version_dirs() {
        let (_temp, store) = temp_store();
        let id: DatasetId = "bcm_brca".parse().unwrap();
        let dir = store.dataset_dir(&id);
        for name in ["bcm_brca_v1.0", "bcm_brca_v1.10", "bcm_brca_v1.9", "bcm_ov_v3.0", "notes"] {
            fs::create_dir_all(dir.join(name).as_std_path()).unwrap();
        }
        fs::write(dir.join("bcm_brca_v9.0").as_std_path(), b"not a dir").unwrap();
        assert_eq!(
            store.installed_versions(&id).unwrap(),
            vec!["1.0", "1.9", "1.10"]
        );
        assert_eq!(store.latest_installed(&id).unwrap().as_deref(), Some("1.10"));
    }
}
