//! Per-dataset version index.
//!
//! The on-disk format is line oriented: a line starting with `#` opens a
//! version section, and every following line up to the next marker is a
//! tab-separated entry `file_name \t <unused> \t url \t datatype`.

use std::collections::BTreeMap;
use std::fs;

use camino::Utf8Path;
use serde::Serialize;

use crate::domain::{DatasetId, compare_tokens, max_version};
use crate::error::ProteoError;
use crate::store::installed_versions;

pub const INDEX_FILE: &str = "index.txt";
pub const VERSION_MARKER: char = '#';

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub file_name: String,
    pub url: String,
    pub datatype: String,
}

/// Files of one version, kept in index order. File names are unique; a
/// repeated name replaces the earlier entry in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileManifest {
    entries: Vec<ManifestEntry>,
}

impl FileManifest {
    pub fn insert(&mut self, entry: ManifestEntry) {
        match self
            .entries
            .iter_mut()
            .find(|existing| existing.file_name == entry.file_name)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn get(&self, file_name: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|entry| entry.file_name == file_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.iter()
    }

    pub fn file_names(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.file_name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<ManifestEntry> for FileManifest {
    fn from_iter<T: IntoIterator<Item = ManifestEntry>>(iter: T) -> Self {
        let mut manifest = FileManifest::default();
        for entry in iter {
            manifest.insert(entry);
        }
        manifest
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VersionIndex {
    versions: BTreeMap<String, FileManifest>,
}

impl VersionIndex {
    pub fn parse_str(content: &str) -> Self {
        let mut versions = BTreeMap::new();
        let mut current: Option<String> = None;
        for line in content.lines() {
            let line = line.trim_end_matches(['\r', '\n']);
            if let Some(version) = line.trim().strip_prefix(VERSION_MARKER) {
                let version = version.trim().to_string();
                versions.insert(version.clone(), FileManifest::default());
                current = Some(version);
                continue;
            }
            let fields = line.split('\t').collect::<Vec<_>>();
            if fields.len() < 2 {
                continue;
            }
            let Some(version) = current.as_ref() else {
                tracing::debug!(line, "index entry before any version marker, skipping");
                continue;
            };
            let entry = ManifestEntry {
                file_name: fields[0].to_string(),
                url: fields.get(2).copied().unwrap_or_default().to_string(),
                datatype: fields.get(3).copied().unwrap_or_default().to_string(),
            };
            if let Some(manifest) = versions.get_mut(version) {
                manifest.insert(entry);
            }
        }
        Self { versions }
    }

    /// Renders the index in its on-disk format; the unused column is left empty.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for version in self.versions() {
            out.push(VERSION_MARKER);
            out.push_str(version);
            out.push('\n');
            for entry in self.versions[version].iter() {
                out.push_str(&format!(
                    "{}\t\t{}\t{}\n",
                    entry.file_name, entry.url, entry.datatype
                ));
            }
        }
        out
    }

    pub fn insert(&mut self, version: impl Into<String>, manifest: FileManifest) {
        self.versions.insert(version.into(), manifest);
    }

    pub fn get(&self, version: &str) -> Option<&FileManifest> {
        self.versions.get(version)
    }

    pub fn contains(&self, version: &str) -> bool {
        self.versions.contains_key(version)
    }

    /// Version tokens in ascending version order.
    pub fn versions(&self) -> Vec<&str> {
        let mut versions = self.versions.keys().map(String::as_str).collect::<Vec<_>>();
        versions.sort_by(|a, b| compare_tokens(a, b));
        versions
    }

    pub fn latest(&self) -> Option<&str> {
        max_version(self.versions.keys().map(String::as_str))
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

/// Reads `index.txt` from a dataset directory. Re-read on every call.
pub fn load_index(dataset_dir: &Utf8Path, dataset: &DatasetId) -> Result<VersionIndex, ProteoError> {
    let index_path = dataset_dir.join(INDEX_FILE);
    if !index_path.as_std_path().is_file() {
        if installed_versions(dataset_dir, dataset)?.is_empty() {
            return Err(ProteoError::DatasetNotInstalled {
                dataset: dataset.name(),
            });
        }
        return Err(ProteoError::MissingFile {
            file: INDEX_FILE.to_string(),
            remedy: format!("Run `proteo download {dataset} --redownload` to download it."),
        });
    }
    let content = fs::read_to_string(index_path.as_std_path())
        .map_err(|err| ProteoError::Filesystem(err.to_string()))?;
    Ok(VersionIndex::parse_str(&content))
}
