use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::archive::{ArchiveClient, ArchiveRecord, Credentials};
use crate::dataset::{DatasetDescriptor, LoadedDataset};
use crate::domain::{DatasetId, DatatypeSelection, UseContext, VersionRequest};
use crate::error::ProteoError;
use crate::fetch::{FetchStatus, download_file};
use crate::filter::filter_manifest;
use crate::index::{FileManifest, INDEX_FILE, VersionIndex, load_index};
use crate::manifest::parse_tsv_dict;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::prompt::PasswordPrompt;
use crate::resolve::validate_version;
use crate::store::Store;

const WRONG_PASSWORD_PROMPT: &str = "Wrong password. Try again: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub dataset: DatasetId,
    pub version: VersionRequest,
    pub datatypes: DatatypeSelection,
}

impl DownloadRequest {
    pub fn new(dataset: DatasetId) -> Self {
        Self {
            dataset,
            version: VersionRequest::Latest,
            datatypes: DatatypeSelection::All,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DownloadOptions {
    pub redownload: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAction {
    Download,
    Present,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub name: String,
    /// Position within the files fetched by this batch; absent for files
    /// that were already installed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<usize>,
    pub total: usize,
    pub action: FileAction,
    pub path: String,
    pub password_prompts: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloaded_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadReport {
    pub dataset: String,
    pub version: String,
    pub files: Vec<FileReport>,
}

impl DownloadReport {
    pub fn downloaded(&self) -> impl Iterator<Item = &FileReport> {
        self.files
            .iter()
            .filter(|file| file.action == FileAction::Download)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub items: Vec<DownloadReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionsResult {
    pub dataset: String,
    pub index_versions: Vec<String>,
    pub installed_versions: Vec<String>,
    pub index_latest: Option<String>,
    pub latest_installed: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub datasets: Vec<ListEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub dataset: String,
    pub path: String,
    pub installed_versions: Vec<String>,
    pub latest_installed: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub dataset: String,
    pub version: String,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterResult {
    pub dataset: String,
    pub path: String,
    pub index_url: String,
}

pub struct App<A: ArchiveClient, P: PasswordPrompt> {
    store: Store,
    archive: A,
    prompt: P,
    record: ArchiveRecord,
}

impl<A: ArchiveClient, P: PasswordPrompt> App<A, P> {
    pub fn new(store: Store, archive: A, prompt: P) -> Self {
        Self::with_record(store, archive, prompt, ArchiveRecord::default())
    }

    pub fn with_record(store: Store, archive: A, prompt: P, record: ArchiveRecord) -> Self {
        Self {
            store,
            archive,
            prompt,
            record,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn archive(&self) -> &A {
        &self.archive
    }

    pub fn prompt(&self) -> &P {
        &self.prompt
    }

    /// Creates the dataset directory with the URL manifest that points at
    /// its remote index.
    pub fn register(
        &self,
        dataset: &DatasetId,
        index_url: &str,
        sink: &dyn ProgressSink,
    ) -> Result<RegisterResult, ProteoError> {
        let index_url = index_url.trim();
        if index_url.is_empty() {
            return Err(ProteoError::InvalidParameter(
                "index URL must not be empty".to_string(),
            ));
        }
        sink.event(ProgressEvent::message(format!("registering {dataset}")));
        let manifest_path = self.store.url_manifest_path(dataset);
        let content = format!("{INDEX_FILE}\t{index_url}\n");
        Store::write_bytes_atomic(&manifest_path, content.as_bytes())?;
        Ok(RegisterResult {
            dataset: dataset.name(),
            path: self.store.dataset_dir(dataset).to_string(),
            index_url: index_url.to_string(),
        })
    }

    /// Makes sure the dataset's `index.txt` exists, fetching it through the
    /// URL manifest when absent or when `force` is set.
    pub fn update_index(
        &self,
        dataset: &DatasetId,
        force: bool,
        sink: &dyn ProgressSink,
    ) -> Result<Utf8PathBuf, ProteoError> {
        let index_path = self.store.index_path(dataset);
        let present = index_path.as_std_path().is_file();
        if present && !force {
            return Ok(index_path);
        }

        let manifest_path = self.store.url_manifest_path(dataset);
        let urls = parse_tsv_dict(&manifest_path)?;
        let url = urls
            .get(INDEX_FILE)
            .ok_or_else(|| ProteoError::MissingIndexUrl {
                file: INDEX_FILE.to_string(),
                manifest: manifest_path.clone().into_std_path_buf(),
            })?;

        sink.event(ProgressEvent::message(format!(
            "checking that {dataset} index is up-to-date"
        )));
        match self.archive.fetch_text(url) {
            Ok(text) => {
                let mut content = text;
                content.push('\n');
                Store::write_bytes_atomic(&index_path, content.as_bytes())?;
                tracing::info!(%dataset, path = %index_path, "index updated");
            }
            Err(err) if present => {
                tracing::warn!(%dataset, error = %err, "keeping existing index");
            }
            Err(err) => return Err(err),
        }

        if index_path.as_std_path().is_file() {
            Ok(index_path)
        } else {
            Err(ProteoError::NoInternet(format!(
                "could not fetch the {dataset} index from {url}"
            )))
        }
    }

    pub fn download(
        &self,
        request: &DownloadRequest,
        options: DownloadOptions,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadReport, ProteoError> {
        let dataset = &request.dataset;
        let dataset_dir = self.store.dataset_path(dataset)?;
        self.update_index(dataset, options.redownload, sink)?;
        let index = load_index(&dataset_dir, dataset)?;
        let latest_installed = self.store.latest_installed(dataset)?;
        let version = validate_version(
            dataset,
            &index,
            latest_installed.as_deref(),
            &request.version,
            UseContext::Download,
            None,
            sink,
        )?;
        let manifest = version_manifest(&index, dataset, &version)?;
        let selected = match &request.datatypes {
            DatatypeSelection::All => manifest.clone(),
            DatatypeSelection::Only(datatypes) => {
                filter_manifest(manifest, datatypes, dataset, &version, sink)
            }
        };

        let to_fetch = self
            .store
            .files_to_fetch(dataset, &version, &selected, options.redownload);
        let total = to_fetch.len();
        let version_dir = self.store.version_dir(dataset, &version);

        let mut files = Vec::with_capacity(selected.len());
        let mut credentials = Credentials::default();
        let mut number = 0usize;
        for entry in selected.iter() {
            let file_name = &entry.file_name;
            let destination = version_dir.join(file_name);
            if !to_fetch.contains(file_name) {
                files.push(FileReport {
                    name: file_name.clone(),
                    number: None,
                    total,
                    action: FileAction::Present,
                    path: destination.to_string(),
                    password_prompts: 0,
                    downloaded_at: None,
                });
                continue;
            }
            number += 1;
            sink.event(ProgressEvent {
                message: format!("downloading {dataset} v{version} files ({number}/{total})"),
                batch: Some((number, total)),
            });
            let (path, password_prompts) =
                self.fetch_with_password(dataset, file_name, &destination, &mut credentials)?;
            files.push(FileReport {
                name: file_name.clone(),
                number: Some(number),
                total,
                action: FileAction::Download,
                path: path.to_string(),
                password_prompts,
                downloaded_at: Some(chrono::Utc::now().to_rfc3339()),
            });
        }

        tracing::info!(%dataset, %version, fetched = total, "download finished");
        sink.event(ProgressEvent::message(format!(
            "{dataset} v{version}: {total} file(s) downloaded, {} already present",
            files.len() - total
        )));
        Ok(DownloadReport {
            dataset: dataset.name(),
            version,
            files,
        })
    }

    pub fn download_all(
        &self,
        requests: &[DownloadRequest],
        options: DownloadOptions,
        sink: &dyn ProgressSink,
    ) -> Result<BatchResult, ProteoError> {
        let items = requests
            .iter()
            .map(|request| self.download(request, options, sink))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(BatchResult { items })
    }

    /// Downloads one file, prompting for a password every time the archive
    /// refuses the current credentials. Returns the saved path and the
    /// number of prompts this file needed.
    fn fetch_with_password(
        &self,
        dataset: &DatasetId,
        file_name: &str,
        destination: &Utf8Path,
        credentials: &mut Credentials,
    ) -> Result<(Utf8PathBuf, usize), ProteoError> {
        let mut prompts = 0usize;
        loop {
            match download_file(
                &self.archive,
                &self.record,
                file_name,
                destination,
                credentials,
            )? {
                FetchStatus::Saved(path) => return Ok((path, prompts)),
                FetchStatus::WrongPassword => {
                    let text = match credentials.password {
                        None => format!("Password for {dataset} dataset: "),
                        Some(_) => WRONG_PASSWORD_PROMPT.to_string(),
                    };
                    tracing::debug!(%dataset, file = file_name, "archive refused credentials");
                    credentials.password = Some(self.prompt.read_password(&text)?);
                    prompts += 1;
                }
            }
        }
    }

    pub fn versions(
        &self,
        dataset: &DatasetId,
        sink: &dyn ProgressSink,
    ) -> Result<VersionsResult, ProteoError> {
        sink.event(ProgressEvent::message(format!("reading {dataset} index")));
        let dataset_dir = self.store.dataset_path(dataset)?;
        let installed_versions = self.store.installed_versions(dataset)?;
        let index = load_index(&dataset_dir, dataset)?;
        Ok(VersionsResult {
            dataset: dataset.name(),
            index_versions: index.versions().into_iter().map(str::to_string).collect(),
            index_latest: index.latest().map(str::to_string),
            latest_installed: installed_versions.last().cloned(),
            installed_versions,
        })
    }

    pub fn list(&self, sink: &dyn ProgressSink) -> Result<ListResult, ProteoError> {
        sink.event(ProgressEvent::message(format!(
            "scanning {}",
            self.store.data_dir()
        )));
        let datasets = self
            .store
            .list_datasets()?
            .into_iter()
            .map(|dataset| {
                let installed_versions = self.store.installed_versions(&dataset)?;
                Ok(ListEntry {
                    dataset: dataset.name(),
                    path: self.store.dataset_dir(&dataset).to_string(),
                    latest_installed: installed_versions.last().cloned(),
                    installed_versions,
                })
            })
            .collect::<Result<Vec<_>, ProteoError>>()?;
        Ok(ListResult { datasets })
    }

    /// Resolves a version the way loading would and verifies every file of
    /// that version is installed.
    pub fn check(
        &self,
        dataset: &DatasetId,
        request: &VersionRequest,
        sink: &dyn ProgressSink,
    ) -> Result<CheckResult, ProteoError> {
        let (index, version) = self.resolve_installed(dataset, request, None, sink)?;
        let files = version_manifest(&index, dataset, &version)?
            .file_names()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let paths = self.store.version_files_paths(dataset, &version, &files)?;
        Ok(CheckResult {
            dataset: dataset.name(),
            version,
            files: paths.into_iter().map(|path| path.to_string()).collect(),
        })
    }

    /// Loads an installed dataset version through its descriptor's loaders.
    pub fn open<D: DatasetDescriptor + ?Sized>(
        &self,
        descriptor: &D,
        request: &VersionRequest,
        sink: &dyn ProgressSink,
    ) -> Result<LoadedDataset, ProteoError> {
        let dataset = descriptor.dataset();
        let valid_versions = descriptor.valid_versions();
        let (_index, version) =
            self.resolve_installed(dataset, request, Some(valid_versions.as_slice()), sink)?;

        let loaders = descriptor.loaders();
        let mut tables = BTreeMap::new();
        for (datatype, files) in descriptor.data_files(&version) {
            if files.is_empty() {
                continue;
            }
            let loader = loaders
                .get(&datatype)
                .ok_or_else(|| ProteoError::UnknownDatatype(datatype.clone()))?;
            let paths = self.store.version_files_paths(dataset, &version, &files)?;
            sink.event(ProgressEvent::message(format!(
                "loading {datatype} for {dataset} v{version}"
            )));
            tables.insert(datatype, loader(paths.as_slice())?);
        }
        Ok(LoadedDataset {
            dataset: dataset.clone(),
            version,
            tables,
        })
    }

    fn resolve_installed(
        &self,
        dataset: &DatasetId,
        request: &VersionRequest,
        valid_versions: Option<&[String]>,
        sink: &dyn ProgressSink,
    ) -> Result<(VersionIndex, String), ProteoError> {
        let dataset_dir = self.store.dataset_path(dataset)?;
        let index = load_index(&dataset_dir, dataset)?;
        let latest_installed = self.store.latest_installed(dataset)?;
        let version = validate_version(
            dataset,
            &index,
            latest_installed.as_deref(),
            request,
            UseContext::Init,
            valid_versions,
            sink,
        )?;
        Ok((index, version))
    }
}

fn version_manifest<'a>(
    index: &'a VersionIndex,
    dataset: &DatasetId,
    version: &str,
) -> Result<&'a FileManifest, ProteoError> {
    index.get(version).ok_or_else(|| {
        ProteoError::InvalidParameter(format!(
            "{version} is an invalid version for the {dataset} dataset. Valid versions: {}",
            index.versions().join(", ")
        ))
    })
}
