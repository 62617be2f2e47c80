use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use proteo_archive::app::{App, DownloadOptions, DownloadRequest, FileAction};
use proteo_archive::archive::{
    ArchiveClient, ArchiveRecord, Credentials, DownloadStatus, RecordFile,
};
use proteo_archive::dataset::TsvDataset;
use proteo_archive::domain::{DatasetId, DatatypeSelection, VersionRequest};
use proteo_archive::error::ProteoError;
use proteo_archive::index::load_index;
use proteo_archive::progress::{Advisory, ProgressEvent, ProgressSink};
use proteo_archive::prompt::{NonInteractivePrompt, PasswordPrompt};
use proteo_archive::store::Store;

const INDEX_URL: &str = "https://archive.test/index/bcm_brca/index.txt";
const PASSWORD: &str = "s3cret";

const INDEX: &str = "#1.0\n\
    bcm_brca_clinical.tsv\t\thttps://archive.test/files/bcm_brca_clinical.tsv\tannotation\n\
    bcm_brca_proteomics.tsv\t\thttps://archive.test/files/bcm_brca_proteomics.tsv\tproteomics\n\
    bcm_brca_mapping.tsv\t\thttps://archive.test/files/bcm_brca_mapping.tsv\tmapping\n\
    #2.0\n\
    bcm_brca_clinical_v2.tsv\t\thttps://archive.test/files/bcm_brca_clinical_v2.tsv\tannotation\n";

#[derive(Default)]
struct MockArchive {
    files: BTreeMap<String, String>,
    /// How many times each file refuses a password before accepting one.
    refusals: Mutex<BTreeMap<String, usize>>,
    /// Files whose downloaded bytes differ from the published checksum.
    corrupt: BTreeSet<String>,
    index: Option<String>,
    index_fetches: Mutex<usize>,
    downloads: Mutex<Vec<String>>,
}

impl MockArchive {
    fn with_index(index: &str) -> Self {
        let mut files = BTreeMap::new();
        for name in [
            "bcm_brca_clinical.tsv",
            "bcm_brca_proteomics.tsv",
            "bcm_brca_mapping.tsv",
            "bcm_brca_clinical_v2.tsv",
        ] {
            files.insert(
                name.to_string(),
                format!("Patient_ID\t{name}\nC3L-001\t1\n"),
            );
        }
        Self {
            files,
            index: Some(index.to_string()),
            ..Self::default()
        }
    }

    fn refuse(self, file: &str, times: usize) -> Self {
        self.refusals.lock().unwrap().insert(file.to_string(), times);
        self
    }

    fn corrupt(mut self, file: &str) -> Self {
        self.corrupt.insert(file.to_string());
        self
    }
}

impl ArchiveClient for MockArchive {
    fn list_record_files(
        &self,
        _record: &ArchiveRecord,
    ) -> Result<Option<Vec<RecordFile>>, ProteoError> {
        Ok(Some(
            self.files
                .iter()
                .map(|(name, content)| RecordFile {
                    url: format!("https://archive.test/records/1/files/{name}"),
                    checksum: Some(format!("md5:{:x}", md5::compute(content))),
                })
                .collect(),
        ))
    }

    fn download(
        &self,
        url: &str,
        destination: &Path,
        credentials: &Credentials,
    ) -> Result<DownloadStatus, ProteoError> {
        let name = url.rsplit('/').next().unwrap().to_string();
        let mut refusals = self.refusals.lock().unwrap();
        if let Some(remaining) = refusals.get_mut(&name) {
            if *remaining > 0 || credentials.password.as_deref() != Some(PASSWORD) {
                *remaining = remaining.saturating_sub(1);
                return Ok(DownloadStatus::WrongPassword);
            }
        }
        if self.corrupt.contains(&name) {
            std::fs::write(destination, b"truncated").unwrap();
        } else {
            std::fs::write(destination, &self.files[&name]).unwrap();
        }
        self.downloads.lock().unwrap().push(name);
        Ok(DownloadStatus::Complete)
    }

    fn fetch_text(&self, url: &str) -> Result<String, ProteoError> {
        assert_eq!(url, INDEX_URL);
        *self.index_fetches.lock().unwrap() += 1;
        self.index
            .clone()
            .ok_or_else(|| ProteoError::NoInternet("offline".to_string()))
    }
}

/// Replays scripted answers, then the accepted password.
#[derive(Default)]
struct MockPrompt {
    answers: RefCell<Vec<String>>,
    prompts: RefCell<Vec<String>>,
}

impl MockPrompt {
    fn answering(answers: &[&str]) -> Self {
        Self {
            answers: RefCell::new(answers.iter().rev().map(|answer| answer.to_string()).collect()),
            prompts: RefCell::default(),
        }
    }
}

impl PasswordPrompt for MockPrompt {
    fn read_password(&self, prompt: &str) -> Result<String, ProteoError> {
        self.prompts.borrow_mut().push(prompt.to_string());
        Ok(self
            .answers
            .borrow_mut()
            .pop()
            .unwrap_or_else(|| PASSWORD.to_string()))
    }
}

#[derive(Default)]
struct Recorder {
    events: RefCell<Vec<ProgressEvent>>,
    advisories: RefCell<Vec<Advisory>>,
}

impl ProgressSink for Recorder {
    fn event(&self, event: ProgressEvent) {
        self.events.borrow_mut().push(event);
    }

    fn advisory(&self, advisory: Advisory) {
        self.advisories.borrow_mut().push(advisory);
    }
}

fn dataset() -> DatasetId {
    "bcm_brca".parse().unwrap()
}

fn setup<P: PasswordPrompt>(
    archive: MockArchive,
    prompt: P,
) -> (tempfile::TempDir, App<MockArchive, P>) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let app = App::new(Store::new_with_root(root), archive, prompt);
    app.register(&dataset(), INDEX_URL, &Recorder::default())
        .unwrap();
    (temp, app)
}

fn request(version: &str) -> DownloadRequest {
    DownloadRequest {
        dataset: dataset(),
        version: version.parse().unwrap(),
        datatypes: DatatypeSelection::All,
    }
}

#[test]
fn batch_reprompts_only_for_refused_file() {
    let archive = MockArchive::with_index(INDEX).refuse("bcm_brca_proteomics.tsv", 2);
    let (_temp, app) = setup(archive, MockPrompt::answering(&["wrong", PASSWORD]));
    let sink = Recorder::default();

    let report = app
        .download(&request("1.0"), DownloadOptions::default(), &sink)
        .unwrap();

    assert_eq!(report.version, "1.0");
    assert_eq!(report.files.len(), 3);
    assert!(report.files.iter().all(|file| file.action == FileAction::Download));
    let prompts = report
        .files
        .iter()
        .map(|file| (file.name.as_str(), file.password_prompts))
        .collect::<Vec<_>>();
    assert_eq!(
        prompts,
        vec![
            ("bcm_brca_clinical.tsv", 0),
            ("bcm_brca_proteomics.tsv", 2),
            ("bcm_brca_mapping.tsv", 0),
        ]
    );
    assert_eq!(
        *app.prompt().prompts.borrow(),
        vec![
            "Password for bcm_brca dataset: ".to_string(),
            "Wrong password. Try again: ".to_string(),
        ]
    );

    let numbers = sink
        .events
        .borrow()
        .iter()
        .filter_map(|event| event.batch)
        .collect::<Vec<_>>();
    assert_eq!(numbers, vec![(1, 3), (2, 3), (3, 3)]);

    for file in &report.files {
        assert!(Utf8PathBuf::from(&file.path).as_std_path().is_file());
        assert!(file.path.contains("bcm_brca_v1.0"));
        assert!(file.downloaded_at.is_some());
    }
}

#[test]
fn present_files_are_kept_unless_redownload() {
    let (_temp, app) = setup(MockArchive::with_index(INDEX), MockPrompt::default());
    let sink = Recorder::default();
    let version_dir = app.store().version_dir(&dataset(), "1.0");
    std::fs::create_dir_all(version_dir.as_std_path()).unwrap();
    std::fs::write(version_dir.join("bcm_brca_mapping.tsv").as_std_path(), b"old").unwrap();

    let report = app
        .download(&request("1.0"), DownloadOptions::default(), &sink)
        .unwrap();
    let present = report
        .files
        .iter()
        .filter(|file| file.action == FileAction::Present)
        .map(|file| file.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(present, vec!["bcm_brca_mapping.tsv"]);
    assert_eq!(report.downloaded().count(), 2);
    assert_eq!(*app.archive().index_fetches.lock().unwrap(), 1);

    let report = app
        .download(&request("1.0"), DownloadOptions { redownload: true }, &sink)
        .unwrap();
    assert_eq!(report.downloaded().count(), 3);
    assert_eq!(*app.archive().index_fetches.lock().unwrap(), 2);
    let content = std::fs::read_to_string(version_dir.join("bcm_brca_mapping.tsv").as_std_path())
        .unwrap();
    assert!(content.starts_with("Patient_ID"));
}

#[test]
fn report_lists_files_in_manifest_order() {
    let (_temp, app) = setup(MockArchive::with_index(INDEX), MockPrompt::default());
    let sink = Recorder::default();
    let version_dir = app.store().version_dir(&dataset(), "1.0");
    std::fs::create_dir_all(version_dir.as_std_path()).unwrap();
    std::fs::write(version_dir.join("bcm_brca_proteomics.tsv").as_std_path(), b"old").unwrap();

    let report = app
        .download(&request("1.0"), DownloadOptions::default(), &sink)
        .unwrap();
    let rows = report
        .files
        .iter()
        .map(|file| (file.name.as_str(), file.action, file.number))
        .collect::<Vec<_>>();
    assert_eq!(
        rows,
        vec![
            ("bcm_brca_clinical.tsv", FileAction::Download, Some(1)),
            ("bcm_brca_proteomics.tsv", FileAction::Present, None),
            ("bcm_brca_mapping.tsv", FileAction::Download, Some(2)),
        ]
    );
}

#[test]
fn checksum_mismatch_fails_without_writing_file() {
    let archive = MockArchive::with_index(INDEX).corrupt("bcm_brca_proteomics.tsv");
    let (_temp, app) = setup(archive, MockPrompt::default());
    let sink = Recorder::default();

    let err = app
        .download(&request("1.0"), DownloadOptions::default(), &sink)
        .unwrap_err();
    assert_matches!(
        err,
        ProteoError::DownloadFailed { ref file, .. } if file == "bcm_brca_proteomics.tsv"
    );

    let version_dir = app.store().version_dir(&dataset(), "1.0");
    assert!(version_dir.join("bcm_brca_clinical.tsv").as_std_path().is_file());
    assert!(!version_dir.join("bcm_brca_proteomics.tsv").as_std_path().exists());
    assert!(!version_dir.join("bcm_brca_mapping.tsv").as_std_path().exists());
}

#[test]
fn datatype_selection_keeps_helpers() {
    let (_temp, app) = setup(MockArchive::with_index(INDEX), MockPrompt::default());
    let sink = Recorder::default();
    let request = DownloadRequest {
        datatypes: DatatypeSelection::from_list(vec!["proteomics".to_string(), "cnv".to_string()]),
        ..request("1.0")
    };

    let report = app.download(&request, DownloadOptions::default(), &sink).unwrap();
    let names = report.files.iter().map(|file| file.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["bcm_brca_proteomics.tsv", "bcm_brca_mapping.tsv"]);

    let advisories = sink.advisories.borrow();
    assert_matches!(
        advisories.last(),
        Some(Advisory::DatatypeNotInSource { missing, .. }) if missing.contains("cnv")
    );
}

#[test]
fn download_latest_moves_to_newer_version_with_warning() {
    let (_temp, app) = setup(MockArchive::with_index(INDEX), MockPrompt::default());
    let sink = Recorder::default();
    std::fs::create_dir_all(app.store().version_dir(&dataset(), "1.0").as_std_path()).unwrap();

    let report = app
        .download(&request("latest"), DownloadOptions::default(), &sink)
        .unwrap();
    assert_eq!(report.version, "2.0");
    assert_matches!(
        sink.advisories.borrow().as_slice(),
        [Advisory::DownloadingNewLatest { latest, .. }] if latest == "2.0"
    );
}

#[test]
fn stale_version_download_warns() {
    let (_temp, app) = setup(MockArchive::with_index(INDEX), MockPrompt::default());
    let sink = Recorder::default();
    app.download(&request("1.0"), DownloadOptions::default(), &sink)
        .unwrap();
    assert_matches!(
        sink.advisories.borrow().as_slice(),
        [Advisory::StaleVersion { requested, latest, .. }] if requested == "1.0" && latest == "2.0"
    );
}

#[test]
fn check_refuses_ambiguous_latest() {
    let (_temp, app) = setup(MockArchive::with_index(INDEX), MockPrompt::default());
    let sink = Recorder::default();
    app.download(&request("1.0"), DownloadOptions::default(), &sink)
        .unwrap();
    let downloads_before = app.archive().downloads.lock().unwrap().len();

    let err = app
        .check(&dataset(), &VersionRequest::Latest, &sink)
        .unwrap_err();
    assert_matches!(
        err,
        ProteoError::AmbiguousLatest { index_latest, latest_installed, .. }
            if index_latest == "2.0" && latest_installed == "1.0"
    );
    assert_eq!(app.archive().downloads.lock().unwrap().len(), downloads_before);

    let checked = app
        .check(&dataset(), &"1.0".parse().unwrap(), &sink)
        .unwrap();
    assert_eq!(checked.files.len(), 3);
}

#[test]
fn check_names_missing_file() {
    let (_temp, app) = setup(MockArchive::with_index(INDEX), MockPrompt::default());
    let sink = Recorder::default();
    app.download(&request("2.0"), DownloadOptions::default(), &sink)
        .unwrap();
    let version_dir = app.store().version_dir(&dataset(), "2.0");
    std::fs::remove_file(version_dir.join("bcm_brca_clinical_v2.tsv").as_std_path()).unwrap();

    let err = app
        .check(&dataset(), &VersionRequest::Latest, &sink)
        .unwrap_err();
    assert_matches!(err, ProteoError::MissingFile { file, .. } if file == "bcm_brca_clinical_v2.tsv");

    let err = app
        .check(&dataset(), &"1.0".parse().unwrap(), &sink)
        .unwrap_err();
    assert_matches!(err, ProteoError::DataVersionNotInstalled { version, .. } if version == "1.0");
}

#[test]
fn open_loads_tables_through_descriptor() {
    let (_temp, app) = setup(MockArchive::with_index(INDEX), MockPrompt::default());
    let sink = Recorder::default();
    app.download(&request("1.0"), DownloadOptions::default(), &sink)
        .unwrap();

    let dataset_dir = app.store().dataset_path(&dataset()).unwrap();
    let index = load_index(&dataset_dir, &dataset()).unwrap();
    let descriptor = TsvDataset::from_index(dataset(), &index);

    let loaded = app
        .open(&descriptor, &"1.0".parse().unwrap(), &sink)
        .unwrap();
    assert_eq!(loaded.version, "1.0");
    assert_eq!(
        loaded.tables.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["annotation", "mapping", "proteomics"]
    );
    let proteomics = loaded.table("proteomics").unwrap();
    assert_eq!(proteomics.len(), 1);
    assert_matches!(loaded.table("cnv"), Err(ProteoError::UnknownDatatype(_)));
}

#[test]
fn open_rejects_versions_the_descriptor_cannot_handle() {
    let (_temp, app) = setup(MockArchive::with_index(INDEX), MockPrompt::default());
    let sink = Recorder::default();
    app.download(&request("2.0"), DownloadOptions::default(), &sink)
        .unwrap();

    let descriptor = TsvDataset::new(dataset()).with_file(
        "1.0",
        "annotation",
        "bcm_brca_clinical.tsv",
    );
    let err = app
        .open(&descriptor, &VersionRequest::Latest, &sink)
        .unwrap_err();
    assert_matches!(err, ProteoError::PackageCannotHandleDataVersion { version, .. } if version == "2.0");
}

#[test]
fn missing_index_without_network_is_no_internet() {
    let archive = MockArchive {
        index: None,
        ..MockArchive::with_index(INDEX)
    };
    let (_temp, app) = setup(archive, MockPrompt::default());
    let err = app
        .download(&request("latest"), DownloadOptions::default(), &Recorder::default())
        .unwrap_err();
    assert_matches!(err, ProteoError::NoInternet(_));
}

#[test]
fn unknown_dataset_is_invalid_parameter() {
    let (_temp, app) = setup(MockArchive::with_index(INDEX), MockPrompt::default());
    let request = DownloadRequest::new("pdc_ccrcc".parse().unwrap());
    let err = app
        .download(&request, DownloadOptions::default(), &Recorder::default())
        .unwrap_err();
    assert_matches!(err, ProteoError::InvalidParameter(message) if message.contains("pdc is not a valid source for ccrcc"));
}

#[test]
fn file_missing_from_record_is_remote_error() {
    let mut archive = MockArchive::with_index(INDEX);
    archive.files.remove("bcm_brca_mapping.tsv");
    let (_temp, app) = setup(archive, MockPrompt::default());
    let err = app
        .download(&request("1.0"), DownloadOptions::default(), &Recorder::default())
        .unwrap_err();
    assert_matches!(err, ProteoError::RemoteFileNotFound { file, .. } if file == "bcm_brca_mapping.tsv");
}

#[test]
fn non_interactive_prompt_fails_instead_of_blocking() {
    let archive = MockArchive::with_index(INDEX).refuse("bcm_brca_clinical.tsv", 1);
    let (_temp, app) = setup(archive, NonInteractivePrompt);
    let err = app
        .download(&request("1.0"), DownloadOptions::default(), &Recorder::default())
        .unwrap_err();
    assert_matches!(err, ProteoError::PasswordRequired(prompt) if prompt.contains("bcm_brca"));
}

#[test]
fn versions_and_list_report_install_state() {
    let (_temp, app) = setup(MockArchive::with_index(INDEX), MockPrompt::default());
    let sink = Recorder::default();
    app.download(&request("1.0"), DownloadOptions::default(), &sink)
        .unwrap();

    let versions = app.versions(&dataset(), &sink).unwrap();
    assert_eq!(versions.index_versions, vec!["1.0", "2.0"]);
    assert_eq!(versions.installed_versions, vec!["1.0"]);
    assert_eq!(versions.index_latest.as_deref(), Some("2.0"));
    assert_eq!(versions.latest_installed.as_deref(), Some("1.0"));

    let listed = app.list(&sink).unwrap();
    assert_eq!(listed.datasets.len(), 1);
    assert_eq!(listed.datasets[0].dataset, "bcm_brca");
    assert_eq!(listed.datasets[0].installed_versions, vec!["1.0"]);
}
