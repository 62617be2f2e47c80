use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ProteoError {
    #[error("{0}")]
    InvalidParameter(String),

    #[error(
        "{dataset} dataset is not installed. To install, run `proteo download {dataset}`."
    )]
    DatasetNotInstalled { dataset: String },

    #[error("missing file '{file}'. {remedy}")]
    MissingFile { file: String, remedy: String },

    #[error(
        "data version {version} of {dataset} is not installed. To install, run `proteo download {dataset} --version {version}`."
    )]
    DataVersionNotInstalled { dataset: String, version: String },

    #[error(
        "you requested to load the {dataset} dataset. Latest version is {index_latest}, which is not installed locally. To install it, run `proteo download {dataset}`. To load the version already installed instead, pass `--version {latest_installed}`."
    )]
    AmbiguousLatest {
        dataset: String,
        index_latest: String,
        latest_installed: String,
    },

    #[error(
        "data version {version} cannot be handled by this build, which supports: {supported}. Update proteo-archive, or pin an older data version with `--version`."
    )]
    PackageCannotHandleDataVersion { version: String, supported: String },

    #[error("insufficient internet. Check your internet connection. ({0})")]
    NoInternet(String),

    #[error("archive record not found (DOI: {doi})")]
    RecordNotFound { doi: String },

    #[error("file '{file}' not found in archive record (DOI: {doi})")]
    RemoteFileNotFound { file: String, doi: String },

    #[error(
        "download of '{file}' failed: local and remote files do not match (expected {expected}, got {actual}). Please try again."
    )]
    DownloadFailed {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("malformed manifest {path} at line {line}: expected two tab-separated columns")]
    MalformedManifest { path: PathBuf, line: usize },

    #[error("no URL for '{file}' in {manifest}. Reinstall the dataset directory to restore it.")]
    MissingIndexUrl { file: String, manifest: PathBuf },

    #[error("archive request failed: {0}")]
    ArchiveHttp(String),

    #[error("archive returned status {status}: {message}")]
    ArchiveStatus { status: u16, message: String },

    #[error("a password is required ({0}), but prompting is disabled in non-interactive mode")]
    PasswordRequired(String),

    #[error("password prompt failed: {0}")]
    Prompt(String),

    #[error("missing config file proteo.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to parse table {path}: {message}")]
    TableParse { path: PathBuf, message: String },

    #[error("no loader registered for datatype '{0}'")]
    UnknownDatatype(String),
}
