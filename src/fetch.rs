use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::archive::{ArchiveClient, ArchiveRecord, Credentials, DownloadStatus};
use crate::error::ProteoError;
use crate::store::Store;

const MD5_PREFIX: &str = "md5:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    Saved(Utf8PathBuf),
    WrongPassword,
}

/// Downloads one named file of an archive record to `destination`.
///
/// The file is found by listing the record and matching the last path
/// segment of its URL exactly. The body lands in a temp file first, is
/// checked against the record's md5 checksum, and only then is written to
/// `destination` in one piece. The temp file is removed either way.
pub fn download_file<A: ArchiveClient + ?Sized>(
    client: &A,
    record: &ArchiveRecord,
    file_name: &str,
    destination: &Utf8Path,
    credentials: &Credentials,
) -> Result<FetchStatus, ProteoError> {
    let files = client
        .list_record_files(record)?
        .ok_or_else(|| ProteoError::RecordNotFound {
            doi: record.doi().to_string(),
        })?;
    let remote = files
        .iter()
        .find(|file| file.name() == file_name)
        .ok_or_else(|| ProteoError::RemoteFileNotFound {
            file: file_name.to_string(),
            doi: record.doi().to_string(),
        })?;

    let temp = tempfile::Builder::new()
        .prefix("proteo-download")
        .tempfile()
        .map_err(|err| ProteoError::Filesystem(err.to_string()))?;
    tracing::debug!(url = %remote.url, temp = %temp.path().display(), "downloading archive file");
    if client.download(&remote.url, temp.path(), credentials)? == DownloadStatus::WrongPassword {
        return Ok(FetchStatus::WrongPassword);
    }
    let content = fs::read(temp.path()).map_err(|err| ProteoError::Filesystem(err.to_string()))?;
    if let Some(checksum) = &remote.checksum {
        verify_checksum(file_name, &content, checksum)?;
    }
    Store::write_bytes_atomic(destination, &content)?;
    temp.close()
        .map_err(|err| ProteoError::Filesystem(err.to_string()))?;
    Ok(FetchStatus::Saved(destination.to_path_buf()))
}

/// Compares `content` with an archive checksum of the form `md5:<hex>`.
/// Checksums in any other algorithm are not verified.
pub fn verify_checksum(file_name: &str, content: &[u8], checksum: &str) -> Result<(), ProteoError> {
    let Some(expected) = checksum.strip_prefix(MD5_PREFIX) else {
        tracing::debug!(file = file_name, checksum, "unsupported checksum algorithm, not verified");
        return Ok(());
    };
    let actual = format!("{:x}", md5::compute(content));
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(ProteoError::DownloadFailed {
            file: file_name.to_string(),
            expected: checksum.to_string(),
            actual: format!("{MD5_PREFIX}{actual}"),
        });
    }
    Ok(())
}
