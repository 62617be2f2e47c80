use std::collections::BTreeMap;
use std::fs;

use camino::Utf8Path;

use crate::error::ProteoError;

/// Name of the per-dataset URL manifest shipped with each dataset directory.
pub const URL_MANIFEST_FILE: &str = "index_urls.tsv";

/// Reads a two-column tab-separated file into a map. Blank lines are
/// skipped; any other line without a second column is rejected.
pub fn parse_tsv_dict(path: &Utf8Path) -> Result<BTreeMap<String, String>, ProteoError> {
    if !path.as_std_path().is_file() {
        return Err(ProteoError::MissingFile {
            file: path.to_string(),
            remedy: "Reinstall the dataset directory to restore it.".to_string(),
        });
    }
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|err| ProteoError::Filesystem(err.to_string()))?;
    parse_tsv_dict_str(&content).map_err(|line| ProteoError::MalformedManifest {
        path: path.as_std_path().to_path_buf(),
        line,
    })
}

/// Parses manifest text, returning the 1-based number of the first
/// malformed line on failure.
pub fn parse_tsv_dict_str(content: &str) -> Result<BTreeMap<String, String>, usize> {
    let mut map = BTreeMap::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        let key = fields.next().unwrap_or_default();
        let Some(value) = fields.next() else {
            return Err(number + 1);
        };
        map.insert(key.to_string(), value.to_string());
    }
    Ok(map)
}
