use std::collections::BTreeSet;

use crate::domain::DatasetId;
use crate::index::FileManifest;
use crate::progress::{Advisory, ProgressSink};

/// Datatypes stored together in files tagged `annotation`.
pub const ANNOTATION_TYPES: &[&str] = &[
    "clinical",
    "derived_molecular",
    "experimental_design",
    "medical_history",
];

/// Always downloaded alongside any selection.
pub const HELPER_TYPES: &[&str] = &["mapping", "definitions"];

const ANNOTATION: &str = "annotation";

/// Narrows a version's manifest to the requested datatypes plus helper
/// files. Requested datatypes with no matching file are reported as a
/// [`Advisory::DatatypeNotInSource`]; the filtered manifest is returned
/// regardless.
pub fn filter_manifest(
    manifest: &FileManifest,
    datatypes: &[String],
    dataset: &DatasetId,
    version: &str,
    sink: &dyn ProgressSink,
) -> FileManifest {
    let requested = datatypes
        .iter()
        .map(|datatype| datatype.trim().to_lowercase())
        .chain(HELPER_TYPES.iter().map(|helper| helper.to_string()))
        .collect::<BTreeSet<_>>();
    let wanted_annotations = ANNOTATION_TYPES
        .iter()
        .filter(|annotation| requested.contains(**annotation))
        .map(|annotation| annotation.to_string())
        .collect::<Vec<_>>();

    let mut found = BTreeSet::new();
    let mut filtered = FileManifest::default();
    for entry in manifest.iter() {
        let file_type = entry.datatype.to_lowercase();
        if file_type == ANNOTATION && !wanted_annotations.is_empty() {
            filtered.insert(entry.clone());
            found.extend(wanted_annotations.iter().cloned());
        } else if HELPER_TYPES.contains(&file_type.as_str()) {
            filtered.insert(entry.clone());
        } else if requested.contains(&file_type) {
            filtered.insert(entry.clone());
            found.insert(file_type);
        }
    }

    let missing = requested
        .iter()
        .filter(|datatype| !HELPER_TYPES.contains(&datatype.as_str()))
        .filter(|datatype| !found.contains(*datatype))
        .cloned()
        .collect::<BTreeSet<_>>();
    if !missing.is_empty() {
        sink.advisory(Advisory::DatatypeNotInSource {
            dataset: dataset.clone(),
            version: version.to_string(),
            missing,
        });
    }

    filtered
}
