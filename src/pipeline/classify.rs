// src/pipeline/classify.rs

//! Partitioning of an observed file set against stored records.

use std::collections::HashMap;

use crate::models::{ClassificationResult, FileRecord, ObservedSet};

/// Classify every observed URL as new, modified, or unchanged.
///
/// URLs that are stored but no longer observed are ignored.
pub fn classify(observed: &ObservedSet, records: &[FileRecord]) -> ClassificationResult {
    let known: HashMap<&str, &FileRecord> =
        records.iter().map(|r| (r.url.as_str(), r)).collect();

    let mut result = ClassificationResult::default();
    for file in &observed.files {
        match known.get(file.url.as_str()) {
            None => result.new_files.push(file.url.clone()),
            Some(record) if record.current_fingerprint == file.fingerprint => {
                result.unchanged_files.push(file.url.clone())
            }
            Some(_) => result.modified_files.push(file.url.clone()),
        }
    }
    result
}
