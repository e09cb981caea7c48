//! Folder-level read and update helpers: the directory report and in-place
//! aux updates.

use crate::error::Result;
use crate::pplx::{FileInfo, PplxDocument};
use crate::scanner::scan_folder;
use pplx_common::{AuxSlot, FieldChange};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub info: Option<FileInfo>,
    pub aux_data: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirectoryReport {
    pub total_files: usize,
    pub files: BTreeMap<String, FileSummary>,
}

/// Header info and aux data of every PPLX in `dir`. Unreadable files are
/// listed with their error.
pub fn directory_report(dir: &Path) -> Result<DirectoryReport> {
    let sources = scan_folder(dir)?;
    let mut files = BTreeMap::new();
    for source in &sources {
        let name = source.file_name();
        let summary = match source
            .read()
            .and_then(|bytes| PplxDocument::parse(&name, &bytes))
            .and_then(|doc| Ok((doc.file_info(), doc.aux_data(0)?)))
        {
            Ok((info, aux_data)) => FileSummary {
                info: Some(info),
                aux_data,
                error: None,
            },
            Err(err) => FileSummary {
                info: None,
                aux_data: BTreeMap::new(),
                error: Some(err.to_string()),
            },
        };
        files.insert(name, summary);
    }
    Ok(DirectoryReport {
        total_files: sources.len(),
        files,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateResult {
    pub changes: Vec<FieldChange>,
    pub error: Option<String>,
}

/// Set one aux slot in place on every PPLX in `dir` whose name contains
/// `pattern` (`*` or `None` matches all). Files are only rewritten when a
/// value changed.
pub fn batch_update_aux(
    dir: &Path,
    slot: AuxSlot,
    value: &str,
    pattern: Option<&str>,
) -> Result<BTreeMap<String, UpdateResult>> {
    let mut results = BTreeMap::new();
    for source in scan_folder(dir)? {
        let name = source.file_name();
        let selected = match pattern {
            None | Some("*") => true,
            Some(p) => name.contains(p),
        };
        if !selected {
            continue;
        }
        let crate::scanner::PplxSource::File(path) = &source else {
            continue;
        };

        let result = PplxDocument::load(path).and_then(|mut doc| {
            let changes = doc.set_aux_data(slot, value, 0)?;
            if !changes.is_empty() {
                doc.save(path)?;
            }
            Ok(changes)
        });
        let entry = match result {
            Ok(changes) => UpdateResult { changes, error: None },
            Err(err) => {
                warn!(file = %name, error = %err, "update failed");
                UpdateResult {
                    changes: Vec::new(),
                    error: Some(err.to_string()),
                }
            }
        };
        results.insert(name, entry);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pplx::tests::SAMPLE;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_directory_report_lists_errors() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("1_Ocalc.pplx"), SAMPLE).unwrap();
        fs::write(dir.path().join("2_Ocalc.pplx"), "<broken").unwrap();

        let report = directory_report(dir.path()).unwrap();
        assert_eq!(report.total_files, 2);
        assert!(report.files["1_Ocalc.pplx"].error.is_none());
        assert_eq!(report.files["1_Ocalc.pplx"].aux_data["Aux Data 1"], "OLD");
        assert!(report.files["2_Ocalc.pplx"].error.is_some());
    }

    #[test]
    fn test_batch_update_pattern() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("1_Ocalc.pplx"), SAMPLE).unwrap();
        fs::write(dir.path().join("2_other.pplx"), SAMPLE).unwrap();

        let results = batch_update_aux(dir.path(), AuxSlot::FLAG, "YES", Some("Ocalc")).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results["1_Ocalc.pplx"].changes.len(), 1);

        let again = batch_update_aux(dir.path(), AuxSlot::FLAG, "YES", None).unwrap();
        assert!(again["1_Ocalc.pplx"].changes.is_empty());
        assert_eq!(again["2_other.pplx"].changes.len(), 1);
    }
}
