use super::changelog::{aux_headers, write_sheet};
use super::loader::NodeTable;
use crate::error::{PplxError, Result};
use crate::pplx::PplxDocument;
use crate::scanner::{scan_folder_top_level, PplxSource};
use pplx_common::{extract_scid_from_filename, fill_details_values, AuxSlot, NodeFacts, Profile, UNSET};
use rust_xlsxwriter::Workbook;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const FILL_DETAILS_SHEET: &str = "PPLX Fill Details";
pub const FILL_DETAILS_TABLE: &str = "PPLXData";

#[derive(Debug, Clone)]
pub struct FillDetailsJob {
    pub source_dir: PathBuf,
    pub modified_dir: PathBuf,
    pub output: PathBuf,
}

impl FillDetailsJob {
    /// Modified copies go to `<source>/Modified PPLX`, the workbook to
    /// `PPLX_Fill_Details.xlsx` next to them unless overridden.
    pub fn new(source_dir: &Path) -> Self {
        Self {
            source_dir: source_dir.to_path_buf(),
            modified_dir: source_dir.join("Modified PPLX"),
            output: source_dir.join("PPLX_Fill_Details.xlsx"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FillDetailsSummary {
    pub processed: usize,
    pub skipped: usize,
    pub updated: usize,
    pub failed: usize,
    pub workbook_written: bool,
}

/// Copy one file into `modified_dir`, updating the aux fields it already has.
/// Returns whether anything changed and the final Aux Data 1-5.
fn fill_one(
    source: &PplxSource,
    file_name: &str,
    modified_dir: &Path,
    facts: NodeFacts,
    profile: &Profile,
) -> Result<(bool, Vec<String>)> {
    let bytes = source.read()?;
    let mut doc = PplxDocument::parse(file_name, &bytes)?;

    let values = fill_details_values(profile, Some(&facts));
    let mut changed = false;
    for (slot, value, _) in values.iter() {
        changed |= doc.update_existing_aux(slot, value, 0)?.is_some();
    }

    let target = modified_dir.join(file_name);
    if changed {
        doc.save(&target)?;
    } else {
        std::fs::write(&target, &bytes)?;
    }

    let mut aux = Vec::new();
    for slot in AuxSlot::matched() {
        let value = doc
            .aux_value(slot, 0)?
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| UNSET.to_string());
        aux.push(value);
    }
    Ok((changed, aux))
}

/// Copy every top-level PPLX whose SCID is in the nodes table into the modified folder,
/// apply the default-value rule set to the aux fields the file already has,
/// and write the fill-details workbook.
pub fn run_fill_details(job: &FillDetailsJob, nodes: &NodeTable, profile: &Profile) -> Result<FillDetailsSummary> {
    if nodes.is_empty() {
        return Err(PplxError::ExcelRead("no pole rows in the nodes sheet".to_string()));
    }

    let resolved = |p: &Path| std::fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf());
    if resolved(&job.source_dir).starts_with(resolved(&job.modified_dir)) {
        return Err(PplxError::Config(format!(
            "modified folder {} would remove the source folder {}",
            job.modified_dir.display(),
            job.source_dir.display()
        )));
    }

    if job.modified_dir.exists() {
        std::fs::remove_dir_all(&job.modified_dir)?;
    }
    std::fs::create_dir_all(&job.modified_dir)?;

    let sources = scan_folder_top_level(&job.source_dir)?;

    let mut summary = FillDetailsSummary::default();
    let mut rows: Vec<Vec<String>> = Vec::new();

    for source in &sources {
        let file_name = source.file_name();
        let scid = extract_scid_from_filename(&file_name);
        let Some(node) = nodes.lookup(&scid) else {
            debug!(file = %file_name, scid = %scid, "not in nodes sheet");
            summary.skipped += 1;
            continue;
        };
        summary.processed += 1;

        match fill_one(source, &file_name, &job.modified_dir, node.facts(), profile) {
            Ok((updated, aux)) => {
                if updated {
                    summary.updated += 1;
                }
                let mut row = vec![file_name.clone()];
                row.extend(aux);
                row.push(node.mr_note().to_string());
                rows.push(row);
            }
            Err(err) => {
                warn!(file = %file_name, error = %err, "fill details skipped file");
                summary.failed += 1;
            }
        }
    }

    if !rows.is_empty() {
        let mut headers = vec!["File Name".to_string()];
        headers.extend(aux_headers());
        headers.push("mr_note".to_string());

        if let Some(parent) = job.output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut workbook = Workbook::new();
        write_sheet(
            workbook.add_worksheet(),
            FILL_DETAILS_SHEET,
            FILL_DETAILS_TABLE,
            &headers,
            &rows,
        )?;
        workbook.save(&job.output)?;
        summary.workbook_written = true;
    }

    info!(
        processed = summary.processed,
        skipped = summary.skipped,
        updated = summary.updated,
        failed = summary.failed,
        "fill details finished"
    );
    Ok(summary)
}
