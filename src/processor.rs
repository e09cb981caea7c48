//! Per-file processing: parse, match, cross-reference, mutate, write.

use crate::error::{PplxError, Result};
use crate::excel::{AuxRow, ChangeRow, NodeTable};
use crate::pplx::PplxDocument;
use crate::scanner::PplxSource;
use pplx_common::{
    assign, clean_scid_keywords, extract_scid_from_filename, normalize_scid_for_lookup,
    safe_filename_part, AuxSlot, Category, FieldChange, Profile, UNSET,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const NOTE_PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, Copy)]
pub struct ProcessOptions<'a> {
    pub category: Category,
    /// Run output root; files go to `<output_root>/<CATEGORY>/`
    pub output_root: &'a Path,
    pub nodes: Option<&'a NodeTable>,
    pub profile: &'a Profile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Success,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub file_name: String,
    pub source: String,
    pub scid: String,
    pub status: FileStatus,
    pub logs: Vec<String>,
    #[serde(skip)]
    pub aux_row: Option<AuxRow>,
    #[serde(skip)]
    pub changes: Vec<ChangeRow>,
    pub output: Option<PathBuf>,
    pub error: Option<String>,
}

impl FileOutcome {
    fn new(source: &PplxSource, scid: &str) -> Self {
        Self {
            file_name: source.file_name(),
            source: source.display(),
            scid: scid.to_string(),
            status: FileStatus::Failed,
            logs: Vec::new(),
            aux_row: None,
            changes: Vec::new(),
            output: None,
            error: None,
        }
    }

    /// Outcome for a file refused before it was opened
    pub fn rejected(source: &PplxSource, err: &PplxError) -> Self {
        let scid = extract_scid_from_filename(&source.file_name());
        Self::new(source, &scid).fail(err)
    }

    /// Mark failed without touching the destination
    pub fn fail(mut self, err: &PplxError) -> Self {
        self.logs.push(format!("  Error processing {}: {}", self.file_name, err));
        self.status = FileStatus::Failed;
        self.error = Some(err.to_string());
        self.aux_row = None;
        self.changes.clear();
        self.output = None;
        self
    }
}

/// Key that identifies a structure within a batch: the matched sheet row's
/// SCID when there is one, otherwise the normalized file SCID.
pub fn batch_key(scid: &str, nodes: Option<&NodeTable>) -> String {
    nodes
        .and_then(|n| n.lookup(scid))
        .map(|row| row.scid.clone())
        .unwrap_or_else(|| normalize_scid_for_lookup(scid.trim()))
}

/// `<pole number>[ PCO]_<pole tag>_<CATEGORY>.pplx` and the pole number it uses
pub fn output_file_name(pole_number: &str, pole_tag: &str, category: Category, pco: bool) -> (String, String) {
    let pole_number = if pco {
        format!("{} PCO", pole_number)
    } else {
        pole_number.to_string()
    };
    let safe_number = safe_filename_part(&pole_number, if pco { ". " } else { "" });
    let name = format!(
        "{}_{}_{}.pplx",
        safe_number,
        safe_filename_part(pole_tag, " "),
        safe_filename_part(category.as_str(), "")
    );
    (name, pole_number)
}

fn preview(note: &str) -> String {
    if note.chars().count() > NOTE_PREVIEW_CHARS {
        let head: String = note.chars().take(NOTE_PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        note.to_string()
    }
}

/// Process one document. Errors never escape: a failing file comes back as
/// `FileStatus::Failed` with the error recorded.
pub fn process_file(source: &PplxSource, opts: &ProcessOptions<'_>) -> FileOutcome {
    let file_name = source.file_name();
    let scid = extract_scid_from_filename(&file_name);
    let mut outcome = FileOutcome::new(source, &scid);

    let node = opts.nodes.and_then(|n| n.lookup(&scid));
    let has_node_data = opts.nodes.is_some_and(|n| !n.is_empty());
    if has_node_data && node.is_none() {
        outcome
            .logs
            .push(format!("Skipping {}: SCID '{}' not found in Excel data", file_name, scid));
        outcome.status = FileStatus::Skipped;
        debug!(file = %file_name, scid = %scid, "skipped");
        return outcome;
    }

    match run(source, opts, &scid, node.map(|n| n.facts()), &mut outcome) {
        Ok(()) => {
            outcome.status = FileStatus::Success;
            outcome
        }
        Err(err) => {
            warn!(file = %file_name, error = %err, "file failed");
            outcome.fail(&err)
        }
    }
}

fn run(
    source: &PplxSource,
    opts: &ProcessOptions<'_>,
    scid: &str,
    facts: Option<pplx_common::NodeFacts>,
    outcome: &mut FileOutcome,
) -> Result<()> {
    let file_name = outcome.file_name.clone();
    let pole_number = clean_scid_keywords(scid, &opts.profile.ignore_scid_keywords);
    outcome.logs.push(format!(
        "Processing: {} (SCID: {}, Pole Number: {} -> {})",
        file_name, scid, scid, pole_number
    ));

    let bytes = source.read()?;
    let mut doc = PplxDocument::parse(&file_name, &bytes)?;
    let mut changes: Vec<FieldChange> = Vec::new();

    let assignment = assign(opts.profile, opts.category, facts.as_ref());
    for (slot, value, how) in assignment.iter() {
        changes.extend(doc.set_aux_data(slot, value, 0)?);
        outcome.logs.push(format!("  {} {}: {}", how, slot, value));
    }
    if let Some(facts) = facts.as_ref().filter(|f| !f.mr_note.is_empty()) {
        outcome.logs.push(format!("    Based on mr_note: {}", preview(&facts.mr_note)));
    }

    let pco = assignment.is_pco();
    let (new_name, pole_number) = output_file_name(&pole_number, assignment.pole_tag(), opts.category, pco);
    if pco {
        outcome.logs.push(format!(
            "  Aux Data 4 is 'PCO', appending to pole number: {}",
            pole_number
        ));
    }

    let description = new_name.trim_end_matches(".pplx").to_string();
    for (name, value) in [("Pole Number", pole_number.as_str()), ("DescriptionOverride", description.as_str())] {
        if let Some(change) = set_if_present(&mut doc, name, value, outcome)? {
            changes.push(change);
        }
    }

    let target = opts.output_root.join(opts.category.as_str()).join(&new_name);
    doc.save(&target)?;
    outcome.logs.push(format!("  Saved: {}", new_name));

    let aux = doc.aux_data(0)?;
    let aux_values = AuxSlot::matched()
        .map(|slot| aux.get(&slot.field_name()).cloned().unwrap_or_else(|| UNSET.to_string()))
        .collect();
    outcome.aux_row = Some(AuxRow {
        file_name: file_name.clone(),
        mr_note: facts.map(|f| f.mr_note).unwrap_or_default(),
        aux: aux_values,
    });
    outcome.changes = changes
        .iter()
        .map(|c| ChangeRow::new(&file_name, scid, opts.category, c))
        .collect();
    outcome.output = Some(target);
    Ok(())
}

/// Pole attribute write that tolerates a document without the attribute
fn set_if_present(
    doc: &mut PplxDocument,
    name: &str,
    value: &str,
    outcome: &mut FileOutcome,
) -> Result<Option<FieldChange>> {
    match doc.set_pole_attribute(name, value, 0) {
        Ok(change) => {
            outcome.logs.push(format!("  Set {}: {}", name, value));
            Ok(change)
        }
        Err(PplxError::AttributeNotFound(_)) => {
            warn!(file = %outcome.file_name, attribute = name, "pole attribute missing, left as is");
            outcome.logs.push(format!("  Warning: {} not present, not set", name));
            Ok(None)
        }
        Err(err) => Err(err),
    }
}
