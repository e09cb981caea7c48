//! Nodes sheet loader
//!
//! Reads the `nodes` worksheet of a Katapult-style export into a table keyed by
//! SCID. Only pole rows that are not underground are kept.

use crate::error::{PplxError, Result};
use calamine::{open_workbook_auto, Data, Reader};
use pplx_common::{normalize_scid_for_lookup, scid_lookup_candidates, NodeFacts};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info, warn};

pub const NODES_SHEET: &str = "nodes";
pub const REQUIRED_COLUMNS: [&str; 3] = ["scid", "node_type", "pole_status"];
pub const OPTIONAL_COLUMNS: [&str; 3] = ["mr_note", "pole_tag_company", "pole_tag_tagtext"];

/// One kept row, every column by lower-cased header
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeRow {
    pub scid: String,
    pub columns: BTreeMap<String, String>,
}

impl NodeRow {
    pub fn get(&self, column: &str) -> &str {
        self.columns.get(column).map(String::as_str).unwrap_or("")
    }

    pub fn mr_note(&self) -> &str {
        self.get("mr_note")
    }

    pub fn facts(&self) -> NodeFacts {
        NodeFacts {
            company: self.get("pole_tag_company").to_string(),
            tag_text: self.get("pole_tag_tagtext").to_string(),
            mr_note: self.mr_note().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub total_rows: usize,
    pub valid: usize,
    pub skipped_no_scid: usize,
    pub skipped_filtered: usize,
}

#[derive(Debug, Clone, Default)]
pub struct NodeTable {
    rows: HashMap<String, NodeRow>,
    /// normalized SCID -> key in `rows`
    normalized: HashMap<String, String>,
    stats: LoadStats,
    missing_optional: Vec<String>,
}

/// Cell text. Whole floats print without the fraction (`1.0` -> `1`).
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::Error(_) => String::new(),
        other => other.to_string().trim().to_string(),
    }
}

impl NodeTable {
    /// Load the nodes sheet of `path`
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PplxError::FileNotFound(path.display().to_string()));
        }
        let mut workbook = open_workbook_auto(path)?;
        let sheet = workbook
            .sheet_names()
            .into_iter()
            .find(|name| name.trim().eq_ignore_ascii_case(NODES_SHEET))
            .ok_or_else(|| PplxError::MissingSheet(NODES_SHEET.to_string()))?;
        let range = workbook.worksheet_range(&sheet)?;

        let grid = range
            .rows()
            .map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>());
        let table = Self::from_grid(grid)?;

        let stats = table.stats;
        info!(
            file = %path.display(),
            total = stats.total_rows,
            valid = stats.valid,
            no_scid = stats.skipped_no_scid,
            filtered = stats.skipped_filtered,
            "nodes sheet loaded"
        );
        Ok(table)
    }

    /// Build from rows of cell text; the first row is the header
    pub fn from_grid<I>(mut grid: I) -> Result<Self>
    where
        I: Iterator<Item = Vec<String>>,
    {
        let headers: Vec<String> = grid
            .next()
            .unwrap_or_default()
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect();

        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|c| !headers.iter().any(|h| h == *c))
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(PplxError::SchemaMismatch(missing));
        }

        let missing_optional: Vec<String> = OPTIONAL_COLUMNS
            .iter()
            .filter(|c| !headers.iter().any(|h| h == *c))
            .map(|c| c.to_string())
            .collect();
        if !missing_optional.is_empty() {
            warn!(columns = ?missing_optional, "nodes sheet lacks optional columns");
        }

        let mut table = NodeTable {
            missing_optional,
            ..Default::default()
        };

        for cells in grid {
            if cells.iter().all(|c| c.is_empty()) {
                continue;
            }
            table.stats.total_rows += 1;

            let columns: BTreeMap<String, String> = headers
                .iter()
                .zip(cells.into_iter().chain(std::iter::repeat(String::new())))
                .filter(|(h, _)| !h.is_empty())
                .map(|(h, v)| (h.clone(), v))
                .collect();

            let scid = columns.get("scid").cloned().unwrap_or_default();
            if scid.is_empty() {
                table.stats.skipped_no_scid += 1;
                continue;
            }

            let node_type = columns.get("node_type").map(|s| s.to_lowercase()).unwrap_or_default();
            let status = columns.get("pole_status").map(|s| s.to_lowercase()).unwrap_or_default();
            if node_type != "pole" || status == "underground" {
                table.stats.skipped_filtered += 1;
                continue;
            }

            table.stats.valid += 1;
            table
                .normalized
                .insert(normalize_scid_for_lookup(&scid), scid.clone());
            table.rows.insert(scid.clone(), NodeRow { scid, columns });
        }

        debug!(rows = table.rows.len(), "node table built");
        Ok(table)
    }

    pub fn stats(&self) -> LoadStats {
        self.stats
    }

    pub fn missing_optional(&self) -> &[String] {
        &self.missing_optional
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row for an SCID, trying the lookup candidates in order
    pub fn lookup(&self, scid: &str) -> Option<&NodeRow> {
        let candidates = scid_lookup_candidates(scid);
        candidates
            .iter()
            .find_map(|c| self.rows.get(c))
            .or_else(|| {
                candidates
                    .iter()
                    .find_map(|c| self.normalized.get(&normalize_scid_for_lookup(c)))
                    .and_then(|key| self.rows.get(key))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> impl Iterator<Item = Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect::<Vec<_>>())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn test_cell_to_string() {
        assert_eq!(cell_to_string(&Data::Float(1.0)), "1");
        assert_eq!(cell_to_string(&Data::Float(12.5)), "12.5");
        assert_eq!(cell_to_string(&Data::Int(7)), "7");
        assert_eq!(cell_to_string(&Data::String(" a ".into())), "a");
        assert_eq!(cell_to_string(&Data::Empty), "");
    }

    #[test]
    fn test_filters_and_stats() {
        let table = NodeTable::from_grid(grid(&[
            &["SCID", "Node_Type", "pole_status", "mr_note"],
            &["1", "pole", "existing", "Lumen lower"],
            &["", "pole", "existing", ""],
            &["2", "reference", "existing", ""],
            &["3", "POLE", "Underground", ""],
            &["", "", "", ""],
        ]))
        .unwrap();

        assert_eq!(
            table.stats(),
            LoadStats { total_rows: 4, valid: 1, skipped_no_scid: 1, skipped_filtered: 2 }
        );
        assert_eq!(table.lookup("001").unwrap().mr_note(), "Lumen lower");
        assert_eq!(table.missing_optional(), ["pole_tag_company", "pole_tag_tagtext"]);
    }

    #[test]
    fn test_missing_required_columns() {
        let err = NodeTable::from_grid(grid(&[&["scid", "mr_note"]])).unwrap_err();
        match err {
            PplxError::SchemaMismatch(cols) => assert_eq!(cols, vec!["node_type", "pole_status"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_lookup_normalized_sheet_keys() {
        let table = NodeTable::from_grid(grid(&[
            &["scid", "node_type", "pole_status"],
            &["12.1", "pole", ""],
            &["007", "pole", ""],
        ]))
        .unwrap();
        assert!(table.lookup("12.1").is_some());
        assert_eq!(table.lookup("121").unwrap().scid, "12.1");
        assert_eq!(table.lookup("7").unwrap().scid, "007");
        assert!(table.lookup("8").is_none());
    }

    #[test]
    fn test_short_rows_padded() {
        let table = NodeTable::from_grid(grid(&[
            &["scid", "node_type", "pole_status", "pole_tag_tagtext"],
            &["5", "pole", "existing"],
        ]))
        .unwrap();
        assert_eq!(table.lookup("5").unwrap().facts().tag_text, "");
    }
}
