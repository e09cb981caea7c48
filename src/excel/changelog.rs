//! Change-log workbook
//!
//! One workbook per category and run. Sheet `Aux Data` holds the final aux
//! values of every written file; sheet `Changes` lists each field that was
//! actually modified, with its previous value.

use crate::error::Result;
use pplx_common::{leading_int, Category, FieldChange, AUX_FIELD_COUNT};
use rust_xlsxwriter::{Format, Table, TableColumn, TableStyle, Workbook, Worksheet};
use serde::Serialize;
use std::path::Path;
use tracing::info;

const MAX_COLUMN_WIDTH: usize = 50;

/// Final aux values of one output file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuxRow {
    pub file_name: String,
    pub mr_note: String,
    pub aux: Vec<String>,
}

/// One modified field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeRow {
    pub file_name: String,
    pub scid: String,
    pub category: Category,
    pub field: String,
    pub before: String,
    pub after: String,
}

impl ChangeRow {
    pub fn new(file_name: &str, scid: &str, category: Category, change: &FieldChange) -> Self {
        Self {
            file_name: file_name.to_string(),
            scid: scid.to_string(),
            category,
            field: change.field.clone(),
            before: change.before_display().to_string(),
            after: change.after.clone(),
        }
    }
}

/// Rows accumulated for one category during a run
#[derive(Debug, Clone)]
pub struct ChangeLog {
    category: Category,
    aux_rows: Vec<AuxRow>,
    changes: Vec<ChangeRow>,
}

/// Sheet contents, header first
pub(crate) fn write_sheet(
    worksheet: &mut Worksheet,
    name: &str,
    table_name: &str,
    headers: &[String],
    rows: &[Vec<String>],
) -> Result<()> {
    worksheet.set_name(name)?;

    let header_format = Format::new().set_bold();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();

    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, header, &header_format)?;
    }
    for (r, row) in rows.iter().enumerate() {
        for (col, value) in row.iter().enumerate() {
            worksheet.write_string(r as u32 + 1, col as u16, value)?;
            if let Some(width) = widths.get_mut(col) {
                *width = (*width).max(value.chars().count());
            }
        }
    }

    if !rows.is_empty() && !headers.is_empty() {
        let columns: Vec<TableColumn> = headers
            .iter()
            .map(|h| TableColumn::new().set_header(h))
            .collect();
        let table = Table::new()
            .set_name(table_name)
            .set_style(TableStyle::Medium9)
            .set_columns(&columns);
        worksheet.add_table(0, 0, rows.len() as u32, headers.len() as u16 - 1, &table)?;
    }

    for (col, width) in widths.iter().enumerate() {
        let width = (*width + 2).min(MAX_COLUMN_WIDTH);
        worksheet.set_column_width(col as u16, width as f64)?;
    }
    worksheet.set_freeze_panes(1, 0)?;
    Ok(())
}

pub(crate) fn aux_headers() -> Vec<String> {
    (1..=AUX_FIELD_COUNT).map(|n| format!("Aux Data {}", n)).collect()
}

impl ChangeLog {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            aux_rows: Vec::new(),
            changes: Vec::new(),
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn record(&mut self, aux: AuxRow, changes: Vec<ChangeRow>) {
        self.aux_rows.push(aux);
        self.changes.extend(changes);
    }

    pub fn aux_rows(&self) -> &[AuxRow] {
        &self.aux_rows
    }

    pub fn changes(&self) -> &[ChangeRow] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.aux_rows.is_empty()
    }

    /// Aux rows ordered by the leading number of the file name
    fn sorted_aux_rows(&self) -> Vec<&AuxRow> {
        let mut rows: Vec<&AuxRow> = self.aux_rows.iter().collect();
        rows.sort_by(|a, b| {
            let ka = leading_int(&a.file_name).unwrap_or(u64::MAX);
            let kb = leading_int(&b.file_name).unwrap_or(u64::MAX);
            ka.cmp(&kb).then_with(|| a.file_name.cmp(&b.file_name))
        });
        rows
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut workbook = Workbook::new();

        let mut headers = vec!["File Name".to_string(), "MR Note".to_string()];
        headers.extend(aux_headers());
        let rows: Vec<Vec<String>> = self
            .sorted_aux_rows()
            .into_iter()
            .map(|row| {
                let mut cells = vec![row.file_name.clone(), row.mr_note.clone()];
                cells.extend(row.aux.iter().cloned());
                cells
            })
            .collect();
        write_sheet(workbook.add_worksheet(), "Aux Data", "AuxData", &headers, &rows)?;

        let headers: Vec<String> = ["File Name", "SCID", "Category", "Field", "Before", "After"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let rows: Vec<Vec<String>> = self
            .changes
            .iter()
            .map(|c| {
                vec![
                    c.file_name.clone(),
                    c.scid.clone(),
                    c.category.to_string(),
                    c.field.clone(),
                    c.before.clone(),
                    c.after.clone(),
                ]
            })
            .collect();
        write_sheet(workbook.add_worksheet(), "Changes", "Changes", &headers, &rows)?;

        workbook.save(path)?;
        info!(path = %path.display(), files = self.aux_rows.len(), changes = self.changes.len(), "change log written");
        Ok(())
    }
}

/// `<CATEGORY>_change_log_<timestamp>.xlsx`
pub fn change_log_file_name(category: Category, timestamp: &str) -> String {
    format!("{}_change_log_{}.xlsx", category, timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aux_row(name: &str) -> AuxRow {
        AuxRow {
            file_name: name.to_string(),
            mr_note: String::new(),
            aux: vec!["A".into(); 5],
        }
    }

    #[test]
    fn test_sorted_by_leading_int() {
        let mut log = ChangeLog::new(Category::Existing);
        for name in ["10_x.pplx", "2_x.pplx", "abc.pplx", "1_x.pplx"] {
            log.record(aux_row(name), Vec::new());
        }
        let names: Vec<&str> = log.sorted_aux_rows().iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, vec!["1_x.pplx", "2_x.pplx", "10_x.pplx", "abc.pplx"]);
    }

    #[test]
    fn test_change_row_before_display() {
        let change = FieldChange {
            field: "Aux Data 5".into(),
            before: None,
            after: "YES".into(),
        };
        let row = ChangeRow::new("1.pplx", "1", Category::Proposed, &change);
        assert_eq!(row.before, "Unset");
    }

    #[test]
    fn test_file_name() {
        assert_eq!(
            change_log_file_name(Category::Existing, "20240101_120000"),
            "EXISTING_change_log_20240101_120000.xlsx"
        );
    }

    #[test]
    fn test_write_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.xlsx");
        let mut log = ChangeLog::new(Category::Existing);
        let change = FieldChange {
            field: "Aux Data 1".into(),
            before: Some("OLD".into()),
            after: "XCEL".into(),
        };
        log.record(aux_row("1_x.pplx"), vec![ChangeRow::new("1_x.pplx", "1", Category::Existing, &change)]);
        log.write(&path).unwrap();
        assert!(path.exists());
    }
}
