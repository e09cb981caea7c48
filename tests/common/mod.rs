//! Fixtures shared by the integration tests
#![allow(dead_code)]

use rust_xlsxwriter::Workbook;
use std::path::Path;

/// Minimal PPLX document with one pole
pub fn pplx(pole_number: &str, owner: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<PPLXML DATE="2024-03-01" USER="tester">
  <PPLScene>
    <ATTRIBUTES>
      <VALUE NAME="Latitude" TYPE="Double">41.2</VALUE>
      <VALUE NAME="Longitude" TYPE="Double">-96.0</VALUE>
    </ATTRIBUTES>
    <WoodPole>
      <ATTRIBUTES>
        <VALUE NAME="Pole Number" TYPE="String">{pole_number}</VALUE>
        <VALUE NAME="Owner" TYPE="String">{owner}</VALUE>
        <VALUE NAME="Aux Data 1" TYPE="String">{owner}</VALUE>
        <VALUE NAME="Aux Data 2" TYPE="String">Unset</VALUE>
        <VALUE NAME="Aux Data 3" TYPE="String">Unset</VALUE>
        <VALUE NAME="Aux Data 4" TYPE="String">Unset</VALUE>
        <VALUE NAME="Aux Data 5" TYPE="String">Unset</VALUE>
        <VALUE NAME="DescriptionOverride" TYPE="String"></VALUE>
      </ATTRIBUTES>
    </WoodPole>
  </PPLScene>
</PPLXML>
"#
    )
}

/// Workbook with a `nodes` sheet: header row then data rows
pub fn write_nodes(path: &Path, headers: &[&str], rows: &[&[&str]]) {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("nodes").unwrap();
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string(0, col as u16, *header).unwrap();
    }
    for (r, row) in rows.iter().enumerate() {
        for (col, value) in row.iter().enumerate() {
            sheet.write_string(r as u32 + 1, col as u16, *value).unwrap();
        }
    }
    workbook.save(path).unwrap();
}

pub const NODE_HEADERS: [&str; 6] = [
    "scid",
    "node_type",
    "pole_status",
    "mr_note",
    "pole_tag_company",
    "pole_tag_tagtext",
];
