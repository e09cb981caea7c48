//! Fill-details export tests

mod common;

use calamine::{open_workbook_auto, Data, Reader};
use common::{pplx, write_nodes, NODE_HEADERS};
use pplx_batch::error::PplxError;
use pplx_batch::excel::{run_fill_details, FillDetailsJob, NodeTable, FILL_DETAILS_SHEET};
use pplx_batch::pplx::PplxDocument;
use pplx_common::{AuxSlot, Profile};
use std::fs;
use tempfile::tempdir;

/// Pole without Aux Data 5: only existing fields are filled
fn pplx_without_aux5(pole_number: &str) -> String {
    pplx(pole_number, "OLD").replace("        <VALUE NAME=\"Aux Data 5\" TYPE=\"String\">Unset</VALUE>\n", "")
}

#[test]
fn test_fill_details_copies_and_fills() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("pplx_files");
    fs::create_dir_all(&source).unwrap();
    fs::write(source.join("1_Ocalc.pplx"), pplx("1", "OLD")).unwrap();
    fs::write(source.join("2_Ocalc.pplx"), pplx_without_aux5("2")).unwrap();
    fs::write(source.join("5_Ocalc.pplx"), pplx("5", "OLD")).unwrap();

    let excel = dir.path().join("nodes.xlsx");
    write_nodes(
        &excel,
        &NODE_HEADERS,
        &[
            &["1", "pole", "existing", "Lumen lower", "", "nan"],
            &["2", "pole", "existing", "", "MEC", "T-2"],
        ],
    );
    let nodes = NodeTable::load(&excel).unwrap();
    let profile = Profile::from_json(r#"{"comm_keywords": "Lumen"}"#).unwrap();

    let job = FillDetailsJob::new(&source);
    fs::create_dir_all(&job.modified_dir).unwrap();
    fs::write(job.modified_dir.join("stale.pplx"), "old").unwrap();

    let summary = run_fill_details(&job, &nodes, &profile).unwrap();
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.updated, 2);
    assert_eq!(summary.failed, 0);
    assert!(summary.workbook_written);
    assert!(!job.modified_dir.join("stale.pplx").exists());

    let first = PplxDocument::load(&job.modified_dir.join("1_Ocalc.pplx")).unwrap();
    assert_eq!(first.aux_value(AuxSlot::OWNER, 0).unwrap().as_deref(), Some("XCEL"));
    assert_eq!(first.aux_value(AuxSlot::POLE_TAG, 0).unwrap().as_deref(), Some("NO TAG"));
    assert_eq!(first.aux_value(AuxSlot::MAKE_READY, 0).unwrap().as_deref(), Some("COMM MAKE READY"));

    let second = PplxDocument::load(&job.modified_dir.join("2_Ocalc.pplx")).unwrap();
    assert_eq!(second.aux_value(AuxSlot::OWNER, 0).unwrap().as_deref(), Some("MEC"));
    assert!(second.aux_value(AuxSlot::FLAG, 0).unwrap().is_none());

    // sources are untouched
    let original = PplxDocument::load(&source.join("1_Ocalc.pplx")).unwrap();
    assert_eq!(original.aux_value(AuxSlot::OWNER, 0).unwrap().as_deref(), Some("OLD"));

    let mut workbook = open_workbook_auto(&job.output).unwrap();
    let range = workbook.worksheet_range(FILL_DETAILS_SHEET).unwrap();
    assert_eq!(range.height(), 3);
    assert_eq!(range.get((0, 6)), Some(&Data::String("mr_note".to_string())));
    assert_eq!(range.get((2, 5)), Some(&Data::String("Unset".to_string())));
}

#[test]
fn test_fill_details_requires_rows() {
    let dir = tempdir().unwrap();
    let excel = dir.path().join("nodes.xlsx");
    write_nodes(&excel, &NODE_HEADERS, &[&["1", "reference", "", "", "", ""]]);
    let nodes = NodeTable::load(&excel).unwrap();
    let job = FillDetailsJob::new(dir.path());
    assert!(run_fill_details(&job, &nodes, &Profile::default()).is_err());
}

/// Only files directly in the source folder are copied
#[test]
fn test_fill_details_ignores_subfolders() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("pplx_files");
    fs::create_dir_all(source.join("a")).unwrap();
    fs::create_dir_all(source.join("b")).unwrap();
    fs::write(source.join("a").join("1_Ocalc.pplx"), pplx("1", "A")).unwrap();
    fs::write(source.join("b").join("1_Ocalc.pplx"), pplx("1", "B")).unwrap();
    fs::write(source.join("2_Ocalc.pplx"), pplx("2", "OLD")).unwrap();

    let excel = dir.path().join("nodes.xlsx");
    write_nodes(
        &excel,
        &NODE_HEADERS,
        &[&["1", "pole", "", "", "", ""], &["2", "pole", "", "", "MEC", "T-2"]],
    );
    let nodes = NodeTable::load(&excel).unwrap();

    let job = FillDetailsJob::new(&source);
    let summary = run_fill_details(&job, &nodes, &Profile::default()).unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.skipped, 0);

    let copied: Vec<String> = fs::read_dir(&job.modified_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(copied, vec!["2_Ocalc.pplx"]);

    let mut workbook = open_workbook_auto(&job.output).unwrap();
    let range = workbook.worksheet_range(FILL_DETAILS_SHEET).unwrap();
    assert_eq!(range.height(), 2);
}

/// A modified folder that contains the source folder is refused
#[test]
fn test_fill_details_refuses_source_as_modified() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("pplx_files");
    fs::create_dir_all(&source).unwrap();
    fs::write(source.join("1_Ocalc.pplx"), pplx("1", "OLD")).unwrap();
    let excel = dir.path().join("nodes.xlsx");
    write_nodes(&excel, &NODE_HEADERS, &[&["1", "pole", "", "", "", ""]]);
    let nodes = NodeTable::load(&excel).unwrap();

    for modified in [source.clone(), dir.path().to_path_buf()] {
        let mut job = FillDetailsJob::new(&source);
        job.modified_dir = modified;
        let err = run_fill_details(&job, &nodes, &Profile::default()).unwrap_err();
        assert!(matches!(err, PplxError::Config(_)));
        assert!(source.join("1_Ocalc.pplx").exists());
    }
}
