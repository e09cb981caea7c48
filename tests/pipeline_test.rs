//! Batch pipeline integration tests
//!
//! Runs whole batches against temp folders: partial failure, change-log
//! contents, idempotence, SCID matching, duplicates, archives and cancellation.

mod common;

use calamine::{open_workbook_auto, Reader};
use common::{pplx, write_nodes, NODE_HEADERS};
use pplx_batch::batch::{run_batch, BatchEvent, BatchHandle, BatchJob, BatchPhase, CancelToken};
use pplx_batch::error::PplxError;
use pplx_batch::pplx::PplxDocument;
use pplx_batch::processor::FileStatus;
use pplx_common::{Category, Profile};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn profile() -> Profile {
    Profile::from_json(
        r#"{
            "comm_keywords": "Lumen, Cox",
            "power_keywords": "OPPD",
            "pco_keywords": "replace pole",
            "aux5_keywords": "guy",
            "power_label": "OPPD",
            "auto_fill_aux1": true,
            "auto_fill_aux2": true
        }"#,
    )
    .unwrap()
}

fn job(inputs: Vec<(Category, PathBuf)>, excel: Option<PathBuf>, out: &Path) -> BatchJob {
    BatchJob {
        inputs,
        excel,
        output_root: out.to_path_buf(),
        profile: profile(),
        timestamp: "20240301_120000".to_string(),
    }
}

fn run(job: &BatchJob) -> (pplx_batch::batch::BatchReport, Vec<BatchEvent>) {
    let mut events = Vec::new();
    let report = run_batch(job, &CancelToken::new(), &mut |e| events.push(e)).unwrap();
    (report, events)
}

fn pole_values(path: &Path) -> BTreeMap<String, String> {
    PplxDocument::load(path)
        .unwrap()
        .pole_attributes(0)
        .unwrap()
        .into_iter()
        .map(|a| (a.name, a.value))
        .collect()
}

fn standard_fixture(root: &Path) -> (PathBuf, PathBuf) {
    let existing = root.join("existing");
    fs::create_dir_all(&existing).unwrap();
    fs::write(existing.join("1_Ocalc.pplx"), pplx("1", "OLD")).unwrap();
    fs::write(existing.join("2_Ocalc.pplx"), pplx("2", "OLD")).unwrap();
    fs::write(existing.join("3_Ocalc.pplx"), "<PPLXML><WoodPole>").unwrap();
    fs::write(existing.join("9_Ocalc.pplx"), pplx("9", "OLD")).unwrap();

    let excel = root.join("Job42 nodes.xlsx");
    write_nodes(
        &excel,
        &NODE_HEADERS,
        &[
            &["1", "pole", "existing", "Lumen to lower", "XCEL", "T-1"],
            &["2", "pole", "existing", "Replace pole, OPPD guy", "MEC", "T-2"],
            &["3", "pole", "existing", "", "XCEL", ""],
            &["4", "pole", "underground", "", "XCEL", ""],
        ],
    );
    (existing, excel)
}

/// One malformed file among valid ones fails alone
#[test]
fn test_partial_failure() {
    let dir = tempdir().unwrap();
    let (existing, excel) = standard_fixture(dir.path());
    let out = dir.path().join("out");

    let (report, events) = run(&job(vec![(Category::Existing, existing)], Some(excel), &out));

    assert_eq!(report.success_count(), 2);
    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.skipped_count(), 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].file_name, "3_Ocalc.pplx");

    let written: Vec<String> = fs::read_dir(out.join("EXISTING"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(written.len(), 2);
    assert!(out.join("EXISTING").join("1_T-1_EXISTING.pplx").exists());
    assert!(out.join("EXISTING").join("2 PCO_T-2_EXISTING.pplx").exists());

    let phases: Vec<BatchPhase> = events
        .iter()
        .filter_map(|e| match e {
            BatchEvent::Phase(p) => Some(*p),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        vec![BatchPhase::Scanning, BatchPhase::Processing, BatchPhase::Reporting, BatchPhase::Idle]
    );
}

/// Aux values follow the profile and node row
#[test]
fn test_assigned_values() {
    let dir = tempdir().unwrap();
    let (existing, excel) = standard_fixture(dir.path());
    let out = dir.path().join("out");
    run(&job(vec![(Category::Existing, existing)], Some(excel), &out));

    let first = pole_values(&out.join("EXISTING").join("1_T-1_EXISTING.pplx"));
    assert_eq!(first["Aux Data 1"], "XCEL");
    assert_eq!(first["Owner"], "XCEL");
    assert_eq!(first["Aux Data 2"], "T-1");
    assert_eq!(first["Aux Data 3"], "EXISTING");
    assert_eq!(first["Aux Data 4"], "COMM MAKE READY");
    assert_eq!(first["Aux Data 5"], "NO");
    assert_eq!(first["DescriptionOverride"], "1_T-1_EXISTING");

    let second = pole_values(&out.join("EXISTING").join("2 PCO_T-2_EXISTING.pplx"));
    assert_eq!(second["Aux Data 4"], "PCO");
    assert_eq!(second["Aux Data 5"], "YES");
    assert_eq!(second["Pole Number"], "2 PCO");
}

/// Change rows are exactly the fields that differ between input and output
#[test]
fn test_change_log_matches_diff() {
    let dir = tempdir().unwrap();
    let (existing, excel) = standard_fixture(dir.path());
    let out = dir.path().join("out");
    let (report, _) = run(&job(vec![(Category::Existing, existing.clone())], Some(excel), &out));

    let mut logged_total = 0;
    for outcome in report.files.iter().filter(|f| f.status == FileStatus::Success) {
        let before = pole_values(&existing.join(&outcome.file_name));
        let after = pole_values(outcome.output.as_ref().unwrap());

        let mut diff: Vec<(String, String)> = after
            .iter()
            .filter(|(name, value)| before.get(*name) != Some(*value))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        let mut logged: Vec<(String, String)> = outcome
            .changes
            .iter()
            .map(|c| (c.field.clone(), c.after.clone()))
            .collect();
        diff.sort();
        logged.sort();
        assert_eq!(logged, diff, "{}", outcome.file_name);
        logged_total += logged.len();
    }

    let log_path = report.categories[0].change_log.clone().unwrap();
    assert_eq!(log_path, out.join("EXISTING_change_log_20240301_120000.xlsx"));
    let mut workbook = open_workbook_auto(&log_path).unwrap();
    let changes = workbook.worksheet_range("Changes").unwrap();
    assert_eq!(changes.height(), logged_total + 1);
    let aux = workbook.worksheet_range("Aux Data").unwrap();
    assert_eq!(aux.height(), 3);
}

/// Processing an already processed file changes nothing
#[test]
fn test_rerun_is_idempotent() {
    let dir = tempdir().unwrap();
    let (existing, excel) = standard_fixture(dir.path());
    let out = dir.path().join("out");
    run(&job(vec![(Category::Existing, existing)], Some(excel.clone()), &out));

    let out2 = dir.path().join("out2");
    let (report, _) = run(&job(vec![(Category::Existing, out.join("EXISTING"))], Some(excel), &out2));
    let successes: Vec<_> = report.files.iter().filter(|f| f.status == FileStatus::Success).collect();
    assert!(!successes.is_empty());
    for outcome in successes {
        assert!(outcome.changes.is_empty(), "{} changed: {:?}", outcome.file_name, outcome.changes);
    }
}

/// Representative file names resolve to their sheet rows
#[test]
fn test_scid_patterns_match_rows() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in");
    fs::create_dir_all(&input).unwrap();
    for name in ["001_Ocalc.pplx", "12.1_Ocalc.pplx", "A7.pplx", "45_T-100_EXISTING.pplx"] {
        fs::write(input.join(name), pplx("x", "OLD")).unwrap();
    }
    let excel = dir.path().join("nodes.xlsx");
    write_nodes(
        &excel,
        &NODE_HEADERS,
        &[
            &["1", "pole", "", "", "", "TAG1"],
            &["121", "pole", "", "", "", "TAG121"],
            &["A7", "pole", "", "", "", "TAGA7"],
            &["45", "pole", "", "", "", "TAG45"],
        ],
    );

    let out = dir.path().join("out");
    let (report, _) = run(&job(vec![(Category::Proposed, input)], Some(excel), &out));
    assert_eq!(report.success_count(), 4, "{:?}", report.errors);

    let tags: BTreeMap<String, String> = report
        .files
        .iter()
        .map(|f| {
            let values = pole_values(f.output.as_ref().unwrap());
            (f.file_name.clone(), values["Aux Data 2"].clone())
        })
        .collect();
    assert_eq!(tags["001_Ocalc.pplx"], "TAG1");
    assert_eq!(tags["12.1_Ocalc.pplx"], "TAG121");
    assert_eq!(tags["A7.pplx"], "TAGA7");
    assert_eq!(tags["45_T-100_EXISTING.pplx"], "TAG45");
}

/// Two files for one structure: the second is rejected
#[test]
fn test_duplicate_scid_rejected() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in");
    fs::create_dir_all(&input).unwrap();
    fs::write(input.join("007_pole.pplx"), pplx("7", "OLD")).unwrap();
    fs::write(input.join("7_Ocalc.pplx"), pplx("7", "OLD")).unwrap();
    let excel = dir.path().join("nodes.xlsx");
    write_nodes(&excel, &NODE_HEADERS, &[&["7", "pole", "", "", "", ""]]);

    let out = dir.path().join("out");
    let (report, _) = run(&job(vec![(Category::Existing, input)], Some(excel), &out));
    assert_eq!(report.success_count(), 1);
    assert_eq!(report.failed_count(), 1);
    assert!(report.errors[0].error.contains("Duplicate SCID"));
}

/// A file that fails does not claim its structure
#[test]
fn test_failed_file_keeps_scid_free() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in");
    fs::create_dir_all(&input).unwrap();
    fs::write(input.join("007_pole.pplx"), "<PPLXML><WoodPole>").unwrap();
    fs::write(input.join("7_Ocalc.pplx"), pplx("7", "OLD")).unwrap();
    let excel = dir.path().join("nodes.xlsx");
    write_nodes(&excel, &NODE_HEADERS, &[&["7", "pole", "", "", "", ""]]);

    let out = dir.path().join("out");
    let (report, _) = run(&job(vec![(Category::Existing, input)], Some(excel), &out));
    assert_eq!(report.success_count(), 1);
    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.errors[0].file_name, "007_pole.pplx");
    assert!(!report.errors[0].error.contains("Duplicate SCID"));
    let written = report.files.iter().find(|f| f.status == FileStatus::Success).unwrap();
    assert_eq!(written.file_name, "7_Ocalc.pplx");
}

/// Distinct SCIDs that clean to one output name are both written, with a warning
#[test]
fn test_output_collision_is_reported() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in");
    fs::create_dir_all(&input).unwrap();
    fs::write(input.join("1#2_Ocalc.pplx"), pplx("1", "OLD")).unwrap();
    fs::write(input.join("12_Ocalc.pplx"), pplx("12", "OLD")).unwrap();

    let out = dir.path().join("out");
    let (report, _) = run(&job(vec![(Category::Existing, input)], None, &out));
    assert_eq!(report.success_count(), 2, "{:?}", report.errors);
    assert_eq!(report.files[0].output, report.files[1].output);
    assert!(report.files[1]
        .logs
        .iter()
        .any(|l| l.contains("overwrote the output of 1#2_Ocalc.pplx")));
}

/// Categories from a folder and a ZIP archive in one run
#[test]
fn test_zip_input_and_both_categories() {
    let dir = tempdir().unwrap();
    let (existing, excel) = standard_fixture(dir.path());

    let archive = dir.path().join("proposed.zip");
    let mut zip = zip::ZipWriter::new(fs::File::create(&archive).unwrap());
    zip.start_file("job/1_Ocalc.pplx", zip::write::FileOptions::<()>::default())
        .unwrap();
    zip.write_all(pplx("1", "OLD").as_bytes()).unwrap();
    zip.finish().unwrap();

    let out = dir.path().join("out");
    let (report, _) = run(&job(
        vec![(Category::Existing, existing), (Category::Proposed, archive)],
        Some(excel),
        &out,
    ));
    assert_eq!(report.categories.len(), 2);
    assert_eq!(report.categories[1].success, 1);
    let proposed = pole_values(&out.join("PROPOSED").join("1_T-1_PROPOSED.pplx"));
    assert_eq!(proposed["Aux Data 3"], "PROPOSED");
    assert!(out.join("PROPOSED_change_log_20240301_120000.xlsx").exists());
}

/// Without a nodes sheet every file is processed with fallbacks
#[test]
fn test_unusable_sheet_degrades() {
    let dir = tempdir().unwrap();
    let (existing, _) = standard_fixture(dir.path());
    let excel = dir.path().join("bad.xlsx");
    write_nodes(&excel, &["scid"], &[&["1"]]);

    let out = dir.path().join("out");
    let (report, events) = run(&job(vec![(Category::Existing, existing)], Some(excel), &out));
    assert!(report.node_warning.is_some());
    assert!(events.iter().any(|e| matches!(e, BatchEvent::NodesUnavailable(_))));
    assert_eq!(report.success_count(), 3);
    assert_eq!(report.failed_count(), 1);
}

/// A missing workbook stops the run before anything is written
#[test]
fn test_missing_workbook_is_fatal() {
    let dir = tempdir().unwrap();
    let (existing, _) = standard_fixture(dir.path());
    let out = dir.path().join("out");
    let job = job(
        vec![(Category::Existing, existing)],
        Some(dir.path().join("nope.xlsx")),
        &out,
    );
    let result = run_batch(&job, &CancelToken::new(), &mut |_| {});
    assert!(matches!(result, Err(PplxError::FileNotFound(_))));
    assert!(!out.exists());
}

/// A cancelled run stops before the next file
#[test]
fn test_cancel_before_start() {
    let dir = tempdir().unwrap();
    let (existing, excel) = standard_fixture(dir.path());
    let out = dir.path().join("out");
    let token = CancelToken::new();
    token.cancel();

    let report = run_batch(&job(vec![(Category::Existing, existing)], Some(excel), &out), &token, &mut |_| {}).unwrap();
    assert!(report.cancelled);
    assert!(report.files.is_empty());
    assert!(!out.join("EXISTING").exists());
}

/// Stopping after the first file keeps its output and logs only its changes
#[test]
fn test_cancel_between_files() {
    let dir = tempdir().unwrap();
    let (existing, excel) = standard_fixture(dir.path());
    let out = dir.path().join("out");
    let token = CancelToken::new();
    let stopper = token.clone();
    let mut events = Vec::new();

    let report = run_batch(
        &job(vec![(Category::Existing, existing)], Some(excel), &out),
        &token,
        &mut |event| {
            if let BatchEvent::FileFinished { .. } = event {
                stopper.cancel();
            }
            events.push(event);
        },
    )
    .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.files.len(), 1);
    assert_eq!(report.success_count(), 1);
    let written: Vec<String> = fs::read_dir(out.join("EXISTING"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(written, vec!["1_T-1_EXISTING.pplx"]);

    let log_path = report.categories[0].change_log.clone().unwrap();
    let mut workbook = open_workbook_auto(&log_path).unwrap();
    let aux = workbook.worksheet_range("Aux Data").unwrap();
    assert_eq!(aux.height(), 2);
    let changes = workbook.worksheet_range("Changes").unwrap();
    assert_eq!(changes.height(), report.files[0].changes.len() + 1);

    let cancelled = events.iter().position(|e| matches!(e, BatchEvent::Cancelled)).unwrap();
    let reporting = events
        .iter()
        .position(|e| matches!(e, BatchEvent::Phase(BatchPhase::Reporting)))
        .unwrap();
    assert!(cancelled < reporting);
}

/// The worker thread reports through the channel and hands back the report
#[test]
fn test_worker_thread_events() {
    let dir = tempdir().unwrap();
    let (existing, excel) = standard_fixture(dir.path());
    let out = dir.path().join("out");

    let mut handle = BatchHandle::spawn(job(vec![(Category::Existing, existing)], Some(excel), &out));
    let mut finished = 0;
    while let Some(event) = handle.events.blocking_recv() {
        if let BatchEvent::FileFinished { .. } = event {
            finished += 1;
        }
    }
    let report = handle.join().unwrap();
    assert_eq!(finished, 4);
    assert_eq!(report.success_count(), 2);
}
