//! Batch orchestration
//!
//! A batch runs on one background worker thread. The worker never touches the
//! caller's state: everything it has to say goes through a channel of
//! [`BatchEvent`]s, and the caller stops it through a [`CancelToken`] that is
//! checked between files.

mod report;

pub use report::{BatchReport, CategoryReport, FileError};

use crate::error::{PplxError, Result};
use crate::excel::{change_log_file_name, ChangeLog, LoadStats, NodeTable};
use crate::processor::{batch_key, process_file, FileOutcome, FileStatus, ProcessOptions};
use crate::scanner::{scan_input, PplxSource};
use pplx_common::{extract_scid_from_filename, Category, Profile};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::{info, warn};

/// Everything a run needs, owned so it can move to the worker
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub inputs: Vec<(Category, PathBuf)>,
    pub excel: Option<PathBuf>,
    pub output_root: PathBuf,
    pub profile: Profile,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Idle,
    Scanning,
    Processing,
    Reporting,
}

#[derive(Debug, Clone)]
pub enum BatchEvent {
    Phase(BatchPhase),
    NodesLoaded(LoadStats),
    NodesUnavailable(String),
    Scanned { category: Category, files: usize },
    FileStarted { category: Category, index: usize, total: usize, file_name: String },
    FileFinished { category: Category, outcome: Box<FileOutcome> },
    ChangeLogWritten { category: Category, path: PathBuf },
    Cancelled,
}

/// Cooperative stop flag shared with the worker
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct BatchHandle {
    pub events: UnboundedReceiver<BatchEvent>,
    cancel: CancelToken,
    join: JoinHandle<Result<BatchReport>>,
}

impl BatchHandle {
    /// Start `job` on a worker thread
    pub fn spawn(job: BatchJob) -> Self {
        let (tx, events) = unbounded_channel();
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();
        let join = std::thread::spawn(move || {
            run_batch(&job, &worker_cancel, &mut |event| {
                // Receiver gone means nobody is listening; keep working.
                let _ = tx.send(event);
            })
        });
        Self { events, cancel, join }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Wait for the worker and take its report
    pub fn join(self) -> Result<BatchReport> {
        self.join.join().map_err(|_| PplxError::WorkerPanicked)?
    }
}

/// Load node data. A missing workbook is fatal; a workbook without a usable
/// nodes sheet degrades to running without node data.
fn load_nodes(
    job: &BatchJob,
    report: &mut BatchReport,
    emit: &mut dyn FnMut(BatchEvent),
) -> Result<Option<NodeTable>> {
    let Some(path) = &job.excel else {
        return Ok(None);
    };
    match NodeTable::load(path) {
        Ok(table) => {
            report.node_stats = Some(table.stats());
            emit(BatchEvent::NodesLoaded(table.stats()));
            Ok(Some(table))
        }
        Err(err) if err.is_recoverable_excel() => {
            warn!(error = %err, "continuing without node data");
            report.node_warning = Some(err.to_string());
            emit(BatchEvent::NodesUnavailable(err.to_string()));
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Run a batch on the current thread. Per-file failures are recorded in the
/// report; only a missing input set or an unreadable workbook is an error.
pub fn run_batch(job: &BatchJob, cancel: &CancelToken, emit: &mut dyn FnMut(BatchEvent)) -> Result<BatchReport> {
    if job.inputs.is_empty() {
        return Err(PplxError::Config("no input folder or archive selected".to_string()));
    }

    let mut report = BatchReport::new(&job.output_root, &job.timestamp);
    let nodes = load_nodes(job, &mut report, emit)?;

    emit(BatchEvent::Phase(BatchPhase::Scanning));
    let mut scanned: Vec<(Category, Vec<PplxSource>)> = Vec::new();
    for (category, input) in &job.inputs {
        let mut cat_report = CategoryReport::new(*category, input);
        match scan_input(input) {
            Ok(sources) => {
                info!(category = %category, files = sources.len(), input = %input.display(), "scanned");
                cat_report.total = sources.len();
                emit(BatchEvent::Scanned { category: *category, files: sources.len() });
                scanned.push((*category, sources));
            }
            Err(err) => {
                warn!(category = %category, error = %err, "input unreadable");
                cat_report.error = Some(err.to_string());
                scanned.push((*category, Vec::new()));
            }
        }
        report.categories.push(cat_report);
    }

    emit(BatchEvent::Phase(BatchPhase::Processing));
    let mut logs: Vec<ChangeLog> = Vec::new();
    'categories: for (category, sources) in &scanned {
        let opts = ProcessOptions {
            category: *category,
            output_root: &job.output_root,
            nodes: nodes.as_ref(),
            profile: &job.profile,
        };
        let mut log = ChangeLog::new(*category);
        let mut seen: HashMap<String, String> = HashMap::new();
        let mut written: HashMap<PathBuf, String> = HashMap::new();

        for (index, source) in sources.iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                logs.push(log);
                break 'categories;
            }
            let file_name = source.file_name();
            emit(BatchEvent::FileStarted {
                category: *category,
                index,
                total: sources.len(),
                file_name: file_name.clone(),
            });

            let key = duplicate_key(&file_name, nodes.as_ref());
            let mut outcome = match key.as_ref().and_then(|k| seen.get(k).map(|first| (k, first))) {
                Some((scid, first)) => FileOutcome::rejected(
                    source,
                    &PplxError::DuplicateScid {
                        scid: scid.clone(),
                        first: first.clone(),
                    },
                ),
                None => process_file(source, &opts),
            };

            if outcome.status == FileStatus::Success {
                if let Some(key) = key {
                    seen.insert(key, file_name.clone());
                }
                if let Some(output) = &outcome.output {
                    if let Some(previous) = written.insert(output.clone(), file_name.clone()) {
                        warn!(output = %output.display(), previous = %previous, file = %file_name, "output overwritten");
                        outcome.logs.push(format!(
                            "  Warning: {} overwrote the output of {}",
                            file_name, previous
                        ));
                    }
                }
                if let Some(row) = outcome.aux_row.clone() {
                    log.record(row, outcome.changes.clone());
                }
            }
            emit(BatchEvent::FileFinished {
                category: *category,
                outcome: Box::new(outcome.clone()),
            });
            report.add_outcome(*category, outcome);
        }
        logs.push(log);
    }
    if report.cancelled {
        emit(BatchEvent::Cancelled);
    }

    emit(BatchEvent::Phase(BatchPhase::Reporting));
    for log in logs.iter().filter(|l| !l.is_empty()) {
        let path = job
            .output_root
            .join(change_log_file_name(log.category(), &job.timestamp));
        let cat_report = report
            .categories
            .iter_mut()
            .find(|c| c.category == log.category());
        match log.write(&path) {
            Ok(()) => {
                if let Some(cat) = cat_report {
                    cat.change_log = Some(path.clone());
                }
                emit(BatchEvent::ChangeLogWritten { category: log.category(), path });
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "change log not written");
                if let Some(cat) = cat_report {
                    cat.error = Some(format!("change log: {}", err));
                }
            }
        }
    }

    let report_path = job
        .output_root
        .join(format!("batch_report_{}.json", job.timestamp));
    if let Err(err) = report.write_json(&report_path) {
        warn!(path = %report_path.display(), error = %err, "batch report not written");
    }

    info!(
        success = report.success_count(),
        skipped = report.skipped_count(),
        failed = report.failed_count(),
        cancelled = report.cancelled,
        "batch finished"
    );
    emit(BatchEvent::Phase(BatchPhase::Idle));
    Ok(report)
}

/// Key a file claims once it is written. A second file with the same key in
/// one category is rejected. Files that will be skipped have no key.
fn duplicate_key(file_name: &str, nodes: Option<&NodeTable>) -> Option<String> {
    let scid = extract_scid_from_filename(file_name);
    let has_node_data = nodes.is_some_and(|n| !n.is_empty());
    if has_node_data && nodes.and_then(|n| n.lookup(&scid)).is_none() {
        return None;
    }
    Some(batch_key(&scid, nodes))
}
