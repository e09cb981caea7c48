use crate::error::Result;
use crate::excel::LoadStats;
use crate::processor::{FileOutcome, FileStatus};
use pplx_common::Category;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct CategoryReport {
    pub category: Category,
    pub input: String,
    pub total: usize,
    pub success: usize,
    pub skipped: usize,
    pub failed: usize,
    pub change_log: Option<PathBuf>,
    /// Problem with the input itself (unreadable folder or archive)
    pub error: Option<String>,
}

impl CategoryReport {
    pub fn new(category: Category, input: &Path) -> Self {
        Self {
            category,
            input: input.display().to_string(),
            total: 0,
            success: 0,
            skipped: 0,
            failed: 0,
            change_log: None,
            error: None,
        }
    }

    pub fn count(&mut self, status: FileStatus) {
        match status {
            FileStatus::Success => self.success += 1,
            FileStatus::Skipped => self.skipped += 1,
            FileStatus::Failed => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileError {
    pub category: Category,
    pub file_name: String,
    pub source: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub output_root: PathBuf,
    pub timestamp: String,
    pub node_stats: Option<LoadStats>,
    pub node_warning: Option<String>,
    pub categories: Vec<CategoryReport>,
    pub errors: Vec<FileError>,
    pub files: Vec<FileOutcome>,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn new(output_root: &Path, timestamp: &str) -> Self {
        Self {
            output_root: output_root.to_path_buf(),
            timestamp: timestamp.to_string(),
            node_stats: None,
            node_warning: None,
            categories: Vec::new(),
            errors: Vec::new(),
            files: Vec::new(),
            cancelled: false,
        }
    }

    pub fn add_outcome(&mut self, category: Category, outcome: FileOutcome) {
        if let Some(cat) = self.categories.iter_mut().rev().find(|c| c.category == category) {
            cat.count(outcome.status);
        }
        if outcome.status == FileStatus::Failed {
            self.errors.push(FileError {
                category,
                file_name: outcome.file_name.clone(),
                source: outcome.source.clone(),
                error: outcome.error.clone().unwrap_or_default(),
            });
        }
        self.files.push(outcome);
    }

    pub fn success_count(&self) -> usize {
        self.categories.iter().map(|c| c.success).sum()
    }

    pub fn skipped_count(&self) -> usize {
        self.categories.iter().map(|c| c.skipped).sum()
    }

    pub fn failed_count(&self) -> usize {
        self.categories.iter().map(|c| c.failed).sum()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
