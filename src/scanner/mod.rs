mod archive;

pub use archive::scan_zip;

use crate::error::{PplxError, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const PPLX_EXTENSION: &str = "pplx";

/// One PPLX document to process: a file on disk or a member of a ZIP archive
#[derive(Debug, Clone)]
pub enum PplxSource {
    File(PathBuf),
    ZipMember {
        archive: PathBuf,
        name: String,
        bytes: Vec<u8>,
    },
}

impl PplxSource {
    /// Base file name, used for SCID extraction
    pub fn file_name(&self) -> String {
        match self {
            PplxSource::File(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            PplxSource::ZipMember { name, .. } => name
                .rsplit(['/', '\\'])
                .next()
                .unwrap_or(name)
                .to_string(),
        }
    }

    /// Human-readable location for logs and reports
    pub fn display(&self) -> String {
        match self {
            PplxSource::File(path) => path.display().to_string(),
            PplxSource::ZipMember { archive, name, .. } => format!("{}!{}", archive.display(), name),
        }
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        match self {
            PplxSource::File(path) => Ok(std::fs::read(path)?),
            PplxSource::ZipMember { bytes, .. } => Ok(bytes.clone()),
        }
    }
}

pub(crate) fn is_pplx_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(PPLX_EXTENSION))
}

fn is_zip(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("zip"))
}

/// Every `*.pplx` below `folder`, sorted by file name
pub fn scan_folder(folder: &Path) -> Result<Vec<PplxSource>> {
    collect_folder(folder, WalkDir::new(folder))
}

/// `*.pplx` directly inside `folder`, subfolders ignored
pub fn scan_folder_top_level(folder: &Path) -> Result<Vec<PplxSource>> {
    collect_folder(folder, WalkDir::new(folder).max_depth(1))
}

fn collect_folder(folder: &Path, walker: WalkDir) -> Result<Vec<PplxSource>> {
    if !folder.is_dir() {
        return Err(PplxError::FolderNotFound(folder.display().to_string()));
    }

    let mut sources: Vec<PplxSource> = walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.file_name().is_some_and(|n| is_pplx_name(&n.to_string_lossy())))
        .map(PplxSource::File)
        .collect();
    sort_sources(&mut sources);
    Ok(sources)
}

/// Processing order for every input kind: base file name, then full location
pub(crate) fn sort_sources(sources: &mut [PplxSource]) {
    sources.sort_by_cached_key(|s| (s.file_name(), s.display()));
}

/// Sources from a folder, a `.zip` archive or a single `.pplx` file
pub fn scan_input(input: &Path) -> Result<Vec<PplxSource>> {
    if input.is_dir() {
        return scan_folder(input);
    }
    if !input.exists() {
        return Err(PplxError::FileNotFound(input.display().to_string()));
    }
    if is_zip(input) {
        return scan_zip(input);
    }
    if is_pplx_name(&input.to_string_lossy()) {
        return Ok(vec![PplxSource::File(input.to_path_buf())]);
    }
    Err(PplxError::NoFilesFound(input.display().to_string()))
}
