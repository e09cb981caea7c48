use super::{is_pplx_name, sort_sources, PplxSource};
use crate::error::Result;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;
use zip::ZipArchive;

/// `.pplx` members of a ZIP archive, read into memory, in folder-scan order.
/// Directories and `__MACOSX` resource forks are ignored.
pub fn scan_zip(path: &Path) -> Result<Vec<PplxSource>> {
    let file = File::open(path)?;
    let mut zip = ZipArchive::new(file)?;

    let mut sources = Vec::new();
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if name.starts_with("__MACOSX") || !is_pplx_name(&name) {
            continue;
        }
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        sources.push(PplxSource::ZipMember {
            archive: path.to_path_buf(),
            name,
            bytes,
        });
    }

    sort_sources(&mut sources);
    debug!(archive = %path.display(), members = sources.len(), "scanned zip");
    Ok(sources)
}
