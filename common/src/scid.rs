//! SCID helpers
//!
//! The SCID is the structure id Katapult-style exports put at the front of every
//! PPLX file name (`001_Ocalc.pplx`, `12.1_pole.pplx`, `A7.pplx`). It is the join key
//! against the nodes sheet.

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};

const OCALC_SUFFIX: &str = "_Ocalc.pplx";
const PPLX_EXT: &str = ".pplx";

/// SCID from a PPLX file name. `001_Ocalc.pplx` -> `001`.
pub fn extract_scid_from_filename(filename: &str) -> String {
    if let Some((scid, _)) = filename.split_once(OCALC_SUFFIX) {
        return scid.to_string();
    }
    if filename.contains('_') && filename.ends_with(PPLX_EXT) {
        return filename.split('_').next().unwrap_or_default().to_string();
    }
    filename.replace(PPLX_EXT, "")
}

/// Remove ignore keywords (comma separated, case-insensitive) from an SCID and
/// collapse the remaining whitespace.
pub fn clean_scid_keywords(scid: &str, ignore_keywords: &str) -> String {
    let mut cleaned = scid.to_string();
    for keyword in ignore_keywords.split(',').map(str::trim).filter(|k| !k.is_empty()) {
        let pattern = RegexBuilder::new(&regex::escape(keyword))
            .case_insensitive(true)
            .build();
        if let Ok(pattern) = pattern {
            cleaned = pattern.replace_all(&cleaned, "").trim().to_string();
        }
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drop periods and spaces so `12.1` and `12 1` meet `121` in the sheet
pub fn normalize_scid_for_lookup(scid: &str) -> String {
    scid.chars().filter(|c| *c != '.' && *c != ' ').collect()
}

/// Keys to try, in order, when resolving an SCID against the nodes sheet
pub fn scid_lookup_candidates(scid: &str) -> Vec<String> {
    let trimmed = scid.trim();
    let mut candidates = vec![trimmed.to_string()];

    let normalized = normalize_scid_for_lookup(trimmed);
    candidates.push(normalized.clone());

    if !normalized.is_empty() && normalized.chars().all(|c| c.is_ascii_digit()) {
        candidates.push(format!("{:0>3}", normalized));
        let unpadded = normalized.trim_start_matches('0');
        candidates.push(if unpadded.is_empty() { "0".to_string() } else { unpadded.to_string() });
    }

    let mut seen = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !candidate.is_empty() && !seen.contains(&candidate) {
            seen.push(candidate);
        }
    }
    seen
}

/// Keep alphanumerics, `-`, `_` and any of `extra_chars`
pub fn safe_filename_part(s: &str, extra_chars: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_' || extra_chars.contains(*c))
        .collect()
}

/// Leading integer of a name, used to sort `2_x` before `10_x`
pub fn leading_int(s: &str) -> Option<u64> {
    lazy_static! {
        static ref LEADING: Regex = Regex::new(r"^\s*(\d+)").unwrap();
    }
    LEADING
        .captures(s)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
