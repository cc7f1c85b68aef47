//! Directory scanner: extracts numbered page candidates from a snapshot
//! of the watched directory.
//!
//! A candidate is any plain file whose *name* contains at least one
//! contiguous digit run; the first run is its sequence key. Files without
//! a digit run are not errors, they are simply not candidates.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CollatorError, Result};

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid regex"));

/// A file eligible to join a sequence, with its extracted key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub key: u64,
}

/// Snapshot the directory and return its candidates ordered by full path.
///
/// Ordering is lexical, not numeric: `page_10` sorts before `page_2`.
/// Zero-padded names (the expected input shape) are unaffected. See
/// DESIGN.md for why this is kept.
pub fn scan(dir: &Path) -> Result<Vec<Candidate>> {
    if !dir.is_dir() {
        return Err(CollatorError::DirectoryUnavailable(dir.to_path_buf()));
    }

    let mut candidates = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let name = entry.file_name();
        if let Some(key) = extract_key(&name.to_string_lossy()) {
            candidates.push(Candidate { path, key });
        }
    }

    candidates.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(candidates)
}

/// First digit run of the filename, parsed as the sequence key.
///
/// A run too large for u64 is treated the same as no run at all: the
/// file is not a candidate.
fn extract_key(name: &str) -> Option<u64> {
    DIGIT_RUN.find(name)?.as_str().parse().ok()
}
