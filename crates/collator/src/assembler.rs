//! Sequence assembly: repeated polling of the scanner to accumulate the
//! longest contiguous run of numbered files.
//!
//! Files may arrive with delays, so a single snapshot is not enough. The
//! assembler re-scans up to `max_attempts` times, sleeping the poll
//! timeout between attempts, and extends the run whenever the next
//! expected key shows up. A file accepted on attempt N is not accepted
//! again on attempt N+1 because the expected key has already advanced
//! past it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::scanner::{self, Candidate};

/// Default number of scan attempts per assembly call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// A contiguous run of numbered files, ready to become one document.
///
/// Invariant: keys are strictly consecutive integers in accumulation
/// order. Empty is a valid value meaning "nothing ready yet". Never
/// mutated after assembly.
#[derive(Debug, Clone, Default)]
pub struct FileSequence {
    files: Vec<Candidate>,
}

impl FileSequence {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|c| c.path.as_path())
    }

    pub fn to_paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|c| c.path.clone()).collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = u64> + '_ {
        self.files.iter().map(|c| c.key)
    }
}

/// Poll `dir` until a contiguous run has had `max_attempts` chances to
/// complete, then return whatever run accumulated (possibly empty).
///
/// The first candidate seen (in scan order) anchors the run
/// unconditionally; after that only the exact next key extends it. Gaps
/// are not errors, they just bound the run.
pub async fn assemble(
    dir: &Path,
    poll_timeout: Duration,
    max_attempts: u32,
) -> Result<FileSequence> {
    let mut expected: Option<u64> = None;
    let mut files: Vec<Candidate> = Vec::new();

    for attempt in 1..=max_attempts {
        for candidate in scanner::scan(dir)? {
            match expected {
                None => {
                    expected = Some(candidate.key + 1);
                    files.push(candidate);
                }
                Some(next) if candidate.key == next => {
                    expected = Some(next + 1);
                    files.push(candidate);
                }
                Some(_) => {}
            }
        }

        if attempt < max_attempts {
            tokio::time::sleep(poll_timeout).await;
        }
    }

    Ok(FileSequence { files })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    const FAST: Duration = Duration::from_millis(5);

    fn touch(dir: &Path, name: &str) {
        File::create(dir.join(name)).expect("create test file");
    }

    fn names(seq: &FileSequence) -> Vec<String> {
        seq.paths()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[tokio::test]
    async fn empty_directory_yields_empty_sequence() {
        let tmp = TempDir::new().unwrap();
        let seq = assemble(tmp.path(), FAST, 2).await.unwrap();
        assert!(seq.is_empty());
    }

    #[tokio::test]
    async fn run_breaks_at_the_gap() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "Image_001.jpg");
        touch(tmp.path(), "Image_002.jpg");
        touch(tmp.path(), "Image_005.jpg");

        let seq = assemble(tmp.path(), FAST, 3).await.unwrap();
        assert_eq!(names(&seq), vec!["Image_001.jpg", "Image_002.jpg"]);
    }

    #[tokio::test]
    async fn keys_are_strictly_consecutive() {
        let tmp = TempDir::new().unwrap();
        for n in [3, 4, 5, 9] {
            touch(tmp.path(), &format!("scan_{n:03}.jpg"));
        }

        let seq = assemble(tmp.path(), FAST, 2).await.unwrap();
        let keys: Vec<u64> = seq.keys().collect();
        assert_eq!(keys, vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn rescan_does_not_duplicate_accepted_files() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "Image_001.jpg");
        touch(tmp.path(), "Image_002.jpg");

        // Five attempts over an unchanged directory must accept each file
        // exactly once.
        let seq = assemble(tmp.path(), FAST, 5).await.unwrap();
        assert_eq!(seq.len(), 2);
    }

    #[tokio::test]
    async fn rescan_over_unchanged_directory_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "Image_004.jpg");
        touch(tmp.path(), "Image_005.jpg");

        let first = assemble(tmp.path(), FAST, 2).await.unwrap();
        let second = assemble(tmp.path(), FAST, 2).await.unwrap();
        assert_eq!(names(&first), names(&second));
    }

    #[tokio::test]
    async fn late_arrival_inside_the_window_extends_the_run() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "Image_001.jpg");

        let dir = tmp.path().to_path_buf();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            File::create(dir.join("Image_002.jpg")).unwrap();
        });

        // 10 attempts x 20ms gives the writer ample room to land inside
        // the polling window.
        let seq = assemble(tmp.path(), Duration::from_millis(20), 10)
            .await
            .unwrap();
        writer.await.unwrap();
        assert_eq!(names(&seq), vec!["Image_001.jpg", "Image_002.jpg"]);
    }

    #[tokio::test]
    async fn zero_is_a_valid_starting_key() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "page_000.jpg");
        touch(tmp.path(), "page_001.jpg");

        let seq = assemble(tmp.path(), FAST, 2).await.unwrap();
        let keys: Vec<u64> = seq.keys().collect();
        assert_eq!(keys, vec![0, 1]);
    }
}
