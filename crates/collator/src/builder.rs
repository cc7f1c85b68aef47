//! Document builder seam.
//!
//! Rendering an ordered set of page images into a paginated document is
//! not this crate's business; it is delegated behind [`DocumentBuilder`].
//! The production implementation shells out to an external renderer
//! binary and collects the artifact from its stdout. Tests supply their
//! own implementations.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Number of open probes per page before it is reported as skipped.
const OPEN_RETRIES: u32 = 3;

/// Delay between open probes.
const OPEN_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Build failures, split into transient (retry next cycle, leave the
/// sources in place) and permanent (quarantine the sequence).
#[derive(Debug, Error)]
pub enum BuildError {
    /// The renderer binary could not be found or spawned.
    #[error("Renderer unavailable: {0}")]
    RendererUnavailable(String),

    /// The renderer ran but did not produce an artifact.
    #[error("Render failed ({status}): {stderr}")]
    RenderFailed { status: String, stderr: String },

    /// No page in the sequence could be opened for reading. Transient:
    /// the pages may still be arriving or held by another process.
    #[error("No readable pages in sequence")]
    NoReadablePages,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// Transient failures are retried on a later cycle instead of
    /// sending the sequence to quarantine.
    pub fn is_transient(&self) -> bool {
        matches!(self, BuildError::NoReadablePages)
    }
}

/// A rendered document artifact, held in memory until saved.
#[derive(Debug, Clone)]
pub struct Document {
    bytes: Vec<u8>,
}

impl Document {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Result of a successful build: the artifact plus the pages the builder
/// could not read and therefore left out of the render. Skipped pages
/// belong to the caller — they must stay in the watched directory so a
/// later cycle can pick them up.
#[derive(Debug)]
pub struct BuildOutcome {
    pub document: Document,
    pub skipped: Vec<PathBuf>,
}

/// Turns an ordered list of page paths into a single document artifact.
///
/// `build` renders the readable pages and reports the unreadable ones in
/// [`BuildOutcome::skipped`]; it fails when nothing is readable or the
/// renderer itself errors. The orchestrator does not retry a failed
/// build: transient errors wait for the next cycle, permanent ones send
/// the sequence to quarantine.
pub trait DocumentBuilder: Send + Sync {
    fn build(&self, pages: &[PathBuf]) -> Result<BuildOutcome, BuildError>;
    fn save(&self, document: &Document, path: &Path) -> Result<(), BuildError>;
}

/// Builder that delegates rendering to an external binary.
///
/// The binary receives the page paths as arguments and writes the
/// rendered document to stdout. Resolution order for the binary: the
/// `COLLATOR_RENDER_BIN` environment variable, then a `collator-render`
/// sibling of the current executable, then `collator-render` on PATH.
pub struct RenderBuilder {
    binary: PathBuf,
    open_retries: u32,
    open_retry_delay: Duration,
}

impl RenderBuilder {
    pub fn new() -> Self {
        let binary = std::env::var("COLLATOR_RENDER_BIN")
            .map(PathBuf::from)
            .ok()
            .or_else(|| {
                std::env::current_exe().ok().and_then(|exe| {
                    exe.parent()
                        .map(|dir| dir.join("collator-render"))
                        .filter(|candidate| candidate.exists())
                })
            })
            .unwrap_or_else(|| PathBuf::from("collator-render"));
        Self::with_binary(binary)
    }

    pub fn with_binary(binary: PathBuf) -> Self {
        Self {
            binary,
            open_retries: OPEN_RETRIES,
            open_retry_delay: OPEN_RETRY_DELAY,
        }
    }

    /// Tune the per-page open probe (attempts, delay between attempts).
    pub fn with_open_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.open_retries = attempts.max(1);
        self.open_retry_delay = delay;
        self
    }
}

impl Default for RenderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentBuilder for RenderBuilder {
    fn build(&self, pages: &[PathBuf]) -> Result<BuildOutcome, BuildError> {
        // Probe each page; one that never opens (still being written, or
        // held by another process) is skipped and reported back rather
        // than failing the whole render.
        let mut readable: Vec<&PathBuf> = Vec::with_capacity(pages.len());
        let mut skipped: Vec<PathBuf> = Vec::new();
        for page in pages {
            if try_open(page, self.open_retries, self.open_retry_delay) {
                readable.push(page);
            } else {
                warn!(page = %page.display(), "Skipping unreadable page");
                skipped.push(page.clone());
            }
        }

        if readable.is_empty() {
            return Err(BuildError::NoReadablePages);
        }

        let output = Command::new(&self.binary)
            .args(&readable)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    BuildError::RendererUnavailable(format!(
                        "'{}' not found. Install it or set COLLATOR_RENDER_BIN.",
                        self.binary.display()
                    ))
                } else {
                    BuildError::RendererUnavailable(format!(
                        "Failed to spawn '{}': {e}",
                        self.binary.display()
                    ))
                }
            })?;

        if !output.status.success() {
            return Err(BuildError::RenderFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(BuildOutcome {
            document: Document::from_bytes(output.stdout),
            skipped,
        })
    }

    fn save(&self, document: &Document, path: &Path) -> Result<(), BuildError> {
        fs::write(path, document.as_bytes())?;
        Ok(())
    }
}

/// Probe a file for readability, retrying transient open failures.
fn try_open(path: &Path, attempts: u32, delay: Duration) -> bool {
    for attempt in 1..=attempts {
        match File::open(path) {
            Ok(_) => return true,
            Err(e) => {
                warn!(
                    page = %path.display(),
                    attempt,
                    error = %e,
                    "Page not readable yet"
                );
                if attempt < attempts {
                    thread::sleep(delay);
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fast_builder(binary: &str) -> RenderBuilder {
        RenderBuilder::with_binary(PathBuf::from(binary)).with_open_retry(1, Duration::ZERO)
    }

    #[test]
    fn build_with_no_pages_is_transient() {
        let err = fast_builder("/nonexistent/renderer").build(&[]).unwrap_err();
        assert!(matches!(err, BuildError::NoReadablePages));
        assert!(err.is_transient());
    }

    #[test]
    fn all_pages_unreadable_is_transient() {
        let tmp = TempDir::new().unwrap();
        let gone = tmp.path().join("page_001.jpg");

        let err = fast_builder("/nonexistent/renderer")
            .build(&[gone])
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn missing_renderer_is_reported() {
        let tmp = TempDir::new().unwrap();
        let page = tmp.path().join("page_001.jpg");
        fs::write(&page, b"jpeg bytes").unwrap();

        let err = fast_builder("/nonexistent/renderer")
            .build(&[page])
            .unwrap_err();
        assert!(matches!(err, BuildError::RendererUnavailable(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn save_writes_artifact_bytes() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("Document0.pdf");

        let builder = RenderBuilder::with_binary(PathBuf::from("unused"));
        let doc = Document::from_bytes(b"%PDF-1.4".to_vec());
        builder.save(&doc, &out).unwrap();

        assert_eq!(fs::read(&out).unwrap(), b"%PDF-1.4");
    }

    #[cfg(unix)]
    #[test]
    fn renderer_output_becomes_the_artifact() {
        let tmp = TempDir::new().unwrap();
        let page = tmp.path().join("page_001.jpg");
        fs::write(&page, b"jpeg bytes").unwrap();

        // `cat` stands in for a renderer: artifact == page bytes.
        let outcome = fast_builder("cat").build(&[page]).unwrap();
        assert_eq!(outcome.document.as_bytes(), b"jpeg bytes");
        assert!(outcome.skipped.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_page_is_skipped_and_reported() {
        let tmp = TempDir::new().unwrap();
        let page = tmp.path().join("page_001.jpg");
        fs::write(&page, b"jpeg bytes").unwrap();
        let missing = tmp.path().join("page_002.jpg");

        let outcome = fast_builder("cat")
            .build(&[page, missing.clone()])
            .unwrap();
        assert_eq!(outcome.document.as_bytes(), b"jpeg bytes");
        assert_eq!(outcome.skipped, vec![missing]);
    }
}
