//! Service controller and the three control loops.
//!
//! The controller owns shared state (status + poll timeout), a broadcast
//! cancellation token, and three tokio tasks:
//!
//! - worker loop: assembles sequences and turns them into documents
//! - settings loop: applies configuration changes from the queue
//! - heartbeat loop: periodically publishes the current status
//!
//! `stop()` awaits only the worker, so no in-flight build is abandoned;
//! the auxiliary loops observe the token on their next wakeup and exit
//! on their own.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::assembler::{self, FileSequence};
use crate::builder::{BuildError, DocumentBuilder};
use crate::config::ServiceConfig;
use crate::error::{CollatorError, Result};
use crate::messaging::{Messenger, SettingsBatch};
use crate::state::{CancellationToken, ServiceState};

/// Long-lived collation service.
pub struct CollatorService {
    config: ServiceConfig,
    builder: Arc<dyn DocumentBuilder>,
    messenger: Arc<dyn Messenger>,
    state: Arc<ServiceState>,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
    aux: Vec<JoinHandle<()>>,
}

impl CollatorService {
    /// Create the service. The watched directory is created if absent;
    /// output and quarantine directories are created on demand later.
    pub fn new(
        config: ServiceConfig,
        builder: Arc<dyn DocumentBuilder>,
        messenger: Arc<dyn Messenger>,
    ) -> Result<Self> {
        fs::create_dir_all(&config.watch_dir)
            .map_err(|_| CollatorError::DirectoryUnavailable(config.watch_dir.clone()))?;

        let state = Arc::new(ServiceState::new(config.poll_timeout_ms));
        Ok(Self {
            config,
            builder,
            messenger,
            state,
            cancel: CancellationToken::new(),
            worker: None,
            aux: Vec::new(),
        })
    }

    /// Current status text, as the heartbeat would publish it.
    pub fn current_status(&self) -> String {
        self.state.status()
    }

    /// Launch the three loops and announce the service on the queue.
    pub async fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Err(CollatorError::Config("service already started".to_string()));
        }

        self.cancel = CancellationToken::new();
        self.state
            .set_status(idle_status(&self.config.service_name, self.config.poll_timeout_ms));

        let worker = WorkerLoop {
            service_name: self.config.service_name.clone(),
            watch_dir: self.config.watch_dir.clone(),
            output_dir: self.config.output_dir.clone(),
            quarantine_dir: self.config.quarantine_dir.clone(),
            max_scan_attempts: self.config.max_scan_attempts,
            idle_interval: Duration::from_millis(self.config.idle_interval_ms),
            builder: Arc::clone(&self.builder),
            messenger: Arc::clone(&self.messenger),
            state: Arc::clone(&self.state),
            cancel: self.cancel.clone(),
        };
        self.worker = Some(tokio::spawn(worker.run()));

        let settings = SettingsLoop {
            interval: Duration::from_millis(self.config.settings_interval_ms),
            messenger: Arc::clone(&self.messenger),
            state: Arc::clone(&self.state),
            cancel: self.cancel.clone(),
        };
        self.aux.push(tokio::spawn(settings.run()));

        let heartbeat = HeartbeatLoop {
            interval: Duration::from_secs(self.config.heartbeat_interval_secs),
            messenger: Arc::clone(&self.messenger),
            state: Arc::clone(&self.state),
            cancel: self.cancel.clone(),
        };
        self.aux.push(tokio::spawn(heartbeat.run()));

        info!(service = %self.config.service_name, "Service started");
        let announcement = format!("{} service started", self.config.service_name);
        if let Err(e) = self.messenger.publish_status(&announcement).await {
            warn!(error = %e, "Failed to publish start notification");
        }
        Ok(())
    }

    /// Signal all loops to stop and wait for the worker to finish its
    /// current iteration. The settings and heartbeat loops exit
    /// asynchronously after their next wakeup.
    pub async fn stop(&mut self) -> Result<()> {
        info!(service = %self.config.service_name, "Stopping");
        self.cancel.cancel();

        if let Some(handle) = self.worker.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker loop panicked");
            }
        }
        self.aux.clear();

        info!(service = %self.config.service_name, "Stopped");
        let announcement = format!("{} service stopped", self.config.service_name);
        if let Err(e) = self.messenger.publish_status(&announcement).await {
            warn!(error = %e, "Failed to publish stop notification");
        }
        Ok(())
    }
}

fn idle_status(service_name: &str, poll_timeout_ms: u64) -> String {
    format!("{service_name} idle (timeout={poll_timeout_ms}ms)")
}

// ============================================================================
// Worker loop
// ============================================================================

struct WorkerLoop {
    service_name: String,
    watch_dir: PathBuf,
    output_dir: PathBuf,
    quarantine_dir: PathBuf,
    max_scan_attempts: u32,
    idle_interval: Duration,
    builder: Arc<dyn DocumentBuilder>,
    messenger: Arc<dyn Messenger>,
    state: Arc<ServiceState>,
    cancel: CancellationToken,
}

impl WorkerLoop {
    async fn run(self) {
        // Zero-based, advanced only on success: downstream consumers
        // poll for gap-free Document<N> names.
        let mut output_counter: u64 = 0;

        while !self.cancel.is_cancelled() {
            let poll_timeout = Duration::from_millis(self.state.poll_timeout_ms());
            let sequence = match assembler::assemble(
                &self.watch_dir,
                poll_timeout,
                self.max_scan_attempts,
            )
            .await
            {
                Ok(sequence) => sequence,
                Err(e) => {
                    error!(error = %e, "Scan failed, skipping iteration");
                    self.go_idle(poll_timeout).await;
                    continue;
                }
            };

            if sequence.is_empty() {
                self.go_idle(poll_timeout).await;
                continue;
            }

            info!(files = sequence.len(), "Assembled sequence, building document");
            self.state
                .set_status(format!("{} processing new files", self.service_name));

            if let Err(e) = fs::create_dir_all(&self.output_dir) {
                error!(
                    dir = %self.output_dir.display(),
                    error = %e,
                    "Cannot create output directory, skipping iteration"
                );
                self.go_idle(poll_timeout).await;
                continue;
            }

            let artifact_path = self
                .output_dir
                .join(format!("Document{output_counter}.pdf"));
            match self.build_and_save(&sequence, &artifact_path).await {
                Ok(skipped) => {
                    info!(artifact = %artifact_path.display(), "Document built");
                    if let Err(e) = self.messenger.publish_new_artifact(&artifact_path).await {
                        warn!(error = %e, "Failed to announce new artifact");
                    }
                    output_counter += 1;

                    // Deletion strictly follows persist+notify. Pages the
                    // builder skipped as unreadable stay in the watched
                    // directory for a later cycle.
                    for path in sequence.paths() {
                        if skipped.iter().any(|s| s == path) {
                            continue;
                        }
                        if let Err(e) = fs::remove_file(path) {
                            debug!(file = %path.display(), error = %e, "Source file already gone");
                        }
                    }
                    if !skipped.is_empty() {
                        warn!(
                            pages = skipped.len(),
                            "Unreadable pages left in the watched directory for retry"
                        );
                    }
                }
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "Sequence not readable yet, leaving files in place");
                    self.go_idle(poll_timeout).await;
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "Build failed, quarantining sequence");
                    let left_behind = self.quarantine(&sequence);
                    if left_behind > 0 {
                        warn!(
                            files = left_behind,
                            "Files could not be quarantined and remain in the watched directory"
                        );
                    }
                }
            }

            self.state.set_status(idle_status(
                &self.service_name,
                self.state.poll_timeout_ms(),
            ));
            // Re-loop immediately after a processing iteration.
        }

        info!("Worker loop stopped");
    }

    async fn go_idle(&self, poll_timeout: Duration) {
        self.state.set_status(idle_status(
            &self.service_name,
            poll_timeout.as_millis() as u64,
        ));
        tokio::time::sleep(self.idle_interval).await;
    }

    /// Build and persist on a blocking thread; the renderer may block on
    /// file probes for seconds. Returns the pages the builder skipped.
    async fn build_and_save(
        &self,
        sequence: &FileSequence,
        artifact_path: &Path,
    ) -> std::result::Result<Vec<PathBuf>, BuildError> {
        let builder = Arc::clone(&self.builder);
        let pages = sequence.to_paths();
        let path = artifact_path.to_path_buf();
        match tokio::task::spawn_blocking(move || -> std::result::Result<Vec<PathBuf>, BuildError> {
            let outcome = builder.build(&pages)?;
            builder.save(&outcome.document, &path)?;
            Ok(outcome.skipped)
        })
        .await
        {
            Ok(result) => result,
            Err(e) => Err(BuildError::RenderFailed {
                status: "build task aborted".to_string(),
                stderr: e.to_string(),
            }),
        }
    }

    /// Move every sequence file into the quarantine directory, keeping
    /// its name and overwriting any previous occupant. A file is deleted
    /// from the watched directory only by being moved: whatever cannot
    /// be quarantined stays where it is, and the count of such leftovers
    /// is returned so the caller can log them.
    fn quarantine(&self, sequence: &FileSequence) -> usize {
        if let Err(e) = fs::create_dir_all(&self.quarantine_dir) {
            error!(
                dir = %self.quarantine_dir.display(),
                error = %e,
                "Cannot create quarantine directory, leaving sequence in place"
            );
            return sequence.len();
        }

        let mut left_behind = 0;
        for path in sequence.paths() {
            let Some(name) = path.file_name() else {
                left_behind += 1;
                continue;
            };
            let target = self.quarantine_dir.join(name);
            match move_file(path, &target) {
                Ok(()) => info!(file = %target.display(), "Quarantined"),
                Err(e) => {
                    error!(file = %path.display(), error = %e, "Failed to quarantine file");
                    left_behind += 1;
                }
            }
        }
        left_behind
    }
}

fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if to.exists() {
        fs::remove_file(to)?;
    }
    // Rename when quarantine shares the filesystem, copy+remove when it
    // does not.
    if fs::rename(from, to).is_err() {
        fs::copy(from, to)?;
        fs::remove_file(from)?;
    }
    Ok(())
}

// ============================================================================
// Settings loop
// ============================================================================

struct SettingsLoop {
    interval: Duration,
    messenger: Arc<dyn Messenger>,
    state: Arc<ServiceState>,
    cancel: CancellationToken,
}

impl SettingsLoop {
    async fn run(self) {
        while !self.cancel.is_cancelled() {
            match self.messenger.poll_settings().await {
                Ok(batch) => self.apply(batch).await,
                Err(e) => warn!(error = %e, "Settings poll failed"),
            }
            tokio::time::sleep(self.interval).await;
        }
        debug!("Settings loop stopped");
    }

    async fn apply(&self, batch: SettingsBatch) {
        for (name, value) in batch {
            match name.as_str() {
                "Timeout" => match value.as_u64() {
                    Some(ms) if ms > 0 => {
                        info!(timeout_ms = ms, "Applying new poll timeout");
                        self.state.set_poll_timeout_ms(ms);
                    }
                    _ => warn!(value = %value, "Ignoring invalid Timeout setting"),
                },
                "StatusUpdate" => {
                    if is_truthy(&value) {
                        let status = self.state.status();
                        if let Err(e) = self.messenger.publish_status(&status).await {
                            warn!(error = %e, "Failed to publish requested status");
                        }
                    }
                }
                // Forward compatible: settings from newer brokers are
                // skipped, not errors.
                other => debug!(setting = other, "Ignoring unrecognized setting"),
            }
        }
    }
}

fn is_truthy(value: &serde_json::Value) -> bool {
    value.as_bool().unwrap_or(false) || value.as_u64() == Some(1)
}

// ============================================================================
// Heartbeat loop
// ============================================================================

struct HeartbeatLoop {
    interval: Duration,
    messenger: Arc<dyn Messenger>,
    state: Arc<ServiceState>,
    cancel: CancellationToken,
}

impl HeartbeatLoop {
    async fn run(self) {
        while !self.cancel.is_cancelled() {
            let status = self.state.status();
            if let Err(e) = self.messenger.publish_status(&status).await {
                warn!(error = %e, "Heartbeat publish failed");
            }
            tokio::time::sleep(self.interval).await;
        }
        debug!("Heartbeat loop stopped");
    }
}
