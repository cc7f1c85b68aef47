//! Collator - numbered-file sequence assembly service
//!
//! Watches a directory for numbered page files arriving over time,
//! assembles them into contiguous runs, and hands each completed run to a
//! document builder. Built documents are announced on a queue; runs that
//! fail to build are quarantined for inspection.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────┐     ┌───────────┐     ┌──────────────┐     ┌───────────┐
//! │  Scanner  │────▶│ Assembler │────▶│ Worker loop  │────▶│  Builder  │
//! │ (snapshot)│     │ (polling) │     │ (orchestrate)│     │ (render)  │
//! └───────────┘     └───────────┘     └──────┬───────┘     └───────────┘
//!                                            │
//!                              ┌─────────────┴─────────────┐
//!                              │ Queue: status, artifacts, │
//!                              │ settings (two aux loops)  │
//!                              └───────────────────────────┘
//! ```
//!
//! # Core Concepts
//!
//! - **Sequence**: a gap-free run of numerically keyed files meant to
//!   become one document
//! - **Quarantine**: holding directory for sequences that failed to build
//! - **Heartbeat**: periodic status publication to the queue

pub mod assembler;
pub mod builder;
pub mod config;
pub mod error;
pub mod messaging;
pub mod scanner;
pub mod service;
pub mod state;

// Re-exports for convenience
pub use assembler::{assemble, FileSequence, DEFAULT_MAX_ATTEMPTS};
pub use builder::{BuildError, BuildOutcome, Document, DocumentBuilder, RenderBuilder};
pub use config::ServiceConfig;
pub use error::{CollatorError, Result};
pub use messaging::{Messenger, MessagingError, QueueMessenger, SettingsBatch};
pub use scanner::{scan, Candidate};
pub use service::CollatorService;
pub use state::{CancellationToken, ServiceState};
