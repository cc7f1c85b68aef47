//! Error types for the collator service.

use std::path::PathBuf;
use thiserror::Error;

use crate::builder::BuildError;
use crate::messaging::MessagingError;

pub type Result<T> = std::result::Result<T, CollatorError>;

#[derive(Debug, Error)]
pub enum CollatorError {
    /// The directory to scan (or create output in) does not exist.
    #[error("Directory unavailable: {}", .0.display())]
    DirectoryUnavailable(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),
}
