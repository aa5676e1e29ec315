//! Error types for the document host.

use std::path::PathBuf;

use tome_sections::{HeaderError, SectionError};

/// Failure reported by a [`MarkupService`](crate::MarkupService).
#[derive(Debug, thiserror::Error)]
pub enum MarkupError {
    /// The service rejected the input.
    #[error("markup failed: {0}")]
    Failed(String),
    /// Any other error raised by the service.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Failure inside the markup pipeline, before degradation.
#[derive(Debug, thiserror::Error)]
pub(crate) enum PipelineError {
    #[error(transparent)]
    Render(#[from] MarkupError),
    #[error(transparent)]
    Section(#[from] SectionError),
    #[error("markup service panicked: {0}")]
    Panicked(String),
}

/// Error returned while reading a source file into document records.
///
/// Each variant is a hard failure for one file only.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// The source file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The rendered document is structurally broken.
    #[error("invalid markup in {file}: {source}")]
    Section {
        /// Corpus-relative file.
        file: String,
        /// Underlying splitter error.
        #[source]
        source: SectionError,
    },

    /// A header block failed validation.
    #[error("{file}: {source}")]
    Header {
        /// Corpus-relative file.
        file: String,
        /// Underlying validation error.
        #[source]
        source: HeaderError,
    },
}
