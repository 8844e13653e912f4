//! Error types for extraction operations.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using `ExtractError`.
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Resource limits that can be exhausted during a run.
///
/// Each variant corresponds to one of the configured caps. Quota errors on
/// totals are always fatal; see the propagation rules on [`ExtractError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quota {
    /// `max_input_size` — total bytes read from the input stream.
    InputSize,
    /// `max_extraction_size` — total bytes written across all entries.
    ExtractionSize,
    /// `max_files` — total entries processed.
    Files,
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InputSize => write!(f, "max input size"),
            Self::ExtractionSize => write!(f, "max extraction size"),
            Self::Files => write!(f, "max files"),
        }
    }
}

/// Errors that can occur while extracting an archive or compressed stream.
///
/// The variants group into the kinds the extraction pipeline distinguishes
/// when deciding whether a failure is fatal or can be absorbed per entry:
///
/// - configuration errors ([`Config`](Self::Config))
/// - format errors ([`UnsupportedArchiveType`](Self::UnsupportedArchiveType),
///   [`InvalidArchive`](Self::InvalidArchive),
///   [`DecompressionStart`](Self::DecompressionStart))
/// - cancellation ([`Cancelled`](Self::Cancelled))
/// - security-policy errors ([`PathTraversal`](Self::PathTraversal),
///   [`AbsoluteLinkTarget`](Self::AbsoluteLinkTarget),
///   [`SymlinkInPath`](Self::SymlinkInPath),
///   [`InvalidName`](Self::InvalidName))
/// - quota errors ([`QuotaExceeded`](Self::QuotaExceeded))
/// - target errors ([`AlreadyExists`](Self::AlreadyExists), [`Io`](Self::Io))
/// - unsupported-entry errors ([`UnsupportedEntry`](Self::UnsupportedEntry))
#[derive(Error, Debug)]
pub enum ExtractError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid option combination or destination precondition.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// No format detector matched the input header.
    #[error("archive type not supported")]
    UnsupportedArchiveType,

    /// The underlying format library rejected the bytes.
    #[error("invalid archive: {0}")]
    InvalidArchive(String),

    /// The decompressor could not be constructed over the input.
    #[error("cannot start decompression: {0}")]
    DecompressionStart(String),

    /// The caller signalled an abort.
    #[error("extraction cancelled")]
    Cancelled,

    /// Entry name escapes the destination root.
    #[error("path traversal detected: {name}")]
    PathTraversal {
        /// The offending entry name.
        name: String,
    },

    /// Symlink entry carries an absolute target path.
    #[error("symlink target is absolute: {name} -> {target}")]
    AbsoluteLinkTarget {
        /// The symlink entry name.
        name: String,
        /// The rejected target.
        target: String,
    },

    /// An intermediate path element resolves to a symlink and
    /// `follow_symlinks` is disabled.
    #[error("symlink in path: {path} -> {target}")]
    SymlinkInPath {
        /// The symlinked intermediate directory.
        path: PathBuf,
        /// Where the symlink points.
        target: PathBuf,
    },

    /// Entry name violates the platform filename restrictions.
    #[error("invalid name {name:?}: {reason}")]
    InvalidName {
        /// The rejected name or component.
        name: String,
        /// Which restriction fired.
        reason: &'static str,
    },

    /// A configured resource cap was exceeded.
    #[error("{quota} exceeded")]
    QuotaExceeded {
        /// The exhausted limit.
        quota: Quota,
    },

    /// Destination entry already exists and `overwrite` is disabled.
    #[error("already exists: {path}")]
    AlreadyExists {
        /// The occupied destination path.
        path: PathBuf,
    },

    /// Entry kind the driver recognises but cannot produce safely.
    #[error("unsupported file mode: {name}")]
    UnsupportedEntry {
        /// The entry name.
        name: String,
    },
}

impl ExtractError {
    /// Whether this error terminates the run even under `continue_on_error`.
    ///
    /// Cancellation, total-quota exhaustion and structural failures of the
    /// archive iterator are never absorbed per entry.
    #[must_use]
    pub fn is_always_fatal(&self) -> bool {
        matches!(
            self,
            Self::Cancelled
                | Self::QuotaExceeded { .. }
                | Self::UnsupportedArchiveType
                | Self::InvalidArchive(_)
                | Self::DecompressionStart(_)
                | Self::Config(_)
        )
    }

    /// Whether this error is an unsupported-entry report.
    #[must_use]
    pub fn is_unsupported_entry(&self) -> bool {
        matches!(self, Self::UnsupportedEntry { .. })
    }
}
