//! Extraction configuration.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use crate::telemetry::Telemetry;

/// Callback invoked exactly once with the final telemetry record.
pub type TelemetryHook = Arc<dyn Fn(&Telemetry) + Send + Sync>;

/// Processor applied to the telemetry record before the hook runs.
///
/// Processors registered on [`Config::metrics_processors`] are applied in
/// reverse-insertion order at submit time (the last-added runs first).
pub type MetricsProcessor = Arc<dyn Fn(&mut Telemetry) + Send + Sync>;

/// Cooperative cancellation signal for a running extraction.
///
/// The token is cheap to clone; all clones share one flag. The pipeline
/// polls it before opening a decompressor, after reading the detection
/// header, and at the top of each archive-walk iteration. Once set, the
/// current operation returns [`ExtractError::Cancelled`] and no further
/// entries are processed.
///
/// [`ExtractError::Cancelled`]: crate::ExtractError::Cancelled
///
/// # Examples
///
/// ```
/// use unpax::CancelToken;
///
/// let token = CancelToken::new();
/// let shared = token.clone();
/// assert!(!shared.is_cancelled());
/// token.cancel();
/// assert!(shared.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cancellation flag for all clones of this token.
    pub fn cancel(&self) {
        self.inner.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::Relaxed)
    }
}

/// Configuration for one extraction run.
///
/// The configuration is read-only for the duration of a run. Size and count
/// caps are `i64` with `-1` disabling the check.
///
/// # Examples
///
/// ```
/// use unpax::Config;
///
/// // Secure defaults
/// let config = Config::default();
///
/// // Customise for specific needs
/// let custom = Config {
///     max_extraction_size: 100 * 1024 * 1024, // 100 MB
///     continue_on_error: true,
///     ..Config::default()
/// };
/// ```
#[derive(Clone)]
pub struct Config {
    /// Cap on total bytes read from the input; `-1` disables.
    pub max_input_size: i64,

    /// Cap on total bytes written across all entries; `-1` disables.
    pub max_extraction_size: i64,

    /// Cap on total entries processed; `-1` disables.
    pub max_files: i64,

    /// Permit replacing existing files/symlinks at the destination.
    pub overwrite: bool,

    /// Create the destination directory if absent.
    pub create_destination: bool,

    /// Mode used when the pipeline itself creates directories (missing
    /// parents, the destination under `create_destination`).
    pub custom_create_dir_mode: u32,

    /// Mode for the single file produced by single-stream decompression.
    pub custom_decompress_file_mode: u32,

    /// Fallback mode for directory entries whose archive mode is zero.
    pub default_dir_permission: u32,

    /// Fallback mode for file entries whose archive mode is zero.
    pub default_file_permission: u32,

    /// Refuse symlink entries instead of creating them.
    pub deny_symlinks: bool,

    /// Convert most per-entry failures into counted, logged soft failures.
    pub continue_on_error: bool,

    /// Treat unknown entry types as soft skips.
    pub continue_on_unsupported_files: bool,

    /// Permit traversing a symlinked intermediate directory during path
    /// safety checks (logged as a warning).
    pub follow_symlinks: bool,

    /// Skip the recursive tar step after single-stream decompression.
    pub no_untar_after_decompression: bool,

    /// Buffer non-seekable inputs into memory rather than a temp file when
    /// a format requires random access.
    pub cache_in_memory: bool,

    /// Glob patterns; if non-empty an entry must match at least one to be
    /// extracted.
    pub patterns: Vec<String>,

    /// Callback invoked exactly once with the final telemetry record.
    pub telemetry_hook: Option<TelemetryHook>,

    /// Telemetry processors applied in reverse-insertion order at submit.
    pub metrics_processors: Vec<MetricsProcessor>,

    /// Cancellation signal polled by the pipeline.
    pub cancel: CancelToken,
}

impl Default for Config {
    /// Creates a `Config` with secure default settings.
    ///
    /// Default values:
    /// - `max_input_size`: 1 GiB
    /// - `max_extraction_size`: 1 GiB
    /// - `max_files`: 100 000
    /// - `custom_create_dir_mode`: `0o750`
    /// - `custom_decompress_file_mode`: `0o640`
    /// - `default_dir_permission`: `0o755`
    /// - `default_file_permission`: `0o644`
    /// - all behaviour flags `false`, no patterns, no hook
    fn default() -> Self {
        Self {
            max_input_size: 1 << 30,
            max_extraction_size: 1 << 30,
            max_files: 100_000,
            overwrite: false,
            create_destination: false,
            custom_create_dir_mode: 0o750,
            custom_decompress_file_mode: 0o640,
            default_dir_permission: 0o755,
            default_file_permission: 0o644,
            deny_symlinks: false,
            continue_on_error: false,
            continue_on_unsupported_files: false,
            follow_symlinks: false,
            no_untar_after_decompression: false,
            cache_in_memory: false,
            patterns: Vec::new(),
            telemetry_hook: None,
            metrics_processors: Vec::new(),
            cancel: CancelToken::new(),
        }
    }
}

impl Config {
    /// Creates a configuration with all caps disabled.
    ///
    /// Use only when the input is trusted; none of the security checks on
    /// paths and names are relaxed, but resource exhaustion is possible.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_input_size: -1,
            max_extraction_size: -1,
            max_files: -1,
            ..Self::default()
        }
    }

    /// Whether `name` passes the pattern filter.
    ///
    /// An empty pattern list admits every entry; otherwise the name must
    /// match at least one glob.
    #[must_use]
    pub fn matches_patterns(&self, name: &str) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        self.patterns
            .iter()
            .any(|p| glob_match::glob_match(p, name))
    }

    /// Resolves a directory entry mode, substituting the default when the
    /// archive carries none.
    #[must_use]
    pub fn dir_mode(&self, entry_mode: u32) -> u32 {
        if entry_mode == 0 {
            self.default_dir_permission
        } else {
            entry_mode
        }
    }

    /// Resolves a file entry mode, substituting the default when the
    /// archive carries none.
    #[must_use]
    pub fn file_mode(&self, entry_mode: u32) -> u32 {
        if entry_mode == 0 {
            self.default_file_permission
        } else {
            entry_mode
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("max_input_size", &self.max_input_size)
            .field("max_extraction_size", &self.max_extraction_size)
            .field("max_files", &self.max_files)
            .field("overwrite", &self.overwrite)
            .field("create_destination", &self.create_destination)
            .field("custom_create_dir_mode", &self.custom_create_dir_mode)
            .field(
                "custom_decompress_file_mode",
                &self.custom_decompress_file_mode,
            )
            .field("default_dir_permission", &self.default_dir_permission)
            .field("default_file_permission", &self.default_file_permission)
            .field("deny_symlinks", &self.deny_symlinks)
            .field("continue_on_error", &self.continue_on_error)
            .field(
                "continue_on_unsupported_files",
                &self.continue_on_unsupported_files,
            )
            .field("follow_symlinks", &self.follow_symlinks)
            .field(
                "no_untar_after_decompression",
                &self.no_untar_after_decompression,
            )
            .field("cache_in_memory", &self.cache_in_memory)
            .field("patterns", &self.patterns)
            .field("telemetry_hook", &self.telemetry_hook.is_some())
            .field("metrics_processors", &self.metrics_processors.len())
            .finish_non_exhaustive()
    }
}
