//! Telemetry record for extraction runs.
//!
//! One [`Telemetry`] value is threaded through the pipeline per run and
//! submitted exactly once — on success and on failure alike. Submission
//! applies the registered metrics processors in reverse-insertion order,
//! then invokes the user hook.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde::Serializer;

use crate::config::Config;

/// Statistics collected over one extraction run.
///
/// Counters are `i64` to match the configured caps. The duration is
/// serialised as integer microseconds in the JSON form.
///
/// # Examples
///
/// ```
/// use unpax::Telemetry;
///
/// let data = Telemetry {
///     extracted_type: "tar".into(),
///     extracted_files: 3,
///     ..Telemetry::default()
/// };
/// assert!(data.to_string().starts_with("type: tar,"));
/// ```
#[derive(Debug, Clone, Default, Serialize)]
pub struct Telemetry {
    /// Detected input type (`"tar"`, `"zip"`, `"gz"`, `"tar.gz"`, ...).
    pub extracted_type: String,

    /// Wall-clock time elapsed from pipeline start to submission.
    #[serde(serialize_with = "duration_micros")]
    pub extraction_duration: Duration,

    /// Bytes read from the input stream.
    pub input_size: i64,

    /// Bytes written across all extracted entries.
    pub extraction_size: i64,

    /// Regular files created.
    pub extracted_files: i64,

    /// Directories created.
    pub extracted_dirs: i64,

    /// Symlinks created.
    pub extracted_symlinks: i64,

    /// Per-entry failures observed (soft and fatal).
    pub extraction_errors: i64,

    /// Message of the most recent per-entry failure, empty when none.
    pub last_extraction_error: String,

    /// Entries skipped because no glob pattern matched.
    pub pattern_mismatches: i64,

    /// Entries of a kind the pipeline does not extract.
    pub unsupported_files: i64,

    /// Name of the most recent unsupported entry, empty when none.
    pub last_unsupported_file: String,
}

impl Telemetry {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a per-entry failure.
    pub(crate) fn record_error(&mut self, message: String) {
        self.extraction_errors += 1;
        self.last_extraction_error = message;
    }

    /// Records an unsupported entry.
    pub(crate) fn record_unsupported(&mut self, name: &str) {
        self.unsupported_files += 1;
        self.last_unsupported_file = name.to_owned();
    }

    /// Serialises the record to its JSON form.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl fmt::Display for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type: {}, duration: {:?}, size: {}, files: {}, symlinks: {}, dirs: {}, errors: {}, last error: {}, input size: {}",
            self.extracted_type,
            self.extraction_duration,
            self.extraction_size,
            self.extracted_files,
            self.extracted_symlinks,
            self.extracted_dirs,
            self.extraction_errors,
            self.last_extraction_error,
            self.input_size,
        )
    }
}

fn duration_micros<S: Serializer>(d: &Duration, ser: S) -> Result<S::Ok, S::Error> {
    ser.serialize_u128(d.as_micros())
}

/// Applies the processor chain and invokes the hook, once.
///
/// The caller is responsible for invoking this exactly once per run; the
/// pipeline does so at its single exit point. With no hook registered the
/// processors still run (they may feed their own sinks) and submission is
/// otherwise a no-op.
pub(crate) fn submit(config: &Config, data: &mut Telemetry) {
    // Last-added processor runs first.
    for processor in config.metrics_processors.iter().rev() {
        processor(data);
    }
    if let Some(hook) = &config.telemetry_hook {
        hook(data);
    }
}
