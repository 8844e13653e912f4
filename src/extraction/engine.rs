//! Generic archive walk engine.
//!
//! The engine drives any [`EntrySource`] through the per-entry policy:
//! cancellation, object counting, name normalisation, pattern filtering,
//! kind dispatch and the error-absorption rules. Every filesystem
//! mutation goes through the safe-write boundary.

use std::io::Read;
use std::path::Path;
use std::time::SystemTime;

use crate::config::Config;
use crate::error::ExtractError;
use crate::error::Quota;
use crate::error::Result;
use crate::security::Boundary;
use crate::security::paths;
use crate::target::Target;
use crate::telemetry::Telemetry;

/// Uniform classification of an archive entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file with streamable content.
    File,
    /// Directory.
    Dir,
    /// Symbolic link.
    Symlink,
    /// PAX global header; processed as a silent no-op.
    GlobalHeader,
    /// Recognised but not extractable (fifo, device, hard link, ...).
    /// The payload names the kind for diagnostics.
    Unsupported(&'static str),
}

/// The uniform view every driver produces per entry.
///
/// An entry doubles as the reader for its own content; metadata accessors
/// are valid before, during and after reading. Formats that do not carry
/// a field report the documented zero value.
pub trait SourceEntry: Read {
    /// Entry name as stored in the archive.
    fn name(&self) -> String;

    /// Declared (uncompressed) size in bytes.
    fn size(&self) -> u64;

    /// Permission bits; `0` when the archive carries none.
    fn mode(&self) -> u32;

    /// Entry classification.
    fn kind(&self) -> EntryKind;

    /// Symlink target; empty for non-symlink entries.
    fn link_target(&self) -> String {
        String::new()
    }

    /// Modification time, when known.
    fn modified(&self) -> Option<SystemTime> {
        None
    }

    /// Access time, when known.
    fn accessed(&self) -> Option<SystemTime> {
        None
    }

    /// Owner uid; zero when the format does not carry one.
    fn uid(&self) -> u64 {
        0
    }

    /// Owner gid; zero when the format does not carry one.
    fn gid(&self) -> u64 {
        0
    }
}

/// A lazy, single-pass iterator over archive entries.
///
/// The iterator terminates by returning `None` at end-of-archive or by
/// yielding a terminal error; structural errors are never absorbed by the
/// walk engine's continue-on-error policy.
pub trait EntrySource {
    /// Entry type yielded per step; may borrow the source.
    type Entry<'a>: SourceEntry
    where
        Self: 'a;

    /// Advances to the next entry.
    fn next_entry(&mut self) -> Option<Result<Self::Entry<'_>>>;
}

/// Walk state threaded across one extraction.
pub(crate) struct Walker<'a> {
    boundary: Boundary<'a>,
    config: &'a Config,
    telemetry: &'a mut Telemetry,
    objects: i64,
    written: i64,
}

impl<'a> Walker<'a> {
    pub(crate) fn new(
        target: &'a dyn Target,
        dest: &'a Path,
        config: &'a Config,
        telemetry: &'a mut Telemetry,
    ) -> Self {
        Self {
            boundary: Boundary::new(target, dest, config),
            config,
            telemetry,
            objects: 0,
            written: 0,
        }
    }

    /// Drives `source` to completion under the configured policy.
    pub(crate) fn run<S: EntrySource>(&mut self, source: &mut S) -> Result<()> {
        loop {
            if self.config.cancel.is_cancelled() {
                return Err(ExtractError::Cancelled);
            }

            let Some(next) = source.next_entry() else {
                return Ok(());
            };
            // Iterator errors are structural and always fatal.
            let entry = next?;

            self.objects += 1;
            if self.config.max_files >= 0 && self.objects > self.config.max_files {
                let err = ExtractError::QuotaExceeded {
                    quota: Quota::Files,
                };
                self.telemetry.record_error(err.to_string());
                return Err(err);
            }

            let name = paths::clean(paths::strip_absolute_prefix(&entry.name()));
            if name == "." || name == ".." {
                let err = ExtractError::InvalidName {
                    name,
                    reason: "refers to the destination root or above",
                };
                self.absorb("", err)?;
                continue;
            }

            if !self.config.matches_patterns(&name) {
                self.telemetry.pattern_mismatches += 1;
                continue;
            }

            if let Err(err) = self.process_entry(&name, entry) {
                self.absorb(&name, err)?;
            }
        }
    }

    fn process_entry<E: SourceEntry>(&mut self, name: &str, mut entry: E) -> Result<()> {
        match entry.kind() {
            EntryKind::Dir => {
                self.boundary
                    .create_dir(name, self.config.dir_mode(entry.mode()))?;
                self.telemetry.extracted_dirs += 1;
            }

            EntryKind::File => {
                let declared = i64::try_from(entry.size()).unwrap_or(i64::MAX);
                if self.config.max_extraction_size >= 0
                    && self.written.saturating_add(declared) > self.config.max_extraction_size
                {
                    return Err(ExtractError::QuotaExceeded {
                        quota: Quota::ExtractionSize,
                    });
                }
                let cap = if self.config.max_extraction_size < 0 {
                    -1
                } else {
                    self.config.max_extraction_size - self.written
                };
                let mode = self.config.file_mode(entry.mode());
                let written = self.boundary.create_file(name, &mut entry, mode, cap)?;
                let written = i64::try_from(written).unwrap_or(i64::MAX);
                self.written += written;
                self.telemetry.extraction_size += written;
                self.telemetry.extracted_files += 1;
            }

            EntryKind::Symlink => {
                if self.config.deny_symlinks {
                    return Err(ExtractError::UnsupportedEntry {
                        name: name.to_owned(),
                    });
                }
                self.boundary.create_symlink(name, &entry.link_target())?;
                self.telemetry.extracted_symlinks += 1;
            }

            EntryKind::GlobalHeader => {}

            EntryKind::Unsupported(kind) => {
                tracing::debug!(entry = name, kind, "unsupported entry type");
                return Err(ExtractError::UnsupportedEntry {
                    name: name.to_owned(),
                });
            }
        }
        Ok(())
    }

    /// Routes a per-entry error through the continue-on-error policy.
    fn absorb(&mut self, name: &str, err: ExtractError) -> Result<()> {
        if err.is_unsupported_entry() {
            self.telemetry.record_unsupported(name);
            if self.config.continue_on_unsupported_files {
                tracing::debug!(entry = name, "skipping unsupported entry");
                return Ok(());
            }
        }
        self.telemetry.record_error(err.to_string());
        if err.is_always_fatal() {
            return Err(err);
        }
        if self.config.continue_on_error {
            tracing::warn!(entry = name, error = %err, "continuing after extraction error");
            return Ok(());
        }
        Err(err)
    }
}
