//! Rar entry source.
//!
//! The underlying library processes archives from an on-disk path with a
//! typed cursor that alternates between header and file positions, so
//! the source owns the open archive as state and reads each file's bytes
//! into memory when the walk engine consumes the entry. Rar symlinks are
//! not supported; entries that are neither file nor directory surface as
//! unsupported.

use std::path::Path;

use unrar::Archive;
use unrar::CursorBeforeHeader;
use unrar::OpenArchive;
use unrar::Process;

use crate::error::ExtractError;
use crate::error::Result;
use crate::extraction::engine::EntryKind;
use crate::extraction::engine::EntrySource;

use super::common::BufferedEntry;
use super::common::EntryMeta;

/// Entry source over a rar archive on disk.
#[derive(Debug)]
pub(crate) struct RarSource {
    archive: Option<OpenArchive<Process, CursorBeforeHeader>>,
}

impl RarSource {
    /// Opens the archive at `path` for processing.
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let archive = Archive::new(path).open_for_processing().map_err(|err| {
            ExtractError::InvalidArchive(format!("failed to open rar archive: {err:?}"))
        })?;
        Ok(Self {
            archive: Some(archive),
        })
    }
}

impl EntrySource for RarSource {
    type Entry<'s>
        = BufferedEntry
    where
        Self: 's;

    fn next_entry(&mut self) -> Option<Result<BufferedEntry>> {
        let archive = self.archive.take()?;

        let at_file = match archive.read_header() {
            Ok(Some(at_file)) => at_file,
            Ok(None) => return None,
            Err(err) => {
                return Some(Err(ExtractError::InvalidArchive(format!(
                    "failed to read rar header: {err:?}"
                ))));
            }
        };

        let header = at_file.entry();
        let name = header
            .filename
            .to_string_lossy()
            .into_owned()
            .replace('\\', "/");
        let size = header.unpacked_size as u64;
        let is_dir = header.is_directory();
        let is_file = header.is_file();

        if is_dir {
            return match at_file.skip() {
                Ok(next) => {
                    self.archive = Some(next);
                    Some(Ok(BufferedEntry::new(
                        EntryMeta::new(name, EntryKind::Dir),
                        Vec::new(),
                    )))
                }
                Err(err) => Some(Err(skip_error(&name, &err))),
            };
        }

        if !is_file {
            // Symlinks and other special entries are reported as
            // unsupported; their data (if any) is skipped.
            return match at_file.skip() {
                Ok(next) => {
                    self.archive = Some(next);
                    Some(Ok(BufferedEntry::new(
                        EntryMeta::new(name, EntryKind::Unsupported("special entry")),
                        Vec::new(),
                    )))
                }
                Err(err) => Some(Err(skip_error(&name, &err))),
            };
        }

        match at_file.read() {
            Ok((data, next)) => {
                self.archive = Some(next);
                let meta = EntryMeta {
                    size,
                    ..EntryMeta::new(name, EntryKind::File)
                };
                Some(Ok(BufferedEntry::new(meta, data)))
            }
            Err(err) => Some(Err(ExtractError::InvalidArchive(format!(
                "failed to read rar entry {name}: {err:?}"
            )))),
        }
    }
}

fn skip_error(name: &str, err: &unrar::error::UnrarError) -> ExtractError {
    ExtractError::InvalidArchive(format!("failed to skip rar entry {name}: {err:?}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_rejected() {
        let err = RarSource::open(Path::new("/nonexistent/archive.rar")).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidArchive(_)));
    }

    #[test]
    fn test_non_rar_bytes_rejected() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"definitely not a rar archive").unwrap();
        tmp.flush().unwrap();
        assert!(RarSource::open(tmp.path()).is_err());
    }
}
