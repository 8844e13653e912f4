//! 7z entry source.
//!
//! 7z requires random access, so the input is always a cached
//! (memory- or temp-file-backed) reader. Metadata is read up front from
//! the archive header; entry content is decompressed per entry on
//! demand. The format's symlink information is not exposed by the
//! reader, so entries never surface as symlinks.

use std::io::Read;
use std::io::Seek;

use sevenz_rust2::Archive;
use sevenz_rust2::ArchiveReader;
use sevenz_rust2::Password;

use crate::error::ExtractError;
use crate::error::Result;
use crate::extraction::engine::EntryKind;
use crate::extraction::engine::EntrySource;

use super::common::BufferedEntry;
use super::common::EntryMeta;

#[derive(Debug, Clone)]
struct CachedEntry {
    name: String,
    size: u64,
    is_directory: bool,
}

/// Entry source over a 7z archive.
pub(crate) struct SevenZSource<R: Read + Seek> {
    reader: ArchiveReader<R>,
    entries: Vec<CachedEntry>,
    index: usize,
}

impl<R: Read + Seek> SevenZSource<R> {
    /// Reads the archive header and prepares per-entry decompression.
    pub(crate) fn new(mut source: R) -> Result<Self> {
        let password = Password::empty();
        let archive = Archive::read(&mut source, &password).map_err(|err| {
            ExtractError::InvalidArchive(format!("failed to open 7z archive: {err}"))
        })?;

        let entries = archive
            .files
            .iter()
            .map(|entry| CachedEntry {
                name: entry.name.clone(),
                size: entry.size,
                is_directory: entry.is_directory(),
            })
            .collect();

        source.rewind()?;
        let reader = ArchiveReader::new(source, Password::empty()).map_err(|err| {
            ExtractError::InvalidArchive(format!("failed to open 7z archive: {err}"))
        })?;

        Ok(Self {
            reader,
            entries,
            index: 0,
        })
    }
}

impl<R: Read + Seek> EntrySource for SevenZSource<R> {
    type Entry<'s>
        = BufferedEntry
    where
        Self: 's;

    fn next_entry(&mut self) -> Option<Result<BufferedEntry>> {
        let cached = self.entries.get(self.index)?.clone();
        self.index += 1;

        if cached.is_directory {
            return Some(Ok(BufferedEntry::new(
                EntryMeta::new(cached.name, EntryKind::Dir),
                Vec::new(),
            )));
        }

        let data = if cached.size == 0 {
            Vec::new()
        } else {
            match self.reader.read_file(&cached.name) {
                Ok(data) => data,
                Err(err) => {
                    return Some(Err(ExtractError::InvalidArchive(format!(
                        "failed to read 7z entry {}: {err}",
                        cached.name
                    ))));
                }
            }
        };

        let meta = EntryMeta {
            size: cached.size,
            ..EntryMeta::new(cached.name, EntryKind::File)
        };
        Some(Ok(BufferedEntry::new(meta, data)))
    }
}
