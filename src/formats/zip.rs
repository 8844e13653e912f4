//! Zip entry source.
//!
//! Iterates the central directory of a seekable input. Entry kinds come
//! from the Unix mode bits in the external attributes; symlink targets
//! are the entry body and are read eagerly. Entries whose cleaned name is
//! exactly `.` are silently skipped.

use std::io::Read;
use std::io::Seek;

use zip::ZipArchive;
use zip::read::ZipFile;

use crate::error::ExtractError;
use crate::error::Result;
use crate::extraction::engine::EntryKind;
use crate::extraction::engine::EntrySource;
use crate::extraction::engine::SourceEntry;
use crate::security::paths;

use super::common::EntryMeta;

const S_IFMT: u32 = 0o170_000;
const S_IFLNK: u32 = 0o120_000;
const S_IFIFO: u32 = 0o010_000;
const S_IFCHR: u32 = 0o020_000;
const S_IFBLK: u32 = 0o060_000;
const S_IFSOCK: u32 = 0o140_000;

/// Entry source over a zip central directory.
pub(crate) struct ZipSource<R: Read + Seek> {
    archive: ZipArchive<R>,
    index: usize,
}

impl<R: Read + Seek> ZipSource<R> {
    /// Opens the central directory of `reader`.
    pub(crate) fn new(reader: R) -> Result<Self> {
        let archive = ZipArchive::new(reader).map_err(|err| {
            ExtractError::InvalidArchive(format!("failed to open zip archive: {err}"))
        })?;
        Ok(Self { archive, index: 0 })
    }
}

impl<R: Read + Seek> EntrySource for ZipSource<R> {
    type Entry<'s>
        = ZipEntry<'s, R>
    where
        Self: 's;

    fn next_entry(&mut self) -> Option<Result<Self::Entry<'_>>> {
        loop {
            if self.index >= self.archive.len() {
                return None;
            }
            let index = self.index;
            self.index += 1;

            // Skip entries whose cleaned name is the destination root.
            let raw_name = match self.archive.name_for_index(index) {
                Some(name) => name.to_owned(),
                None => continue,
            };
            if paths::clean(&raw_name) == "." {
                continue;
            }

            let file = match self.archive.by_index(index) {
                Ok(file) => file,
                Err(err) => {
                    return Some(Err(ExtractError::InvalidArchive(format!(
                        "failed to read zip entry {raw_name}: {err}"
                    ))));
                }
            };
            return Some(adapt(raw_name, file));
        }
    }
}

/// A zip entry with pre-extracted metadata.
pub(crate) struct ZipEntry<'a, R: Read> {
    inner: ZipFile<'a, R>,
    meta: EntryMeta,
}

fn adapt<'a, R: Read>(name: String, mut file: ZipFile<'a, R>) -> Result<ZipEntry<'a, R>> {
    let unix_mode = file.unix_mode().unwrap_or(0);
    let kind = if file.is_dir() {
        EntryKind::Dir
    } else {
        match unix_mode & S_IFMT {
            S_IFLNK => EntryKind::Symlink,
            S_IFIFO => EntryKind::Unsupported("fifo"),
            S_IFCHR => EntryKind::Unsupported("character device"),
            S_IFBLK => EntryKind::Unsupported("block device"),
            S_IFSOCK => EntryKind::Unsupported("socket"),
            _ => EntryKind::File,
        }
    };

    // A symlink's target is the entry body.
    let link_target = if kind == EntryKind::Symlink {
        let mut target = Vec::new();
        file.read_to_end(&mut target).map_err(|err| {
            ExtractError::InvalidArchive(format!("failed to read symlink target of {name}: {err}"))
        })?;
        String::from_utf8_lossy(&target).into_owned()
    } else {
        String::new()
    };

    let meta = EntryMeta {
        size: file.size(),
        mode: unix_mode & 0o7777,
        kind,
        link_target,
        ..EntryMeta::new(name, kind)
    };
    Ok(ZipEntry { inner: file, meta })
}

impl<R: Read> Read for ZipEntry<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read> SourceEntry for ZipEntry<'_, R> {
    fn name(&self) -> String {
        self.meta.name.clone()
    }

    fn size(&self) -> u64 {
        self.meta.size
    }

    fn mode(&self) -> u32 {
        self.meta.mode
    }

    fn kind(&self) -> EntryKind {
        self.meta.kind
    }

    fn link_target(&self) -> String {
        self.meta.link_target.clone()
    }
}
