//! Tar entry source.
//!
//! Wraps the `tar` crate's streaming reader and maps each header's
//! type-flag onto the uniform entry kinds. PAX global headers pass
//! through as silent no-ops; fifos, devices and hard links surface as
//! unsupported entries for the walk engine's policy to handle.

use std::io::Read;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use tar::Archive;
use tar::Entries;
use tar::EntryType;

use crate::error::ExtractError;
use crate::error::Result;
use crate::extraction::engine::EntryKind;
use crate::extraction::engine::EntrySource;
use crate::extraction::engine::SourceEntry;

use super::common::EntryMeta;

/// Streaming entry source over a tar archive.
pub(crate) struct TarSource<'a, R: 'a + Read> {
    entries: Entries<'a, R>,
}

impl<'a, R: Read> TarSource<'a, R> {
    /// Starts iterating `archive`.
    pub(crate) fn new(archive: &'a mut Archive<R>) -> Result<Self> {
        let entries = archive.entries().map_err(|err| {
            ExtractError::InvalidArchive(format!("failed to read tar entries: {err}"))
        })?;
        Ok(Self { entries })
    }
}

impl<'a, R: Read> EntrySource for TarSource<'a, R> {
    type Entry<'s>
        = TarEntry<'a, R>
    where
        Self: 's;

    fn next_entry(&mut self) -> Option<Result<Self::Entry<'_>>> {
        let entry = match self.entries.next()? {
            Ok(entry) => entry,
            Err(err) => {
                return Some(Err(ExtractError::InvalidArchive(format!(
                    "failed to read tar entry: {err}"
                ))));
            }
        };
        Some(adapt(entry))
    }
}

/// A single tar entry with pre-extracted metadata.
pub(crate) struct TarEntry<'a, R: 'a + Read> {
    inner: tar::Entry<'a, R>,
    meta: EntryMeta,
}

fn adapt<'a, R: Read>(entry: tar::Entry<'a, R>) -> Result<TarEntry<'a, R>> {
    let header = entry.header();
    let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();

    let kind = match header.entry_type() {
        EntryType::Regular | EntryType::Continuous | EntryType::GNUSparse => EntryKind::File,
        EntryType::Directory => EntryKind::Dir,
        EntryType::Symlink => EntryKind::Symlink,
        EntryType::Link => EntryKind::Unsupported("hard link"),
        EntryType::Fifo => EntryKind::Unsupported("fifo"),
        EntryType::Char => EntryKind::Unsupported("character device"),
        EntryType::Block => EntryKind::Unsupported("block device"),
        EntryType::XGlobalHeader => EntryKind::GlobalHeader,
        _ => EntryKind::Unsupported("unknown"),
    };

    let link_target = match entry.link_name() {
        Ok(Some(target)) => target.to_string_lossy().into_owned(),
        Ok(None) => String::new(),
        Err(err) => {
            return Err(ExtractError::InvalidArchive(format!(
                "failed to read link name of {name}: {err}"
            )));
        }
    };

    let size = header.size().map_err(|err| {
        ExtractError::InvalidArchive(format!("invalid size in tar header for {name}: {err}"))
    })?;

    let meta = EntryMeta {
        size,
        mode: header.mode().unwrap_or(0),
        kind,
        link_target,
        modified: header.mtime().ok().map(time_from_unix),
        accessed: header
            .as_gnu()
            .and_then(|gnu| gnu.atime().ok())
            .map(time_from_unix),
        uid: header.uid().unwrap_or(0),
        gid: header.gid().unwrap_or(0),
        ..EntryMeta::new(name, kind)
    };

    Ok(TarEntry { inner: entry, meta })
}

fn time_from_unix(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

impl<R: Read> Read for TarEntry<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read> SourceEntry for TarEntry<'_, R> {
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

    fn modified(&self) -> Option<SystemTime> {
        self.meta.modified
    }

    fn accessed(&self) -> Option<SystemTime> {
        self.meta.accessed
    }

    fn uid(&self) -> u64 {
        self.meta.uid
    }

    fn gid(&self) -> u64 {
        self.meta.gid
    }
}
