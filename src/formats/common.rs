//! Shared entry plumbing for format drivers.

use std::io;
use std::io::Cursor;
use std::io::Read;
use std::time::SystemTime;

use crate::extraction::engine::EntryKind;
use crate::extraction::engine::SourceEntry;

/// Owned metadata a driver extracts from a format-specific header.
#[derive(Debug, Clone)]
pub(crate) struct EntryMeta {
    pub name: String,
    pub size: u64,
    pub mode: u32,
    pub kind: EntryKind,
    pub link_target: String,
    pub modified: Option<SystemTime>,
    pub accessed: Option<SystemTime>,
    pub uid: u64,
    pub gid: u64,
}

impl EntryMeta {
    pub(crate) fn new(name: String, kind: EntryKind) -> Self {
        Self {
            name,
            size: 0,
            mode: 0,
            kind,
            link_target: String::new(),
            modified: None,
            accessed: None,
            uid: 0,
            gid: 0,
        }
    }
}

/// Entry whose content is fully buffered in memory.
///
/// Used by drivers whose underlying libraries cannot stream entry content
/// through a borrowed reader (7z, rar).
#[derive(Debug)]
pub(crate) struct BufferedEntry {
    meta: EntryMeta,
    data: Cursor<Vec<u8>>,
}

impl BufferedEntry {
    pub(crate) fn new(meta: EntryMeta, data: Vec<u8>) -> Self {
        Self {
            meta,
            data: Cursor::new(data),
        }
    }
}

impl Read for BufferedEntry {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.data.read(buf)
    }
}

impl SourceEntry for BufferedEntry {
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
