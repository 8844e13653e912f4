//! Random-access caching of non-seekable inputs.
//!
//! Zip, 7z and rar need seekable input; the pipeline consumes a plain
//! byte stream. The stream is spooled either into memory
//! (`cache_in_memory`) or into an anonymous temp file that the OS
//! reclaims when the handle drops. Rar additionally needs an on-disk
//! path, so it gets a named temp file removed on drop.

use std::fs::File;
use std::io;
use std::io::Cursor;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;

use tempfile::NamedTempFile;

use crate::error::Result;

/// A fully cached, seekable copy of the input stream.
pub(crate) enum Spooled {
    Memory(Cursor<Vec<u8>>),
    Disk(File),
}

impl Read for Spooled {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Memory(cursor) => cursor.read(buf),
            Self::Disk(file) => file.read(buf),
        }
    }
}

impl Seek for Spooled {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Self::Memory(cursor) => cursor.seek(pos),
            Self::Disk(file) => file.seek(pos),
        }
    }
}

/// Caches `src` for random access.
pub(crate) fn spool<R: Read>(mut src: R, in_memory: bool) -> Result<Spooled> {
    if in_memory {
        let mut buf = Vec::new();
        src.read_to_end(&mut buf)?;
        tracing::debug!(bytes = buf.len(), "cached input in memory");
        Ok(Spooled::Memory(Cursor::new(buf)))
    } else {
        let mut file = tempfile::tempfile()?;
        let bytes = io::copy(&mut src, &mut file)?;
        file.seek(SeekFrom::Start(0))?;
        tracing::debug!(bytes, "cached input in temp file");
        Ok(Spooled::Disk(file))
    }
}

/// Caches `src` in a named temp file for libraries that open by path.
///
/// The file is removed (best-effort) when the returned guard drops,
/// regardless of extraction outcome.
pub(crate) fn spool_to_path<R: Read>(mut src: R) -> Result<NamedTempFile> {
    let mut tmp = NamedTempFile::new()?;
    let bytes = io::copy(&mut src, tmp.as_file_mut())?;
    tmp.as_file_mut().flush()?;
    tracing::debug!(bytes, path = %tmp.path().display(), "cached input in named temp file");
    Ok(tmp)
}
