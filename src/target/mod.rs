//! Destination abstraction for extraction output.
//!
//! All filesystem mutation performed by the pipeline goes through the
//! [`Target`] trait, mediated by the safe-write boundary. Two
//! implementations ship with the crate: [`DiskTarget`] writes to the host
//! filesystem, [`MemoryFs`] keeps everything in a concurrent in-memory map
//! for host-free use and testing.

pub mod disk;
pub mod memory;

pub use disk::DiskTarget;
pub use memory::MemoryFile;
pub use memory::MemoryFs;

use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::time::SystemTime;

use crate::error::ExtractError;
use crate::error::Quota;
use crate::error::Result;

/// Node kinds a target can report from `lstat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Regular file.
    File,
    /// Directory.
    Dir,
    /// Symbolic link.
    Symlink,
    /// Anything else (device, fifo, socket, ...).
    Other,
}

/// File information returned by [`Target::lstat`].
#[derive(Debug, Clone)]
pub struct Metadata {
    /// Base name of the entry.
    pub name: String,
    /// Size in bytes (length of the target path for symlinks).
    pub size: u64,
    /// Permission bits.
    pub mode: u32,
    /// Modification time, when known.
    pub modified: Option<SystemTime>,
    /// What kind of node this is.
    pub kind: NodeKind,
    /// Where a symlink points; `None` for other kinds.
    pub link_target: Option<PathBuf>,
}

impl Metadata {
    /// Whether this entry is a directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Dir
    }

    /// Whether this entry is a regular file.
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    /// Whether this entry is a symlink.
    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.kind == NodeKind::Symlink
    }
}

/// Filesystem mutation interface the pipeline writes through.
///
/// Implementations are exclusively owned by the pipeline for the duration
/// of a run; methods take `&self` so targets stay usable behind a shared
/// reference, with interior synchronisation where needed.
pub trait Target: Send + Sync {
    /// Creates a directory, including missing intermediates; idempotent.
    ///
    /// `mode` applies to the final component. Fails if a non-directory
    /// already occupies the final component.
    fn create_dir(&self, path: &Path, mode: u32) -> Result<()>;

    /// Streams `src` into a new regular file, returning bytes written.
    ///
    /// Fails with [`ExtractError::AlreadyExists`] when `path` is occupied
    /// and `overwrite` is false. When `max_size` is non-negative and `src`
    /// carries more bytes, exactly `max_size` bytes are written before the
    /// copy fails with an extraction-size quota error.
    fn create_file(
        &self,
        path: &Path,
        src: &mut dyn Read,
        mode: u32,
        overwrite: bool,
        max_size: i64,
    ) -> Result<u64>;

    /// Creates a symlink at `path` pointing at `link_target`.
    ///
    /// Replaces an existing entry only when `overwrite` is true and the
    /// entry is not a non-empty directory; otherwise fails with
    /// [`ExtractError::AlreadyExists`].
    fn create_symlink(&self, link_target: &str, path: &Path, overwrite: bool) -> Result<()>;

    /// Returns file information without following a terminal symlink.
    fn lstat(&self, path: &Path) -> Result<Metadata>;
}

/// Copies `src` into `dst` with an optional byte cap.
///
/// With `max_size >= 0`, exactly `max_size` bytes are written before the
/// copy fails with an extraction-size quota error; `-1` disables the cap.
pub(crate) fn copy_limited<W: Write>(
    src: &mut dyn Read,
    dst: &mut W,
    max_size: i64,
) -> Result<u64> {
    let mut buf = [0u8; 32 * 1024];
    let mut written: u64 = 0;
    loop {
        let n = src.read(&mut buf)?;
        if n == 0 {
            return Ok(written);
        }
        let allowed = if max_size >= 0 {
            (max_size as u64).saturating_sub(written).min(n as u64) as usize
        } else {
            n
        };
        dst.write_all(&buf[..allowed])?;
        written += allowed as u64;
        if allowed < n {
            return Err(ExtractError::QuotaExceeded {
                quota: Quota::ExtractionSize,
            });
        }
    }
}

/// Whether an error is a not-found report from a target.
pub(crate) fn is_not_found(err: &ExtractError) -> bool {
    matches!(err, ExtractError::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
}
