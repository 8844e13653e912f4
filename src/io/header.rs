//! Replayable prefix buffering for format detection.

use std::io;
use std::io::Read;

/// Buffers the first N bytes of a stream so detection can peek and the
/// consumer can then replay the full stream.
///
/// Construction greedily reads up to `size` bytes; a short read at EOF is
/// acceptable and shrinks the captured header to the bytes actually read.
/// Subsequent reads deliver the buffered header first, then the
/// underlying source.
///
/// # Examples
///
/// ```
/// use std::io::Read;
/// use unpax::io::HeaderReader;
///
/// let mut reader = HeaderReader::new(&b"PK\x03\x04rest"[..], 4)?;
/// assert_eq!(reader.peek(), b"PK\x03\x04");
///
/// let mut replay = Vec::new();
/// reader.read_to_end(&mut replay)?;
/// assert_eq!(replay, b"PK\x03\x04rest");
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug)]
pub struct HeaderReader<R> {
    inner: R,
    header: Vec<u8>,
    pos: usize,
}

impl<R: Read> HeaderReader<R> {
    /// Captures up to `size` bytes from `inner`.
    pub fn new(mut inner: R, size: usize) -> io::Result<Self> {
        let mut header = vec![0u8; size];
        let mut filled = 0;
        while filled < size {
            let n = inner.read(&mut header[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        header.truncate(filled);
        Ok(Self {
            inner,
            header,
            pos: 0,
        })
    }

    /// The captured header bytes, regardless of read progress.
    #[must_use]
    pub fn peek(&self) -> &[u8] {
        &self.header
    }
}

impl<R: Read> Read for HeaderReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos < self.header.len() {
            let n = (self.header.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.header[self.pos..self.pos + n]);
            self.pos += n;
            return Ok(n);
        }
        self.inner.read(buf)
    }
}
