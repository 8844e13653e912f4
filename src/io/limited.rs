//! Byte-capped reader for input-size enforcement.

use std::error::Error;
use std::fmt;
use std::io;
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// Marker error carried inside the `io::Error` a tripped reader returns.
///
/// The pipeline downcasts to this type to convert the failure into a
/// typed input-size quota error instead of a generic I/O failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputLimitError;

impl fmt::Display for InputLimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "max input size exceeded")
    }
}

impl Error for InputLimitError {}

/// Whether an `io::Error` originates from a tripped [`LimitedReader`].
pub(crate) fn is_input_limit(err: &io::Error) -> bool {
    err.get_ref()
        .is_some_and(|inner| inner.downcast_ref::<InputLimitError>().is_some())
}

/// Cloneable handle onto a [`LimitedReader`]'s byte counter.
///
/// The reader is consumed by whichever driver processes the stream; the
/// counter handle stays with the pipeline so telemetry can report the
/// input size after the run.
#[derive(Debug, Clone, Default)]
pub struct ByteCounter(Arc<AtomicU64>);

impl ByteCounter {
    /// Total bytes read so far.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Read-through proxy over a byte source with an integer cap.
///
/// Each read advances an internal counter. Reads are clamped so that at
/// most one byte past the cap is ever delivered; once the counter exceeds
/// the cap (when the cap is non-negative) the next read fails with an
/// [`InputLimitError`]. A cap of `-1` disables the check.
///
/// # Examples
///
/// ```
/// use std::io::Read;
/// use unpax::io::LimitedReader;
///
/// let mut reader = LimitedReader::new(&b"hello"[..], -1);
/// let mut out = String::new();
/// reader.read_to_string(&mut out)?;
/// assert_eq!(out, "hello");
/// assert_eq!(reader.bytes_read(), 5);
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug)]
pub struct LimitedReader<R> {
    inner: R,
    limit: i64,
    count: Arc<AtomicU64>,
    tripped: bool,
}

impl<R> LimitedReader<R> {
    /// Wraps `inner` with a byte cap; `-1` disables the check.
    #[must_use]
    pub fn new(inner: R, limit: i64) -> Self {
        Self {
            inner,
            limit,
            count: Arc::new(AtomicU64::new(0)),
            tripped: false,
        }
    }

    /// Returns a handle that observes the byte counter.
    #[must_use]
    pub fn counter(&self) -> ByteCounter {
        ByteCounter(Arc::clone(&self.count))
    }

    /// Total bytes read so far.
    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl<R: Read> Read for LimitedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.tripped {
            return Err(io::Error::other(InputLimitError));
        }
        let want = if self.limit >= 0 {
            // Deliver at most one byte past the cap so the excess is
            // detectable without letting arbitrary data through.
            let remaining = (self.limit as u64).saturating_sub(self.bytes_read()) + 1;
            buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX))
        } else {
            buf.len()
        };
        let n = self.inner.read(&mut buf[..want])?;
        let total = self.count.fetch_add(n as u64, Ordering::Relaxed) + n as u64;
        if self.limit >= 0 && total > self.limit as u64 {
            self.tripped = true;
        }
        Ok(n)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_passthrough() {
        let data = vec![7u8; 4096];
        let mut reader = LimitedReader::new(&data[..], -1);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(reader.bytes_read(), 4096);
    }

    #[test]
    fn test_exact_cap_is_allowed() {
        let mut reader = LimitedReader::new(&b"12345"[..], 5);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"12345");
    }

    #[test]
    fn test_exceeding_cap_errors_on_next_read() {
        let mut reader = LimitedReader::new(&b"123456"[..], 5);
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert!(is_input_limit(&err));
        // At most one byte past the cap was delivered before tripping.
        assert!(out.len() <= 6);
    }

    #[test]
    fn test_zero_cap() {
        let mut reader = LimitedReader::new(&b"x"[..], 0);
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert!(is_input_limit(&err));
    }

    #[test]
    fn test_counter_handle_survives_reader() {
        let reader = LimitedReader::new(&b"abc"[..], -1);
        let counter = reader.counter();
        let mut reader = reader;
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        drop(reader);
        assert_eq!(counter.get(), 3);
    }

    #[test]
    fn test_empty_source() {
        let mut reader = LimitedReader::new(&b""[..], 10);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert!(out.is_empty());
        assert_eq!(reader.bytes_read(), 0);
    }
}
