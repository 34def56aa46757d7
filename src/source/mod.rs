//! The byte source the cache reads from.

use std::io;

use crate::constants::DEFAULT_READ_CHUNK;
use crate::control::{ControlError, Request, Response};

pub use self::read_seek::{ReadSeekSource, ReadSource};

mod read_seek;

/// A possibly slow, blocking byte stream.
///
/// The cache moves its source onto the cache thread, which is the only
/// caller of these methods while the cache is running. Implementations may
/// block for as long as they need to; the consumer keeps reading buffered
/// data in the meantime.
pub trait Source: Send {
    /// Reads up to `buf.len()` bytes at the current position.
    ///
    /// `Ok(0)` means the end of the stream, for now. The cache keeps retrying
    /// every so often, so a source may start returning data again (e.g. a file
    /// that is still growing). Errors are treated the same as the end of the
    /// stream.
    fn read_partial(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Moves to an absolute byte position. Only called if
    /// [`is_seekable`](Self::is_seekable) returns true.
    fn seek(&mut self, pos: u64) -> io::Result<()>;

    /// Current absolute byte position.
    fn tell(&self) -> u64;

    /// Runs a source specific request. A request that moves the stream must
    /// be reflected by [`tell`](Self::tell), and must not fail after moving.
    fn control(&mut self, request: &Request) -> Result<Response, ControlError> {
        let _ = request;
        Err(ControlError::Unsupported)
    }

    fn is_seekable(&self) -> bool;

    /// Largest read the cache should issue in one call.
    fn preferred_chunk_size(&self) -> usize {
        DEFAULT_READ_CHUNK
    }

    /// Total length in bytes, if known. Queried again periodically, so it may
    /// change over time.
    fn byte_len(&self) -> Option<u64> {
        None
    }
}

impl<S: Source + ?Sized> Source for Box<S> {
    #[inline]
    fn read_partial(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_partial(buf)
    }

    #[inline]
    fn seek(&mut self, pos: u64) -> io::Result<()> {
        (**self).seek(pos)
    }

    #[inline]
    fn tell(&self) -> u64 {
        (**self).tell()
    }

    #[inline]
    fn control(&mut self, request: &Request) -> Result<Response, ControlError> {
        (**self).control(request)
    }

    #[inline]
    fn is_seekable(&self) -> bool {
        (**self).is_seekable()
    }

    #[inline]
    fn preferred_chunk_size(&self) -> usize {
        (**self).preferred_chunk_size()
    }

    #[inline]
    fn byte_len(&self) -> Option<u64> {
        (**self).byte_len()
    }
}
