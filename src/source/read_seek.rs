use std::io::{self, Read, Seek, SeekFrom};

use super::Source;

/// [`Source`] over any `Read + Seek`, such as a `File` or a `Cursor`.
pub struct ReadSeekSource<T: Read + Seek + Send> {
    inner: T,
    pos: u64,
    byte_len: Option<u64>,
}

impl<T: Read + Seek + Send> ReadSeekSource<T> {
    /// Wraps `inner`, measuring its length by seeking to the end and back.
    pub fn new(mut inner: T) -> io::Result<Self> {
        let pos = inner.stream_position()?;
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(pos))?;
        Ok(Self::with_byte_len(inner, pos, Some(len)))
    }

    /// Wraps `inner` without touching it. `pos` has to be its current
    /// position.
    #[inline]
    pub fn with_byte_len(inner: T, pos: u64, byte_len: Option<u64>) -> Self {
        ReadSeekSource { inner, pos, byte_len }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read + Seek + Send> Source for ReadSeekSource<T> {
    fn read_partial(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: u64) -> io::Result<()> {
        self.pos = self.inner.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    #[inline]
    fn tell(&self) -> u64 {
        self.pos
    }

    #[inline]
    fn is_seekable(&self) -> bool {
        true
    }

    #[inline]
    fn byte_len(&self) -> Option<u64> {
        self.byte_len
    }
}

/// Unseekable [`Source`] over any `Read`, such as a socket or a pipe.
pub struct ReadSource<T: Read + Send> {
    inner: T,
    pos: u64,
}

impl<T: Read + Send> ReadSource<T> {
    #[inline]
    pub fn new(inner: T) -> Self {
        ReadSource { inner, pos: 0 }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read + Send> Source for ReadSource<T> {
    fn read_partial(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn seek(&mut self, _pos: u64) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "source does not support seeking",
        ))
    }

    #[inline]
    fn tell(&self) -> u64 {
        self.pos
    }

    #[inline]
    fn is_seekable(&self) -> bool {
        false
    }
}
