//! Consumer side of the cache.

use std::fmt;
use std::io::{self, BufRead, Read, Seek, SeekFrom};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::builder::CacheBuilder;
use crate::cancel::CancelToken;
use crate::constants::CLIENT_BUFFER_SIZE;
use crate::control::{ControlError, Request, Response, Snapshot};
use crate::error::Error;
use crate::shared::{buffer_size_for, Shared, Slot, State};
use crate::source::Source;

/// A read-ahead cache in front of a [`Source`].
///
/// A background thread keeps reading from the source into a ring buffer,
/// while this handle serves reads from that buffer. Seeking backward within
/// the buffer, or a short way forward, does not touch the source.
///
/// Implements `Read`, `BufRead` and `Seek`, so it can be handed to anything
/// that reads from a file.
///
/// # Example
/// ```
/// use std::io::{Cursor, Read};
/// use readahead::{Cache, ReadSeekSource};
///
/// let data: Vec<u8> = (0..=255).cycle().take(1 << 20).collect();
/// let source = ReadSeekSource::new(Cursor::new(data.clone()))?;
/// let mut cache = Cache::builder()
///     .with_size(256 * 1024)
///     .with_prefill(0)
///     .build(source)?;
///
/// let mut out = Vec::new();
/// cache.read_to_end(&mut out)?;
/// assert_eq!(out, data);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Cache<S> {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<S>>,
    cancel: CancelToken,
    seekable: bool,

    // Position of the next byte handed to the consumer. The shared read
    // position runs ahead of it by whatever sits in `buf`.
    pos: u64,
    buf: Box<[u8]>,
    buf_pos: usize,
    buf_len: usize,
}

impl Cache<()> {
    /// Starts configuring a cache.
    pub fn builder() -> CacheBuilder {
        CacheBuilder::new()
    }
}

impl<S: Source> Cache<S> {
    pub(crate) fn from_parts(
        shared: Arc<Shared>,
        worker: JoinHandle<S>,
        cancel: CancelToken,
        seekable: bool,
        pos: u64,
    ) -> Self {
        Cache {
            shared,
            worker: Some(worker),
            cancel,
            seekable,
            pos,
            buf: vec![0u8; CLIENT_BUFFER_SIZE].into_boxed_slice(),
            buf_pos: 0,
            buf_len: 0,
        }
    }

    /// Reads cached bytes into `out`, waiting for the cache thread if none
    /// are available.
    ///
    /// Returns the number of bytes read, `0` at the end of the stream or
    /// once the cancel token fires. There is no timeout: a source that
    /// stalls gets reported in the log while the call keeps waiting.
    pub fn fill(&mut self, out: &mut [u8]) -> usize {
        if out.is_empty() {
            return 0;
        }
        let n = if self.buf_pos < self.buf_len {
            let n = (self.buf_len - self.buf_pos).min(out.len());
            out[..n].copy_from_slice(&self.buf[self.buf_pos..self.buf_pos + n]);
            self.buf_pos += n;
            n
        } else if out.len() >= self.buf.len() {
            read_cached(&self.shared, &self.cancel, self.pos, out)
        } else {
            let n = read_cached(&self.shared, &self.cancel, self.pos, &mut self.buf);
            self.buf_len = n;
            self.buf_pos = 0;
            let n = n.min(out.len());
            out[..n].copy_from_slice(&self.buf[..n]);
            self.buf_pos = n;
            n
        };
        self.pos += n as u64;
        n
    }

    /// Moves the read position to `pos`.
    ///
    /// Never blocks. Whether the cache can serve the new position or has to
    /// reseek the source is up to the cache thread. Fails only if the source
    /// cannot seek and `pos` is outside the cached range.
    pub fn seek_to(&mut self, pos: u64) -> Result<(), Error> {
        let mut state = self.shared.lock();
        debug!(
            "request seek: {} <= to={pos} (cur={}) <= {}",
            state.ring.min_pos(),
            state.read_pos,
            state.ring.max_pos()
        );

        if !state.seekable && (pos > state.ring.max_pos() || pos < state.ring.min_pos()) {
            let (min, max) = (state.ring.min_pos(), state.ring.max_pos());
            error!("attempting to seek outside of cached data in unseekable stream");
            return Err(Error::Unseekable { pos, min, max });
        }

        state.read_pos = pos;
        // make fill() wait for new data
        state.eof = false;
        self.shared.notify();
        drop(state);

        self.pos = pos;
        self.discard_buffer();
        Ok(())
    }

    /// Runs a control request.
    ///
    /// Queries the cache can answer itself return at once. Everything else
    /// runs on the cache thread against the source; this blocks until it is
    /// done. If the request moved the source, the cache is emptied and the
    /// read position follows the source.
    pub fn control(&mut self, request: Request) -> Result<Response, ControlError> {
        let shared = Arc::clone(&self.shared);
        let mut state = shared.lock();
        if let Some(answer) = cached_control(&shared, &mut state, &request) {
            return answer;
        }

        debug!("blocking for control {request:?}");
        state.slot = Slot::Pending(request);
        let mut retry = Duration::ZERO;
        let result = loop {
            match std::mem::take(&mut state.slot) {
                Slot::Done(result) => break result,
                slot => state.slot = slot,
            }
            if self.cancel.is_cancelled() {
                // only withdraw what the cache thread has not started on
                if matches!(state.slot, Slot::Pending(_)) {
                    state.slot = Slot::Empty;
                }
                state.eof = true;
                return Err(ControlError::Unsupported);
            }
            state = shared.wakeup_and_wait(state, &mut retry);
        };

        if state.flush {
            state.flush = false;
            self.pos = state.read_pos;
            drop(state);
            self.discard_buffer();
        }
        result
    }

    /// Reallocates the ring buffer to `bytes`, keeping as much of the cached
    /// data around the read position as fits. Runs on the cache thread.
    ///
    /// If the source cannot seek, the data cached ahead of the read position
    /// has to fit into the new buffer; otherwise the resize is refused.
    pub fn resize(&mut self, bytes: u64) -> Result<(), Error> {
        match self.control(Request::SetCacheSize(bytes)) {
            Ok(_) => Ok(()),
            Err(ControlError::Failed) => {
                let state = self.shared.lock();
                let ahead = state.fill_level();
                if !state.seekable && ahead > buffer_size_for(bytes) as u64 {
                    Err(Error::WouldLoseData { bytes, ahead })
                } else {
                    Err(Error::Alloc { bytes })
                }
            }
            Err(ControlError::Unsupported) => Err(Error::Cancelled),
        }
    }

    /// Position of the next byte `fill` returns.
    #[inline]
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Length of the stream, as last reported by the source.
    pub fn byte_len(&self) -> Option<u64> {
        self.shared.lock().snapshot.size
    }

    /// Source metadata as of the last refresh by the cache thread.
    pub fn snapshot(&self) -> Snapshot {
        self.shared.lock().snapshot.clone()
    }

    /// Whether the source can seek. If not, only cached data can be seeked
    /// to.
    #[inline]
    pub fn is_seekable(&self) -> bool {
        self.seekable
    }

    /// Token that cancels blocking calls on this cache.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Stops the cache thread and returns the source.
    pub fn close(mut self) -> Result<S, Error> {
        self.shutdown().ok_or(Error::WorkerPanicked)
    }

    fn discard_buffer(&mut self) {
        self.buf_pos = 0;
        self.buf_len = 0;
    }
}

/// Answers what can be answered without the cache thread.
fn cached_control(
    shared: &Shared,
    state: &mut State,
    request: &Request,
) -> Option<Result<Response, ControlError>> {
    let answer = match request {
        Request::CacheSize => Ok(Response::Bytes(state.ring.capacity() as u64)),
        Request::CacheFill => Ok(Response::Bytes(state.fill_level())),
        Request::CacheIdle => Ok(Response::Flag(state.idle)),
        Request::CurrentTime => state
            .ring
            .time_at(state.read_pos)
            .map(Response::Time)
            .ok_or(ControlError::Unsupported),
        Request::ResumeCache => {
            state.idle = false;
            state.eof = false;
            shared.notify();
            Ok(Response::Done)
        }
        other => return state.snapshot.answer(other),
    };
    Some(answer)
}

/// Copies cached bytes at the shared read position into `out`, waiting for
/// the cache thread until some arrive, the stream ends or `cancel` fires.
fn read_cached(shared: &Shared, cancel: &CancelToken, client_pos: u64, out: &mut [u8]) -> usize {
    let mut state = shared.lock();
    if client_pos != state.read_pos {
        error!(
            "read position {} differs from client position {client_pos}",
            state.read_pos
        );
    }

    let mut retry = Duration::ZERO;
    let reads_before = state.reads;
    let n = loop {
        let n = state.ring.copy_out(out, state.read_pos);
        if n > 0 {
            break n;
        }
        if cancel.is_cancelled() {
            return 0;
        }
        // At least one read attempt has to happen after entering, so that a
        // seek or resume gets a chance to clear a stale EOF.
        if state.eof && !state.ring.contains(state.read_pos) && state.reads > reads_before {
            return 0;
        }
        state.idle = false;
        state = shared.wakeup_and_wait(state, &mut retry);
    };

    state.read_pos += n as u64;
    // possibly make the cache thread read more ahead
    shared.notify();
    n
}

impl<S> Cache<S> {
    /// Tells the cache thread to quit and waits for it. `None` if it was
    /// already stopped or panicked.
    fn shutdown(&mut self) -> Option<S> {
        let worker = self.worker.take()?;
        debug!("terminating cache");
        {
            let mut state = self.shared.lock();
            state.quit = true;
            self.shared.notify();
        }
        worker.join().ok()
    }
}

impl<S> Drop for Cache<S> {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

impl<S> fmt::Debug for Cache<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("Cache")
            .field("pos", &self.pos)
            .field("read_pos", &state.read_pos)
            .field("min_pos", &state.ring.min_pos())
            .field("max_pos", &state.ring.max_pos())
            .field("capacity", &state.ring.capacity())
            .field("eof", &state.eof)
            .field("idle", &state.idle)
            .finish()
    }
}

impl<S: Source> Read for Cache<S> {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.fill(buf))
    }
}

impl<S: Source> BufRead for Cache<S> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.buf_pos >= self.buf_len {
            self.buf_len = read_cached(&self.shared, &self.cancel, self.pos, &mut self.buf);
            self.buf_pos = 0;
        }
        Ok(&self.buf[self.buf_pos..self.buf_len])
    }

    fn consume(&mut self, amt: usize) {
        let amt = amt.min(self.buf_len - self.buf_pos);
        self.buf_pos += amt;
        self.pos += amt as u64;
    }
}

impl<S: Source> Seek for Cache<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(pos) => Some(pos),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
            SeekFrom::End(delta) => {
                let len = self.byte_len().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::Unsupported, "stream length is unknown")
                })?;
                len.checked_add_signed(delta)
            }
        };
        let target = target.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )
        })?;

        if target != self.pos {
            self.seek_to(target)?;
        }
        Ok(target)
    }
}
