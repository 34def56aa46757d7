//! State shared by the consumer and the cache thread.
//!
//! Everything lives behind one mutex; one condvar is signalled by both sides
//! whenever something the other side might wait for has changed.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::constants::{
    CACHE_NO_SPAM, CACHE_WAIT_TIME, FILL_LIMIT, MIN_BUFFER_SIZE, STALL_ERROR_AFTER,
    STALL_WARN_AFTER,
};
use crate::control::{ControlError, Request, Response, Snapshot};
use crate::ring::Ring;

/// The single request slot between consumer and cache thread.
#[derive(Debug, Default)]
pub(crate) enum Slot {
    #[default]
    Empty,
    /// Posted by the consumer, not yet picked up.
    Pending(Request),
    /// Carried out, waiting for the consumer to collect the result.
    Done(Result<Response, ControlError>),
}

pub(crate) struct State {
    pub(crate) ring: Ring,
    /// Consumer read position. May lie outside the ring for a moment after a
    /// seek, until the cache thread catches up.
    pub(crate) read_pos: u64,
    /// The last read attempt hit the end of the stream.
    pub(crate) eof: bool,
    /// The cache thread stopped reading until woken up.
    pub(crate) idle: bool,
    /// Number of read attempts made by the cache thread.
    pub(crate) reads: u64,

    /// Bytes behind `read_pos` that are kept for seeking backward.
    pub(crate) back_size: u64,
    /// Forward gap that is bridged by reading instead of reseeking, as
    /// configured and as clamped to the current buffer.
    pub(crate) seek_limit_wanted: u64,
    pub(crate) seek_limit: u64,
    pub(crate) seekable: bool,

    pub(crate) slot: Slot,
    /// The last control moved the source; the consumer has to resync.
    pub(crate) flush: bool,
    /// Wake the consumer after the next loop iteration.
    pub(crate) ping: bool,
    pub(crate) quit: bool,

    pub(crate) snapshot: Snapshot,

    /// Consumer side only: when the last stall message was printed.
    pub(crate) last_warn: Option<Instant>,
}

impl State {
    pub(crate) fn new(ring: Ring, seek_limit: u64, seekable: bool) -> Self {
        let mut state = State {
            read_pos: ring.min_pos(),
            ring,
            eof: false,
            idle: false,
            reads: 0,
            back_size: 0,
            seek_limit_wanted: seek_limit,
            seek_limit: 0,
            seekable,
            slot: Slot::Empty,
            flush: false,
            ping: false,
            quit: false,
            snapshot: Snapshot::default(),
            last_warn: None,
        };
        state.update_limits();
        state
    }

    /// Derives the backlog and the effective seek limit from the buffer size.
    ///
    /// The seek limit is kept below `capacity - FILL_LIMIT` so that a reader
    /// waiting past `max_pos` never needs more than the cache thread is
    /// allowed to fetch.
    pub(crate) fn update_limits(&mut self) {
        let capacity = self.ring.capacity() as u64;
        self.back_size = capacity / 2;
        self.seek_limit = self
            .seek_limit_wanted
            .min(capacity.saturating_sub(FILL_LIMIT as u64));
    }

    /// Empties the cache, anchoring it at `read_pos`.
    pub(crate) fn drop_contents(&mut self) {
        self.ring.drop_contents(self.read_pos);
        self.eof = false;
    }

    /// Bytes cached ahead of the reader.
    #[inline]
    pub(crate) fn fill_level(&self) -> u64 {
        self.ring.max_pos().saturating_sub(self.read_pos)
    }
}

/// Clamps a requested buffer size to what the cache can work with.
pub(crate) fn buffer_size_for(requested: u64) -> usize {
    usize::try_from(requested)
        .unwrap_or(usize::MAX)
        .max(MIN_BUFFER_SIZE)
}

pub(crate) struct Shared {
    state: Mutex<State>,
    wakeup: Condvar,
}

impl Shared {
    pub(crate) fn new(state: State) -> Self {
        Shared {
            state: Mutex::new(state),
            wakeup: Condvar::new(),
        }
    }

    /// Locks the state. A panic on the other side does not make the state
    /// unusable; every update to it is finished before a panic could happen.
    pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    pub(crate) fn notify(&self) {
        self.wakeup.notify_one();
    }

    /// Sleeps until signalled or until `timeout` passes.
    pub(crate) fn wait<'a>(
        &'a self,
        state: MutexGuard<'a, State>,
        timeout: Duration,
    ) -> MutexGuard<'a, State> {
        match self.wakeup.wait_timeout(state, timeout) {
            Ok((state, _)) => state,
            Err(poisoned) => poisoned.into_inner().0,
        }
    }

    /// Consumer side: wakes the cache thread and waits a bit for it.
    ///
    /// `retry` accumulates the time spent waiting in one blocking call and
    /// should start at zero. Once it grows large the source is reported as
    /// slow, at most once every few seconds.
    pub(crate) fn wakeup_and_wait<'a>(
        &'a self,
        mut state: MutexGuard<'a, State>,
        retry: &mut Duration,
    ) -> MutexGuard<'a, State> {
        let start = Instant::now();

        let quiet = state
            .last_warn
            .is_some_and(|last| start.duration_since(last) < CACHE_NO_SPAM);
        if !quiet {
            if *retry >= STALL_ERROR_AFTER {
                error!("cache keeps not responding");
                state.last_warn = Some(start);
            } else if *retry > STALL_WARN_AFTER {
                warn!("cache is not responding - slow/stuck network connection?");
                state.last_warn = Some(start);
            }
        }

        self.notify();
        let state = self.wait(state, CACHE_WAIT_TIME);

        *retry += start.elapsed();
        state
    }
}
