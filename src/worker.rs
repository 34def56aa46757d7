//! The cache thread: keeps the ring filled and runs forwarded controls.

use std::sync::MutexGuard;
use std::time::Instant;

use crate::constants::{CACHE_IDLE_SLEEP_TIME, CACHE_UPDATE_CONTROLS_TIME, FILL_LIMIT};
use crate::control::{ControlError, Request, Response};
use crate::shared::{buffer_size_for, Shared, Slot, State};
use crate::source::Source;

pub(crate) struct Worker<S> {
    source: S,
    // Reads land here first, the ring is only touched with the lock held.
    scratch: Vec<u8>,
}

impl<S: Source> Worker<S> {
    pub(crate) fn new(source: S) -> Self {
        Worker {
            source,
            scratch: Vec::new(),
        }
    }

    /// Runs until the cache is closed, then hands the source back.
    pub(crate) fn run(mut self, shared: &Shared) -> S {
        let mut state = shared.lock();
        self.update_snapshot(&mut state);
        let mut last_update = Instant::now();

        while !state.quit {
            if last_update.elapsed() > CACHE_UPDATE_CONTROLS_TIME {
                self.update_snapshot(&mut state);
                last_update = Instant::now();
            }

            if matches!(state.slot, Slot::Pending(_)) {
                self.execute_control(shared, &mut state);
            } else {
                state = self.fill(shared, state);
            }

            if state.ping {
                state.ping = false;
                shared.notify();
            }
            if state.idle && !state.quit && !matches!(state.slot, Slot::Pending(_)) {
                state = shared.wait(state, CACHE_IDLE_SLEEP_TIME);
            }
        }

        shared.notify();
        drop(state);
        debug!("cache exiting");
        self.source
    }

    /// Reads one chunk ahead of the window, if there is room for it.
    ///
    /// The lock is released around source I/O. Only this thread moves the
    /// window or the source, so `max_pos` is still where the data goes when
    /// the lock is taken back.
    fn fill<'a>(
        &mut self,
        shared: &'a Shared,
        mut state: MutexGuard<'a, State>,
    ) -> MutexGuard<'a, State> {
        let read = state.read_pos;
        let (min, max) = (state.ring.min_pos(), state.ring.max_pos());

        // Drop the cache only when seeking backward or too far forward. This
        // also loses the backlog for local files, but reading through a large
        // gap costs more than the reseek.
        if read < min || (read > max && read >= max + state.seek_limit) {
            if !state.seekable {
                if !state.eof {
                    error!(
                        "cannot seek to {read} in an unseekable stream, cached range is {min}-{max}"
                    );
                }
                self.give_up(shared, &mut state);
                return state;
            }
            debug!("dropping cache at pos {read}, cached range: {min}-{max}");
            state.drop_contents();
        }

        let max = state.ring.max_pos();
        if !state.seekable && self.source.tell() != max {
            // anything read now would land at the wrong position
            if !state.eof {
                error!(
                    "unseekable stream is at {} but the cache ends at {max}",
                    self.source.tell()
                );
            }
            self.give_up(shared, &mut state);
            return state;
        }
        if state.seekable && self.source.tell() != max {
            drop(state);
            let seeked = self.source.seek(max);
            state = shared.lock();
            if let Err(err) = seeked {
                if !state.eof {
                    warn!("seeking the stream to {max} failed: {err}");
                }
                self.give_up(shared, &mut state);
                return state;
            }
        }

        let read = state.read_pos;
        let min = state.ring.min_pos();
        // bytes behind the reader that have to survive this read
        let back = read.saturating_sub(min).min(state.back_size);
        // bytes ahead of the reader that were not consumed yet
        let ahead = max.saturating_sub(read);
        let space = (state.ring.capacity() as u64).saturating_sub(ahead + back);

        if space < FILL_LIMIT as u64 {
            state.idle = true;
            // don't leave the reader waiting for a read that never happens
            state.reads += 1;
            return state;
        }

        // no wrapping, and no reading the whole buffer in one call
        let len = (space as usize)
            .min(state.ring.contiguous_space())
            .min(self.source.preferred_chunk_size().max(1));
        if self.scratch.len() < len {
            self.scratch.resize(len, 0);
        }

        // The read might block for a long time.
        drop(state);
        let result = self.source.read_partial(&mut self.scratch[..len]);
        let pts = match result {
            Ok(n) if n > 0 => match self.source.control(&Request::CurrentTime) {
                Ok(Response::Time(pts)) => Some(pts),
                _ => None,
            },
            _ => None,
        };
        let mut state = shared.lock();

        match result {
            Ok(n) if n > 0 => {
                let n = n.min(len);
                state.ring.push(&self.scratch[..n], pts);
                state.eof = false;
                state.idle = false;
            }
            Ok(_) => {
                if !state.eof {
                    debug!("EOF reached at {}", self.source.tell());
                }
                state.eof = true;
                state.idle = true;
            }
            Err(err) => {
                if !state.eof {
                    warn!("reading the stream at {} failed: {err}", self.source.tell());
                }
                state.eof = true;
                state.idle = true;
            }
        }
        state.reads += 1;
        shared.notify();
        state
    }

    /// Nothing can be read until the consumer does something about it.
    fn give_up(&self, shared: &Shared, state: &mut State) {
        state.eof = true;
        state.idle = true;
        state.reads += 1;
        shared.notify();
    }

    fn execute_control(&mut self, shared: &Shared, state: &mut State) {
        let request = match std::mem::take(&mut state.slot) {
            Slot::Pending(request) => request,
            other => {
                state.slot = other;
                return;
            }
        };

        let result = match request {
            Request::SetCacheSize(bytes) => resize(state, bytes),
            request => self.forward(state, &request),
        };

        state.slot = Slot::Done(result);
        shared.notify();
    }

    fn forward(&mut self, state: &mut State, request: &Request) -> Result<Response, ControlError> {
        let old_pos = self.source.tell();
        let result = self.source.control(request);
        state.flush = false;

        let new_pos = self.source.tell();
        let pos_changed = old_pos != new_pos;
        if pos_changed && result.is_err() {
            error!("control {request:?} changed the stream position but returned an error");
        } else if pos_changed || (result.is_ok() && request.needs_flush()) {
            debug!("dropping cache due to control {request:?}");
            state.read_pos = new_pos;
            state.flush = true;
            state.drop_contents();
            state.idle = false;
        }

        self.update_snapshot(state);
        result
    }

    /// Refreshes the metadata the consumer can query without waiting.
    fn update_snapshot(&mut self, state: &mut State) {
        let source = &mut self.source;
        let snapshot = &mut state.snapshot;

        snapshot.time_length = query_time(source, &Request::TimeLength);
        snapshot.start_time = query_time(source, &Request::StartTime);
        snapshot.manages_timeline = source.control(&Request::ManagesTimeline).is_ok();
        snapshot.num_chapters = match source.control(&Request::NumChapters) {
            Ok(Response::Count(n)) => n,
            _ => 0,
        };
        if let Ok(Response::Metadata(tags)) = source.control(&Request::Metadata) {
            snapshot.metadata = Some(tags);
        }
        if let Ok(Response::Name(name)) = source.control(&Request::DiscName) {
            snapshot.disc_name = Some(name);
        }
        snapshot.size = source.byte_len();
    }
}

fn query_time<S: Source>(source: &mut S, request: &Request) -> Option<f64> {
    match source.control(request) {
        Ok(Response::Time(t)) => Some(t),
        _ => None,
    }
}

/// Reallocates the ring on the cache thread, so no read is in flight.
///
/// An unseekable stream cannot refetch what a smaller buffer would lose, so
/// the data ahead of the reader has to fit.
fn resize(state: &mut State, requested: u64) -> Result<Response, ControlError> {
    let capacity = buffer_size_for(requested);
    if !state.seekable {
        let (min, max) = (state.ring.min_pos(), state.ring.max_pos());
        let ahead = max.saturating_sub(state.read_pos);
        if state.read_pos < min || state.read_pos > max || ahead > capacity as u64 {
            error!(
                "cannot shrink the cache of an unseekable stream to {capacity} bytes, \
                 {ahead} bytes are cached ahead of the reader"
            );
            return Err(ControlError::Failed);
        }
    }
    if let Err(err) = state.ring.resize(capacity, state.read_pos) {
        error!("failed to resize cache to {capacity} bytes: {err}");
        return Err(ControlError::Failed);
    }
    info!("cache resized to {} KiB", capacity / 1024);

    state.update_limits();
    // the window may have been cut short
    state.eof = false;
    state.idle = false;
    Ok(Response::Done)
}
