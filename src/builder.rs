//! Configuring and starting a cache.
//!
//! # Examples
//!
//! ```no_run
//! use std::fs::File;
//! use readahead::{Cache, ReadSeekSource};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let file = File::open("movie.mkv")?;
//!
//!     let cache = Cache::builder()
//!         .with_size(32 * 1024 * 1024)      // 32 MiB ring buffer
//!         .with_seek_limit(8 * 1024 * 1024) // read through forward gaps up to 8 MiB
//!         .with_prefill(1024 * 1024)        // wait for 1 MiB before returning
//!         .build(ReadSeekSource::new(file)?)?;
//!
//!     // Hand the cache to a demuxer...
//!     Ok(())
//! }
//! ```
//!
//! # Settings
//!
//! - `size` - Ring buffer size in bytes, at least 64 KiB
//! - `seek_limit` - Forward seek distance bridged by reading instead of reseeking
//! - `prefill` - Bytes to cache before `build` returns

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::cache::Cache;
use crate::cancel::CancelToken;
use crate::constants::{
    DEFAULT_CACHE_SIZE, DEFAULT_PREFILL_PERCENT, DEFAULT_SEEK_LIMIT_PERCENT, FILL_LIMIT,
};
use crate::error::Error;
use crate::ring::Ring;
use crate::shared::{buffer_size_for, Shared, State};
use crate::source::Source;
use crate::worker::Worker;

/// Cache configuration.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Total buffer size in bytes.
    pub size: u64,

    /// How far ahead of the cached data a seek may land and still be served
    /// by reading forward. Farther seeks drop the cache and reseek the
    /// source. `None` means half of `size`.
    pub seek_limit: Option<u64>,

    /// How many bytes have to be cached before `build` returns. `None` means
    /// a fifth of `size`.
    pub prefill: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            size: DEFAULT_CACHE_SIZE,
            seek_limit: None,
            prefill: None,
        }
    }
}

impl Settings {
    fn percent_of_size(&self, percent: f64) -> u64 {
        (self.size as f64 * percent / 100.0) as u64
    }

    pub(crate) fn effective_seek_limit(&self) -> u64 {
        self.seek_limit
            .unwrap_or_else(|| self.percent_of_size(DEFAULT_SEEK_LIMIT_PERCENT))
    }

    pub(crate) fn effective_prefill(&self) -> u64 {
        self.prefill
            .unwrap_or_else(|| self.percent_of_size(DEFAULT_PREFILL_PERCENT))
    }
}

/// Builder for a [`Cache`].
#[derive(Clone, Debug, Default)]
#[must_use]
pub struct CacheBuilder {
    settings: Settings,
    cancel: CancelToken,
}

impl CacheBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the ring buffer size in bytes.
    pub fn with_size(mut self, bytes: u64) -> Self {
        self.settings.size = bytes;
        self
    }

    /// Sets the forward seek distance that is bridged by reading.
    pub fn with_seek_limit(mut self, bytes: u64) -> Self {
        self.settings.seek_limit = Some(bytes);
        self
    }

    /// Sets how much has to be cached before [`build`](Self::build) returns.
    pub fn with_prefill(mut self, bytes: u64) -> Self {
        self.settings.prefill = Some(bytes);
        self
    }

    /// Uses `cancel` to abort blocking calls, including the prefill wait.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Replaces all settings at once.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Allocates the buffer, starts the cache thread and waits for the
    /// prefill.
    ///
    /// The wait also ends when the source runs dry before the prefill
    /// target, or when the cancel token fires. Neither is an error; the
    /// cache is returned either way.
    pub fn build<S: Source + 'static>(self, source: S) -> Result<Cache<S>, Error> {
        let CacheBuilder { settings, cancel } = self;
        if settings.size == 0 {
            return Err(Error::ZeroSize);
        }

        let stream_len = source.byte_len().filter(|&len| len > 0);
        let mut size = settings.size;
        if let Some(len) = stream_len {
            // no need for more than the whole stream
            size = size.min(len);
        }
        let capacity = buffer_size_for(size);
        info!("cache size set to {} KiB", capacity / 1024);

        let start = source.tell();
        let ring = Ring::new(capacity, start).map_err(|err| {
            error!("failed to allocate cache buffer: {err}");
            Error::Alloc {
                bytes: capacity as u64,
            }
        })?;

        let seekable = source.is_seekable() && stream_len.is_some();
        let state = State::new(ring, settings.effective_seek_limit(), seekable);
        // don't wait for more than the cache thread is allowed to fetch
        let prefill = settings
            .effective_prefill()
            .min((capacity - FILL_LIMIT) as u64);

        let shared = Arc::new(Shared::new(state));
        let worker = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("readahead cache".to_string())
                .spawn(move || Worker::new(source).run(&shared))
                .map_err(|err| {
                    error!("starting cache thread failed: {err}");
                    Error::Spawn(err)
                })?
        };

        let cache = Cache::from_parts(Arc::clone(&shared), worker, cancel, seekable, start);
        wait_for_prefill(&shared, cache.cancel_token(), prefill, capacity);
        Ok(cache)
    }
}

/// Blocks until `prefill` bytes are cached, the cache thread goes idle
/// (stream smaller than the prefill) or `cancel` fires.
fn wait_for_prefill(shared: &Shared, cancel: &CancelToken, prefill: u64, capacity: usize) {
    let mut retry = Duration::ZERO;
    let mut state = shared.lock();
    loop {
        if cancel.is_cancelled() {
            debug!("prefill cancelled");
            return;
        }
        let fill = state.fill_level();
        debug!(
            "cache fill: {:5.2}% ({fill} bytes)",
            100.0 * fill as f64 / capacity as f64
        );
        if fill >= prefill || state.idle {
            return;
        }
        // wake up as soon as the cache thread did a round
        state.ping = true;
        state = shared.wakeup_and_wait(state, &mut retry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MIN_BUFFER_SIZE;

    #[test]
    fn defaults_scale_with_size() {
        let settings = Settings {
            size: 1000,
            ..Default::default()
        };
        assert_eq!(settings.effective_seek_limit(), 500);
        assert_eq!(settings.effective_prefill(), 200);

        let settings = Settings {
            size: 1000,
            seek_limit: Some(7),
            prefill: Some(0),
        };
        assert_eq!(settings.effective_seek_limit(), 7);
        assert_eq!(settings.effective_prefill(), 0);
    }

    #[test]
    fn builder_sets_fields() {
        let cancel = CancelToken::new();
        let builder = CacheBuilder::new()
            .with_size(1 << 20)
            .with_seek_limit(1 << 10)
            .with_prefill(1 << 12)
            .with_cancel_token(cancel.clone());

        assert_eq!(builder.settings.size, 1 << 20);
        assert_eq!(builder.settings.seek_limit, Some(1 << 10));
        assert_eq!(builder.settings.prefill, Some(1 << 12));
        cancel.cancel();
        assert!(builder.cancel.is_cancelled());
    }

    #[test]
    fn zero_size_is_rejected() {
        let source = crate::ReadSource::new(std::io::empty());
        let result = CacheBuilder::new().with_size(0).build(source);
        assert!(matches!(result, Err(Error::ZeroSize)));
    }

    #[test]
    fn small_streams_get_the_minimum_buffer() {
        let data = std::io::Cursor::new(vec![1u8; 100]);
        let source = crate::ReadSeekSource::new(data).unwrap();
        let mut cache = CacheBuilder::new().with_size(1 << 30).build(source).unwrap();

        assert_eq!(
            cache.control(crate::Request::CacheSize),
            Ok(crate::Response::Bytes(MIN_BUFFER_SIZE as u64))
        );
        assert!(cache.is_seekable());
    }
}
