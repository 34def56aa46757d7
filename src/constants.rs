//! Readahead timing and sizing constants

use std::time::Duration;

/// How long the client waits for the cache thread per wakeup. On each wakeup
/// it checks for cancellation and reports a slow source.
pub const CACHE_WAIT_TIME: Duration = Duration::from_millis(500);

/// How long the cache thread sleeps when idle.
///
/// This controls how often the cache retries reading after EOF, in case the
/// stream becomes readable again (for example a file that is still being
/// written). Too low a value burns CPU while playback is paused.
pub const CACHE_IDLE_SLEEP_TIME: Duration = Duration::from_secs(1);

/// Interval at which the cache thread refreshes its metadata snapshot. Idle
/// mode delays this.
pub const CACHE_UPDATE_CONTROLS_TIME: Duration = Duration::from_secs(2);

/// Minimum time between two stall messages.
pub const CACHE_NO_SPAM: Duration = Duration::from_secs(5);

/// Cumulative wait after which the client warns about a slow source.
pub const STALL_WARN_AFTER: Duration = Duration::from_millis(100);

/// Cumulative wait after which the warning becomes an error.
pub const STALL_ERROR_AFTER: Duration = Duration::from_secs(1);

/// Source timestamps are stored once per chunk of this many buffer bytes.
pub const BYTE_META_CHUNK_SIZE: usize = 8 * 1024;

/// The cache thread only reads if at least this much space is free.
/// Never smaller than two metadata chunks.
pub const FILL_LIMIT: usize = 16 * 1024;

/// Smallest buffer the cache will allocate.
pub const MIN_BUFFER_SIZE: usize = FILL_LIMIT * 4;

/// Read size used when a source has no preference.
pub const DEFAULT_READ_CHUNK: usize = 8 * 1024;

/// Size of the consumer-side buffer behind `BufRead`.
pub const CLIENT_BUFFER_SIZE: usize = 2 * 1024;

/// Buffer size used when none is configured (75 000 KiB).
pub const DEFAULT_CACHE_SIZE: u64 = 75_000 * 1024;

/// Share of the buffer that has to be filled before `build` returns, unless
/// configured explicitly.
pub const DEFAULT_PREFILL_PERCENT: f64 = 20.0;

/// Forward seek distance, as share of the buffer, that is bridged by reading
/// instead of dropping the cache, unless configured explicitly.
pub const DEFAULT_SEEK_LIMIT_PERCENT: f64 = 50.0;
