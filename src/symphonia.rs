use symphonia::core::io::MediaSource;

use crate::cache::Cache;
use crate::source::Source;

/// Lets a Symphonia format reader pull from the cache.
impl<S: Source + 'static> MediaSource for Cache<S> {
    #[inline]
    fn is_seekable(&self) -> bool {
        Cache::is_seekable(self)
    }

    #[inline]
    fn byte_len(&self) -> Option<u64> {
        Cache::byte_len(self)
    }
}
