use std::io;

/// Errors returned while setting up or driving a [`Cache`](crate::Cache).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A cache of zero bytes was requested. This disables caching.
    #[error("cache size must be at least one byte")]
    ZeroSize,

    /// The ring buffer could not be allocated. Returned by `build` and
    /// `resize`; a failed resize leaves the previous buffer in place.
    #[error("failed to allocate a {bytes} byte cache buffer")]
    Alloc { bytes: u64 },

    /// The cache thread could not be started.
    #[error("failed to start the cache thread")]
    Spawn(#[source] io::Error),

    /// Seek outside of the cached window on a source that cannot seek.
    #[error("cannot seek to {pos} in an unseekable stream, cached range is {min}..{max}")]
    Unseekable { pos: u64, min: u64, max: u64 },

    /// Shrinking the buffer of an unseekable stream would lose data the
    /// reader has not consumed yet. The previous buffer stays in place.
    #[error("cannot shrink the cache to {bytes} bytes, {ahead} unread bytes would be lost")]
    WouldLoseData { bytes: u64, ahead: u64 },

    /// The cancel token fired before the cache thread carried out the call.
    #[error("the call was cancelled")]
    Cancelled,

    /// The cache thread panicked; the source is lost.
    #[error("the cache thread panicked")]
    WorkerPanicked,
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match err {
            Error::ZeroSize => io::ErrorKind::InvalidInput,
            Error::Alloc { .. } => io::ErrorKind::OutOfMemory,
            Error::Unseekable { .. } | Error::WouldLoseData { .. } => io::ErrorKind::Unsupported,
            Error::Cancelled => io::ErrorKind::Interrupted,
            Error::Spawn(_) | Error::WorkerPanicked => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}
