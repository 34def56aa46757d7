//! Read-ahead and backward-seek byte cache for slow or blocking streams.
//!
//! A [`Cache`] sits between a demuxer and a [`Source`] that may block for a
//! long time on every read, such as a network connection or an optical
//! drive. A background thread keeps reading ahead into a fixed-size ring
//! buffer while the consumer reads from memory. Part of the buffer is kept
//! behind the read position, so short backward seeks never reach the source
//! either.
//!
//! Out-of-band requests ([`Request`]) pass through the cache as well. The
//! cache answers what it can from its own state and a periodically refreshed
//! [`Snapshot`] of source metadata; everything else is carried out on the
//! cache thread.
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::{Read, Seek, SeekFrom};
//! use readahead::{Cache, ReadSeekSource};
//!
//! let source = ReadSeekSource::new(File::open("disc.iso")?)?;
//! let mut cache = Cache::builder()
//!     .with_size(8 * 1024 * 1024)
//!     .build(source)?;
//!
//! let mut header = [0u8; 2048];
//! cache.read_exact(&mut header)?;
//! // served from the backlog, the source is not touched
//! cache.seek(SeekFrom::Start(0))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Features
//!
//! - `tracing` (default) - Log through [`tracing`](https://docs.rs/tracing).
//!   Without it, warnings and errors are printed to stderr.
//! - `symphonia` - Implement Symphonia's `MediaSource` for [`Cache`].

#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
mod log;

mod builder;
mod cache;
mod cancel;
pub mod constants;
mod control;
mod error;
mod ring;
mod shared;
pub mod source;
#[cfg(feature = "symphonia")]
#[cfg_attr(docsrs, doc(cfg(feature = "symphonia")))]
mod symphonia;
mod worker;

pub use crate::builder::{CacheBuilder, Settings};
pub use crate::cache::Cache;
pub use crate::cancel::CancelToken;
pub use crate::control::{ControlError, Request, Response, Snapshot};
pub use crate::error::Error;
pub use crate::source::{ReadSeekSource, ReadSource, Source};
