//! Circular buffer holding a window of an absolute byte stream.
//!
//! The valid bytes are `[min_pos, max_pos)` in stream positions. A position
//! maps to the storage index `(pos - offset) mod capacity`, so apart from
//! this module the cache only deals in absolute positions.
//!
//! Invariant: `min_pos <= max_pos` and `max_pos - min_pos <= capacity`.

use std::collections::TryReserveError;

use crate::constants::BYTE_META_CHUNK_SIZE;

pub(crate) struct Ring {
    buf: Vec<u8>,
    // Source timestamp for every BYTE_META_CHUNK_SIZE bytes of `buf`.
    meta: Vec<Option<f64>>,
    min_pos: u64,
    max_pos: u64,
    offset: u64,
}

fn try_alloc<T: Clone>(len: usize, value: T) -> Result<Vec<T>, TryReserveError> {
    let mut vec = Vec::new();
    vec.try_reserve_exact(len)?;
    vec.resize(len, value);
    Ok(vec)
}

#[inline]
fn meta_len(capacity: usize) -> usize {
    capacity / BYTE_META_CHUNK_SIZE + 2
}

impl Ring {
    /// Allocates an empty ring anchored at `at`.
    ///
    /// # Panics
    /// Panics if `capacity == 0`.
    pub(crate) fn new(capacity: usize, at: u64) -> Result<Self, TryReserveError> {
        assert!(capacity > 0, "ring capacity must be > 0");
        Ok(Ring {
            buf: try_alloc(capacity, 0u8)?,
            meta: try_alloc(meta_len(capacity), None)?,
            min_pos: at,
            max_pos: at,
            offset: at,
        })
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub(crate) fn min_pos(&self) -> u64 {
        self.min_pos
    }

    #[inline]
    pub(crate) fn max_pos(&self) -> u64 {
        self.max_pos
    }

    #[inline]
    pub(crate) fn contains(&self, pos: u64) -> bool {
        self.min_pos <= pos && pos < self.max_pos
    }

    /// Storage index of a stream position.
    fn index(&self, pos: u64) -> usize {
        let size = self.buf.len() as u64;
        let index = if pos >= self.offset {
            (pos - self.offset) % size
        } else {
            (size - (self.offset - pos) % size) % size
        };
        index as usize
    }

    /// Free storage after `max_pos` before the end of the buffer is hit.
    #[inline]
    pub(crate) fn contiguous_space(&self) -> usize {
        self.buf.len() - self.index(self.max_pos)
    }

    /// Copies cached bytes starting at `pos` into `dst`. Returns how many were
    /// copied, which is 0 if `pos` is not cached.
    pub(crate) fn copy_out(&self, dst: &mut [u8], pos: u64) -> usize {
        if !self.contains(pos) {
            return 0;
        }
        let len = (self.max_pos - pos).min(dst.len() as u64) as usize;
        let start = self.index(pos);
        let first = (self.buf.len() - start).min(len);
        dst[..first].copy_from_slice(&self.buf[start..start + first]);
        if len > first {
            dst[first..len].copy_from_slice(&self.buf[..len - first]);
        }
        len
    }

    /// Appends `data` at `max_pos`, tagging it with the source timestamp
    /// `pts`. The oldest bytes are evicted to make room.
    pub(crate) fn push(&mut self, data: &[u8], pts: Option<f64>) {
        let size = self.buf.len();
        let skip = data.len().saturating_sub(size);
        let data = &data[skip..];
        self.max_pos += skip as u64;
        if data.is_empty() {
            return;
        }

        let n = data.len();
        let start = self.index(self.max_pos);
        let first = (size - start).min(n);
        self.buf[start..start + first].copy_from_slice(&data[..first]);
        self.stamp(start, first, pts);
        if n > first {
            self.buf[..n - first].copy_from_slice(&data[first..]);
            self.stamp(0, n - first, pts);
        }
        if start + n >= size {
            // wrapped
            self.offset += size as u64;
        }

        self.max_pos += n as u64;
        self.min_pos = self.min_pos.max(self.max_pos.saturating_sub(size as u64));
    }

    fn stamp(&mut self, start: usize, len: usize, pts: Option<f64>) {
        let first = start / BYTE_META_CHUNK_SIZE;
        let last = (start + len) / BYTE_META_CHUNK_SIZE;
        for slot in &mut self.meta[first..=last] {
            *slot = pts;
        }
    }

    /// Forgets everything and restarts the window at `at`.
    pub(crate) fn drop_contents(&mut self, at: u64) {
        self.min_pos = at;
        self.max_pos = at;
        self.offset = at;
    }

    /// Source timestamp recorded for the data at `pos`. A position right at
    /// the end of the window reports the last cached byte.
    pub(crate) fn time_at(&self, pos: u64) -> Option<f64> {
        if self.min_pos < self.max_pos && self.min_pos <= pos && pos <= self.max_pos {
            let pos = pos.min(self.max_pos - 1);
            self.meta[self.index(pos) / BYTE_META_CHUNK_SIZE]
        } else {
            None
        }
    }

    /// Moves the window into a buffer of `capacity` bytes.
    ///
    /// Bytes from `read_pos` onward are kept first, as far as they fit. Any
    /// room left goes to the bytes just behind `read_pos`. If `read_pos` is
    /// not in the window nothing is kept. On allocation failure the ring is
    /// left unchanged.
    pub(crate) fn resize(&mut self, capacity: usize, read_pos: u64) -> Result<(), TryReserveError> {
        assert!(capacity > 0, "ring capacity must be > 0");
        let mut buf = try_alloc(capacity, 0u8)?;
        let mut meta = try_alloc(meta_len(capacity), None)?;

        let size = capacity as u64;
        let (start, end) = if self.min_pos <= read_pos && read_pos <= self.max_pos {
            let end = self.max_pos.min(read_pos + size);
            let room = size - (end - read_pos);
            (read_pos - (read_pos - self.min_pos).min(room), end)
        } else {
            (read_pos, read_pos)
        };

        let len = (end - start) as usize;
        if len > 0 {
            let copied = self.copy_out(&mut buf[..len], start);
            debug_assert_eq!(copied, len);
        }
        for (chunk, slot) in meta.iter_mut().enumerate() {
            let pos = start + (chunk * BYTE_META_CHUNK_SIZE) as u64;
            if pos >= end {
                break;
            }
            *slot = self.meta[self.index(pos) / BYTE_META_CHUNK_SIZE];
        }

        self.buf = buf;
        self.meta = meta;
        self.min_pos = start;
        self.max_pos = end;
        self.offset = start;
        Ok(())
    }
}
