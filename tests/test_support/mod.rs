#![allow(dead_code)]
/// in separate folder so its not ran as integration test
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use readahead::{ControlError, Request, Response, Source};

/// Playback rate the fake timestamps are derived from.
pub const BYTES_PER_SECOND: f64 = 1000.0;

/// Bytes that tell their own position apart from their neighbours.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// In-memory [`Source`] that records every seek it is asked to do.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Arc<Mutex<Vec<u8>>>,
    pos: u64,
    seekable: bool,
    known_len: bool,
    chunk_size: usize,
    delay: Option<Duration>,
    chapters: Vec<u64>,
    seeks: Arc<Mutex<Vec<u64>>>,
    read_error_at: Arc<Mutex<Option<u64>>>,
    failing_seeks: Arc<AtomicBool>,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(Mutex::new(data)),
            pos: 0,
            seekable: true,
            known_len: true,
            chunk_size: 8 * 1024,
            delay: None,
            chapters: Vec::new(),
            seeks: Arc::new(Mutex::new(Vec::new())),
            read_error_at: Arc::new(Mutex::new(None)),
            failing_seeks: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Behaves like a pipe: no seeking, no length.
    pub fn unseekable(mut self) -> Self {
        self.seekable = false;
        self.known_len = false;
        self
    }

    /// Length is not reported, so data can be appended later.
    pub fn with_unknown_len(mut self) -> Self {
        self.known_len = false;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Sleep this long before every read.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Byte offsets `SeekToChapter` jumps to.
    pub fn with_chapters(mut self, chapters: Vec<u64>) -> Self {
        self.chapters = chapters;
        self
    }

    /// Reads fail once they reach `pos`. Cleared through
    /// [`read_error_at`](Self::read_error_at).
    pub fn with_read_error_at(self, pos: u64) -> Self {
        *self.read_error_at.lock().unwrap() = Some(pos);
        self
    }

    /// Every seek fails until switched off through
    /// [`failing_seeks`](Self::failing_seeks).
    pub fn with_failing_seeks(self) -> Self {
        self.failing_seeks.store(true, Ordering::SeqCst);
        self
    }

    pub fn read_error_at(&self) -> Arc<Mutex<Option<u64>>> {
        Arc::clone(&self.read_error_at)
    }

    pub fn failing_seeks(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.failing_seeks)
    }

    pub fn data(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.data)
    }

    pub fn seek_log(&self) -> Arc<Mutex<Vec<u64>>> {
        Arc::clone(&self.seeks)
    }

    fn len(&self) -> u64 {
        self.data.lock().unwrap().len() as u64
    }
}

impl Source for MemorySource {
    fn read_partial(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        let data = self.data.lock().unwrap();
        let mut end = data.len();
        if let Some(at) = *self.read_error_at.lock().unwrap() {
            if self.pos >= at {
                return Err(io::Error::other("read failed"));
            }
            end = end.min(at as usize);
        }
        let start = (self.pos as usize).min(end);
        let n = buf.len().min(end - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: u64) -> io::Result<()> {
        if !self.seekable {
            return Err(io::Error::new(io::ErrorKind::Unsupported, "pipe"));
        }
        if self.failing_seeks.load(Ordering::SeqCst) {
            return Err(io::Error::other("seek failed"));
        }
        self.seeks.lock().unwrap().push(pos);
        self.pos = pos;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn control(&mut self, request: &Request) -> Result<Response, ControlError> {
        match request {
            Request::CurrentTime => Ok(Response::Time(self.pos as f64 / BYTES_PER_SECOND)),
            Request::TimeLength if self.known_len => {
                Ok(Response::Time(self.len() as f64 / BYTES_PER_SECOND))
            }
            Request::NumChapters if !self.chapters.is_empty() => {
                Ok(Response::Count(self.chapters.len() as u32))
            }
            Request::SeekToChapter(n) => {
                let pos = *self
                    .chapters
                    .get(*n as usize)
                    .ok_or(ControlError::Failed)?;
                self.pos = pos;
                Ok(Response::Done)
            }
            // moves the stream and still reports failure
            Request::SetCurrentTitle(title) => {
                self.pos = *title as u64 * 100_000;
                Err(ControlError::Failed)
            }
            Request::Metadata => Ok(Response::Metadata(vec![(
                "title".to_string(),
                "test stream".to_string(),
            )])),
            Request::Custom { arg, .. } => {
                Ok(Response::Custom(arg.iter().rev().copied().collect()))
            }
            _ => Err(ControlError::Unsupported),
        }
    }

    fn is_seekable(&self) -> bool {
        self.seekable
    }

    fn preferred_chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn byte_len(&self) -> Option<u64> {
        self.known_len.then(|| self.len())
    }
}
