//! Out-of-band requests that travel between the consumer and the source.
//!
//! A [`Request`] is either answered by the cache itself from state it keeps
//! anyway (fill level, the [`Snapshot`] of source metadata, per-byte
//! timestamps), or it is handed to the cache thread, which runs it against the
//! source and reports back. Only one forwarded request is in flight at a time.

/// A control request.
#[derive(Clone, Debug, PartialEq)]
pub enum Request {
    /// Size of the ring buffer in bytes. Answered by the cache.
    CacheSize,
    /// Bytes cached ahead of the read position. Answered by the cache.
    CacheFill,
    /// Whether the cache thread stopped reading. Answered by the cache.
    CacheIdle,
    /// Wake a cache thread that went idle at EOF and make it read again.
    /// Answered by the cache.
    ResumeCache,
    /// Reallocate the ring buffer to this many bytes. Executed on the cache
    /// thread and never forwarded to the source.
    SetCacheSize(u64),

    /// Stream duration in seconds.
    TimeLength,
    /// Timestamp of the first byte in seconds.
    StartTime,
    /// Stream length in bytes.
    Size,
    /// Whether the source handles timeline positioning itself.
    ManagesTimeline,
    /// Number of chapters.
    NumChapters,
    /// Timestamp of the data at the read position.
    CurrentTime,
    /// Tags, as key/value pairs.
    Metadata,
    /// Name of the disc being played.
    DiscName,

    /// Seek the source to a time in seconds.
    SeekToTime(f64),
    /// Seek the source to a chapter.
    SeekToChapter(u32),
    /// Switch the camera angle.
    SetAngle(u32),
    /// Switch title or track.
    SetCurrentTitle(u32),
    /// Step a tuner by this many channels.
    StepChannel(i32),
    /// Reopen the connection to the source.
    Reconnect,

    /// Source specific request.
    Custom { id: u32, arg: Vec<u8> },
}

impl Request {
    /// Requests that reposition the source as a side effect when they
    /// succeed, even if `tell()` happens to report the same position.
    pub fn needs_flush(&self) -> bool {
        matches!(
            self,
            Request::SeekToTime(_)
                | Request::SeekToChapter(_)
                | Request::SetAngle(_)
                | Request::SetCurrentTitle(_)
                | Request::StepChannel(_)
                | Request::Reconnect
        )
    }
}

/// Successful answer to a [`Request`].
#[derive(Clone, Debug, PartialEq)]
pub enum Response {
    /// The request was carried out and has nothing to report.
    Done,
    Flag(bool),
    /// Time in seconds.
    Time(f64),
    /// Byte count or position.
    Bytes(u64),
    Count(u32),
    Metadata(Vec<(String, String)>),
    Name(String),
    Custom(Vec<u8>),
}

/// Failure of a [`Request`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    /// The source does not know this request.
    #[error("control request not supported")]
    Unsupported,
    /// The source knows the request but could not carry it out.
    #[error("control request failed")]
    Failed,
}

/// Source metadata refreshed by the cache thread so that frequent queries do
/// not have to wait for it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub time_length: Option<f64>,
    pub start_time: Option<f64>,
    pub size: Option<u64>,
    pub manages_timeline: bool,
    pub num_chapters: u32,
    pub metadata: Option<Vec<(String, String)>>,
    pub disc_name: Option<String>,
}

impl Snapshot {
    /// Answers `request` from the snapshot. `None` if the request is not a
    /// metadata query.
    pub(crate) fn answer(&self, request: &Request) -> Option<Result<Response, ControlError>> {
        let unsupported = Err(ControlError::Unsupported);
        let answer = match request {
            Request::TimeLength => match self.time_length {
                Some(t) if t != 0.0 => Ok(Response::Time(t)),
                _ => unsupported,
            },
            Request::StartTime => self
                .start_time
                .map(Response::Time)
                .ok_or(ControlError::Unsupported),
            Request::Size => self
                .size
                .map(Response::Bytes)
                .ok_or(ControlError::Unsupported),
            Request::ManagesTimeline if self.manages_timeline => Ok(Response::Done),
            Request::ManagesTimeline => unsupported,
            Request::NumChapters => Ok(Response::Count(self.num_chapters)),
            Request::Metadata => match &self.metadata {
                Some(tags) if !tags.is_empty() => Ok(Response::Metadata(tags.clone())),
                _ => unsupported,
            },
            Request::DiscName => self
                .disc_name
                .clone()
                .map(Response::Name)
                .ok_or(ControlError::Unsupported),
            _ => return None,
        };
        Some(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_repositioning_requests_flush() {
        assert!(Request::SeekToTime(3.0).needs_flush());
        assert!(Request::SeekToChapter(2).needs_flush());
        assert!(Request::SetAngle(1).needs_flush());
        assert!(Request::SetCurrentTitle(4).needs_flush());
        assert!(Request::StepChannel(-1).needs_flush());
        assert!(Request::Reconnect.needs_flush());

        assert!(!Request::TimeLength.needs_flush());
        assert!(!Request::SetCacheSize(1 << 20).needs_flush());
        assert!(!Request::Custom { id: 7, arg: vec![] }.needs_flush());
    }

    #[test]
    fn empty_snapshot_reports_unsupported() {
        let snapshot = Snapshot::default();
        assert_eq!(snapshot.answer(&Request::TimeLength), Some(Err(ControlError::Unsupported)));
        assert_eq!(snapshot.answer(&Request::Size), Some(Err(ControlError::Unsupported)));
        assert_eq!(snapshot.answer(&Request::Metadata), Some(Err(ControlError::Unsupported)));
        assert_eq!(snapshot.answer(&Request::NumChapters), Some(Ok(Response::Count(0))));
    }

    #[test]
    fn zero_duration_is_unknown() {
        let snapshot = Snapshot {
            time_length: Some(0.0),
            ..Default::default()
        };
        assert_eq!(snapshot.answer(&Request::TimeLength), Some(Err(ControlError::Unsupported)));
    }

    #[test]
    fn non_metadata_requests_are_not_answered() {
        let snapshot = Snapshot::default();
        assert_eq!(snapshot.answer(&Request::SeekToChapter(1)), None);
        assert_eq!(snapshot.answer(&Request::CacheFill), None);
        assert_eq!(snapshot.answer(&Request::CurrentTime), None);
    }
}
