use std::io::Read;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use readahead::{Cache, Request, Response};

mod test_support;
use test_support::{pattern, MemorySource};

#[test]
fn read_error_ends_the_stream_until_resumed() {
    let data = pattern(200_000);
    let source = MemorySource::new(data.clone()).with_read_error_at(100_000);
    let read_error_at = source.read_error_at();
    let mut cache = Cache::builder().with_size(64 * 1024).build(source).unwrap();

    let start = Instant::now();
    let mut out = Vec::new();
    cache.read_to_end(&mut out).unwrap();
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(out == data[..100_000], "read {} bytes", out.len());

    // the cache thread is still serving requests
    assert_eq!(
        cache.control(Request::Custom { id: 0, arg: vec![1, 2] }),
        Ok(Response::Custom(vec![2, 1]))
    );

    *read_error_at.lock().unwrap() = None;
    cache.seek_to(100_000).unwrap();
    assert_eq!(cache.control(Request::ResumeCache), Ok(Response::Done));

    let mut rest = Vec::new();
    cache.read_to_end(&mut rest).unwrap();
    assert!(rest == data[100_000..], "read {} bytes", rest.len());
}

#[test]
fn failed_reseek_reports_end_of_stream_until_retried() {
    let data = pattern(1 << 20);
    let source = MemorySource::new(data.clone());
    let failing_seeks = source.failing_seeks();
    let seeks = source.seek_log();
    let mut cache = Cache::builder().with_size(64 * 1024).build(source).unwrap();

    let mut buf = vec![0u8; 300_000];
    cache.read_exact(&mut buf).unwrap();

    failing_seeks.store(true, Ordering::SeqCst);
    cache.seek_to(1000).unwrap();
    let start = Instant::now();
    let mut small = [0u8; 4096];
    assert_eq!(cache.fill(&mut small), 0);
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(seeks.lock().unwrap().is_empty());

    failing_seeks.store(false, Ordering::SeqCst);
    cache.seek_to(1000).unwrap();
    assert_eq!(cache.control(Request::ResumeCache), Ok(Response::Done));

    let mut buf = vec![0u8; 3000];
    cache.read_exact(&mut buf).unwrap();
    assert_eq!(buf, data[1000..4000]);
    assert_eq!(*seeks.lock().unwrap(), vec![1000]);
}

#[test]
fn failing_seeks_from_the_start() {
    let data = pattern(300_000);
    let source = MemorySource::new(data.clone()).with_failing_seeks();
    let failing_seeks = source.failing_seeks();
    let mut cache = Cache::builder().with_size(64 * 1024).build(source).unwrap();

    // no seek is needed while reading in order
    let mut buf = vec![0u8; 100_000];
    cache.read_exact(&mut buf).unwrap();
    assert_eq!(buf, data[..100_000]);

    cache.seek_to(0).unwrap();
    let mut small = [0u8; 16];
    assert_eq!(cache.fill(&mut small), 0);

    failing_seeks.store(false, Ordering::SeqCst);
    cache.seek_to(0).unwrap();
    cache.read_exact(&mut small).unwrap();
    assert_eq!(small, data[..16]);
}
