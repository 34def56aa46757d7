use std::io::{Cursor, Read, Seek, SeekFrom};

use divan::Bencher;
use readahead::{Cache, ReadSeekSource};

fn main() {
    divan::main();
}

const STREAM_LEN: usize = 16 << 20;

fn stream() -> ReadSeekSource<Cursor<Vec<u8>>> {
    let data: Vec<u8> = (0..STREAM_LEN).map(|i| i as u8).collect();
    ReadSeekSource::new(Cursor::new(data)).unwrap()
}

#[divan::bench(args = [512, 4096, 65536])]
fn sequential(bencher: Bencher, read_size: usize) {
    bencher.with_inputs(stream).bench_values(|source| {
        let mut cache = Cache::builder()
            .with_size(1 << 20)
            .with_prefill(0)
            .build(source)
            .unwrap();
        let mut buf = vec![0u8; read_size];
        while cache.fill(&mut buf) > 0 {
            divan::black_box(&buf);
        }
    })
}

#[divan::bench]
fn seek_back_and_forth(bencher: Bencher) {
    bencher.with_inputs(stream).bench_values(|source| {
        let mut cache = Cache::builder()
            .with_size(1 << 20)
            .with_prefill(0)
            .build(source)
            .unwrap();
        let mut buf = vec![0u8; 4096];
        for i in 0..256u64 {
            // small step back, then on
            let pos = i * 32 * 1024;
            cache.seek(SeekFrom::Start(pos.saturating_sub(8192))).unwrap();
            cache.read_exact(&mut buf).unwrap();
            divan::black_box(&buf);
        }
    })
}
