//! Benchmarks for Annex-B scanning and movie layout
//!
//! Runs the scanner and box tree builder over synthetic streams of
//! increasing length.

use avcmux_media::annexb::{scan_reader, to_annexb, Scanner};
use avcmux_media::mp4::{MovieBuilder, MovieOptions, VideoParams};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const SPS: &[u8] = &[0x67, 0x64, 0x00, 0x28, 0xAC, 0xD9, 0x40, 0x78];
const PPS: &[u8] = &[0x68, 0xEB, 0xE3, 0xCB, 0x22, 0xC0];

/// One IDR every 30 frames, non-zero payload bytes so no false start codes.
fn synthetic_stream(frames: usize) -> Vec<u8> {
    let idr = vec![0x65; 40_000];
    let p = vec![0x41; 4_000];
    let mut nal_units: Vec<&[u8]> = vec![SPS, PPS];
    for i in 0..frames {
        nal_units.push(if i % 30 == 0 { &idr[..] } else { &p[..] });
    }
    to_annexb(&nal_units)
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");

    for frames in [30usize, 300, 3000] {
        let stream = synthetic_stream(frames);
        group.throughput(Throughput::Bytes(stream.len() as u64));
        group.bench_with_input(BenchmarkId::new("scan_reader", frames), &stream, |b, s| {
            b.iter(|| scan_reader(black_box(s.as_slice())).unwrap())
        });
    }

    let stream = synthetic_stream(300);
    group.throughput(Throughput::Bytes(stream.len() as u64));
    group.bench_function("feed/4k_chunks", |b| {
        b.iter(|| {
            let mut scanner = Scanner::new().unwrap();
            for chunk in stream.chunks(4096) {
                scanner.feed(black_box(chunk)).unwrap();
            }
            scanner.finish().unwrap()
        })
    });

    group.finish();
}

fn bench_layout(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout");
    let options = MovieOptions::default();
    let params = VideoParams::new(1920, 1080, 30);

    for frames in [300usize, 3000] {
        let scan = scan_reader(synthetic_stream(frames).as_slice()).unwrap();
        group.bench_with_input(BenchmarkId::new("build", frames), &scan, |b, scan| {
            b.iter(|| {
                MovieBuilder::new(black_box(scan), params, &options)
                    .build()
                    .unwrap()
            })
        });
        group.bench_with_input(BenchmarkId::new("header_bytes", frames), &scan, |b, scan| {
            let layout = MovieBuilder::new(scan, params, &options).build().unwrap();
            b.iter(|| layout.header_bytes().unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_scan, bench_layout);
criterion_main!(benches);
