//! Criterion benchmarks for the audio delivery path.
//!
//! Both run in the audio callback's context, so they bound how large a block
//! can be delivered without falling behind the capture rate.
//!
//! Run with: cargo bench --bench audio_reduce

use caselights::audio::{reduce, SpectrumAnalyzer};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn test_block(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| (i as f32 * 0.05).sin() * 0.5 + (i as f32 * 0.7).sin() * 0.2)
        .collect()
}

fn reduce_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("audio_reduce");
    for len in [256, 1024, 4096] {
        let block = test_block(len);
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::new("rms", len), &block, |b, block| {
            b.iter(|| reduce(black_box(block), black_box(1.5)));
        });
    }
    group.finish();
}

fn spectrum_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("audio_spectrum");
    for len in [512, 1024, 2048] {
        let block = test_block(len);
        let mut analyzer = SpectrumAnalyzer::new(len, 48_000.0);
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::new("analyze", len), &block, |b, block| {
            b.iter(|| analyzer.analyze(black_box(block)));
        });
    }
    group.finish();
}

criterion_group!(benches, reduce_throughput, spectrum_throughput);
criterion_main!(benches);
