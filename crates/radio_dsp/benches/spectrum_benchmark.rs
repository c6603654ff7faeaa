//! Spectrum update benchmarks.
//!
//! Run with: cargo bench -p radio_dsp

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use radio_dsp::Spectrum;

fn sine_block(amplitude: f32, freq_hz: f32, sample_rate: f32, frames: usize) -> Vec<f32> {
    let mut out = vec![0.0; frames * 2];
    let step = std::f32::consts::TAU * freq_hz / sample_rate;
    for i in 0..frames {
        let s = amplitude * (step * i as f32).sin();
        out[i * 2] = s;
        out[i * 2 + 1] = s;
    }
    out
}

fn benchmark_spectrum_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("spectrum_push_block");

    for fft_size in [512usize, 1024, 2048, 4096] {
        let sample_rate = 48_000.0;
        group.throughput(Throughput::Elements(fft_size as u64));
        group.bench_function(format!("fft_size_{}", fft_size), |b| {
            let mut spectrum = Spectrum::new(fft_size, sample_rate, true, 0.7).unwrap();
            let block = sine_block(0.5, 440.0, sample_rate, 1024);

            b.iter(|| {
                spectrum.push_block(black_box(&block), 2);
                black_box(spectrum.magnitudes());
            })
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_spectrum_push);
criterion_main!(benches);
