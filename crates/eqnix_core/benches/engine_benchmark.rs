//! Engine benchmarks
//!
//! Measures the audio-thread path including command draining.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use eqnix_core::{EngineConfig, EqualizerEngine};

fn benchmark_processor(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_processor");

    // Typical buffer sizes used in real-time audio
    for buffer_size in [64, 128, 256, 512, 1024].iter() {
        let mut engine = EqualizerEngine::with_config(EngineConfig {
            emit_response: false,
            ..EngineConfig::default()
        })
        .unwrap();
        let mut processor = engine.take_processor().unwrap();
        engine.apply_preset("Loudness").unwrap();

        // Create test buffer (stereo interleaved)
        let mut buffer: Vec<f32> = (0..*buffer_size * 2).map(|i| (i as f32 * 0.001).sin()).collect();

        group.throughput(Throughput::Elements(*buffer_size as u64 * 2));
        group.bench_function(format!("process_{}_frames", buffer_size), |b| {
            b.iter(|| {
                processor.process(black_box(&mut buffer));
            })
        });
    }

    group.finish();
}

fn benchmark_band_edit(c: &mut Criterion) {
    let engine = EqualizerEngine::with_config(EngineConfig {
        emit_response: false,
        ..EngineConfig::default()
    })
    .unwrap();
    let mut gain = 0.0_f64;

    c.bench_function("band_edit_with_notification", |b| {
        b.iter(|| {
            gain = (gain + 0.5) % 24.0;
            engine.set_band_gain(black_box("band5"), gain).unwrap();
            // Keep the event queue from growing across iterations
            while engine.poll_event().is_some() {}
        })
    });
}

fn benchmark_response_curve(c: &mut Criterion) {
    let engine = EqualizerEngine::new().unwrap();
    engine.apply_preset("Vocal Clarity").unwrap();

    c.bench_function("response_curve_256_points", |b| {
        b.iter(|| black_box(engine.response_curve()))
    });
}

criterion_group!(benches, benchmark_processor, benchmark_band_edit, benchmark_response_curve);
criterion_main!(benches);
