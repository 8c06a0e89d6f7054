//! Live parameter edits racing the audio path

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use eqnix_dsp::{design, BiquadFilter, Coefficients, EqualizerChain, FilterParameters, FilterType};

const FS: f64 = 48000.0;
const ITERATIONS: usize = 10_000;

fn frequencies() -> Vec<f64> {
    (0..64).map(|i| 50.0 + 300.0 * i as f64).collect()
}

#[test]
fn test_process_never_sees_torn_coefficients() {
    let base = FilterParameters::new(FilterType::Peaking, 1000.0, 1.5, 9.0, FS);
    let mut filter = BiquadFilter::new(base, 1);
    let handle = filter.handle();

    let mut valid: Vec<Coefficients> = frequencies()
        .iter()
        .map(|&f| design(&FilterParameters { frequency: f, ..base }))
        .collect();
    valid.push(design(&base));

    let done = Arc::new(AtomicBool::new(false));
    let writer = {
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let frequencies = frequencies();
            for i in 0..ITERATIONS {
                handle.set_frequency(frequencies[i % frequencies.len()]);
            }
            done.store(true, Ordering::Release);
        })
    };

    let mut processed = 0usize;
    let mut phase = 0.0_f64;
    while !done.load(Ordering::Acquire) || processed < ITERATIONS {
        phase += 0.05;
        let y = filter.process(phase.sin(), 0);
        assert!(y.is_finite());

        let active = filter.active_coefficients();
        assert!(valid.contains(&active), "torn coefficient set: {active:?}");
        processed += 1;
    }

    writer.join().unwrap();

    // The final published set is eventually adopted
    filter.refresh();
    let last = frequencies()[(ITERATIONS - 1) % frequencies().len()];
    assert_eq!(filter.active_coefficients(), design(&FilterParameters { frequency: last, ..base }));
}

#[test]
fn test_chain_edits_from_control_thread() {
    let mut chain = EqualizerChain::with_default_layout(FS, 2).unwrap();
    let controller = chain.controller();
    let subscriber = controller.subscribe();

    let done = Arc::new(AtomicBool::new(false));
    let writer = {
        let done = Arc::clone(&done);
        let controller = controller.clone();
        thread::spawn(move || {
            for i in 0..ITERATIONS {
                let gain = (i % 49) as f64 - 24.0;
                controller.set_gain("band4", gain).unwrap();
                controller.set_frequency("band6", 500.0 + (i % 100) as f64 * 20.0).unwrap();
            }
            done.store(true, Ordering::Release);
        })
    };

    let mut buffer = vec![0.0_f32; 256];
    let mut n = 0u64;
    while !done.load(Ordering::Acquire) {
        for frame in buffer.chunks_exact_mut(2) {
            let x = ((n as f64) * 0.031).sin() as f32 * 0.5;
            frame[0] = x;
            frame[1] = -x;
            n += 1;
        }
        chain.process_interleaved(&mut buffer);
        assert!(buffer.iter().all(|s| s.is_finite()));
    }

    writer.join().unwrap();

    let records = subscriber.drain();
    assert_eq!(records.len(), 2 * ITERATIONS);

    let band4: Vec<f64> = records
        .iter()
        .filter(|r| r.band_id.as_str() == "band4")
        .map(|r| r.gain_db)
        .collect();
    let expected: Vec<f64> = (0..ITERATIONS).map(|i| (i % 49) as f64 - 24.0).collect();
    assert_eq!(band4, expected);
}
