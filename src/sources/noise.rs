// Copyright @yucwang 2026

use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::rng::LcgRng;
use crate::core::sample_source::SampleSource;
use crate::math::buffer::SampleBuffer;

/// Uniform white noise in `[0, 1)` per colour channel, opaque alpha.
///
/// The mean converges to mid grey, which makes the source handy for watching
/// the estimate settle.
pub struct NoiseSource {
    seed: u64,
    calls: AtomicU64,
}

impl NoiseSource {
    pub fn new(seed: u64) -> Self {
        Self { seed, calls: AtomicU64::new(0) }
    }
}

impl SampleSource for NoiseSource {
    fn produce(&self, width: u32, height: u32) -> SampleBuffer {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        let mut rng = LcgRng::for_sample(self.seed, call);
        let pixels = width as usize * height as usize;

        let mut buffer = Vec::with_capacity(pixels * 4);
        for _ in 0..pixels {
            buffer.push(rng.next_f32());
            buffer.push(rng.next_f32());
            buffer.push(rng.next_f32());
            buffer.push(1.0);
        }
        buffer
    }

    fn describe(&self) -> String {
        format!("NoiseSource (seed {})", self.seed)
    }
}
