// Copyright @yucwang 2026

use crate::math::constants::Float;

pub struct LcgRng {
    state: u64,
}

impl LcgRng {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Seeds a stream for the `index`-th sample drawn from `seed`, so that
    /// neighbouring indices do not produce correlated sequences.
    pub fn for_sample(seed: u64, index: u64) -> Self {
        let mut z = seed ^ index.wrapping_mul(0x9E3779B97F4A7C15);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        Self::new(z ^ (z >> 31))
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        (self.state >> 32) as u32
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f32(&mut self) -> Float {
        ((self.next_u32() >> 8) as Float) * (1.0 / (1u32 << 24) as Float)
    }
}
