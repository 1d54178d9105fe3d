// Copyright @yucwang 2026

use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::rng::LcgRng;
use crate::core::sample_source::SampleSource;
use crate::math::buffer::SampleBuffer;
use crate::math::constants::Float;
use crate::math::lerp;
use crate::math::spectrum::{estimate_xyz, xyz_to_linear_srgb, Blackbody, SampledWavelengths};

/// A horizontal ramp of blackbody colours, one stratified wavelength set per call.
///
/// Each call only sees four wavelengths, so a single sample is strongly
/// tinted; the average converges to the true colour of each temperature.
pub struct BlackbodySource {
    min_kelvin: Float,
    max_kelvin: Float,
    seed: u64,
    calls: AtomicU64,
}

impl BlackbodySource {
    pub const DEFAULT_MIN_KELVIN: Float = 2000.0;
    pub const DEFAULT_MAX_KELVIN: Float = 7500.0;

    pub fn new(min_kelvin: Float, max_kelvin: Float, seed: u64) -> Self {
        Self { min_kelvin, max_kelvin, seed, calls: AtomicU64::new(0) }
    }

    /// Linear sRGB estimate for the temperature at horizontal position `t`.
    fn column_rgb(&self, t: Float, wavelengths: &SampledWavelengths) -> [Float; 4] {
        let spectrum = Blackbody::new(lerp(t, self.min_kelvin, self.max_kelvin));
        let rgb = xyz_to_linear_srgb(&estimate_xyz(|l| spectrum.evaluate(l), wavelengths));
        [rgb.x, rgb.y, rgb.z, 1.0]
    }
}

impl Default for BlackbodySource {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MIN_KELVIN, Self::DEFAULT_MAX_KELVIN, 0)
    }
}

impl SampleSource for BlackbodySource {
    fn produce(&self, width: u32, height: u32) -> SampleBuffer {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        let mut rng = LcgRng::for_sample(self.seed, call);
        let wavelengths = SampledWavelengths::sample_visible(rng.next_f32());

        let row: Vec<Float> = (0..width)
            .flat_map(|x| self.column_rgb(x as Float / width as Float, &wavelengths))
            .collect();

        let mut buffer = Vec::with_capacity(row.len() * height as usize);
        for _ in 0..height {
            buffer.extend_from_slice(&row);
        }
        buffer
    }

    fn describe(&self) -> String {
        format!("BlackbodySource {}K..{}K", self.min_kelvin, self.max_kelvin)
    }
}
