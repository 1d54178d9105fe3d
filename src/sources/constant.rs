// Copyright @yucwang 2026

use crate::core::sample_source::SampleSource;
use crate::math::buffer::SampleBuffer;
use crate::math::constants::Float;

/// Noise-free source: every pixel is the same colour on every call.
pub struct ConstantSource {
    rgba: [Float; 4],
}

impl ConstantSource {
    pub fn new(rgba: [Float; 4]) -> Self {
        Self { rgba }
    }
}

impl SampleSource for ConstantSource {
    fn produce(&self, width: u32, height: u32) -> SampleBuffer {
        let pixels = width as usize * height as usize;
        self.rgba.iter().copied().cycle().take(pixels * self.rgba.len()).collect()
    }

    fn describe(&self) -> String {
        format!("ConstantSource {:?}", self.rgba)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_layout() {
        let source = ConstantSource::new([0.1, 0.2, 0.3, 1.0]);
        let buffer = source.produce(3, 2);
        assert_eq!(buffer.len(), 24);
        assert_eq!(&buffer[4..8], &[0.1, 0.2, 0.3, 1.0]);
        assert_eq!(&buffer[20..24], &[0.1, 0.2, 0.3, 1.0]);
    }
}
