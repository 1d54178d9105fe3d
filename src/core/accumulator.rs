// Copyright @yucwang 2026

use crate::core::error::AccumulateError;
use crate::math::buffer::{quantize, zeroed_buffer, DisplayImage, SampleBuffer};
use crate::math::constants::Float;

/// Running per-element sum of every sample merged in the current session.
///
/// `sum` and `sample_count` only change together inside `merge` and `reset`,
/// both of which take `&mut self`, so a reader never sees one without the other.
#[derive(Debug, Clone)]
pub struct Accumulator {
    width: u32,
    height: u32,
    sum: SampleBuffer,
    sample_count: u32,
}

impl Accumulator {
    pub fn new(width: u32, height: u32) -> Result<Self, AccumulateError> {
        Ok(Self {
            width,
            height,
            sum: zeroed_buffer(width, height)?,
            sample_count: 0,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn sum(&self) -> &[Float] {
        &self.sum
    }

    pub fn expected_len(&self) -> usize {
        self.sum.len()
    }

    /// Adds one sample buffer into the running sum.
    ///
    /// A buffer of the wrong length is rejected and the state is left as is.
    pub fn merge(&mut self, sample: &[Float]) -> Result<(), AccumulateError> {
        if sample.len() != self.sum.len() {
            return Err(AccumulateError::DimensionMismatch {
                expected: self.sum.len(),
                actual: sample.len(),
            });
        }

        for (total, value) in self.sum.iter_mut().zip(sample) {
            *total += *value;
        }
        self.sample_count += 1;
        Ok(())
    }

    /// Quantizes the current per-element mean to 8 bits.
    pub fn to_display_image(&self) -> Result<DisplayImage, AccumulateError> {
        if self.sample_count == 0 {
            return Err(AccumulateError::NoSamplesYet);
        }

        let count = self.sample_count as Float;
        let data = self.sum.iter().map(|total| quantize(*total / count)).collect();
        Ok(DisplayImage::from_raw(self.width, self.height, data))
    }

    /// Linear per-element mean, unclamped.
    pub fn average(&self) -> Result<SampleBuffer, AccumulateError> {
        if self.sample_count == 0 {
            return Err(AccumulateError::NoSamplesYet);
        }

        let inv_count = 1.0 / (self.sample_count as Float);
        Ok(self.sum.iter().map(|total| *total * inv_count).collect())
    }

    /// Starts a new session at the given size. On allocation failure the
    /// previous state is kept.
    pub fn reset(&mut self, width: u32, height: u32) -> Result<(), AccumulateError> {
        if width == self.width && height == self.height {
            self.sum.iter_mut().for_each(|v| *v = 0.0);
        } else {
            self.sum = zeroed_buffer(width, height)?;
        }
        self.width = width;
        self.height = height;
        self.sample_count = 0;
        Ok(())
    }
}
