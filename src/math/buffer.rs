// Copyright 2020 @TwoCookingMice

use super::constants::{Float, CHANNELS, DISPLAY_MAX};
use crate::core::error::AccumulateError;

/// Row-major RGBA floats, `width * height * 4` long.
pub type SampleBuffer = Vec<Float>;

pub fn buffer_len(width: u32, height: u32) -> Result<usize, AccumulateError> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(CHANNELS))
        .ok_or(AccumulateError::AllocationFailure { width, height })
}

/// Allocates a zero-filled buffer, reporting failure instead of aborting.
pub fn zeroed_buffer(width: u32, height: u32) -> Result<SampleBuffer, AccumulateError> {
    let len = buffer_len(width, height)?;
    let mut buffer = SampleBuffer::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| AccumulateError::AllocationFailure { width, height })?;
    buffer.resize(len, 0.0);
    Ok(buffer)
}

/// Maps a mean intensity to a display byte, rounding half up and clamping.
pub fn quantize(mean: Float) -> u8 {
    if mean.is_nan() {
        return 0;
    }
    (mean * DISPLAY_MAX + 0.5).floor().clamp(0.0, DISPLAY_MAX) as u8
}

/// An 8-bit RGBA frame ready for presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl DisplayImage {
    pub(crate) fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(Some(data.len()), buffer_len(width, height).ok());
        Self { width, height, data }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let base = (y as usize * self.width as usize + x as usize) * CHANNELS;
        let mut out = [0u8; 4];
        out.copy_from_slice(&self.data[base..base + CHANNELS]);
        Some(out)
    }

    pub fn to_rgba_image(&self) -> Option<image::RgbaImage> {
        image::RgbaImage::from_raw(self.width, self.height, self.data.clone())
    }
}
