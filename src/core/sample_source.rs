// Copyright @yucwang 2026

use crate::math::buffer::SampleBuffer;

/// Produces one noisy estimate of the whole image per call.
///
/// Implementations run on worker threads and must return exactly
/// `width * height * 4` floats, row-major RGBA.
pub trait SampleSource: Send + Sync {
    fn produce(&self, width: u32, height: u32) -> SampleBuffer;

    fn describe(&self) -> String {
        String::from("SampleSource")
    }
}
