/* Copyright 2020 @TwoCookingMice */

use std::path::Path;

use exr::prelude::*;

use crate::core::accumulator::Accumulator;
use crate::core::error::PresentError;
use crate::math::constants::{Float, CHANNELS};

/// Writes the unclamped per-pixel mean of `accumulator` as an RGBA OpenEXR file.
pub fn write_average_exr<P: AsRef<Path>>(accumulator: &Accumulator, file_path: P) -> std::result::Result<(), PresentError> {
    let file_path = file_path.as_ref();
    let average = accumulator.average()?;
    write_rgba_exr(&average, accumulator.width() as usize, accumulator.height() as usize, file_path)
}

// Write EXR Image to file
pub fn write_rgba_exr(image: &[Float],
                      width: usize,
                      height: usize,
                      file_path: &Path) -> std::result::Result<(), PresentError> {
    log::info!("Starting writing openexr images: {}.", file_path.display());
    if image.len() != width * height * CHANNELS {
        return Err(PresentError::Shape { width: width as u32, height: height as u32 });
    }

    write_rgba_file(file_path, width, height, |x, y| {
        let base = (y * width + x) * CHANNELS;
        (image[base], image[base + 1], image[base + 2], image[base + 3])
    })?;
    log::info!("EXR written to: {}.", file_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_round_trips_through_exr() {
        let path = std::env::temp_dir().join(format!("sampleloom-exr-{}.exr", std::process::id()));
        let mut acc = Accumulator::new(2, 1).unwrap();
        acc.merge(&[2.0, 0.0, 0.5, 1.0, 0.0, 1.0, 0.0, 1.0]).unwrap();
        acc.merge(&[4.0, 0.0, 0.5, 1.0, 0.0, 0.0, 0.0, 1.0]).unwrap();
        write_average_exr(&acc, &path).unwrap();

        let image = read().no_deep_data()
            .largest_resolution_level()
            .rgba_channels(
                |resolution, _| vec![(0.0f32, 0.0f32, 0.0f32, 0.0f32); resolution.width() * resolution.height()],
                |pixels: &mut Vec<(f32, f32, f32, f32)>, position, (r, g, b, a): (f32, f32, f32, f32)| {
                    pixels[position.y() * 2 + position.x()] = (r, g, b, a);
                },
            )
            .first_valid_layer()
            .all_attributes()
            .from_file(&path)
            .unwrap();
        let pixels = image.layer_data.channel_data.pixels;
        assert_eq!(pixels[0], (3.0, 0.0, 0.5, 1.0));
        assert_eq!(pixels[1], (0.0, 0.5, 0.0, 1.0));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_empty_accumulator_is_rejected() {
        let acc = Accumulator::new(1, 1).unwrap();
        let path = std::env::temp_dir().join("sampleloom-never-written.exr");
        assert!(write_average_exr(&acc, &path).is_err());
    }
}
