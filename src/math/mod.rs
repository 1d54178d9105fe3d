// Copyright 2020 @TwoCookingMice

pub mod buffer;
pub mod constants;
pub mod spectrum;

use constants::Float;

pub fn lerp(t: Float, a: Float, b: Float) -> Float {
    (1.0 - t) * a + t * b
}
