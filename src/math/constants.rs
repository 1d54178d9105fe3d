/* Copyright 2020 @Yuchen Wong */

pub type Float = f32;
pub type Vector3f = na::Vector3<Float>;
pub type Matrix3f = na::Matrix3<Float>;

/// RGBA, one float per channel.
pub const CHANNELS: usize = 4;

/// Largest value a display channel can take.
pub const DISPLAY_MAX: Float = 255.0;
