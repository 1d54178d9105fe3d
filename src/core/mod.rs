// Copyright @yucwang 2021

pub mod accumulator;
pub mod error;
pub mod presenter;
pub mod rng;
pub mod sample_source;
pub mod settings_loader;
