// Copyright @yucwang 2026

pub mod latest;
pub mod png;

pub use latest::LatestFramePresenter;
pub use png::PngPresenter;
