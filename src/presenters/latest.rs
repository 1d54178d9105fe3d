// Copyright @yucwang 2026

use crate::core::error::PresentError;
use crate::core::presenter::Presenter;
use crate::math::buffer::DisplayImage;

/// Keeps the most recent frame in memory for callers that pull rather than push.
#[derive(Debug, Default)]
pub struct LatestFramePresenter {
    latest: Option<DisplayImage>,
    frames: u64,
}

impl LatestFramePresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<&DisplayImage> {
        self.latest.as_ref()
    }

    pub fn take(&mut self) -> Option<DisplayImage> {
        self.latest.take()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Presenter for LatestFramePresenter {
    fn display(&mut self, image: &DisplayImage) -> Result<(), PresentError> {
        self.latest = Some(image.clone());
        self.frames += 1;
        Ok(())
    }
}
