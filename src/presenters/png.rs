// Copyright @yucwang 2026

use std::path::{Path, PathBuf};

use crate::core::error::PresentError;
use crate::core::presenter::Presenter;
use crate::math::buffer::DisplayImage;

/// Rewrites one image file with every frame it is shown, so the file always
/// holds the newest estimate. The format follows the file extension.
pub struct PngPresenter {
    path: PathBuf,
    frames_written: u64,
}

impl PngPresenter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf(), frames_written: 0 }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl Presenter for PngPresenter {
    fn display(&mut self, image: &DisplayImage) -> Result<(), PresentError> {
        let rgba = image.to_rgba_image().ok_or(PresentError::Shape {
            width: image.width(),
            height: image.height(),
        })?;
        rgba.save(&self.path)?;
        self.frames_written += 1;
        log::debug!("frame {} written to {}", self.frames_written, self.path.display());
        Ok(())
    }
}
