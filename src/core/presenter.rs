// Copyright @yucwang 2026

use crate::core::error::PresentError;
use crate::math::buffer::DisplayImage;

/// Sink for normalized frames. Called on the control thread only.
pub trait Presenter {
    fn display(&mut self, image: &DisplayImage) -> Result<(), PresentError>;
}
