// Copyright @yucwang 2021

use crate::core::error::RenderError;
use crate::core::presenter::Presenter;
use crate::renderers::progressive::RenderOutcome;

pub trait Renderer {
    fn render(&self, presenter: &mut dyn Presenter) -> Result<RenderOutcome, RenderError>;
}
