// Copyright @yucwang 2026

pub mod progressive;
pub mod renderer;

pub use progressive::{ProgressiveRenderer, RenderOutcome, RenderSettings, RenderStats};
pub use renderer::Renderer;
