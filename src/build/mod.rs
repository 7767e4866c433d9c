//! Task image rendering and building

pub mod image_builder;
pub mod template_engine;

pub use image_builder::ImageBuilder;
pub use template_engine::{BuildSpec, RenderedBuild, TemplateEngine};
