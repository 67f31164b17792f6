pub mod config;
pub mod docx;
pub mod error;
pub mod footer;
pub mod progress;
pub mod render;

#[cfg(test)]
mod testutil;

pub use docx::{LoadOptions, Package};
pub use error::{Result, TemplateError};
pub use render::{render, render_file, ImageMap, RenderOptions, RenderReport, TemplateData};
