//! ytpmix Core Engine
//!
//! Effect compilation, project state, FFmpeg integration and export plumbing.

pub mod captions;
pub mod effects;
pub mod ffmpeg;
pub mod fs;
pub mod jobs;
pub mod plugin;
pub mod presets;
pub mod process;
pub mod project;
pub mod render;
pub mod session;
pub mod settings;

// Re-export common types
mod types;
pub use types::*;

mod error;
pub use error::*;

#[cfg(test)]
mod tests_pipeline;
