//! Render Module
//!
//! Assembles the engine invocation from a compiled graph and runs it.

mod command;
mod export;

pub use command::{CommandAssembler, EngineCommand, PASSTHROUGH_AUDIO_MAP, PASSTHROUGH_VIDEO_MAP};
pub use export::{EngineExecutor, ExportOutcome, FFmpegExecutor};
