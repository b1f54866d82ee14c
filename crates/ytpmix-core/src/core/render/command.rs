//! Engine command assembly.
//!
//! Layout of every invocation:
//! `ffmpeg [-y] -i <main> [-i <overlay>]* [-filter_complex <program>]
//!  -map <video> -map <audio> <encode flags> <output>`

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::core::effects::{CompiledGraph, CompiledOutput};
use crate::core::plugin::{HookContext, HookReport, PluginRegistry};
use crate::core::process::display_command_line;
use crate::core::project::Overlay;
use crate::core::settings::ExportSettings;

/// Video map used when no stage is engaged
pub const PASSTHROUGH_VIDEO_MAP: &str = "0:v";
/// Audio map used when no stage is engaged; `?` makes audio optional
pub const PASSTHROUGH_AUDIO_MAP: &str = "0:a?";

/// Structured engine invocation. Plugins edit the fields directly.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineCommand {
    pub program: PathBuf,
    /// Flags before the first input (`-y`, `-hide_banner`)
    pub global_args: Vec<String>,
    /// Input files; index in this list is the engine input index
    pub inputs: Vec<PathBuf>,
    pub filter_complex: Option<String>,
    /// `-map` targets, in order
    pub maps: Vec<String>,
    /// Encode flags and any plugin extras, placed before the output path
    pub output_args: Vec<String>,
    pub output: PathBuf,
}

impl EngineCommand {
    pub fn new(program: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            global_args: Vec::new(),
            inputs: Vec::new(),
            filter_complex: None,
            maps: Vec::new(),
            output_args: Vec::new(),
            output: output.into(),
        }
    }

    /// Flatten into the argument vector passed to the process.
    pub fn args(&self) -> Vec<String> {
        let mut args = self.global_args.clone();
        for input in &self.inputs {
            args.push("-i".to_string());
            args.push(input.to_string_lossy().to_string());
        }
        if let Some(program) = &self.filter_complex {
            args.push("-filter_complex".to_string());
            args.push(program.clone());
        }
        for map in &self.maps {
            args.push("-map".to_string());
            args.push(map.clone());
        }
        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());
        args
    }

    /// One-line rendering for logs and dry runs.
    pub fn display(&self) -> String {
        display_command_line(&self.program.to_string_lossy(), &self.args())
    }
}

/// Builds [`EngineCommand`]s with fixed encode parameters.
#[derive(Clone, Debug)]
pub struct CommandAssembler {
    ffmpeg_path: PathBuf,
    encode: ExportSettings,
}

impl CommandAssembler {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, encode: ExportSettings) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            encode,
        }
    }

    fn encode_args(&self) -> Vec<String> {
        vec![
            "-c:v".to_string(),
            self.encode.video_codec.clone(),
            "-preset".to_string(),
            self.encode.preset.clone(),
            "-crf".to_string(),
            self.encode.crf.to_string(),
            "-c:a".to_string(),
            self.encode.audio_codec.clone(),
            "-b:a".to_string(),
            self.encode.audio_bitrate.clone(),
        ]
    }

    /// Build the command without running any plugin hook.
    pub fn build(
        &self,
        source: &Path,
        overlays: &[Overlay],
        compiled: &CompiledGraph,
        output: &Path,
    ) -> EngineCommand {
        let mut command = EngineCommand::new(&self.ffmpeg_path, output);
        if self.encode.overwrite {
            command.global_args.push("-y".to_string());
        }

        command.inputs.push(source.to_path_buf());
        command
            .inputs
            .extend(overlays.iter().map(|o| o.path.clone()));

        match &compiled.output {
            CompiledOutput::Program(program) => {
                command.filter_complex = Some(program.text.clone());
                command.maps = vec![program.video_map(), program.audio_map()];
            }
            CompiledOutput::Passthrough => {
                command.maps = vec![
                    PASSTHROUGH_VIDEO_MAP.to_string(),
                    PASSTHROUGH_AUDIO_MAP.to_string(),
                ];
            }
        }

        command.output_args = self.encode_args();
        command
    }

    /// Build the command and let enabled plugins rewrite it.
    ///
    /// Hook failures end up in the returned report; they never fail assembly.
    pub fn assemble(
        &self,
        source: &Path,
        overlays: &[Overlay],
        compiled: &CompiledGraph,
        output: &Path,
        plugins: &PluginRegistry,
        ctx: &HookContext<'_>,
    ) -> (EngineCommand, HookReport) {
        let mut command = self.build(source, overlays, compiled, output);
        let report = plugins.before_export(ctx, &mut command);
        info!(
            inputs = command.inputs.len(),
            passthrough = command.filter_complex.is_none(),
            hook_failures = report.failures.len(),
            "Assembled engine command"
        );
        (command, report)
    }
}
