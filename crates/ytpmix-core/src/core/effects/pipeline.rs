//! Effect pipeline orchestration.
//!
//! Drives the fixed stage order over one main source:
//! chroma key -> reverse -> stutter -> scramble -> pitch -> overlays -> subtitles.
//! Each stage is optional. When none is engaged the result is an explicit
//! passthrough decision instead of an empty program.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use super::graph::{FilterGraphBuilder, FilterKind, FilterProgram, StreamRef};
use super::models::EffectConfig;
use super::pitch::{plan_pitch_shift, PitchPlan};
use super::segments::{plan_scramble, plan_stutter, total_duration, Segment};
use crate::core::captions::{captions_from_transcript, export_srt};
use crate::core::ffmpeg::DurationProber;
use crate::core::fs::atomic_write_bytes;
use crate::core::project::{MediaSource, Overlay};
use crate::core::{CoreError, CoreResult, TimeRange, TimeSec};

/// Key color for the chroma stage (pure green).
pub const CHROMA_KEY_COLOR: &str = "0x00FF00";

/// Stand-in end time for overlays without a duration.
pub const UNBOUNDED_OVERLAY_SEC: TimeSec = 99_999.0;

/// A pipeline stage that contributed nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectStage {
    ChromaKey,
    Reverse,
    Stutter,
    Scramble,
    PitchShift,
    Overlay,
    Subtitles,
}

/// Everything one compile reads. Borrowed so the caller keeps ownership.
#[derive(Clone, Copy, Debug)]
pub struct CompileInput<'a> {
    pub source: &'a MediaSource,
    pub overlays: &'a [Overlay],
    pub effects: &'a EffectConfig,
    pub transcript: Option<&'a str>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CompiledOutput {
    /// Run `-filter_complex` and map the two final labels
    Program(FilterProgram),
    /// Map the raw source streams directly
    Passthrough,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompiledGraph {
    pub output: CompiledOutput,
    /// Engaged stages, in pipeline order (overlay repeats once per overlay)
    pub stages: Vec<EffectStage>,
    /// Subtitle file written for this compile, if any
    pub subtitle_file: Option<PathBuf>,
}

impl CompiledGraph {
    pub fn program(&self) -> Option<&FilterProgram> {
        match &self.output {
            CompiledOutput::Program(program) => Some(program),
            CompiledOutput::Passthrough => None,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self.output, CompiledOutput::Passthrough)
    }
}

/// Compiles an effect configuration into a filter program.
///
/// The scramble seed is fixed when the compiler is built, so every compile
/// made through the same instance produces the same permutation.
pub struct EffectCompiler {
    prober: Arc<dyn DurationProber>,
    scramble_seed: u64,
    sample_rate: u32,
    subtitle_dir: PathBuf,
}

impl EffectCompiler {
    pub fn new(
        prober: Arc<dyn DurationProber>,
        scramble_seed: u64,
        sample_rate: u32,
        subtitle_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            prober,
            scramble_seed,
            sample_rate,
            subtitle_dir: subtitle_dir.into(),
        }
    }

    pub fn scramble_seed(&self) -> u64 {
        self.scramble_seed
    }

    pub fn compile(&self, input: &CompileInput<'_>) -> CoreResult<CompiledGraph> {
        let effects = input.effects;
        effects.validate()?;

        ensure_file(input.source.path(), "source")?;
        for overlay in input.overlays {
            ensure_file(&overlay.path, "overlay")?;
        }

        let mut graph = FilterGraphBuilder::new(1 + input.overlays.len());
        let mut stages = Vec::new();
        let mut video = StreamRef::video(0);
        let mut audio = StreamRef::audio(0);
        // Length of the running streams once a time-changing stage has run
        let mut running: Option<TimeSec> = None;

        if effects.chroma {
            video = graph.add_filter(
                FilterKind::Chromakey {
                    color: CHROMA_KEY_COLOR.to_string(),
                    similarity: effects.chroma_similarity,
                    blend: effects.chroma_blend,
                },
                video,
            );
            stages.push(EffectStage::ChromaKey);
        }

        if effects.reverse {
            video = graph.add_filter(FilterKind::Reverse, video);
            audio = graph.add_filter(FilterKind::Areverse, audio);
            stages.push(EffectStage::Reverse);
        }

        if effects.stutter {
            let total = input.source.duration(self.prober.as_ref())?;
            let segments = plan_stutter(total, effects.stutter_ms, effects.stutter_repeats)?;
            (video, audio) = cut_and_concat(&mut graph, video, audio, &segments)?;
            running = Some(total_duration(&segments));
            info!(
                segments = segments.len(),
                source_duration = total,
                "Stutter stage engaged"
            );
            stages.push(EffectStage::Stutter);
        }

        if effects.scramble {
            let total = match running {
                Some(d) => d,
                None => input.source.duration(self.prober.as_ref())?,
            };
            let plan = plan_scramble(total, effects.scramble_segments, self.scramble_seed)?;
            let segments = plan.segments();
            (video, audio) = cut_and_concat(&mut graph, video, audio, &segments)?;
            running = Some(total_duration(&segments));
            info!(order = ?plan.order, "Scramble stage engaged");
            stages.push(EffectStage::Scramble);
        }

        if effects.pitch_semitones != 0.0 {
            audio = match plan_pitch_shift(effects.pitch_semitones, self.sample_rate)? {
                PitchPlan::Identity => graph.add_filter(FilterKind::Anull, audio),
                PitchPlan::Shift {
                    shifted_rate,
                    sample_rate,
                    tempo_chain,
                    ..
                } => {
                    let mut a = graph.add_filter(FilterKind::Asetrate { rate: shifted_rate }, audio);
                    a = graph.add_filter(FilterKind::Aresample { rate: sample_rate }, a);
                    for factor in tempo_chain {
                        a = graph.add_filter(FilterKind::Atempo { factor }, a);
                    }
                    a
                }
            };
            stages.push(EffectStage::PitchShift);
        }

        for (k, overlay) in input.overlays.iter().enumerate() {
            let enable = (overlay.start > 0.0).then(|| {
                TimeRange::new(
                    overlay.start,
                    overlay.duration.unwrap_or(UNBOUNDED_OVERLAY_SEC),
                )
            });
            let outs = graph.add_node(
                FilterKind::Overlay {
                    x: overlay.x.clone(),
                    y: overlay.y.clone(),
                    enable,
                },
                vec![video, StreamRef::video(k + 1)],
            );
            video = first_output(&outs)?;
            stages.push(EffectStage::Overlay);
        }

        let mut subtitle_file = None;
        if let Some(text) = input.transcript {
            let captions = captions_from_transcript(text);
            if !captions.is_empty() {
                let path = self
                    .subtitle_dir
                    .join(format!("subtitles_{}.srt", uuid::Uuid::new_v4().simple()));
                atomic_write_bytes(&path, export_srt(&captions).as_bytes())?;
                video = graph.add_filter(FilterKind::Subtitles { path: path.clone() }, video);
                debug!("Wrote {} captions to {}", captions.len(), path.display());
                subtitle_file = Some(path);
                stages.push(EffectStage::Subtitles);
            }
        }

        if stages.is_empty() {
            info!("No effect stage engaged, using stream passthrough");
            return Ok(CompiledGraph {
                output: CompiledOutput::Passthrough,
                stages,
                subtitle_file,
            });
        }

        if video.is_raw_input() {
            video = graph.add_filter(FilterKind::Null, video);
        }
        if audio.is_raw_input() {
            audio = graph.add_filter(FilterKind::Anull, audio);
        }

        let program = graph.finalize(video, audio)?;
        info!(
            nodes = program.node_count,
            stages = ?stages,
            output_duration = ?running,
            "Compiled filter program"
        );
        debug!("filter_complex: {}", program.text);

        Ok(CompiledGraph {
            output: CompiledOutput::Program(program),
            stages,
            subtitle_file,
        })
    }
}

fn ensure_file(path: &Path, label: &str) -> CoreResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(CoreError::Resource(format!(
            "{label} file not found: {}",
            path.display()
        )))
    }
}

fn first_output(outs: &[StreamRef]) -> CoreResult<StreamRef> {
    outs.first()
        .copied()
        .ok_or_else(|| CoreError::Internal("node produced no outputs".to_string()))
}

/// Cut every segment from both streams and concatenate them in order.
///
/// The streams are split first so each trim consumes its own pad.
fn cut_and_concat(
    graph: &mut FilterGraphBuilder,
    video: StreamRef,
    audio: StreamRef,
    segments: &[Segment],
) -> CoreResult<(StreamRef, StreamRef)> {
    let n = segments.len();
    let (video_pads, audio_pads) = if n == 1 {
        (vec![video], vec![audio])
    } else {
        (
            graph.add_node(FilterKind::Split { outputs: n }, vec![video]),
            graph.add_node(FilterKind::Asplit { outputs: n }, vec![audio]),
        )
    };

    let mut concat_inputs = Vec::with_capacity(n * 2);
    for ((segment, v), a) in segments.iter().zip(video_pads).zip(audio_pads) {
        concat_inputs.push(graph.add_filter(FilterKind::Trim { range: segment.range }, v));
        concat_inputs.push(graph.add_filter(FilterKind::Atrim { range: segment.range }, a));
    }

    let outs = graph.add_node(
        FilterKind::Concat {
            segments: n,
            video: 1,
            audio: 1,
        },
        concat_inputs,
    );
    match outs.as_slice() {
        [v, a] => Ok((*v, *a)),
        _ => Err(CoreError::Internal(
            "concat did not produce a video and an audio output".to_string(),
        )),
    }
}
