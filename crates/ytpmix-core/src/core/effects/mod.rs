//! Effects Module
//!
//! Compiles the declarative effect configuration into a filter program:
//! segment planning, pitch decomposition, the node graph builder and the
//! stage orchestrator.

mod graph;
mod models;
mod pipeline;
mod pitch;
mod segments;

pub use graph::{
    escape_filter_value, format_number, quote_expression, quote_filter_text, FilterGraphBuilder,
    FilterKind, FilterNode, FilterProgram, NodeId, StreamRef,
};
pub use models::*;
pub use pipeline::{
    CompileInput, CompiledGraph, CompiledOutput, EffectCompiler, EffectStage, CHROMA_KEY_COLOR,
    UNBOUNDED_OVERLAY_SEC,
};
pub use pitch::{decompose_tempo, plan_pitch_shift, PitchPlan, MAX_TEMPO_FACTOR, MIN_TEMPO_FACTOR};
pub use segments::{
    plan_scramble, plan_stutter, total_duration, ScramblePlan, Segment, SegmentRole,
    MIN_STUTTER_SEC, SCRAMBLE_FALLBACK_CHUNK_SEC,
};
