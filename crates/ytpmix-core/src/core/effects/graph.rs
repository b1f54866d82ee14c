//! Filter graph builder.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`], never by
//! label text. Labels are only allocated for output pads and only turned
//! into text when the graph is serialized, so an undefined or misspelled
//! label cannot be written by construction.
//!
//! ```ignore
//! let mut graph = FilterGraphBuilder::new(1);
//! let v = graph.add_filter(FilterKind::Reverse, StreamRef::video(0));
//! let a = graph.add_filter(FilterKind::Areverse, StreamRef::audio(0));
//! let program = graph.finalize(v, a)?;
//! // program.text == "[0:v]reverse[v0];[0:a]areverse[a1]"
//! ```

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crate::core::{CoreError, CoreResult, StreamKind, TimeRange};

/// Escape a value for use inside a filter argument.
///
/// Filtergraphs treat `:` and `,` as separators and `\` as the escape
/// character; Windows paths contain both.
pub fn escape_filter_value(raw: &str) -> String {
    raw.replace('\\', r"\\")
        .replace(':', r"\:")
        .replace(',', r"\,")
        .replace('\'', r"\'")
}

/// Wrap text in filtergraph single quotes.
///
/// Nothing can be escaped inside a quoted run, so a literal `'` closes the
/// quote, is emitted as `\'` and reopens it.
pub fn quote_filter_text(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

/// Quote an engine expression that contains filter separators or quotes.
///
/// Expressions are passed through verbatim; only quoting is added.
pub fn quote_expression(expr: &str) -> String {
    if expr.contains([',', ':', ';', '\'']) {
        quote_filter_text(expr)
    } else {
        expr.to_string()
    }
}

/// Format a number with at most `decimals` fractional digits, trimming
/// trailing zeros (`1.500000` -> `1.5`, `2.000000` -> `2`).
pub fn format_number(value: f64, decimals: usize) -> String {
    let text = format!("{value:.decimals$}");
    let trimmed = if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text.as_str()
    };
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

fn fmt_time(value: f64) -> String {
    format_number(value, 6)
}

// =============================================================================
// Graph Types
// =============================================================================

/// Index of a node in the builder's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A stream flowing between nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamRef {
    /// Raw stream of engine input `index` (`K:v` / `K:a`)
    Input { index: usize, kind: StreamKind },
    /// Output pad `pad` of a previously added node
    Pad { node: NodeId, pad: usize },
}

impl StreamRef {
    pub fn video(index: usize) -> Self {
        StreamRef::Input {
            index,
            kind: StreamKind::Video,
        }
    }

    pub fn audio(index: usize) -> Self {
        StreamRef::Input {
            index,
            kind: StreamKind::Audio,
        }
    }

    pub fn is_raw_input(&self) -> bool {
        matches!(self, StreamRef::Input { .. })
    }
}

/// The fixed set of filters the compiler emits.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterKind {
    Null,
    Anull,
    Split { outputs: usize },
    Asplit { outputs: usize },
    /// Cut a range and reset timestamps
    Trim { range: TimeRange },
    Atrim { range: TimeRange },
    /// Inputs are interleaved per segment: `video` video pads then `audio`
    /// audio pads, repeated `segments` times
    Concat {
        segments: usize,
        video: usize,
        audio: usize,
    },
    Reverse,
    Areverse,
    Chromakey {
        color: String,
        similarity: f64,
        blend: f64,
    },
    /// Second input is composited over the first
    Overlay {
        x: String,
        y: String,
        /// Visible only while `t` is inside this window
        enable: Option<TimeRange>,
    },
    Asetrate { rate: u32 },
    Aresample { rate: u32 },
    Atempo { factor: f64 },
    Subtitles { path: PathBuf },
}

impl FilterKind {
    /// Engine filter name
    pub fn name(&self) -> &'static str {
        match self {
            FilterKind::Null => "null",
            FilterKind::Anull => "anull",
            FilterKind::Split { .. } => "split",
            FilterKind::Asplit { .. } => "asplit",
            FilterKind::Trim { .. } => "trim",
            FilterKind::Atrim { .. } => "atrim",
            FilterKind::Concat { .. } => "concat",
            FilterKind::Reverse => "reverse",
            FilterKind::Areverse => "areverse",
            FilterKind::Chromakey { .. } => "chromakey",
            FilterKind::Overlay { .. } => "overlay",
            FilterKind::Asetrate { .. } => "asetrate",
            FilterKind::Aresample { .. } => "aresample",
            FilterKind::Atempo { .. } => "atempo",
            FilterKind::Subtitles { .. } => "subtitles",
        }
    }

    fn input_kinds(&self) -> Vec<StreamKind> {
        use StreamKind::{Audio, Video};
        match self {
            FilterKind::Null
            | FilterKind::Split { .. }
            | FilterKind::Trim { .. }
            | FilterKind::Reverse
            | FilterKind::Chromakey { .. }
            | FilterKind::Subtitles { .. } => vec![Video],
            FilterKind::Anull
            | FilterKind::Asplit { .. }
            | FilterKind::Atrim { .. }
            | FilterKind::Areverse
            | FilterKind::Asetrate { .. }
            | FilterKind::Aresample { .. }
            | FilterKind::Atempo { .. } => vec![Audio],
            FilterKind::Overlay { .. } => vec![Video, Video],
            FilterKind::Concat {
                segments,
                video,
                audio,
            } => {
                let mut kinds = Vec::with_capacity(segments * (video + audio));
                for _ in 0..*segments {
                    kinds.extend(std::iter::repeat(Video).take(*video));
                    kinds.extend(std::iter::repeat(Audio).take(*audio));
                }
                kinds
            }
        }
    }

    fn output_kinds(&self) -> Vec<StreamKind> {
        use StreamKind::{Audio, Video};
        match self {
            FilterKind::Split { outputs } => vec![Video; *outputs],
            FilterKind::Asplit { outputs } => vec![Audio; *outputs],
            FilterKind::Concat { video, audio, .. } => {
                let mut kinds = vec![Video; *video];
                kinds.extend(std::iter::repeat(Audio).take(*audio));
                kinds
            }
            // Single-output filters produce the kind they consume
            other => other.input_kinds().into_iter().take(1).collect(),
        }
    }

    /// Filter text between the input and output labels.
    fn body(&self) -> String {
        match self {
            FilterKind::Null
            | FilterKind::Anull
            | FilterKind::Reverse
            | FilterKind::Areverse => self.name().to_string(),
            FilterKind::Split { outputs } | FilterKind::Asplit { outputs } => {
                format!("{}={}", self.name(), outputs)
            }
            FilterKind::Trim { range } => format!(
                "trim=start={}:duration={},setpts=PTS-STARTPTS",
                fmt_time(range.start),
                fmt_time(range.duration)
            ),
            FilterKind::Atrim { range } => format!(
                "atrim=start={}:duration={},asetpts=PTS-STARTPTS",
                fmt_time(range.start),
                fmt_time(range.duration)
            ),
            FilterKind::Concat {
                segments,
                video,
                audio,
            } => format!("concat=n={segments}:v={video}:a={audio}"),
            FilterKind::Chromakey {
                color,
                similarity,
                blend,
            } => format!(
                "chromakey=color={}:similarity={}:blend={}",
                color,
                format_number(*similarity, 6),
                format_number(*blend, 6)
            ),
            FilterKind::Overlay { x, y, enable } => {
                let mut body = format!(
                    "overlay=x={}:y={}",
                    quote_expression(x),
                    quote_expression(y)
                );
                if let Some(window) = enable {
                    body.push_str(&format!(
                        ":enable='between(t,{},{})'",
                        fmt_time(window.start),
                        fmt_time(window.end())
                    ));
                }
                body
            }
            FilterKind::Asetrate { rate } => format!("asetrate={rate}"),
            FilterKind::Aresample { rate } => format!("aresample={rate}"),
            FilterKind::Atempo { factor } => format!("atempo={}", format_number(*factor, 8)),
            FilterKind::Subtitles { path } => format!(
                "subtitles={}",
                quote_filter_text(&escape_filter_value(&path.to_string_lossy()))
            ),
        }
    }
}

/// One node definition in the arena.
#[derive(Clone, Debug)]
pub struct FilterNode {
    pub kind: FilterKind,
    pub inputs: Vec<StreamRef>,
    /// Labels of the output pads, in pad order
    pub outputs: Vec<String>,
}

/// A validated, serialized program ready for `-filter_complex`.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterProgram {
    /// Node definitions joined by `;`
    pub text: String,
    /// Final video label, without brackets
    pub video_label: String,
    /// Final audio label, without brackets
    pub audio_label: String,
    pub node_count: usize,
}

impl FilterProgram {
    /// `-map` argument for the final video stream
    pub fn video_map(&self) -> String {
        format!("[{}]", self.video_label)
    }

    /// `-map` argument for the final audio stream
    pub fn audio_map(&self) -> String {
        format!("[{}]", self.audio_label)
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Arena-based builder for one filter program.
#[derive(Debug)]
pub struct FilterGraphBuilder {
    input_count: usize,
    nodes: Vec<FilterNode>,
    next_label: usize,
}

impl FilterGraphBuilder {
    /// Builder for a command with `input_count` engine inputs.
    pub fn new(input_count: usize) -> Self {
        Self {
            input_count,
            nodes: Vec::new(),
            next_label: 0,
        }
    }

    /// Allocate a fresh label. Never returns the same label twice.
    pub fn allocate_label(&mut self, prefix: &str) -> String {
        let label = format!("{}{}", prefix, self.next_label);
        self.next_label += 1;
        label
    }

    /// Add a node and return one stream per output pad.
    pub fn add_node(&mut self, kind: FilterKind, inputs: Vec<StreamRef>) -> Vec<StreamRef> {
        let id = NodeId(self.nodes.len());
        let outputs: Vec<String> = kind
            .output_kinds()
            .into_iter()
            .map(|k| self.allocate_label(k.specifier()))
            .collect();
        let refs = (0..outputs.len())
            .map(|pad| StreamRef::Pad { node: id, pad })
            .collect();
        self.nodes.push(FilterNode {
            kind,
            inputs,
            outputs,
        });
        refs
    }

    /// Add a single-input, single-output node and return its output.
    pub fn add_filter(&mut self, kind: FilterKind, input: StreamRef) -> StreamRef {
        let id = NodeId(self.nodes.len());
        let label = self.allocate_label(kind.output_kinds().first().map_or("x", |k| k.specifier()));
        self.nodes.push(FilterNode {
            kind,
            inputs: vec![input],
            outputs: vec![label],
        });
        StreamRef::Pad { node: id, pad: 0 }
    }

    pub fn nodes(&self) -> &[FilterNode] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Kind of the stream `r` carries, if `r` points at something that exists.
    fn stream_kind(&self, r: &StreamRef) -> Option<StreamKind> {
        match r {
            StreamRef::Input { index, kind } => (*index < self.input_count).then_some(*kind),
            StreamRef::Pad { node, pad } => self
                .nodes
                .get(node.0)
                .and_then(|n| n.kind.output_kinds().get(*pad).copied()),
        }
    }

    fn ref_text(&self, r: &StreamRef) -> String {
        match r {
            StreamRef::Input { index, kind } => format!("{}:{}", index, kind.specifier()),
            StreamRef::Pad { node, pad } => self
                .nodes
                .get(node.0)
                .and_then(|n| n.outputs.get(*pad))
                .cloned()
                .unwrap_or_else(|| format!("?{}.{}", node.0, pad)),
        }
    }

    /// Validate the whole graph and serialize it in definition order.
    ///
    /// Every input must be a raw stream of an existing engine input or a pad
    /// of an earlier node; every node pad must be consumed exactly once
    /// (the two terminals count as consumers).
    pub fn finalize(self, video: StreamRef, audio: StreamRef) -> CoreResult<FilterProgram> {
        if self.nodes.is_empty() {
            return Err(CoreError::Validation(
                "filter program has no nodes".to_string(),
            ));
        }

        let mut seen_labels = HashSet::new();
        let mut consumed: HashMap<(usize, usize), usize> = HashMap::new();

        for (idx, node) in self.nodes.iter().enumerate() {
            let name = node.kind.name();
            let expected = node.kind.input_kinds();

            if let FilterKind::Split { outputs } | FilterKind::Asplit { outputs } = node.kind {
                if outputs == 0 {
                    return Err(CoreError::Validation(format!(
                        "{name} node #{idx} has no outputs"
                    )));
                }
            }
            if let FilterKind::Concat { segments, .. } = node.kind {
                if segments == 0 {
                    return Err(CoreError::Validation(format!(
                        "concat node #{idx} has no segments"
                    )));
                }
            }

            if node.inputs.len() != expected.len() {
                return Err(CoreError::Validation(format!(
                    "{name} node #{idx} expects {} inputs, got {} (audio/video segment counts must match)",
                    expected.len(),
                    node.inputs.len()
                )));
            }

            for (input, want) in node.inputs.iter().zip(&expected) {
                if let StreamRef::Pad { node: src, pad } = input {
                    if src.0 >= idx {
                        return Err(CoreError::Validation(format!(
                            "{name} node #{idx} references node #{} before it is defined",
                            src.0
                        )));
                    }
                    *consumed.entry((src.0, *pad)).or_insert(0) += 1;
                }

                match self.stream_kind(input) {
                    None => {
                        return Err(CoreError::Validation(format!(
                            "{name} node #{idx} references undefined stream {}",
                            self.ref_text(input)
                        )))
                    }
                    Some(kind) if kind != *want => {
                        return Err(CoreError::Validation(format!(
                            "{name} node #{idx} expects {:?} input, got {:?} from {}",
                            want,
                            kind,
                            self.ref_text(input)
                        )))
                    }
                    Some(_) => {}
                }
            }

            for label in &node.outputs {
                if !seen_labels.insert(label.as_str()) {
                    return Err(CoreError::Validation(format!(
                        "duplicate label [{label}]"
                    )));
                }
            }
        }

        for (terminal, want) in [(video, StreamKind::Video), (audio, StreamKind::Audio)] {
            match terminal {
                StreamRef::Input { .. } => {
                    return Err(CoreError::Validation(format!(
                        "final {:?} stream must be a node output, got raw {}",
                        want,
                        self.ref_text(&terminal)
                    )))
                }
                StreamRef::Pad { node, pad } => {
                    if self.stream_kind(&terminal) != Some(want) {
                        return Err(CoreError::Validation(format!(
                            "final {:?} stream {} is undefined or of the wrong kind",
                            want,
                            self.ref_text(&terminal)
                        )));
                    }
                    *consumed.entry((node.0, pad)).or_insert(0) += 1;
                }
            }
        }

        for (idx, node) in self.nodes.iter().enumerate() {
            for (pad, label) in node.outputs.iter().enumerate() {
                match consumed.get(&(idx, pad)).copied().unwrap_or(0) {
                    1 => {}
                    0 => {
                        return Err(CoreError::Validation(format!(
                            "output [{label}] of {} node #{idx} is never consumed",
                            node.kind.name()
                        )))
                    }
                    n => {
                        return Err(CoreError::Validation(format!(
                            "output [{label}] of {} node #{idx} is consumed {n} times",
                            node.kind.name()
                        )))
                    }
                }
            }
        }

        let text = self
            .nodes
            .iter()
            .map(|node| {
                let ins: String = node
                    .inputs
                    .iter()
                    .map(|r| format!("[{}]", self.ref_text(r)))
                    .collect();
                let outs: String = node.outputs.iter().map(|l| format!("[{l}]")).collect();
                format!("{ins}{}{outs}", node.kind.body())
            })
            .collect::<Vec<_>>()
            .join(";");

        Ok(FilterProgram {
            text,
            video_label: self.ref_text(&video),
            audio_label: self.ref_text(&audio),
            node_count: self.nodes.len(),
        })
    }
}
