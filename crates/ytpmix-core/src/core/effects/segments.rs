//! Segment planning for the stutter and scramble effects.
//!
//! Plans are pure time arithmetic over a probed duration. Each planned
//! segment is later cut identically from the video and the audio stream so
//! the two stay in sync through the concat.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::core::{CoreError, CoreResult, TimeRange, TimeSec};

/// Shortest fragment a stutter may repeat, in seconds.
pub const MIN_STUTTER_SEC: TimeSec = 0.02;

/// Segments shorter than this are not worth emitting.
const MIN_SEGMENT_SEC: TimeSec = 0.001;

/// Anchor used when the source is long enough: 1s in, or 10% of the clip.
const STUTTER_ANCHOR_SEC: TimeSec = 1.0;
const STUTTER_ANCHOR_FRACTION: f64 = 0.1;

/// Gap kept before the end when the anchor has to be pulled back.
const STUTTER_END_MARGIN_SEC: TimeSec = 0.01;

/// Chunk length used when a source reports zero duration.
pub const SCRAMBLE_FALLBACK_CHUNK_SEC: TimeSec = 0.5;

/// Role of a planned segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentRole {
    /// Material before the repeated fragment
    Pre,
    /// One copy of the repeated fragment
    Repeat,
    /// Material after the repeated fragment
    Post,
    /// Scramble chunk with its original position
    Chunk(usize),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    pub role: SegmentRole,
    pub range: TimeRange,
}

impl Segment {
    fn new(role: SegmentRole, start: TimeSec, duration: TimeSec) -> Self {
        Self {
            role,
            range: TimeRange::new(start, duration),
        }
    }
}

/// Total length of a concatenation of `segments`.
pub fn total_duration(segments: &[Segment]) -> TimeSec {
    segments.iter().map(|s| s.range.duration).sum()
}

/// Plan a stutter over a clip of `total` seconds.
///
/// Emits an optional pre segment, `repeats` copies of the fragment, and an
/// optional post segment, in playback order.
pub fn plan_stutter(total: TimeSec, stutter_ms: u32, repeats: u32) -> CoreResult<Vec<Segment>> {
    if total <= 0.0 || !total.is_finite() {
        return Err(CoreError::FilterBuild(format!(
            "stutter needs a positive source duration, got {total}"
        )));
    }
    if repeats == 0 {
        return Err(CoreError::FilterBuild(
            "stutter repeats must be at least 1".to_string(),
        ));
    }

    let dur = (f64::from(stutter_ms) / 1000.0)
        .max(MIN_STUTTER_SEC)
        .min(total);

    let mut start = STUTTER_ANCHOR_SEC.min(total * STUTTER_ANCHOR_FRACTION);
    if start + dur > total {
        start = (total - dur - STUTTER_END_MARGIN_SEC).max(0.0);
    }

    let mut segments = Vec::with_capacity(repeats as usize + 2);
    if start > MIN_SEGMENT_SEC {
        segments.push(Segment::new(SegmentRole::Pre, 0.0, start));
    }
    for _ in 0..repeats {
        segments.push(Segment::new(SegmentRole::Repeat, start, dur));
    }
    let remainder = total - start - dur;
    if remainder > MIN_SEGMENT_SEC {
        segments.push(Segment::new(SegmentRole::Post, start + dur, remainder));
    }

    Ok(segments)
}

/// A scramble plan: chunks in source order plus the playback permutation.
#[derive(Clone, Debug, PartialEq)]
pub struct ScramblePlan {
    /// Chunk `i` covers this range of the source
    pub chunks: Vec<TimeRange>,
    /// Playback order; a permutation of `0..chunks.len()`
    pub order: Vec<usize>,
}

impl ScramblePlan {
    /// Segments in playback order.
    pub fn segments(&self) -> Vec<Segment> {
        self.order
            .iter()
            .map(|&i| Segment {
                role: SegmentRole::Chunk(i),
                range: self.chunks[i],
            })
            .collect()
    }
}

/// Split `[0, total)` into `count` chunks and shuffle them with `seed`.
///
/// The same seed always yields the same permutation.
pub fn plan_scramble(total: TimeSec, count: u32, seed: u64) -> CoreResult<ScramblePlan> {
    if count == 0 {
        return Err(CoreError::FilterBuild(
            "scramble needs at least one segment".to_string(),
        ));
    }
    if total < 0.0 || !total.is_finite() {
        return Err(CoreError::FilterBuild(format!(
            "scramble needs a non-negative source duration, got {total}"
        )));
    }

    let n = count as usize;
    let chunks: Vec<TimeRange> = if total > 0.0 {
        let chunk = total / n as f64;
        (0..n)
            .map(|i| {
                let start = chunk * i as f64;
                if i + 1 == n {
                    TimeRange::new(start, total - start)
                } else {
                    TimeRange::new(start, chunk)
                }
            })
            .collect()
    } else {
        (0..n)
            .map(|i| TimeRange::new(SCRAMBLE_FALLBACK_CHUNK_SEC * i as f64, SCRAMBLE_FALLBACK_CHUNK_SEC))
            .collect()
    };

    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    Ok(ScramblePlan { chunks, order })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn stutter_example_ten_seconds() {
        let segs = plan_stutter(10.0, 200, 3).unwrap();
        assert_eq!(segs.len(), 5);

        assert_eq!(segs[0].role, SegmentRole::Pre);
        assert!((segs[0].range.start - 0.0).abs() < EPS);
        assert!((segs[0].range.duration - 1.0).abs() < EPS);

        for seg in &segs[1..4] {
            assert_eq!(seg.role, SegmentRole::Repeat);
            assert!((seg.range.start - 1.0).abs() < EPS);
            assert!((seg.range.duration - 0.2).abs() < EPS);
        }

        assert_eq!(segs[4].role, SegmentRole::Post);
        assert!((segs[4].range.start - 1.2).abs() < EPS);
        assert!((segs[4].range.duration - 8.8).abs() < EPS);

        assert!((total_duration(&segs) - 10.4).abs() < 1e-6);
    }

    #[test]
    fn stutter_count_is_repeats_plus_optional_edges() {
        for &(d, ms, r) in &[(10.0, 120, 6), (0.5, 120, 2), (0.03, 500, 4), (3.0, 2900, 1)] {
            let segs = plan_stutter(d, ms, r).unwrap();
            let repeats = segs.iter().filter(|s| s.role == SegmentRole::Repeat).count();
            let pre = segs.iter().filter(|s| s.role == SegmentRole::Pre).count();
            let post = segs.iter().filter(|s| s.role == SegmentRole::Post).count();
            assert_eq!(repeats, r as usize);
            assert!(pre <= 1 && post <= 1);
            assert_eq!(segs.len(), repeats + pre + post);
            assert!(segs.iter().all(|s| s.range.duration > 0.0));

            let dur = segs
                .iter()
                .find(|s| s.role == SegmentRole::Repeat)
                .map(|s| s.range.duration)
                .unwrap();
            // Source material is covered once, plus the extra repeats
            let expected = d + (r as f64 - 1.0) * dur;
            let emitted = total_duration(&segs);
            assert!(
                (emitted - expected).abs() < 0.02,
                "d={d} ms={ms} r={r}: emitted {emitted}, expected {expected}"
            );
        }
    }

    #[test]
    fn stutter_clamps_fragment_length() {
        let short = plan_stutter(10.0, 5, 1).unwrap();
        let rep = short.iter().find(|s| s.role == SegmentRole::Repeat).unwrap();
        assert!((rep.range.duration - MIN_STUTTER_SEC).abs() < EPS);

        let long = plan_stutter(2.0, 10_000, 2).unwrap();
        let rep = long.iter().find(|s| s.role == SegmentRole::Repeat).unwrap();
        assert!((rep.range.duration - 2.0).abs() < EPS);
        assert!((rep.range.start - 0.0).abs() < EPS);
    }

    #[test]
    fn stutter_pulls_anchor_back_near_the_end() {
        // 10% anchor = 0.1s, fragment 0.95s overruns a 1.0s clip
        let segs = plan_stutter(1.0, 950, 2).unwrap();
        let rep = segs.iter().find(|s| s.role == SegmentRole::Repeat).unwrap();
        assert!((rep.range.start - 0.04).abs() < 1e-9);
        assert!(segs.iter().any(|s| s.role == SegmentRole::Pre));
    }

    #[test]
    fn stutter_rejects_degenerate_input() {
        assert!(matches!(plan_stutter(0.0, 120, 3), Err(CoreError::FilterBuild(_))));
        assert!(matches!(plan_stutter(-1.0, 120, 3), Err(CoreError::FilterBuild(_))));
        assert!(matches!(plan_stutter(5.0, 120, 0), Err(CoreError::FilterBuild(_))));
    }

    #[test]
    fn scramble_chunks_cover_duration_exactly() {
        let plan = plan_scramble(10.0, 3, 7).unwrap();
        assert_eq!(plan.chunks.len(), 3);
        let sum: f64 = plan.chunks.iter().map(|c| c.duration).sum();
        assert!((sum - 10.0).abs() < 1e-12);
        assert!((plan.chunks[2].end() - 10.0).abs() < 1e-12);
        for pair in plan.chunks.windows(2) {
            assert!((pair[0].end() - pair[1].start).abs() < 1e-12);
        }
    }

    #[test]
    fn scramble_order_is_a_permutation() {
        for n in 1..=16u32 {
            let plan = plan_scramble(7.3, n, 42).unwrap();
            let mut sorted = plan.order.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, (0..n as usize).collect::<Vec<_>>());
        }
    }

    #[test]
    fn scramble_same_seed_same_order() {
        let a = plan_scramble(12.0, 8, 1234).unwrap();
        let b = plan_scramble(12.0, 8, 1234).unwrap();
        assert_eq!(a.order, b.order);

        let differs = (0..32u64).any(|s| plan_scramble(12.0, 8, s).unwrap().order != a.order);
        assert!(differs);
    }

    #[test]
    fn scramble_segments_follow_order() {
        let plan = plan_scramble(4.0, 4, 99).unwrap();
        let segs = plan.segments();
        for (seg, &idx) in segs.iter().zip(&plan.order) {
            assert_eq!(seg.role, SegmentRole::Chunk(idx));
            assert_eq!(seg.range, plan.chunks[idx]);
        }
    }

    #[test]
    fn scramble_zero_duration_uses_fallback_chunks() {
        let plan = plan_scramble(0.0, 3, 1).unwrap();
        assert!(plan
            .chunks
            .iter()
            .all(|c| (c.duration - SCRAMBLE_FALLBACK_CHUNK_SEC).abs() < EPS));
        assert!((plan.chunks[2].start - 1.0).abs() < EPS);
    }

    #[test]
    fn scramble_rejects_zero_segments() {
        assert!(matches!(plan_scramble(5.0, 0, 1), Err(CoreError::FilterBuild(_))));
    }
}
