//! Transcript remix: shuffles words inside each sentence and stutters short
//! words, producing a "pooped" variant of the text.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::sentences_from_transcript;

/// Remix `text` with the given `intensity` (clamped to `[0, 1]`).
///
/// Each sentence gets `max(1, floor(words * intensity))` random swaps. With
/// `allow_repeats`, words of at most three characters are doubled with
/// probability `intensity / 4`. Sentences are re-joined with `". "` and the
/// result ends in `". "` unless empty.
pub fn remix_transcript<R: Rng>(
    text: &str,
    intensity: f64,
    allow_repeats: bool,
    rng: &mut R,
) -> String {
    let intensity = if intensity.is_finite() {
        intensity.clamp(0.0, 1.0)
    } else {
        0.0
    };

    let joined = text.replace('\n', " ");
    let sentences = sentences_from_transcript(&joined);

    let remixed: Vec<String> = sentences
        .iter()
        .map(|sentence| {
            let mut words: Vec<&str> = sentence.split_whitespace().collect();
            let n = words.len();
            if n >= 2 {
                let swaps = ((n as f64 * intensity) as usize).max(1);
                for _ in 0..swaps {
                    let i = rng.gen_range(0..n);
                    let j = rng.gen_range(0..n);
                    words.swap(i, j);
                }
            }

            if allow_repeats {
                let mut stuttered = Vec::with_capacity(words.len() * 2);
                for word in words {
                    stuttered.push(word);
                    if word.chars().count() <= 3 && rng.gen_bool(intensity * 0.25) {
                        stuttered.push(word);
                    }
                }
                stuttered.join(" ")
            } else {
                words.join(" ")
            }
        })
        .collect();

    if remixed.is_empty() {
        String::new()
    } else {
        format!("{}. ", remixed.join(". "))
    }
}

/// [`remix_transcript`] driven by a `StdRng` seeded with `seed`.
pub fn remix_transcript_seeded(text: &str, intensity: f64, allow_repeats: bool, seed: u64) -> String {
    let mut rng = StdRng::seed_from_u64(seed);
    remix_transcript(text, intensity, allow_repeats, &mut rng)
}
