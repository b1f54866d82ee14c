//! Caption Format Export
//!
//! SRT is the only format the subtitle stage needs.

use super::Caption;

/// Exports captions to SRT format.
///
/// ```text
/// 1
/// 00:00:00,000 --> 00:00:03,000
/// First caption text
/// ```
pub fn export_srt(captions: &[Caption]) -> String {
    let mut output = String::new();

    for (index, caption) in captions.iter().enumerate() {
        output.push_str(&format!("{}\n", index + 1));
        output.push_str(&format!(
            "{} --> {}\n",
            format_srt_timestamp(caption.start_sec),
            format_srt_timestamp(caption.end_sec)
        ));
        output.push_str(&caption.text);
        output.push_str("\n\n");
    }

    output
}

/// Formats seconds as an SRT timestamp (`HH:MM:SS,mmm`).
pub fn format_srt_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let secs = total_secs % 60;
    let total_mins = total_secs / 60;
    let mins = total_mins % 60;
    let hours = total_mins / 60;

    format!("{:02}:{:02}:{:02},{:03}", hours, mins, secs, ms)
}
