//! Renderers for the transcript export formats.
//!
//! All three formats consume speaker-annotated segments. Caption text
//! carries a `[speaker]` prefix whenever the label is non-empty, so the
//! `Unknown` sentinel renders like any other speaker.

use crate::reconcile::AnnotatedSegment;

/// Normalizes transcript text by collapsing all whitespace runs to one space.
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Converts annotated segments to a plain-text transcript.
///
/// Segment texts join with a blank line between them, untrimmed and without
/// a trailing newline. Speaker labels do not appear in this format.
pub fn segments_to_text(segments: &[AnnotatedSegment]) -> String {
    segments
        .iter()
        .map(|seg| seg.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Converts annotated segments to SRT subtitle text.
///
/// Every segment renders as a 1-indexed block, empty-text segments included,
/// with a blank line after each block.
pub fn segments_to_srt(segments: &[AnnotatedSegment]) -> String {
    if segments.is_empty() {
        return String::new();
    }
    let mut lines = Vec::new();
    for (idx, seg) in segments.iter().enumerate() {
        lines.push((idx + 1).to_string());
        lines.push(format!(
            "{} --> {}",
            srt_timestamp(seg.start),
            srt_timestamp(seg.end)
        ));
        lines.push(caption_line(seg));
        lines.push(String::new());
    }

    format!("{}\n", lines.join("\n"))
}

/// Converts annotated segments to WebVTT subtitle text.
///
/// Blocks match the SRT layout minus the index line, with `.` before the
/// millisecond field.
pub fn segments_to_vtt(segments: &[AnnotatedSegment]) -> String {
    let mut lines = vec!["WEBVTT".to_string(), String::new()];
    for seg in segments {
        lines.push(format!(
            "{} --> {}",
            vtt_timestamp(seg.start),
            vtt_timestamp(seg.end)
        ));
        lines.push(caption_line(seg));
        lines.push(String::new());
    }

    format!("{}\n", lines.join("\n"))
}

fn caption_line(seg: &AnnotatedSegment) -> String {
    let text = seg.text.trim();
    if seg.speaker.is_empty() {
        text.to_string()
    } else {
        format!("[{}] {}", seg.speaker, text)
    }
}

fn srt_timestamp(seconds: f64) -> String {
    let ms = seconds_to_millis(seconds);
    let h = ms / 3_600_000;
    let m = (ms % 3_600_000) / 60_000;
    let s = (ms % 60_000) / 1_000;
    let frac = ms % 1_000;
    format!("{h:02}:{m:02}:{s:02},{frac:03}")
}

fn vtt_timestamp(seconds: f64) -> String {
    let ms = seconds_to_millis(seconds);
    let h = ms / 3_600_000;
    let m = (ms % 3_600_000) / 60_000;
    let s = (ms % 60_000) / 1_000;
    let frac = ms % 1_000;
    format!("{h:02}:{m:02}:{s:02}.{frac:03}")
}

fn seconds_to_millis(seconds: f64) -> u64 {
    if seconds <= 0.0 {
        return 0;
    }
    (seconds * 1000.0).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotated(start: f64, end: f64, text: &str, speaker: &str) -> AnnotatedSegment {
        AnnotatedSegment {
            start,
            end,
            text: text.to_string(),
            speaker: speaker.to_string(),
        }
    }

    #[test]
    fn normalize_collapses_spaces() {
        assert_eq!(
            normalize_text("  hello   world\nagain"),
            "hello world again"
        );
    }

    #[test]
    fn srt_timestamp_uses_comma_millis() {
        assert_eq!(srt_timestamp(0.0), "00:00:00,000");
        assert_eq!(srt_timestamp(3661.234), "01:01:01,234");
    }

    #[test]
    fn vtt_timestamp_uses_period_millis() {
        assert_eq!(vtt_timestamp(3661.234), "01:01:01.234");
    }

    #[test]
    fn timestamp_rounding_carries_into_seconds() {
        assert_eq!(srt_timestamp(59.9995), "00:01:00,000");
    }

    #[test]
    fn negative_seconds_clamp_to_zero() {
        assert_eq!(srt_timestamp(-3.2), "00:00:00,000");
    }

    #[test]
    fn text_joins_segments_with_blank_line() {
        let segments = vec![
            annotated(0.0, 1.0, "hello", "SPEAKER_00"),
            annotated(1.0, 2.0, " world ", "Unknown"),
        ];
        assert_eq!(segments_to_text(&segments), "hello\n\n world ");
        assert_eq!(segments_to_text(&[]), "");
    }

    #[test]
    fn srt_renders_numbered_blocks_with_speaker_prefix() {
        let segments = vec![
            annotated(0.0, 1.5, " hello ", "SPEAKER_00"),
            annotated(1.5, 3.0, "world", ""),
        ];
        let expected = "1\n00:00:00,000 --> 00:00:01,500\n[SPEAKER_00] hello\n\n\
                        2\n00:00:01,500 --> 00:00:03,000\nworld\n\n";
        assert_eq!(segments_to_srt(&segments), expected);
    }

    #[test]
    fn srt_renders_unknown_speaker_label() {
        let segments = vec![annotated(0.0, 1.0, "hi", "Unknown")];
        let out = segments_to_srt(&segments);
        assert!(out.contains("[Unknown] hi"));
    }

    #[test]
    fn srt_keeps_empty_text_segments() {
        let segments = vec![
            annotated(0.0, 1.0, "spoken", "SPEAKER_00"),
            annotated(1.0, 2.0, "", ""),
        ];
        let out = segments_to_srt(&segments);
        assert_eq!(out.matches(" --> ").count(), 2);
        assert!(out.contains("\n2\n"));
    }

    #[test]
    fn srt_of_no_segments_is_empty() {
        assert_eq!(segments_to_srt(&[]), "");
    }

    #[test]
    fn vtt_has_header_and_no_index_lines() {
        let segments = vec![annotated(0.0, 1.5, "hi", "Unknown")];
        let expected = "WEBVTT\n\n00:00:00.000 --> 00:00:01.500\n[Unknown] hi\n\n";
        assert_eq!(segments_to_vtt(&segments), expected);
    }

    #[test]
    fn vtt_of_no_segments_is_header_only() {
        assert_eq!(segments_to_vtt(&[]), "WEBVTT\n\n");
    }
}
