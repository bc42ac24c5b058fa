//! Reconciles transcript segments with diarization turns.
//!
//! Transcription and diarization segment the same audio independently, so
//! their time spans rarely line up. This module labels every transcript
//! segment with the speaker whose diarization turn overlaps it the longest,
//! producing the annotated segments the export formats and API responses
//! are built from.

use serde::{Deserialize, Serialize};

/// Speaker label used when no diarization turn overlaps a segment.
pub const UNKNOWN_SPEAKER: &str = "Unknown";

/// A timestamped span of transcribed text.
#[derive(Debug, Clone)]
pub struct TranscriptSegment {
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds.
    pub end: f64,
    /// Transcribed text for this span.
    pub text: String,
}

/// A timestamped span attributed to one speaker by diarization.
///
/// Speaker labels are opaque strings; the engine emits `SPEAKER_00` style
/// labels but nothing here depends on that shape.
#[derive(Debug, Clone)]
pub struct DiarizationTurn {
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds.
    pub end: f64,
    /// Label of the speaker talking during this span.
    pub speaker: String,
}

/// A transcript segment annotated with a speaker label.
///
/// This is the wire shape for API responses and export requests. Fields
/// default individually so partial objects sent by clients still render.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotatedSegment {
    /// Start time in seconds.
    #[serde(default)]
    pub start: f64,
    /// End time in seconds.
    #[serde(default)]
    pub end: f64,
    /// Transcribed text for this span.
    #[serde(default)]
    pub text: String,
    /// Assigned speaker label, or [`UNKNOWN_SPEAKER`].
    #[serde(default)]
    pub speaker: String,
}

/// Labels each transcript segment with the speaker of its longest-overlapping
/// diarization turn.
///
/// Overlap between a segment and a turn is the length of their intersection;
/// spans that merely touch at a boundary do not overlap. When several turns
/// overlap a segment equally, the turn listed first wins. Segments no turn
/// overlaps are labeled [`UNKNOWN_SPEAKER`], so an empty turn list labels
/// everything `Unknown`.
///
/// The output has exactly one entry per input segment, in input order.
pub fn assign_speakers(
    segments: &[TranscriptSegment],
    turns: &[DiarizationTurn],
) -> Vec<AnnotatedSegment> {
    segments
        .iter()
        .map(|segment| annotate_segment(segment, turns))
        .collect()
}

fn annotate_segment(segment: &TranscriptSegment, turns: &[DiarizationTurn]) -> AnnotatedSegment {
    // Strictly-greater comparison keeps the first turn on ties.
    let mut best: Option<(f64, &str)> = None;
    for turn in turns {
        let overlap = overlap_duration(segment, turn);
        if overlap <= 0.0 {
            continue;
        }
        if best.map_or(true, |(duration, _)| overlap > duration) {
            best = Some((overlap, turn.speaker.as_str()));
        }
    }
    AnnotatedSegment {
        start: segment.start,
        end: segment.end,
        text: segment.text.clone(),
        speaker: best.map_or_else(|| UNKNOWN_SPEAKER.to_string(), |(_, speaker)| speaker.to_string()),
    }
}

fn overlap_duration(segment: &TranscriptSegment, turn: &DiarizationTurn) -> f64 {
    let overlap = segment.end.min(turn.end) - segment.start.max(turn.start);
    overlap.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(start: f64, end: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            start,
            end,
            text: text.to_string(),
        }
    }

    fn turn(start: f64, end: f64, speaker: &str) -> DiarizationTurn {
        DiarizationTurn {
            start,
            end,
            speaker: speaker.to_string(),
        }
    }

    #[test]
    fn preserves_count_and_order() {
        let segments = vec![
            segment(0.0, 1.0, "one"),
            segment(1.0, 2.0, "two"),
            segment(2.0, 3.0, "three"),
        ];
        let turns = vec![turn(0.0, 3.0, "SPEAKER_00")];

        let annotated = assign_speakers(&segments, &turns);

        assert_eq!(annotated.len(), 3);
        let texts: Vec<&str> = annotated.iter().map(|seg| seg.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
        assert_eq!(annotated[1].start, 1.0);
        assert_eq!(annotated[1].end, 2.0);
    }

    #[test]
    fn empty_turns_label_everything_unknown() {
        let segments = vec![segment(0.0, 1.0, "a"), segment(1.0, 2.0, "b")];

        let annotated = assign_speakers(&segments, &[]);

        assert!(annotated.iter().all(|seg| seg.speaker == UNKNOWN_SPEAKER));
    }

    #[test]
    fn picks_turn_with_longest_overlap() {
        let segments = vec![segment(0.0, 10.0, "hello")];
        let turns = vec![turn(0.0, 4.0, "SPEAKER_00"), turn(3.0, 10.0, "SPEAKER_01")];

        let annotated = assign_speakers(&segments, &turns);

        // 4s of SPEAKER_00 against 7s of SPEAKER_01.
        assert_eq!(annotated[0].speaker, "SPEAKER_01");
    }

    #[test]
    fn equal_overlap_keeps_first_listed_turn() {
        let segments = vec![segment(0.0, 10.0, "hello")];
        let turns = vec![turn(0.0, 6.0, "SPEAKER_00"), turn(4.0, 10.0, "SPEAKER_01")];

        let annotated = assign_speakers(&segments, &turns);

        assert_eq!(annotated[0].speaker, "SPEAKER_00");
    }

    #[test]
    fn boundary_touch_is_not_overlap() {
        let segments = vec![segment(0.0, 5.0, "first"), segment(5.0, 10.0, "second")];
        let turns = vec![turn(5.0, 10.0, "SPEAKER_00")];

        let annotated = assign_speakers(&segments, &turns);

        assert_eq!(annotated[0].speaker, UNKNOWN_SPEAKER);
        assert_eq!(annotated[1].speaker, "SPEAKER_00");
    }

    #[test]
    fn zero_width_segment_gets_unknown() {
        let segments = vec![segment(5.0, 5.0, "blip")];
        let turns = vec![turn(0.0, 10.0, "SPEAKER_00")];

        let annotated = assign_speakers(&segments, &turns);

        assert_eq!(annotated[0].speaker, UNKNOWN_SPEAKER);
    }

    #[test]
    fn inverted_turn_never_wins() {
        let segments = vec![segment(0.0, 10.0, "hello")];
        let turns = vec![turn(10.0, 2.0, "SPEAKER_00")];

        let annotated = assign_speakers(&segments, &turns);

        assert_eq!(annotated[0].speaker, UNKNOWN_SPEAKER);
    }

    #[test]
    fn segments_resolve_independently() {
        let segments = vec![segment(0.0, 3.0, "hi"), segment(5.0, 9.0, "there")];
        let turns = vec![turn(0.0, 4.0, "SPEAKER_00"), turn(4.0, 10.0, "SPEAKER_01")];

        let annotated = assign_speakers(&segments, &turns);

        assert_eq!(annotated[0].speaker, "SPEAKER_00");
        assert_eq!(annotated[1].speaker, "SPEAKER_01");
    }

    #[test]
    fn turn_order_does_not_reorder_output() {
        let segments = vec![segment(0.0, 2.0, "a"), segment(2.0, 4.0, "b")];
        let turns = vec![turn(2.0, 4.0, "SPEAKER_01"), turn(0.0, 2.0, "SPEAKER_00")];

        let annotated = assign_speakers(&segments, &turns);

        assert_eq!(annotated[0].text, "a");
        assert_eq!(annotated[0].speaker, "SPEAKER_00");
        assert_eq!(annotated[1].text, "b");
        assert_eq!(annotated[1].speaker, "SPEAKER_01");
    }
}
