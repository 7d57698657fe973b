//! Result types handed to callers.
//!
//! Both serialize as camelCase JSON so the CLI can print them directly with
//! `--json`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tokens::TokenId;

// ---------------------------------------------------------------------------
// Recognition snapshot
// ---------------------------------------------------------------------------

/// Hypothesis of one stream as of its last decode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionResult {
    pub text: String,
    pub tokens: Vec<TokenId>,
    /// Token pieces, same length as `tokens`.
    pub symbols: Vec<String>,
    /// Start time of each token in seconds from the last reset.
    pub timestamps: Vec<f32>,
}

impl RecognitionResult {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

impl fmt::Display for RecognitionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

// ---------------------------------------------------------------------------
// Live segmentation events
// ---------------------------------------------------------------------------

/// Emitted by the live driver when a segment's text changes or ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentEvent {
    /// Zero-based index of the utterance within the session.
    pub segment: u32,
    pub text: String,
    /// `true` once the segment ended at an endpoint or end of input.
    pub is_final: bool,
}

impl fmt::Display for SegmentEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment, self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognition_result_serializes_with_camel_case() {
        let result = RecognitionResult {
            text: "HELLO".into(),
            tokens: vec![4, 9],
            symbols: vec!["\u{2581}HEL".into(), "LO".into()],
            timestamps: vec![0.32, 0.48],
        };

        let json = serde_json::to_value(&result).expect("serialize result");
        assert_eq!(json["text"], "HELLO");
        assert_eq!(json["tokens"][1], 9);
        assert_eq!(json["symbols"][0], "\u{2581}HEL");
        let ts = json["timestamps"][1].as_f64().expect("timestamp is a number");
        assert!((ts - 0.48).abs() < 1e-5);

        let round_trip: RecognitionResult =
            serde_json::from_value(json).expect("deserialize result");
        assert_eq!(round_trip.tokens, result.tokens);
        assert_eq!(round_trip.to_string(), "HELLO");
    }

    #[test]
    fn segment_event_uses_is_final_key() {
        let event = SegmentEvent {
            segment: 3,
            text: "GOOD MORNING".into(),
            is_final: true,
        };
        let json = serde_json::to_value(&event).expect("serialize segment");
        assert_eq!(json["segment"], 3);
        assert_eq!(json["isFinal"], true);
        assert_eq!(event.to_string(), "3:GOOD MORNING");
    }

    #[test]
    fn empty_result_is_empty() {
        assert!(RecognitionResult::default().is_empty());
    }
}
