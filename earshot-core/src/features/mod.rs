//! Acoustic feature extraction.
//!
//! The session engine only talks to the [`FeatureExtractor`] trait. Each
//! stream owns its own extractor instance because extractors buffer the
//! samples of a partially filled analysis window between calls.
//!
//! [`FbankExtractor`] is the default log-mel filterbank front end.

pub mod fbank;

pub use fbank::FbankExtractor;

use crate::buffering::FeatureQueue;

/// Feature frames per second of audio. Endpoint timing is derived from it.
pub const FRAMES_PER_SECOND: f32 = 100.0;

/// Feature frame shift in seconds.
pub const FRAME_SHIFT_SECS: f32 = 1.0 / FRAMES_PER_SECOND;

/// Seconds spanned by `frames` feature frames.
pub fn frames_to_secs(frames: usize) -> f32 {
    frames as f32 / FRAMES_PER_SECOND
}

/// Analysis window length in seconds.
pub const FRAME_LENGTH_SECS: f32 = 0.025;

/// Contract for streaming feature front ends.
pub trait FeatureExtractor: Send {
    /// Width of every emitted frame.
    fn dim(&self) -> usize;

    /// Rate the extractor expects its input at (Hz).
    fn sample_rate(&self) -> u32;

    /// Consume samples at `sample_rate()` and append every frame that became
    /// complete to `out`.
    fn accept_waveform(&mut self, samples: &[f32], out: &mut FeatureQueue);

    /// Flush buffered samples, zero-padding a trailing partial window.
    /// Further input after this call is ignored.
    fn input_finished(&mut self, out: &mut FeatureQueue);
}
