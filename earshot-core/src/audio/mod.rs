//! Audio edge: sample-rate conversion, WAV input and microphone capture.
//!
//! Everything past this module works on mono `f32` samples in `[-1.0, 1.0]`.
//! Integer PCM is normalised with `sample / 32768`.

#[cfg(feature = "audio-cpal")]
pub mod capture;
pub mod resample;
pub mod wave;

#[cfg(feature = "audio-cpal")]
pub use capture::{create_audio_ring, AudioCapture, AudioConsumer, AudioProducer};
pub use resample::{resample, RateConverter};
pub use wave::read_wave;

/// Scale factor for signed 16-bit PCM.
pub const I16_SCALE: f32 = 32768.0;

/// Normalise signed 16-bit PCM into `f32` samples.
pub fn pcm_i16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / I16_SCALE).collect()
}

/// Average interleaved frames down to one channel.
pub fn downmix(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    out.clear();
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
    );
}
