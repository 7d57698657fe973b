//! Log-mel filterbank features.
//!
//! ## Design
//!
//! Per frame (25 ms window, 10 ms shift):
//!
//! ```text
//! samples ─▶ remove DC ─▶ pre-emphasis 0.97 ─▶ Hann ─▶ |FFT|² ─▶ mel bank ─▶ ln
//! ```
//!
//! The mel bank uses the HTK scale from 20 Hz to Nyquist. Energies are
//! floored at `f32::EPSILON` before the log, so pure silence maps to a
//! constant of about -15.9 in every bin.
//!
//! A frame is only emitted once all of its samples have arrived. The samples
//! that overlap the next frame are retained between calls.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use tracing::debug;

use super::{FeatureExtractor, FRAME_LENGTH_SECS, FRAME_SHIFT_SECS};
use crate::buffering::FeatureQueue;
use crate::engine::config::FeatureConfig;

const PREEMPHASIS: f32 = 0.97;
const LOW_FREQ_HZ: f32 = 20.0;

/// Streaming log-mel filterbank.
pub struct FbankExtractor {
    sample_rate: u32,
    num_bins: usize,
    frame_len: usize,
    frame_shift: usize,
    fft_size: usize,
    window: Vec<f32>,
    /// `num_bins` rows over `fft_size / 2 + 1` power bins.
    mel_filters: Vec<Vec<f32>>,
    fft: Arc<dyn Fft<f32>>,
    /// Samples from the start of the next frame onwards.
    pending: Vec<f32>,
    emitted_any: bool,
    finished: bool,
    fft_buf: Vec<Complex<f32>>,
    frame_buf: Vec<f32>,
    out_buf: Vec<f32>,
}

impl std::fmt::Debug for FbankExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FbankExtractor")
            .field("sample_rate", &self.sample_rate)
            .field("num_bins", &self.num_bins)
            .field("frame_len", &self.frame_len)
            .field("frame_shift", &self.frame_shift)
            .finish_non_exhaustive()
    }
}

impl FbankExtractor {
    pub fn new(config: &FeatureConfig) -> Self {
        let sample_rate = config.sample_rate;
        let frame_len = ((sample_rate as f32 * FRAME_LENGTH_SECS).round() as usize).max(1);
        let frame_shift = ((sample_rate as f32 * FRAME_SHIFT_SECS).round() as usize).max(1);
        let fft_size = frame_len.next_power_of_two();
        let nyquist = sample_rate as f32 / 2.0;

        debug!(
            sample_rate,
            bins = config.feature_dim,
            frame_len,
            frame_shift,
            fft_size,
            "fbank extractor created"
        );

        Self {
            sample_rate,
            num_bins: config.feature_dim,
            frame_len,
            frame_shift,
            fft_size,
            window: build_hann_window(frame_len),
            mel_filters: build_mel_filters(
                fft_size,
                sample_rate,
                config.feature_dim,
                LOW_FREQ_HZ,
                nyquist,
            ),
            fft: FftPlanner::<f32>::new().plan_fft_forward(fft_size),
            pending: Vec::new(),
            emitted_any: false,
            finished: false,
            fft_buf: vec![Complex::new(0.0, 0.0); fft_size],
            frame_buf: vec![0.0; frame_len],
            out_buf: vec![0.0; config.feature_dim],
        }
    }

    /// Compute one frame from `pending[..frame_len]` into `out_buf`.
    fn compute_frame(&mut self) {
        self.frame_buf.copy_from_slice(&self.pending[..self.frame_len]);

        let mean = self.frame_buf.iter().sum::<f32>() / self.frame_len as f32;
        for s in self.frame_buf.iter_mut() {
            *s -= mean;
        }
        for i in (1..self.frame_len).rev() {
            self.frame_buf[i] -= PREEMPHASIS * self.frame_buf[i - 1];
        }
        self.frame_buf[0] -= PREEMPHASIS * self.frame_buf[0];

        for v in self.fft_buf.iter_mut() {
            *v = Complex::new(0.0, 0.0);
        }
        for (i, (&s, &w)) in self.frame_buf.iter().zip(&self.window).enumerate() {
            self.fft_buf[i] = Complex::new(s * w, 0.0);
        }
        self.fft.process(&mut self.fft_buf);

        for (bin, filter) in self.out_buf.iter_mut().zip(&self.mel_filters) {
            let energy: f32 = filter
                .iter()
                .zip(&self.fft_buf)
                .map(|(w, c)| w * c.norm_sqr())
                .sum();
            *bin = energy.max(f32::EPSILON).ln();
        }
    }

    fn emit_ready_frames(&mut self, out: &mut FeatureQueue) {
        while self.pending.len() >= self.frame_len {
            self.compute_frame();
            out.push_frame(&self.out_buf);
            self.pending.drain(..self.frame_shift);
            self.emitted_any = true;
        }
    }
}

impl FeatureExtractor for FbankExtractor {
    fn dim(&self) -> usize {
        self.num_bins
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn accept_waveform(&mut self, samples: &[f32], out: &mut FeatureQueue) {
        if self.finished {
            return;
        }
        self.pending.extend_from_slice(samples);
        self.emit_ready_frames(out);
    }

    fn input_finished(&mut self, out: &mut FeatureQueue) {
        if self.finished {
            return;
        }
        self.finished = true;

        // Samples already covered by the last emitted frame do not count.
        let overlap = if self.emitted_any {
            self.frame_len - self.frame_shift.min(self.frame_len)
        } else {
            0
        };
        if self.pending.len() > overlap {
            self.pending.resize(self.frame_len, 0.0);
            self.compute_frame();
            out.push_frame(&self.out_buf);
        }
        self.pending.clear();
    }
}

// ── Filterbank construction ─────────────────────────────────────────────────

fn build_hann_window(n: usize) -> Vec<f32> {
    use std::f32::consts::PI;
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / n as f32).cos()))
        .collect()
}

fn hz_to_mel(hz: f32) -> f32 {
    1127.0 * (1.0 + hz / 700.0).ln()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * ((mel / 1127.0).exp() - 1.0)
}

fn build_mel_filters(
    fft_size: usize,
    sr: u32,
    n_mels: usize,
    fmin: f32,
    fmax: f32,
) -> Vec<Vec<f32>> {
    let n_freqs = fft_size / 2 + 1;
    let mel_min = hz_to_mel(fmin);
    let mel_max = hz_to_mel(fmax);

    let mel_pts: Vec<f32> = (0..=(n_mels + 1))
        .map(|i| mel_min + (mel_max - mel_min) * i as f32 / (n_mels + 1) as f32)
        .collect();

    let mut filters = vec![vec![0f32; n_freqs]; n_mels];
    for (m, filter) in filters.iter_mut().enumerate() {
        let (lower, center, upper) = (mel_pts[m], mel_pts[m + 1], mel_pts[m + 2]);
        for (k, w) in filter.iter_mut().enumerate() {
            let freq = k as f32 * sr as f32 / fft_size as f32;
            let mel = hz_to_mel(freq);
            *w = if mel > lower && mel <= center {
                (mel - lower) / (center - lower).max(1e-10)
            } else if mel > center && mel < upper {
                (upper - mel) / (upper - center).max(1e-10)
            } else {
                0.0
            };
        }
    }
    filters
}
