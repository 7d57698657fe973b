//! Sample-rate conversion using a rubato `FastFixedIn` resampler.
//!
//! ## Design
//!
//! Callers push audio at whatever rate their source produces (device capture is
//! commonly 44.1 or 48 kHz). The feature extractor needs the model rate,
//! usually 16 kHz. `RateConverter` bridges that gap for a stream: it keeps one
//! rubato session alive across pushes, so live chunk boundaries never reach
//! the filter.
//!
//! When source rate == target rate the converter is a zero-copy passthrough
//! and no rubato session is created at all.
//!
//! Input accumulates until a full `CHUNK_SIZE` block is available. The first
//! `output_delay` output samples are filter warm-up and are dropped, and
//! `flush` drains the held remainder plus the filter tail, so everything a
//! converter returns over its life holds `round(n * to / from)` samples.
//!
//! ## Usage
//!
//! ```ignore
//! let mut rc = RateConverter::new(48_000, 16_000)?;
//! let head = rc.process(&raw_samples)?; // Cow<[f32]> at 16 kHz, may be empty
//! let tail = rc.flush()?;               // at end of input
//!
//! let out = resample(&whole_file, 44_100, 16_000)?; // one-shot
//! ```

use std::borrow::Cow;

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{info, trace};

use crate::error::{EarshotError, Result};

/// Input frame count per rubato call.
const CHUNK_SIZE: usize = 1024;

/// Upper bound on zero blocks fed while flushing the filter tail.
const MAX_FLUSH_BLOCKS: usize = 8;

/// Number of output samples that keeps the signal duration within half an
/// output sample period.
pub fn output_len(input_len: usize, from_rate: u32, to_rate: u32) -> usize {
    if from_rate == 0 {
        return 0;
    }
    let n = input_len as u64 * to_rate as u64 + from_rate as u64 / 2;
    (n / from_rate as u64) as usize
}

/// Converts mono f32 audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` when source rate == target rate (passthrough mode).
    resampler: Option<FastFixedIn<f32>>,
    from_rate: u32,
    to_rate: u32,
    /// Holds a partial input block between calls.
    input_buf: Vec<f32>,
    /// Pre-allocated output buffer: `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
    /// Warm-up samples still to drop from the front of the output.
    delay_left: usize,
    /// Input samples accepted since creation or the last flush.
    consumed: usize,
    /// Output samples returned since creation or the last flush.
    emitted: usize,
}

impl RateConverter {
    /// # Errors
    /// `InvalidSampleRate` when either rate is 0, `Resample` if rubato fails
    /// to initialise.
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self> {
        if from_rate == 0 {
            return Err(EarshotError::InvalidSampleRate(from_rate));
        }
        if to_rate == 0 {
            return Err(EarshotError::InvalidSampleRate(to_rate));
        }

        let mut converter = Self {
            resampler: None,
            from_rate,
            to_rate,
            input_buf: Vec::new(),
            output_buf: Vec::new(),
            delay_left: 0,
            consumed: 0,
            emitted: 0,
        };
        if from_rate == to_rate {
            return Ok(converter);
        }

        let resampler = FastFixedIn::<f32>::new(
            to_rate as f64 / from_rate as f64,
            1.0, // fixed ratio, no dynamic adjustment
            PolynomialDegree::Cubic,
            CHUNK_SIZE,
            1, // mono
        )
        .map_err(|e| EarshotError::Resample(format!("init: {e}")))?;

        converter.output_buf = vec![vec![0f32; resampler.output_frames_max()]; 1];
        converter.delay_left = resampler.output_delay();
        converter.resampler = Some(resampler);
        info!(from_rate, to_rate, "resampling enabled");
        Ok(converter)
    }

    pub fn from_rate(&self) -> u32 {
        self.from_rate
    }

    /// Returns `true` when no resampling occurs.
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }

    /// Convert the next run of input. Output may be empty while a partial
    /// block is held back.
    ///
    /// # Errors
    /// `Resample` if rubato fails.
    pub fn process<'a>(&mut self, samples: &'a [f32]) -> Result<Cow<'a, [f32]>> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(Cow::Borrowed(samples));
        };

        self.input_buf.extend_from_slice(samples);
        self.consumed += samples.len();

        let mut out = Vec::new();
        let mut offset = 0;
        while self.input_buf.len() - offset >= CHUNK_SIZE {
            let block = &self.input_buf[offset..offset + CHUNK_SIZE];
            let (_, produced) = resampler
                .process_into_buffer(&[block], &mut self.output_buf, None)
                .map_err(|e| EarshotError::Resample(e.to_string()))?;
            take_output(&self.output_buf[0][..produced], &mut self.delay_left, &mut out);
            offset += CHUNK_SIZE;
        }
        self.input_buf.drain(..offset);
        self.emitted += out.len();

        trace!(
            input = samples.len(),
            output = out.len(),
            held = self.input_buf.len(),
            "resampled chunk"
        );
        Ok(Cow::Owned(out))
    }

    /// Drain the held input and the filter tail, then rewind so the converter
    /// can start a fresh signal.
    ///
    /// # Errors
    /// `Resample` if rubato fails.
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(Vec::new());
        };

        let owed = output_len(self.consumed, self.from_rate, self.to_rate)
            .saturating_sub(self.emitted);
        let mut out = Vec::with_capacity(owed + self.output_buf[0].len());

        if !self.input_buf.is_empty() {
            let (_, produced) = resampler
                .process_partial_into_buffer(
                    Some(&[self.input_buf.as_slice()][..]),
                    &mut self.output_buf,
                    None,
                )
                .map_err(|e| EarshotError::Resample(e.to_string()))?;
            take_output(&self.output_buf[0][..produced], &mut self.delay_left, &mut out);
        }

        // Push zeros through the filter until the delayed tail has come out.
        let silence = vec![0.0f32; CHUNK_SIZE];
        for _ in 0..MAX_FLUSH_BLOCKS {
            if out.len() >= owed {
                break;
            }
            let (_, produced) = resampler
                .process_into_buffer(&[silence.as_slice()], &mut self.output_buf, None)
                .map_err(|e| EarshotError::Resample(e.to_string()))?;
            take_output(&self.output_buf[0][..produced], &mut self.delay_left, &mut out);
        }
        out.resize(owed, 0.0);

        resampler.reset();
        self.delay_left = resampler.output_delay();
        self.input_buf.clear();
        self.consumed = 0;
        self.emitted = 0;
        Ok(out)
    }
}

/// Append `block` to `out`, dropping whatever warm-up delay is still owed.
fn take_output(block: &[f32], delay_left: &mut usize, out: &mut Vec<f32>) {
    let skip = (*delay_left).min(block.len());
    *delay_left -= skip;
    out.extend_from_slice(&block[skip..]);
}

/// Convert a complete mono buffer from `from_rate` to `to_rate`.
///
/// # Errors
/// Returns `EarshotError::InvalidSampleRate` when either rate is 0 and
/// `EarshotError::Resample` if rubato fails.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Cow<'_, [f32]>> {
    let mut converter = RateConverter::new(from_rate, to_rate)?;
    if converter.is_passthrough() {
        return Ok(Cow::Borrowed(samples));
    }
    let mut out = converter.process(samples)?.into_owned();
    out.extend(converter.flush()?);
    Ok(Cow::Owned(out))
}
