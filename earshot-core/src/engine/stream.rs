//! `Stream`: the mutable state of one utterance session.
//!
//! A stream is created by [`Recognizer::create_stream`] and borrows its
//! recognizer for its whole life, so the model cannot go away underneath it.
//! Audio goes in through [`Stream::accept_waveform`]; everything else
//! (readiness, decoding, endpointing, reset, results) is asked of the
//! recognizer, which holds the policy.
//!
//! ```text
//! accept_waveform ─▶ resample ─▶ FeatureExtractor ─▶ FeatureQueue ─▶ Recognizer::decode
//! ```

use std::fmt;

use tracing::{debug, error, warn};

use super::Recognizer;
use crate::audio::RateConverter;
use crate::buffering::FeatureQueue;
use crate::error::Result;
use crate::features::FeatureExtractor;
use crate::inference::TransducerModel;
use crate::search::DecoderResult;

pub struct Stream<'r, M: TransducerModel> {
    pub(super) recognizer: &'r Recognizer<M>,
    extractor: Box<dyn FeatureExtractor>,
    pub(super) features: FeatureQueue,
    pub(super) encoder_state: M::State,
    pub(super) result: DecoderResult,
    /// Leading tokens of `result.tokens` no later decode can revise.
    pub(super) committed: usize,
    input_finished: bool,
    /// Converter for the rate of the most recent push.
    converter: Option<RateConverter>,
}

impl<'r, M: TransducerModel> Stream<'r, M> {
    pub(super) fn new(
        recognizer: &'r Recognizer<M>,
        extractor: Box<dyn FeatureExtractor>,
        encoder_state: M::State,
        result: DecoderResult,
    ) -> Self {
        let features = FeatureQueue::new(extractor.dim());
        Self {
            recognizer,
            extractor,
            features,
            encoder_state,
            result,
            committed: 0,
            input_finished: false,
            converter: None,
        }
    }

    /// Push mono samples at `sample_rate`. They are resampled to the feature
    /// rate and turned into frames as soon as full analysis windows exist.
    /// One resampler session spans consecutive pushes at the same rate; a
    /// rate change flushes it and starts another.
    ///
    /// Pushing after [`input_finished`](Self::input_finished) is a caller
    /// bug: it panics in debug builds and is ignored otherwise.
    ///
    /// # Errors
    /// `InvalidSampleRate` for a zero rate, `Resample` if conversion fails.
    pub fn accept_waveform(&mut self, sample_rate: u32, samples: &[f32]) -> Result<()> {
        debug_assert!(
            !self.input_finished,
            "accept_waveform called after input_finished"
        );
        if self.input_finished {
            warn!(
                samples = samples.len(),
                "ignoring audio pushed after input_finished"
            );
            return Ok(());
        }

        let before = self.features.num_frames();
        let converter = match self.converter.take() {
            Some(converter) if converter.from_rate() == sample_rate => converter,
            previous => {
                if let Some(mut previous) = previous {
                    warn!(
                        previous = previous.from_rate(),
                        sample_rate, "input sample rate changed mid-stream"
                    );
                    let tail = previous.flush()?;
                    self.extractor.accept_waveform(&tail, &mut self.features);
                }
                RateConverter::new(sample_rate, self.extractor.sample_rate())?
            }
        };
        let converter = self.converter.insert(converter);
        let samples = converter.process(samples)?;
        self.extractor.accept_waveform(&samples, &mut self.features);
        debug!(
            samples = samples.len(),
            new_frames = self.features.num_frames() - before,
            "accepted waveform"
        );
        Ok(())
    }

    /// Mark the end of input and flush the extractor's buffered samples.
    /// Idempotent.
    pub fn input_finished(&mut self) {
        if self.input_finished {
            return;
        }
        self.input_finished = true;
        if let Some(converter) = self.converter.as_mut() {
            match converter.flush() {
                Ok(tail) => self.extractor.accept_waveform(&tail, &mut self.features),
                Err(e) => error!("dropping resampler tail: {e}"),
            }
        }
        self.extractor.input_finished(&mut self.features);
        debug!(queued = self.features.num_frames(), "input finished");
    }

    pub fn is_input_finished(&self) -> bool {
        self.input_finished
    }

    /// Feature frames queued and not yet consumed by decoding.
    pub fn num_queued_frames(&self) -> usize {
        self.features.num_frames()
    }

    /// Feature frames consumed since creation or the last reset.
    pub fn num_processed_frames(&self) -> usize {
        self.features.processed()
    }

    /// Blank encoder frames at the end of the current hypothesis.
    pub fn num_trailing_blanks(&self) -> u32 {
        self.result.num_trailing_blanks
    }

    /// Text of the tokens that later decoding can no longer change.
    pub fn committed_text(&self) -> String {
        let n = self.committed.min(self.result.tokens.len());
        self.recognizer.symbols().detokenize(&self.result.tokens[..n])
    }

    pub fn encoder_state(&self) -> &M::State {
        &self.encoder_state
    }
}

impl<M: TransducerModel> fmt::Debug for Stream<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("queued_frames", &self.features.num_frames())
            .field("processed_frames", &self.features.processed())
            .field("tokens", &self.result.tokens.len())
            .field("committed", &self.committed)
            .field("trailing_blanks", &self.result.num_trailing_blanks)
            .field("input_finished", &self.input_finished)
            .finish_non_exhaustive()
    }
}
