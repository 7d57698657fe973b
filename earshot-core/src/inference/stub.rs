//! `StubTransducer`: deterministic, file-free backend.
//!
//! Used in tests and by the CLI until a real network backend is plugged in.
//! It is a transducer in shape only:
//!
//! * the encoder averages the log-mel energy of every `subsampling_factor`
//!   frames of the consumed part of the window;
//! * the joiner emits blank for quiet encoder frames and otherwise a token
//!   chosen by energy bucket;
//! * the decoder output is the last context token.
//!
//! Quiet input therefore decodes to trailing blanks, and any loud input
//! decodes to a steady run of tokens, which is all the session protocol needs.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Slice};
use tracing::{debug, info};

use super::{ModelMeta, TransducerModel};
use crate::engine::config::ModelConfig;
use crate::error::{EarshotError, Result};
use crate::tokens::{SymbolTable, TokenId};

/// Mean log energy above which an encoder frame counts as voiced.
pub const VOICED_THRESHOLD: f32 = -5.0;

/// Energy span that maps onto one token id.
const BUCKET_WIDTH: f32 = 2.0;

const EMIT_LOGIT: f32 = 10.0;

/// Vocabulary size of `StubTransducer::default()`.
pub const DEFAULT_VOCAB_SIZE: usize = 500;

/// Encoder state: how many encoder frames this stream has produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StubState {
    pub frames: u64,
}

#[derive(Debug, Clone)]
pub struct StubTransducer {
    meta: ModelMeta,
}

impl StubTransducer {
    pub fn new(vocab_size: usize) -> Self {
        Self::with_meta(ModelMeta {
            encoder_out_dim: 1,
            joiner_encoder_dim: 1,
            decoder_out_dim: 1,
            joiner_decoder_dim: 1,
            vocab_size,
            window_size: 12,
            window_stride: 8,
            ..ModelMeta::default()
        })
    }

    /// Override the reported geometry, e.g. to provoke a mismatch.
    pub fn with_meta(meta: ModelMeta) -> Self {
        Self { meta }
    }

    fn energy_token(&self, energy: f32) -> TokenId {
        if energy <= VOICED_THRESHOLD {
            return self.meta.blank_id;
        }
        let bucket = ((energy - VOICED_THRESHOLD) / BUCKET_WIDTH) as usize;
        let non_blank = self.meta.vocab_size.saturating_sub(1).max(1);
        let id = 1 + (bucket % non_blank) as TokenId;
        if id == self.meta.blank_id {
            // Blank is not at 0: shift onto the next id.
            (id + 1) % self.meta.vocab_size as TokenId
        } else {
            id
        }
    }
}

impl Default for StubTransducer {
    fn default() -> Self {
        Self::new(DEFAULT_VOCAB_SIZE)
    }
}

impl TransducerModel for StubTransducer {
    type State = StubState;

    fn load(_config: &ModelConfig, symbols: &SymbolTable) -> Result<Self> {
        let vocab_size = symbols.len();
        if vocab_size < 2 {
            return Err(EarshotError::ModelInit(format!(
                "vocabulary of {vocab_size} leaves no room for non-blank tokens"
            )));
        }
        info!(vocab_size, "stub transducer loaded");
        Ok(Self::new(vocab_size))
    }

    fn meta(&self) -> &ModelMeta {
        &self.meta
    }

    fn initial_state(&self) -> Self::State {
        StubState::default()
    }

    fn run_encoder(
        &self,
        features: ArrayView2<'_, f32>,
        state: &Self::State,
    ) -> Result<(Array2<f32>, Self::State)> {
        let m = &self.meta;
        if features.nrows() < m.window_size || features.ncols() != m.feature_dim {
            return Err(EarshotError::Inference(format!(
                "encoder expects ({}, {}) features, got {:?}",
                m.window_size,
                m.feature_dim,
                features.shape()
            )));
        }

        let sub = m.subsampling_factor.max(1);
        let t_out = m.encoder_frames_per_window();
        let mut out = Array2::<f32>::zeros((t_out, m.encoder_out_dim));
        for t in 0..t_out {
            let rows = features.slice_axis(Axis(0), Slice::from(t * sub..(t + 1) * sub));
            out[[t, 0]] = rows.mean().unwrap_or(f32::NEG_INFINITY);
        }

        let next = StubState {
            frames: state.frames + t_out as u64,
        };
        debug!(frames = next.frames, "stub encoder step");
        Ok((out, next))
    }

    fn run_decoder(&self, context: &[TokenId]) -> Result<Array1<f32>> {
        let last = context.last().copied().unwrap_or(self.meta.blank_id);
        Ok(Array1::from_elem(self.meta.decoder_out_dim, last as f32))
    }

    fn run_joiner(
        &self,
        encoder_out: ArrayView1<'_, f32>,
        decoder_out: ArrayView1<'_, f32>,
    ) -> Result<Array1<f32>> {
        if encoder_out.len() != self.meta.joiner_encoder_dim
            || decoder_out.len() != self.meta.joiner_decoder_dim
        {
            return Err(EarshotError::Inference(format!(
                "joiner expects ({}, {}) inputs, got ({}, {})",
                self.meta.joiner_encoder_dim,
                self.meta.joiner_decoder_dim,
                encoder_out.len(),
                decoder_out.len()
            )));
        }
        let mut logits = Array1::<f32>::zeros(self.meta.vocab_size);
        let token = self.energy_token(encoder_out[0]);
        logits[token as usize] = EMIT_LOGIT;
        Ok(logits)
    }
}
