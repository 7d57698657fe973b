//! Transducer network abstraction.
//!
//! The `TransducerModel` trait decouples the session engine from any specific
//! inference backend. A model is three networks:
//!
//! ```text
//! features (window, feature_dim) ─▶ encoder ─▶ (T, encoder_out_dim) ─┐
//!                                                                     ├─▶ joiner ─▶ logits (vocab)
//! last context_size tokens ───────▶ decoder ─▶ (decoder_out_dim) ─────┘
//! ```
//!
//! All methods take `&self`: a loaded model is read-only and shared by every
//! stream of a recognizer. Per-stream recurrent state lives in the
//! associated `State` type, owned by the stream and passed in explicitly.

pub mod stub;

pub use stub::StubTransducer;

use std::fmt;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::engine::config::ModelConfig;
use crate::error::Result;
use crate::tokens::{SymbolTable, TokenId};

/// Shapes and streaming geometry a model reports about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMeta {
    pub feature_dim: usize,
    pub encoder_out_dim: usize,
    pub decoder_out_dim: usize,
    pub joiner_encoder_dim: usize,
    pub joiner_decoder_dim: usize,
    pub vocab_size: usize,
    /// Tokens the decoder conditions on.
    pub context_size: usize,
    pub blank_id: TokenId,
    /// Feature frames the encoder reads per call.
    pub window_size: usize,
    /// Feature frames consumed per call; the rest is lookahead.
    pub window_stride: usize,
    /// Feature frames per encoder output frame.
    pub subsampling_factor: usize,
}

impl Default for ModelMeta {
    fn default() -> Self {
        Self {
            feature_dim: 80,
            encoder_out_dim: 512,
            decoder_out_dim: 512,
            joiner_encoder_dim: 512,
            joiner_decoder_dim: 512,
            vocab_size: 500,
            context_size: 2,
            blank_id: 0,
            window_size: 39, // 32 + 7 frames right context
            window_stride: 32,
            subsampling_factor: 4,
        }
    }
}

impl ModelMeta {
    /// Encoder frames produced per call.
    pub fn encoder_frames_per_window(&self) -> usize {
        self.window_stride / self.subsampling_factor.max(1)
    }
}

/// Contract for transducer inference backends.
pub trait TransducerModel: Send + Sync + 'static {
    /// Encoder recurrent state carried between windows of one stream.
    type State: Clone + Send + fmt::Debug;

    /// Load network artifacts. `symbols` is the already parsed token table.
    ///
    /// # Errors
    /// `ModelInit` if files are missing or corrupt.
    fn load(config: &ModelConfig, symbols: &SymbolTable) -> Result<Self>
    where
        Self: Sized;

    fn meta(&self) -> &ModelMeta;

    /// State for a new or reset stream.
    fn initial_state(&self) -> Self::State;

    /// Run one `(window_size, feature_dim)` window. Returns
    /// `(T, encoder_out_dim)` output and the next state.
    fn run_encoder(
        &self,
        features: ArrayView2<'_, f32>,
        state: &Self::State,
    ) -> Result<(Array2<f32>, Self::State)>;

    /// Decoder output for a `context_size` token context.
    fn run_decoder(&self, context: &[TokenId]) -> Result<Array1<f32>>;

    /// Unnormalised logits over the vocabulary.
    fn run_joiner(
        &self,
        encoder_out: ArrayView1<'_, f32>,
        decoder_out: ArrayView1<'_, f32>,
    ) -> Result<Array1<f32>>;
}
