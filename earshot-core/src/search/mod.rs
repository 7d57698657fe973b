//! Transducer search over encoder output.
//!
//! A [`Searcher`] turns one encoder output block `(T, encoder_out_dim)` into
//! tokens, updating the stream's [`DecoderResult`] in place. Two strategies
//! exist, selected by [`DecoderConfig`]:
//!
//! * greedy search: one hypothesis, argmax per frame;
//! * modified beam search: at most one token per frame, `num_active_paths`
//!   hypotheses, optional hotword boosting through a [`ContextGraph`].
//!
//! Both track `num_trailing_blanks`, the endpoint detector's silence measure.

pub mod beam;
pub mod greedy;
pub mod hotwords;

use std::collections::BTreeMap;

use ndarray::{Array1, ArrayView2};

pub use hotwords::ContextGraph;

use crate::engine::config::DecoderConfig;
use crate::error::Result;
use crate::inference::TransducerModel;
use crate::tokens::TokenId;

/// One search path.
#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    /// Emitted tokens, blanks excluded.
    pub ys: Vec<TokenId>,
    /// Encoder frame index of each token.
    pub timestamps: Vec<u32>,
    pub log_prob: f64,
    pub num_trailing_blanks: u32,
    /// Hotword graph state.
    pub context_state: hotwords::StateId,
}

impl Hypothesis {
    pub fn empty() -> Self {
        Self {
            ys: Vec::new(),
            timestamps: Vec::new(),
            log_prob: 0.0,
            num_trailing_blanks: 0,
            context_state: hotwords::ROOT,
        }
    }

    /// Length-normalised score. The blank context counts towards the length
    /// so an empty hypothesis never divides by zero.
    pub fn normalized_log_prob(&self, context_size: usize) -> f64 {
        self.log_prob / (self.ys.len() + context_size).max(1) as f64
    }
}

/// Hypotheses keyed by token sequence; equal sequences are merged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hypotheses {
    hyps: BTreeMap<Vec<TokenId>, Hypothesis>,
}

impl Hypotheses {
    pub fn initial() -> Self {
        let mut h = Self::default();
        h.add(Hypothesis::empty());
        h
    }

    pub fn len(&self) -> usize {
        self.hyps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hyps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hypothesis> {
        self.hyps.values()
    }

    /// Insert, or log-add into an existing path with the same tokens.
    pub fn add(&mut self, hyp: Hypothesis) {
        match self.hyps.get_mut(&hyp.ys) {
            Some(existing) => existing.log_prob = log_add(existing.log_prob, hyp.log_prob),
            None => {
                self.hyps.insert(hyp.ys.clone(), hyp);
            }
        }
    }

    /// The `k` best by normalised score. Ties keep token-sequence order.
    pub fn top_k(&self, k: usize, context_size: usize) -> Vec<Hypothesis> {
        let mut all: Vec<&Hypothesis> = self.hyps.values().collect();
        all.sort_by(|a, b| {
            b.normalized_log_prob(context_size)
                .total_cmp(&a.normalized_log_prob(context_size))
        });
        all.into_iter().take(k).cloned().collect()
    }

    pub fn best(&self, context_size: usize) -> Option<&Hypothesis> {
        self.best_by(|h| h.normalized_log_prob(context_size))
    }

    /// Highest-scoring hypothesis under a caller-supplied score. The first
    /// in token-sequence order wins ties.
    pub fn best_by(&self, mut score: impl FnMut(&Hypothesis) -> f64) -> Option<&Hypothesis> {
        let mut best: Option<(&Hypothesis, f64)> = None;
        for h in self.hyps.values() {
            let s = score(h);
            if best.map_or(true, |(_, b)| s > b) {
                best = Some((h, s));
            }
        }
        best.map(|(h, _)| h)
    }

    /// Length of the token prefix every hypothesis agrees on.
    pub fn common_prefix_len(&self) -> usize {
        let mut iter = self.hyps.keys();
        let Some(first) = iter.next() else {
            return 0;
        };
        iter.fold(first.len(), |len, ys| {
            first
                .iter()
                .zip(ys)
                .take(len)
                .take_while(|(a, b)| a == b)
                .count()
        })
    }
}

pub(crate) fn log_add(a: f64, b: f64) -> f64 {
    let (hi, lo) = if a > b { (a, b) } else { (b, a) };
    if lo == f64::NEG_INFINITY {
        return hi;
    }
    hi + (lo - hi).exp().ln_1p()
}

/// Per-stream decoding state.
#[derive(Debug, Clone, Default)]
pub struct DecoderResult {
    /// Tokens of the current best path.
    pub tokens: Vec<TokenId>,
    pub timestamps: Vec<u32>,
    /// Consecutive blank encoder frames at the end of the best path.
    pub num_trailing_blanks: u32,
    /// Encoder frames searched since the last reset.
    pub frame_offset: u32,
    /// Greedy search: decoder output for the current context.
    pub decoder_out: Option<Array1<f32>>,
    /// Beam search: live hypotheses.
    pub hyps: Hypotheses,
}

impl DecoderResult {
    pub fn contains_speech(&self) -> bool {
        !self.tokens.is_empty()
    }
}

/// The last `context_size` tokens of `ys`, left-padded with blanks.
pub fn decoder_context(ys: &[TokenId], context_size: usize, blank: TokenId) -> Vec<TokenId> {
    let pad = context_size.saturating_sub(ys.len());
    let mut ctx = vec![blank; pad];
    ctx.extend_from_slice(&ys[ys.len() - (context_size - pad)..]);
    ctx
}

/// Search strategy bound to its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Searcher {
    Greedy,
    ModifiedBeam { num_active_paths: usize },
}

impl From<DecoderConfig> for Searcher {
    fn from(config: DecoderConfig) -> Self {
        match config {
            DecoderConfig::GreedySearch => Self::Greedy,
            DecoderConfig::ModifiedBeamSearch { num_active_paths } => {
                Self::ModifiedBeam { num_active_paths }
            }
        }
    }
}

impl Searcher {
    /// State for a fresh or freshly reset stream.
    pub fn empty_result(&self) -> DecoderResult {
        match self {
            Self::Greedy => DecoderResult::default(),
            Self::ModifiedBeam { .. } => DecoderResult {
                hyps: Hypotheses::initial(),
                ..DecoderResult::default()
            },
        }
    }

    pub fn search<M: TransducerModel>(
        &self,
        model: &M,
        encoder_out: ArrayView2<'_, f32>,
        result: &mut DecoderResult,
        context_graph: Option<&ContextGraph>,
    ) -> Result<()> {
        match *self {
            Self::Greedy => greedy::search(model, encoder_out, result),
            Self::ModifiedBeam { num_active_paths } => {
                beam::search(model, encoder_out, result, num_active_paths, context_graph)
            }
        }
    }

    /// Tokens no later frame can revise.
    pub fn committed_len(&self, result: &DecoderResult) -> usize {
        match self {
            Self::Greedy => result.tokens.len(),
            Self::ModifiedBeam { .. } => result.hyps.common_prefix_len(),
        }
    }
}

/// Index of the largest value; the lowest index wins ties.
pub(crate) fn argmax(values: &Array1<f32>) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// In-place `x - logsumexp(x)`.
pub(crate) fn log_softmax(values: &mut Array1<f32>) {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let sum: f32 = values.iter().map(|&v| (v - max).exp()).sum();
    let log_sum = max + sum.ln();
    values.mapv_inplace(|v| v - log_sum);
}


#[cfg(test)]
pub(crate) mod testing {
    //! Table-driven transducer for search tests: each encoder frame *is* the
    //! joiner's logit vector, so a test spells out exactly what it wants.

    use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
    use parking_lot::Mutex;

    use crate::engine::config::ModelConfig;
    use crate::error::{EarshotError, Result};
    use crate::inference::{ModelMeta, TransducerModel};
    use crate::tokens::{SymbolTable, TokenId};

    pub struct ScriptedModel {
        meta: ModelMeta,
        decoder_calls: Mutex<Vec<Vec<TokenId>>>,
    }

    impl ScriptedModel {
        pub fn new(vocab_size: usize) -> Self {
            Self {
                // One feature frame per decode, passed through as logits.
                meta: ModelMeta {
                    feature_dim: vocab_size,
                    window_size: 1,
                    window_stride: 1,
                    subsampling_factor: 1,
                    encoder_out_dim: vocab_size,
                    joiner_encoder_dim: vocab_size,
                    decoder_out_dim: 2,
                    joiner_decoder_dim: 2,
                    vocab_size,
                    ..ModelMeta::default()
                },
                decoder_calls: Mutex::new(Vec::new()),
            }
        }

        pub fn decoder_calls(&self) -> Vec<Vec<TokenId>> {
            self.decoder_calls.lock().clone()
        }
    }

    /// One confident one-hot frame per entry.
    pub fn frames(vocab_size: usize, tokens: &[TokenId]) -> Array2<f32> {
        let mut out = Array2::zeros((tokens.len(), vocab_size));
        for (t, &tok) in tokens.iter().enumerate() {
            out[[t, tok as usize]] = 10.0;
        }
        out
    }

    impl TransducerModel for ScriptedModel {
        type State = ();

        fn load(_config: &ModelConfig, _symbols: &SymbolTable) -> Result<Self> {
            Err(EarshotError::ModelInit("scripted model has no files".into()))
        }

        fn meta(&self) -> &ModelMeta {
            &self.meta
        }

        fn initial_state(&self) -> Self::State {}

        fn run_encoder(
            &self,
            features: ArrayView2<'_, f32>,
            _state: &Self::State,
        ) -> Result<(Array2<f32>, Self::State)> {
            Ok((features.to_owned(), ()))
        }

        fn run_decoder(&self, context: &[TokenId]) -> Result<Array1<f32>> {
            self.decoder_calls.lock().push(context.to_vec());
            Ok(context.iter().map(|&t| t as f32).collect())
        }

        fn run_joiner(
            &self,
            encoder_out: ArrayView1<'_, f32>,
            _decoder_out: ArrayView1<'_, f32>,
        ) -> Result<Array1<f32>> {
            Ok(encoder_out.to_owned())
        }
    }
}
