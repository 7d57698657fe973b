//! `Recognizer`: owns the shared model and the decoding policy.
//!
//! ## Lifecycle
//!
//! ```text
//! Recognizer::new(config)        → validated config, model, tokens, hotwords
//!     └─► create_stream()        → Stream<'_> borrowing the recognizer
//!         ├─► accept_waveform()  → frames queued
//!         ├─► while is_ready()   → decode()
//!         ├─► is_endpoint()?     → reset()
//!         └─► drop               → stream released
//! ```
//!
//! ## Threading
//!
//! Everything runs on the caller's thread. A recognizer is only read through
//! `&self`, so it is `Sync` whenever the model is and any number of streams
//! can be driven from different threads at once. Each stream is `&mut`
//! exclusive to one driver.

pub mod config;
pub mod driver;
pub mod stream;

use std::fs::File;
use std::io::BufReader;

use tracing::{debug, info, warn};

use crate::{
    endpoint::Endpoint,
    error::{EarshotError, Result},
    features::{frames_to_secs, FbankExtractor, FeatureExtractor},
    inference::{ModelMeta, TransducerModel},
    result::RecognitionResult,
    search::{ContextGraph, Searcher},
    tokens::{SymbolTable, TokenId},
};

pub use config::{
    DecoderConfig, EndpointConfig, EndpointRule, FeatureConfig, HotwordsConfig, ModelConfig,
    RecognizerConfig,
};
pub use stream::Stream;

/// Builds a fresh extractor for each stream.
pub type FeatureExtractorFactory =
    Box<dyn Fn(&FeatureConfig) -> Box<dyn FeatureExtractor> + Send + Sync>;

pub struct Recognizer<M: TransducerModel> {
    config: RecognizerConfig,
    model: M,
    symbols: SymbolTable,
    endpoint: Endpoint,
    searcher: Searcher,
    context_graph: Option<ContextGraph>,
    feature_factory: FeatureExtractorFactory,
}

impl<M: TransducerModel> Recognizer<M> {
    /// Validate `config`, load the model and token table, and build the
    /// hotword graph.
    ///
    /// # Errors
    /// Any configuration, loading or compatibility error. No partially
    /// initialised recognizer is ever returned.
    pub fn new(config: RecognizerConfig) -> Result<Self> {
        config.validate()?;
        let symbols = SymbolTable::from_file(&config.model.tokens)?;
        let model = M::load(&config.model, &symbols)?;
        Self::from_parts(config, model, symbols)
    }

    /// Same checks as [`new`](Self::new) around an already loaded model.
    pub fn from_parts(config: RecognizerConfig, model: M, symbols: SymbolTable) -> Result<Self> {
        config.validate()?;
        check_compatible(model.meta(), &config, &symbols)?;

        let searcher = Searcher::from(config.decoder);
        let context_graph = match searcher {
            Searcher::ModifiedBeam { .. } if !config.hotwords.is_empty() => {
                Some(build_context_graph(&config, &symbols)?)
            }
            _ => None,
        };

        let meta = model.meta();
        info!(
            method = config.decoder.method(),
            vocab_size = meta.vocab_size,
            window_size = meta.window_size,
            window_stride = meta.window_stride,
            hotword_states = context_graph.as_ref().map_or(0, |g| g.num_states()),
            endpoint = config.endpoint.enable,
            "recognizer ready"
        );

        Ok(Self {
            endpoint: Endpoint::new(config.endpoint),
            config,
            model,
            symbols,
            searcher,
            context_graph,
            feature_factory: Box::new(|cfg| Box::new(FbankExtractor::new(cfg))),
        })
    }

    /// Replace the default filterbank front end. The factory's extractors
    /// must produce frames of the configured width at the configured rate.
    pub fn with_feature_extractor<F>(mut self, factory: F) -> Result<Self>
    where
        F: Fn(&FeatureConfig) -> Box<dyn FeatureExtractor> + Send + Sync + 'static,
    {
        let probe = factory(&self.config.feature);
        if probe.dim() != self.config.feature.feature_dim
            || probe.sample_rate() != self.config.feature.sample_rate
        {
            return Err(EarshotError::ModelMismatch(format!(
                "feature extractor produces {} dims at {} Hz, config wants {} at {} Hz",
                probe.dim(),
                probe.sample_rate(),
                self.config.feature.feature_dim,
                self.config.feature.sample_rate
            )));
        }
        self.feature_factory = Box::new(factory);
        Ok(self)
    }

    pub fn config(&self) -> &RecognizerConfig {
        &self.config
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn meta(&self) -> &ModelMeta {
        self.model.meta()
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    // ── Streams ────────────────────────────────────────────────────────────

    pub fn create_stream(&self) -> Stream<'_, M> {
        Stream::new(
            self,
            (self.feature_factory)(&self.config.feature),
            self.model.initial_state(),
            self.searcher.empty_result(),
        )
    }

    /// True when a full decode window is queued. Pure.
    pub fn is_ready(&self, stream: &Stream<'_, M>) -> bool {
        stream.features.num_frames() >= self.meta().window_size
    }

    /// Run one decode step: encoder over the next window, then search.
    ///
    /// Calling this on a stream that is not ready is a caller bug: it panics
    /// in debug builds and leaves the stream untouched otherwise.
    ///
    /// # Errors
    /// Backend inference failures.
    pub fn decode(&self, stream: &mut Stream<'_, M>) -> Result<()> {
        debug_assert!(
            std::ptr::eq(stream.recognizer, self),
            "stream belongs to another recognizer"
        );
        debug_assert!(
            self.is_ready(stream),
            "decode called on a stream that is not ready"
        );

        let meta = self.meta();
        let Some(window) = stream.features.window(meta.window_size) else {
            return Ok(());
        };

        let (encoder_out, next_state) = self
            .model
            .run_encoder(window.view(), &stream.encoder_state)?;
        self.searcher.search(
            &self.model,
            encoder_out.view(),
            &mut stream.result,
            self.context_graph.as_ref(),
        )?;
        stream.encoder_state = next_state;
        stream.features.consume(meta.window_stride);

        let committed = self
            .searcher
            .committed_len(&stream.result)
            .max(stream.committed);
        if committed > stream.committed {
            debug!(new_tokens = committed - stream.committed, "committed tokens");
        }
        stream.committed = committed;

        debug!(
            processed = stream.features.processed(),
            queued = stream.features.num_frames(),
            tokens = stream.result.tokens.len(),
            trailing_blanks = stream.result.num_trailing_blanks,
            "decoded window"
        );
        Ok(())
    }

    /// Decode every ready window. Returns how many were decoded.
    pub fn drain(&self, stream: &mut Stream<'_, M>) -> Result<usize> {
        let mut windows = 0;
        while self.is_ready(stream) {
            self.decode(stream)?;
            windows += 1;
        }
        Ok(windows)
    }

    /// Whether the current utterance has ended. Pure.
    pub fn is_endpoint(&self, stream: &Stream<'_, M>) -> bool {
        let utterance_secs = frames_to_secs(stream.features.processed());
        let trailing_frames =
            stream.result.num_trailing_blanks as usize * self.meta().subsampling_factor;
        self.endpoint.is_endpoint(
            utterance_secs,
            frames_to_secs(trailing_frames),
            stream.result.contains_speech(),
        )
    }

    /// Start a new utterance on `stream`. Queued frames are kept.
    pub fn reset(&self, stream: &mut Stream<'_, M>) {
        debug!(
            processed = stream.features.processed(),
            tokens = stream.result.tokens.len(),
            "resetting stream"
        );
        stream.result = self.searcher.empty_result();
        stream.encoder_state = self.model.initial_state();
        stream.committed = 0;
        stream.features.reset_processed();
    }

    /// Snapshot of the stream's current hypothesis.
    pub fn get_result(&self, stream: &Stream<'_, M>) -> RecognitionResult {
        let (tokens, timestamps) = match self.finalized_hotword_path(stream) {
            Some(path) => path,
            None => (&stream.result.tokens[..], &stream.result.timestamps[..]),
        };

        let frame_secs = frames_to_secs(self.meta().subsampling_factor);
        RecognitionResult {
            text: self.symbols.detokenize(tokens),
            tokens: tokens.to_vec(),
            symbols: tokens
                .iter()
                .map(|&t| self.symbols.piece(t).unwrap_or_default().to_string())
                .collect(),
            timestamps: timestamps.iter().map(|&t| t as f32 * frame_secs).collect(),
        }
    }

    /// Once input is exhausted, rank beam paths with unfinished hotword
    /// matches cancelled.
    fn finalized_hotword_path<'s>(
        &self,
        stream: &'s Stream<'_, M>,
    ) -> Option<(&'s [TokenId], &'s [u32])> {
        let graph = self.context_graph.as_ref()?;
        if !stream.is_input_finished() || self.is_ready(stream) {
            return None;
        }
        let context_size = self.meta().context_size;
        let best = stream.result.hyps.best_by(|h| {
            let (cancel, _) = graph.finalize(h.context_state);
            (h.log_prob + cancel as f64) / (h.ys.len() + context_size).max(1) as f64
        })?;
        Some((&best.ys[..], &best.timestamps[..]))
    }
}

impl<M: TransducerModel + std::fmt::Debug> std::fmt::Debug for Recognizer<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recognizer")
            .field("config", &self.config)
            .field("model", &self.model)
            .field("searcher", &self.searcher)
            .finish_non_exhaustive()
    }
}

fn check_compatible(
    meta: &ModelMeta,
    config: &RecognizerConfig,
    symbols: &SymbolTable,
) -> Result<()> {
    let mismatch = |msg: String| Err(EarshotError::ModelMismatch(msg));

    if meta.feature_dim != config.feature.feature_dim {
        return mismatch(format!(
            "model expects {}-dim features, config has {}",
            meta.feature_dim, config.feature.feature_dim
        ));
    }
    if meta.encoder_out_dim != meta.joiner_encoder_dim {
        return mismatch(format!(
            "encoder output dim {} != joiner encoder input dim {}",
            meta.encoder_out_dim, meta.joiner_encoder_dim
        ));
    }
    if meta.decoder_out_dim != meta.joiner_decoder_dim {
        return mismatch(format!(
            "decoder output dim {} != joiner decoder input dim {}",
            meta.decoder_out_dim, meta.joiner_decoder_dim
        ));
    }
    if meta.vocab_size != symbols.len() {
        return mismatch(format!(
            "joiner vocabulary {} != token table size {}",
            meta.vocab_size,
            symbols.len()
        ));
    }
    if meta.blank_id as usize >= meta.vocab_size {
        return mismatch(format!("blank id {} outside vocabulary", meta.blank_id));
    }
    if meta.context_size == 0 || meta.subsampling_factor == 0 {
        return mismatch("context size and subsampling factor must be positive".into());
    }
    if meta.window_stride == 0 || meta.window_stride > meta.window_size {
        return mismatch(format!(
            "window stride {} must be in 1..={}",
            meta.window_stride, meta.window_size
        ));
    }
    Ok(())
}

fn build_context_graph(
    config: &RecognizerConfig,
    symbols: &SymbolTable,
) -> Result<ContextGraph> {
    let mut phrases = Vec::new();
    if let Some(path) = &config.hotwords.file {
        let file = File::open(path)?;
        phrases.extend(ContextGraph::parse_phrases(BufReader::new(file), symbols)?);
    }
    let inline = config.hotwords.phrases.join("\n");
    phrases.extend(ContextGraph::parse_phrases(inline.as_bytes(), symbols)?);

    if phrases.is_empty() {
        warn!("hotwords configured but no phrases found");
    }
    let scored: Vec<(Vec<TokenId>, f32)> = phrases.into_iter().map(|p| (p, 0.0)).collect();
    Ok(ContextGraph::new(&scored, config.hotwords.score))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::buffering::FeatureQueue;
    use crate::inference::StubTransducer;
    use crate::search::testing::ScriptedModel;

    const VOCAB: usize = 16;

    fn symbols(n: usize) -> SymbolTable {
        SymbolTable::from_pieces((0..n).map(|i| {
            if i == 0 {
                "<blk>".to_string()
            } else {
                format!("\u{2581}T{i}")
            }
        }))
    }

    fn recognizer(config: RecognizerConfig) -> Result<Recognizer<StubTransducer>> {
        Recognizer::from_parts(config, StubTransducer::new(VOCAB), symbols(VOCAB))
    }

    /// Emits one constant frame per `shift` samples and records every call.
    struct RecordingExtractor {
        dim: usize,
        rate: u32,
        shift: usize,
        pending: usize,
        calls: Arc<Mutex<Vec<usize>>>,
    }

    impl FeatureExtractor for RecordingExtractor {
        fn dim(&self) -> usize {
            self.dim
        }

        fn sample_rate(&self) -> u32 {
            self.rate
        }

        fn accept_waveform(&mut self, samples: &[f32], out: &mut FeatureQueue) {
            self.calls.lock().push(samples.len());
            self.pending += samples.len();
            while self.pending >= self.shift {
                out.push_frame(&vec![1.0; self.dim]);
                self.pending -= self.shift;
            }
        }

        fn input_finished(&mut self, _out: &mut FeatureQueue) {}
    }

    fn recording(
        calls: &Arc<Mutex<Vec<usize>>>,
    ) -> impl Fn(&FeatureConfig) -> Box<dyn FeatureExtractor> + Send + Sync {
        let calls = Arc::clone(calls);
        move |cfg: &FeatureConfig| {
            Box::new(RecordingExtractor {
                dim: cfg.feature_dim,
                rate: cfg.sample_rate,
                shift: 160,
                pending: 0,
                calls: Arc::clone(&calls),
            }) as Box<dyn FeatureExtractor>
        }
    }

    #[test]
    fn rejects_vocabulary_mismatch() {
        let err = Recognizer::from_parts(
            RecognizerConfig::default(),
            StubTransducer::new(VOCAB),
            symbols(VOCAB + 1),
        )
        .unwrap_err();
        assert!(matches!(err, EarshotError::ModelMismatch(_)));
    }

    #[test]
    fn rejects_feature_dim_mismatch() {
        let mut config = RecognizerConfig::default();
        config.feature.feature_dim = 40;
        assert!(matches!(
            recognizer(config),
            Err(EarshotError::ModelMismatch(_))
        ));
    }

    #[test]
    fn rejects_stride_beyond_window() {
        let model = StubTransducer::with_meta(ModelMeta {
            window_size: 8,
            window_stride: 12,
            ..StubTransducer::new(VOCAB).meta().clone()
        });
        let err = Recognizer::from_parts(RecognizerConfig::default(), model, symbols(VOCAB))
            .unwrap_err();
        assert!(matches!(err, EarshotError::ModelMismatch(_)));
    }

    #[test]
    fn rejects_joiner_dimension_mismatch() {
        let model = StubTransducer::with_meta(ModelMeta {
            joiner_encoder_dim: 7,
            ..StubTransducer::new(VOCAB).meta().clone()
        });
        let err = Recognizer::from_parts(RecognizerConfig::default(), model, symbols(VOCAB))
            .unwrap_err();
        assert!(matches!(err, EarshotError::ModelMismatch(_)));
    }

    #[test]
    fn new_fails_without_token_file() {
        let config = RecognizerConfig {
            model: ModelConfig {
                tokens: "/no/such/tokens.txt".into(),
                ..ModelConfig::default()
            },
            ..RecognizerConfig::default()
        };
        assert!(Recognizer::<StubTransducer>::new(config).is_err());
    }

    #[test]
    fn unknown_hotword_piece_is_fatal() {
        let config = RecognizerConfig {
            decoder: DecoderConfig::ModifiedBeamSearch {
                num_active_paths: 4,
            },
            hotwords: HotwordsConfig {
                phrases: vec!["\u{2581}T1 NOPE".into()],
                ..HotwordsConfig::default()
            },
            ..RecognizerConfig::default()
        };
        assert!(matches!(
            recognizer(config),
            Err(EarshotError::UnknownHotword { line: 1, .. })
        ));
    }

    #[test]
    fn hotwords_ignored_under_greedy_search() {
        let config = RecognizerConfig {
            hotwords: HotwordsConfig {
                phrases: vec!["NOPE".into()],
                ..HotwordsConfig::default()
            },
            ..RecognizerConfig::default()
        };
        let rec = recognizer(config).unwrap();
        assert!(rec.context_graph.is_none());
    }

    #[test]
    fn audio_is_resampled_before_extraction() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let rec = recognizer(RecognizerConfig::default())
            .unwrap()
            .with_feature_extractor(recording(&calls))
            .unwrap();
        let mut stream = rec.create_stream();
        stream.accept_waveform(48_000, &vec![0.0; 4_800]).unwrap();
        stream.accept_waveform(16_000, &vec![0.0; 320]).unwrap();

        // Rate change: the 48 kHz session is flushed before 16 kHz passes through.
        let calls = calls.lock().clone();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0] + calls[1], 1_600);
        assert_eq!(calls[2], 320);
        assert_eq!(stream.num_queued_frames(), 12);
        assert!(rec.is_ready(&stream));
    }

    #[test]
    fn chunked_audio_yields_the_same_features_as_one_push() {
        let rec = recognizer(RecognizerConfig::default()).unwrap();
        let audio: Vec<f32> = (0..48_000)
            .map(|i| (i as f32 * 0.05).sin() * 0.3)
            .collect();

        let mut whole = rec.create_stream();
        whole.accept_waveform(48_000, &audio).unwrap();
        whole.input_finished();

        let mut chunked = rec.create_stream();
        for chunk in audio.chunks(4_800) {
            chunked.accept_waveform(48_000, chunk).unwrap();
        }
        chunked.input_finished();

        let n = whole.num_queued_frames();
        assert!(n >= 98, "{n} frames");
        assert_eq!(chunked.num_queued_frames(), n);
        assert_eq!(chunked.features.window(n), whole.features.window(n));
    }

    #[test]
    fn extractor_with_wrong_width_rejected() {
        let result = recognizer(RecognizerConfig::default())
            .unwrap()
            .with_feature_extractor(|cfg: &FeatureConfig| {
                Box::new(FbankExtractor::new(&FeatureConfig {
                    feature_dim: 40,
                    ..*cfg
                })) as Box<dyn FeatureExtractor>
            });
        assert!(matches!(result, Err(EarshotError::ModelMismatch(_))));
    }

    #[test]
    fn decode_consumes_one_stride() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let rec = recognizer(RecognizerConfig::default())
            .unwrap()
            .with_feature_extractor(recording(&calls))
            .unwrap();
        let mut stream = rec.create_stream();
        stream.accept_waveform(16_000, &vec![0.0; 160 * 20]).unwrap();
        assert_eq!(stream.num_queued_frames(), 20);

        rec.decode(&mut stream).unwrap();
        assert_eq!(stream.num_queued_frames(), 12);
        assert_eq!(stream.num_processed_frames(), 8);
        assert_eq!(stream.encoder_state().frames, 2);
    }

    #[test]
    fn greedy_commits_every_token() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let rec = recognizer(RecognizerConfig::default())
            .unwrap()
            .with_feature_extractor(recording(&calls))
            .unwrap();
        let mut stream = rec.create_stream();
        // Constant 1.0 frames are "loud" for the stub.
        stream.accept_waveform(16_000, &vec![0.0; 160 * 12]).unwrap();
        rec.decode(&mut stream).unwrap();

        let result = rec.get_result(&stream);
        assert_eq!(result.tokens.len(), 2);
        assert_eq!(stream.committed_text(), result.text);
        assert_eq!(result.timestamps, vec![0.0, 0.04]);
    }

    // ── Hotwords through the recognizer ─────────────────────────────────

    const SCRIPT_VOCAB: usize = 6;

    /// A close call between `T1` (1.8) and `T3` (2.0), then a confident `T2`.
    const CLOSE_CALL: [f32; SCRIPT_VOCAB] = [0.0, 1.8, 0.0, 2.0, 0.0, 0.0];
    const CONFIDENT_T2: [f32; SCRIPT_VOCAB] = [0.0, 0.0, 10.0, 0.0, 0.0, 0.0];

    fn scripted(phrases: &[&str]) -> Recognizer<ScriptedModel> {
        let config = RecognizerConfig {
            feature: FeatureConfig {
                feature_dim: SCRIPT_VOCAB,
                ..FeatureConfig::default()
            },
            decoder: DecoderConfig::ModifiedBeamSearch {
                num_active_paths: 4,
            },
            hotwords: HotwordsConfig {
                phrases: phrases.iter().map(|p| p.to_string()).collect(),
                ..HotwordsConfig::default()
            },
            ..RecognizerConfig::default()
        };
        Recognizer::from_parts(config, ScriptedModel::new(SCRIPT_VOCAB), symbols(SCRIPT_VOCAB))
            .unwrap()
    }

    /// The scripted encoder passes each frame through as the joiner logits.
    fn push_logits(stream: &mut Stream<'_, ScriptedModel>, rows: &[[f32; SCRIPT_VOCAB]]) {
        for row in rows {
            stream.features.push_frame(row);
        }
    }

    fn decode_all(rec: &Recognizer<ScriptedModel>, rows: &[[f32; SCRIPT_VOCAB]]) -> Vec<TokenId> {
        let mut stream = rec.create_stream();
        push_logits(&mut stream, rows);
        rec.drain(&mut stream).unwrap();
        stream.input_finished();
        rec.drain(&mut stream).unwrap();
        rec.get_result(&stream).tokens
    }

    #[test]
    fn hotword_phrase_flips_a_close_call() {
        let rows = [CLOSE_CALL, CONFIDENT_T2];
        assert_eq!(decode_all(&scripted(&[]), &rows), vec![3, 2]);

        let boosted = scripted(&["\u{2581}T1 \u{2581}T2"]);
        assert!(boosted.context_graph.is_some());
        assert_eq!(decode_all(&boosted, &rows), vec![1, 2]);
    }

    #[test]
    fn finished_stream_drops_unfinished_hotword_match() {
        let rec = scripted(&["\u{2581}T1 \u{2581}T2"]);
        let mut stream = rec.create_stream();
        push_logits(&mut stream, &[CLOSE_CALL]);
        rec.drain(&mut stream).unwrap();

        // Mid-stream the partial match still carries its boost.
        assert_eq!(rec.get_result(&stream).tokens, vec![1]);

        // Once input ends, the boost on "T1" alone is cancelled and the
        // better-scoring "T3" path wins.
        stream.input_finished();
        assert!(!rec.is_ready(&stream));
        let result = rec.get_result(&stream);
        assert_eq!(result.tokens, vec![3]);
        assert_eq!(result.text, "T3");
        // get_result does not mutate the stream.
        assert_eq!(rec.get_result(&stream), result);
    }

    #[test]
    fn finished_stream_keeps_completed_hotword() {
        let rec = scripted(&["\u{2581}T1 \u{2581}T2"]);
        let mut stream = rec.create_stream();
        push_logits(&mut stream, &[CLOSE_CALL, CONFIDENT_T2]);
        rec.drain(&mut stream).unwrap();
        let before = rec.get_result(&stream);
        stream.input_finished();
        assert_eq!(rec.get_result(&stream), before);
        assert_eq!(before.tokens, vec![1, 2]);
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "not ready"))]
    fn decode_when_not_ready_is_a_no_op_in_release() {
        let rec = recognizer(RecognizerConfig::default()).unwrap();
        let mut stream = rec.create_stream();
        rec.decode(&mut stream).unwrap();
        assert_eq!(stream.num_processed_frames(), 0);
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "after input_finished"))]
    fn audio_after_finish_is_ignored_in_release() {
        let rec = recognizer(RecognizerConfig::default()).unwrap();
        let mut stream = rec.create_stream();
        stream.input_finished();
        stream.accept_waveform(16_000, &vec![0.1; 16_000]).unwrap();
        assert_eq!(stream.num_queued_frames(), 0);
    }
}
