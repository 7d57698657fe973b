//! # earshot-core
//!
//! Streaming speech-recognition session engine.
//!
//! ## Architecture
//!
//! ```text
//! audio chunk ─▶ resample ─▶ FeatureExtractor ─▶ FeatureQueue        (Stream)
//!                                                     │
//!                                     Recognizer::is_ready / decode
//!                                                     │
//!                               TransducerModel encoder ─▶ Searcher (greedy | beam)
//!                                                     │
//!                               Recognizer::is_endpoint ─▶ reset ─▶ next utterance
//! ```
//!
//! The engine is synchronous and pull-based: nothing happens unless the
//! caller pushes audio or asks for a decode. One `Recognizer` owns the model
//! and serves any number of `Stream`s, each driven from at most one thread.
//!
//! ## Usage
//!
//! ```ignore
//! let recognizer = Recognizer::<StubTransducer>::new(config)?;
//! let mut stream = recognizer.create_stream();
//! stream.accept_waveform(48_000, &chunk)?;
//! while recognizer.is_ready(&stream) {
//!     recognizer.decode(&mut stream)?;
//! }
//! if recognizer.is_endpoint(&stream) {
//!     println!("{}", recognizer.get_result(&stream));
//!     recognizer.reset(&mut stream);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod endpoint;
pub mod engine;
pub mod error;
pub mod features;
pub mod inference;
pub mod result;
pub mod search;
pub mod tokens;

// Convenience re-exports for downstream crates
pub use buffering::chunk::AudioChunk;
pub use engine::driver::{decode_batch, segment_recording, LiveSegmenter, SegmenterStats};
pub use engine::{
    DecoderConfig, EndpointConfig, EndpointRule, FeatureConfig, HotwordsConfig, ModelConfig,
    Recognizer, RecognizerConfig, Stream,
};
pub use error::{EarshotError, Result};
pub use features::{FbankExtractor, FeatureExtractor};
pub use inference::{ModelMeta, StubTransducer, TransducerModel};
pub use result::{RecognitionResult, SegmentEvent};
pub use tokens::{SymbolTable, TokenId};
