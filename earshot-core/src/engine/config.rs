//! Recognizer configuration.
//!
//! Every section is a plain serde struct with a `Default` impl so a JSON
//! file only needs the keys it changes:
//!
//! ```json
//! {
//!   "model": { "tokens": "tokens.txt", "numThreads": 2 },
//!   "decoder": { "method": "modified_beam_search", "numActivePaths": 4 },
//!   "endpoint": { "enable": true }
//! }
//! ```
//!
//! `RecognizerConfig::validate` runs before a recognizer is built; a config
//! that passed validation is never mutated afterwards.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{EarshotError, Result};

pub use crate::endpoint::{EndpointConfig, EndpointRule};

/// Paths to the network artifacts plus the thread budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelConfig {
    pub encoder_param: PathBuf,
    pub encoder_bin: PathBuf,
    pub decoder_param: PathBuf,
    pub decoder_bin: PathBuf,
    pub joiner_param: PathBuf,
    pub joiner_bin: PathBuf,
    pub tokens: PathBuf,
    pub num_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            encoder_param: PathBuf::new(),
            encoder_bin: PathBuf::new(),
            decoder_param: PathBuf::new(),
            decoder_bin: PathBuf::new(),
            joiner_param: PathBuf::new(),
            joiner_bin: PathBuf::new(),
            tokens: PathBuf::new(),
            num_threads: 1,
        }
    }
}

/// Front-end settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureConfig {
    /// Rate features are computed at (Hz); input is resampled to it.
    pub sample_rate: u32,
    /// Mel bins per frame.
    pub feature_dim: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            feature_dim: 80,
        }
    }
}

/// Search strategy. The beam width only exists on the beam variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "method",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum DecoderConfig {
    GreedySearch,
    ModifiedBeamSearch { num_active_paths: usize },
}

impl DecoderConfig {
    pub const DEFAULT_NUM_ACTIVE_PATHS: usize = 4;

    pub fn method(&self) -> &'static str {
        match self {
            Self::GreedySearch => "greedy_search",
            Self::ModifiedBeamSearch { .. } => "modified_beam_search",
        }
    }

    /// Build from a method name and a beam width, which greedy search ignores.
    pub fn from_method(method: &str, num_active_paths: usize) -> Result<Self> {
        match method.parse::<Self>()? {
            Self::ModifiedBeamSearch { .. } => Ok(Self::ModifiedBeamSearch { num_active_paths }),
            greedy => Ok(greedy),
        }
    }

    fn validate(&self) -> Result<()> {
        if let Self::ModifiedBeamSearch { num_active_paths: 0 } = self {
            return Err(EarshotError::Config(
                "numActivePaths must be a positive integer".into(),
            ));
        }
        Ok(())
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self::GreedySearch
    }
}

impl FromStr for DecoderConfig {
    type Err = EarshotError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "greedy_search" => Ok(Self::GreedySearch),
            "modified_beam_search" => Ok(Self::ModifiedBeamSearch {
                num_active_paths: Self::DEFAULT_NUM_ACTIVE_PATHS,
            }),
            other => Err(EarshotError::UnknownDecodingMethod(other.to_string())),
        }
    }
}

impl fmt::Display for DecoderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GreedySearch => f.write_str(self.method()),
            Self::ModifiedBeamSearch { num_active_paths } => {
                write!(f, "{} (num_active_paths={num_active_paths})", self.method())
            }
        }
    }
}

/// Lexicon boosting for modified beam search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HotwordsConfig {
    /// File with one phrase per line, pieces separated by spaces.
    pub file: Option<PathBuf>,
    /// Extra phrases in the same format as file lines.
    pub phrases: Vec<String>,
    /// Boost added per matched token.
    pub score: f32,
}

impl Default for HotwordsConfig {
    fn default() -> Self {
        Self {
            file: None,
            phrases: Vec::new(),
            score: 1.5,
        }
    }
}

impl HotwordsConfig {
    pub fn is_empty(&self) -> bool {
        self.file.is_none() && self.phrases.iter().all(|p| p.trim().is_empty())
    }
}

/// Everything a `Recognizer` needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecognizerConfig {
    pub model: ModelConfig,
    pub feature: FeatureConfig,
    pub decoder: DecoderConfig,
    pub endpoint: EndpointConfig,
    pub hotwords: HotwordsConfig,
}

impl RecognizerConfig {
    /// Reject values no recognizer could run with.
    pub fn validate(&self) -> Result<()> {
        if self.feature.sample_rate == 0 {
            return Err(EarshotError::InvalidSampleRate(0));
        }
        if self.feature.feature_dim == 0 {
            return Err(EarshotError::Config("featureDim must be positive".into()));
        }
        if self.model.num_threads == 0 {
            return Err(EarshotError::Config("numThreads must be positive".into()));
        }
        self.decoder.validate()?;
        self.endpoint.validate()?;
        if !self.hotwords.score.is_finite() {
            return Err(EarshotError::Config(format!(
                "hotwords score must be finite, got {}",
                self.hotwords.score
            )));
        }
        if !self.hotwords.is_empty() && self.decoder == DecoderConfig::GreedySearch {
            warn!("hotwords only apply to modified_beam_search; they will be ignored");
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        RecognizerConfig::default().validate().unwrap();
    }

    #[test]
    fn decoder_parses_method_names() {
        assert_eq!(
            "greedy_search".parse::<DecoderConfig>().unwrap(),
            DecoderConfig::GreedySearch
        );
        assert_eq!(
            DecoderConfig::from_method("modified_beam_search", 8).unwrap(),
            DecoderConfig::ModifiedBeamSearch {
                num_active_paths: 8
            }
        );
        assert!(matches!(
            "beam".parse::<DecoderConfig>(),
            Err(EarshotError::UnknownDecodingMethod(m)) if m == "beam"
        ));
    }

    #[test]
    fn zero_beam_rejected() {
        let cfg = RecognizerConfig {
            decoder: DecoderConfig::ModifiedBeamSearch {
                num_active_paths: 0,
            },
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(EarshotError::Config(_))));
    }

    #[test]
    fn zero_sample_rate_rejected() {
        let mut cfg = RecognizerConfig::default();
        cfg.feature.sample_rate = 0;
        assert!(matches!(
            cfg.validate(),
            Err(EarshotError::InvalidSampleRate(0))
        ));
    }

    #[test]
    fn json_uses_tagged_decoder() {
        let cfg = RecognizerConfig::from_json_str(
            r#"{
                "model": { "tokens": "tokens.txt", "numThreads": 2 },
                "decoder": { "method": "modified_beam_search", "numActivePaths": 3 },
                "hotwords": { "phrases": ["▁HELLO ▁WORLD"] }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.model.num_threads, 2);
        assert_eq!(cfg.model.tokens, PathBuf::from("tokens.txt"));
        assert_eq!(
            cfg.decoder,
            DecoderConfig::ModifiedBeamSearch {
                num_active_paths: 3
            }
        );
        assert_eq!(cfg.hotwords.score, 1.5);
        assert_eq!(cfg.feature, FeatureConfig::default());
    }

    #[test]
    fn json_endpoint_rules_layer_over_defaults() {
        let cfg = RecognizerConfig::from_json_str(
            r#"{ "endpoint": { "enable": true, "rule2": { "minTrailingSilence": 0.8 }, "rule3": {} } }"#,
        )
        .unwrap();
        let defaults = EndpointConfig::default();
        assert!(cfg.endpoint.enable);
        assert_eq!(
            cfg.endpoint.rule2,
            EndpointRule {
                min_trailing_silence: 0.8,
                ..defaults.rule2
            }
        );
        assert_eq!(cfg.endpoint.rule1, defaults.rule1);
        assert_eq!(cfg.endpoint.rule3, defaults.rule3);
        cfg.validate().unwrap();
    }

    #[test]
    fn json_rejects_unknown_method() {
        let err = RecognizerConfig::from_json_str(r#"{"decoder":{"method":"viterbi"}}"#);
        assert!(matches!(err, Err(EarshotError::Json(_))));
    }

    #[test]
    fn json_round_trips() {
        let cfg = RecognizerConfig {
            decoder: DecoderConfig::ModifiedBeamSearch {
                num_active_paths: 5,
            },
            ..Default::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains(r#""method":"modified_beam_search""#));
        assert!(json.contains(r#""numActivePaths":5"#));
        assert_eq!(RecognizerConfig::from_json_str(&json).unwrap(), cfg);
    }

    #[test]
    fn hotwords_emptiness() {
        let mut hw = HotwordsConfig::default();
        assert!(hw.is_empty());
        hw.phrases.push("  ".into());
        assert!(hw.is_empty());
        hw.phrases.push("A B".into());
        assert!(!hw.is_empty());
    }
}
