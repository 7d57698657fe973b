//! Endpoint detection: decides when an utterance is over.
//!
//! Three independent rules are checked against the decoder state after each
//! decode. A rule fires when
//!
//! ```text
//! (contains_speech || !must_contain_nonsilence)
//!     && trailing_silence >= min_trailing_silence
//!     && utterance_length >= min_utterance_length
//! ```
//!
//! and any firing rule ends the utterance. Both durations are in seconds.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EarshotError, Result};

/// One endpointing rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointRule {
    /// Only fire once at least one token has been recognized.
    pub must_contain_nonsilence: bool,
    /// Seconds of trailing blank output required.
    pub min_trailing_silence: f32,
    /// Seconds of decoded audio required.
    pub min_utterance_length: f32,
}

impl EndpointRule {
    pub const fn new(
        must_contain_nonsilence: bool,
        min_trailing_silence: f32,
        min_utterance_length: f32,
    ) -> Self {
        Self {
            must_contain_nonsilence,
            min_trailing_silence,
            min_utterance_length,
        }
    }

    pub fn fires(&self, utterance_secs: f32, trailing_secs: f32, contains_speech: bool) -> bool {
        (contains_speech || !self.must_contain_nonsilence)
            && trailing_secs >= self.min_trailing_silence
            && utterance_secs >= self.min_utterance_length
    }

    fn validate(&self, name: &str) -> Result<()> {
        let ok = |v: f32| v.is_finite() && v >= 0.0;
        if !ok(self.min_trailing_silence) || !ok(self.min_utterance_length) {
            return Err(EarshotError::Config(format!(
                "endpoint {name}: thresholds must be finite and non-negative \
                 (trailing silence {}, utterance length {})",
                self.min_trailing_silence, self.min_utterance_length
            )));
        }
        Ok(())
    }
}

/// Endpoint detector configuration.
///
/// Deserialization is layered over [`EndpointConfig::default`]: a missing
/// rule keeps its default, and a partly given rule only replaces the
/// fields it names.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "EndpointSection")]
pub struct EndpointConfig {
    pub enable: bool,
    pub rule1: EndpointRule,
    pub rule2: EndpointRule,
    pub rule3: EndpointRule,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            enable: false,
            // Long silence, whether or not anything was said.
            rule1: EndpointRule::new(false, 2.4, 0.0),
            // Shorter silence after some speech.
            rule2: EndpointRule::new(true, 1.2, 0.0),
            // Utterance length cap.
            rule3: EndpointRule::new(false, 0.0, 20.0),
        }
    }
}

impl EndpointConfig {
    pub fn validate(&self) -> Result<()> {
        self.rule1.validate("rule1")?;
        self.rule2.validate("rule2")?;
        self.rule3.validate("rule3")
    }
}

// ── JSON layering ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RuleOverrides {
    must_contain_nonsilence: Option<bool>,
    min_trailing_silence: Option<f32>,
    min_utterance_length: Option<f32>,
}

impl RuleOverrides {
    fn apply(self, base: EndpointRule) -> EndpointRule {
        EndpointRule {
            must_contain_nonsilence: self
                .must_contain_nonsilence
                .unwrap_or(base.must_contain_nonsilence),
            min_trailing_silence: self.min_trailing_silence.unwrap_or(base.min_trailing_silence),
            min_utterance_length: self.min_utterance_length.unwrap_or(base.min_utterance_length),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct EndpointSection {
    enable: Option<bool>,
    rule1: RuleOverrides,
    rule2: RuleOverrides,
    rule3: RuleOverrides,
}

impl From<EndpointSection> for EndpointConfig {
    fn from(section: EndpointSection) -> Self {
        let base = EndpointConfig::default();
        Self {
            enable: section.enable.unwrap_or(base.enable),
            rule1: section.rule1.apply(base.rule1),
            rule2: section.rule2.apply(base.rule2),
            rule3: section.rule3.apply(base.rule3),
        }
    }
}

/// Stateless rule evaluator.
#[derive(Debug, Clone)]
pub struct Endpoint {
    config: EndpointConfig,
}

impl Endpoint {
    pub fn new(config: EndpointConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// True if endpointing is enabled and any rule fires.
    pub fn is_endpoint(
        &self,
        utterance_secs: f32,
        trailing_secs: f32,
        contains_speech: bool,
    ) -> bool {
        if !self.config.enable {
            return false;
        }
        let rules = [
            ("rule1", &self.config.rule1),
            ("rule2", &self.config.rule2),
            ("rule3", &self.config.rule3),
        ];
        for (name, rule) in rules {
            if rule.fires(utterance_secs, trailing_secs, contains_speech) {
                debug!(
                    rule = name,
                    utterance_secs,
                    trailing_secs,
                    contains_speech,
                    "endpoint detected"
                );
                return true;
            }
        }
        false
    }
}
