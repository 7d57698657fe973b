use thiserror::Error;

/// All errors produced by earshot-core.
#[derive(Debug, Error)]
pub enum EarshotError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unsupported decoding method: {0} (expected greedy_search or modified_beam_search)")]
    UnknownDecodingMethod(String),

    #[error("model initialisation failed: {0}")]
    ModelInit(String),

    #[error("model artifacts are incompatible: {0}")]
    ModelMismatch(String),

    #[error("token table line {line}: {reason}")]
    TokenTable { line: usize, reason: String },

    #[error("hotword piece '{piece}' on line {line} is not in the token table")]
    UnknownHotword { piece: String, line: usize },

    #[error("invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),

    #[error("resampler error: {0}")]
    Resample(String),

    #[error("inference error: {0}")]
    Inference(String),

    #[error("unsupported audio input: {0}")]
    InputFormat(String),

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, EarshotError>;
