//! CLI argument definitions using clap.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use earshot_core::{DecoderConfig, EndpointConfig, RecognizerConfig};

#[derive(Debug, Parser)]
#[command(name = "earshot")]
#[command(about = "Streaming transducer speech recognition")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Decode whole WAV files, one result per file
    DecodeFile {
        /// 16-bit mono WAV files
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        recognizer: RecognizerArgs,

        /// Print each result as a JSON line
        #[arg(long)]
        json: bool,
    },

    /// Segment live audio into utterances at endpoints
    Live {
        /// Replay a WAV file through the live loop instead of the microphone
        #[arg(long, value_name = "WAV")]
        from_file: Option<PathBuf>,

        /// Input device name (microphone only)
        #[arg(long)]
        device: Option<String>,

        /// Stop after this many seconds (microphone only)
        #[arg(long, value_name = "SECS")]
        duration: Option<f32>,

        #[command(flatten)]
        recognizer: RecognizerArgs,

        /// Print each segment event as a JSON line
        #[arg(long)]
        json: bool,
    },
}

/// Flags that override fields of the recognizer configuration.
#[derive(Debug, Default, Args)]
pub struct RecognizerArgs {
    /// Full recognizer configuration as JSON; flags override its fields
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub encoder_param: Option<PathBuf>,
    #[arg(long)]
    pub encoder_bin: Option<PathBuf>,
    #[arg(long)]
    pub decoder_param: Option<PathBuf>,
    #[arg(long)]
    pub decoder_bin: Option<PathBuf>,
    #[arg(long)]
    pub joiner_param: Option<PathBuf>,
    #[arg(long)]
    pub joiner_bin: Option<PathBuf>,

    /// Token table, one `<piece> <id>` per line
    #[arg(long)]
    pub tokens: Option<PathBuf>,

    #[arg(long)]
    pub num_threads: Option<usize>,

    /// greedy_search or modified_beam_search
    #[arg(long)]
    pub decoding_method: Option<String>,

    /// Beam width for modified_beam_search
    #[arg(long)]
    pub num_active_paths: Option<usize>,

    /// Endpoint detection on or off (on unless a config file says otherwise)
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub enable_endpoint: Option<bool>,

    #[arg(long, value_name = "SECS")]
    pub rule1_min_trailing_silence: Option<f32>,
    #[arg(long, value_name = "SECS")]
    pub rule2_min_trailing_silence: Option<f32>,
    #[arg(long, value_name = "SECS")]
    pub rule3_min_utterance_length: Option<f32>,

    /// Phrases to boost, one per line, pieces separated by spaces
    #[arg(long)]
    pub hotwords_file: Option<PathBuf>,

    #[arg(long)]
    pub hotwords_score: Option<f32>,
}

impl RecognizerArgs {
    /// Load `--config` (or the CLI defaults) and apply every flag on top.
    pub fn to_config(&self) -> Result<RecognizerConfig> {
        let mut config = match &self.config {
            Some(path) => RecognizerConfig::from_json_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => RecognizerConfig {
                endpoint: EndpointConfig {
                    enable: true,
                    ..EndpointConfig::default()
                },
                ..RecognizerConfig::default()
            },
        };

        let model = &mut config.model;
        for (flag, field) in [
            (&self.encoder_param, &mut model.encoder_param),
            (&self.encoder_bin, &mut model.encoder_bin),
            (&self.decoder_param, &mut model.decoder_param),
            (&self.decoder_bin, &mut model.decoder_bin),
            (&self.joiner_param, &mut model.joiner_param),
            (&self.joiner_bin, &mut model.joiner_bin),
            (&self.tokens, &mut model.tokens),
        ] {
            if let Some(path) = flag {
                *field = path.clone();
            }
        }
        if let Some(n) = self.num_threads {
            model.num_threads = n;
        }

        let num_active_paths = self.num_active_paths.unwrap_or(match config.decoder {
            DecoderConfig::ModifiedBeamSearch { num_active_paths } => num_active_paths,
            DecoderConfig::GreedySearch => DecoderConfig::DEFAULT_NUM_ACTIVE_PATHS,
        });
        let method = self
            .decoding_method
            .as_deref()
            .unwrap_or(config.decoder.method());
        config.decoder = DecoderConfig::from_method(method, num_active_paths)?;

        let endpoint = &mut config.endpoint;
        if let Some(enable) = self.enable_endpoint {
            endpoint.enable = enable;
        }
        if let Some(secs) = self.rule1_min_trailing_silence {
            endpoint.rule1.min_trailing_silence = secs;
        }
        if let Some(secs) = self.rule2_min_trailing_silence {
            endpoint.rule2.min_trailing_silence = secs;
        }
        if let Some(secs) = self.rule3_min_utterance_length {
            endpoint.rule3.min_utterance_length = secs;
        }

        if let Some(path) = &self.hotwords_file {
            config.hotwords.file = Some(path.clone());
        }
        if let Some(score) = self.hotwords_score {
            config.hotwords.score = score;
        }

        if config.model.tokens.as_os_str().is_empty() {
            bail!("a token table is required: pass --tokens or set model.tokens in --config");
        }
        config.validate()?;
        Ok(config)
    }
}

/// Execute CLI command - separated for testing.
pub fn run_cli(cli: Cli) -> Result<()> {
    tracing::debug!(?cli, "parsed arguments");

    match cli.command {
        Commands::DecodeFile {
            paths,
            recognizer,
            json,
        } => crate::commands::decode_files(&recognizer.to_config()?, &paths, json),
        Commands::Live {
            from_file,
            device,
            duration,
            recognizer,
            json,
        } => {
            let config = recognizer.to_config()?;
            match from_file {
                Some(path) => crate::commands::live_from_file(&config, &path, json),
                None => crate::commands::live_from_mic(&config, device.as_deref(), duration, json),
            }
        }
    }
}
