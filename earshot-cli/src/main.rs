//! `earshot`: decode WAV files or segment live audio into utterances.
//!
//! ```text
//! earshot decode-file --tokens tokens.txt a.wav b.wav
//! earshot live --tokens tokens.txt --from-file meeting.wav --json
//! earshot live --tokens tokens.txt            # needs the `mic` feature
//! ```

mod cli;
mod commands;

use clap::Parser;
use tracing::info;

fn main() -> anyhow::Result<()> {
    // ── Tracing ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("earshot=info")),
        )
        .init();

    let cli = cli::Cli::parse();
    info!(version = env!("CARGO_PKG_VERSION"), "earshot starting");
    cli::run_cli(cli)
}
