//! Subcommand bodies. Each builds a stub-backed recognizer from the resolved
//! configuration and drives it through one of the core drivers.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use earshot_core::{
    audio::read_wave, decode_batch, segment_recording, Recognizer, RecognizerConfig,
    SegmentEvent, StubTransducer,
};
use tracing::info;

fn build_recognizer(config: &RecognizerConfig) -> Result<Recognizer<StubTransducer>> {
    let started = Instant::now();
    let recognizer = Recognizer::new(config.clone()).context("failed to create recognizer")?;
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        decoder = %config.decoder,
        "recognizer created"
    );
    Ok(recognizer)
}

fn load_wave(path: &Path) -> Result<(Vec<f32>, u32)> {
    read_wave(path).with_context(|| format!("failed to read {}", path.display()))
}

pub fn decode_files(config: &RecognizerConfig, paths: &[PathBuf], json: bool) -> Result<()> {
    let recognizer = build_recognizer(config)?;
    let mut out = io::stdout().lock();

    for path in paths {
        let (samples, sample_rate) = load_wave(path)?;
        let duration = samples.len() as f32 / sample_rate as f32;

        let started = Instant::now();
        let result = decode_batch(&recognizer, &samples, sample_rate)?;
        let elapsed = started.elapsed().as_secs_f32();
        info!(
            path = %path.display(),
            duration_secs = duration,
            elapsed_secs = elapsed,
            rtf = elapsed / duration.max(f32::EPSILON),
            "decoded file"
        );

        if json {
            let line = serde_json::json!({
                "file": path.display().to_string(),
                "result": result,
            });
            writeln!(out, "{line}")?;
        } else {
            writeln!(out, "{}: {result}", path.display())?;
        }
    }
    Ok(())
}

fn print_event(out: &mut impl Write, event: &SegmentEvent, json: bool) -> Result<()> {
    if json {
        writeln!(out, "{}", serde_json::to_string(event)?)?;
    } else if event.is_final {
        writeln!(out, "{event}")?;
    }
    Ok(())
}

pub fn live_from_file(config: &RecognizerConfig, path: &Path, json: bool) -> Result<()> {
    let recognizer = build_recognizer(config)?;
    let (samples, sample_rate) = load_wave(path)?;
    let events = segment_recording(&recognizer, &samples, sample_rate)?;

    let mut out = io::stdout().lock();
    for event in &events {
        print_event(&mut out, event, json)?;
    }
    info!(
        segments = events.iter().filter(|e| e.is_final).count(),
        "replay finished"
    );
    Ok(())
}

#[cfg(feature = "mic")]
pub fn live_from_mic(
    config: &RecognizerConfig,
    device: Option<&str>,
    duration: Option<f32>,
    json: bool,
) -> Result<()> {
    use std::sync::{atomic::AtomicBool, Arc};
    use std::time::Duration;

    use earshot_core::audio::capture::{create_audio_ring, AudioCapture, Consumer};
    use earshot_core::{AudioChunk, LiveSegmenter};

    let recognizer = build_recognizer(config)?;
    let (producer, mut consumer) = create_audio_ring();
    let running = Arc::new(AtomicBool::new(true));
    let capture = AudioCapture::open(producer, Arc::clone(&running), device)?;
    let sample_rate = capture.sample_rate;

    let mut segmenter = LiveSegmenter::new(&recognizer);
    let mut buf = vec![0.0f32; sample_rate as usize];
    let mut out = io::stdout().lock();
    let started = Instant::now();
    info!(sample_rate, "listening");

    while duration.map_or(true, |secs| started.elapsed().as_secs_f32() < secs) {
        std::thread::sleep(Duration::from_millis(100));
        let n = consumer.pop_slice(&mut buf);
        if n == 0 {
            continue;
        }
        let chunk = AudioChunk::new(buf[..n].to_vec(), sample_rate);
        for event in segmenter.accept(&chunk)? {
            print_event(&mut out, &event, json)?;
        }
        out.flush()?;
    }

    capture.stop();
    let (events, stats) = segmenter.finish()?;
    for event in &events {
        print_event(&mut out, event, json)?;
    }
    info!(
        chunks = stats.chunks,
        windows = stats.windows_decoded,
        segments = stats.segments,
        "live session finished"
    );
    Ok(())
}

#[cfg(not(feature = "mic"))]
pub fn live_from_mic(
    _config: &RecognizerConfig,
    _device: Option<&str>,
    _duration: Option<f32>,
    _json: bool,
) -> Result<()> {
    anyhow::bail!("built without microphone support; rebuild with `--features mic` or pass --from-file")
}
