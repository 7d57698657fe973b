//! WAV file input.
//!
//! Only mono, 16-bit signed integer PCM is accepted. Anything else is rejected
//! with `EarshotError::InputFormat` before the recognizer sees a sample.

use std::path::Path;

use hound::{SampleFormat, WavReader};
use tracing::debug;

use super::I16_SCALE;
use crate::error::{EarshotError, Result};

/// Read a WAV file and return its normalised samples and sample rate.
///
/// # Errors
/// `InputFormat` for multi-channel, non-16-bit or float files; `Wav` for
/// anything hound cannot parse.
pub fn read_wave(path: impl AsRef<Path>) -> Result<(Vec<f32>, u32)> {
    let path = path.as_ref();
    let reader = WavReader::open(path)?;
    let spec = reader.spec();

    if spec.channels != 1 {
        return Err(EarshotError::InputFormat(format!(
            "{}: expected a single channel, found {}",
            path.display(),
            spec.channels
        )));
    }
    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(EarshotError::InputFormat(format!(
            "{}: expected 16-bit integer PCM, found {}-bit {:?}",
            path.display(),
            spec.bits_per_sample,
            spec.sample_format
        )));
    }

    let samples = reader
        .into_samples::<i16>()
        .map(|s| s.map(|v| v as f32 / I16_SCALE))
        .collect::<std::result::Result<Vec<f32>, _>>()?;

    debug!(
        path = %path.display(),
        sample_rate = spec.sample_rate,
        samples = samples.len(),
        "read wave file"
    );

    Ok((samples, spec.sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};
    use std::path::PathBuf;

    type FileWriter = WavWriter<std::io::BufWriter<std::fs::File>>;

    fn temp_wav(name: &str, spec: WavSpec, write: impl FnOnce(&mut FileWriter)) -> PathBuf {
        let path = std::env::temp_dir().join(format!("earshot-{}-{name}.wav", std::process::id()));
        let mut writer = WavWriter::create(&path, spec).unwrap();
        write(&mut writer);
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn reads_mono_16_bit() {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let path = temp_wav("mono16", spec, |w| {
            for s in [0i16, 16_384, -32_768] {
                w.write_sample(s).unwrap();
            }
        });
        let (samples, rate) = read_wave(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(rate, 8_000);
        assert_eq!(samples, vec![0.0, 0.5, -1.0]);
    }

    #[test]
    fn rejects_stereo() {
        let spec = WavSpec {
            channels: 2,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let path = temp_wav("stereo", spec, |w| {
            w.write_sample(0i16).unwrap();
            w.write_sample(0i16).unwrap();
        });
        let err = read_wave(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, EarshotError::InputFormat(_)));
    }

    #[test]
    fn rejects_float_samples() {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let path = temp_wav("float", spec, |w| {
            w.write_sample(0.25f32).unwrap();
        });
        let err = read_wave(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, EarshotError::InputFormat(_)));
    }

    #[test]
    fn missing_file_is_a_wav_error() {
        let err = read_wave("/definitely/not/here.wav").unwrap_err();
        assert!(matches!(err, EarshotError::Wav(_)));
    }
}
