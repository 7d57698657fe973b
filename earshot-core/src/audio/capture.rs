//! Microphone capture via cpal, feeding a lock-free SPSC ring buffer.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It must not block or perform I/O, so it only downmixes into a buffer it
//! owns and calls the ring producer's `push_slice`, which is lock-free.
//! The live driver drains the consumer half on its own thread.
//!
//! ```text
//! cpal callback ──push_slice──▶ HeapRb<f32> ──pop_slice──▶ LiveSegmenter
//! ```
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms, so `AudioCapture` must be
//! created and dropped on the same thread.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    SampleFormat, Stream, StreamConfig,
};
use ringbuf::{traits::Split, HeapRb};
use tracing::{error, info, warn};

pub use ringbuf::traits::{Consumer, Producer};

use super::{downmix, I16_SCALE};
use crate::error::{EarshotError, Result};

/// Producer half, held by the audio callback.
pub type AudioProducer = ringbuf::HeapProd<f32>;

/// Consumer half, held by the driver thread.
pub type AudioConsumer = ringbuf::HeapCons<f32>;

/// 2^20 samples, about 21 s at 48 kHz.
pub const RING_CAPACITY: usize = 1 << 20;

/// Create a matched producer/consumer pair backed by a heap ring buffer.
pub fn create_audio_ring() -> (AudioProducer, AudioConsumer) {
    HeapRb::<f32>::new(RING_CAPACITY).split()
}

/// Handle to an active capture stream. Dropping it closes the device.
pub struct AudioCapture {
    _stream: Stream,
    running: Arc<AtomicBool>,
    /// Capture rate reported by the device (Hz).
    pub sample_rate: u32,
}

impl AudioCapture {
    /// Open the named input device, falling back to the default input and
    /// then to the first device the host lists.
    ///
    /// # Errors
    /// `NoDefaultInputDevice` when the host has no inputs, `AudioDevice` or
    /// `AudioStream` when cpal fails.
    pub fn open(
        mut producer: AudioProducer,
        running: Arc<AtomicBool>,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        let host = cpal::default_host();

        let preferred = preferred_device_name.and_then(|wanted| {
            let found = host
                .input_devices()
                .ok()
                .and_then(|mut devices| {
                    devices.find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
                });
            if found.is_none() {
                warn!("input device '{wanted}' not found, falling back");
            }
            found
        });

        let device = match preferred.or_else(|| host.default_input_device()) {
            Some(device) => device,
            None => host
                .input_devices()
                .map_err(|e| EarshotError::AudioDevice(e.to_string()))?
                .next()
                .ok_or(EarshotError::NoDefaultInputDevice)?,
        };

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| EarshotError::AudioDevice(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        info!(sample_rate, channels, "audio config selected");

        let config: StreamConfig = supported.config();
        let flag = Arc::clone(&running);
        let mut mono: Vec<f32> = Vec::new();
        let mut scratch: Vec<f32> = Vec::new();

        let stream = match supported.sample_format() {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _info| {
                    if !flag.load(Ordering::Relaxed) {
                        return;
                    }
                    downmix(data, channels, &mut mono);
                    let written = producer.push_slice(&mono);
                    if written < mono.len() {
                        warn!("ring buffer full: dropped {} samples", mono.len() - written);
                    }
                },
                |err| error!("audio stream error: {err}"),
                None,
            ),
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _info| {
                    if !flag.load(Ordering::Relaxed) {
                        return;
                    }
                    scratch.clear();
                    scratch.extend(data.iter().map(|&s| s as f32 / I16_SCALE));
                    downmix(&scratch, channels, &mut mono);
                    let written = producer.push_slice(&mono);
                    if written < mono.len() {
                        warn!("ring buffer full: dropped {} samples", mono.len() - written);
                    }
                },
                |err| error!("audio stream error: {err}"),
                None,
            ),
            fmt => {
                return Err(EarshotError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| EarshotError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| EarshotError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
        })
    }

    /// Signal the callback to no-op from its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}
