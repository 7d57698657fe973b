//! Caller loops built on the stream protocol.
//!
//! ## Batch (`decode_batch`)
//!
//! ```text
//! 1. accept the whole signal
//! 2. accept TAIL_PADDING_SECS of silence so the last words clear the lookahead
//! 3. input_finished
//! 4. while is_ready → decode
//! 5. one final result
//! ```
//!
//! ## Live (`LiveSegmenter`)
//!
//! ```text
//! per chunk (~0.1 s):
//! 1. accept the chunk
//! 2. while is_ready → decode
//! 3. text changed           → partial SegmentEvent
//! 4. is_endpoint            → final SegmentEvent (if text), reset, next segment
//! finish():
//! 5. tail padding, input_finished, drain → last final SegmentEvent (if text)
//! ```

use tracing::{debug, info};

use super::{Recognizer, Stream};
use crate::buffering::chunk::AudioChunk;
use crate::error::Result;
use crate::inference::TransducerModel;
use crate::result::{RecognitionResult, SegmentEvent};

/// Silence appended after the last real sample.
pub const TAIL_PADDING_SECS: f32 = 0.3;

/// Chunk length the live loop is tuned for.
pub const LIVE_CHUNK_SECS: f32 = 0.1;

fn push_tail_padding<M: TransducerModel>(
    stream: &mut Stream<'_, M>,
    sample_rate: u32,
) -> Result<()> {
    let tail = vec![0.0f32; (sample_rate as f32 * TAIL_PADDING_SECS) as usize];
    stream.accept_waveform(sample_rate, &tail)
}

/// Decode a complete recording on a fresh stream.
pub fn decode_batch<M: TransducerModel>(
    recognizer: &Recognizer<M>,
    samples: &[f32],
    sample_rate: u32,
) -> Result<RecognitionResult> {
    let mut stream = recognizer.create_stream();
    stream.accept_waveform(sample_rate, samples)?;
    push_tail_padding(&mut stream, sample_rate)?;
    stream.input_finished();

    let windows = recognizer.drain(&mut stream)?;
    let result = recognizer.get_result(&stream);
    info!(
        samples = samples.len(),
        sample_rate,
        windows,
        text = %result.text,
        "batch decode finished"
    );
    Ok(result)
}

/// Counters for one live session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmenterStats {
    pub chunks: usize,
    pub windows_decoded: usize,
    pub endpoints: usize,
    /// Endpoints that closed a non-empty segment.
    pub segments: usize,
}

/// Splits a live stream into utterances at endpoints.
pub struct LiveSegmenter<'r, M: TransducerModel> {
    recognizer: &'r Recognizer<M>,
    stream: Stream<'r, M>,
    segment: u32,
    last_text: String,
    last_sample_rate: Option<u32>,
    stats: SegmenterStats,
}

impl<'r, M: TransducerModel> LiveSegmenter<'r, M> {
    pub fn new(recognizer: &'r Recognizer<M>) -> Self {
        Self {
            recognizer,
            stream: recognizer.create_stream(),
            segment: 0,
            last_text: String::new(),
            last_sample_rate: None,
            stats: SegmenterStats::default(),
        }
    }

    pub fn stats(&self) -> SegmenterStats {
        self.stats
    }

    /// Index of the segment currently being recognized.
    pub fn segment(&self) -> u32 {
        self.segment
    }

    pub fn stream(&self) -> &Stream<'r, M> {
        &self.stream
    }

    /// Feed one chunk and report what changed.
    pub fn accept(&mut self, chunk: &AudioChunk) -> Result<Vec<SegmentEvent>> {
        self.stream.accept_waveform(chunk.sample_rate, &chunk.samples)?;
        self.last_sample_rate = Some(chunk.sample_rate);
        self.stats.chunks += 1;
        self.stats.windows_decoded += self.recognizer.drain(&mut self.stream)?;

        let mut events = Vec::new();
        let text = self.recognizer.get_result(&self.stream).text;
        if text != self.last_text {
            events.push(SegmentEvent {
                segment: self.segment,
                text: text.clone(),
                is_final: false,
            });
            self.last_text = text;
        }

        if self.recognizer.is_endpoint(&self.stream) {
            self.stats.endpoints += 1;
            if !self.last_text.is_empty() {
                events.push(self.close_segment());
            }
            self.recognizer.reset(&mut self.stream);
            self.last_text.clear();
            debug!(segment = self.segment, "endpoint, stream reset");
        }
        Ok(events)
    }

    fn close_segment(&mut self) -> SegmentEvent {
        let event = SegmentEvent {
            segment: self.segment,
            text: self.last_text.clone(),
            is_final: true,
        };
        info!(segment = self.segment, text = %event.text, "segment finished");
        self.segment += 1;
        self.stats.segments += 1;
        event
    }

    /// Flush the remaining audio and close the last segment.
    pub fn finish(mut self) -> Result<(Vec<SegmentEvent>, SegmenterStats)> {
        let sample_rate = self
            .last_sample_rate
            .unwrap_or(self.recognizer.config().feature.sample_rate);
        push_tail_padding(&mut self.stream, sample_rate)?;
        self.stream.input_finished();
        self.stats.windows_decoded += self.recognizer.drain(&mut self.stream)?;

        let mut events = Vec::new();
        self.last_text = self.recognizer.get_result(&self.stream).text;
        if !self.last_text.is_empty() {
            events.push(self.close_segment());
        }
        info!(
            chunks = self.stats.chunks,
            windows = self.stats.windows_decoded,
            segments = self.stats.segments,
            "live session finished"
        );
        Ok((events, self.stats))
    }
}

/// Run a recording through the live loop in `LIVE_CHUNK_SECS` chunks.
pub fn segment_recording<M: TransducerModel>(
    recognizer: &Recognizer<M>,
    samples: &[f32],
    sample_rate: u32,
) -> Result<Vec<SegmentEvent>> {
    let mut segmenter = LiveSegmenter::new(recognizer);
    let mut events = Vec::new();
    for chunk in AudioChunk::split(samples, sample_rate, LIVE_CHUNK_SECS) {
        events.extend(segmenter.accept(&chunk)?);
    }
    let (tail, _) = segmenter.finish()?;
    events.extend(tail);
    Ok(events)
}
