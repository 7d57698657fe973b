//! Typed audio chunk handed from an audio source to the live driver.

/// A contiguous block of mono PCM samples at a known sample rate.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g. 16000, 44100, 48000).
    pub sample_rate: u32,
}

impl AudioChunk {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Duration of this chunk in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Split a buffer into consecutive chunks of `secs` seconds each.
    /// The last chunk may be shorter.
    pub fn split(
        samples: &[f32],
        sample_rate: u32,
        secs: f32,
    ) -> impl Iterator<Item = AudioChunk> + '_ {
        let len = ((sample_rate as f32 * secs) as usize).max(1);
        samples
            .chunks(len)
            .map(move |c| AudioChunk::new(c.to_vec(), sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_of_tenth_second() {
        let chunk = AudioChunk::new(vec![0.0; 1_600], 16_000);
        assert!((chunk.duration_secs() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn split_covers_every_sample() {
        let samples = vec![0.5f32; 4_000];
        let chunks: Vec<_> = AudioChunk::split(&samples, 16_000, 0.1).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].samples.len(), 1_600);
        assert_eq!(chunks[2].samples.len(), 800);
        assert!(chunks.iter().all(|c| c.sample_rate == 16_000));
    }
}
