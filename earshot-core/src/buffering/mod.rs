//! Per-stream buffering: the feature frame queue and typed audio chunks.
//!
//! ## Design
//!
//! Feature frames arrive from the extractor in arbitrary batches and are
//! consumed by the decoder in overlapping windows:
//!
//! ```text
//!   pushed ──▶ [ f0 f1 f2 … f11 | f12 … ]
//!               └── window_size ──┘
//!               └ stride ┘ consumed by one decode
//! ```
//!
//! A window is copied out (`window`), then `consume(stride)` drops the
//! frames the decoder will never look at again. The overlap (window - stride)
//! stays queued as right context for the next window.

pub mod chunk;

use std::collections::VecDeque;

use ndarray::Array2;

/// FIFO of fixed-width feature frames stored flat, plus a consumption cursor.
#[derive(Debug, Clone)]
pub struct FeatureQueue {
    dim: usize,
    data: VecDeque<f32>,
    /// Frames consumed since the last cursor reset.
    processed: usize,
}

impl FeatureQueue {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            data: VecDeque::new(),
            processed: 0,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Append one frame. Frames of the wrong width are a programming error.
    pub fn push_frame(&mut self, frame: &[f32]) {
        debug_assert_eq!(frame.len(), self.dim, "feature frame width mismatch");
        self.data.extend(frame.iter().copied());
    }

    /// Number of queued (unconsumed) frames.
    pub fn num_frames(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Frames consumed since the last `reset_processed`.
    pub fn processed(&self) -> usize {
        self.processed
    }

    /// Copy the first `n` frames as an `(n, dim)` matrix without consuming them.
    pub fn window(&self, n: usize) -> Option<Array2<f32>> {
        if n == 0 || n > self.num_frames() {
            return None;
        }
        let flat: Vec<f32> = self.data.iter().take(n * self.dim).copied().collect();
        Array2::from_shape_vec((n, self.dim), flat).ok()
    }

    /// Drop up to `n` frames from the head and advance the cursor.
    /// Returns the number actually consumed.
    pub fn consume(&mut self, n: usize) -> usize {
        let n = n.min(self.num_frames());
        self.data.drain(..n * self.dim);
        self.processed += n;
        n
    }

    /// Restart the processed-frame count. Queued frames are kept.
    pub fn reset_processed(&mut self) {
        self.processed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(dim: usize, v: f32) -> Vec<f32> {
        vec![v; dim]
    }

    #[test]
    fn window_copies_head_without_consuming() {
        let mut q = FeatureQueue::new(3);
        for i in 0..5 {
            q.push_frame(&frame(3, i as f32));
        }
        let w = q.window(2).unwrap();
        assert_eq!(w.shape(), &[2, 3]);
        assert_eq!(w[[0, 0]], 0.0);
        assert_eq!(w[[1, 2]], 1.0);
        assert_eq!(q.num_frames(), 5);
    }

    #[test]
    fn window_larger_than_queue_is_none() {
        let mut q = FeatureQueue::new(2);
        q.push_frame(&frame(2, 1.0));
        assert!(q.window(2).is_none());
        assert!(q.window(0).is_none());
    }

    #[test]
    fn consume_advances_cursor_and_keeps_overlap() {
        let mut q = FeatureQueue::new(1);
        for i in 0..12 {
            q.push_frame(&[i as f32]);
        }
        assert_eq!(q.consume(8), 8);
        assert_eq!(q.num_frames(), 4);
        assert_eq!(q.processed(), 8);
        assert_eq!(q.window(1).unwrap()[[0, 0]], 8.0);

        assert_eq!(q.consume(100), 4);
        assert!(q.is_empty());
        assert_eq!(q.processed(), 12);
    }

    #[test]
    fn reset_processed_keeps_frames() {
        let mut q = FeatureQueue::new(1);
        for _ in 0..10 {
            q.push_frame(&[0.0]);
        }
        q.consume(4);
        q.reset_processed();
        assert_eq!(q.processed(), 0);
        assert_eq!(q.num_frames(), 6);
    }
}
