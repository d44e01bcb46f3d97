//! Latest-frame sample buffer
//!
//! The audio callback writes into a fixed-size ring that overwrites its oldest
//! samples, and the meter copies out the most recent frame whenever it ticks.
//! There is no queue: a slow reader simply sees newer audio, never a backlog.

use parking_lot::Mutex;
use std::sync::Arc;

/// Fixed-size overwrite ring holding the most recent mono samples
pub struct FrameBuffer {
    /// Sample storage, `capacity` long
    samples: Vec<f32>,

    /// Next write position
    write_pos: usize,

    /// Number of valid samples (saturates at capacity)
    filled: usize,

    /// Total samples ever written
    total_written: u64,
}

impl FrameBuffer {
    /// Create a buffer holding `capacity` samples
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity.max(1)],
            write_pos: 0,
            filled: 0,
            total_written: 0,
        }
    }

    /// Append samples, overwriting the oldest ones once full
    pub fn push_samples(&mut self, data: &[f32]) {
        let capacity = self.samples.len();

        // Only the tail can survive when one callback delivers more than a frame
        let data = if data.len() > capacity {
            &data[data.len() - capacity..]
        } else {
            data
        };

        for &sample in data {
            self.samples[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % capacity;
        }

        self.filled = (self.filled + data.len()).min(capacity);
        self.total_written += data.len() as u64;
    }

    /// Copy the most recent `out.len()` samples in chronological order
    ///
    /// Positions not yet written are zero, so a freshly opened device reads
    /// as silence.
    pub fn copy_latest(&self, out: &mut [f32]) {
        out.fill(0.0);

        let capacity = self.samples.len();
        let wanted = out.len().min(self.filled);
        let offset = out.len() - wanted;

        // Oldest of the wanted samples sits `wanted` positions behind the writer
        let start = (self.write_pos + capacity - wanted) % capacity;
        for (i, slot) in out[offset..].iter_mut().enumerate() {
            *slot = self.samples[(start + i) % capacity];
        }
    }

    /// Get buffer capacity
    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Number of valid samples currently held
    pub fn len(&self) -> usize {
        self.filled
    }

    /// Check if nothing has been written yet
    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Total samples written since creation or the last clear
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Forget all samples
    pub fn clear(&mut self) {
        self.samples.fill(0.0);
        self.write_pos = 0;
        self.filled = 0;
        self.total_written = 0;
    }
}

/// Thread-safe handle to a frame buffer
pub type SharedFrameBuffer = Arc<Mutex<FrameBuffer>>;

/// Create a new shared frame buffer
pub fn create_shared_buffer(capacity: usize) -> SharedFrameBuffer {
    Arc::new(Mutex::new(FrameBuffer::new(capacity)))
}

/// Downmix interleaved input to mono while converting each sample to f32
pub fn append_downmixed_samples<T, F>(buf: &mut Vec<f32>, data: &[T], channels: usize, mut convert: F)
where
    T: Copy,
    F: FnMut(T) -> f32,
{
    if channels <= 1 {
        buf.extend(data.iter().copied().map(&mut convert));
        return;
    }

    for frame in data.chunks(channels) {
        let sum: f32 = frame.iter().copied().map(&mut convert).sum();
        buf.push(sum / frame.len() as f32);
    }
}
