//! Growable first-in first-out queue of interleaved float frames.

/// Interleaved sample FIFO used between pipeline stages.
///
/// Reads advance a head index; storage is compacted lazily once the consumed
/// prefix dominates, so steady-state streaming does not shift memory on every
/// read.
#[derive(Debug, Clone)]
pub struct SampleFifo {
    data: Vec<f32>,
    head: usize,
    channels: usize,
}

impl SampleFifo {
    pub fn new(channels: usize) -> Self {
        Self {
            data: Vec::new(),
            head: 0,
            channels: channels.max(1),
        }
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of complete frames waiting to be read.
    #[inline]
    pub fn frames(&self) -> usize {
        (self.data.len() - self.head) / self.channels
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// Readable samples, interleaved.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data[self.head..]
    }

    pub fn put(&mut self, samples: &[f32]) {
        self.data.extend_from_slice(samples);
    }

    /// Appends `frames` frames of silence.
    pub fn put_silence(&mut self, frames: usize) {
        self.data
            .resize(self.data.len() + frames * self.channels, 0.0);
    }

    /// Drops up to `frames` frames from the front. Returns the count dropped.
    pub fn consume(&mut self, frames: usize) -> usize {
        let n = frames.min(self.frames());
        self.head += n * self.channels;
        if self.head == self.data.len() {
            self.data.clear();
            self.head = 0;
        } else if self.head > 4096 && self.head * 2 > self.data.len() {
            self.data.drain(..self.head);
            self.head = 0;
        }
        n
    }

    /// Moves as many whole frames as fit into `out`. Returns frames moved.
    pub fn receive(&mut self, out: &mut [f32]) -> usize {
        let n = (out.len() / self.channels).min(self.frames());
        let len = n * self.channels;
        out[..len].copy_from_slice(&self.data[self.head..self.head + len]);
        self.consume(n);
        n
    }

    /// Removes frames from the back, keeping at most `frames`.
    pub fn truncate_frames(&mut self, frames: usize) {
        if frames < self.frames() {
            self.data.truncate(self.head + frames * self.channels);
        }
    }

    /// Drains everything into `out`.
    pub fn drain_into(&mut self, out: &mut Vec<f32>) {
        out.extend_from_slice(&self.data[self.head..]);
        self.clear();
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.head = 0;
    }
}
