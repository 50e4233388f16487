use ringbuf::{traits::*, HeapRb};

/// Fixed-capacity ring of audio frames, oldest evicted first.
///
/// Holds the frames just before speech onset so an utterance does not start
/// clipped.
pub struct FrameRing {
    /// `None` when no padding is kept
    frames: Option<HeapRb<Vec<f32>>>,
}

impl FrameRing {
    /// Create a ring holding at most `capacity` frames. A zero capacity keeps
    /// nothing.
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: (capacity > 0).then(|| HeapRb::new(capacity)),
        }
    }

    pub fn push(&mut self, frame: &[f32]) {
        if let Some(frames) = self.frames.as_mut() {
            frames.push_overwrite(frame.to_vec());
        }
    }

    /// Take every buffered frame, oldest first, as one sample run.
    pub fn drain_samples(&mut self) -> Vec<f32> {
        let mut samples = Vec::new();
        if let Some(frames) = self.frames.as_mut() {
            while let Some(frame) = frames.try_pop() {
                samples.extend_from_slice(&frame);
            }
        }
        samples
    }

    /// Number of buffered frames
    pub fn len(&self) -> usize {
        self.frames.as_ref().map_or(0, |f| f.occupied_len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        if let Some(frames) = self.frames.as_mut() {
            frames.clear();
        }
    }

    pub fn capacity(&self) -> usize {
        self.frames.as_ref().map_or(0, |f| f.capacity().get())
    }
}
