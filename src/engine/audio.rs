//! Bounded queue of generated audio frames.

use std::collections::VecDeque;

/// Size of one interleaved 16-bit stereo frame in bytes.
pub const FRAME_BYTES: usize = 4;

/// FIFO of stereo frames produced by the engine and drained by the host.
///
/// When full, new frames are dropped and counted; engines that honour
/// `StopReason::AUDIO_OVERRUN` stop before that happens.
#[derive(Debug, Clone)]
pub struct AudioQueue {
    frames: VecDeque<[i16; 2]>,
    capacity: usize,
    dropped: u64,
}

impl AudioQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.frames.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames lost because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Queue a frame. Returns `false` (and drops it) when full.
    pub fn push(&mut self, left: i16, right: i16) -> bool {
        if self.is_full() {
            self.dropped += 1;
            return false;
        }
        self.frames.push_back([left, right]);
        true
    }

    /// Move as many whole frames as fit into `buffer`, oldest first.
    ///
    /// Each frame is written as left then right, both little-endian `i16`.
    pub fn read_16bit_stereo(&mut self, buffer: &mut [u8]) -> usize {
        let count = (buffer.len() / FRAME_BYTES).min(self.frames.len());
        for (chunk, [left, right]) in buffer
            .chunks_exact_mut(FRAME_BYTES)
            .zip(self.frames.drain(..count))
        {
            chunk[0..2].copy_from_slice(&left.to_le_bytes());
            chunk[2..4].copy_from_slice(&right.to_le_bytes());
        }
        count
    }

    /// Drop up to `count` frames from the front of the queue.
    pub fn advance(&mut self, count: usize) -> usize {
        let count = count.min(self.frames.len());
        self.frames.drain(..count);
        count
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
