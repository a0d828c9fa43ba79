//! Fixed-window PCM accumulation.

use std::collections::VecDeque;

/// One drained analysis window.
///
/// Carries both the normalized float samples handed to the classifier and
/// the original little-endian int16 bytes persisted as the audio clip.
#[derive(Debug, Clone)]
pub struct AnalysisWindow {
    /// Samples scaled to `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// The window's raw PCM bytes (int16 LE).
    pub pcm_bytes: Vec<u8>,
}

/// Accumulates little-endian int16 PCM into non-overlapping analysis
/// windows of `sample_rate × window_seconds` samples.
///
/// Single-producer, single-consumer: the audio ingestion task appends,
/// the analyzer drains.
#[derive(Debug)]
pub struct PcmRingBuffer {
    samples: VecDeque<i16>,
    window_samples: usize,
    /// A trailing odd byte, held until its partner arrives.
    pending_byte: Option<u8>,
}

impl PcmRingBuffer {
    /// Create a buffer holding `sample_rate × window_seconds` samples per window.
    pub fn new(sample_rate: u32, window_seconds: u32) -> Self {
        let window_samples = (sample_rate as usize) * (window_seconds as usize);
        Self {
            samples: VecDeque::with_capacity(window_samples),
            window_samples,
            pending_byte: None,
        }
    }

    /// Number of samples in one analysis window.
    pub fn window_samples(&self) -> usize {
        self.window_samples
    }

    /// Append raw PCM bytes (little-endian int16).
    pub fn append(&mut self, bytes: &[u8]) {
        let mut iter = bytes.iter().copied();

        if let Some(low) = self.pending_byte.take() {
            match iter.next() {
                Some(high) => self.samples.push_back(i16::from_le_bytes([low, high])),
                None => {
                    self.pending_byte = Some(low);
                    return;
                }
            }
        }

        loop {
            match (iter.next(), iter.next()) {
                (Some(low), Some(high)) => {
                    self.samples.push_back(i16::from_le_bytes([low, high]));
                }
                (Some(low), None) => {
                    self.pending_byte = Some(low);
                    break;
                }
                _ => break,
            }
        }
    }

    /// Whether a full analysis window is buffered.
    pub fn ready(&self) -> bool {
        self.samples.len() >= self.window_samples
    }

    /// Atomically drain one window's worth of samples, if available.
    ///
    /// Windows do not overlap; samples left behind begin the next window.
    pub fn take_window(&mut self) -> Option<AnalysisWindow> {
        if !self.ready() {
            return None;
        }

        let mut samples = Vec::with_capacity(self.window_samples);
        let mut pcm_bytes = Vec::with_capacity(self.window_samples * 2);
        for _ in 0..self.window_samples {
            // Length checked above; drain is element-by-element to keep the
            // deque's remaining contents in place.
            if let Some(sample) = self.samples.pop_front() {
                samples.push(f32::from(sample) / 32_768.0);
                pcm_bytes.extend_from_slice(&sample.to_le_bytes());
            }
        }

        Some(AnalysisWindow { samples, pcm_bytes })
    }

    /// Buffered sample count (excluding any pending odd byte).
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no complete samples are buffered.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
