//! PCM buffering and clip persistence.

mod clip;
mod ring_buffer;

pub use clip::{ClipMeta, ClipWriter};
pub use ring_buffer::{AnalysisWindow, PcmRingBuffer};
