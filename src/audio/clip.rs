//! Audio clip persistence.
//!
//! Clips are WAV files written under
//! `<recordings_root>/<scientific_name>/<YYYYMMDD_HHMMSS>.wav`. The
//! detection row stores the path relative to the recordings root.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Metadata for a persisted clip, recorded alongside the detection.
#[derive(Debug, Clone)]
pub struct ClipMeta {
    /// Path relative to the recordings root.
    pub relative_path: PathBuf,
    /// Clip duration in seconds.
    pub duration: f64,
    /// File size in bytes.
    pub size_bytes: i64,
    /// Recording start instant.
    pub recording_start: DateTime<Utc>,
}

/// Writes detection clips under a recordings root.
#[derive(Debug, Clone)]
pub struct ClipWriter {
    root: PathBuf,
    sample_rate: u32,
    channels: u16,
}

impl ClipWriter {
    /// Create a writer for the given recordings root and PCM parameters.
    pub fn new(root: PathBuf, sample_rate: u32, channels: u16) -> Self {
        Self {
            root,
            sample_rate,
            channels,
        }
    }

    /// Write raw int16 LE PCM as a WAV clip for one detection.
    #[allow(clippy::cast_precision_loss)]
    pub fn write_clip(
        &self,
        scientific_name: &str,
        recording_start: DateTime<Utc>,
        pcm_bytes: &[u8],
    ) -> Result<ClipMeta> {
        let relative_path = clip_relative_path(scientific_name, recording_start);
        let full_path = self.root.join(&relative_path);

        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::RecordingDirCreate {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer =
            hound::WavWriter::create(&full_path, spec).map_err(|e| Error::ClipWrite {
                path: full_path.clone(),
                source: e,
            })?;

        for pair in pcm_bytes.chunks_exact(2) {
            let sample = i16::from_le_bytes([pair[0], pair[1]]);
            writer.write_sample(sample).map_err(|e| Error::ClipWrite {
                path: full_path.clone(),
                source: e,
            })?;
        }

        writer.finalize().map_err(|e| Error::ClipWrite {
            path: full_path.clone(),
            source: e,
        })?;

        let size_bytes = std::fs::metadata(&full_path)?.len();
        let sample_count = pcm_bytes.len() / 2;
        let duration = sample_count as f64
            / (f64::from(self.sample_rate) * f64::from(self.channels));

        Ok(ClipMeta {
            relative_path,
            duration,
            size_bytes: i64::try_from(size_bytes).unwrap_or(i64::MAX),
            recording_start,
        })
    }

    /// Absolute path for a stored relative clip path.
    pub fn resolve(&self, relative_path: &Path) -> PathBuf {
        self.root.join(relative_path)
    }
}

/// Relative clip path: `<scientific_name>/<YYYYMMDD_HHMMSS>.wav`.
///
/// Spaces in the scientific name become underscores so the per-species
/// directory is shell-friendly.
fn clip_relative_path(scientific_name: &str, recording_start: DateTime<Utc>) -> PathBuf {
    let species_dir: String = scientific_name
        .chars()
        .map(|c| if c == ' ' || c == '/' { '_' } else { c })
        .collect();
    let file_name = format!("{}.wav", recording_start.format("%Y%m%d_%H%M%S"));
    PathBuf::from(species_dir).join(file_name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_clip_relative_path_layout() {
        let start = Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap();
        let path = clip_relative_path("Turdus migratorius", start);
        assert_eq!(
            path,
            PathBuf::from("Turdus_migratorius/20250314_092653.wav")
        );
    }

    #[test]
    fn test_write_clip_creates_file_and_meta() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ClipWriter::new(dir.path().to_path_buf(), 48_000, 1);
        let start = Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap();

        let bytes = pcm(&vec![100i16; 48_000]);
        let meta = writer
            .write_clip("Turdus migratorius", start, &bytes)
            .unwrap();

        assert_eq!(meta.duration, 1.0);
        assert!(meta.size_bytes > 0);
        let full = writer.resolve(&meta.relative_path);
        assert!(full.exists());

        let reader = hound::WavReader::open(full).unwrap();
        assert_eq!(reader.spec().sample_rate, 48_000);
        assert_eq!(reader.len(), 48_000);
    }

    #[test]
    fn test_write_clip_stereo_duration() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ClipWriter::new(dir.path().to_path_buf(), 48_000, 2);
        let start = Utc.with_ymd_and_hms(2025, 3, 14, 10, 0, 0).unwrap();

        // 96000 interleaved samples at 48kHz stereo is one second.
        let bytes = pcm(&vec![0i16; 96_000]);
        let meta = writer.write_clip("Corvus corax", start, &bytes).unwrap();
        assert_eq!(meta.duration, 1.0);
    }
}
