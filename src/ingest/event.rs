//! Detection ingest wire contract.

use crate::error::{Error, Result};
use crate::utils::time::from_wire_timestamp;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A detection event as submitted to the ingest boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionEvent {
    /// Raw model label, `<scientific>_<common>`.
    pub species_tensor: String,
    /// Scientific name.
    pub scientific_name: String,
    /// Common name.
    pub common_name: String,
    /// Classifier confidence in `[0, 1]`.
    pub confidence: f64,
    /// ISO-8601 timestamp with timezone.
    pub timestamp: String,
    /// Base64-encoded PCM (int16 LE); absent on retry re-submission.
    #[serde(default)]
    pub audio_data: Option<String>,
    /// PCM sample rate in Hz.
    pub sample_rate: u32,
    /// PCM channel count.
    pub channels: u16,
    /// Station latitude, if known.
    #[serde(default)]
    pub latitude: Option<f64>,
    /// Station longitude, if known.
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Admit cutoff in force for this event.
    pub species_confidence_threshold: f64,
    /// ISO week number (1-53).
    pub week: i64,
    /// Classifier sensitivity setting.
    pub sensitivity_setting: f64,
    /// Segment overlap in seconds.
    pub overlap: f64,
}

impl DetectionEvent {
    /// Validate the event at the ingest boundary.
    ///
    /// Validation failures are rejected outright, never buffered.
    pub fn validate(&self) -> Result<()> {
        if self.species_tensor.is_empty() {
            return Err(Error::InvalidEvent {
                message: "species_tensor must not be empty".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::InvalidEvent {
                message: format!("confidence {} outside [0, 1]", self.confidence),
            });
        }
        if self.confidence < self.species_confidence_threshold {
            return Err(Error::InvalidEvent {
                message: format!(
                    "confidence {} below threshold {}",
                    self.confidence, self.species_confidence_threshold
                ),
            });
        }
        if !(1..=53).contains(&self.week) {
            return Err(Error::InvalidEvent {
                message: format!("week {} outside 1..=53", self.week),
            });
        }
        if let Some(lat) = self.latitude
            && !(-90.0..=90.0).contains(&lat)
        {
            return Err(Error::InvalidLatitude { value: lat });
        }
        if let Some(lon) = self.longitude
            && !(-180.0..=180.0).contains(&lon)
        {
            return Err(Error::InvalidLongitude { value: lon });
        }
        self.parsed_timestamp()?;
        Ok(())
    }

    /// Parse the event timestamp into a UTC instant.
    pub fn parsed_timestamp(&self) -> Result<DateTime<Utc>> {
        from_wire_timestamp(&self.timestamp)
    }

    /// Decode the base64 PCM payload, if present.
    pub fn decode_audio(&self) -> Result<Option<Vec<u8>>> {
        self.audio_data
            .as_deref()
            .map(|encoded| {
                BASE64
                    .decode(encoded)
                    .map_err(|e| Error::AudioDecode { source: e })
            })
            .transpose()
    }

    /// Copy of the event without its audio payload, for the retry buffer.
    pub fn without_audio(&self) -> Self {
        Self {
            audio_data: None,
            ..self.clone()
        }
    }
}

/// Business outcome of an ingest call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    /// Persisted and published.
    Accepted,
    /// Dropped by the regional occurrence policy.
    Filtered,
    /// Persistence unavailable; queued for retry.
    Buffered,
}

/// Response returned by the ingest endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutcome {
    /// Business outcome.
    pub status: IngestStatus,
    /// Persisted detection id; only present when accepted.
    pub detection_id: Option<Uuid>,
    /// Human-readable outcome description.
    pub message: String,
}

impl IngestOutcome {
    pub(crate) fn accepted(id: Uuid) -> Self {
        Self {
            status: IngestStatus::Accepted,
            detection_id: Some(id),
            message: "detection persisted".to_string(),
        }
    }

    pub(crate) fn filtered() -> Self {
        Self {
            status: IngestStatus::Filtered,
            detection_id: None,
            message: "detection filtered by regional occurrence policy".to_string(),
        }
    }

    pub(crate) fn buffered() -> Self {
        Self {
            status: IngestStatus::Buffered,
            detection_id: None,
            message: "persistence unavailable, detection buffered for retry".to_string(),
        }
    }
}
