//! Detection ingest endpoint.
//!
//! Validates incoming events, persists their audio clip, consults the
//! regional occurrence filter, writes the detection transactionally, and
//! fans the persisted row out on the live bus. Transient persistence
//! failures land in the retry buffer; validation and permanent failures
//! never do.

use crate::audio::{ClipMeta, ClipWriter};
use crate::db::{AudioFile, Detection, DetectionStore};
use crate::ebird::{EbirdFilter, FilterDecision};
use crate::error::Result;
use crate::ingest::event::{DetectionEvent, IngestOutcome};
use crate::ingest::retry::{RetryBuffer, RetryEntry};
use crate::live::DetectionBus;
use crate::utils::time::hour_epoch;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Ingest endpoint shared by the analyzer and the retry flusher.
pub struct IngestEndpoint {
    store: DetectionStore,
    clips: ClipWriter,
    filter: Option<EbirdFilter>,
    bus: DetectionBus,
    retry: Arc<RetryBuffer>,
    default_latitude: Option<f64>,
    default_longitude: Option<f64>,
}

impl IngestEndpoint {
    /// Wire up the endpoint.
    pub fn new(
        store: DetectionStore,
        clips: ClipWriter,
        filter: Option<EbirdFilter>,
        bus: DetectionBus,
        retry: Arc<RetryBuffer>,
        default_latitude: Option<f64>,
        default_longitude: Option<f64>,
    ) -> Self {
        Self {
            store,
            clips,
            filter,
            bus,
            retry,
            default_latitude,
            default_longitude,
        }
    }

    /// The live bus detections are published on.
    pub fn bus(&self) -> &DetectionBus {
        &self.bus
    }

    /// The retry buffer fed by transient failures.
    pub fn retry_buffer(&self) -> &Arc<RetryBuffer> {
        &self.retry
    }

    /// Ingest one detection event.
    ///
    /// Returns the business outcome (`accepted` / `filtered` / `buffered`).
    /// Validation failures and permanent persistence failures surface as
    /// errors and are never buffered.
    pub async fn ingest(&self, event: DetectionEvent) -> Result<IngestOutcome> {
        event.validate()?;

        // Clip persistence happens before anything else; a station that
        // cannot write audio has no business accepting the detection.
        let clip = match event.decode_audio()? {
            Some(pcm) => Some(self.clips.write_clip(
                &event.scientific_name,
                event.parsed_timestamp()?,
                &pcm,
            )?),
            None => None,
        };

        match self.persist_and_publish(&event, clip.as_ref()).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_transient_persistence() => {
                warn!(
                    species = %event.scientific_name,
                    error = %e,
                    "persistence unavailable, buffering detection"
                );
                self.retry.push(RetryEntry {
                    event: event.without_audio(),
                    clip,
                });
                Ok(IngestOutcome::buffered())
            }
            Err(e) => {
                error!(
                    species = %event.scientific_name,
                    error = %e,
                    "permanent persistence failure, dropping detection"
                );
                Err(e)
            }
        }
    }

    /// Re-ingest a buffered entry.
    ///
    /// Unlike [`ingest`](Self::ingest), failures propagate to the caller so
    /// the flusher can re-append the entry itself.
    pub async fn retry_ingest(&self, entry: &RetryEntry) -> Result<IngestOutcome> {
        entry.event.validate()?;
        self.persist_and_publish(&entry.event, entry.clip.as_ref())
            .await
    }

    /// Filter, persist, and publish a validated event.
    async fn persist_and_publish(
        &self,
        event: &DetectionEvent,
        clip: Option<&ClipMeta>,
    ) -> Result<IngestOutcome> {
        let timestamp = event.parsed_timestamp()?;
        let latitude = event.latitude.or(self.default_latitude);
        let longitude = event.longitude.or(self.default_longitude);

        if let Some(filter) = &self.filter {
            let decision = filter
                .evaluate(&event.scientific_name, latitude, longitude)
                .await;
            if let FilterDecision::Block(tier) = decision {
                info!(
                    species = %event.scientific_name,
                    ?tier,
                    "detection filtered by regional occurrence policy"
                );
                return Ok(IngestOutcome::filtered());
            }
        }

        let audio = clip.map(|clip| AudioFile {
            id: Uuid::new_v4(),
            file_path: clip.relative_path.to_string_lossy().into_owned(),
            duration: clip.duration,
            size_bytes: clip.size_bytes,
            recording_start: clip.recording_start,
        });

        let detection = Detection {
            id: Uuid::new_v4(),
            species_tensor: event.species_tensor.clone(),
            scientific_name: event.scientific_name.clone(),
            common_name: event.common_name.clone(),
            confidence: event.confidence,
            timestamp,
            audio_file_id: audio.as_ref().map(|audio| audio.id),
            latitude,
            longitude,
            species_confidence_threshold: event.species_confidence_threshold,
            week: event.week,
            sensitivity_setting: event.sensitivity_setting,
            overlap: event.overlap,
            hour_epoch: Some(hour_epoch(timestamp)),
        };

        self.store
            .insert_detection(&detection, audio.as_ref())
            .await?;

        // Subscribers only ever see committed rows.
        self.bus.publish(&detection);

        Ok(IngestOutcome::accepted(detection.id))
    }
}
