//! Audio analyzer loop.
//!
//! Drives the pipeline: accumulate PCM into fixed windows, classify each
//! full window, parse above-threshold labels, and hand candidates to the
//! ingest endpoint. Classifier failures drop the window and keep the
//! analyzer alive.

mod classifier;
pub mod species;

pub use classifier::{Classifier, Prediction, StaticClassifier};

use crate::audio::{AnalysisWindow, PcmRingBuffer};
use crate::config::Config;
use crate::ingest::{DetectionEvent, IngestEndpoint};
use crate::utils::time::{iso_week, to_wire_timestamp};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Analyzer settings resolved from configuration.
#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    /// PCM input rate in Hz.
    pub sample_rate: u32,
    /// PCM channel count.
    pub channels: u16,
    /// Analysis window length in seconds.
    pub window_seconds: u32,
    /// Admit cutoff for candidates.
    pub species_confidence_threshold: f64,
    /// Classifier sensitivity setting.
    pub sensitivity: f64,
    /// Segment overlap in seconds.
    pub overlap: f64,
    /// Station latitude.
    pub latitude: Option<f64>,
    /// Station longitude.
    pub longitude: Option<f64>,
}

impl From<&Config> for AnalyzerSettings {
    fn from(config: &Config) -> Self {
        Self {
            sample_rate: config.station.sample_rate,
            channels: config.station.audio_channels,
            window_seconds: config.station.buffer_size_seconds,
            species_confidence_threshold: config.detection.species_confidence_threshold,
            sensitivity: config.detection.sensitivity,
            overlap: config.detection.overlap,
            latitude: config.station.latitude,
            longitude: config.station.longitude,
        }
    }
}

/// The analysis loop over one PCM stream.
///
/// Single-consumer of its ring buffer; `process_chunk` is called from the
/// audio ingestion task only.
pub struct AudioAnalyzer {
    ring: PcmRingBuffer,
    classifier: Arc<dyn Classifier>,
    endpoint: Arc<IngestEndpoint>,
    settings: AnalyzerSettings,
    windows_processed: u64,
    windows_dropped: u64,
    detections_emitted: u64,
}

impl AudioAnalyzer {
    /// Wire up the analyzer.
    pub fn new(
        classifier: Arc<dyn Classifier>,
        endpoint: Arc<IngestEndpoint>,
        settings: AnalyzerSettings,
    ) -> Self {
        let ring = PcmRingBuffer::new(settings.sample_rate, settings.window_seconds);
        Self {
            ring,
            classifier,
            endpoint,
            settings,
            windows_processed: 0,
            windows_dropped: 0,
            detections_emitted: 0,
        }
    }

    /// Append a PCM chunk and analyze every window that becomes ready.
    pub async fn process_chunk(&mut self, bytes: &[u8]) {
        self.ring.append(bytes);
        while let Some(window) = self.ring.take_window() {
            self.analyze_window(window).await;
        }
    }

    /// Windows dropped to classifier failures.
    pub fn windows_dropped(&self) -> u64 {
        self.windows_dropped
    }

    /// Windows handed to the classifier.
    pub fn windows_processed(&self) -> u64 {
        self.windows_processed
    }

    /// Candidates handed to ingest.
    pub fn detections_emitted(&self) -> u64 {
        self.detections_emitted
    }

    async fn analyze_window(&mut self, window: AnalysisWindow) {
        self.windows_processed += 1;

        let predictions = match self.classifier.classify(&window.samples) {
            Ok(predictions) => predictions,
            Err(e) => {
                self.windows_dropped += 1;
                warn!(error = %e, dropped = self.windows_dropped, "classifier failed, dropping window");
                return;
            }
        };

        let now = Utc::now();
        for prediction in predictions {
            if prediction.confidence < self.settings.species_confidence_threshold {
                continue;
            }

            let parsed = species::parse(&prediction.species_tensor);
            let event = DetectionEvent {
                species_tensor: parsed.species_tensor,
                scientific_name: parsed.scientific_name,
                common_name: parsed.common_name,
                confidence: prediction.confidence,
                timestamp: to_wire_timestamp(now),
                audio_data: Some(BASE64.encode(&window.pcm_bytes)),
                sample_rate: self.settings.sample_rate,
                channels: self.settings.channels,
                latitude: self.settings.latitude,
                longitude: self.settings.longitude,
                species_confidence_threshold: self.settings.species_confidence_threshold,
                week: iso_week(now),
                sensitivity_setting: self.settings.sensitivity,
                overlap: self.settings.overlap,
            };

            match self.endpoint.ingest(event).await {
                Ok(outcome) => {
                    self.detections_emitted += 1;
                    debug!(status = ?outcome.status, "candidate ingested");
                }
                Err(e) => {
                    // Audio save or permanent persistence failure: drop this
                    // detection and keep analyzing.
                    error!(error = %e, "failed to ingest detection");
                }
            }
        }
    }
}
