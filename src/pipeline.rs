//! Station assembly.
//!
//! Wires the analyzer, ingest endpoint, retry flusher, live bus, query and
//! analytics engines, and the notification matcher into one running
//! pipeline with cooperative shutdown.

use crate::analytics::AnalyticsEngine;
use crate::analyzer::{AnalyzerSettings, AudioAnalyzer, Classifier};
use crate::audio::ClipWriter;
use crate::config::{Config, DataPaths, validate_config};
use crate::db::{AttachManager, DetectionStore};
use crate::ebird::{EbirdFilter, PackRegistry};
use crate::error::{Error, Result};
use crate::ingest::{DetectionEvent, IngestEndpoint, IngestOutcome, RetryBuffer, spawn_flusher};
use crate::live::{DetectionBus, LiveDetection};
use crate::notify::{RuleMatcher, RuleOutcome};
use crate::query::QueryEngine;
use crate::utils::time::{local_day_start, local_week_start};
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A fully wired monitoring pipeline.
pub struct Pipeline {
    analyzer: Option<AudioAnalyzer>,
    endpoint: Arc<IngestEndpoint>,
    query: QueryEngine,
    analytics: AnalyticsEngine,
    shutdown: watch::Sender<bool>,
    flusher: JoinHandle<()>,
    notifier: JoinHandle<()>,
}

impl Pipeline {
    /// Build the pipeline from configuration.
    ///
    /// Without a classifier the analyzer loop is disabled and detections
    /// can only arrive through [`ingest`](Self::ingest) (the sidecar
    /// arrangement, where an external process runs the model).
    pub async fn build(
        config: &Config,
        classifier: Option<Arc<dyn Classifier>>,
    ) -> Result<Self> {
        validate_config(config)?;

        let timezone: Tz = config
            .station
            .timezone
            .parse()
            .map_err(|_| Error::ConfigValidation {
                message: format!("unknown timezone '{}'", config.station.timezone),
            })?;

        let paths = DataPaths::new(&config.station);
        let store = DetectionStore::open(&paths.detection_db()).await?;
        let attach = AttachManager::from_data_paths(&paths);
        let query = QueryEngine::new(&store, attach, config.station.language.clone());
        let analytics = AnalyticsEngine::new(
            store.clone(),
            query.clone(),
            timezone,
            config.detection.species_confidence_threshold,
        );

        let filter = if config.ebird_filtering.enabled {
            // A relative pack root lives under the data root.
            let pack_root = paths.root().join(&config.ebird_filtering.pack_root_dir);
            let registry = PackRegistry::load(&pack_root)?;
            Some(EbirdFilter::new(
                config.ebird_filtering.clone(),
                registry,
                store.pool().clone(),
            ))
        } else {
            None
        };

        let bus = DetectionBus::default();
        let retry = Arc::new(RetryBuffer::new(config.ingest.detection_buffer_max_size));
        let clips = ClipWriter::new(
            paths.recordings_dir(),
            config.station.sample_rate,
            config.station.audio_channels,
        );

        let endpoint = Arc::new(IngestEndpoint::new(
            store,
            clips,
            filter,
            bus,
            Arc::clone(&retry),
            config.station.latitude,
            config.station.longitude,
        ));

        let (shutdown, shutdown_rx) = watch::channel(false);

        let flusher = spawn_flusher(
            retry,
            Arc::clone(&endpoint),
            Duration::from_secs(config.ingest.buffer_flush_interval),
            shutdown_rx.clone(),
        );

        let matcher = RuleMatcher::new(&config.notifications, timezone);
        let notifier = spawn_notifier(
            endpoint.bus().subscribe(),
            query.clone(),
            matcher,
            timezone,
            shutdown_rx,
        );

        let analyzer = classifier.map(|classifier| {
            AudioAnalyzer::new(
                classifier,
                Arc::clone(&endpoint),
                AnalyzerSettings::from(config),
            )
        });

        Ok(Self {
            analyzer,
            endpoint,
            query,
            analytics,
            shutdown,
            flusher,
            notifier,
        })
    }

    /// Feed a PCM chunk to the analyzer loop.
    pub async fn process_chunk(&mut self, bytes: &[u8]) -> Result<()> {
        match self.analyzer.as_mut() {
            Some(analyzer) => {
                analyzer.process_chunk(bytes).await;
                Ok(())
            }
            None => Err(Error::Internal {
                message: "no classifier configured, PCM analysis unavailable".to_string(),
            }),
        }
    }

    /// Ingest a detection event directly (sidecar arrangement).
    pub async fn ingest(&self, event: DetectionEvent) -> Result<IngestOutcome> {
        self.endpoint.ingest(event).await
    }

    /// Subscribe to persisted detections.
    pub fn subscribe(&self) -> broadcast::Receiver<LiveDetection> {
        self.endpoint.bus().subscribe()
    }

    /// The enriched query engine.
    pub fn query(&self) -> &QueryEngine {
        &self.query
    }

    /// The analytics engine.
    pub fn analytics(&self) -> &AnalyticsEngine {
        &self.analytics
    }

    /// Stop the pipeline: the flusher and notifier exit at their next
    /// suspension point; in-flight work completes first.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.flusher.await;
        let _ = self.notifier.await;
        info!("pipeline stopped");
    }
}

/// Evaluate notification rules against each published detection.
///
/// Delivery transports are external; matched rules are logged with their
/// rendered message for the delivery layer to pick up.
fn spawn_notifier(
    mut rx: broadcast::Receiver<LiveDetection>,
    query: QueryEngine,
    matcher: RuleMatcher,
    timezone: Tz,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                event = rx.recv() => {
                    match event {
                        Ok(event) => handle_event(&query, &matcher, timezone, &event).await,
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "notifier lagged behind the live bus");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    })
}

async fn handle_event(
    query: &QueryEngine,
    matcher: &RuleMatcher,
    timezone: Tz,
    event: &LiveDetection,
) {
    let enriched = match query.get_detection(event.id).await {
        Ok(Some(enriched)) => enriched,
        Ok(None) => {
            warn!(id = %event.id, "published detection vanished before rule matching");
            return;
        }
        Err(e) => {
            warn!(id = %event.id, error = %e, "failed to enrich detection for rules");
            return;
        }
    };

    let timestamp = enriched.detection.timestamp;
    let flags = match query
        .scope_flags(
            &enriched.detection.scientific_name,
            timestamp,
            local_day_start(timestamp, timezone),
            local_week_start(timestamp, timezone),
        )
        .await
    {
        Ok(flags) => flags,
        Err(e) => {
            warn!(id = %event.id, error = %e, "failed to compute first-detection flags");
            return;
        }
    };

    for outcome in matcher.evaluate(&enriched, flags) {
        match outcome {
            RuleOutcome::Notify { rule, message } => {
                info!(%rule, %message, "notification");
            }
            RuleOutcome::Deferred { rule } => {
                info!(%rule, "notification deferred (quiet hours)");
            }
        }
    }
}
