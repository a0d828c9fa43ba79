//! Live detection fan-out.
//!
//! Single-publisher, many-subscriber broadcast of persisted detections.
//! Publishing never blocks: a subscriber that falls behind its bounded
//! channel loses its oldest events, for that subscriber only.

use crate::constants::DEFAULT_BUS_CAPACITY;
use crate::db::Detection;
use crate::utils::time::to_wire_timestamp;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// The stable serialized envelope delivered to live subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveDetection {
    /// Detection id.
    pub id: uuid::Uuid,
    /// Scientific name.
    pub scientific_name: String,
    /// Common name.
    pub common_name: String,
    /// Classifier confidence.
    pub confidence: f64,
    /// Station latitude, if known.
    pub latitude: Option<f64>,
    /// Station longitude, if known.
    pub longitude: Option<f64>,
    /// RFC3339 UTC timestamp with a trailing `Z`.
    pub timestamp: String,
}

impl From<&Detection> for LiveDetection {
    fn from(detection: &Detection) -> Self {
        Self {
            id: detection.id,
            scientific_name: detection.scientific_name.clone(),
            common_name: detection.common_name.clone(),
            confidence: detection.confidence,
            latitude: detection.latitude,
            longitude: detection.longitude,
            timestamp: to_wire_timestamp(detection.timestamp),
        }
    }
}

/// Broadcast bus for persisted detections.
#[derive(Debug, Clone)]
pub struct DetectionBus {
    tx: broadcast::Sender<LiveDetection>,
}

impl Default for DetectionBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl DetectionBus {
    /// Create a bus whose subscriber channels hold `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to future detections.
    pub fn subscribe(&self) -> broadcast::Receiver<LiveDetection> {
        self.tx.subscribe()
    }

    /// Publish a persisted detection to all live subscribers.
    ///
    /// A send with no subscribers is not an error.
    pub fn publish(&self, detection: &Detection) {
        let event = LiveDetection::from(detection);
        match self.tx.send(event) {
            Ok(count) => debug!(subscribers = count, "published detection"),
            Err(_) => debug!("no live subscribers"),
        }
    }

    /// Current number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_detection() -> Detection {
        Detection {
            id: Uuid::new_v4(),
            species_tensor: "Corvus corax_Common Raven".to_string(),
            scientific_name: "Corvus corax".to_string(),
            common_name: "Common Raven".to_string(),
            confidence: 0.91,
            timestamp: Utc.with_ymd_and_hms(2025, 1, 2, 10, 0, 0).unwrap(),
            audio_file_id: None,
            latitude: Some(60.17),
            longitude: Some(24.94),
            species_confidence_threshold: 0.7,
            week: 1,
            sensitivity_setting: 1.25,
            overlap: 0.0,
            hour_epoch: Some(482_170),
        }
    }

    #[tokio::test]
    async fn test_subscriber_receives_published_event() {
        let bus = DetectionBus::new(8);
        let mut rx = bus.subscribe();

        let detection = sample_detection();
        bus.publish(&detection);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.id, detection.id);
        assert_eq!(event.scientific_name, "Corvus corax");
        assert!(event.timestamp.ends_with('Z'));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_does_not_block_or_error() {
        let bus = DetectionBus::new(2);
        for _ in 0..10 {
            bus.publish(&sample_detection());
        }
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_subscriber_drops_oldest_only() {
        let bus = DetectionBus::new(2);
        let mut rx = bus.subscribe();

        for _ in 0..5 {
            bus.publish(&sample_detection());
        }

        // The lagged receiver reports the overflow, then sees the newest
        // retained events.
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
        assert!(rx.recv().await.is_ok());
    }

    #[test]
    fn test_envelope_serialization_shape() {
        let detection = sample_detection();
        let event = LiveDetection::from(&detection);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["timestamp"], "2025-01-02T10:00:00Z");
        assert_eq!(json["confidence"], 0.91);
        assert!(json.get("species_tensor").is_none());
    }
}
