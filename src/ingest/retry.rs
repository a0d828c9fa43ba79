//! Detection retry buffer.
//!
//! A bounded FIFO of detections whose persistence failed transiently. A
//! background flusher drains the buffer every flush interval and re-issues
//! each entry through the ingest endpoint; entries that fail again are
//! re-appended in their original relative order. The buffer lives only in
//! memory and is not persisted across process exits.

use crate::audio::ClipMeta;
use crate::ingest::endpoint::IngestEndpoint;
use crate::ingest::event::DetectionEvent;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One buffered detection awaiting re-ingest.
///
/// The audio payload is not retained; the clip was already written before
/// persistence failed, so only its metadata rides along.
#[derive(Debug, Clone)]
pub struct RetryEntry {
    /// The original event, audio payload stripped.
    pub event: DetectionEvent,
    /// Metadata of the already-written clip, if one exists.
    pub clip: Option<ClipMeta>,
}

/// Bounded FIFO of pending detections.
///
/// Multi-producer (ingest failures), single-consumer (the flusher).
#[derive(Debug)]
pub struct RetryBuffer {
    entries: Mutex<VecDeque<RetryEntry>>,
    max_size: usize,
}

impl RetryBuffer {
    /// Create a buffer holding at most `max_size` entries.
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(max_size)),
            max_size,
        }
    }

    /// Append an entry, evicting the oldest when full.
    pub fn push(&self, entry: RetryEntry) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        if entries.len() >= self.max_size {
            if let Some(evicted) = entries.pop_front() {
                warn!(
                    species = %evicted.event.scientific_name,
                    "retry buffer full, evicting oldest entry"
                );
            }
        }
        entries.push_back(entry);
    }

    /// Atomically drain every entry in FIFO order.
    pub fn drain_all(&self) -> Vec<RetryEntry> {
        self.entries
            .lock()
            .map(|mut entries| entries.drain(..).collect())
            .unwrap_or_default()
    }

    /// Re-append entries that failed a flush cycle, preserving their order.
    pub fn extend_back(&self, failed: Vec<RetryEntry>) {
        for entry in failed {
            self.push(entry);
        }
    }

    /// Current entry count.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One flush cycle: drain everything, re-ingest in order, re-append failures.
pub(crate) async fn flush_cycle(buffer: &RetryBuffer, endpoint: &IngestEndpoint) {
    let pending = buffer.drain_all();
    if pending.is_empty() {
        return;
    }
    debug!(count = pending.len(), "flushing retry buffer");

    let mut failed = Vec::new();
    for entry in pending {
        match endpoint.retry_ingest(&entry).await {
            Ok(outcome) => {
                debug!(
                    species = %entry.event.scientific_name,
                    status = ?outcome.status,
                    "retry flush entry completed"
                );
            }
            Err(e) => {
                warn!(
                    species = %entry.event.scientific_name,
                    error = %e,
                    "retry flush entry failed, keeping"
                );
                failed.push(entry);
            }
        }
    }
    buffer.extend_back(failed);
}

/// Spawn the background flusher.
///
/// Runs a cycle every `flush_interval`; the shutdown signal is honored
/// between cycles, never mid-cycle.
pub fn spawn_flusher(
    buffer: Arc<RetryBuffer>,
    endpoint: Arc<IngestEndpoint>,
    flush_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + flush_interval;
        let mut ticker = tokio::time::interval_at(start, flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    flush_cycle(&buffer, &endpoint).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!(remaining = buffer.len(), "retry flusher stopping");
                        break;
                    }
                }
            }
        }
    })
}
