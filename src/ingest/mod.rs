//! Detection ingest path: wire contract, endpoint, and retry buffer.

mod endpoint;
mod event;
mod retry;

pub use endpoint::IngestEndpoint;
pub use event::{DetectionEvent, IngestOutcome, IngestStatus};
pub use retry::{RetryBuffer, RetryEntry, spawn_flusher};
