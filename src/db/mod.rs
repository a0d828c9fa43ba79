//! Detection database: schema, store, models, and reference attachment.

mod attach;
mod models;
mod schema;
mod store;

pub use attach::{AttachManager, AttachSource, AttachedSet};
pub use models::{
    AudioFile, Detection, HourlyCount, SpeciesCount, StorageMetrics, TopSpeciesRow, Weather,
};
pub use store::DetectionStore;

pub(crate) use store::detection_from_row;
