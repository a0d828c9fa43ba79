//! Enriched cross-database detection queries.

mod engine;
mod envelope;
mod filters;

pub use engine::QueryEngine;
pub use envelope::{
    EnrichedDetection, FamilySummaryRow, PeriodSpeciesCounts, ScopeFlags, SpeciesSummaryRow,
    WeatherSeries, WindowSpecies,
};
pub use filters::{BestRecordingsQuery, DetectionQuery, OrderBy, TemporalResolution};
