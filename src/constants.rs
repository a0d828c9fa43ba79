//! Shared constants and defaults.

/// Default PCM input rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Default number of input channels.
pub const DEFAULT_AUDIO_CHANNELS: u16 = 1;

/// Default analysis window length in seconds.
pub const DEFAULT_BUFFER_SECONDS: u32 = 3;

/// Default admit cutoff for detection candidates.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Default classifier sensitivity setting.
pub const DEFAULT_SENSITIVITY: f64 = 1.25;

/// Default segment overlap in seconds.
pub const DEFAULT_OVERLAP: f64 = 0.0;

/// Default capacity of the detection retry buffer.
pub const DEFAULT_RETRY_BUFFER_SIZE: usize = 100;

/// Default seconds between retry buffer flushes.
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 5;

/// Default capacity of a live-bus subscriber channel.
pub const DEFAULT_BUS_CAPACITY: usize = 64;

/// Default H3 resolution for eBird pack lookups.
pub const DEFAULT_H3_RESOLUTION: u8 = 5;

/// Default translation language code.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Default station timezone.
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// Default page size for paginated queries.
pub const DEFAULT_PER_PAGE: u32 = 50;

/// Maximum page size for paginated queries.
pub const MAX_PER_PAGE: u32 = 500;
