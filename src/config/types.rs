//! Configuration type definitions.

use crate::constants::{
    DEFAULT_AUDIO_CHANNELS, DEFAULT_BUFFER_SECONDS, DEFAULT_CONFIDENCE_THRESHOLD,
    DEFAULT_FLUSH_INTERVAL_SECS, DEFAULT_H3_RESOLUTION, DEFAULT_LANGUAGE, DEFAULT_OVERLAP,
    DEFAULT_RETRY_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, DEFAULT_SENSITIVITY, DEFAULT_TIMEZONE,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Station identity and audio input settings.
    #[serde(default)]
    pub station: StationConfig,

    /// Detection admission settings.
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Ingest and retry buffer settings.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// eBird regional occurrence filtering.
    #[serde(default)]
    pub ebird_filtering: EbirdFilterConfig,

    /// Notification rules and quiet hours.
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

/// Station identity and audio input settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// PCM input rate in Hz.
    pub sample_rate: u32,

    /// Input channels (1 or 2).
    pub audio_channels: u16,

    /// Analysis window length in seconds.
    pub buffer_size_seconds: u32,

    /// Default latitude when an event omits coordinates.
    pub latitude: Option<f64>,

    /// Default longitude when an event omits coordinates.
    pub longitude: Option<f64>,

    /// Preferred translation language code.
    pub language: String,

    /// IANA timezone name for local-time windowing and quiet hours.
    pub timezone: String,

    /// Root directory for the detection database, reference databases,
    /// eBird packs, and recordings.
    pub data_root: PathBuf,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            audio_channels: DEFAULT_AUDIO_CHANNELS,
            buffer_size_seconds: DEFAULT_BUFFER_SECONDS,
            latitude: None,
            longitude: None,
            language: DEFAULT_LANGUAGE.to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            data_root: PathBuf::from("data"),
        }
    }
}

/// Detection admission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Admit cutoff for detection candidates.
    pub species_confidence_threshold: f64,

    /// Classifier sensitivity, passed through to the model.
    pub sensitivity: f64,

    /// Segment overlap in seconds.
    pub overlap: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            species_confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            sensitivity: DEFAULT_SENSITIVITY,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

/// Ingest and retry buffer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Capacity of the detection retry buffer.
    pub detection_buffer_max_size: usize,

    /// Seconds between retry buffer flushes.
    pub buffer_flush_interval: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            detection_buffer_max_size: DEFAULT_RETRY_BUFFER_SIZE,
            buffer_flush_interval: DEFAULT_FLUSH_INTERVAL_SECS,
        }
    }
}

/// eBird regional occurrence filtering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EbirdFilterConfig {
    /// Master switch for regional filtering.
    pub enabled: bool,

    /// What to do with a blocked-tier detection.
    pub detection_mode: DetectionMode,

    /// Highest occurrence tier that is blocked.
    pub detection_strictness: Strictness,

    /// H3 resolution used for pack lookups.
    pub h3_resolution: u8,

    /// Behavior when a species has no tier entry for the cell.
    pub unknown_species_behavior: UnknownSpeciesBehavior,

    /// Directory holding regional pack files and their registry.
    pub pack_root_dir: PathBuf,
}

impl Default for EbirdFilterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            detection_mode: DetectionMode::Off,
            detection_strictness: Strictness::Vagrant,
            h3_resolution: DEFAULT_H3_RESOLUTION,
            unknown_species_behavior: UnknownSpeciesBehavior::Allow,
            pack_root_dir: PathBuf::from("ebird_packs"),
        }
    }
}

/// Filtering mode for eBird occurrence checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    /// No occurrence checks.
    #[default]
    Off,
    /// Check and log, never block.
    Warn,
    /// Check and block per the strictness matrix.
    Filter,
}

/// eBird occurrence tier, ordered from least to most expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    /// Block only vagrant species.
    Vagrant,
    /// Block vagrant and rare species.
    Rare,
    /// Block vagrant, rare, and uncommon species.
    Uncommon,
    /// Block every tier present in the pack.
    Common,
}

/// Behavior when a species has no tier entry for the cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownSpeciesBehavior {
    /// Admit species absent from the pack.
    #[default]
    Allow,
    /// Block species absent from the pack.
    Block,
}

/// Notification rules and quiet hours.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Ordered notification rules.
    pub rules: Vec<NotificationRule>,

    /// Quiet hours start, `HH:MM:SS` local time. May cross midnight.
    pub quiet_hours_start: Option<String>,

    /// Quiet hours end, `HH:MM:SS` local time.
    pub quiet_hours_end: Option<String>,
}

/// A single notification rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationRule {
    /// Rule name, used in outcomes and logs.
    pub name: String,

    /// Whether the rule is active.
    pub enabled: bool,

    /// Delivery cadence; only immediate rules match per-detection.
    pub frequency: NotificationFrequency,

    /// Minimum confidence in percent (0-100).
    pub minimum_confidence: f64,

    /// Taxa that must contain the detection, when non-empty.
    pub include_taxa: TaxaFilter,

    /// Taxa that suppress the rule; exclusion wins over inclusion.
    pub exclude_taxa: TaxaFilter,

    /// Which detections the rule applies to.
    pub scope: NotificationScope,

    /// Message template; rendered over the fixed detection context.
    pub template: Option<String>,
}

impl Default for NotificationRule {
    fn default() -> Self {
        Self {
            name: String::new(),
            enabled: true,
            frequency: NotificationFrequency::Immediate,
            minimum_confidence: 0.0,
            include_taxa: TaxaFilter::default(),
            exclude_taxa: TaxaFilter::default(),
            scope: NotificationScope::All,
            template: None,
        }
    }
}

/// Delivery cadence for a notification rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationFrequency {
    /// Evaluate against every persisted detection.
    #[default]
    Immediate,
    /// Collected into periodic digests (not matched per-detection).
    Digest,
}

/// Detection scope for a notification rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationScope {
    /// Every matching detection.
    #[default]
    All,
    /// Only the first-ever detection of the species.
    NewEver,
    /// Only the first detection of the species today (station time).
    NewToday,
    /// Only the first detection of the species this week (station time).
    NewThisWeek,
}

/// Taxa sets for rule inclusion/exclusion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxaFilter {
    /// Scientific names.
    pub species: Vec<String>,
    /// Genus names.
    pub genera: Vec<String>,
    /// Family names.
    pub families: Vec<String>,
    /// Order names.
    pub orders: Vec<String>,
}

impl TaxaFilter {
    /// Whether no taxa are listed at any rank.
    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
            && self.genera.is_empty()
            && self.families.is_empty()
            && self.orders.is_empty()
    }
}
