//! Configuration loading, types, and validation.

mod file;
mod paths;
mod types;
mod validate;

pub use file::{load_config_file, load_default_config};
pub use paths::{DataPaths, config_dir, config_file_path};
pub use types::{
    Config, DetectionConfig, DetectionMode, EbirdFilterConfig, IngestConfig, NotificationFrequency,
    NotificationRule, NotificationScope, NotificationsConfig, StationConfig, Strictness,
    TaxaFilter, UnknownSpeciesBehavior,
};
pub use validate::validate_config;
