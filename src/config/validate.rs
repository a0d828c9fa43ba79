//! Configuration validation.

use crate::config::Config;
use crate::error::{Error, Result};
use chrono::NaiveTime;

/// Validate a loaded configuration before the pipeline starts.
///
/// Catches values that would otherwise surface as runtime failures deep in
/// the pipeline: out-of-range thresholds, unknown timezones, malformed
/// quiet hours, degenerate buffer sizes.
pub fn validate_config(config: &Config) -> Result<()> {
    let station = &config.station;

    if station.sample_rate == 0 {
        return Err(Error::ConfigValidation {
            message: "sample_rate must be positive".to_string(),
        });
    }

    if !matches!(station.audio_channels, 1 | 2) {
        return Err(Error::ConfigValidation {
            message: format!(
                "audio_channels must be 1 or 2, got {}",
                station.audio_channels
            ),
        });
    }

    if station.buffer_size_seconds == 0 {
        return Err(Error::ConfigValidation {
            message: "buffer_size_seconds must be positive".to_string(),
        });
    }

    if let Some(lat) = station.latitude
        && !(-90.0..=90.0).contains(&lat)
    {
        return Err(Error::InvalidLatitude { value: lat });
    }

    if let Some(lon) = station.longitude
        && !(-180.0..=180.0).contains(&lon)
    {
        return Err(Error::InvalidLongitude { value: lon });
    }

    if station.timezone.parse::<chrono_tz::Tz>().is_err() {
        return Err(Error::ConfigValidation {
            message: format!("unknown timezone '{}'", station.timezone),
        });
    }

    let threshold = config.detection.species_confidence_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        return Err(Error::ConfigValidation {
            message: format!("species_confidence_threshold must be in [0, 1], got {threshold}"),
        });
    }

    if config.ingest.detection_buffer_max_size == 0 {
        return Err(Error::ConfigValidation {
            message: "detection_buffer_max_size must be positive".to_string(),
        });
    }

    if config.ingest.buffer_flush_interval == 0 {
        return Err(Error::ConfigValidation {
            message: "buffer_flush_interval must be positive".to_string(),
        });
    }

    let resolution = config.ebird_filtering.h3_resolution;
    if resolution > 15 {
        return Err(Error::ConfigValidation {
            message: format!("h3_resolution must be in [0, 15], got {resolution}"),
        });
    }

    validate_quiet_hours(
        config.notifications.quiet_hours_start.as_deref(),
        config.notifications.quiet_hours_end.as_deref(),
    )?;

    for rule in &config.notifications.rules {
        if !(0.0..=100.0).contains(&rule.minimum_confidence) {
            return Err(Error::ConfigValidation {
                message: format!(
                    "rule '{}': minimum_confidence must be in [0, 100], got {}",
                    rule.name, rule.minimum_confidence
                ),
            });
        }
    }

    Ok(())
}

/// Quiet hours must be both present or both absent, and parse as `HH:MM:SS`.
fn validate_quiet_hours(start: Option<&str>, end: Option<&str>) -> Result<()> {
    match (start, end) {
        (None, None) => Ok(()),
        (Some(start), Some(end)) => {
            for value in [start, end] {
                if NaiveTime::parse_from_str(value, "%H:%M:%S").is_err() {
                    return Err(Error::ConfigValidation {
                        message: format!("quiet hours time '{value}' is not HH:MM:SS"),
                    });
                }
            }
            Ok(())
        }
        _ => Err(Error::ConfigValidation {
            message: "quiet_hours_start and quiet_hours_end must be set together".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_rejects_bad_threshold() {
        let mut config = Config::default();
        config.detection.species_confidence_threshold = 1.5;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_unknown_timezone() {
        let mut config = Config::default();
        config.station.timezone = "Mars/Olympus_Mons".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_latitude() {
        let mut config = Config::default();
        config.station.latitude = Some(91.0);
        let err = validate_config(&config);
        assert!(matches!(err, Err(Error::InvalidLatitude { .. })));
    }

    #[test]
    fn test_rejects_half_configured_quiet_hours() {
        let mut config = Config::default();
        config.notifications.quiet_hours_start = Some("22:00:00".to_string());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_accepts_overnight_quiet_hours() {
        let mut config = Config::default();
        config.notifications.quiet_hours_start = Some("22:00:00".to_string());
        config.notifications.quiet_hours_end = Some("06:00:00".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_rejects_malformed_quiet_hours() {
        let mut config = Config::default();
        config.notifications.quiet_hours_start = Some("ten pm".to_string());
        config.notifications.quiet_hours_end = Some("06:00:00".to_string());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_zero_buffer() {
        let mut config = Config::default();
        config.ingest.detection_buffer_max_size = 0;
        assert!(validate_config(&config).is_err());
    }
}
