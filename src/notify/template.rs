//! Notification message rendering.
//!
//! Templates are expanded over a fixed context of detection fields. A
//! template error produces a visible diagnostic string instead of failing
//! the match.

use crate::query::EnrichedDetection;
use crate::utils::time::to_wire_timestamp;
use minijinja::{Environment, context};
use tracing::warn;

/// The string emitted when a template fails to render.
pub const RENDER_ERROR: &str = "Error rendering template";

/// Render a notification template for a detection.
///
/// The context exposes exactly `scientific_name`, `common_name`,
/// `confidence_pct`, `date`, `time`, `timestamp`, `latitude`, and
/// `longitude`.
#[allow(clippy::cast_possible_truncation)]
pub fn render(template: &str, detection: &EnrichedDetection) -> String {
    let d = &detection.detection;
    let env = Environment::new();
    let result = env.render_str(
        template,
        context! {
            scientific_name => d.scientific_name,
            common_name => best_display_name(detection),
            confidence_pct => (d.confidence * 100.0).round() as i64,
            date => d.timestamp.format("%Y-%m-%d").to_string(),
            time => d.timestamp.format("%H:%M:%S").to_string(),
            timestamp => to_wire_timestamp(d.timestamp),
            latitude => d.latitude,
            longitude => d.longitude,
        },
    );

    match result {
        Ok(rendered) => rendered,
        Err(e) => {
            warn!(error = %e, "notification template failed to render");
            RENDER_ERROR.to_string()
        }
    }
}

/// Default message when a rule carries no template.
pub fn default_message(detection: &EnrichedDetection) -> String {
    let d = &detection.detection;
    format!(
        "{} ({}) detected with {:.0}% confidence",
        best_display_name(detection),
        d.scientific_name,
        d.confidence * 100.0
    )
}

/// Translated name, falling back through the enrichment chain.
fn best_display_name(detection: &EnrichedDetection) -> String {
    detection
        .translated_name
        .clone()
        .or_else(|| detection.ioc_english_name.clone())
        .unwrap_or_else(|| detection.detection.common_name.clone())
}
