//! Notification rule matching.

use crate::config::{
    NotificationFrequency, NotificationRule, NotificationScope, NotificationsConfig, TaxaFilter,
};
use crate::notify::template;
use crate::query::{EnrichedDetection, ScopeFlags};
use chrono::{NaiveTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::warn;

/// What a matched rule produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RuleOutcome {
    /// The rule matched and a message should be delivered.
    Notify {
        /// Matching rule name.
        rule: String,
        /// Rendered message.
        message: String,
    },
    /// The rule matched inside quiet hours; delivery is deferred.
    Deferred {
        /// Matching rule name.
        rule: String,
    },
}

/// Evaluates the configured rules against persisted detections.
#[derive(Debug, Clone)]
pub struct RuleMatcher {
    rules: Vec<NotificationRule>,
    timezone: Tz,
    quiet_hours: Option<(NaiveTime, NaiveTime)>,
}

impl RuleMatcher {
    /// Build a matcher from notification configuration.
    ///
    /// An unparseable quiet-hours pair is treated as unconfigured, matching
    /// the fail-open posture of the rest of the pipeline.
    pub fn new(config: &NotificationsConfig, timezone: Tz) -> Self {
        let quiet_hours = match (
            config.quiet_hours_start.as_deref(),
            config.quiet_hours_end.as_deref(),
        ) {
            (Some(start), Some(end)) => {
                let parsed = NaiveTime::parse_from_str(start, "%H:%M:%S")
                    .ok()
                    .zip(NaiveTime::parse_from_str(end, "%H:%M:%S").ok());
                if parsed.is_none() {
                    warn!(start, end, "invalid quiet hours format, ignoring");
                }
                parsed
            }
            _ => None,
        };

        Self {
            rules: config.rules.clone(),
            timezone,
            quiet_hours,
        }
    }

    /// Evaluate every rule against a persisted detection.
    pub fn evaluate(&self, detection: &EnrichedDetection, flags: ScopeFlags) -> Vec<RuleOutcome> {
        let now_local = Utc::now().with_timezone(&self.timezone).time();
        self.evaluate_at(detection, flags, now_local)
    }

    /// Evaluation against an explicit local time, for determinism in tests.
    pub fn evaluate_at(
        &self,
        detection: &EnrichedDetection,
        flags: ScopeFlags,
        now_local: NaiveTime,
    ) -> Vec<RuleOutcome> {
        let quiet = self.in_quiet_hours(now_local);

        self.rules
            .iter()
            .filter(|rule| rule_matches(rule, detection, flags))
            .map(|rule| {
                if quiet {
                    RuleOutcome::Deferred {
                        rule: rule.name.clone(),
                    }
                } else {
                    let message = rule.template.as_deref().map_or_else(
                        || template::default_message(detection),
                        |tpl| template::render(tpl, detection),
                    );
                    RuleOutcome::Notify {
                        rule: rule.name.clone(),
                        message,
                    }
                }
            })
            .collect()
    }

    /// Whether the local time falls inside the quiet range. `start == end`
    /// means the operator disabled quiet hours; the range may cross
    /// midnight.
    fn in_quiet_hours(&self, now: NaiveTime) -> bool {
        let Some((start, end)) = self.quiet_hours else {
            return false;
        };
        if start == end {
            return false;
        }
        if start < end {
            now >= start && now < end
        } else {
            now >= start || now < end
        }
    }
}

/// All conditions must hold for a rule to match; exclusion wins over
/// inclusion.
fn rule_matches(rule: &NotificationRule, detection: &EnrichedDetection, flags: ScopeFlags) -> bool {
    if !rule.enabled || rule.frequency != NotificationFrequency::Immediate {
        return false;
    }
    if detection.detection.confidence * 100.0 < rule.minimum_confidence {
        return false;
    }
    if taxa_contains(&rule.exclude_taxa, detection) {
        return false;
    }
    if !rule.include_taxa.is_empty() && !taxa_contains(&rule.include_taxa, detection) {
        return false;
    }
    match rule.scope {
        NotificationScope::All => true,
        NotificationScope::NewEver => flags.first_ever,
        NotificationScope::NewToday => flags.first_today,
        NotificationScope::NewThisWeek => flags.first_this_week,
    }
}

/// Whether any rank of the filter contains the detection's taxa.
fn taxa_contains(filter: &TaxaFilter, detection: &EnrichedDetection) -> bool {
    let d = &detection.detection;
    if filter.species.iter().any(|s| s == &d.scientific_name) {
        return true;
    }

    // Genus degrades to the first word of the binomial when the reference
    // databases are unavailable.
    let genus = detection
        .genus
        .clone()
        .or_else(|| d.scientific_name.split_whitespace().next().map(String::from));
    if let Some(genus) = genus
        && filter.genera.iter().any(|g| g == &genus)
    {
        return true;
    }

    if let Some(family) = &detection.family
        && filter.families.iter().any(|f| f == family)
    {
        return true;
    }
    if let Some(order) = &detection.order_name
        && filter.orders.iter().any(|o| o == order)
    {
        return true;
    }
    false
}
