//! Notification rule matching and message rendering.

mod rules;
mod template;

pub use rules::{RuleMatcher, RuleOutcome};
pub use template::{RENDER_ERROR, default_message, render};
