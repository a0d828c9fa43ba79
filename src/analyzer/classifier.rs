//! The classifier seam.
//!
//! The neural model is opaque to the pipeline: anything that can score a
//! fixed-length window of normalized samples plugs in here. The production
//! binding lives outside this crate; tests use [`StaticClassifier`].

use crate::error::Result;

/// One classifier prediction for an analysis window.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Raw model label, `<scientific>_<common>`.
    pub species_tensor: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Scores analysis windows.
///
/// Implementations must be callable from the analyzer task without
/// internal locking. Errors are reported through the return value; the
/// analyzer logs and drops the window.
pub trait Classifier: Send + Sync {
    /// Classify one window of normalized samples.
    fn classify(&self, window: &[f32]) -> Result<Vec<Prediction>>;
}

/// A classifier returning a fixed prediction list, for wiring and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticClassifier {
    predictions: Vec<Prediction>,
}

impl StaticClassifier {
    /// Create a classifier that always returns `predictions`.
    pub fn new(predictions: Vec<Prediction>) -> Self {
        Self { predictions }
    }
}

impl Classifier for StaticClassifier {
    fn classify(&self, _window: &[f32]) -> Result<Vec<Prediction>> {
        Ok(self.predictions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_classifier_returns_fixed_predictions() {
        let classifier = StaticClassifier::new(vec![Prediction {
            species_tensor: "Corvus corax_Common Raven".to_string(),
            confidence: 0.91,
        }]);
        let result = classifier.classify(&[0.0; 16]).ok();
        assert_eq!(result.map(|p| p.len()), Some(1));
    }
}
