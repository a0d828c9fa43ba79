//! Weather correlation.

use crate::query::WeatherSeries;
use serde::Serialize;

/// Pearson correlation between per-hour detection counts and each weather
/// variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeatherCorrelations {
    /// Correlation with temperature.
    pub temperature: f64,
    /// Correlation with humidity.
    pub humidity: f64,
    /// Correlation with pressure.
    pub pressure: f64,
    /// Correlation with wind speed.
    pub wind_speed: f64,
    /// Correlation with precipitation.
    pub precipitation: f64,
}

/// Correlate hourly detection counts against each weather variable.
#[allow(clippy::cast_precision_loss)]
pub fn weather_correlations(series: &WeatherSeries) -> WeatherCorrelations {
    let counts: Vec<Option<f64>> = series
        .detection_counts
        .iter()
        .map(|&count| Some(count as f64))
        .collect();

    WeatherCorrelations {
        temperature: pearson(&counts, &series.temperature),
        humidity: pearson(&counts, &series.humidity),
        pressure: pearson(&counts, &series.pressure),
        wind_speed: pearson(&counts, &series.wind_speed),
        precipitation: pearson(&counts, &series.precipitation),
    }
}

/// Pearson correlation coefficient, skipping pairs with a missing value.
///
/// Returns `0.0` when fewer than two complete pairs remain or the
/// denominator is undefined (zero variance). Rounded to 3 decimals.
#[allow(clippy::cast_precision_loss)]
pub fn pearson(x: &[Option<f64>], y: &[Option<f64>]) -> f64 {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y.iter())
        .filter_map(|(x, y)| x.zip(*y))
        .collect();

    if pairs.len() < 2 {
        return 0.0;
    }

    let n = pairs.len() as f64;
    let x_mean = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let y_mean = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let numerator: f64 = pairs
        .iter()
        .map(|(x, y)| (x - x_mean) * (y - y_mean))
        .sum();
    let denominator = (pairs.iter().map(|(x, _)| (x - x_mean).powi(2)).sum::<f64>()
        * pairs.iter().map(|(_, y)| (y - y_mean).powi(2)).sum::<f64>())
    .sqrt();

    if denominator == 0.0 {
        return 0.0;
    }
    ((numerator / denominator) * 1000.0).round() / 1000.0
}
